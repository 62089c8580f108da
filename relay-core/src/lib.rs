//! # relay-core
//!
//! Core types for the AG-UI event relay.
//!
//! - [`Event`] - a single AG-UI event, typed for the kinds the relay interprets
//!   and open for everything else
//! - [`RelayError`] / [`Result`] - unified error handling
//!
//! ```rust
//! use relay_core::Event;
//!
//! let mut event = Event::parse(r#"{"type":"RUN_STARTED"}"#)?;
//! event.ensure_ids("thread-1", "run-1");
//! assert_eq!(event.run_id(), Some("run-1"));
//! # Ok::<(), serde_json::Error>(())
//! ```

pub mod error;
pub mod event;

pub use error::{RelayError, Result};
pub use event::{
    Event, EventEnvelope, RunErrorEvent, TextMessageContentEvent, TextMessageEndEvent,
    TextMessageStartEvent, ToolCallArgsEvent, ToolCallEndEvent, ToolCallStartEvent,
};
