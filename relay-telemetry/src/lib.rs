//! # Relay Telemetry
//!
//! Structured logging for the AG-UI relay, built on `tracing`.
//!
//! ## Usage
//!
//! ```rust
//! use relay_telemetry::{info, init_telemetry, instrument};
//!
//! fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     init_telemetry("agui-relay")?;
//!
//!     #[instrument]
//!     async fn handle() {
//!         info!("request handled");
//!     }
//!     Ok(())
//! }
//! ```

pub mod init;
pub mod spans;

// Re-export tracing macros for convenience
pub use tracing::{Instrument, Span, debug, error, info, instrument, trace, warn};

pub use init::{DEFAULT_FILTER, init_json_telemetry, init_telemetry};
pub use spans::*;
