//! Durable storage for AG-UI event streams.
//!
//! Every session owns one append-only JSONL file. The store knows nothing
//! about HTTP or upstream runners; it persists events, reads them back, and
//! compacts streamed deltas for replay.

pub mod compaction;
pub mod locks;
pub mod log;
pub mod migrate;
pub mod timestamp;

pub use compaction::compact_events;
pub use locks::{DEFAULT_LOCK_IDLE_AGE, DEFAULT_SWEEP_INTERVAL, SessionLocks, SessionWriteGuard};
pub use log::{EVENT_LOG_FILE, EventLog, SESSIONS_DIR, parse_records};
pub use migrate::{LegacyMigrator, NoopMigrator};
pub use timestamp::normalize_timestamp;
