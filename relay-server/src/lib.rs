//! HTTP relay between AG-UI clients and per-session agent runners.
//!
//! A run is posted once, pumped from the runner in the background, persisted
//! to the session's append-only log and fanned out to every client tailing
//! the session. Late joiners replay the log before switching to live lines.

pub mod access;
pub mod config;
pub mod hub;
pub mod relay;
pub mod rest;
pub mod supervisor;
pub mod upstream;
pub mod wire;

pub use access::{AccessDenied, AccessGate, AccessVerb, AllowAll, BearerTokenGate};
pub use config::{ConnectPolicy, SecurityConfig, ServerConfig, TailConfig};
pub use hub::{BroadcastHub, Subscription};
pub use relay::{Relay, RunAccepted, RunAgentInput};
pub use rest::{ApiError, create_app};
pub use supervisor::RunSupervisor;
pub use upstream::{UpstreamClient, UpstreamError};
