//! # relay-cli
//!
//! Command-line entry point for the AG-UI event relay.
//!
//! ```bash
//! agui-relay serve --port 8080 --state-base-dir /workspace
//! LOG_FORMAT=json RUNNER_URL_TEMPLATE='http://{session}.{project}:8001/' agui-relay serve
//! ```

pub mod cli;
pub mod config;
pub mod serve;

pub use cli::{Cli, Commands, LogFormat, ServeArgs};
pub use serve::run_serve;
