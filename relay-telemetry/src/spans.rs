//! Span helpers for relay operations
//!
//! Provides pre-configured spans for the long-lived tasks the relay runs:
//! the upstream pump behind each run, each SSE tail, and individual calls to
//! a session's runner.

use tracing::Span;

/// Create a span for the task that streams one run from the runner into the
/// event log and hub.
///
/// # Example
/// ```
/// use relay_telemetry::run_pump_span;
/// let span = run_pump_span("session-1", "run-42");
/// let _enter = span.enter();
/// ```
pub fn run_pump_span(session: &str, run_id: &str) -> Span {
    tracing::info_span!("relay.run_pump", session = session, run.id = run_id, otel.kind = "internal")
}

/// Create a span for one client tailing a session's events.
pub fn tail_span(session: &str) -> Span {
    tracing::info_span!("relay.tail", session = session, otel.kind = "server")
}

/// Create a span for a request to a session's runner.
///
/// # Example
/// ```
/// use relay_telemetry::upstream_call_span;
/// let span = upstream_call_span("interrupt", "http://runner:8001/interrupt");
/// let _enter = span.enter();
/// ```
pub fn upstream_call_span(operation: &str, url: &str) -> Span {
    tracing::debug_span!("relay.upstream", operation = operation, url = url, otel.kind = "client")
}
