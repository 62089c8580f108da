//! HTTP client for a session's agent runner.
//!
//! Streaming runs use a long-lived connection with no overall timeout and a
//! fast-fail connect policy. Control calls (interrupt, feedback,
//! capabilities, status) use a separate client with a short overall timeout.

use crate::config::ConnectPolicy;
use relay_core::{RelayError, Result};
use relay_telemetry::upstream_call_span;
use reqwest::header::{ACCEPT, CONTENT_TYPE};
use serde_json::Value;
use std::error::Error as StdError;
use std::time::Duration;
use tracing::Instrument;

#[derive(Debug, thiserror::Error)]
pub enum UpstreamError {
    /// The runner's address does not resolve; the runner does not exist.
    #[error("runner address could not be resolved: {0}")]
    NameResolution(String),

    #[error("runner not available after {attempts} attempts")]
    Unavailable { attempts: u32 },

    #[error("runner sent no response headers within {0:?}")]
    HeaderTimeout(Duration),

    #[error("runner request failed: {0}")]
    Request(String),

    /// The runner answered, but not with success.
    #[error("Runner error: HTTP {0}")]
    Status(u16),
}

/// How a failed connection attempt should be handled.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectFailure {
    /// The host does not exist. Retrying cannot help.
    NameResolution,
    /// Something is at the address but not accepting connections yet.
    Refused,
    Other,
}

const NAME_RESOLUTION_MARKERS: [&str; 4] =
    ["dns error", "failed to lookup address", "no such host", "name or service not known"];

/// Classify a transport error by walking its source chain.
pub fn classify_error_chain(err: &(dyn StdError + 'static)) -> ConnectFailure {
    let mut refused = false;
    let mut current = Some(err);

    while let Some(e) = current {
        let message = e.to_string().to_ascii_lowercase();
        if NAME_RESOLUTION_MARKERS.iter().any(|marker| message.contains(marker)) {
            return ConnectFailure::NameResolution;
        }
        if let Some(io) = e.downcast_ref::<std::io::Error>() {
            refused |= io.kind() == std::io::ErrorKind::ConnectionRefused;
        }
        refused |= message.contains("connection refused");
        current = e.source();
    }

    if refused { ConnectFailure::Refused } else { ConnectFailure::Other }
}

fn classify_request_error(err: &reqwest::Error) -> ConnectFailure {
    match classify_error_chain(err) {
        ConnectFailure::Other if err.is_connect() => ConnectFailure::Refused,
        failure => failure,
    }
}

#[derive(Clone, Debug)]
pub struct UpstreamClient {
    stream_client: reqwest::Client,
    control_client: reqwest::Client,
    policy: ConnectPolicy,
}

impl UpstreamClient {
    pub fn new(policy: ConnectPolicy, control_timeout: Duration) -> Result<Self> {
        let stream_client = reqwest::Client::builder()
            .pool_idle_timeout(policy.pool_idle_timeout)
            .build()
            .map_err(|e| RelayError::Config(format!("failed to build runner client: {e}")))?;
        let control_client = reqwest::Client::builder()
            .timeout(control_timeout)
            .build()
            .map_err(|e| RelayError::Config(format!("failed to build control client: {e}")))?;

        Ok(Self { stream_client, control_client, policy })
    }

    pub fn policy(&self) -> &ConnectPolicy {
        &self.policy
    }

    /// Open a streaming run against the runner.
    ///
    /// Any HTTP status counts as connected; callers decide what a
    /// non-success status means.
    pub async fn connect(
        &self,
        url: &str,
        body: bytes::Bytes,
    ) -> std::result::Result<reqwest::Response, UpstreamError> {
        let max_attempts = self.policy.max_attempts.max(1);

        for attempt in 1..=max_attempts {
            let send = self
                .stream_client
                .post(url)
                .header(CONTENT_TYPE, "application/json")
                .header(ACCEPT, "text/event-stream")
                .body(body.clone())
                .send()
                .instrument(upstream_call_span("run", url));

            let err = match tokio::time::timeout(self.policy.header_timeout, send).await {
                Ok(Ok(response)) => return Ok(response),
                Ok(Err(err)) => err,
                Err(_) => return Err(UpstreamError::HeaderTimeout(self.policy.header_timeout)),
            };

            match classify_request_error(&err) {
                ConnectFailure::NameResolution => {
                    return Err(UpstreamError::NameResolution(err.to_string()));
                }
                ConnectFailure::Other => return Err(UpstreamError::Request(err.to_string())),
                ConnectFailure::Refused if attempt < max_attempts => {
                    tracing::warn!(
                        url,
                        attempt,
                        max_attempts,
                        delay_ms = self.policy.retry_delay.as_millis() as u64,
                        "runner not ready, retrying"
                    );
                    tokio::time::sleep(self.policy.retry_delay).await;
                }
                ConnectFailure::Refused => {
                    tracing::debug!(url, attempt, error = %err, "runner refused final attempt");
                }
            }
        }

        Err(UpstreamError::Unavailable { attempts: max_attempts })
    }

    pub async fn post_control(
        &self,
        url: &str,
        body: &Value,
    ) -> std::result::Result<reqwest::Response, UpstreamError> {
        self.control_client
            .post(url)
            .json(body)
            .send()
            .instrument(upstream_call_span("control", url))
            .await
            .map_err(|e| UpstreamError::Request(e.to_string()))
    }

    pub async fn get_control(&self, url: &str) -> std::result::Result<reqwest::Response, UpstreamError> {
        self.control_client
            .get(url)
            .send()
            .instrument(upstream_call_span("control", url))
            .await
            .map_err(|e| UpstreamError::Request(e.to_string()))
    }
}
