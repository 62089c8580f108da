//! The relay itself: starting runs, pumping runner output into the event log
//! and hub, and opening tails.

use crate::access::{AccessGate, AccessVerb, AllowAll};
use crate::config::{ServerConfig, validate_resource_name};
use crate::hub::{BroadcastHub, Subscription};
use crate::rest::ApiError;
use crate::supervisor::RunSupervisor;
use crate::upstream::{UpstreamClient, UpstreamError};
use crate::wire::{HEARTBEAT_FRAME, LineBuffer, data_frame, data_payload};
use axum::http::HeaderMap;
use bytes::Bytes;
use futures::{Stream, StreamExt};
use relay_core::{Event, RelayError, Result};
use relay_store::{EventLog, LegacyMigrator, compact_events, normalize_timestamp};
use relay_telemetry::run_pump_span;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value, json};
use std::convert::Infallible;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tracing::Instrument;

pub const RUNNER_UNAVAILABLE: &str = "Runner is not available";

/// Body of a run request. Everything besides the ids is forwarded to the
/// runner untouched.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RunAgentInput {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub thread_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub run_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub messages: Option<Value>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl RunAgentInput {
    /// Ids of messages flagged `metadata.hidden = true`, in request order.
    pub fn hidden_message_ids(&self) -> Vec<String> {
        let Some(Value::Array(messages)) = &self.messages else {
            return Vec::new();
        };
        messages
            .iter()
            .filter(|m| m.pointer("/metadata/hidden").and_then(Value::as_bool) == Some(true))
            .map(|m| m.get("id").and_then(Value::as_str).unwrap_or_default().to_string())
            .collect()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RunAccepted {
    pub run_id: String,
    pub thread_id: String,
}

#[derive(Clone)]
pub struct Relay {
    config: Arc<ServerConfig>,
    log: EventLog,
    hub: BroadcastHub,
    upstream: UpstreamClient,
    supervisor: RunSupervisor,
    gate: Arc<dyn AccessGate>,
}

impl Relay {
    pub fn new(config: ServerConfig) -> Result<Self> {
        let upstream = UpstreamClient::new(config.connect.clone(), config.control_timeout)?;
        Ok(Self {
            log: EventLog::new(config.state_base_dir.clone()),
            hub: BroadcastHub::with_buffer(config.tail.subscriber_buffer),
            upstream,
            supervisor: RunSupervisor::new(),
            gate: Arc::new(AllowAll),
            config: Arc::new(config),
        })
    }

    pub fn with_gate(mut self, gate: Arc<dyn AccessGate>) -> Self {
        self.gate = gate;
        self
    }

    pub fn with_migrator(mut self, migrator: Arc<dyn LegacyMigrator>) -> Self {
        self.log = self.log.with_migrator(migrator);
        self
    }

    pub fn config(&self) -> &ServerConfig {
        &self.config
    }

    pub fn log(&self) -> &EventLog {
        &self.log
    }

    pub fn hub(&self) -> &BroadcastHub {
        &self.hub
    }

    pub fn upstream(&self) -> &UpstreamClient {
        &self.upstream
    }

    pub fn supervisor(&self) -> &RunSupervisor {
        &self.supervisor
    }

    /// Start the periodic eviction of idle session write locks.
    pub fn spawn_lock_sweep(&self) -> JoinHandle<()> {
        self.log
            .locks()
            .spawn_eviction_sweep(self.config.lock_sweep_interval, self.config.lock_idle_age)
    }

    pub async fn authorize(
        &self,
        headers: &HeaderMap,
        project: &str,
        session: &str,
        verb: AccessVerb,
    ) -> std::result::Result<(), ApiError> {
        self.gate.check(headers, project, session, verb).await.map_err(|denied| {
            tracing::info!(project, session, verb = verb.as_str(), reason = %denied, "access denied");
            ApiError::from(denied)
        })
    }

    /// Persist an event and broadcast it as one frame, atomically with
    /// respect to tails opening on the same session.
    pub async fn publish_event(&self, session: &str, event: &Event) {
        let frame = match data_frame(event) {
            Ok(frame) => frame,
            Err(e) => {
                tracing::error!(session, error = %e, "failed to encode event");
                return;
            }
        };
        let hub = &self.hub;
        // Write failures are logged by the store; the live publish still happens.
        let _ = self
            .log
            .append_then(session, event, || {
                hub.publish(session, &frame);
            })
            .await;
    }

    /// Accept a run: settle its ids, announce hidden messages, and hand the
    /// request to a background pump. Returns as soon as the pump is spawned.
    pub async fn start_run(
        &self,
        project: &str,
        session: &str,
        mut input: RunAgentInput,
    ) -> Result<RunAccepted> {
        validate_resource_name(project)?;
        validate_resource_name(session)?;

        let thread_id =
            input.thread_id.clone().filter(|t| !t.is_empty()).unwrap_or_else(|| session.to_string());
        let run_id = input
            .run_id
            .clone()
            .filter(|r| !r.is_empty())
            .unwrap_or_else(|| uuid::Uuid::new_v4().to_string());
        input.thread_id = Some(thread_id.clone());
        input.run_id = Some(run_id.clone());

        let message_count = match &input.messages {
            Some(Value::Array(messages)) => messages.len(),
            _ => 0,
        };
        tracing::info!(project, session, run_id = %run_id, messages = message_count, "starting run");

        for message_id in input.hidden_message_ids() {
            let payload = json!({"type": "message_metadata", "messageId": message_id, "hidden": true});
            self.publish_event(session, &Event::raw(&thread_id, &run_id, payload)).await;
        }

        let body = Bytes::from(serde_json::to_vec(&input)?);
        let url = self.config.runner_url(project, session);

        let relay = self.clone();
        let span = run_pump_span(session, &run_id);
        let (pump_session, pump_run, pump_thread) = (session.to_string(), run_id.clone(), thread_id.clone());
        self.supervisor.spawn(
            session,
            &run_id,
            async move { relay.pump_run(url, body, pump_session, pump_run, pump_thread).await }
                .instrument(span),
        );

        Ok(RunAccepted { run_id, thread_id })
    }

    async fn pump_run(&self, url: String, body: Bytes, session: String, run_id: String, thread_id: String) {
        tracing::info!(url = %url, "connecting to runner");
        let response = match self.upstream.connect(&url, body).await {
            Ok(response) => response,
            Err(e) => {
                tracing::warn!(error = %e, "runner unavailable");
                self.publish_run_failure(&session, &run_id, &thread_id, RUNNER_UNAVAILABLE).await;
                return;
            }
        };

        let status = response.status();
        if !status.is_success() {
            let detail = response.text().await.unwrap_or_default();
            tracing::warn!(status = status.as_u16(), body = %detail, "runner rejected run");
            let message = UpstreamError::Status(status.as_u16()).to_string();
            self.publish_run_failure(&session, &run_id, &thread_id, &message).await;
            return;
        }

        let mut chunks = response.bytes_stream();
        let mut lines = LineBuffer::new();
        let mut forwarded = 0usize;
        while let Some(chunk) = chunks.next().await {
            let chunk = match chunk {
                Ok(chunk) => chunk,
                Err(e) => {
                    tracing::warn!(error = %e, "runner stream read failed");
                    break;
                }
            };
            for line in lines.push(&chunk) {
                if self.forward_line(&session, &run_id, &thread_id, &line).await {
                    forwarded += 1;
                }
            }
        }

        if lines.pending_len() > 0 {
            tracing::debug!(bytes = lines.pending_len(), "discarding unterminated trailing line");
        }
        tracing::info!(events = forwarded, "runner stream ended");
    }

    /// Persist and publish one wire line. Returns whether it carried an event.
    async fn forward_line(&self, session: &str, run_id: &str, thread_id: &str, line: &str) -> bool {
        let Some(payload) = data_payload(line) else {
            self.hub.publish(session, line);
            return false;
        };

        let mut event = match Event::parse(payload) {
            Ok(event) => event,
            Err(e) => {
                tracing::warn!(error = %e, line = %line.trim_end(), "dropping malformed data line");
                return false;
            }
        };
        event.ensure_ids(thread_id, run_id);

        let hub = &self.hub;
        let _ = self
            .log
            .append_then(session, &event, || {
                hub.publish(session, line);
            })
            .await;
        true
    }

    async fn publish_run_failure(&self, session: &str, run_id: &str, thread_id: &str, message: &str) {
        self.publish_event(session, &Event::run_started(thread_id, run_id)).await;
        self.publish_event(session, &Event::run_error(thread_id, run_id, message)).await;
    }

    /// Open a tail on a session: history first, then live lines.
    ///
    /// The subscription is registered before history is read, and drained
    /// while the session lock is held, so every event reaches the client
    /// exactly once.
    pub async fn open_tail(
        &self,
        session: &str,
    ) -> Result<impl Stream<Item = std::result::Result<Bytes, Infallible>> + Send + 'static> {
        let mut subscription = self.hub.subscribe(session);
        let mut drained = 0;
        let loaded = self.log.load_then(session, || drained = subscription.drain()).await;

        let events = match loaded {
            Ok(events) => events,
            Err(e @ RelayError::InvalidSessionKey(_)) => return Err(e),
            Err(e) => {
                tracing::error!(session, error = %e, "failed to load event history");
                Vec::new()
            }
        };

        let replay = replay_frames(session, events);
        if drained > 0 {
            tracing::debug!(session, drained, "discarded live lines already covered by history");
        }

        Ok(tail_stream(replay, subscription, self.config.tail.heartbeat_interval))
    }
}

impl std::fmt::Debug for Relay {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Relay")
            .field("log", &self.log)
            .field("hub", &self.hub)
            .field("supervisor", &self.supervisor)
            .finish_non_exhaustive()
    }
}

/// Render history for a joining client: compacted once the last run has
/// finished, raw while a run is still open.
fn replay_frames(session: &str, events: Vec<Event>) -> String {
    let finished = events.last().is_some_and(Event::is_run_finished);
    let mut replay = if finished {
        let compacted = compact_events(&events);
        tracing::info!(session, raw = events.len(), compacted = compacted.len(), "replaying finished session");
        compacted
    } else {
        if !events.is_empty() {
            tracing::info!(session, events = events.len(), "replaying running session");
        }
        events
    };

    let mut frames = String::new();
    for event in &mut replay {
        normalize_timestamp(event);
        match data_frame(event) {
            Ok(frame) => frames.push_str(&frame),
            Err(e) => tracing::warn!(session, error = %e, "skipping unencodable event"),
        }
    }
    frames
}

fn tail_stream(
    replay: String,
    mut subscription: Subscription,
    heartbeat_every: Duration,
) -> impl Stream<Item = std::result::Result<Bytes, Infallible>> + Send + 'static {
    async_stream::stream! {
        if !replay.is_empty() {
            yield Ok(Bytes::from(replay));
        }

        let mut heartbeat =
            tokio::time::interval_at(tokio::time::Instant::now() + heartbeat_every, heartbeat_every);
        loop {
            let frame = tokio::select! {
                line = subscription.recv() => match line {
                    Some(line) => Bytes::from(line),
                    None => break,
                },
                _ = heartbeat.tick() => Bytes::from_static(HEARTBEAT_FRAME.as_bytes()),
            };
            yield Ok(frame);
        }

        tracing::debug!(session = %subscription.session_key(), "tail ended");
    }
}
