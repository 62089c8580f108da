//! Synchronous calls proxied to a session's runner.
//!
//! Read-only calls degrade to empty but well-formed shapes when the runner is
//! unreachable, so a missing runner never breaks a client's parsing.

use crate::access::AccessVerb;
use crate::relay::Relay;
use crate::rest::ApiError;
use super::validate_session_path;
use axum::{
    Json,
    body::Bytes,
    extract::{Path, State},
    http::{HeaderMap, StatusCode},
};
use relay_core::Event;
use relay_core::event::META;
use serde_json::{Map, Value, json};

#[derive(Clone)]
pub struct ControlController {
    relay: Relay,
}

impl ControlController {
    pub fn new(relay: Relay) -> Self {
        Self { relay }
    }
}

pub fn default_capabilities() -> Value {
    json!({
        "framework": "unknown",
        "agent_features": [],
        "platform_features": [],
        "file_system": false,
        "mcp": false
    })
}

pub fn default_mcp_status() -> Value {
    json!({"servers": [], "totalCount": 0})
}

/// `POST .../agui/interrupt`: ask the runner to stop the current run. The
/// runner reports the outcome through the run's own event stream.
pub async fn interrupt(
    State(controller): State<ControlController>,
    Path((project, session)): Path<(String, String)>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Json<Value>, ApiError> {
    validate_session_path(&project, &session)?;
    let relay = &controller.relay;
    relay.authorize(&headers, &project, &session, AccessVerb::Update).await?;

    let payload = serde_json::from_slice::<Value>(&body).unwrap_or_else(|_| json!({}));
    let url = relay.config().runner_endpoint(&project, &session, "interrupt");

    let response = relay.upstream().post_control(&url, &payload).await.map_err(|e| {
        tracing::warn!(session = %session, error = %e, "interrupt could not reach runner");
        ApiError::bad_gateway(e.to_string())
    })?;

    let status = response.status();
    if !status.is_success() {
        let detail = response.text().await.unwrap_or_default();
        return Err(ApiError::new(status, detail));
    }

    tracing::info!(session = %session, "interrupt forwarded");
    Ok(Json(json!({"message": "Interrupt signal sent"})))
}

/// `POST .../agui/feedback`: forward a `META` feedback event to the runner
/// and keep the record it returns in the session log.
pub async fn feedback(
    State(controller): State<ControlController>,
    Path((project, session)): Path<(String, String)>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Json<Value>, ApiError> {
    validate_session_path(&project, &session)?;
    let relay = &controller.relay;
    relay.authorize(&headers, &project, &session, AccessVerb::Update).await?;

    let meta: Map<String, Value> = serde_json::from_slice(&body)
        .map_err(|e| ApiError::bad_request(format!("invalid feedback event: {e}")))?;
    if meta.get("type").and_then(Value::as_str) != Some(META) {
        return Err(ApiError::bad_request("Expected META event type"));
    }

    let url = relay.config().runner_endpoint(&project, &session, "feedback");
    let response = match relay.upstream().post_control(&url, &Value::Object(meta)).await {
        Ok(response) => response,
        Err(e) => {
            tracing::warn!(session = %session, error = %e, "feedback could not reach runner");
            return Err(ApiError::new(
                StatusCode::ACCEPTED,
                "Runner unavailable - feedback not recorded",
            )
            .with_field("status", "failed"));
        }
    };

    let status = response.status();
    if !status.is_success() {
        let detail = response.text().await.unwrap_or_default();
        tracing::warn!(session = %session, status = status.as_u16(), body = %detail, "runner rejected feedback");
        return Err(ApiError::new(status, "Runner rejected feedback")
            .with_field("status", "failed"));
    }

    let mut record = match response.json::<Event>().await {
        Ok(record) => record,
        Err(e) => {
            tracing::warn!(session = %session, error = %e, "runner feedback response was not an event");
            return Ok(Json(json!({"message": "Feedback sent but not persisted", "status": "sent"})));
        }
    };
    record.set_thread_id(&session);
    if let Err(e) = relay.log().append(&session, &record).await {
        tracing::warn!(session = %session, error = %e, "feedback record not persisted");
    }

    Ok(Json(json!({"message": "Feedback submitted", "status": "sent"})))
}

/// `GET .../agui/capabilities`: the runner's capability manifest.
pub async fn capabilities(
    State(controller): State<ControlController>,
    Path((project, session)): Path<(String, String)>,
    headers: HeaderMap,
) -> Result<Json<Value>, ApiError> {
    validate_session_path(&project, &session)?;
    let relay = &controller.relay;
    relay.authorize(&headers, &project, &session, AccessVerb::Get).await?;

    let url = relay.config().runner_endpoint(&project, &session, "capabilities");
    let manifest = match relay.upstream().get_control(&url).await {
        Ok(response) => response.json::<Map<String, Value>>().await.ok().map(Value::Object),
        Err(e) => {
            tracing::debug!(session = %session, error = %e, "capabilities unavailable");
            None
        }
    };

    Ok(Json(manifest.unwrap_or_else(default_capabilities)))
}

/// `GET .../mcp/status`: the runner's MCP server status.
pub async fn mcp_status(
    State(controller): State<ControlController>,
    Path((project, session)): Path<(String, String)>,
    headers: HeaderMap,
) -> Result<Json<Value>, ApiError> {
    validate_session_path(&project, &session)?;
    let relay = &controller.relay;
    relay.authorize(&headers, &project, &session, AccessVerb::Get).await?;

    let url = relay.config().runner_endpoint(&project, &session, "mcp/status");
    let status = match relay.upstream().get_control(&url).await {
        Ok(response) if response.status().is_success() => {
            response.json::<Map<String, Value>>().await.ok().map(Value::Object)
        }
        Ok(response) => {
            tracing::debug!(session = %session, status = response.status().as_u16(), "mcp status rejected");
            None
        }
        Err(e) => {
            tracing::debug!(session = %session, error = %e, "mcp status unavailable");
            None
        }
    };

    Ok(Json(status.unwrap_or_else(default_mcp_status)))
}
