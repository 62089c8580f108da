use crate::access::AccessVerb;
use crate::relay::Relay;
use crate::rest::ApiError;
use super::validate_session_path;
use axum::{
    body::Body,
    extract::{Path, State},
    http::{HeaderMap, HeaderName, HeaderValue, header},
    response::{IntoResponse, Response},
};
use relay_telemetry::{Instrument, tail_span};

#[derive(Clone)]
pub struct EventsController {
    relay: Relay,
}

impl EventsController {
    pub fn new(relay: Relay) -> Self {
        Self { relay }
    }
}

/// `GET .../agui/events`: replay the session's history, then follow it live.
pub async fn tail_events(
    State(controller): State<EventsController>,
    Path((project, session)): Path<(String, String)>,
    headers: HeaderMap,
) -> Result<Response, ApiError> {
    validate_session_path(&project, &session)?;
    let relay = &controller.relay;
    relay.authorize(&headers, &project, &session, AccessVerb::Get).await?;

    tracing::info!(project = %project, session = %session, "tail client connected");
    let stream = relay
        .open_tail(&session)
        .instrument(tail_span(&session))
        .await
        .map_err(|e| ApiError::internal(&e, relay.config().security.expose_error_details))?;

    let sse_headers = [
        (header::CONTENT_TYPE, HeaderValue::from_static("text/event-stream")),
        (header::CACHE_CONTROL, HeaderValue::from_static("no-cache")),
        (header::CONNECTION, HeaderValue::from_static("keep-alive")),
        (HeaderName::from_static("x-accel-buffering"), HeaderValue::from_static("no")),
    ];
    Ok((sse_headers, Body::from_stream(stream)).into_response())
}
