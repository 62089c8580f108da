use crate::access::AccessVerb;
use crate::relay::{Relay, RunAccepted, RunAgentInput};
use crate::rest::ApiError;
use super::validate_session_path;
use axum::{
    Json,
    body::Bytes,
    extract::{Path, State},
    http::HeaderMap,
};

#[derive(Clone)]
pub struct RunController {
    relay: Relay,
}

impl RunController {
    pub fn new(relay: Relay) -> Self {
        Self { relay }
    }
}

/// `POST .../agui/run`: accept a run and stream it in the background.
pub async fn start_run(
    State(controller): State<RunController>,
    Path((project, session)): Path<(String, String)>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Json<RunAccepted>, ApiError> {
    validate_session_path(&project, &session)?;
    let relay = &controller.relay;
    relay.authorize(&headers, &project, &session, AccessVerb::Update).await?;

    let input: RunAgentInput = serde_json::from_slice(&body).map_err(|e| {
        tracing::warn!(session = %session, error = %e, "rejecting run request");
        ApiError::bad_request(format!("invalid input: {e}"))
    })?;

    let accepted = relay
        .start_run(&project, &session, input)
        .await
        .map_err(|e| ApiError::internal(&e, relay.config().security.expose_error_details))?;
    Ok(Json(accepted))
}
