use crate::access::AccessDenied;
use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use relay_core::RelayError;
use serde_json::{Map, Value};

/// A JSON error response: `{"error": "..."}` plus any extra fields.
#[derive(Debug, Clone)]
pub struct ApiError {
    status: StatusCode,
    body: Map<String, Value>,
}

impl ApiError {
    pub fn new(status: StatusCode, message: impl Into<String>) -> Self {
        let mut body = Map::new();
        body.insert("error".to_string(), Value::String(message.into()));
        Self { status, body }
    }

    pub fn bad_request(message: impl Into<String>) -> Self {
        Self::new(StatusCode::BAD_REQUEST, message)
    }

    pub fn bad_gateway(message: impl Into<String>) -> Self {
        Self::new(StatusCode::BAD_GATEWAY, message)
    }

    /// An internal failure; details are only shown when the server is
    /// configured to expose them.
    pub fn internal(err: &RelayError, expose_details: bool) -> Self {
        tracing::error!(error = %err, "request failed");
        match err {
            RelayError::InvalidSessionKey(_) => Self::bad_request(err.to_string()),
            _ if expose_details => Self::new(StatusCode::INTERNAL_SERVER_ERROR, err.to_string()),
            _ => Self::new(StatusCode::INTERNAL_SERVER_ERROR, "Internal server error"),
        }
    }

    pub fn with_field(mut self, key: &str, value: impl Into<Value>) -> Self {
        self.body.insert(key.to_string(), value.into());
        self
    }

    pub fn status(&self) -> StatusCode {
        self.status
    }

    pub fn message(&self) -> &str {
        self.body.get("error").and_then(Value::as_str).unwrap_or_default()
    }
}

impl From<AccessDenied> for ApiError {
    fn from(denied: AccessDenied) -> Self {
        let status = match denied {
            AccessDenied::Unauthenticated => StatusCode::UNAUTHORIZED,
            AccessDenied::Forbidden => StatusCode::FORBIDDEN,
        };
        Self::new(status, denied.to_string())
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (self.status, Json(Value::Object(self.body))).into_response()
    }
}
