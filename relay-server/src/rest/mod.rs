pub mod controllers;
mod error;

pub use controllers::{ControlController, EventsController, RunController};
pub use error::ApiError;

use crate::relay::Relay;
use axum::{
    Router,
    extract::DefaultBodyLimit,
    http::{HeaderValue, Method, StatusCode, header},
    routing::{get, post},
};
use tower::ServiceBuilder;
use tower_http::{
    cors::{AllowOrigin, CorsLayer},
    set_header::SetResponseHeaderLayer,
    timeout::TimeoutLayer,
    trace::TraceLayer,
};

/// Session-scoped route prefix.
pub const SESSION_PREFIX: &str = "/projects/{project}/agentic-sessions/{session}";

/// Build CORS layer based on security configuration
fn build_cors_layer(relay: &Relay) -> CorsLayer {
    let cors = CorsLayer::new()
        .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
        .allow_headers([header::CONTENT_TYPE, header::AUTHORIZATION, header::ACCEPT]);

    let allowed = &relay.config().security.allowed_origins;
    if allowed.is_empty() {
        // Development mode: allow all origins (with warning logged at startup)
        cors.allow_origin(AllowOrigin::any())
    } else {
        let origins: Vec<HeaderValue> = allowed.iter().filter_map(|o| o.parse().ok()).collect();
        cors.allow_origin(origins)
    }
}

/// Create the relay application.
pub fn create_app(relay: Relay) -> Router {
    let security = relay.config().security.clone();
    let run_controller = RunController::new(relay.clone());
    let control_controller = ControlController::new(relay.clone());
    let events_controller = EventsController::new(relay.clone());

    // Request/response endpoints get the request timeout.
    let json_routes = Router::new()
        .route("/health", get(health_check))
        .route(&format!("{SESSION_PREFIX}/agui/run"), post(controllers::runs::start_run))
        .with_state(run_controller)
        .route(&format!("{SESSION_PREFIX}/agui/interrupt"), post(controllers::control::interrupt))
        .route(&format!("{SESSION_PREFIX}/agui/feedback"), post(controllers::control::feedback))
        .route(
            &format!("{SESSION_PREFIX}/agui/capabilities"),
            get(controllers::control::capabilities),
        )
        .route(&format!("{SESSION_PREFIX}/mcp/status"), get(controllers::control::mcp_status))
        .with_state(control_controller)
        .layer(TimeoutLayer::with_status_code(
            StatusCode::REQUEST_TIMEOUT,
            security.request_timeout,
        ));

    // Tails are unbounded and stay outside the request timeout.
    let stream_routes = Router::new()
        .route(&format!("{SESSION_PREFIX}/agui/events"), get(controllers::events::tail_events))
        .with_state(events_controller);

    let api_router = json_routes.merge(stream_routes);
    let cors_layer = build_cors_layer(&relay);

    Router::new().nest("/api", api_router).layer(
        ServiceBuilder::new()
            .layer(TraceLayer::new_for_http())
            .layer(DefaultBodyLimit::max(security.max_body_size))
            .layer(cors_layer)
            .layer(SetResponseHeaderLayer::if_not_present(
                header::X_CONTENT_TYPE_OPTIONS,
                HeaderValue::from_static("nosniff"),
            ))
            .layer(SetResponseHeaderLayer::if_not_present(
                header::X_FRAME_OPTIONS,
                HeaderValue::from_static("DENY"),
            )),
    )
}

async fn health_check() -> &'static str {
    "OK"
}
