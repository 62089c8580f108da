pub mod control;
pub mod events;
pub mod runs;

pub use control::ControlController;
pub use events::EventsController;
pub use runs::RunController;

use crate::config::validate_resource_name;
use crate::rest::ApiError;

/// Reject `{project}` and `{session}` path names that are not DNS labels.
/// Runs before access checks and before any name reaches the runner URL.
fn validate_session_path(project: &str, session: &str) -> Result<(), ApiError> {
    validate_resource_name(project)
        .and_then(|()| validate_resource_name(session))
        .map_err(|e| {
            tracing::warn!(project, session, "rejecting session path");
            ApiError::bad_request(e.to_string())
        })
}
