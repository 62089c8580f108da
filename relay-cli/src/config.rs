use crate::cli::ServeArgs;
use relay_server::{AccessGate, AllowAll, BearerTokenGate, SecurityConfig, ServerConfig};
use std::sync::Arc;
use std::time::Duration;

/// Build the server configuration from parsed command-line arguments.
pub fn server_config(args: &ServeArgs) -> ServerConfig {
    let origins: Vec<String> = args
        .allowed_origins
        .iter()
        .map(|o| o.trim())
        .filter(|o| !o.is_empty())
        .map(str::to_string)
        .collect();

    let security =
        if origins.is_empty() { SecurityConfig::default() } else { SecurityConfig::production(origins) };

    ServerConfig::new(args.state_base_dir.clone())
        .with_runner_url_template(args.runner_url_template.clone())
        .with_security(security)
}

/// Access gate selected by the command line: anonymous access unless a
/// bearer credential is required.
pub fn access_gate(args: &ServeArgs) -> Arc<dyn AccessGate> {
    if !args.require_bearer_token {
        return Arc::new(AllowAll);
    }
    let projects: Vec<String> = args
        .allowed_projects
        .iter()
        .map(|p| p.trim())
        .filter(|p| !p.is_empty())
        .map(str::to_string)
        .collect();
    let gate = BearerTokenGate::new();
    if projects.is_empty() {
        Arc::new(gate)
    } else {
        Arc::new(gate.with_allowed_projects(projects))
    }
}

pub fn shutdown_grace(args: &ServeArgs) -> Duration {
    Duration::from_secs(args.shutdown_grace_secs)
}
