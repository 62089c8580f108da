use crate::cli::{LogFormat, ServeArgs};
use crate::config::{access_gate, server_config, shutdown_grace};
use anyhow::{Context, Result};
use relay_server::{Relay, create_app};
use std::net::SocketAddr;

const SERVICE_NAME: &str = "agui-relay";

/// Run the relay until Ctrl-C or SIGTERM, then give in-flight runs the
/// configured grace period to finish.
pub async fn run_serve(args: ServeArgs) -> Result<()> {
    let telemetry = match args.log_format {
        LogFormat::Text => relay_telemetry::init_telemetry(SERVICE_NAME),
        LogFormat::Json => relay_telemetry::init_json_telemetry(SERVICE_NAME),
    };
    if let Err(e) = telemetry {
        eprintln!("Failed to initialize telemetry: {}", e);
    }

    let config = server_config(&args);
    if config.security.allowed_origins.is_empty() {
        tracing::warn!("ALLOWED_ORIGINS not set, CORS allows any origin");
    }
    if args.require_bearer_token {
        tracing::info!(allowed_projects = ?args.allowed_projects, "bearer credentials required");
    }
    let relay = Relay::new(config).context("failed to build relay")?.with_gate(access_gate(&args));
    let sweep = relay.spawn_lock_sweep();
    let app = create_app(relay.clone());

    let addr = SocketAddr::from(([0, 0, 0, 0], args.port));
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("failed to bind {addr}"))?;
    tracing::info!(
        %addr,
        state_base_dir = %args.state_base_dir.display(),
        runner_url_template = %args.runner_url_template,
        "agui relay listening"
    );

    let hub = relay.hub().clone();
    axum::serve(listener, app)
        .with_graceful_shutdown(async move {
            shutdown_signal().await;
            // Tails never end on their own; close them so connections drain.
            hub.close_all();
        })
        .await
        .context("server error")?;

    let runs = relay.supervisor().active_runs();
    if !runs.is_empty() {
        tracing::info!(count = runs.len(), "waiting for in-flight runs");
    }
    relay.supervisor().shutdown_within(shutdown_grace(&args)).await;
    sweep.abort();

    tracing::info!("agui relay stopped");
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %e, "failed to listen for Ctrl+C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                tracing::error!(error = %e, "failed to listen for SIGTERM");
                std::future::pending::<()>().await;
            }
        }
    };
    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => tracing::info!("received Ctrl+C shutdown signal"),
        _ = terminate => tracing::info!("received SIGTERM shutdown signal"),
    }
}
