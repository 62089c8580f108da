//! Telemetry initialization and configuration

use std::sync::Once;
use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

static INIT: Once = Once::new();

/// Directive used when `RUST_LOG` is unset or unparsable.
pub const DEFAULT_FILTER: &str = "info";

fn env_filter() -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_FILTER))
}

/// Initialize console logging in human-readable form.
///
/// Safe to call more than once; only the first call installs a subscriber.
///
/// # Example
/// ```
/// use relay_telemetry::init_telemetry;
/// init_telemetry("agui-relay").expect("Failed to initialize telemetry");
/// ```
pub fn init_telemetry(service_name: &str) -> Result<(), Box<dyn std::error::Error>> {
    INIT.call_once(|| {
        let installed = tracing_subscriber::registry()
            .with(env_filter())
            .with(
                tracing_subscriber::fmt::layer()
                    .with_target(true)
                    .with_thread_ids(true)
                    .with_line_number(true),
            )
            .try_init();

        if installed.is_ok() {
            tracing::info!(service.name = service_name, "Telemetry initialized");
        }
    });

    Ok(())
}

/// Initialize console logging as one JSON object per line, for log shippers.
///
/// Shares the once-only guard with [`init_telemetry`]; whichever runs first
/// wins.
pub fn init_json_telemetry(service_name: &str) -> Result<(), Box<dyn std::error::Error>> {
    INIT.call_once(|| {
        let installed = tracing_subscriber::registry()
            .with(env_filter())
            .with(
                tracing_subscriber::fmt::layer()
                    .json()
                    .with_current_span(true)
                    .with_target(true)
                    .with_thread_ids(true),
            )
            .try_init();

        if installed.is_ok() {
            tracing::info!(service.name = service_name, format = "json", "Telemetry initialized");
        }
    });

    Ok(())
}
