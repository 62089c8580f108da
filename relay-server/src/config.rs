use relay_core::{RelayError, Result};
use relay_store::{DEFAULT_LOCK_IDLE_AGE, DEFAULT_SWEEP_INTERVAL};
use std::{path::PathBuf, time::Duration};

/// Upstream address used when none is configured. The operator exposes each
/// session's runner as a service named after the session in the project
/// namespace.
pub const DEFAULT_RUNNER_URL_TEMPLATE: &str =
    "http://session-{session}.{project}.svc.cluster.local:8001/";

pub const DEFAULT_STATE_BASE_DIR: &str = "/workspace";

/// Security configuration for the relay.
#[derive(Clone, Debug)]
pub struct SecurityConfig {
    /// Allowed origins for CORS (empty = allow all, which is NOT recommended for production)
    pub allowed_origins: Vec<String>,
    /// Maximum request body size in bytes (default: 10MB)
    pub max_body_size: usize,
    /// Timeout for the JSON endpoints (default: 30 seconds). Never applied to the event tail.
    pub request_timeout: Duration,
    /// Whether to include detailed error messages in responses (default: false for production)
    pub expose_error_details: bool,
}

impl Default for SecurityConfig {
    fn default() -> Self {
        Self {
            allowed_origins: Vec::new(),
            max_body_size: 10 * 1024 * 1024,
            request_timeout: Duration::from_secs(30),
            expose_error_details: false,
        }
    }
}

impl SecurityConfig {
    /// Create a development configuration (permissive CORS, detailed errors)
    pub fn development() -> Self {
        Self {
            allowed_origins: Vec::new(),
            max_body_size: 10 * 1024 * 1024,
            request_timeout: Duration::from_secs(60),
            expose_error_details: true,
        }
    }

    /// Create a production configuration with specific allowed origins
    pub fn production(allowed_origins: Vec<String>) -> Self {
        Self { allowed_origins, ..Self::default() }
    }
}

/// Settings for clients tailing a session.
#[derive(Clone, Debug)]
pub struct TailConfig {
    /// Period of the `: heartbeat` comment sent on idle connections.
    pub heartbeat_interval: Duration,
    /// Lines buffered per subscriber before live lines are dropped for it.
    pub subscriber_buffer: usize,
}

impl Default for TailConfig {
    fn default() -> Self {
        Self { heartbeat_interval: Duration::from_secs(15), subscriber_buffer: 256 }
    }
}

/// How the relay connects to a session's runner for streaming runs.
#[derive(Clone, Debug)]
pub struct ConnectPolicy {
    pub max_attempts: u32,
    /// Pause before retrying a refused connection.
    pub retry_delay: Duration,
    /// Maximum wait for the runner's response headers.
    pub header_timeout: Duration,
    pub pool_idle_timeout: Duration,
}

impl Default for ConnectPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 2,
            retry_delay: Duration::from_secs(1),
            header_timeout: Duration::from_secs(30),
            pool_idle_timeout: Duration::from_secs(5 * 60),
        }
    }
}

impl ConnectPolicy {
    #[must_use]
    pub fn with_max_attempts(mut self, max_attempts: u32) -> Self {
        self.max_attempts = max_attempts.max(1);
        self
    }

    #[must_use]
    pub fn with_retry_delay(mut self, retry_delay: Duration) -> Self {
        self.retry_delay = retry_delay;
        self
    }

    #[must_use]
    pub fn with_header_timeout(mut self, header_timeout: Duration) -> Self {
        self.header_timeout = header_timeout;
        self
    }
}

/// Configuration for the relay server.
#[derive(Clone, Debug)]
pub struct ServerConfig {
    /// Root under which `sessions/<key>/agui-events.jsonl` logs live.
    pub state_base_dir: PathBuf,
    /// Runner address with `{project}` and `{session}` placeholders.
    pub runner_url_template: String,
    pub security: SecurityConfig,
    pub tail: TailConfig,
    pub connect: ConnectPolicy,
    /// Timeout for interrupt, feedback, capabilities and status calls.
    pub control_timeout: Duration,
    pub lock_idle_age: Duration,
    pub lock_sweep_interval: Duration,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self::new(DEFAULT_STATE_BASE_DIR)
    }
}

impl ServerConfig {
    pub fn new(state_base_dir: impl Into<PathBuf>) -> Self {
        Self {
            state_base_dir: state_base_dir.into(),
            runner_url_template: DEFAULT_RUNNER_URL_TEMPLATE.to_string(),
            security: SecurityConfig::default(),
            tail: TailConfig::default(),
            connect: ConnectPolicy::default(),
            control_timeout: Duration::from_secs(10),
            lock_idle_age: DEFAULT_LOCK_IDLE_AGE,
            lock_sweep_interval: DEFAULT_SWEEP_INTERVAL,
        }
    }

    pub fn with_runner_url_template(mut self, template: impl Into<String>) -> Self {
        self.runner_url_template = template.into();
        self
    }

    pub fn with_security(mut self, security: SecurityConfig) -> Self {
        self.security = security;
        self
    }

    pub fn with_tail(mut self, tail: TailConfig) -> Self {
        self.tail = tail;
        self
    }

    pub fn with_heartbeat_interval(mut self, interval: Duration) -> Self {
        self.tail.heartbeat_interval = interval;
        self
    }

    pub fn with_connect_policy(mut self, connect: ConnectPolicy) -> Self {
        self.connect = connect;
        self
    }

    pub fn with_control_timeout(mut self, timeout: Duration) -> Self {
        self.control_timeout = timeout;
        self
    }

    pub fn with_lock_eviction(mut self, idle_age: Duration, sweep_interval: Duration) -> Self {
        self.lock_idle_age = idle_age;
        self.lock_sweep_interval = sweep_interval;
        self
    }

    /// Configure allowed CORS origins
    pub fn with_allowed_origins(mut self, origins: Vec<String>) -> Self {
        self.security.allowed_origins = origins;
        self
    }

    /// Configure maximum request body size
    pub fn with_max_body_size(mut self, size: usize) -> Self {
        self.security.max_body_size = size;
        self
    }

    /// Configure request timeout
    pub fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.security.request_timeout = timeout;
        self
    }

    /// Enable detailed error messages (for development only)
    pub fn with_error_details(mut self, expose: bool) -> Self {
        self.security.expose_error_details = expose;
        self
    }

    /// Base address of the runner serving `session` in `project`. Both names
    /// must already have passed [`validate_resource_name`].
    pub fn runner_url(&self, project: &str, session: &str) -> String {
        self.runner_url_template.replace("{project}", project).replace("{session}", session)
    }

    /// Address of a runner control endpoint, e.g. `interrupt` or `mcp/status`.
    pub fn runner_endpoint(&self, project: &str, session: &str, path: &str) -> String {
        let base = self.runner_url(project, session);
        format!("{}/{}", base.trim_end_matches('/'), path.trim_start_matches('/'))
    }
}

/// Longest name a DNS label (and so a runner host segment) can carry.
pub const MAX_RESOURCE_NAME_LEN: usize = 63;

/// Accept only DNS-label names for projects and sessions: lowercase ASCII
/// letters, digits and inner dashes, at most 63 characters.
///
/// Both names are spliced into the runner host, so anything else could
/// redirect the upstream request.
pub fn validate_resource_name(name: &str) -> Result<()> {
    let valid = !name.is_empty()
        && name.len() <= MAX_RESOURCE_NAME_LEN
        && !name.starts_with('-')
        && !name.ends_with('-')
        && name.bytes().all(|b| b.is_ascii_lowercase() || b.is_ascii_digit() || b == b'-');
    if !valid {
        return Err(RelayError::InvalidSessionKey(name.to_string()));
    }
    Ok(())
}
