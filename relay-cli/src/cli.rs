use clap::{Args, Parser, Subcommand, ValueEnum};
use relay_server::config::{DEFAULT_RUNNER_URL_TEMPLATE, DEFAULT_STATE_BASE_DIR};
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(name = "agui-relay")]
#[command(about = "AG-UI event relay between clients and session runners", long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Start the relay server
    Serve(ServeArgs),
}

#[derive(Args, Debug, Clone)]
pub struct ServeArgs {
    /// Server port
    #[arg(short, long, env = "PORT", default_value_t = 8080)]
    pub port: u16,

    /// Root directory for persisted session logs
    #[arg(long, env = "STATE_BASE_DIR", default_value = DEFAULT_STATE_BASE_DIR)]
    pub state_base_dir: PathBuf,

    /// Runner address with {project} and {session} placeholders
    #[arg(long, env = "RUNNER_URL_TEMPLATE", default_value = DEFAULT_RUNNER_URL_TEMPLATE)]
    pub runner_url_template: String,

    /// Allowed CORS origins, comma separated (all origins when empty)
    #[arg(long, env = "ALLOWED_ORIGINS", value_delimiter = ',')]
    pub allowed_origins: Vec<String>,

    #[arg(long, env = "LOG_FORMAT", value_enum, default_value_t = LogFormat::Text)]
    pub log_format: LogFormat,

    /// Reject requests without an `Authorization: Bearer` credential
    #[arg(long, env = "REQUIRE_BEARER_TOKEN")]
    pub require_bearer_token: bool,

    /// Projects that may be addressed, comma separated (requires --require-bearer-token)
    #[arg(long, env = "ALLOWED_PROJECTS", value_delimiter = ',', requires = "require_bearer_token")]
    pub allowed_projects: Vec<String>,

    /// Seconds to wait for in-flight runs after a shutdown signal
    #[arg(long, env = "SHUTDOWN_GRACE_SECS", default_value_t = 30)]
    pub shutdown_grace_secs: u64,
}

#[derive(ValueEnum, Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogFormat {
    Text,
    Json,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn serve_args(args: &[&str]) -> ServeArgs {
        let cli = Cli::try_parse_from(std::iter::once("agui-relay").chain(args.iter().copied()))
            .unwrap();
        match cli.command {
            Commands::Serve(args) => args,
        }
    }

    #[test]
    fn serve_flags_are_parsed() {
        let args = serve_args(&[
            "serve",
            "--port",
            "9000",
            "--state-base-dir",
            "/tmp/state",
            "--runner-url-template",
            "http://{session}.{project}:8001/",
            "--allowed-origins",
            "https://a.example,https://b.example",
            "--log-format",
            "json",
            "--require-bearer-token",
            "--allowed-projects",
            "team-a,team-b",
            "--shutdown-grace-secs",
            "5",
        ]);

        assert_eq!(args.port, 9000);
        assert_eq!(args.state_base_dir, PathBuf::from("/tmp/state"));
        assert_eq!(args.runner_url_template, "http://{session}.{project}:8001/");
        assert_eq!(args.allowed_origins, vec!["https://a.example", "https://b.example"]);
        assert_eq!(args.log_format, LogFormat::Json);
        assert!(args.require_bearer_token);
        assert_eq!(args.allowed_projects, vec!["team-a", "team-b"]);
        assert_eq!(args.shutdown_grace_secs, 5);
    }

    #[test]
    fn access_and_shutdown_defaults() {
        let args = serve_args(&["serve"]);
        assert!(!args.require_bearer_token);
        assert!(args.allowed_projects.is_empty());
        assert_eq!(args.shutdown_grace_secs, 30);
    }

    #[test]
    fn project_allow_list_needs_the_bearer_gate() {
        let result = Cli::try_parse_from(["agui-relay", "serve", "--allowed-projects", "team-a"]);
        assert!(result.is_err());
    }

    #[test]
    fn unknown_log_format_is_rejected() {
        let result = Cli::try_parse_from(["agui-relay", "serve", "--log-format", "xml"]);
        assert!(result.is_err());
    }

    #[test]
    fn serve_is_required() {
        assert!(Cli::try_parse_from(["agui-relay"]).is_err());
    }
}
