//! CLI argument parsing for halabel

use std::path::PathBuf;

use clap::Parser;

/// Keeps a pod's labels in sync with the HA state of the process it hosts
#[derive(Debug, Parser)]
#[command(name = "halabel")]
#[command(version, about, long_about = None)]
pub struct Cli {
    /// Path to configuration file
    #[arg(short, long, default_value = "/etc/halabel/config.yaml")]
    pub config: PathBuf,

    /// Namespace of the pod (overrides the config file)
    #[arg(long)]
    pub namespace: Option<String>,

    /// Name of the pod (overrides the config file)
    #[arg(long)]
    pub pod_name: Option<String>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, default_value = "info", env = "HALABEL_LOG_LEVEL")]
    pub log_level: String,

    /// Output logs in JSON format
    #[arg(long, default_value = "false", env = "HALABEL_LOG_JSON")]
    pub log_json: bool,

    /// Read `<field>=<bool>` state change events from stdin
    #[arg(long)]
    pub stdin_events: bool,

    /// API server URL; skips in-cluster credential discovery
    #[arg(long, env = "HALABEL_API_SERVER", requires = "token")]
    pub api_server: Option<String>,

    /// Bearer token used with --api-server
    #[arg(long, env = "HALABEL_TOKEN", requires = "api_server", hide_env_values = true)]
    pub token: Option<String>,

    /// PEM CA bundle used with --api-server
    #[arg(long, requires = "api_server")]
    pub ca_file: Option<PathBuf>,
}

impl Cli {
    /// Parse CLI arguments
    pub fn parse_args() -> Self {
        Self::parse()
    }
}
