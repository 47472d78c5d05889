//! Configuration module for halabel
//!
//! Loaded from a YAML file. The `service_registration` section is handed to
//! the registration as a plain string map.

use std::collections::HashMap;
use std::path::Path;
use std::time::Duration;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use halabel_core::HaState;
use halabel_k8s::registration::{CONFIG_NAMESPACE, CONFIG_POD_NAME};

/// Metrics export configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MetricsConfig {
    /// Whether metrics are enabled
    #[serde(default = "default_true")]
    pub enabled: bool,

    /// Port to expose metrics on
    #[serde(default = "default_metrics_port")]
    pub port: u16,
}

impl Default for MetricsConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            port: default_metrics_port(),
        }
    }
}

/// Main configuration structure
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Parameters passed to the registration (`namespace`, `pod_name`)
    #[serde(default)]
    pub service_registration: HashMap<String, String>,

    /// HA state written when registration starts
    #[serde(default)]
    pub state: HaState,

    /// Metrics configuration
    #[serde(default)]
    pub metrics: MetricsConfig,

    /// How long to wait for the final labels on shutdown
    #[serde(with = "humantime_serde", default = "default_shutdown_timeout")]
    pub shutdown_timeout: Duration,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            service_registration: HashMap::new(),
            state: HaState::default(),
            metrics: MetricsConfig::default(),
            shutdown_timeout: default_shutdown_timeout(),
        }
    }
}

impl Config {
    /// Load configuration from a YAML file
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = std::fs::read_to_string(path.as_ref())
            .with_context(|| format!("Failed to read config file: {:?}", path.as_ref()))?;
        Self::from_yaml(&content)
    }

    /// Parse configuration from YAML string
    pub fn from_yaml(yaml: &str) -> Result<Self> {
        serde_yaml::from_str(yaml).context("Failed to parse YAML configuration")
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<()> {
        if self.metrics.enabled && self.metrics.port == 0 {
            anyhow::bail!("metrics.port must be > 0 when metrics are enabled");
        }
        if self.shutdown_timeout.is_zero() {
            anyhow::bail!("shutdown_timeout must be > 0");
        }
        Ok(())
    }

    /// Apply namespace/pod name given on the command line
    pub fn with_overrides(mut self, namespace: Option<String>, pod_name: Option<String>) -> Self {
        if let Some(namespace) = namespace {
            self.service_registration
                .insert(CONFIG_NAMESPACE.to_string(), namespace);
        }
        if let Some(pod_name) = pod_name {
            self.service_registration
                .insert(CONFIG_POD_NAME.to_string(), pod_name);
        }
        self
    }
}

// Default value functions
fn default_metrics_port() -> u16 {
    9102
}

fn default_true() -> bool {
    true
}

fn default_shutdown_timeout() -> Duration {
    Duration::from_secs(10)
}
