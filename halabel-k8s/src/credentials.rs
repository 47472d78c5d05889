//! In-cluster credential discovery
//!
//! A pod reaches the API server with the service-account token and CA bundle
//! mounted by the kubelet, at the address injected through
//! `KUBERNETES_SERVICE_HOST` / `KUBERNETES_SERVICE_PORT`.

use std::fmt;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use tracing::debug;

use crate::error::K8sError;

/// Path to the mounted service-account token
pub const TOKEN_PATH: &str = "/var/run/secrets/kubernetes.io/serviceaccount/token";

/// Path to the mounted in-cluster CA bundle
pub const CA_CERT_PATH: &str = "/var/run/secrets/kubernetes.io/serviceaccount/ca.crt";

/// Environment variable carrying the API server host
pub const ENV_SERVICE_HOST: &str = "KUBERNETES_SERVICE_HOST";

/// Environment variable carrying the API server port
pub const ENV_SERVICE_PORT: &str = "KUBERNETES_SERVICE_PORT";

/// Immutable credential snapshot.
///
/// A refresh produces a new snapshot; an existing one is never mutated.
#[derive(Clone, PartialEq, Eq)]
pub struct Credentials {
    api_server: String,
    bearer_token: String,
    ca_bundle: Option<Vec<u8>>,
}

impl Credentials {
    /// Create a snapshot. `ca_bundle` is PEM; `None` keeps the TLS client's
    /// built-in roots (only useful out of cluster).
    pub fn new(
        api_server: impl Into<String>,
        bearer_token: impl Into<String>,
        ca_bundle: Option<Vec<u8>>,
    ) -> Self {
        Self {
            api_server: api_server.into().trim_end_matches('/').to_string(),
            bearer_token: bearer_token.into(),
            ca_bundle,
        }
    }

    /// Base URL of the API server, without a trailing slash
    pub fn api_server(&self) -> &str {
        &self.api_server
    }

    pub fn bearer_token(&self) -> &str {
        &self.bearer_token
    }

    pub fn ca_bundle(&self) -> Option<&[u8]> {
        self.ca_bundle.as_deref()
    }
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("api_server", &self.api_server)
            .field("bearer_token", &"<redacted>")
            .field("ca_bundle", &self.ca_bundle.as_ref().map(|b| b.len()))
            .finish()
    }
}

/// Produces credential snapshots. Called once when a client is built and
/// again every time the API server rejects the current token.
#[async_trait]
pub trait CredentialSource: Send + Sync {
    async fn load(&self) -> Result<Credentials, K8sError>;
}

/// Loads credentials from the pod's service-account mount
#[derive(Debug, Clone)]
pub struct InClusterConfig {
    token_path: PathBuf,
    ca_path: PathBuf,
    host_env: String,
    port_env: String,
}

impl Default for InClusterConfig {
    fn default() -> Self {
        Self {
            token_path: PathBuf::from(TOKEN_PATH),
            ca_path: PathBuf::from(CA_CERT_PATH),
            host_env: ENV_SERVICE_HOST.to_string(),
            port_env: ENV_SERVICE_PORT.to_string(),
        }
    }
}

impl InClusterConfig {
    pub fn new() -> Self {
        Self::default()
    }

    /// Read the token from another file
    pub fn with_token_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.token_path = path.into();
        self
    }

    /// Read the CA bundle from another file
    pub fn with_ca_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.ca_path = path.into();
        self
    }

    /// Read the API server address from other environment variables
    pub fn with_env_vars(mut self, host: impl Into<String>, port: impl Into<String>) -> Self {
        self.host_env = host.into();
        self.port_env = port.into();
        self
    }

    fn env(&self, name: &str) -> Result<String, K8sError> {
        match std::env::var(name) {
            Ok(value) if !value.is_empty() => Ok(value),
            _ => Err(K8sError::not_in_cluster(format!(
                "{} and {} must be defined",
                self.host_env, self.port_env
            ))),
        }
    }
}

async fn read_file(path: &Path, what: &str) -> Result<Vec<u8>, K8sError> {
    tokio::fs::read(path).await.map_err(|e| {
        K8sError::not_in_cluster(format!("failed to read {} {}: {}", what, path.display(), e))
    })
}

#[async_trait]
impl CredentialSource for InClusterConfig {
    async fn load(&self) -> Result<Credentials, K8sError> {
        let host = self.env(&self.host_env)?;
        let port = self.env(&self.port_env)?;

        let token = read_file(&self.token_path, "service account token").await?;
        let token = String::from_utf8(token).map_err(|_| {
            K8sError::not_in_cluster(format!(
                "service account token {} is not valid UTF-8",
                self.token_path.display()
            ))
        })?;
        let ca_bundle = read_file(&self.ca_path, "CA bundle").await?;

        let api_server = api_server_url(&host, &port);
        debug!(api_server = %api_server, "Loaded in-cluster credentials");

        Ok(Credentials::new(
            api_server,
            token.trim().to_string(),
            Some(ca_bundle),
        ))
    }
}

/// Always returns the same snapshot
#[derive(Debug, Clone)]
pub struct StaticCredentials {
    credentials: Credentials,
}

impl StaticCredentials {
    pub fn new(credentials: Credentials) -> Self {
        Self { credentials }
    }
}

#[async_trait]
impl CredentialSource for StaticCredentials {
    async fn load(&self) -> Result<Credentials, K8sError> {
        Ok(self.credentials.clone())
    }
}

/// Join host and port into an https base URL, bracketing IPv6 literals
fn api_server_url(host: &str, port: &str) -> String {
    if host.contains(':') && !host.starts_with('[') {
        format!("https://[{}]:{}", host, port)
    } else {
        format!("https://{}:{}", host, port)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    struct Fixture {
        _dir: TempDir,
        config: InClusterConfig,
    }

    // Each test uses its own variable names so tests can run in parallel.
    fn fixture(prefix: &str, write_token: bool) -> Fixture {
        let dir = TempDir::new().unwrap();
        let token_path = dir.path().join("token");
        let ca_path = dir.path().join("ca.crt");
        if write_token {
            std::fs::write(&token_path, "abc.def.ghi\n").unwrap();
        }
        std::fs::write(&ca_path, "-----BEGIN CERTIFICATE-----\n").unwrap();

        let config = InClusterConfig::new()
            .with_token_path(token_path)
            .with_ca_path(ca_path)
            .with_env_vars(format!("{}_HOST", prefix), format!("{}_PORT", prefix));
        Fixture { _dir: dir, config }
    }

    #[tokio::test]
    async fn test_load() {
        let fx = fixture("HALABEL_TEST_LOAD", true);
        std::env::set_var("HALABEL_TEST_LOAD_HOST", "10.96.0.1");
        std::env::set_var("HALABEL_TEST_LOAD_PORT", "443");

        let creds = fx.config.load().await.unwrap();
        assert_eq!(creds.api_server(), "https://10.96.0.1:443");
        assert_eq!(creds.bearer_token(), "abc.def.ghi");
        assert_eq!(creds.ca_bundle(), Some(&b"-----BEGIN CERTIFICATE-----\n"[..]));
    }

    #[tokio::test]
    async fn test_missing_env_is_not_in_cluster() {
        let fx = fixture("HALABEL_TEST_NOENV", true);
        std::env::set_var("HALABEL_TEST_NOENV_HOST", "10.96.0.1");

        let err = fx.config.load().await.unwrap_err();
        assert!(matches!(err, K8sError::NotInCluster { .. }));
        assert!(err.to_string().contains("HALABEL_TEST_NOENV_PORT"));
    }

    #[tokio::test]
    async fn test_empty_env_is_not_in_cluster() {
        let fx = fixture("HALABEL_TEST_EMPTYENV", true);
        std::env::set_var("HALABEL_TEST_EMPTYENV_HOST", "");
        std::env::set_var("HALABEL_TEST_EMPTYENV_PORT", "443");

        let err = fx.config.load().await.unwrap_err();
        assert!(matches!(err, K8sError::NotInCluster { .. }));
    }

    #[tokio::test]
    async fn test_missing_token_is_not_in_cluster() {
        let fx = fixture("HALABEL_TEST_NOTOKEN", false);
        std::env::set_var("HALABEL_TEST_NOTOKEN_HOST", "10.96.0.1");
        std::env::set_var("HALABEL_TEST_NOTOKEN_PORT", "443");

        let err = fx.config.load().await.unwrap_err();
        assert!(matches!(err, K8sError::NotInCluster { .. }));
        assert!(err.to_string().contains("service account token"));
    }

    #[test]
    fn test_api_server_url() {
        assert_eq!(api_server_url("10.0.0.1", "6443"), "https://10.0.0.1:6443");
        assert_eq!(api_server_url("fd00::1", "443"), "https://[fd00::1]:443");
        assert_eq!(api_server_url("[fd00::1]", "443"), "https://[fd00::1]:443");
    }

    #[test]
    fn test_debug_redacts_token() {
        let creds = Credentials::new("https://k8s:443/", "secret-token", None);
        let rendered = format!("{:?}", creds);
        assert!(!rendered.contains("secret-token"));
        assert_eq!(creds.api_server(), "https://k8s:443");
    }
}
