//! Errors returned by the Kubernetes client and the label synchronizer

use std::fmt;

use thiserror::Error;

/// Sanitized description of a failed exchange.
///
/// Never carries headers, so the bearer token cannot leak into logs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RequestInfo {
    pub method: String,
    pub url: String,
    pub status: u16,
    pub body: String,
}

impl fmt::Display for RequestInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "method: {}, url: {}, statuscode: {}, body: {}",
            self.method, self.url, self.status, self.body
        )
    }
}

/// Errors from credential loading and API requests
#[derive(Debug, Error)]
pub enum K8sError {
    /// The API server answered 404
    #[error("not found")]
    NotFound,

    /// In-cluster configuration is unavailable
    #[error("unable to load in-cluster configuration: {reason}")]
    NotInCluster { reason: String },

    /// Still unauthorized after reloading credentials
    #[error("unexpected status code after credential reload: {0}")]
    AuthRetryExhausted(RequestInfo),

    /// Any other non-success status
    #[error("unexpected status code: {0}")]
    UnexpectedStatus(RequestInfo),

    /// The response body did not have the expected shape
    #[error("unable to read as {target}: {info}")]
    Decode {
        target: &'static str,
        info: RequestInfo,
    },

    /// The CA bundle could not be turned into a TLS trust store
    #[error("invalid CA bundle: {reason}")]
    InvalidCaBundle { reason: String },

    /// A namespace or pod name that cannot be a path segment
    #[error("invalid {kind} name {value:?}")]
    InvalidName { kind: &'static str, value: String },

    /// The request never produced a response
    #[error("request failed: {0}")]
    Transport(#[from] reqwest::Error),

    /// A request body could not be serialized
    #[error("unable to encode request body: {0}")]
    Encode(#[from] serde_json::Error),
}

impl K8sError {
    pub(crate) fn not_in_cluster(reason: impl Into<String>) -> Self {
        K8sError::NotInCluster {
            reason: reason.into(),
        }
    }
}

/// Errors from constructing or driving a registration
#[derive(Debug, Error)]
pub enum RegistrationError {
    /// A required parameter is absent from both the environment and config
    #[error("{parameter} must be provided via {env_var:?} or the {config_key:?} config parameter")]
    MissingConfig {
        parameter: &'static str,
        env_var: &'static str,
        config_key: &'static str,
    },

    /// The pod metadata cannot hold labels
    #[error("pod name {pod:?} in namespace {namespace:?} cannot be labeled: {reason}")]
    MetadataShape {
        namespace: String,
        pod: String,
        reason: String,
    },

    /// A Kubernetes API call failed
    #[error(transparent)]
    Client(#[from] K8sError),
}
