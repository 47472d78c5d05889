//! Kubernetes API client
//!
//! A minimal client for the two calls label synchronization needs: reading a
//! pod and JSON-patching it. Requests authenticate with the current credential
//! snapshot; when the API server rejects it with 401/403 the snapshot is
//! reloaded from its source and the request is sent exactly once more.

use std::sync::Arc;

use parking_lot::RwLock;
use reqwest::header::{ACCEPT, CONTENT_TYPE};
use reqwest::{Method, Response, StatusCode};
use serde::de::DeserializeOwned;
use tracing::{debug, info, warn};

use halabel_core::metrics::MetricsRegistry;

use crate::credentials::{CredentialSource, Credentials, InClusterConfig};
use crate::error::{K8sError, RequestInfo};
use crate::patch::Patch;
use crate::pod::Pod;

const JSON_PATCH_CONTENT_TYPE: &str = "application/json-patch+json";

/// Credential snapshot plus the HTTP client that trusts its CA bundle.
/// Swapped as a unit on reload.
struct Session {
    credentials: Credentials,
    http: reqwest::Client,
}

impl Session {
    fn new(credentials: Credentials) -> Result<Self, K8sError> {
        let mut builder = reqwest::Client::builder();

        if let Some(pem) = credentials.ca_bundle() {
            let certs = reqwest::Certificate::from_pem_bundle(pem).map_err(|e| {
                K8sError::InvalidCaBundle {
                    reason: e.to_string(),
                }
            })?;
            // Built-in roots are off, so an empty bundle would trust nothing.
            if certs.is_empty() {
                return Err(K8sError::InvalidCaBundle {
                    reason: "no PEM certificates found".to_string(),
                });
            }
            builder = builder.tls_built_in_root_certs(false);
            for cert in certs {
                builder = builder.add_root_certificate(cert);
            }
        }

        Ok(Self {
            credentials,
            http: builder.build()?,
        })
    }
}

/// Everything needed to send, and resend, one request
struct ApiRequest {
    method: Method,
    path: String,
    body: Option<Vec<u8>>,
    content_type: Option<&'static str>,
}

/// Kubernetes client wrapper
pub struct K8sClient {
    source: Arc<dyn CredentialSource>,
    session: RwLock<Arc<Session>>,
    metrics: MetricsRegistry,
}

impl K8sClient {
    /// Create a new K8s client using in-cluster config
    pub async fn new() -> Result<Self, K8sError> {
        Self::with_source(Arc::new(InClusterConfig::default())).await
    }

    /// Create a new K8s client whose credentials come from `source`
    pub async fn with_source(source: Arc<dyn CredentialSource>) -> Result<Self, K8sError> {
        let session = Session::new(source.load().await?)?;
        info!(
            api_server = %session.credentials.api_server(),
            "Configured Kubernetes API client"
        );

        Ok(Self {
            source,
            session: RwLock::new(Arc::new(session)),
            metrics: MetricsRegistry::new(),
        })
    }

    /// Base URL of the API server currently in use
    pub fn api_server(&self) -> String {
        self.session().credentials.api_server().to_string()
    }

    /// Get a pod. Fails with [`K8sError::NotFound`] if it does not exist.
    pub async fn get_pod(&self, namespace: &str, pod_name: &str) -> Result<Pod, K8sError> {
        let request = ApiRequest {
            method: Method::GET,
            path: pod_path(namespace, pod_name)?,
            body: None,
            content_type: None,
        };

        let response = self.execute(&request).await?;
        self.decode(&request, response).await
    }

    /// Apply `patches` to a pod as one JSON-Patch document.
    ///
    /// The document is applied atomically by the API server. An empty slice
    /// sends nothing.
    pub async fn patch_pod(
        &self,
        namespace: &str,
        pod_name: &str,
        patches: &[Patch],
    ) -> Result<(), K8sError> {
        if patches.is_empty() {
            return Ok(());
        }

        let request = ApiRequest {
            method: Method::PATCH,
            path: pod_path(namespace, pod_name)?,
            body: Some(serde_json::to_vec(patches)?),
            content_type: Some(JSON_PATCH_CONTENT_TYPE),
        };

        self.execute(&request).await?;
        debug!(
            namespace = namespace,
            pod = pod_name,
            operations = patches.len(),
            "Patched pod"
        );
        Ok(())
    }

    fn session(&self) -> Arc<Session> {
        self.session.read().clone()
    }

    /// Load a fresh snapshot and make it current
    async fn reload_credentials(&self) -> Result<(), K8sError> {
        let session = Session::new(self.source.load().await?)?;
        *self.session.write() = Arc::new(session);
        self.metrics.inc_credential_reload();
        info!("Reloaded Kubernetes credentials");
        Ok(())
    }

    /// Send a request, retrying once with reloaded credentials on 401/403.
    /// Returns the response only for 200, 201 and 202.
    async fn execute(&self, request: &ApiRequest) -> Result<Response, K8sError> {
        let mut reloaded = false;

        loop {
            let session = self.session();
            let response = self.send(&session, request).await?;
            let status = response.status();

            match status {
                StatusCode::OK | StatusCode::CREATED | StatusCode::ACCEPTED => {
                    return Ok(response)
                }
                StatusCode::NOT_FOUND => return Err(K8sError::NotFound),
                StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN if !reloaded => {
                    warn!(
                        method = %request.method,
                        path = %request.path,
                        status = status.as_u16(),
                        "Request rejected, reloading credentials"
                    );
                    self.reload_credentials().await?;
                    reloaded = true;
                }
                StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => {
                    let info = sanitized_debugging_info(request, response).await;
                    return Err(K8sError::AuthRetryExhausted(info));
                }
                _ => {
                    let info = sanitized_debugging_info(request, response).await;
                    return Err(K8sError::UnexpectedStatus(info));
                }
            }
        }
    }

    async fn send(&self, session: &Session, request: &ApiRequest) -> Result<Response, K8sError> {
        let url = format!("{}{}", session.credentials.api_server(), request.path);

        let mut builder = session
            .http
            .request(request.method.clone(), &url)
            .bearer_auth(session.credentials.bearer_token())
            .header(ACCEPT, "application/json");
        if let Some(content_type) = request.content_type {
            builder = builder.header(CONTENT_TYPE, content_type);
        }
        if let Some(body) = &request.body {
            builder = builder.body(body.clone());
        }

        match builder.send().await {
            Ok(response) => {
                self.metrics
                    .inc_api_request(request.method.as_str(), response.status().as_str());
                Ok(response)
            }
            Err(e) => {
                self.metrics.inc_api_request(request.method.as_str(), "error");
                Err(e.into())
            }
        }
    }

    async fn decode<T: DeserializeOwned>(
        &self,
        request: &ApiRequest,
        response: Response,
    ) -> Result<T, K8sError> {
        let url = response.url().to_string();
        let status = response.status().as_u16();
        let body = response.bytes().await?;

        serde_json::from_slice(&body).map_err(|_| K8sError::Decode {
            target: std::any::type_name::<T>(),
            info: RequestInfo {
                method: request.method.to_string(),
                url,
                status,
                body: String::from_utf8_lossy(&body).into_owned(),
            },
        })
    }
}

/// Describe a failed exchange without headers, so the bearer token never
/// ends up in an error message.
async fn sanitized_debugging_info(request: &ApiRequest, response: Response) -> RequestInfo {
    let url = response.url().to_string();
    let status = response.status().as_u16();
    // An unreadable body is reported as empty.
    let body = response.text().await.unwrap_or_default();

    RequestInfo {
        method: request.method.to_string(),
        url,
        status,
        body,
    }
}

fn pod_path(namespace: &str, pod_name: &str) -> Result<String, K8sError> {
    validate_name("namespace", namespace)?;
    validate_name("pod", pod_name)?;
    Ok(format!("/api/v1/namespaces/{}/pods/{}", namespace, pod_name))
}

/// Namespaces and pod names are DNS names: lowercase alphanumerics, `-` and
/// `.`. Anything else could change the request target.
fn validate_name(kind: &'static str, value: &str) -> Result<(), K8sError> {
    let valid = !value.is_empty()
        && value.len() <= 253
        && value
            .bytes()
            .all(|b| b.is_ascii_lowercase() || b.is_ascii_digit() || b == b'-' || b == b'.');
    if valid {
        Ok(())
    } else {
        Err(K8sError::InvalidName {
            kind,
            value: value.to_string(),
        })
    }
}
