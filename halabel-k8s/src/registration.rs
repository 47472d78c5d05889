//! Pod label synchronization
//!
//! Mirrors the HA state of the process onto the labels of the pod it runs in.
//! Nothing is tracked locally: the pod's labels are the only record of state.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, error, info};

use halabel_core::labels::{bool_label_value, HaField};
use halabel_core::metrics::MetricsRegistry;
use halabel_core::registration::ServiceRegistration;
use halabel_core::state::HaState;

use crate::client::K8sClient;
use crate::error::{K8sError, RegistrationError};
use crate::patch::Patch;
use crate::pod::LabelContainer;

/// Environment variable naming the pod's namespace
pub const ENV_NAMESPACE: &str = "VAULT_K8S_NAMESPACE";

/// Environment variable naming the pod
pub const ENV_POD_NAME: &str = "VAULT_K8S_POD_NAME";

/// Config key for the namespace
pub const CONFIG_NAMESPACE: &str = "namespace";

/// Config key for the pod name
pub const CONFIG_POD_NAME: &str = "pod_name";

/// Registration of one pod.
///
/// Cheap to clone; clones share the client and may notify concurrently.
#[derive(Clone)]
pub struct KubernetesRegistration {
    client: Arc<K8sClient>,
    namespace: String,
    pod_name: String,
    metrics: MetricsRegistry,
}

impl KubernetesRegistration {
    /// Start registration using in-cluster credentials.
    ///
    /// See [`KubernetesRegistration::with_client`].
    pub async fn new(
        shutdown: watch::Receiver<bool>,
        config: &HashMap<String, String>,
        state: &HaState,
    ) -> Result<(Self, JoinHandle<()>), RegistrationError> {
        let client = K8sClient::new().await?;
        Self::with_client(Arc::new(client), shutdown, config, state).await
    }

    /// Start registration with an existing client.
    ///
    /// Verifies the pod exists, creates missing metadata/labels containers,
    /// then writes all five labels from `state` in a single patch. The
    /// returned task waits for `shutdown` to turn `true` (or its sender to be
    /// dropped) and leaves the pod marked as sealed and inactive; the host
    /// should await it before exiting.
    pub async fn with_client(
        client: Arc<K8sClient>,
        shutdown: watch::Receiver<bool>,
        config: &HashMap<String, String>,
        state: &HaState,
    ) -> Result<(Self, JoinHandle<()>), RegistrationError> {
        let env = |name: &str| std::env::var(name).ok();
        let namespace =
            resolve_parameter("namespace", ENV_NAMESPACE, CONFIG_NAMESPACE, config, env)?;
        debug!(namespace = %namespace, "Resolved namespace");
        let pod_name = resolve_parameter("pod name", ENV_POD_NAME, CONFIG_POD_NAME, config, env)?;
        debug!(pod = %pod_name, "Resolved pod name");

        let registration = Self {
            client,
            namespace,
            pod_name,
            metrics: MetricsRegistry::new(),
        };

        registration.reconcile_metadata().await?;
        registration.apply_initial_labels(state).await?;

        let finalizer = tokio::spawn(registration.clone().on_shutdown(shutdown));

        info!(
            namespace = %registration.namespace,
            pod = %registration.pod_name,
            version = %state.version,
            "Service registration started"
        );
        Ok((registration, finalizer))
    }

    pub fn namespace(&self) -> &str {
        &self.namespace
    }

    pub fn pod_name(&self) -> &str {
        &self.pod_name
    }

    /// Make sure `/metadata/labels` exists so label paths can be added.
    ///
    /// A JSON-Patch `add` fails when the parent does not exist, so the
    /// containers are created one level at a time.
    async fn reconcile_metadata(&self) -> Result<(), RegistrationError> {
        let pod = self.client.get_pod(&self.namespace, &self.pod_name).await?;

        match pod.label_container() {
            LabelContainer::Present => {}
            LabelContainer::MissingMetadata => {
                info!(pod = %self.pod_name, "Pod has no metadata, creating it");
                self.patch(&[Patch::create_metadata()]).await?;
                self.patch(&[Patch::create_labels()]).await?;
            }
            LabelContainer::MissingLabels => {
                info!(pod = %self.pod_name, "Pod has no labels, creating them");
                self.patch(&[Patch::create_labels()]).await?;
            }
            LabelContainer::Invalid(reason) => {
                return Err(RegistrationError::MetadataShape {
                    namespace: self.namespace.clone(),
                    pod: self.pod_name.clone(),
                    reason,
                })
            }
        }
        Ok(())
    }

    async fn apply_initial_labels(&self, state: &HaState) -> Result<(), K8sError> {
        let patches: Vec<Patch> = state
            .labels()
            .into_iter()
            .map(|(key, value)| Patch::add_label(key, value))
            .collect();
        self.patch(&patches).await
    }

    /// Set one boolean label
    async fn set_field(&self, field: HaField, value: bool) -> Result<(), K8sError> {
        let label = field.label();
        let result = self
            .patch(&[Patch::add_label(label, bool_label_value(value))])
            .await;

        match &result {
            Ok(()) => {
                self.metrics.inc_label_update(label);
                debug!(label = label, value = value, "Label updated");
            }
            Err(_) => self.metrics.inc_label_update_failure(label),
        }
        result
    }

    async fn patch(&self, patches: &[Patch]) -> Result<(), K8sError> {
        self.client
            .patch_pod(&self.namespace, &self.pod_name, patches)
            .await
    }

    async fn on_shutdown(self, mut shutdown: watch::Receiver<bool>) {
        // A dropped sender means the host is gone, which is also a shutdown.
        let _ = shutdown.wait_for(|stop| *stop).await;
        self.finalize().await;
    }

    /// Leave the labels in their post-shutdown state. Failures are only
    /// logged: the process is exiting.
    async fn finalize(&self) {
        let patches: Vec<Patch> = HaState::quiescent()
            .field_labels()
            .into_iter()
            .map(|(field, value)| Patch::add_label(field.label(), value))
            .collect();

        match self.patch(&patches).await {
            Ok(()) => info!(
                namespace = %self.namespace,
                pod = %self.pod_name,
                "Set final labels on shutdown"
            ),
            Err(e) => error!(
                namespace = %self.namespace,
                pod = %self.pod_name,
                error = %e,
                "Unable to set final labels on shutdown"
            ),
        }
    }
}

#[async_trait]
impl ServiceRegistration for KubernetesRegistration {
    type Error = K8sError;

    async fn notify_active_state_change(&self, is_active: bool) -> Result<(), K8sError> {
        self.set_field(HaField::Active, is_active).await
    }

    async fn notify_sealed_state_change(&self, is_sealed: bool) -> Result<(), K8sError> {
        self.set_field(HaField::Sealed, is_sealed).await
    }

    async fn notify_performance_standby_state_change(
        &self,
        is_standby: bool,
    ) -> Result<(), K8sError> {
        self.set_field(HaField::PerformanceStandby, is_standby).await
    }

    async fn notify_initialized_state_change(&self, is_initialized: bool) -> Result<(), K8sError> {
        self.set_field(HaField::Initialized, is_initialized).await
    }
}

/// Environment first, then config. Empty values count as unset.
fn resolve_parameter(
    parameter: &'static str,
    env_var: &'static str,
    config_key: &'static str,
    config: &HashMap<String, String>,
    env: impl Fn(&str) -> Option<String>,
) -> Result<String, RegistrationError> {
    env(env_var)
        .filter(|v| !v.is_empty())
        .or_else(|| config.get(config_key).filter(|v| !v.is_empty()).cloned())
        .ok_or(RegistrationError::MissingConfig {
            parameter,
            env_var,
            config_key,
        })
}
