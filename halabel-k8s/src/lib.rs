//! halabel Kubernetes Integration
//!
//! Credential discovery, a minimal pod API client, and the registration that
//! keeps pod labels in step with HA state.

pub mod client;
pub mod credentials;
pub mod error;
pub mod patch;
pub mod pod;
pub mod registration;

pub use client::K8sClient;
pub use credentials::{CredentialSource, Credentials, InClusterConfig, StaticCredentials};
pub use error::{K8sError, RegistrationError, RequestInfo};
pub use patch::{Patch, PatchOp, PatchValue};
pub use pod::{LabelContainer, Pod};
pub use registration::KubernetesRegistration;
