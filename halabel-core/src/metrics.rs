//! Prometheus metrics for halabel

use once_cell::sync::Lazy;
use prometheus::{opts, register_int_counter, register_int_counter_vec, IntCounter, IntCounterVec};

/// Kubernetes API requests by method and response code
static API_REQUESTS: Lazy<IntCounterVec> = Lazy::new(|| {
    register_int_counter_vec!(
        opts!(
            "halabel_api_requests_total",
            "Total number of Kubernetes API requests"
        ),
        &["method", "code"]
    )
    .expect("Failed to create api_requests metric")
});

/// Credential reloads triggered by 401/403 responses
static CREDENTIAL_RELOADS: Lazy<IntCounter> = Lazy::new(|| {
    register_int_counter!(opts!(
        "halabel_credential_reloads_total",
        "Total number of credential reloads after an authorization failure"
    ))
    .expect("Failed to create credential_reloads metric")
});

/// Successful label updates
static LABEL_UPDATES: Lazy<IntCounterVec> = Lazy::new(|| {
    register_int_counter_vec!(
        opts!("halabel_label_updates_total", "Total number of label updates"),
        &["label"]
    )
    .expect("Failed to create label_updates metric")
});

/// Failed label updates
static LABEL_UPDATE_FAILURES: Lazy<IntCounterVec> = Lazy::new(|| {
    register_int_counter_vec!(
        opts!(
            "halabel_label_update_failures_total",
            "Total number of failed label updates"
        ),
        &["label"]
    )
    .expect("Failed to create label_update_failures metric")
});

/// Metrics registry wrapper
#[derive(Debug, Clone, Copy)]
pub struct MetricsRegistry;

impl MetricsRegistry {
    /// Create a new metrics registry
    pub fn new() -> Self {
        // Force initialization of lazy statics
        let _ = &*API_REQUESTS;
        let _ = &*CREDENTIAL_RELOADS;
        let _ = &*LABEL_UPDATES;
        let _ = &*LABEL_UPDATE_FAILURES;
        Self
    }

    /// Count an API request; `code` is the HTTP status, or "error" when no
    /// response was received
    pub fn inc_api_request(&self, method: &str, code: &str) {
        API_REQUESTS.with_label_values(&[method, code]).inc();
    }

    /// Count a credential reload
    pub fn inc_credential_reload(&self) {
        CREDENTIAL_RELOADS.inc();
    }

    /// Count a label update
    pub fn inc_label_update(&self, label: &str) {
        LABEL_UPDATES.with_label_values(&[label]).inc();
    }

    /// Count a failed label update
    pub fn inc_label_update_failure(&self, label: &str) {
        LABEL_UPDATE_FAILURES.with_label_values(&[label]).inc();
    }

    /// Number of credential reloads so far
    pub fn credential_reloads(&self) -> u64 {
        CREDENTIAL_RELOADS.get()
    }
}

impl Default for MetricsRegistry {
    fn default() -> Self {
        Self::new()
    }
}
