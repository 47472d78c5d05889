//! halabel Core Library
//!
//! HA state model, pod label namespace, and the host-facing registration
//! interface. Nothing in this crate talks to the network.

pub mod labels;
pub mod metrics;
pub mod registration;
pub mod state;

// Re-export common types
pub use labels::{bool_label_value, label_path, HaField, ParseHaFieldError};
pub use metrics::MetricsRegistry;
pub use registration::ServiceRegistration;
pub use state::HaState;
