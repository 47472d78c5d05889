//! HA state snapshot
//!
//! The snapshot is supplied once when a registration starts. Later changes
//! arrive as individual notifications, never as a new snapshot.

use serde::{Deserialize, Serialize};

use crate::labels::{bool_label_value, HaField, LABEL_VAULT_VERSION};

/// HA state of the process running in the pod
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct HaState {
    /// Process version, exposed verbatim as a label
    #[serde(default)]
    pub version: String,

    /// Whether the process is the active leader
    #[serde(default, rename = "active")]
    pub is_active: bool,

    /// Whether the process is sealed
    #[serde(default, rename = "sealed")]
    pub is_sealed: bool,

    /// Whether the process is a performance standby
    #[serde(default, rename = "performance_standby")]
    pub is_performance_standby: bool,

    /// Whether the process is initialized
    #[serde(default, rename = "initialized")]
    pub is_initialized: bool,
}

impl HaState {
    /// State left on the pod once the process shuts down: inactive, sealed,
    /// not a standby, not initialized.
    pub fn quiescent() -> Self {
        Self {
            version: String::new(),
            is_active: false,
            is_sealed: true,
            is_performance_standby: false,
            is_initialized: false,
        }
    }

    /// Value of a boolean field
    pub fn get(&self, field: HaField) -> bool {
        match field {
            HaField::Active => self.is_active,
            HaField::Sealed => self.is_sealed,
            HaField::PerformanceStandby => self.is_performance_standby,
            HaField::Initialized => self.is_initialized,
        }
    }

    /// Label key/value pairs for the boolean fields
    pub fn field_labels(&self) -> Vec<(HaField, String)> {
        HaField::ALL
            .iter()
            .map(|&field| (field, bool_label_value(self.get(field))))
            .collect()
    }

    /// All five label key/value pairs, version first
    pub fn labels(&self) -> Vec<(&'static str, String)> {
        let mut labels = vec![(LABEL_VAULT_VERSION, self.version.clone())];
        labels.extend(
            self.field_labels()
                .into_iter()
                .map(|(field, value)| (field.label(), value)),
        );
        labels
    }
}
