//! Pod label namespace
//!
//! The label keys are fixed for the lifetime of a registration; only their
//! values change.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Version of the process running in the pod
pub const LABEL_VAULT_VERSION: &str = "vault-version";
/// Whether the process is the active leader
pub const LABEL_ACTIVE: &str = "vault-ha-active";
/// Whether the process is sealed
pub const LABEL_SEALED: &str = "vault-ha-sealed";
/// Whether the process is a performance standby
pub const LABEL_PERF_STANDBY: &str = "vault-ha-perf-standby";
/// Whether the process is initialized
pub const LABEL_INITIALIZED: &str = "vault-ha-initialized";

/// JSON-Pointer prefix under which labels live in a pod
pub const PATH_TO_LABELS: &str = "/metadata/labels/";

/// JSON-Pointer of the metadata object
pub const PATH_TO_METADATA: &str = "/metadata";

/// JSON-Pointer of the labels object
pub const PATH_TO_LABEL_MAP: &str = "/metadata/labels";

/// Build the JSON-Pointer path of a label key.
///
/// `~` and `/` are escaped per RFC 6901 so keys carrying a prefix such as
/// `example.com/role` still address a single member.
pub fn label_path(key: &str) -> String {
    let escaped = key.replace('~', "~0").replace('/', "~1");
    format!("{}{}", PATH_TO_LABELS, escaped)
}

/// Converts a bool to "true" or "false".
pub fn bool_label_value(value: bool) -> String {
    value.to_string()
}

/// A boolean HA field that is exposed as its own label
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HaField {
    /// Active leader
    Active,
    /// Sealed
    Sealed,
    /// Performance standby
    PerformanceStandby,
    /// Initialized
    Initialized,
}

impl HaField {
    /// All boolean fields, in labeling order
    pub const ALL: [HaField; 4] = [
        HaField::Active,
        HaField::Sealed,
        HaField::PerformanceStandby,
        HaField::Initialized,
    ];

    /// Label key for this field
    pub fn label(self) -> &'static str {
        match self {
            HaField::Active => LABEL_ACTIVE,
            HaField::Sealed => LABEL_SEALED,
            HaField::PerformanceStandby => LABEL_PERF_STANDBY,
            HaField::Initialized => LABEL_INITIALIZED,
        }
    }
}

impl fmt::Display for HaField {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            HaField::Active => write!(f, "active"),
            HaField::Sealed => write!(f, "sealed"),
            HaField::PerformanceStandby => write!(f, "performance_standby"),
            HaField::Initialized => write!(f, "initialized"),
        }
    }
}

/// Error for an unrecognized field name
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("unknown HA field: {0}")]
pub struct ParseHaFieldError(pub String);

impl FromStr for HaField {
    type Err = ParseHaFieldError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "active" => Ok(HaField::Active),
            "sealed" => Ok(HaField::Sealed),
            "performance_standby" | "perf_standby" => Ok(HaField::PerformanceStandby),
            "initialized" => Ok(HaField::Initialized),
            other => Err(ParseHaFieldError(other.to_string())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_label_path() {
        assert_eq!(label_path(LABEL_ACTIVE), "/metadata/labels/vault-ha-active");
        assert_eq!(label_path("example.com/role"), "/metadata/labels/example.com~1role");
        assert_eq!(label_path("a~b"), "/metadata/labels/a~0b");
    }

    #[test]
    fn test_bool_label_value() {
        assert_eq!(bool_label_value(true), "true");
        assert_eq!(bool_label_value(false), "false");
    }

    #[test]
    fn test_field_labels_are_distinct() {
        let mut labels: Vec<_> = HaField::ALL.iter().map(|f| f.label()).collect();
        labels.push(LABEL_VAULT_VERSION);
        labels.sort_unstable();
        labels.dedup();
        assert_eq!(labels.len(), 5);
    }

    #[test]
    fn test_field_label() {
        assert_eq!(
            label_path(HaField::PerformanceStandby.label()),
            "/metadata/labels/vault-ha-perf-standby"
        );
        assert_eq!(HaField::Initialized.to_string(), "initialized");
    }

    #[test]
    fn test_parse_field() {
        for field in HaField::ALL {
            assert_eq!(field.to_string().parse::<HaField>(), Ok(field));
        }
        assert_eq!(
            "perf_standby".parse::<HaField>(),
            Ok(HaField::PerformanceStandby)
        );
        assert!("leader".parse::<HaField>().is_err());
    }
}
