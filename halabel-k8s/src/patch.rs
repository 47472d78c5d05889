//! JSON-Patch operations applied to a pod

use std::collections::BTreeMap;

use serde::Serialize;

use halabel_core::labels::{label_path, PATH_TO_LABEL_MAP, PATH_TO_METADATA};

/// JSON-Patch operation kind
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum PatchOp {
    /// Create the member, or overwrite it if present
    Add,
    /// Overwrite an existing member
    Replace,
}

/// Value carried by a patch operation
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(untagged)]
pub enum PatchValue {
    String(String),
    Map(BTreeMap<String, String>),
}

/// A single JSON-Patch operation
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Patch {
    pub op: PatchOp,
    pub path: String,
    pub value: PatchValue,
}

impl Patch {
    /// Add (or overwrite) a label
    pub fn add_label(key: &str, value: impl Into<String>) -> Self {
        Self {
            op: PatchOp::Add,
            path: label_path(key),
            value: PatchValue::String(value.into()),
        }
    }

    /// Replace an existing label
    pub fn replace_label(key: &str, value: impl Into<String>) -> Self {
        Self {
            op: PatchOp::Replace,
            path: label_path(key),
            value: PatchValue::String(value.into()),
        }
    }

    /// Create an empty `metadata` object
    pub fn create_metadata() -> Self {
        Self {
            op: PatchOp::Add,
            path: PATH_TO_METADATA.to_string(),
            value: PatchValue::Map(BTreeMap::new()),
        }
    }

    /// Create an empty `metadata.labels` object
    pub fn create_labels() -> Self {
        Self {
            op: PatchOp::Add,
            path: PATH_TO_LABEL_MAP.to_string(),
            value: PatchValue::Map(BTreeMap::new()),
        }
    }
}
