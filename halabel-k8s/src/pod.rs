//! Read-only view of a pod
//!
//! Only the metadata is decoded, and it is kept as raw JSON: a pod may lack
//! `metadata` or `metadata.labels` entirely, and those cases drive
//! reconciliation before any label is patched.

use std::collections::BTreeMap;

use serde::Deserialize;
use serde_json::{Map, Value};

/// Pod resource as returned by the API server
#[derive(Debug, Clone, Default, Deserialize)]
pub struct Pod {
    #[serde(default)]
    pub metadata: Option<Value>,
}

/// Whether a pod can take label patches as-is
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LabelContainer {
    /// No metadata object; both containers must be created
    MissingMetadata,
    /// Metadata exists but has no labels object
    MissingLabels,
    /// Labels object exists
    Present,
    /// Something is in the way that patching cannot fix
    Invalid(String),
}

impl Pod {
    fn metadata_object(&self) -> Option<&Map<String, Value>> {
        self.metadata.as_ref().and_then(Value::as_object)
    }

    /// `metadata.name`, if present
    pub fn name(&self) -> Option<&str> {
        self.metadata_object()?.get("name")?.as_str()
    }

    /// String-valued labels; non-string values are skipped
    pub fn labels(&self) -> BTreeMap<String, String> {
        self.metadata_object()
            .and_then(|m| m.get("labels"))
            .and_then(Value::as_object)
            .map(|labels| {
                labels
                    .iter()
                    .filter_map(|(k, v)| v.as_str().map(|v| (k.clone(), v.to_string())))
                    .collect()
            })
            .unwrap_or_default()
    }

    /// Classify the metadata/labels containers
    pub fn label_container(&self) -> LabelContainer {
        let metadata = match &self.metadata {
            None | Some(Value::Null) => return LabelContainer::MissingMetadata,
            Some(Value::Object(metadata)) => metadata,
            Some(other) => {
                return LabelContainer::Invalid(format!(
                    "metadata is {} instead of an object",
                    json_kind(other)
                ))
            }
        };

        match metadata.get("labels") {
            None | Some(Value::Null) => LabelContainer::MissingLabels,
            Some(Value::Object(_)) => LabelContainer::Present,
            Some(other) => LabelContainer::Invalid(format!(
                "/metadata/labels is {} instead of an object",
                json_kind(other)
            )),
        }
    }
}

fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}
