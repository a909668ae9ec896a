//! Accessors for the parts of an object the field manager looks at.

use crate::error::Result;
use crate::managedfields::ManagedFieldsEntry;
use crate::value::Value;

pub(crate) fn kind(object: &Value) -> Option<&str> {
    object.get("kind").and_then(Value::as_str)
}

pub(crate) fn api_version(object: &Value) -> Option<&str> {
    object.get("apiVersion").and_then(Value::as_str)
}

/// Annotation holding the configuration of the last client-side apply.
pub(crate) const LAST_APPLIED_ANNOTATION: &str = "kubectl.kubernetes.io/last-applied-configuration";

pub(crate) fn uid(object: &Value) -> Option<&str> {
    object
        .get("metadata")
        .and_then(|m| m.get("uid"))
        .and_then(Value::as_str)
        .filter(|uid| !uid.is_empty())
}

pub(crate) fn last_applied_configuration(object: &Value) -> Option<&str> {
    object
        .get("metadata")
        .and_then(|m| m.get("annotations"))
        .and_then(|a| a.get(LAST_APPLIED_ANNOTATION))
        .and_then(Value::as_str)
        .filter(|config| !config.is_empty())
}

/// Returns the object without `metadata.managedFields`.
pub(crate) fn without_managed_fields(object: &Value) -> Value {
    let mut result = object.clone();
    if let Some(metadata) = result.as_map_mut().and_then(|m| m.get_mut("metadata")) {
        if let Some(metadata) = metadata.as_map_mut() {
            metadata.delete("managedFields");
        }
    }
    result
}

/// Returns the object with `metadata.managedFields` set to `entries`, or
/// without the field when there are none.
pub(crate) fn with_managed_fields(object: Value, entries: &[ManagedFieldsEntry]) -> Result<Value> {
    let mut result = without_managed_fields(&object);
    if entries.is_empty() {
        return Ok(result);
    }
    let encoded = Value::from(serde_json::to_value(entries)?);
    if let Some(map) = result.as_map_mut() {
        map.child_map_mut("metadata").set("managedFields", encoded);
    }
    Ok(result)
}

/// Size of the object once serialized as JSON.
pub(crate) fn encoded_size(object: &Value) -> Result<usize> {
    Ok(serde_json::to_vec(&object.to_json_value())?.len())
}
