//! Patch documents applied to a live object before an update is recorded.

use crate::typed::TypedValue;
use crate::value::Value;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum PatchType {
    /// RFC 6902 list of operations.
    Json,
    /// RFC 7386 merge patch.
    Merge,
    /// Schema-aware merge patch: associative lists merge by key.
    Strategic,
}

impl PatchType {
    /// The content type a client sends this patch with.
    pub fn content_type(&self) -> &'static str {
        match self {
            PatchType::Json => "application/json-patch+json",
            PatchType::Merge => "application/merge-patch+json",
            PatchType::Strategic => "application/strategic-merge-patch+json",
        }
    }
}

impl fmt::Display for PatchType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            PatchType::Json => "json",
            PatchType::Merge => "merge",
            PatchType::Strategic => "strategic",
        };
        write!(f, "{}", name)
    }
}

impl FromStr for PatchType {
    type Err = PatchError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "json" | "application/json-patch+json" => Ok(PatchType::Json),
            "merge" | "application/merge-patch+json" => Ok(PatchType::Merge),
            "strategic" | "application/strategic-merge-patch+json" => Ok(PatchType::Strategic),
            other => Err(PatchError::UnsupportedType(other.to_string())),
        }
    }
}

#[derive(Debug, Error)]
pub enum PatchError {
    #[error("unsupported patch type {0:?}")]
    UnsupportedType(String),
    #[error("invalid patch document: {0}")]
    InvalidDocument(#[from] serde_json::Error),
    #[error(transparent)]
    Apply(#[from] json_patch::PatchError),
    #[error("patched object must be a map, got {0}")]
    NotAnObject(&'static str),
}

/// Applies `patch` to `live` and returns the patched object.
pub fn apply_patch(
    patch_type: PatchType,
    live: &TypedValue,
    patch: &serde_json::Value,
) -> Result<TypedValue, PatchError> {
    let patched = match patch_type {
        PatchType::Json => {
            let operations: json_patch::Patch = serde_json::from_value(patch.clone())?;
            let mut doc = live.value().to_json_value();
            json_patch::patch(&mut doc, &operations.0)?;
            Value::from(doc)
        }
        PatchType::Merge => {
            let mut doc = live.value().to_json_value();
            json_patch::merge(&mut doc, patch);
            Value::from(doc)
        }
        PatchType::Strategic => live
            .apply_strategic_patch(&Value::from(patch.clone()))
            .into_value(),
    };
    if !patched.is_map() {
        return Err(PatchError::NotAnObject(patched.type_name()));
    }
    Ok(live.with_value(patched))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::{Schema, TypeRef};
    use crate::value::from_json;
    use pretty_assertions::assert_eq;
    use serde_json::json;
    use std::sync::Arc;

    fn live() -> TypedValue {
        TypedValue::new(
            from_json(r#"{"spec":{"replicas":1,"paused":true},"list":[1,2]}"#).unwrap(),
            Arc::new(Schema::new().with_deduced_types()),
            TypeRef::deduced(),
        )
    }

    #[test]
    fn test_merge_patch() {
        let patched = apply_patch(PatchType::Merge, &live(), &json!({"spec": {"paused": null, "replicas": 3}})).unwrap();
        assert_eq!(patched.value(), &from_json(r#"{"spec":{"replicas":3},"list":[1,2]}"#).unwrap());
    }

    #[test]
    fn test_json_patch() {
        let patch = json!([
            {"op": "replace", "path": "/spec/replicas", "value": 5},
            {"op": "add", "path": "/list/-", "value": 3}
        ]);
        let patched = apply_patch(PatchType::Json, &live(), &patch).unwrap();
        assert_eq!(
            patched.value(),
            &from_json(r#"{"spec":{"replicas":5,"paused":true},"list":[1,2,3]}"#).unwrap()
        );
    }

    #[test]
    fn test_json_patch_failure() {
        let patch = json!([{"op": "remove", "path": "/missing"}]);
        assert!(matches!(apply_patch(PatchType::Json, &live(), &patch), Err(PatchError::Apply(_))));
    }

    #[test]
    fn test_strategic_patch_replaces_atomic_list() {
        let patched = apply_patch(PatchType::Strategic, &live(), &json!({"list": [9]})).unwrap();
        assert_eq!(
            patched.value(),
            &from_json(r#"{"spec":{"replicas":1,"paused":true},"list":[9]}"#).unwrap()
        );
    }

    #[test]
    fn test_patch_must_keep_an_object() {
        let err = apply_patch(PatchType::Merge, &live(), &json!("scalar")).unwrap_err();
        assert_eq!(err.to_string(), "patched object must be a map, got string");
    }

    #[test]
    fn test_parse_patch_type() {
        assert_eq!("merge".parse::<PatchType>().unwrap(), PatchType::Merge);
        assert_eq!(
            "application/strategic-merge-patch+json".parse::<PatchType>().unwrap(),
            PatchType::Strategic
        );
        assert!("apply".parse::<PatchType>().is_err());
    }
}
