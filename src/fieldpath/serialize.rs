//! FieldsV1 encoding of [`FieldSet`].
//!
//! Each path element becomes an object key: `f:<name>` for fields,
//! `k:<json object>` for associative list keys, `v:<json>` for set values
//! and `i:<n>` for indices. A `"."` key marks that the enclosing path is a
//! member of the set in addition to having children.

use super::path::PathElement;
use super::set::FieldSet;
use crate::value::{Field, FieldList, Value};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum SerializeError {
    #[error("unknown path element prefix in {0:?}")]
    UnknownPrefix(String),
    #[error("invalid path element {key:?}: {message}")]
    InvalidElement { key: String, message: String },
    #[error("expected an object for {0:?}")]
    NotAnObject(String),
    #[error(transparent)]
    Json(#[from] serde_json::Error),
}

/// Serializes a PathElement to its FieldsV1 key.
pub fn serialize_path_element(pe: &PathElement) -> Result<String, SerializeError> {
    match pe {
        PathElement::FieldName(name) => Ok(format!("f:{}", name)),
        PathElement::Value(v) => Ok(format!("v:{}", serde_json::to_string(&v.to_json_value())?)),
        PathElement::Key(fields) => {
            let obj: serde_json::Map<String, serde_json::Value> = fields
                .iter()
                .map(|f| (f.name.clone(), f.value.to_json_value()))
                .collect();
            Ok(format!("k:{}", serde_json::to_string(&obj)?))
        }
        PathElement::Index(i) => Ok(format!("i:{}", i)),
    }
}

/// Parses a FieldsV1 key back into a PathElement.
pub fn deserialize_path_element(s: &str) -> Result<PathElement, SerializeError> {
    let invalid = |message: String| SerializeError::InvalidElement {
        key: s.to_string(),
        message,
    };

    if let Some(name) = s.strip_prefix("f:") {
        return Ok(PathElement::FieldName(name.to_string()));
    }
    if let Some(json) = s.strip_prefix("v:") {
        let v: serde_json::Value = serde_json::from_str(json).map_err(|e| invalid(e.to_string()))?;
        return Ok(PathElement::Value(Value::from(v)));
    }
    if let Some(json) = s.strip_prefix("k:") {
        let v: serde_json::Value = serde_json::from_str(json).map_err(|e| invalid(e.to_string()))?;
        let serde_json::Value::Object(obj) = v else {
            return Err(invalid("key must be a JSON object".into()));
        };
        return Ok(PathElement::Key(FieldList::with_fields(
            obj.into_iter()
                .map(|(name, value)| Field {
                    name,
                    value: Value::from(value),
                })
                .collect(),
        )));
    }
    if let Some(index) = s.strip_prefix("i:") {
        return index
            .parse::<i32>()
            .map(PathElement::Index)
            .map_err(|e| invalid(e.to_string()));
    }
    Err(SerializeError::UnknownPrefix(s.to_string()))
}

impl FieldSet {
    /// Encodes the set as a FieldsV1 JSON object.
    pub fn to_fields_v1(&self) -> Result<serde_json::Value, SerializeError> {
        Ok(serde_json::Value::Object(self.to_json_object(false)?))
    }

    /// Decodes a FieldsV1 JSON object. Keys with an unknown prefix are
    /// skipped.
    pub fn from_fields_v1(value: &serde_json::Value) -> Result<FieldSet, SerializeError> {
        match value {
            serde_json::Value::Object(obj) => Self::from_json_object(obj),
            _ => Err(SerializeError::NotAnObject("fieldsV1".into())),
        }
    }

    pub fn to_json(&self) -> Result<String, SerializeError> {
        Ok(serde_json::to_string(&self.to_fields_v1()?)?)
    }

    pub fn from_json(data: &str) -> Result<FieldSet, SerializeError> {
        Self::from_fields_v1(&serde_json::from_str(data)?)
    }

    fn to_json_object(
        &self,
        include_self: bool,
    ) -> Result<serde_json::Map<String, serde_json::Value>, SerializeError> {
        let mut result = serde_json::Map::new();
        if include_self {
            result.insert(".".to_string(), serde_json::Value::Object(Default::default()));
        }

        for member in self.members.iter() {
            let child = match self.children.get(member) {
                Some(child) => child.to_json_object(true)?,
                None => serde_json::Map::new(),
            };
            result.insert(serialize_path_element(member)?, serde_json::Value::Object(child));
        }

        for (pe, child) in &self.children {
            if self.members.contains(pe) {
                continue;
            }
            result.insert(
                serialize_path_element(pe)?,
                serde_json::Value::Object(child.to_json_object(false)?),
            );
        }

        Ok(result)
    }

    fn from_json_object(
        obj: &serde_json::Map<String, serde_json::Value>,
    ) -> Result<FieldSet, SerializeError> {
        let mut set = FieldSet::new();

        for (key, value) in obj {
            if key == "." {
                continue;
            }

            let pe = match deserialize_path_element(key) {
                Ok(pe) => pe,
                Err(SerializeError::UnknownPrefix(_)) => continue,
                Err(e) => return Err(e),
            };

            let serde_json::Value::Object(child_obj) = value else {
                return Err(SerializeError::NotAnObject(key.clone()));
            };

            if child_obj.is_empty() || child_obj.contains_key(".") {
                set.members.insert(pe.clone());
            }
            let child = Self::from_json_object(child_obj)?;
            if !child.is_empty() {
                set.children.insert(pe, child);
            }
        }

        Ok(set)
    }
}
