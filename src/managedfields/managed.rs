//! Decoded ownership records keyed by manager identity.

use super::entry::{ManagedFieldsEntry, Operation, FIELDS_V1};
use crate::fieldpath::{APIVersion, FieldSet, SerializeError};
use crate::value::Value;
use chrono::{DateTime, Utc};
use std::collections::BTreeMap;
use std::fmt;
use thiserror::Error;
use tracing::warn;

/// Identity of an entry. Entries sharing a key are the same entry.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ManagerKey {
    pub manager: String,
    pub operation: Operation,
    pub subresource: String,
}

impl ManagerKey {
    pub fn new(manager: impl Into<String>, operation: Operation, subresource: impl Into<String>) -> Self {
        ManagerKey {
            manager: manager.into(),
            operation,
            subresource: subresource.into(),
        }
    }

    pub fn apply(manager: impl Into<String>, subresource: impl Into<String>) -> Self {
        ManagerKey::new(manager, Operation::Apply, subresource)
    }

    pub fn update(manager: impl Into<String>, subresource: impl Into<String>) -> Self {
        ManagerKey::new(manager, Operation::Update, subresource)
    }
}

impl fmt::Display for ManagerKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({})", self.manager, self.operation)?;
        if !self.subresource.is_empty() {
            write!(f, " on {}", self.subresource)?;
        }
        Ok(())
    }
}

/// VersionedSet is a field set together with the API version its paths are
/// expressed in and the time it was last changed.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct VersionedSet {
    pub set: FieldSet,
    pub api_version: APIVersion,
    pub time: Option<DateTime<Utc>>,
}

impl VersionedSet {
    pub fn new(set: FieldSet, api_version: APIVersion, time: Option<DateTime<Utc>>) -> Self {
        VersionedSet {
            set,
            api_version,
            time,
        }
    }

    pub fn set(&self) -> &FieldSet {
        &self.set
    }

    pub fn api_version(&self) -> &APIVersion {
        &self.api_version
    }

    pub fn time(&self) -> Option<DateTime<Utc>> {
        self.time
    }

    /// Returns a copy holding `set`, with the same version and time.
    pub fn with_set(&self, set: FieldSet) -> Self {
        VersionedSet {
            set,
            api_version: self.api_version.clone(),
            time: self.time,
        }
    }
}

/// Why an entry could not be read.
#[derive(Debug, Error)]
pub enum EntryError {
    #[error("entry has no operation")]
    MissingOperation,
    #[error("unsupported fieldsType {0:?}")]
    UnsupportedFieldsType(String),
    #[error("malformed entry: {0}")]
    Malformed(#[from] serde_json::Error),
    #[error(transparent)]
    Fields(#[from] SerializeError),
}

/// What a written object says about its managed fields.
#[derive(Debug, Clone, PartialEq)]
pub enum ManagedFieldsPayload {
    /// `metadata.managedFields` is absent or null.
    Missing,
    /// `[]` or `[{}]`: the client asks for every entry to be dropped.
    Cleared,
    /// Any other list. Unreadable entries have already been skipped.
    Entries(ManagedFields),
}

impl ManagedFieldsPayload {
    /// Reads `metadata.managedFields` from an object.
    pub fn read(object: &Value) -> ManagedFieldsPayload {
        let raw = object
            .get("metadata")
            .and_then(|m| m.get("managedFields"))
            .filter(|v| !v.is_null());
        let Some(raw) = raw else {
            return ManagedFieldsPayload::Missing;
        };
        let Some(items) = raw.as_list() else {
            warn!(found = raw.type_name(), "ignoring managedFields that is not a list");
            return ManagedFieldsPayload::Missing;
        };

        let placeholder = |v: &Value| v.as_map().is_some_and(|m| m.is_empty());
        match items.as_slice() {
            [] => ManagedFieldsPayload::Cleared,
            [only] if placeholder(only) => ManagedFieldsPayload::Cleared,
            _ => ManagedFieldsPayload::Entries(ManagedFields::decode_values(items)),
        }
    }

    /// The entries to start from, treating a missing or cleared list as
    /// empty.
    pub fn into_managed_fields(self) -> ManagedFields {
        match self {
            ManagedFieldsPayload::Entries(managed) => managed,
            _ => ManagedFields::new(),
        }
    }
}

/// ManagedFields is the decoded `metadata.managedFields` of an object.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ManagedFields {
    entries: BTreeMap<ManagerKey, VersionedSet>,
}

impl ManagedFields {
    pub fn new() -> Self {
        ManagedFields::default()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn get(&self, key: &ManagerKey) -> Option<&VersionedSet> {
        self.entries.get(key)
    }

    pub fn contains(&self, key: &ManagerKey) -> bool {
        self.entries.contains_key(key)
    }

    pub fn insert(&mut self, key: ManagerKey, set: VersionedSet) {
        self.entries.insert(key, set);
    }

    pub fn remove(&mut self, key: &ManagerKey) -> Option<VersionedSet> {
        self.entries.remove(key)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&ManagerKey, &VersionedSet)> {
        self.entries.iter()
    }

    pub fn keys(&self) -> impl Iterator<Item = &ManagerKey> {
        self.entries.keys()
    }

    pub fn retain<F>(&mut self, f: F)
    where
        F: FnMut(&ManagerKey, &mut VersionedSet) -> bool,
    {
        self.entries.retain(f);
    }

    /// Deletes every entry whose set is empty.
    pub fn remove_empty(&mut self) {
        self.entries.retain(|_, vs| !vs.set.is_empty());
    }

    /// Adds an entry, merging it into an existing entry with the same key.
    ///
    /// Merged entries own the union of both sets and take the time and API
    /// version of the more recent one.
    pub fn coalesce(&mut self, key: ManagerKey, incoming: VersionedSet) {
        match self.entries.get_mut(&key) {
            Some(existing) => {
                existing.set = existing.set.union(&incoming.set);
                if incoming.time >= existing.time {
                    existing.time = incoming.time;
                    existing.api_version = incoming.api_version;
                }
            }
            None => {
                self.entries.insert(key, incoming);
            }
        }
    }

    /// Decodes persisted entries. Unreadable entries are skipped with a
    /// warning.
    pub fn decode(entries: &[ManagedFieldsEntry]) -> ManagedFields {
        let mut managed = ManagedFields::new();
        for entry in entries {
            match decode_entry(entry) {
                Ok((key, set)) => managed.coalesce(key, set),
                Err(err) => warn!(
                    manager = %entry.manager,
                    error = %err,
                    "skipping unreadable managed fields entry"
                ),
            }
        }
        managed
    }

    fn decode_values(items: &[Value]) -> ManagedFields {
        let mut managed = ManagedFields::new();
        for item in items {
            let decoded = serde_json::from_value::<ManagedFieldsEntry>(item.to_json_value())
                .map_err(EntryError::from)
                .and_then(|entry| decode_entry(&entry));
            match decoded {
                Ok((key, set)) => managed.coalesce(key, set),
                Err(err) => warn!(error = %err, "skipping unreadable managed fields entry"),
            }
        }
        managed
    }

    /// Encodes the entries, ordered by time, then operation, manager and
    /// subresource.
    pub fn encode(&self) -> Result<Vec<ManagedFieldsEntry>, SerializeError> {
        let mut sorted: Vec<_> = self.entries.iter().collect();
        sorted.sort_by(|(ka, a), (kb, b)| {
            a.time
                .cmp(&b.time)
                .then_with(|| ka.operation.cmp(&kb.operation))
                .then_with(|| ka.manager.cmp(&kb.manager))
                .then_with(|| ka.subresource.cmp(&kb.subresource))
        });
        sorted
            .into_iter()
            .map(|(key, vs)| {
                Ok(ManagedFieldsEntry {
                    manager: key.manager.clone(),
                    operation: Some(key.operation),
                    api_version: vs.api_version.to_string(),
                    time: vs.time,
                    fields_type: FIELDS_V1.to_string(),
                    fields_v1: Some(vs.set.to_fields_v1()?),
                    subresource: key.subresource.clone(),
                })
            })
            .collect()
    }
}

impl FromIterator<(ManagerKey, VersionedSet)> for ManagedFields {
    fn from_iter<T: IntoIterator<Item = (ManagerKey, VersionedSet)>>(iter: T) -> Self {
        let mut managed = ManagedFields::new();
        for (key, set) in iter {
            managed.coalesce(key, set);
        }
        managed
    }
}

fn decode_entry(entry: &ManagedFieldsEntry) -> Result<(ManagerKey, VersionedSet), EntryError> {
    let operation = entry.operation.ok_or(EntryError::MissingOperation)?;
    if entry.fields_type != FIELDS_V1 {
        return Err(EntryError::UnsupportedFieldsType(entry.fields_type.clone()));
    }
    let set = match &entry.fields_v1 {
        Some(fields) => FieldSet::from_fields_v1(fields)?,
        None => FieldSet::new(),
    };
    Ok((
        ManagerKey::new(entry.manager.clone(), operation, entry.subresource.clone()),
        VersionedSet::new(set, APIVersion::new(entry.api_version.clone()), entry.time),
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fieldpath::Path;
    use crate::value::from_json;
    use chrono::TimeZone;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    fn set(paths: &[&str]) -> FieldSet {
        paths.iter().map(|p| Path::parse(p).unwrap()).collect()
    }

    fn at(secs: u32) -> Option<DateTime<Utc>> {
        Some(Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, secs).unwrap())
    }

    fn entry(manager: &str, operation: Operation, secs: u32, fields: serde_json::Value) -> ManagedFieldsEntry {
        ManagedFieldsEntry {
            manager: manager.into(),
            operation: Some(operation),
            api_version: "v1".into(),
            time: at(secs),
            fields_type: FIELDS_V1.into(),
            fields_v1: Some(fields),
            subresource: String::new(),
        }
    }

    #[test]
    fn test_decode_skips_unreadable_entries() {
        let mut bad_type = entry("b", Operation::Update, 1, json!({}));
        bad_type.fields_type = "FieldsV2".into();
        let bad_fields = entry("c", Operation::Update, 2, json!("not an object"));
        let good = entry("a", Operation::Apply, 3, json!({"f:spec": {"f:replicas": {}}}));

        let managed = ManagedFields::decode(&[bad_type, bad_fields, good]);
        assert_eq!(managed.len(), 1);
        assert_eq!(
            managed.get(&ManagerKey::apply("a", "")).unwrap().set,
            set(&[".spec.replicas"])
        );
    }

    #[test]
    fn test_decode_coalesces_duplicate_keys() {
        let mut older = entry("m", Operation::Update, 1, json!({"f:a": {}}));
        older.api_version = "v1beta1".into();
        let newer = entry("m", Operation::Update, 5, json!({"f:b": {}}));

        let managed = ManagedFields::decode(&[newer, older]);
        assert_eq!(
            managed.get(&ManagerKey::update("m", "")),
            Some(&VersionedSet::new(set(&[".a", ".b"]), "v1".into(), at(5)))
        );
    }

    #[test]
    fn test_encode_order() {
        let managed: ManagedFields = [
            (ManagerKey::update("z", ""), VersionedSet::new(set(&[".a"]), "v1".into(), at(1))),
            (ManagerKey::update("a", ""), VersionedSet::new(set(&[".b"]), "v1".into(), at(1))),
            (ManagerKey::apply("y", ""), VersionedSet::new(set(&[".c"]), "v1".into(), at(1))),
            (ManagerKey::apply("x", ""), VersionedSet::new(set(&[".d"]), "v1".into(), at(0))),
            (ManagerKey::update("a", "status"), VersionedSet::new(set(&[".e"]), "v1".into(), at(1))),
        ]
        .into_iter()
        .collect();

        let order: Vec<(String, Option<Operation>, String)> = managed
            .encode()
            .unwrap()
            .into_iter()
            .map(|e| (e.manager, e.operation, e.subresource))
            .collect();
        assert_eq!(
            order,
            vec![
                ("x".to_string(), Some(Operation::Apply), String::new()),
                ("y".to_string(), Some(Operation::Apply), String::new()),
                ("a".to_string(), Some(Operation::Update), String::new()),
                ("a".to_string(), Some(Operation::Update), "status".to_string()),
                ("z".to_string(), Some(Operation::Update), String::new()),
            ]
        );
    }

    #[test]
    fn test_read_payload() {
        let missing = from_json(r#"{"metadata":{"name":"x"}}"#).unwrap();
        assert_eq!(ManagedFieldsPayload::read(&missing), ManagedFieldsPayload::Missing);

        let null = from_json(r#"{"metadata":{"managedFields":null}}"#).unwrap();
        assert_eq!(ManagedFieldsPayload::read(&null), ManagedFieldsPayload::Missing);

        let empty = from_json(r#"{"metadata":{"managedFields":[]}}"#).unwrap();
        assert_eq!(ManagedFieldsPayload::read(&empty), ManagedFieldsPayload::Cleared);

        let placeholder = from_json(r#"{"metadata":{"managedFields":[{}]}}"#).unwrap();
        assert_eq!(ManagedFieldsPayload::read(&placeholder), ManagedFieldsPayload::Cleared);

        let entries = from_json(
            r#"{"metadata":{"managedFields":[
                {"manager":"m","operation":"Update","apiVersion":"v1","fieldsType":"FieldsV1","fieldsV1":{"f:a":{}}},
                {"manager":"n","operation":"Patch","fieldsType":"FieldsV1"}
            ]}}"#,
        )
        .unwrap();
        let ManagedFieldsPayload::Entries(managed) = ManagedFieldsPayload::read(&entries) else {
            panic!("expected entries");
        };
        assert_eq!(managed.len(), 1);
        assert!(managed.contains(&ManagerKey::update("m", "")));
    }

    #[test]
    fn test_remove_empty() {
        let mut managed: ManagedFields = [
            (ManagerKey::update("a", ""), VersionedSet::new(FieldSet::new(), "v1".into(), at(1))),
            (ManagerKey::update("b", ""), VersionedSet::new(set(&[".x"]), "v1".into(), at(1))),
        ]
        .into_iter()
        .collect();
        managed.remove_empty();
        assert_eq!(managed.keys().cloned().collect::<Vec<_>>(), vec![ManagerKey::update("b", "")]);
    }
}
