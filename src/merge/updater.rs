//! Updater: the ownership side of apply and update.

use super::conflict::{detect_conflicts, Conflicts};
use crate::fieldpath::{APIVersion, FieldSet};
use crate::managedfields::{ManagedFields, ManagerKey, VersionedSet};
use crate::resetfields::Filter;
use crate::typed::{Comparison, TypedValue, ValidationErrors};
use crate::version::{ConversionError, IdentityConverter, VersionConverter};
use chrono::{DateTime, Utc};
use std::collections::BTreeMap;
use std::sync::Arc;
use thiserror::Error;
use tracing::debug;

#[derive(Debug, Error)]
pub enum MergeError {
    #[error(transparent)]
    Conflicts(Conflicts),
    #[error("conversion error: {0}")]
    Conversion(#[from] ConversionError),
    #[error("validation error: {0}")]
    Validation(#[from] ValidationErrors),
}

/// Who is writing, to which endpoint, in which version, and when.
#[derive(Debug, Clone, PartialEq)]
pub struct WriteContext {
    pub manager: String,
    pub subresource: String,
    pub version: APIVersion,
    pub time: DateTime<Utc>,
}

impl WriteContext {
    pub fn new(
        manager: impl Into<String>,
        subresource: impl Into<String>,
        version: impl Into<APIVersion>,
        time: DateTime<Utc>,
    ) -> Self {
        WriteContext {
            manager: manager.into(),
            subresource: subresource.into(),
            version: version.into(),
            time,
        }
    }
}

/// UpdaterBuilder builds an Updater.
#[derive(Debug, Default)]
pub struct UpdaterBuilder {
    converter: Option<Arc<dyn VersionConverter>>,
    filters: Vec<Arc<dyn Filter>>,
}

impl UpdaterBuilder {
    pub fn new() -> Self {
        UpdaterBuilder::default()
    }

    pub fn converter(mut self, converter: Arc<dyn VersionConverter>) -> Self {
        self.converter = Some(converter);
        self
    }

    /// Adds a filter applied to every set before it is recorded.
    pub fn filter(mut self, filter: Arc<dyn Filter>) -> Self {
        self.filters.push(filter);
        self
    }

    pub fn build(self) -> Updater {
        Updater {
            converter: self.converter.unwrap_or_else(|| Arc::new(IdentityConverter)),
            filters: self.filters,
        }
    }
}

/// Updater computes how a write changes the managed fields of an object.
///
/// Managed fields are passed by mutable reference and only replaced when
/// the operation succeeds.
#[derive(Debug, Clone)]
pub struct Updater {
    converter: Arc<dyn VersionConverter>,
    filters: Vec<Arc<dyn Filter>>,
}

/// Entry sets converted to the version of the write in progress.
type CurrentSets = BTreeMap<ManagerKey, FieldSet>;

impl Updater {
    pub fn builder() -> UpdaterBuilder {
        UpdaterBuilder::new()
    }

    pub fn converter(&self) -> &dyn VersionConverter {
        self.converter.as_ref()
    }

    fn filter(&self, set: &FieldSet) -> FieldSet {
        self.filters
            .iter()
            .fold(set.clone(), |set, filter| filter.filter(&set))
    }

    /// Converts every entry to `version`. Entries recorded in a version that
    /// is no longer served are dropped from `managers`.
    fn to_current(
        &self,
        managers: &mut ManagedFields,
        version: &APIVersion,
    ) -> Result<CurrentSets, ConversionError> {
        let mut current = CurrentSets::new();
        let mut obsolete = Vec::new();
        for (key, vs) in managers.iter() {
            match self.converter.convert(&vs.set, &vs.api_version, version) {
                Ok(set) => {
                    current.insert(key.clone(), set);
                }
                Err(err) if err.is_missing_version() => {
                    debug!(manager = %key.manager, version = %vs.api_version, "dropping entry of obsolete version");
                    obsolete.push(key.clone());
                }
                Err(err) => return Err(err),
            }
        }
        for key in obsolete {
            managers.remove(&key);
        }
        Ok(current)
    }

    /// Takes `drop` (expressed in `version`) away from the entry `key`,
    /// keeping the entry in its own version.
    fn take_away(
        &self,
        managers: &mut ManagedFields,
        key: &ManagerKey,
        current: &FieldSet,
        drop: &FieldSet,
        version: &APIVersion,
    ) -> Result<(), ConversionError> {
        let Some(vs) = managers.get(key) else {
            return Ok(());
        };
        if current.intersection(drop).is_empty() {
            return Ok(());
        }
        let remaining = current.difference(drop);
        let entry = match self.converter.convert(&remaining, version, &vs.api_version) {
            Ok(set) => vs.with_set(set),
            Err(_) => VersionedSet::new(remaining, version.clone(), vs.time),
        };
        managers.insert(key.clone(), entry);
        Ok(())
    }

    /// Apply merges `config` into `live` on behalf of `ctx.manager` and
    /// returns the new object.
    ///
    /// Fields the manager applied before but left out of `config` are
    /// removed unless another entry owns them. Fields of other managers
    /// that `config` changes are conflicts, reported unless `force` is set,
    /// in which case the manager takes them over.
    pub fn apply(
        &self,
        live: &TypedValue,
        config: &TypedValue,
        ctx: &WriteContext,
        managers: &mut ManagedFields,
        force: bool,
    ) -> Result<TypedValue, MergeError> {
        self.apply_allowing(live, config, ctx, managers, force, &FieldSet::new())
    }

    /// Like [`Updater::apply`], but changes to the paths of `allowed` never
    /// conflict: they are taken over as if the apply was forced.
    pub fn apply_allowing(
        &self,
        live: &TypedValue,
        config: &TypedValue,
        ctx: &WriteContext,
        managers: &mut ManagedFields,
        force: bool,
        allowed: &FieldSet,
    ) -> Result<TypedValue, MergeError> {
        let mut next = managers.clone();
        let current = self.to_current(&mut next, &ctx.version)?;
        let key = ManagerKey::apply(ctx.manager.clone(), ctx.subresource.clone());

        let config_set = self.filter(&config.to_field_set());
        let prior = current.get(&key).cloned().unwrap_or_default();
        let merged = live.merge(config)?.with_defaults();

        // Fields dropped from the config, unless someone else still has them.
        let mut pruned_fields = FieldSet::new();
        prior.difference(&config_set).iterate(|path| {
            let owned_elsewhere = current
                .iter()
                .any(|(other, set)| *other != key && set.has(path));
            if !owned_elsewhere {
                pruned_fields.insert(path);
            }
        });
        let new_object = merged.remove_items(&pruned_fields);

        let comparison = live.compare(&new_object)?;
        let contested = comparison.changed().intersection(&config_set);

        let conflicts = detect_conflicts(&current, &ctx.manager, &contested.difference(allowed));
        if !conflicts.is_empty() {
            if !force {
                debug!(manager = %ctx.manager, count = conflicts.len(), "apply conflicts");
                return Err(MergeError::Conflicts(conflicts));
            }
            debug!(
                manager = %ctx.manager,
                from = ?conflicts.managers(),
                "forcing ownership of conflicting fields"
            );
        }

        for (other, set) in &current {
            if *other == key {
                continue;
            }
            let drop = comparison.removed.union(&set.intersection(&contested));
            self.take_away(&mut next, other, set, &drop, &ctx.version)?;
        }

        if config_set.is_empty() {
            next.remove(&key);
        } else {
            let time = match next.get(&key) {
                Some(previous) if prior == config_set && comparison.is_same() => previous.time,
                _ => Some(ctx.time),
            };
            next.insert(key, VersionedSet::new(config_set, ctx.version.clone(), time));
        }
        next.remove_empty();

        *managers = next;
        Ok(new_object)
    }

    /// Update records that `ctx.manager` replaced `live` with `new_object`
    /// and returns the comparison between them.
    ///
    /// Changed fields move to the manager's Update entry from every other
    /// entry, including the manager's own Apply entry. Removed fields are
    /// taken away from everyone. An update that changes nothing leaves the
    /// manager's entry, and its time, alone.
    pub fn update(
        &self,
        live: &TypedValue,
        new_object: &TypedValue,
        ctx: &WriteContext,
        managers: &mut ManagedFields,
    ) -> Result<Comparison, MergeError> {
        let mut next = managers.clone();
        let current = self.to_current(&mut next, &ctx.version)?;
        let key = ManagerKey::update(ctx.manager.clone(), ctx.subresource.clone());

        let comparison = live.compare(new_object)?;
        let changed = self.filter(&comparison.changed());
        let drop = changed.union(&comparison.removed);

        for (other, set) in &current {
            if *other != key {
                self.take_away(&mut next, other, set, &drop, &ctx.version)?;
            }
        }

        let owned = current
            .get(&key)
            .map(|set| set.difference(&comparison.removed))
            .unwrap_or_default();
        if !changed.is_empty() {
            next.insert(
                key,
                VersionedSet::new(owned.union(&changed), ctx.version.clone(), Some(ctx.time)),
            );
        } else if let Some(set) = current.get(&key) {
            self.take_away(&mut next, &key, set, &comparison.removed, &ctx.version)?;
        }
        next.remove_empty();

        *managers = next;
        Ok(comparison)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fieldpath::Path;
    use crate::resetfields::StripMetaFilter;
    use crate::schema::{Schema, TypeRef};
    use crate::value::from_json;
    use chrono::TimeZone;
    use pretty_assertions::assert_eq;

    fn schema() -> Arc<Schema> {
        Arc::new(Schema::new().with_deduced_types())
    }

    fn object(json: &str) -> TypedValue {
        TypedValue::new(from_json(json).unwrap(), schema(), TypeRef::deduced())
    }

    fn set(paths: &[&str]) -> FieldSet {
        paths.iter().map(|p| Path::parse(p).unwrap()).collect()
    }

    fn ctx(manager: &str, secs: u32) -> WriteContext {
        WriteContext::new(manager, "", "v1", Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, secs).unwrap())
    }

    fn updater() -> Updater {
        Updater::builder().filter(Arc::new(StripMetaFilter)).build()
    }

    #[test]
    fn test_update_records_changed_fields() {
        let live = object(r#"{"a":"1"}"#);
        let new = object(r#"{"a":"2","b":"3"}"#);
        let mut managers = ManagedFields::new();

        updater().update(&live, &new, &ctx("manager1", 1), &mut managers).unwrap();

        let entry = managers.get(&ManagerKey::update("manager1", "")).unwrap();
        assert_eq!(entry.set, set(&[".a", ".b"]));
        assert_eq!(entry.api_version, APIVersion::new("v1"));
    }

    #[test]
    fn test_update_takes_fields_from_other_managers() {
        let live = object(r#"{"a":"1","b":"1"}"#);
        let mut managers: ManagedFields = [(
            ManagerKey::apply("applier", ""),
            VersionedSet::new(set(&[".a", ".b"]), "v1".into(), None),
        )]
        .into_iter()
        .collect();

        updater()
            .update(&live, &object(r#"{"a":"2","b":"1"}"#), &ctx("controller", 1), &mut managers)
            .unwrap();

        assert_eq!(managers.get(&ManagerKey::apply("applier", "")).unwrap().set, set(&[".b"]));
        assert_eq!(managers.get(&ManagerKey::update("controller", "")).unwrap().set, set(&[".a"]));
    }

    #[test]
    fn test_apply_simple() {
        let live = object(r#"{"a":"1"}"#);
        let config = object(r#"{"b":"2"}"#);
        let mut managers = ManagedFields::new();

        let merged = updater().apply(&live, &config, &ctx("manager1", 1), &mut managers, false).unwrap();

        assert_eq!(merged.value(), &from_json(r#"{"a":"1","b":"2"}"#).unwrap());
        assert_eq!(managers.get(&ManagerKey::apply("manager1", "")).unwrap().set, set(&[".b"]));
    }

    #[test]
    fn test_apply_conflict_and_force() {
        let live = object(r#"{"a":"1"}"#);
        let mut managers: ManagedFields = [(
            ManagerKey::update("controller", ""),
            VersionedSet::new(set(&[".a"]), "v1".into(), None),
        )]
        .into_iter()
        .collect();
        let config = object(r#"{"a":"2"}"#);

        let err = updater()
            .apply(&live, &config, &ctx("applier", 1), &mut managers, false)
            .unwrap_err();
        let MergeError::Conflicts(conflicts) = err else {
            panic!("expected conflicts");
        };
        assert_eq!(conflicts.len(), 1);
        assert!(managers.contains(&ManagerKey::update("controller", "")));

        updater().apply(&live, &config, &ctx("applier", 2), &mut managers, true).unwrap();
        assert!(!managers.contains(&ManagerKey::update("controller", "")));
        assert_eq!(managers.get(&ManagerKey::apply("applier", "")).unwrap().set, set(&[".a"]));
    }

    #[test]
    fn test_allowed_paths_are_taken_over() {
        let live = object(r#"{"a":"1","b":"1"}"#);
        let mut managers: ManagedFields = [(
            ManagerKey::update("controller", ""),
            VersionedSet::new(set(&[".a", ".b"]), "v1".into(), None),
        )]
        .into_iter()
        .collect();
        let config = object(r#"{"a":"2","b":"2"}"#);

        let err = updater()
            .apply_allowing(&live, &config, &ctx("applier", 1), &mut managers, false, &set(&[".a"]))
            .unwrap_err();
        let MergeError::Conflicts(conflicts) = err else {
            panic!("expected conflicts");
        };
        assert_eq!(conflicts.to_set(), set(&[".b"]));

        let merged = updater()
            .apply_allowing(&live, &object(r#"{"a":"2"}"#), &ctx("applier", 2), &mut managers, false, &set(&[".a"]))
            .unwrap();
        assert_eq!(merged.value(), &from_json(r#"{"a":"2","b":"1"}"#).unwrap());
        assert_eq!(managers.get(&ManagerKey::update("controller", "")).unwrap().set, set(&[".b"]));
        assert_eq!(managers.get(&ManagerKey::apply("applier", "")).unwrap().set, set(&[".a"]));
    }

    #[test]
    fn test_apply_same_value_is_not_a_conflict() {
        let live = object(r#"{"a":"1"}"#);
        let mut managers: ManagedFields = [(
            ManagerKey::update("controller", ""),
            VersionedSet::new(set(&[".a"]), "v1".into(), None),
        )]
        .into_iter()
        .collect();

        updater()
            .apply(&live, &object(r#"{"a":"1"}"#), &ctx("applier", 1), &mut managers, false)
            .unwrap();

        assert_eq!(managers.len(), 2);
    }

    #[test]
    fn test_reapply_keeps_time() {
        let live = object(r#"{}"#);
        let config = object(r#"{"a":"1"}"#);
        let mut managers = ManagedFields::new();
        let u = updater();

        let merged = u.apply(&live, &config, &ctx("applier", 1), &mut managers, false).unwrap();
        let first = managers.clone();
        u.apply(&merged, &config, &ctx("applier", 2), &mut managers, false).unwrap();

        assert_eq!(managers, first);
    }
}
