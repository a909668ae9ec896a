//! Filter trait and the two filters applied to recorded field sets.

use crate::fieldpath::{FieldSet, Path};
use once_cell::sync::Lazy;

/// Filter removes paths from a field set before it is recorded.
pub trait Filter: Send + Sync + std::fmt::Debug {
    fn filter(&self, set: &FieldSet) -> FieldSet;
}

static META_FIELDS: Lazy<FieldSet> = Lazy::new(|| {
    [
        vec!["apiVersion"],
        vec!["kind"],
        vec!["metadata"],
        vec!["metadata", "name"],
        vec!["metadata", "namespace"],
        vec!["metadata", "uid"],
        vec!["metadata", "resourceVersion"],
        vec!["metadata", "creationTimestamp"],
        vec!["metadata", "generation"],
        vec!["metadata", "selfLink"],
    ]
    .into_iter()
    .map(Path::from_fields)
    .collect()
});

static MANAGED_FIELDS: Lazy<FieldSet> =
    Lazy::new(|| [Path::from_fields(["metadata", "managedFields"])].into_iter().collect());

/// Drops the identity and bookkeeping fields of an object.
///
/// Only the listed paths themselves are dropped; `metadata.labels` and the
/// like stay. Everything under `metadata.managedFields` is dropped.
#[derive(Debug, Clone, Copy, Default)]
pub struct StripMetaFilter;

impl Filter for StripMetaFilter {
    fn filter(&self, set: &FieldSet) -> FieldSet {
        set.difference(&META_FIELDS).recursive_difference(&MANAGED_FIELDS)
    }
}

/// Drops every path at or under one of the given prefixes.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ResetFieldsFilter {
    prefixes: FieldSet,
}

impl ResetFieldsFilter {
    pub fn new(prefixes: FieldSet) -> Self {
        ResetFieldsFilter { prefixes }
    }
}

impl Filter for ResetFieldsFilter {
    fn filter(&self, set: &FieldSet) -> FieldSet {
        set.recursive_difference(&self.prefixes)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn set(paths: &[&str]) -> FieldSet {
        paths.iter().map(|p| Path::parse(p).unwrap()).collect()
    }

    #[test]
    fn test_strip_meta() {
        let owned = set(&[
            ".apiVersion",
            ".kind",
            ".metadata",
            ".metadata.name",
            ".metadata.labels",
            ".metadata.labels.app",
            ".metadata.managedFields",
            ".spec.replicas",
        ]);
        assert_eq!(
            StripMetaFilter.filter(&owned),
            set(&[".metadata.labels", ".metadata.labels.app", ".spec.replicas"])
        );
    }

    #[test]
    fn test_reset_fields_filter() {
        let filter = ResetFieldsFilter::new(set(&[".status"]));
        assert_eq!(
            filter.filter(&set(&[".status", ".status.ready", ".spec.paused"])),
            set(&[".spec.paused"])
        );
    }
}
