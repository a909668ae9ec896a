//! Filters that keep fields out of recorded ownership.
//!
//! Two filters run on every write. [`StripMetaFilter`] drops the identity
//! and bookkeeping fields of an object, which nobody owns. The reset-fields
//! filter drops every path that belongs to another endpoint of the resource:
//! a write to the main resource cannot own `.status`, a write to the
//! `status` subresource cannot own `.spec`. The same table is used to strip
//! or restore those fields in the written object itself.

mod filter;

pub use filter::*;

use crate::fieldpath::{FieldSet, Path};
use crate::value::Value;
use std::collections::BTreeMap;

/// Table of the path prefixes owned by each endpoint of a resource kind.
///
/// The key is the subresource name, `""` for the main resource. Prefixes
/// are chains of field names.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ResetFields {
    endpoints: BTreeMap<String, Vec<Path>>,
}

impl ResetFields {
    pub fn new() -> Self {
        ResetFields::default()
    }

    pub fn with_endpoint<I>(mut self, subresource: impl Into<String>, prefixes: I) -> Self
    where
        I: IntoIterator<Item = Path>,
    {
        self.endpoints
            .entry(subresource.into())
            .or_default()
            .extend(prefixes);
        self
    }

    pub fn is_empty(&self) -> bool {
        self.endpoints.values().all(Vec::is_empty)
    }

    /// Prefixes owned by every endpoint other than `subresource`.
    pub fn foreign_prefixes(&self, subresource: &str) -> Vec<&Path> {
        self.endpoints
            .iter()
            .filter(|(endpoint, _)| endpoint.as_str() != subresource)
            .flat_map(|(_, prefixes)| prefixes.iter())
            .collect()
    }

    pub fn foreign_set(&self, subresource: &str) -> FieldSet {
        self.foreign_prefixes(subresource).into_iter().collect()
    }

    /// Removes from `set` every path under a prefix of another endpoint.
    pub fn strip(&self, set: &FieldSet, subresource: &str) -> FieldSet {
        set.recursive_difference(&self.foreign_set(subresource))
    }

    pub fn filter_for(&self, subresource: &str) -> ResetFieldsFilter {
        ResetFieldsFilter::new(self.foreign_set(subresource))
    }

    /// Returns `value` without the fields of other endpoints.
    pub fn strip_value(&self, value: &Value, subresource: &str) -> Value {
        let mut result = value.clone();
        for prefix in self.foreign_prefixes(subresource) {
            if let Some(names) = prefix.field_names() {
                remove_at(&mut result, &names);
            }
        }
        result
    }

    /// Returns `value` with the fields of other endpoints put back to what
    /// `live` holds, or removed when `live` has none.
    pub fn restore_value(&self, value: &Value, live: Option<&Value>, subresource: &str) -> Value {
        let mut result = value.clone();
        for prefix in self.foreign_prefixes(subresource) {
            let Some(names) = prefix.field_names() else {
                continue;
            };
            match live.and_then(|live| value_at(live, &names)) {
                Some(original) => set_at(&mut result, &names, original.clone()),
                None => remove_at(&mut result, &names),
            }
        }
        result
    }
}

fn value_at<'v>(value: &'v Value, names: &[&str]) -> Option<&'v Value> {
    names
        .iter()
        .try_fold(value, |current, name| current.as_map()?.get(name))
}

fn remove_at(value: &mut Value, names: &[&str]) {
    let Some((last, parents)) = names.split_last() else {
        return;
    };
    let mut current = value;
    for name in parents {
        match current.as_map_mut().and_then(|m| m.get_mut(name)) {
            Some(next) => current = next,
            None => return,
        }
    }
    if let Some(map) = current.as_map_mut() {
        map.delete(last);
    }
}

fn set_at(value: &mut Value, names: &[&str], new: Value) {
    let Some((last, parents)) = names.split_last() else {
        *value = new;
        return;
    };
    if !value.is_map() {
        *value = Value::Map(Default::default());
    }
    let Some(mut current) = value.as_map_mut() else {
        return;
    };
    for name in parents {
        current = current.child_map_mut(name);
    }
    current.set(*last, new);
}
