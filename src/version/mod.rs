//! Re-encoding of field sets between API versions of one resource.
//!
//! Managed fields are recorded in the API version of the write that produced
//! them. Before two sets recorded under different versions can be compared,
//! they are converted to a common version by renaming path prefixes.

use crate::fieldpath::{APIVersion, FieldSet, Path};
use std::cmp::Reverse;
use std::collections::BTreeMap;
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConversionError {
    #[error("version {version} of {kind} is not served")]
    UnknownVersion { kind: String, version: APIVersion },
}

impl ConversionError {
    /// Returns true when the error means the source version no longer
    /// exists, so sets recorded under it are obsolete.
    pub fn is_missing_version(&self) -> bool {
        matches!(self, ConversionError::UnknownVersion { .. })
    }
}

/// Converts field sets of one resource kind between API versions.
pub trait VersionConverter: Send + Sync + std::fmt::Debug {
    fn convert(
        &self,
        set: &FieldSet,
        from: &APIVersion,
        to: &APIVersion,
    ) -> Result<FieldSet, ConversionError>;
}

/// Converter for resources whose versions share one field layout.
#[derive(Debug, Clone, Copy, Default)]
pub struct IdentityConverter;

impl VersionConverter for IdentityConverter {
    fn convert(
        &self,
        set: &FieldSet,
        _from: &APIVersion,
        _to: &APIVersion,
    ) -> Result<FieldSet, ConversionError> {
        Ok(set.clone())
    }
}

/// PathMappingConverter renames path prefixes between pairs of versions.
///
/// A rule registered for `(v1, v2)` is also applied in reverse for
/// `(v2, v1)`. Paths no rule matches keep their shape, and so do all paths
/// when the pair has no rules. When the served versions are declared, a
/// conversion from or to any other version fails with
/// [`ConversionError::UnknownVersion`].
#[derive(Debug, Clone, Default)]
pub struct PathMappingConverter {
    kind: String,
    served: Vec<APIVersion>,
    rules: BTreeMap<(APIVersion, APIVersion), Vec<(Path, Path)>>,
}

impl PathMappingConverter {
    pub fn new(kind: impl Into<String>) -> Self {
        PathMappingConverter {
            kind: kind.into(),
            ..Default::default()
        }
    }

    pub fn with_served_versions<I, V>(mut self, versions: I) -> Self
    where
        I: IntoIterator<Item = V>,
        V: Into<APIVersion>,
    {
        self.served = versions.into_iter().map(Into::into).collect();
        self
    }

    /// Registers that `from_path` in `from_version` is `to_path` in
    /// `to_version`.
    pub fn with_rename(
        mut self,
        from_version: impl Into<APIVersion>,
        to_version: impl Into<APIVersion>,
        from_path: Path,
        to_path: Path,
    ) -> Self {
        let from_version = from_version.into();
        let to_version = to_version.into();
        self.add_rule(from_version.clone(), to_version.clone(), from_path.clone(), to_path.clone());
        self.add_rule(to_version, from_version, to_path, from_path);
        self
    }

    fn add_rule(&mut self, from: APIVersion, to: APIVersion, from_path: Path, to_path: Path) {
        let rules = self.rules.entry((from, to)).or_default();
        rules.push((from_path, to_path));
        // Longest prefix wins.
        rules.sort_by_key(|(prefix, _)| Reverse(prefix.len()));
    }

    pub fn is_served(&self, version: &APIVersion) -> bool {
        self.served.is_empty() || self.served.contains(version)
    }

    fn check_served(&self, version: &APIVersion) -> Result<(), ConversionError> {
        if self.is_served(version) {
            Ok(())
        } else {
            Err(ConversionError::UnknownVersion {
                kind: self.kind.clone(),
                version: version.clone(),
            })
        }
    }
}

impl VersionConverter for PathMappingConverter {
    fn convert(
        &self,
        set: &FieldSet,
        from: &APIVersion,
        to: &APIVersion,
    ) -> Result<FieldSet, ConversionError> {
        self.check_served(from)?;
        self.check_served(to)?;

        let Some(rules) = self.rules.get(&(from.clone(), to.clone())) else {
            return Ok(set.clone());
        };
        Ok(set
            .paths()
            .into_iter()
            .map(|path| {
                rules
                    .iter()
                    .find_map(|(prefix, replacement)| path.replace_prefix(prefix, replacement))
                    .unwrap_or(path)
            })
            .collect())
    }
}
