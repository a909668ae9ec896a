//! Field manager configuration.
//!
//! A configuration is read once at startup, usually from YAML, and turned
//! into an immutable [`ResourceRegistry`] that every write consults.
//!
//! ```yaml
//! historyCap: 10
//! beforeFirstApplyManager: before-first-apply
//! schema:
//!   types: [...]
//! resources:
//! - kind: Deployment
//!   apiVersion: apps/v1
//!   typeName: io.k8s.api.apps.v1.Deployment
//!   resetFields:
//!     "": [.spec]
//!     status: [.status]
//! ```

use crate::fieldpath::{APIVersion, Path, PathParseError};
use crate::managedfields::{DEFAULT_ANCIENT_CHANGES_MANAGER, DEFAULT_HISTORY_CAP};
use crate::resetfields::ResetFields;
use crate::schema::{Schema, TypeRef};
use crate::version::{IdentityConverter, PathMappingConverter, VersionConverter};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::PathBuf;
use std::sync::Arc;
use thiserror::Error;

pub const DEFAULT_BEFORE_FIRST_APPLY_MANAGER: &str = "before-first-apply";
pub const DEFAULT_UPDATE_MANAGER: &str = "unknown";
pub const DEFAULT_LAST_APPLIED_MANAGER: &str = "kubectl";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file {path}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("invalid config: {0}")]
    Yaml(#[from] serde_yaml::Error),
    #[error("resource {kind}: invalid path {path:?}")]
    InvalidPath {
        kind: String,
        path: String,
        #[source]
        source: PathParseError,
    },
    #[error("resource {kind}: type {type_name:?} is not declared in the schema")]
    UnknownType { kind: String, type_name: String },
    #[error("resource {0} is declared more than once")]
    DuplicateKind(String),
    #[error("resource {kind}: {message}")]
    Invalid { kind: String, message: String },
    #[error("historyCap must be at least 1")]
    ZeroHistoryCap,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FieldManagerConfig {
    /// Number of Update entries kept before the oldest are folded together,
    /// counting the entry they are folded into.
    #[serde(default = "default_history_cap")]
    pub history_cap: usize,

    #[serde(default = "default_ancient_changes_manager")]
    pub ancient_changes_manager: String,

    /// Manager credited with the fields of an object that existed before
    /// anyone applied to it. `null` disables the attribution.
    #[serde(default = "default_before_first_apply_manager")]
    pub before_first_apply_manager: Option<String>,

    /// Manager recorded for updates that do not name one.
    #[serde(default = "default_update_manager")]
    pub default_update_manager: String,

    /// Manager allowed to take over the fields recorded in the
    /// `kubectl.kubernetes.io/last-applied-configuration` annotation without
    /// conflicts. `null` disables the upgrade from client-side apply.
    #[serde(default = "default_last_applied_manager")]
    pub last_applied_manager: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_object_bytes: Option<usize>,

    #[serde(default)]
    pub schema: Schema,

    #[serde(default)]
    pub resources: Vec<ResourceConfig>,
}

fn default_history_cap() -> usize {
    DEFAULT_HISTORY_CAP
}

fn default_ancient_changes_manager() -> String {
    DEFAULT_ANCIENT_CHANGES_MANAGER.to_string()
}

fn default_before_first_apply_manager() -> Option<String> {
    Some(DEFAULT_BEFORE_FIRST_APPLY_MANAGER.to_string())
}

fn default_update_manager() -> String {
    DEFAULT_UPDATE_MANAGER.to_string()
}

fn default_last_applied_manager() -> Option<String> {
    Some(DEFAULT_LAST_APPLIED_MANAGER.to_string())
}

impl Default for FieldManagerConfig {
    fn default() -> Self {
        FieldManagerConfig {
            history_cap: default_history_cap(),
            ancient_changes_manager: default_ancient_changes_manager(),
            before_first_apply_manager: default_before_first_apply_manager(),
            default_update_manager: default_update_manager(),
            last_applied_manager: default_last_applied_manager(),
            max_object_bytes: None,
            schema: Schema::default(),
            resources: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResourceConfig {
    pub kind: String,

    /// Version that writes to this resource use.
    pub api_version: String,

    /// Schema type of the objects. The deduced type when absent.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub type_name: Option<String>,

    /// Served versions. Entries recorded in any other version are obsolete.
    /// Empty means every version is served.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub versions: Vec<String>,

    /// Path prefixes owned by each endpoint, keyed by subresource.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub reset_fields: BTreeMap<String, Vec<String>>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub version_mappings: Vec<VersionMapping>,
}

/// Renames between two versions, also applied in the other direction.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct VersionMapping {
    pub from: String,
    pub to: String,
    #[serde(default)]
    pub paths: Vec<PathRename>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PathRename {
    pub from: String,
    pub to: String,
}

/// Everything the field manager knows about one resource kind.
#[derive(Debug, Clone)]
pub struct Resource {
    pub kind: String,
    pub api_version: APIVersion,
    pub type_ref: TypeRef,
    pub reset_fields: ResetFields,
    pub converter: Arc<dyn VersionConverter>,
}

impl Resource {
    /// A resource without a declared schema: maps are separable, lists
    /// atomic, and all versions share one layout.
    pub fn deduced(kind: impl Into<String>, api_version: impl Into<APIVersion>) -> Self {
        Resource {
            kind: kind.into(),
            api_version: api_version.into(),
            type_ref: TypeRef::deduced(),
            reset_fields: ResetFields::new(),
            converter: Arc::new(IdentityConverter),
        }
    }
}

/// Settings shared by every resource.
#[derive(Debug, Clone, PartialEq)]
pub struct ManagerSettings {
    pub history_cap: usize,
    pub ancient_changes_manager: String,
    pub before_first_apply_manager: Option<String>,
    pub default_update_manager: String,
    pub last_applied_manager: Option<String>,
    pub max_object_bytes: Option<usize>,
}

impl Default for ManagerSettings {
    fn default() -> Self {
        FieldManagerConfig::default().settings()
    }
}

/// The validated, immutable form of a [`FieldManagerConfig`].
#[derive(Debug, Clone)]
pub struct ResourceRegistry {
    pub settings: ManagerSettings,
    pub schema: Arc<Schema>,
    resources: BTreeMap<String, Resource>,
}

impl ResourceRegistry {
    pub fn get(&self, kind: &str) -> Option<&Resource> {
        self.resources.get(kind)
    }

    pub fn kinds(&self) -> impl Iterator<Item = &str> {
        self.resources.keys().map(String::as_str)
    }
}

impl FieldManagerConfig {
    pub fn from_yaml(yaml: &str) -> Result<Self, ConfigError> {
        Ok(serde_yaml::from_str(yaml)?)
    }

    pub fn from_file(path: impl Into<PathBuf>) -> Result<Self, ConfigError> {
        let path = path.into();
        let contents = std::fs::read_to_string(&path).map_err(|source| ConfigError::Io {
            path: path.clone(),
            source,
        })?;
        Self::from_yaml(&contents)
    }

    pub fn settings(&self) -> ManagerSettings {
        ManagerSettings {
            history_cap: self.history_cap,
            ancient_changes_manager: self.ancient_changes_manager.clone(),
            before_first_apply_manager: self.before_first_apply_manager.clone(),
            default_update_manager: self.default_update_manager.clone(),
            last_applied_manager: self.last_applied_manager.clone(),
            max_object_bytes: self.max_object_bytes,
        }
    }

    /// Validates the configuration and resolves every resource.
    pub fn build(&self) -> Result<ResourceRegistry, ConfigError> {
        if self.history_cap == 0 {
            return Err(ConfigError::ZeroHistoryCap);
        }
        let schema = Arc::new(self.schema.clone().with_deduced_types());
        let mut resources = BTreeMap::new();
        for config in &self.resources {
            let resource = config.resolve(&schema)?;
            if resources.insert(resource.kind.clone(), resource).is_some() {
                return Err(ConfigError::DuplicateKind(config.kind.clone()));
            }
        }
        Ok(ResourceRegistry {
            settings: self.settings(),
            schema,
            resources,
        })
    }
}

impl ResourceConfig {
    fn invalid(&self, message: impl Into<String>) -> ConfigError {
        ConfigError::Invalid {
            kind: self.kind.clone(),
            message: message.into(),
        }
    }

    fn parse_path(&self, path: &str) -> Result<Path, ConfigError> {
        Path::parse(path).map_err(|source| ConfigError::InvalidPath {
            kind: self.kind.clone(),
            path: path.to_string(),
            source,
        })
    }

    fn resolve(&self, schema: &Schema) -> Result<Resource, ConfigError> {
        if self.kind.is_empty() {
            return Err(self.invalid("kind must not be empty"));
        }
        if self.api_version.is_empty() {
            return Err(self.invalid("apiVersion must not be empty"));
        }
        let served = |v: &str| self.versions.is_empty() || self.versions.iter().any(|s| s == v);
        if !served(&self.api_version) {
            return Err(self.invalid(format!("apiVersion {} is not a served version", self.api_version)));
        }

        let type_ref = match &self.type_name {
            Some(name) if schema.find_named_type(name).is_none() => {
                return Err(ConfigError::UnknownType {
                    kind: self.kind.clone(),
                    type_name: name.clone(),
                });
            }
            Some(name) => TypeRef::named(name.clone()),
            None => TypeRef::deduced(),
        };

        let mut reset_fields = ResetFields::new();
        for (subresource, prefixes) in &self.reset_fields {
            let prefixes = prefixes
                .iter()
                .map(|p| self.parse_path(p))
                .collect::<Result<Vec<_>, _>>()?;
            reset_fields = reset_fields.with_endpoint(subresource.clone(), prefixes);
        }

        let converter: Arc<dyn VersionConverter> =
            if self.versions.is_empty() && self.version_mappings.is_empty() {
                Arc::new(IdentityConverter)
            } else {
                let mut converter = PathMappingConverter::new(self.kind.clone())
                    .with_served_versions(self.versions.iter().map(String::as_str));
                for mapping in &self.version_mappings {
                    if !served(&mapping.from) || !served(&mapping.to) {
                        return Err(self.invalid(format!(
                            "version mapping {} -> {} names a version that is not served",
                            mapping.from, mapping.to
                        )));
                    }
                    for rename in &mapping.paths {
                        converter = converter.with_rename(
                            mapping.from.as_str(),
                            mapping.to.as_str(),
                            self.parse_path(&rename.from)?,
                            self.parse_path(&rename.to)?,
                        );
                    }
                }
                Arc::new(converter)
            };

        Ok(Resource {
            kind: self.kind.clone(),
            api_version: APIVersion::new(self.api_version.clone()),
            type_ref,
            reset_fields,
            converter,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    const CONFIG: &str = r#"
historyCap: 5
beforeFirstApplyManager: null
maxObjectBytes: 1024
schema:
  types:
  - name: widget
    map:
      elementType:
        namedType: __untyped_deduced_
resources:
- kind: Widget
  apiVersion: example.com/v1
  typeName: widget
  versions: [example.com/v1beta1, example.com/v1]
  resetFields:
    "": [.spec]
    status: [.status]
  versionMappings:
  - from: example.com/v1beta1
    to: example.com/v1
    paths:
    - from: .spec.size
      to: .spec.replicas
"#;

    #[test]
    fn test_defaults() {
        let config = FieldManagerConfig::from_yaml("{}").unwrap();
        assert_eq!(config, FieldManagerConfig::default());
        assert_eq!(config.history_cap, 10);
        assert_eq!(config.ancient_changes_manager, "ancient-changes");
        assert_eq!(config.before_first_apply_manager.as_deref(), Some("before-first-apply"));
        assert_eq!(config.default_update_manager, "unknown");
        assert_eq!(config.last_applied_manager.as_deref(), Some("kubectl"));
    }

    #[test]
    fn test_build_registry() {
        let config = FieldManagerConfig::from_yaml(CONFIG).unwrap();
        assert_eq!(config.before_first_apply_manager, None);

        let registry = config.build().unwrap();
        assert_eq!(registry.settings.history_cap, 5);
        assert_eq!(registry.settings.max_object_bytes, Some(1024));
        assert_eq!(registry.kinds().collect::<Vec<_>>(), vec!["Widget"]);

        let widget = registry.get("Widget").unwrap();
        assert_eq!(widget.type_ref, TypeRef::named("widget"));
        assert_eq!(widget.api_version, APIVersion::new("example.com/v1"));
        assert_eq!(
            widget.reset_fields.foreign_prefixes("status"),
            vec![&Path::parse(".spec").unwrap()]
        );

        let converted = widget
            .converter
            .convert(
                &[Path::parse(".spec.size").unwrap()].into_iter().collect(),
                &"example.com/v1beta1".into(),
                &"example.com/v1".into(),
            )
            .unwrap();
        assert!(converted.has(&Path::parse(".spec.replicas").unwrap()));
    }

    #[test]
    fn test_zero_history_cap() {
        let config = FieldManagerConfig::from_yaml("historyCap: 0\n").unwrap();
        assert!(matches!(config.build(), Err(ConfigError::ZeroHistoryCap)));
    }

    #[test]
    fn test_unknown_type() {
        let config = FieldManagerConfig::from_yaml(
            "resources:\n- kind: Widget\n  apiVersion: v1\n  typeName: missing\n",
        )
        .unwrap();
        assert!(matches!(config.build(), Err(ConfigError::UnknownType { .. })));
    }

    #[test]
    fn test_invalid_reset_path() {
        let config = FieldManagerConfig::from_yaml(
            "resources:\n- kind: Widget\n  apiVersion: v1\n  resetFields:\n    status: [status]\n",
        )
        .unwrap();
        assert!(matches!(config.build(), Err(ConfigError::InvalidPath { .. })));
    }

    #[test]
    fn test_duplicate_kind() {
        let config = FieldManagerConfig::from_yaml(
            "resources:\n- kind: Widget\n  apiVersion: v1\n- kind: Widget\n  apiVersion: v2\n",
        )
        .unwrap();
        assert!(matches!(config.build(), Err(ConfigError::DuplicateKind(kind)) if kind == "Widget"));
    }

    #[test]
    fn test_unserved_api_version() {
        let config = FieldManagerConfig::from_yaml(
            "resources:\n- kind: Widget\n  apiVersion: v2\n  versions: [v1]\n",
        )
        .unwrap();
        let err = config.build().unwrap_err();
        assert_eq!(err.to_string(), "resource Widget: apiVersion v2 is not a served version");
    }
}
