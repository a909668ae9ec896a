//! # Field Manager
//!
//! Server-side apply for Kubernetes-style objects: field ownership tracking,
//! conflict detection and three-way merge of partial configurations.
//!
//! Many managers write to the same object. Each write is merged into the
//! stored object, and for every field the object records in
//! `metadata.managedFields` which manager last claimed it. An apply that
//! would change a field someone else owns is rejected with the list of
//! conflicts unless it is forced.
//!
//! ## Modules
//!
//! - [`value`] - In-memory representation of YAML/JSON objects
//! - [`schema`] - Type schema describing maps, associative lists and sets
//! - [`fieldpath`] - Field paths, field sets and their FieldsV1 encoding
//! - [`typed`] - Schema-aware operations on values (field sets, compare, merge)
//! - [`managedfields`] - Ownership records and the history cap
//! - [`resetfields`] - Filters for system-owned and other endpoints' fields
//! - [`version`] - Conversion of field sets between API versions
//! - [`merge`] - Conflict detection and the apply/update ownership engine
//! - [`patch`] - JSON, merge and strategic merge patches
//! - [`manager`] - The [`FieldManager`] handling apply, update and patch
//! - [`config`] - Configuration and the resource registry

pub mod config;
pub mod error;
pub mod fieldpath;
pub mod managedfields;
pub mod manager;
pub mod merge;
pub mod patch;
pub mod resetfields;
pub mod schema;
pub mod typed;
pub mod value;
pub mod version;

pub use config::{FieldManagerConfig, Resource, ResourceRegistry};
pub use error::{Error, Result};
pub use fieldpath::{APIVersion, FieldSet, Path, PathElement};
pub use managedfields::{ManagedFields, ManagedFieldsEntry, ManagerKey, Operation, VersionedSet};
pub use manager::{
    ApplyRequest, Clock, FieldManager, FixedClock, MergeResult, PatchRequest, SystemClock,
    UpdateRequest, WriteRequest,
};
pub use merge::{Conflict, Conflicts, Updater, UpdaterBuilder};
pub use patch::PatchType;
pub use schema::Schema;
pub use typed::{Comparison, TypedValue};
pub use value::Value;
