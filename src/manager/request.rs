use crate::managedfields::ManagedFieldsEntry;
use crate::patch::PatchType;
use crate::value::Value;

/// A server-side apply of a partial configuration.
#[derive(Debug, Clone, PartialEq)]
pub struct ApplyRequest {
    /// The stored object, `None` when the apply creates it.
    pub live: Option<Value>,
    pub config: Value,
    pub manager: String,
    /// `""` for the main resource.
    pub subresource: String,
    /// Take over conflicting fields instead of failing.
    pub force: bool,
}

impl ApplyRequest {
    pub fn new(live: Option<Value>, config: Value, manager: impl Into<String>) -> Self {
        ApplyRequest {
            live,
            config,
            manager: manager.into(),
            subresource: String::new(),
            force: false,
        }
    }

    pub fn with_subresource(mut self, subresource: impl Into<String>) -> Self {
        self.subresource = subresource.into();
        self
    }

    pub fn with_force(mut self, force: bool) -> Self {
        self.force = force;
        self
    }
}

/// A full replacement of an object, or its creation.
#[derive(Debug, Clone, PartialEq)]
pub struct UpdateRequest {
    pub live: Option<Value>,
    pub object: Value,
    /// Falls back to the configured default manager.
    pub manager: Option<String>,
    pub subresource: String,
}

impl UpdateRequest {
    pub fn new(live: Option<Value>, object: Value) -> Self {
        UpdateRequest {
            live,
            object,
            manager: None,
            subresource: String::new(),
        }
    }

    pub fn with_manager(mut self, manager: impl Into<String>) -> Self {
        self.manager = Some(manager.into());
        self
    }

    pub fn with_subresource(mut self, subresource: impl Into<String>) -> Self {
        self.subresource = subresource.into();
        self
    }
}

/// A patch of an existing object.
#[derive(Debug, Clone, PartialEq)]
pub struct PatchRequest {
    pub live: Value,
    pub patch: serde_json::Value,
    pub patch_type: PatchType,
    pub manager: Option<String>,
    pub subresource: String,
}

impl PatchRequest {
    pub fn new(live: Value, patch_type: PatchType, patch: serde_json::Value) -> Self {
        PatchRequest {
            live,
            patch,
            patch_type,
            manager: None,
            subresource: String::new(),
        }
    }

    pub fn with_manager(mut self, manager: impl Into<String>) -> Self {
        self.manager = Some(manager.into());
        self
    }

    pub fn with_subresource(mut self, subresource: impl Into<String>) -> Self {
        self.subresource = subresource.into();
        self
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum WriteRequest {
    Apply(ApplyRequest),
    Update(UpdateRequest),
    Patch(PatchRequest),
}

/// The object to persist and its managed fields.
#[derive(Debug, Clone, PartialEq)]
pub struct MergeResult {
    /// The new object, `metadata.managedFields` included.
    pub object: Value,
    pub managed_fields: Vec<ManagedFieldsEntry>,
    /// False when the write left the stored object as it was.
    pub changed: bool,
}
