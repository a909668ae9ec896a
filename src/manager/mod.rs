//! The field manager: the entry point for writes to a resource.
//!
//! A [`FieldManager`] serves one resource kind in one API version. For every
//! write it decodes the stored ownership records, runs the merge engine,
//! folds old history and returns the object to persist with its new
//! `metadata.managedFields`. Nothing is cached between calls.

mod clock;
mod object;
mod request;


pub use clock::*;
pub use request::*;

use crate::config::{ManagerSettings, Resource, ResourceRegistry};
use crate::error::{Error, Result};
use crate::fieldpath::{APIVersion, FieldSet};
use crate::managedfields::{Bookkeeper, ManagedFields, ManagedFieldsPayload};
use crate::merge::{Updater, WriteContext};
use crate::patch;
use crate::resetfields::StripMetaFilter;
use crate::schema::Schema;
use crate::typed::{as_typed, TypedValue};
use crate::value::{Map, Value};
use chrono::{DateTime, Utc};
use std::sync::Arc;
use tracing::{debug, info};

#[derive(Debug, Clone)]
pub struct FieldManager {
    resource: Resource,
    version: APIVersion,
    schema: Arc<Schema>,
    settings: ManagerSettings,
    bookkeeper: Bookkeeper,
    clock: Arc<dyn Clock>,
}

impl FieldManager {
    /// Creates the field manager of a registered kind.
    pub fn new(registry: &ResourceRegistry, kind: &str) -> Result<Self> {
        let resource = registry
            .get(kind)
            .cloned()
            .ok_or_else(|| Error::UnknownKind(kind.to_string()))?;
        Ok(Self::with_resource(registry, resource))
    }

    pub fn with_resource(registry: &ResourceRegistry, resource: Resource) -> Self {
        FieldManager {
            version: resource.api_version.clone(),
            resource,
            schema: Arc::clone(&registry.schema),
            bookkeeper: Bookkeeper::new(
                registry.settings.history_cap,
                registry.settings.ancient_changes_manager.clone(),
            ),
            settings: registry.settings.clone(),
            clock: Arc::new(SystemClock),
        }
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    /// Serves writes made in `version` rather than the resource's default
    /// version.
    pub fn with_version(mut self, version: impl Into<APIVersion>) -> Result<Self> {
        let version = version.into();
        self.resource
            .converter
            .convert(&Default::default(), &version, &version)?;
        self.version = version;
        Ok(self)
    }

    pub fn resource(&self) -> &Resource {
        &self.resource
    }

    pub fn version(&self) -> &APIVersion {
        &self.version
    }

    pub fn merge(&self, request: WriteRequest) -> Result<MergeResult> {
        match request {
            WriteRequest::Apply(request) => self.apply(&request),
            WriteRequest::Update(request) => self.update(&request),
            WriteRequest::Patch(request) => self.patch(&request),
        }
    }

    /// Applies a partial configuration on behalf of `request.manager`.
    ///
    /// Fails with [`Error::Conflict`] when the configuration changes fields
    /// another manager owns, unless the request is forced. Fields recorded
    /// by a previous client-side apply of the last-applied manager never
    /// conflict for that manager.
    pub fn apply(&self, request: &ApplyRequest) -> Result<MergeResult> {
        if request.manager.is_empty() {
            return Err(Error::MissingFieldManager);
        }
        if !request.config.is_map() {
            return Err(Error::InvalidObject(format!(
                "apply configuration must be a map, got {}",
                request.config.type_name()
            )));
        }
        self.check_identity(&request.config, true)?;
        let clear = match ManagedFieldsPayload::read(&request.config) {
            ManagedFieldsPayload::Missing => false,
            ManagedFieldsPayload::Cleared => true,
            ManagedFieldsPayload::Entries(_) => return Err(Error::ManagedFieldsInApplyConfig),
        };
        if request.live.is_none() {
            if let Some(uid) = object::uid(&request.config) {
                return Err(Error::UidOnCreate(uid.to_string()));
            }
        }

        let ctx = self.context(&request.manager, &request.subresource, self.clock.now());
        let config = self
            .resource
            .reset_fields
            .strip_value(&object::without_managed_fields(&request.config), &request.subresource);
        let config = self.validated(config)?;

        let mut managers = self.stored_managers(request.live.as_ref());
        let live = self.live_object(request.live.as_ref());
        if request.live.is_some() && managers.is_empty() {
            self.attribute_existing(&live, &mut managers, ctx.time)?;
        }

        let allowed = self.client_side_applied(&request.manager, &live);
        let new_object = self.updater(&request.subresource).apply_allowing(
            &live,
            &config,
            &ctx,
            &mut managers,
            request.force,
            &allowed,
        )?;
        if clear {
            info!(manager = %ctx.manager, "clearing managed fields");
            managers = ManagedFields::new();
        }
        self.finish(request.live.as_ref(), new_object, managers)
    }

    /// Records a full replacement of the object.
    pub fn update(&self, request: &UpdateRequest) -> Result<MergeResult> {
        if !request.object.is_map() {
            return Err(Error::InvalidObject(format!(
                "object must be a map, got {}",
                request.object.type_name()
            )));
        }
        self.check_identity(&request.object, false)?;
        let manager = self.update_manager(request.manager.as_deref());
        self.record_update(
            request.live.as_ref(),
            request.object.clone(),
            manager,
            &request.subresource,
        )
    }

    /// Applies a patch to the live object and records it as an update.
    pub fn patch(&self, request: &PatchRequest) -> Result<MergeResult> {
        let live = self.typed(request.live.clone());
        let patched = patch::apply_patch(request.patch_type, &live, &request.patch)?;
        self.check_identity(patched.value(), false)?;
        let manager = self.update_manager(request.manager.as_deref());
        self.record_update(
            Some(&request.live),
            patched.into_value(),
            manager,
            &request.subresource,
        )
    }

    fn record_update(
        &self,
        live_value: Option<&Value>,
        new_value: Value,
        manager: &str,
        subresource: &str,
    ) -> Result<MergeResult> {
        let ctx = self.context(manager, subresource, self.clock.now());
        let stored = self.stored_managers(live_value);

        // Subresource writes cannot rewrite ownership.
        let sent = if subresource.is_empty() {
            ManagedFieldsPayload::read(&new_value)
        } else {
            ManagedFieldsPayload::Missing
        };
        let untracked = live_value.is_some() && stored.is_empty() && sent == ManagedFieldsPayload::Missing;
        let (mut managers, clear) = match sent {
            ManagedFieldsPayload::Missing => (stored, false),
            ManagedFieldsPayload::Cleared => (ManagedFields::new(), true),
            ManagedFieldsPayload::Entries(sent) => (sent, false),
        };

        let live_stripped = live_value.map(object::without_managed_fields);
        let new_value = self.resource.reset_fields.restore_value(
            &object::without_managed_fields(&new_value),
            live_stripped.as_ref(),
            subresource,
        );
        let new_object = self.validated(new_value)?;

        if untracked {
            debug!(manager = %ctx.manager, "object has no managed fields, not tracking the update");
            return self.finish(live_value, new_object, ManagedFields::new());
        }

        let live = self.live_object(live_value);
        self.updater(subresource)
            .update(&live, &new_object, &ctx, &mut managers)?;
        if clear {
            info!(manager = %ctx.manager, "clearing managed fields");
            managers = ManagedFields::new();
        }
        self.finish(live_value, new_object, managers)
    }

    /// Credits an existing object's fields to the before-first-apply
    /// manager, so that the first apply conflicts where it changes them.
    fn attribute_existing(
        &self,
        live: &TypedValue,
        managers: &mut ManagedFields,
        time: DateTime<Utc>,
    ) -> Result<()> {
        let Some(manager) = &self.settings.before_first_apply_manager else {
            return Ok(());
        };
        debug!(manager = %manager, "attributing existing fields");
        let ctx = self.context(manager, "", time);
        self.updater("").update(&live.empty(), live, &ctx, managers)?;
        Ok(())
    }

    /// Fields of the last-applied annotation that still hold the value
    /// they were applied with. Empty unless `manager` is the last-applied
    /// manager.
    fn client_side_applied(&self, manager: &str, live: &TypedValue) -> FieldSet {
        if self.settings.last_applied_manager.as_deref() != Some(manager) {
            return FieldSet::new();
        }
        let Some(annotation) = object::last_applied_configuration(live.value()) else {
            return FieldSet::new();
        };
        let last_applied = match serde_json::from_str::<serde_json::Value>(annotation) {
            Ok(json) => Value::from(json),
            Err(err) => {
                debug!(error = %err, "ignoring unreadable last-applied configuration");
                return FieldSet::new();
            }
        };
        let last_applied = match self.validated(last_applied) {
            Ok(last_applied) => last_applied,
            Err(err) => {
                debug!(error = %err, "ignoring invalid last-applied configuration");
                return FieldSet::new();
            }
        };
        match last_applied.compare(live) {
            Ok(comparison) => last_applied
                .to_field_set()
                .difference(&comparison.modified)
                .difference(&comparison.removed),
            Err(err) => {
                debug!(error = %err, "ignoring last-applied configuration");
                FieldSet::new()
            }
        }
    }

    fn finish(
        &self,
        live_value: Option<&Value>,
        new_object: TypedValue,
        mut managers: ManagedFields,
    ) -> Result<MergeResult> {
        self.bookkeeper
            .cap_history(&mut managers, self.resource.converter.as_ref(), &self.version)?;
        managers.remove_empty();
        let managed_fields = managers.encode()?;
        let object = object::with_managed_fields(new_object.into_value(), &managed_fields)?;

        if let Some(limit) = self.settings.max_object_bytes {
            let size = object::encoded_size(&object)?;
            if size > limit {
                return Err(Error::ObjectTooLarge { size, limit });
            }
        }

        Ok(MergeResult {
            changed: live_value != Some(&object),
            object,
            managed_fields,
        })
    }

    fn context(&self, manager: &str, subresource: &str, time: DateTime<Utc>) -> WriteContext {
        WriteContext::new(manager, subresource, self.version.clone(), time)
    }

    fn update_manager<'a>(&'a self, manager: Option<&'a str>) -> &'a str {
        manager
            .filter(|m| !m.is_empty())
            .unwrap_or(self.settings.default_update_manager.as_str())
    }

    fn updater(&self, subresource: &str) -> Updater {
        Updater::builder()
            .converter(Arc::clone(&self.resource.converter))
            .filter(Arc::new(StripMetaFilter))
            .filter(Arc::new(self.resource.reset_fields.filter_for(subresource)))
            .build()
    }

    fn stored_managers(&self, live: Option<&Value>) -> ManagedFields {
        live.map(ManagedFieldsPayload::read)
            .map(ManagedFieldsPayload::into_managed_fields)
            .unwrap_or_default()
    }

    fn live_object(&self, live: Option<&Value>) -> TypedValue {
        let value = live
            .map(object::without_managed_fields)
            .unwrap_or_else(|| Value::Map(Map::new()));
        self.typed(value)
    }

    fn typed(&self, value: Value) -> TypedValue {
        TypedValue::new(value, Arc::clone(&self.schema), self.resource.type_ref.clone())
    }

    fn validated(&self, value: Value) -> Result<TypedValue> {
        Ok(as_typed(value, Arc::clone(&self.schema), self.resource.type_ref.clone())?)
    }

    /// Checks `kind` and `apiVersion`. When `required` is false, absent
    /// fields are accepted.
    fn check_identity(&self, object: &Value, required: bool) -> Result<()> {
        match object::kind(object) {
            Some(kind) if kind == self.resource.kind => {}
            None if !required => {}
            actual => {
                return Err(Error::KindMismatch {
                    expected: self.resource.kind.clone(),
                    actual: actual.unwrap_or_default().to_string(),
                })
            }
        }
        match object::api_version(object) {
            Some(version) if version == self.version.as_str() => Ok(()),
            None if !required => Ok(()),
            actual => Err(Error::VersionMismatch {
                expected: self.version.to_string(),
                actual: actual.unwrap_or_default().to_string(),
            }),
        }
    }
}
