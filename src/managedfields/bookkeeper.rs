//! Bounds the number of Update entries kept on an object.

use super::entry::Operation;
use super::managed::{ManagedFields, ManagerKey, VersionedSet};
use crate::fieldpath::{APIVersion, FieldSet};
use crate::version::{ConversionError, VersionConverter};
use tracing::{debug, warn};

pub const DEFAULT_HISTORY_CAP: usize = 10;
pub const DEFAULT_ANCIENT_CHANGES_MANAGER: &str = "ancient-changes";

/// Bookkeeper folds the oldest Update entries into a single bucket entry
/// once there are more than `history_cap` of them. Apply entries are never
/// folded.
#[derive(Debug, Clone)]
pub struct Bookkeeper {
    history_cap: usize,
    ancient_changes_manager: String,
}

impl Default for Bookkeeper {
    fn default() -> Self {
        Bookkeeper::new(DEFAULT_HISTORY_CAP, DEFAULT_ANCIENT_CHANGES_MANAGER)
    }
}

impl Bookkeeper {
    /// The bucket always survives folding, so a `history_cap` below one
    /// behaves like one.
    pub fn new(history_cap: usize, ancient_changes_manager: impl Into<String>) -> Self {
        Bookkeeper {
            history_cap,
            ancient_changes_manager: ancient_changes_manager.into(),
        }
    }

    pub fn history_cap(&self) -> usize {
        self.history_cap
    }

    fn bucket_key(&self) -> ManagerKey {
        ManagerKey::update(self.ancient_changes_manager.clone(), "")
    }

    /// Folds the oldest Update entries into the bucket until at most
    /// `history_cap` Update entries remain, bucket included.
    ///
    /// Folded sets are converted to `version`, which becomes the bucket's
    /// version. The bucket takes the latest time among the folded entries.
    pub fn cap_history(
        &self,
        managed: &mut ManagedFields,
        converter: &dyn VersionConverter,
        version: &APIVersion,
    ) -> Result<(), ConversionError> {
        let bucket_key = self.bucket_key();
        let mut updaters: Vec<(ManagerKey, VersionedSet)> = managed
            .iter()
            .filter(|(key, _)| key.operation == Operation::Update)
            .map(|(key, vs)| (key.clone(), vs.clone()))
            .collect();
        if updaters.len() <= self.history_cap {
            return Ok(());
        }
        updaters.sort_by(|(ka, a), (kb, b)| {
            a.time
                .cmp(&b.time)
                .then_with(|| ka.manager.cmp(&kb.manager))
                .then_with(|| ka.subresource.cmp(&kb.subresource))
        });

        let mut bucket = match managed.remove(&bucket_key) {
            Some(existing) => VersionedSet::new(
                converter.convert(&existing.set, &existing.api_version, version)?,
                version.clone(),
                existing.time,
            ),
            None => VersionedSet::new(FieldSet::new(), version.clone(), None),
        };
        // Counts the bucket as if it were already in place.
        let had_bucket = updaters.iter().any(|(k, _)| *k == bucket_key);
        let mut remaining = updaters.len() + usize::from(!had_bucket);
        let mut folded = 0;

        for (key, vs) in updaters {
            if remaining <= self.history_cap {
                break;
            }
            if key == bucket_key {
                continue;
            }
            managed.remove(&key);
            remaining -= 1;
            folded += 1;
            match converter.convert(&vs.set, &vs.api_version, version) {
                Ok(set) => bucket.set = bucket.set.union(&set),
                Err(err) if err.is_missing_version() => {
                    warn!(manager = %key.manager, error = %err, "dropping obsolete entry while folding history");
                }
                Err(err) => return Err(err),
            }
            bucket.time = bucket.time.max(vs.time);
        }

        debug!(
            folded,
            manager = %self.ancient_changes_manager,
            "folded old update entries"
        );
        managed.insert(bucket_key, bucket);
        Ok(())
    }
}
