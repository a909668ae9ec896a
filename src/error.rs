//! Errors returned by the field manager.

use crate::config::ConfigError;
use crate::fieldpath::SerializeError;
use crate::merge::{Conflicts, MergeError};
use crate::patch::PatchError;
use crate::typed::ValidationErrors;
use crate::version::ConversionError;
use thiserror::Error;

pub type Result<T, E = Error> = std::result::Result<T, E>;

#[derive(Debug, Error)]
pub enum Error {
    /// The apply changes fields other managers own.
    #[error(transparent)]
    Conflict(Conflicts),

    /// An apply that creates the object names a uid, which no new object
    /// can match.
    #[error("cannot create an object with metadata.uid {0:?} from an apply configuration")]
    UidOnCreate(String),

    #[error("field manager is required for apply requests")]
    MissingFieldManager,

    #[error("apiVersion {actual:?} does not match the expected version {expected:?}")]
    VersionMismatch { expected: String, actual: String },

    #[error("kind {actual:?} does not match the expected kind {expected:?}")]
    KindMismatch { expected: String, actual: String },

    #[error("metadata.managedFields must be nil or empty in an apply configuration")]
    ManagedFieldsInApplyConfig,

    #[error("no resource is registered for kind {0:?}")]
    UnknownKind(String),

    #[error("invalid object: {0}")]
    InvalidObject(String),

    #[error("object is invalid:\n{0}")]
    Validation(#[from] ValidationErrors),

    #[error(transparent)]
    Conversion(#[from] ConversionError),

    #[error("failed to encode managed fields: {0}")]
    Serialize(#[from] SerializeError),

    #[error(transparent)]
    Patch(#[from] PatchError),

    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error("object is too large: {size} bytes exceeds the limit of {limit} bytes")]
    ObjectTooLarge { size: usize, limit: usize },

    #[error(transparent)]
    Json(#[from] serde_json::Error),
}

impl Error {
    /// Returns true when the request conflicts with the stored object.
    pub fn is_conflict(&self) -> bool {
        matches!(self, Error::Conflict(_) | Error::UidOnCreate(_))
    }

    /// Returns true for errors caused by the request rather than by the
    /// stored state or the configuration.
    pub fn is_client_error(&self) -> bool {
        matches!(
            self,
            Error::Conflict(_)
                | Error::UidOnCreate(_)
                | Error::MissingFieldManager
                | Error::VersionMismatch { .. }
                | Error::KindMismatch { .. }
                | Error::ManagedFieldsInApplyConfig
                | Error::InvalidObject(_)
                | Error::Validation(_)
                | Error::Patch(_)
                | Error::ObjectTooLarge { .. }
        )
    }
}

impl From<MergeError> for Error {
    fn from(err: MergeError) -> Self {
        match err {
            MergeError::Conflicts(conflicts) => Error::Conflict(conflicts),
            MergeError::Conversion(err) => Error::Conversion(err),
            MergeError::Validation(err) => Error::Validation(err),
        }
    }
}
