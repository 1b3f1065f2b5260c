use dealroom_types::{DealroomError, EntityKind};
use thiserror::Error;

/// Result type for storage operations.
pub type StorageResult<T> = Result<T, StorageError>;

/// Storage-layer errors.
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("{entity} not found: {id}")]
    NotFound { entity: EntityKind, id: String },

    #[error("conflict: {0}")]
    Conflict(String),

    #[error("version conflict on {entity} {id}: expected {expected}, found {found}")]
    VersionConflict {
        entity: EntityKind,
        id: String,
        expected: u64,
        found: u64,
    },

    /// The normalised email is already held by a canonical identity.
    #[error("unique constraint violated on {key}: held by {existing_id}")]
    UniqueViolation { key: String, existing_id: String },

    #[error("serialization error: {0}")]
    Serialization(String),

    #[error("backend error: {0}")]
    Backend(String),
}

impl StorageError {
    pub fn not_found(entity: EntityKind, id: impl std::fmt::Display) -> Self {
        Self::NotFound {
            entity,
            id: id.to_string(),
        }
    }
}

impl From<StorageError> for DealroomError {
    fn from(value: StorageError) -> Self {
        match value {
            StorageError::NotFound { entity, id } => DealroomError::NotFound { entity, id },
            StorageError::VersionConflict { entity, id, .. } => {
                DealroomError::ConcurrentModification { entity, id }
            }
            StorageError::Conflict(msg) => DealroomError::InvalidInput(msg),
            StorageError::UniqueViolation { key, .. } => {
                DealroomError::InvalidInput(format!("{key} is already in use"))
            }
            StorageError::Serialization(msg) | StorageError::Backend(msg) => {
                DealroomError::StorageFailure(msg)
            }
        }
    }
}
