//! Error taxonomy returned at the call boundary

use crate::deal::TimelineViolation;
use crate::identity::Identity;
use serde::Serialize;
use std::fmt;
use thiserror::Error;

/// Result type for dealroom operations
pub type DealroomResult<T> = Result<T, DealroomError>;

/// Kind of entity an error refers to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum EntityKind {
    Identity,
    Participation,
    Deal,
    Task,
    Document,
    TimelineStep,
    Blob,
}

impl fmt::Display for EntityKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            EntityKind::Identity => "identity",
            EntityKind::Participation => "participation",
            EntityKind::Deal => "deal",
            EntityKind::Task => "task",
            EntityKind::Document => "document",
            EntityKind::TimelineStep => "timeline step",
            EntityKind::Blob => "blob",
        };
        f.write_str(name)
    }
}

/// Recoverable failures of any inbound operation.
#[derive(Debug, Error)]
pub enum DealroomError {
    #[error("{entity} not found: {id}")]
    NotFound { entity: EntityKind, id: String },

    #[error("cannot {requested} {entity} in state {current}")]
    InvalidTransition {
        entity: EntityKind,
        current: String,
        requested: String,
    },

    #[error("invalid timeline: {0}")]
    InvalidTimeline(#[from] TimelineViolation),

    #[error("an identity with email {} already exists", .existing.email)]
    DuplicateIdentity { existing: Box<Identity> },

    #[error("{entity} {id} was modified concurrently, please retry")]
    ConcurrentModification { entity: EntityKind, id: String },

    #[error("permission denied: {action} requires {required}")]
    PermissionDenied { action: String, required: String },

    #[error("invalid input: {0}")]
    InvalidInput(String),

    #[error("storage failure: {0}")]
    StorageFailure(String),
}

impl DealroomError {
    pub fn not_found(entity: EntityKind, id: impl fmt::Display) -> Self {
        Self::NotFound {
            entity,
            id: id.to_string(),
        }
    }

    pub fn invalid_transition(
        entity: EntityKind,
        current: impl fmt::Display,
        requested: impl fmt::Display,
    ) -> Self {
        Self::InvalidTransition {
            entity,
            current: current.to_string(),
            requested: requested.to_string(),
        }
    }

    pub fn permission_denied(action: impl Into<String>, required: impl Into<String>) -> Self {
        Self::PermissionDenied {
            action: action.into(),
            required: required.into(),
        }
    }

    /// Whether the caller should simply retry the same request.
    pub fn is_retryable(&self) -> bool {
        matches!(self, DealroomError::ConcurrentModification { .. })
    }
}
