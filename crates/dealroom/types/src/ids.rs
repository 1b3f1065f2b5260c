//! Strongly-typed identifiers for dealroom entities
//!
//! All IDs are string-backed newtypes. Generated IDs are UUID v4; callers
//! rehydrating rows from storage use `new`.

use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

macro_rules! string_id {
    ($(#[$meta:meta])* $name:ident, $prefix:literal) => {
        $(#[$meta])*
        #[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(String);

        impl $name {
            pub fn new(id: impl Into<String>) -> Self {
                Self(id.into())
            }

            pub fn generate() -> Self {
                Self(Uuid::new_v4().to_string())
            }

            pub fn as_str(&self) -> &str {
                &self.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, concat!($prefix, ":{}"), self.0)
            }
        }

        impl From<&str> for $name {
            fn from(value: &str) -> Self {
                Self::new(value)
            }
        }
    };
}

string_id!(
    /// Identifier of a global directory identity
    IdentityId,
    "identity"
);
string_id!(
    /// Identifier of a deal
    DealId,
    "deal"
);
string_id!(
    /// Identifier of a deal participation link
    ParticipationId,
    "participation"
);
string_id!(
    /// Identifier of a document requirement (task)
    TaskId,
    "task"
);
string_id!(
    /// Identifier of an uploaded document attempt
    DocumentId,
    "document"
);
string_id!(
    /// Identifier of a timeline step, unique within one deal's timeline
    StepId,
    "step"
);
string_id!(
    /// Identifier of an audit log entry
    AuditEntryId,
    "audit"
);

/// Opaque reference returned by the blob store. The core never inspects it.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct BlobRef(String);

impl BlobRef {
    pub fn new(key: impl Into<String>) -> Self {
        Self(key.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for BlobRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}
