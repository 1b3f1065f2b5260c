use dealroom_types::Identity;
use serde::{Deserialize, Serialize};

/// How the caller wants an email collision handled.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResolveMode {
    /// Return the existing identity silently.
    #[default]
    UseExisting,
    /// Surface the existing identity so a human can choose.
    Confirm,
    /// Create a duplicate record even though the email is known.
    ForceCreate,
}

/// Outcome of resolving a candidate against the directory.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum Resolution {
    /// An identity with this email already existed and was returned unchanged.
    Resolved { identity: Identity },
    /// The email is known; nothing was written. The caller decides next.
    NeedsDecision { existing: Identity },
    /// A duplicate was created on explicit request.
    ForcedCreate { identity: Identity },
    /// The email was new and a pending identity was created.
    Created { identity: Identity },
}

impl Resolution {
    /// The identity to link against, if the resolution settled on one.
    pub fn identity(&self) -> Option<&Identity> {
        match self {
            Resolution::Resolved { identity }
            | Resolution::ForcedCreate { identity }
            | Resolution::Created { identity } => Some(identity),
            Resolution::NeedsDecision { .. } => None,
        }
    }

    pub fn into_identity(self) -> Option<Identity> {
        match self {
            Resolution::Resolved { identity }
            | Resolution::ForcedCreate { identity }
            | Resolution::Created { identity } => Some(identity),
            Resolution::NeedsDecision { .. } => None,
        }
    }

    pub fn is_new_record(&self) -> bool {
        matches!(
            self,
            Resolution::ForcedCreate { .. } | Resolution::Created { .. }
        )
    }
}
