//! Deal and directory administration capabilities keyed on the global role.

use dealroom_types::{Actor, DealroomError, DealroomResult, Role};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Administrative actions gated on the actor's global role.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Capability {
    /// Create deals and tasks, hold/activate, move the timeline.
    EditDeals,
    /// Close and reopen deals.
    CloseDeals,
    /// Add, remove and update deal participants.
    ManageParticipants,
    /// Create and edit directory identities.
    ManageDirectory,
    /// Destructive identity deletion.
    DeleteIdentities,
    /// Verify, release, reject.
    CustodyTransitions,
    /// Read the audit trail.
    ReadAudit,
}

impl Capability {
    /// Global roles holding this capability.
    pub fn roles(&self) -> &'static [Role] {
        match self {
            Capability::EditDeals
            | Capability::ManageParticipants
            | Capability::ManageDirectory => &[Role::Broker, Role::Lawyer, Role::Admin],
            Capability::CloseDeals | Capability::CustodyTransitions | Capability::ReadAudit => {
                &[Role::Lawyer, Role::Admin]
            }
            Capability::DeleteIdentities => &[Role::Admin],
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Capability::EditDeals => "edit deals",
            Capability::CloseDeals => "close deals",
            Capability::ManageParticipants => "manage participants",
            Capability::ManageDirectory => "manage directory",
            Capability::DeleteIdentities => "delete identities",
            Capability::CustodyTransitions => "custody transitions",
            Capability::ReadAudit => "read audit",
        }
    }

    fn required(&self) -> String {
        let roles = self.roles().iter().map(Role::as_str).collect::<Vec<_>>();
        match roles.as_slice() {
            [only] => format!("role {only}"),
            [init @ .., last] => format!("role {} or {last}", init.join(", ")),
            [] => "no role".to_string(),
        }
    }
}

impl fmt::Display for Capability {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

pub fn has_capability(actor: &Actor, capability: Capability) -> bool {
    capability.roles().contains(&actor.role)
}

pub fn can_edit_deals(actor: &Actor) -> bool {
    has_capability(actor, Capability::EditDeals)
}

pub fn can_close_deals(actor: &Actor) -> bool {
    has_capability(actor, Capability::CloseDeals)
}

/// Fail with `PermissionDenied` naming the action and the roles that hold it.
pub fn authorize(actor: &Actor, capability: Capability, action: &str) -> DealroomResult<()> {
    if has_capability(actor, capability) {
        Ok(())
    } else {
        Err(DealroomError::permission_denied(action, capability.required()))
    }
}
