//! Global participant identities and their deal-scoped links

use crate::email::NormalizedEmail;
use crate::ids::{DealId, IdentityId, ParticipationId};
use crate::role::Role;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Invitation state of an external participant.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InvitationStatus {
    Pending,
    Accepted,
    Declined,
}

/// A deduplicated external party, keyed by normalised email.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Identity {
    pub id: IdentityId,
    pub name: String,
    pub email: NormalizedEmail,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub phone: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub agency: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub internal_notes: Option<String>,
    pub invitation_status: InvitationStatus,
    /// Set on records created with an explicit force-create over an existing email.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub duplicate_of: Option<IdentityId>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Identity {
    /// Build a fresh pending identity from a candidate.
    pub fn from_candidate(candidate: &IdentityCandidate) -> Self {
        let now = Utc::now();
        Self {
            id: IdentityId::generate(),
            name: candidate.name.trim().to_string(),
            email: NormalizedEmail::new(&candidate.email),
            phone: candidate.phone.clone(),
            agency: candidate.agency.clone(),
            internal_notes: candidate.internal_notes.clone(),
            invitation_status: InvitationStatus::Pending,
            duplicate_of: None,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn is_canonical(&self) -> bool {
        self.duplicate_of.is_none()
    }
}

/// Incoming data describing a participant who may or may not already exist.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct IdentityCandidate {
    pub name: String,
    /// Raw email as typed; normalised on every comparison.
    pub email: String,
    #[serde(default)]
    pub phone: Option<String>,
    #[serde(default)]
    pub agency: Option<String>,
    #[serde(default)]
    pub internal_notes: Option<String>,
}

impl IdentityCandidate {
    pub fn new(name: impl Into<String>, email: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            email: email.into(),
            ..Default::default()
        }
    }

    pub fn normalized_email(&self) -> NormalizedEmail {
        NormalizedEmail::new(&self.email)
    }
}

/// Partial update of directory fields. `None` leaves a field untouched.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct IdentityUpdate {
    pub name: Option<String>,
    pub email: Option<String>,
    pub phone: Option<String>,
    pub agency: Option<String>,
    pub internal_notes: Option<String>,
}

/// Capabilities granted to one identity inside one deal.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ParticipantPermissions {
    pub can_view_all_documents: bool,
    pub can_download: bool,
    pub can_upload_documents: bool,
    pub can_view_timeline: bool,
    #[serde(default)]
    pub can_view_roles: Vec<Role>,
}

impl ParticipantPermissions {
    /// Baseline grants for a deal-scoped role.
    pub fn defaults_for(role: Role) -> Self {
        match role {
            Role::Buyer | Role::Seller => Self {
                can_view_all_documents: false,
                can_download: true,
                can_upload_documents: true,
                can_view_timeline: true,
                can_view_roles: vec![role],
            },
            Role::Broker => Self {
                can_view_all_documents: false,
                can_download: true,
                can_upload_documents: true,
                can_view_timeline: true,
                can_view_roles: vec![Role::Buyer, Role::Seller, Role::Broker],
            },
            Role::Lawyer | Role::Admin => Self {
                can_view_all_documents: true,
                can_download: true,
                can_upload_documents: true,
                can_view_timeline: true,
                can_view_roles: Role::ALL.to_vec(),
            },
        }
    }

    /// Apply explicit overrides on top of these grants.
    pub fn apply(&mut self, overrides: &PermissionOverrides) {
        if let Some(v) = overrides.can_view_all_documents {
            self.can_view_all_documents = v;
        }
        if let Some(v) = overrides.can_download {
            self.can_download = v;
        }
        if let Some(v) = overrides.can_upload_documents {
            self.can_upload_documents = v;
        }
        if let Some(v) = overrides.can_view_timeline {
            self.can_view_timeline = v;
        }
        if let Some(roles) = &overrides.can_view_roles {
            let mut roles = roles.clone();
            roles.sort();
            roles.dedup();
            self.can_view_roles = roles;
        }
    }
}

/// Per-participant overrides; unset fields keep the role default.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PermissionOverrides {
    pub can_view_all_documents: Option<bool>,
    pub can_download: Option<bool>,
    pub can_upload_documents: Option<bool>,
    pub can_view_timeline: Option<bool>,
    pub can_view_roles: Option<Vec<Role>>,
}

impl PermissionOverrides {
    pub fn is_empty(&self) -> bool {
        *self == Self::default()
    }
}

/// The deal-scoped link between an identity and a deal.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DealParticipation {
    pub id: ParticipationId,
    pub deal_id: DealId,
    pub identity_id: IdentityId,
    pub role: Role,
    pub permissions: ParticipantPermissions,
    pub joined_at: DateTime<Utc>,
    pub is_active: bool,
}

impl DealParticipation {
    pub fn new(
        deal_id: DealId,
        identity_id: IdentityId,
        role: Role,
        overrides: &PermissionOverrides,
    ) -> Self {
        let mut permissions = ParticipantPermissions::defaults_for(role);
        permissions.apply(overrides);
        Self {
            id: ParticipationId::generate(),
            deal_id,
            identity_id,
            role,
            permissions,
            joined_at: Utc::now(),
            is_active: true,
        }
    }
}

/// Changes allowed through the participation ledger. Name and email are
/// edited through the directory.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ParticipantUpdate {
    pub role: Option<Role>,
    pub permissions: Option<PermissionOverrides>,
}
