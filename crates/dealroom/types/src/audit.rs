//! Audit log records

use crate::ids::{AuditEntryId, DealId};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;

/// Every mutating action the core records.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AuditAction {
    IdentityCreated,
    IdentityUpdated,
    IdentityDeleted,
    InvitationStatusChanged,
    ParticipantAdded,
    ParticipantReactivated,
    ParticipantUpdated,
    ParticipantRemoved,
    DealCreated,
    DealClosed,
    DealReopened,
    DealStatusChanged,
    TimelineStepAdvanced,
    TimelineReplaced,
    TaskCreated,
    TaskStatusChanged,
    DocumentUploaded,
    DocumentVerified,
    DocumentReleased,
    DocumentRejected,
}

impl AuditAction {
    pub fn as_str(&self) -> &'static str {
        match self {
            AuditAction::IdentityCreated => "identity_created",
            AuditAction::IdentityUpdated => "identity_updated",
            AuditAction::IdentityDeleted => "identity_deleted",
            AuditAction::InvitationStatusChanged => "invitation_status_changed",
            AuditAction::ParticipantAdded => "participant_added",
            AuditAction::ParticipantReactivated => "participant_reactivated",
            AuditAction::ParticipantUpdated => "participant_updated",
            AuditAction::ParticipantRemoved => "participant_removed",
            AuditAction::DealCreated => "deal_created",
            AuditAction::DealClosed => "deal_closed",
            AuditAction::DealReopened => "deal_reopened",
            AuditAction::DealStatusChanged => "deal_status_changed",
            AuditAction::TimelineStepAdvanced => "timeline_step_advanced",
            AuditAction::TimelineReplaced => "timeline_replaced",
            AuditAction::TaskCreated => "task_created",
            AuditAction::TaskStatusChanged => "task_status_changed",
            AuditAction::DocumentUploaded => "document_uploaded",
            AuditAction::DocumentVerified => "document_verified",
            AuditAction::DocumentReleased => "document_released",
            AuditAction::DocumentRejected => "document_rejected",
        }
    }
}

impl fmt::Display for AuditAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Audit append payload. Ids, sequence and hashes are assigned by storage.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuditAppend {
    /// `None` for directory-level actions that are not scoped to a deal.
    pub deal_id: Option<DealId>,
    pub actor_id: String,
    pub actor_name: String,
    pub action: AuditAction,
    pub details: String,
    #[serde(default)]
    pub payload: Value,
    pub timestamp: DateTime<Utc>,
}

/// Persistent, hash-linked audit record. Never mutated once written.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuditLogEntry {
    pub id: AuditEntryId,
    pub sequence: u64,
    pub deal_id: Option<DealId>,
    pub actor_id: String,
    pub actor_name: String,
    pub action: AuditAction,
    pub details: String,
    pub payload: Value,
    pub timestamp: DateTime<Utc>,
    pub previous_hash: Option<String>,
    pub hash: String,
}
