//! Uploaded documents and their custody status

use crate::ids::{BlobRef, DocumentId, TaskId};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Custody status of one document attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DocumentStatus {
    Private,
    Verified,
    Released,
    Rejected,
}

impl DocumentStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            DocumentStatus::Private => "private",
            DocumentStatus::Verified => "verified",
            DocumentStatus::Released => "released",
            DocumentStatus::Rejected => "rejected",
        }
    }
}

impl fmt::Display for DocumentStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Staff actions that move a document between custody states.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CustodyAction {
    Verify,
    Release,
    Reject,
}

impl CustodyAction {
    pub fn as_str(&self) -> &'static str {
        match self {
            CustodyAction::Verify => "verify",
            CustodyAction::Release => "release",
            CustodyAction::Reject => "reject",
        }
    }

    /// Status a successful action lands on.
    pub fn target(&self) -> DocumentStatus {
        match self {
            CustodyAction::Verify => DocumentStatus::Verified,
            CustodyAction::Release => DocumentStatus::Released,
            CustodyAction::Reject => DocumentStatus::Rejected,
        }
    }
}

impl fmt::Display for CustodyAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One uploaded file attempt against a task.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DealDocument {
    pub id: DocumentId,
    pub task_id: TaskId,
    pub title: String,
    pub storage_key: BlobRef,
    /// Identity id of an external participant, or the user id of staff.
    pub uploaded_by: String,
    pub status: DocumentStatus,
    pub uploaded_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub verified_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rejection_reason: Option<String>,
}

impl DealDocument {
    pub fn new(task_id: TaskId, title: impl Into<String>, storage_key: BlobRef, uploaded_by: impl Into<String>) -> Self {
        Self {
            id: DocumentId::generate(),
            task_id,
            title: title.into(),
            storage_key,
            uploaded_by: uploaded_by.into(),
            status: DocumentStatus::Private,
            uploaded_at: Utc::now(),
            verified_at: None,
            rejection_reason: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_document_is_private() {
        let doc = DealDocument::new(TaskId::new("t"), "Deed", BlobRef::new("blob/1"), "u1");
        assert_eq!(doc.status, DocumentStatus::Private);
        assert!(doc.verified_at.is_none());
        assert!(doc.rejection_reason.is_none());
    }

    #[test]
    fn test_action_targets() {
        assert_eq!(CustodyAction::Verify.target(), DocumentStatus::Verified);
        assert_eq!(CustodyAction::Release.target(), DocumentStatus::Released);
        assert_eq!(CustodyAction::Reject.target(), DocumentStatus::Rejected);
    }
}
