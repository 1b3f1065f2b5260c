//! Pure custody transition table and task status derivation.

use dealroom_types::{
    CustodyAction, DealDocument, DealroomError, DealroomResult, DocumentStatus, EntityKind,
    TaskStatus,
};

/// Status a document moves to under `action`, or `InvalidTransition`.
///
/// ```text
/// private ──verify──▶ verified ──release──▶ released
///    │                   │
///    └──reject──▶ rejected ◀──reject──┘
///                    │
///                    ├──reject──▶ rejected   (replaces the reason)
///                    └──verify──▶ verified   (only with the override enabled)
/// ```
///
/// Re-submission after a rejection is a new upload, never a transition.
pub fn next_status(
    current: DocumentStatus,
    action: CustodyAction,
    allow_rejected_override: bool,
) -> DealroomResult<DocumentStatus> {
    use CustodyAction::*;
    use DocumentStatus::*;

    let allowed = match (current, action) {
        (Private, Verify) => true,
        (Rejected, Verify) => allow_rejected_override,
        (Verified, Release) => true,
        (Private | Verified | Rejected, Reject) => true,
        _ => false,
    };

    if allowed {
        Ok(action.target())
    } else {
        Err(DealroomError::invalid_transition(
            EntityKind::Document,
            current,
            action,
        ))
    }
}

/// Derive a task's status from all documents filed under it.
///
/// Completed once any document is released, in review once any document
/// exists, pending otherwise. Safe to re-run at any time.
pub fn recompute_task_status(documents: &[DealDocument]) -> TaskStatus {
    if documents
        .iter()
        .any(|d| d.status == DocumentStatus::Released)
    {
        TaskStatus::Completed
    } else if documents.is_empty() {
        TaskStatus::Pending
    } else {
        TaskStatus::InReview
    }
}
