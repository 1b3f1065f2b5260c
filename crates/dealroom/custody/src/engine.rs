//! Custody engine: applies the transition table against storage.
//!
//! Every transition is a read followed by a compare-and-swap on the version
//! that was read, so a concurrent writer on the same document makes exactly
//! one of the two calls fail with `ConcurrentModification`. Nothing is
//! written when the check fails.

use crate::machine::{next_status, recompute_task_status};
use chrono::Utc;
use dealroom_policy::{can_transition_document, can_upload};
use dealroom_storage::{DocumentStore, StorageError, TaskStore, Versioned};
use dealroom_types::{
    Actor, BlobRef, CustodyAction, DealDocument, DealParticipation, DealroomError,
    DealroomResult, DocumentId, DocumentStatus, EntityKind, Task, TaskId, TaskStatus,
};
use serde::Serialize;
use std::sync::Arc;
use tracing::{debug, info, warn};

const TASK_SYNC_ATTEMPTS: usize = 3;

/// A derived task status that actually changed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TaskStatusChange {
    pub task: Task,
    pub from: TaskStatus,
    pub to: TaskStatus,
}

#[derive(Debug, Clone, Serialize)]
pub struct UploadOutcome {
    pub document: DealDocument,
    pub task: Task,
    pub task_change: Option<TaskStatusChange>,
    /// The document is stored but its task status could not be re-derived.
    pub task_sync_failed: bool,
}

#[derive(Debug, Clone, Serialize)]
pub struct TransitionOutcome {
    pub document: DealDocument,
    pub action: CustodyAction,
    pub from: DocumentStatus,
    pub task_change: Option<TaskStatusChange>,
    pub task_sync_failed: bool,
}

/// Document custody over the document and task stores.
pub struct DocumentCustody {
    documents: Arc<dyn DocumentStore>,
    tasks: Arc<dyn TaskStore>,
    allow_rejected_override: bool,
}

impl DocumentCustody {
    pub fn new(documents: Arc<dyn DocumentStore>, tasks: Arc<dyn TaskStore>) -> Self {
        Self {
            documents,
            tasks,
            allow_rejected_override: true,
        }
    }

    /// Whether a lawyer may verify a rejected document without a re-upload.
    pub fn with_rejected_override(mut self, allow: bool) -> Self {
        self.allow_rejected_override = allow;
        self
    }

    pub async fn task(&self, task_id: &TaskId) -> DealroomResult<Task> {
        self.tasks
            .get_task(task_id)
            .await?
            .map(Versioned::into_inner)
            .ok_or_else(|| DealroomError::not_found(EntityKind::Task, task_id))
    }

    pub async fn document(&self, document_id: &DocumentId) -> DealroomResult<DealDocument> {
        self.documents
            .get_document(document_id)
            .await?
            .map(Versioned::into_inner)
            .ok_or_else(|| DealroomError::not_found(EntityKind::Document, document_id))
    }

    pub async fn documents_for_task(&self, task_id: &TaskId) -> DealroomResult<Vec<DealDocument>> {
        Ok(self.documents.list_documents_for_task(task_id).await?)
    }

    /// File a new private document under a task.
    ///
    /// Always appends. A rejected attempt stays on record and the new upload
    /// is the re-submission.
    pub async fn upload(
        &self,
        actor: &Actor,
        participation: Option<&DealParticipation>,
        task_id: &TaskId,
        title: &str,
        blob: BlobRef,
    ) -> DealroomResult<UploadOutcome> {
        let title = title.trim();
        if title.is_empty() {
            return Err(DealroomError::InvalidInput(
                "document title must not be empty".into(),
            ));
        }

        let task = self.task(task_id).await?;
        if !can_upload(actor, &task, participation) {
            return Err(DealroomError::permission_denied(
                "upload document",
                format!("an active {} participant or role lawyer or admin", task.assigned_to),
            ));
        }

        let document = DealDocument::new(task.id.clone(), title, blob, actor.principal());
        let stored = self.documents.insert_document(document).await?;
        info!(
            document_id = %stored.record.id,
            task_id = %task.id,
            uploaded_by = %stored.record.uploaded_by,
            "Document uploaded"
        );

        let (task_change, task_sync_failed) = self.sync_after_commit(task_id).await;
        let task = match &task_change {
            Some(change) => change.task.clone(),
            None => task,
        };

        Ok(UploadOutcome {
            document: stored.record,
            task,
            task_change,
            task_sync_failed,
        })
    }

    pub async fn verify(&self, actor: &Actor, document_id: &DocumentId) -> DealroomResult<TransitionOutcome> {
        self.transition(actor, document_id, CustodyAction::Verify, None)
            .await
    }

    pub async fn release(&self, actor: &Actor, document_id: &DocumentId) -> DealroomResult<TransitionOutcome> {
        self.transition(actor, document_id, CustodyAction::Release, None)
            .await
    }

    pub async fn reject(
        &self,
        actor: &Actor,
        document_id: &DocumentId,
        reason: &str,
    ) -> DealroomResult<TransitionOutcome> {
        self.transition(actor, document_id, CustodyAction::Reject, Some(reason))
            .await
    }

    async fn transition(
        &self,
        actor: &Actor,
        document_id: &DocumentId,
        action: CustodyAction,
        reason: Option<&str>,
    ) -> DealroomResult<TransitionOutcome> {
        if !can_transition_document(actor) {
            return Err(DealroomError::permission_denied(
                format!("{action} document"),
                "role lawyer or admin",
            ));
        }

        let reason = reason.map(str::trim);
        if action == CustodyAction::Reject && reason.map_or(true, str::is_empty) {
            return Err(DealroomError::InvalidInput(
                "a rejection reason is required".into(),
            ));
        }

        let current = self
            .documents
            .get_document(document_id)
            .await?
            .ok_or_else(|| DealroomError::not_found(EntityKind::Document, document_id))?;
        let from = current.record.status;
        let to = next_status(from, action, self.allow_rejected_override)?;

        let mut document = current.record;
        document.status = to;
        match action {
            CustodyAction::Verify => {
                document.verified_at = Some(Utc::now());
                document.rejection_reason = None;
            }
            CustodyAction::Reject => {
                document.rejection_reason = reason.map(str::to_string);
            }
            CustodyAction::Release => {}
        }

        let stored = self
            .documents
            .update_document(document, current.version)
            .await?;
        info!(
            document_id = %document_id,
            actor_id = %actor.user_id,
            from = %from,
            to = %to,
            "Document custody transition"
        );

        let (task_change, task_sync_failed) = if action == CustodyAction::Release {
            self.sync_after_commit(&stored.record.task_id).await
        } else {
            (None, false)
        };

        Ok(TransitionOutcome {
            document: stored.record,
            action,
            from,
            task_change,
            task_sync_failed,
        })
    }

    /// Task sync once the document row is committed. The document write
    /// stands either way, so a failure here is reported and not returned.
    async fn sync_after_commit(&self, task_id: &TaskId) -> (Option<TaskStatusChange>, bool) {
        match self.sync_task_status(task_id).await {
            Ok(change) => (change, false),
            Err(err) => {
                warn!(task_id = %task_id, error = %err, "Task status sync failed after document commit");
                (None, true)
            }
        }
    }

    /// Re-derive and persist a task's status from its documents.
    ///
    /// Returns the change when the stored status differed. Losing a version
    /// race here just means someone else already wrote a status, so the
    /// derivation is re-run against fresh rows.
    pub async fn sync_task_status(&self, task_id: &TaskId) -> DealroomResult<Option<TaskStatusChange>> {
        for attempt in 1..=TASK_SYNC_ATTEMPTS {
            let current = self
                .tasks
                .get_task(task_id)
                .await?
                .ok_or_else(|| DealroomError::not_found(EntityKind::Task, task_id))?;
            let documents = self.documents.list_documents_for_task(task_id).await?;
            let derived = recompute_task_status(&documents);
            let from = current.record.status;
            if derived == from {
                return Ok(None);
            }

            let mut task = current.record;
            task.status = derived;
            match self.tasks.update_task(task, current.version).await {
                Ok(stored) => {
                    info!(task_id = %task_id, from = %from, to = %derived, "Task status derived");
                    return Ok(Some(TaskStatusChange {
                        task: stored.record,
                        from,
                        to: derived,
                    }));
                }
                Err(StorageError::VersionConflict { .. }) => {
                    debug!(task_id = %task_id, attempt, "Task status sync raced, re-deriving");
                }
                Err(err) => return Err(err.into()),
            }
        }

        Err(DealroomError::ConcurrentModification {
            entity: EntityKind::Task,
            id: task_id.as_str().to_string(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use dealroom_storage::{InMemoryDealroomStorage, StorageResult};
    use dealroom_types::{DealId, IdentityId, PermissionOverrides, Role};
    use std::sync::atomic::{AtomicBool, Ordering};

    struct Fixture {
        storage: Arc<InMemoryDealroomStorage>,
        custody: DocumentCustody,
        task: Task,
    }

    async fn fixture() -> Fixture {
        let storage = Arc::new(InMemoryDealroomStorage::new());
        let task = Task {
            id: TaskId::new("t1"),
            deal_id: DealId::new("d1"),
            title: "Proof of funds".into(),
            assigned_to: Role::Buyer,
            status: TaskStatus::Pending,
            required: true,
        };
        storage.insert_task(task.clone()).await.unwrap();
        let custody = DocumentCustody::new(storage.clone(), storage.clone());
        Fixture {
            storage,
            custody,
            task,
        }
    }

    fn lawyer() -> Actor {
        Actor::new("lawyer-1", Role::Lawyer, "lee@firm.io")
    }

    fn buyer() -> (Actor, DealParticipation) {
        let identity = IdentityId::new("p1");
        let link = DealParticipation::new(
            DealId::new("d1"),
            identity.clone(),
            Role::Buyer,
            &PermissionOverrides::default(),
        );
        let actor = Actor::new("user-p1", Role::Buyer, "p1@x.io").with_identity(identity);
        (actor, link)
    }

    #[tokio::test]
    async fn test_upload_moves_task_to_review() {
        let f = fixture().await;
        let (actor, link) = buyer();

        let outcome = f
            .custody
            .upload(&actor, Some(&link), &f.task.id, "Bank letter", BlobRef::new("b1"))
            .await
            .unwrap();
        assert_eq!(outcome.document.status, DocumentStatus::Private);
        assert_eq!(outcome.document.uploaded_by, "p1");
        assert_eq!(outcome.task.status, TaskStatus::InReview);
        assert_eq!(
            outcome.task_change.map(|c| (c.from, c.to)),
            Some((TaskStatus::Pending, TaskStatus::InReview))
        );
    }

    #[tokio::test]
    async fn test_upload_denied_for_unlinked_actor() {
        let f = fixture().await;
        let (actor, _) = buyer();
        let err = f
            .custody
            .upload(&actor, None, &f.task.id, "Letter", BlobRef::new("b1"))
            .await
            .unwrap_err();
        assert!(matches!(err, DealroomError::PermissionDenied { .. }));
        assert!(f.storage.list_documents().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_release_completes_task() {
        let f = fixture().await;
        let doc = f
            .custody
            .upload(&lawyer(), None, &f.task.id, "Deed", BlobRef::new("b1"))
            .await
            .unwrap()
            .document;

        let verified = f.custody.verify(&lawyer(), &doc.id).await.unwrap();
        assert_eq!(verified.document.status, DocumentStatus::Verified);
        assert!(verified.document.verified_at.is_some());
        assert!(verified.task_change.is_none());

        let released = f.custody.release(&lawyer(), &doc.id).await.unwrap();
        assert_eq!(released.from, DocumentStatus::Verified);
        let change = released.task_change.unwrap();
        assert_eq!(change.to, TaskStatus::Completed);
        assert_eq!(f.custody.task(&f.task.id).await.unwrap().status, TaskStatus::Completed);
    }

    #[tokio::test]
    async fn test_illegal_transition_does_not_mutate() {
        let f = fixture().await;
        let doc = f
            .custody
            .upload(&lawyer(), None, &f.task.id, "Deed", BlobRef::new("b1"))
            .await
            .unwrap()
            .document;

        let err = f.custody.release(&lawyer(), &doc.id).await.unwrap_err();
        assert!(matches!(err, DealroomError::InvalidTransition { .. }));
        let stored = f.storage.get_document(&doc.id).await.unwrap().unwrap();
        assert_eq!(stored.version, 1);
        assert_eq!(stored.record.status, DocumentStatus::Private);
    }

    #[tokio::test]
    async fn test_reject_requires_reason_and_staff() {
        let f = fixture().await;
        let (actor, link) = buyer();
        let doc = f
            .custody
            .upload(&actor, Some(&link), &f.task.id, "Letter", BlobRef::new("b1"))
            .await
            .unwrap()
            .document;

        let err = f.custody.reject(&actor, &doc.id, "blurry").await.unwrap_err();
        assert!(matches!(err, DealroomError::PermissionDenied { .. }));

        let err = f.custody.reject(&lawyer(), &doc.id, "   ").await.unwrap_err();
        assert!(matches!(err, DealroomError::InvalidInput(_)));

        let rejected = f.custody.reject(&lawyer(), &doc.id, " blurry ").await.unwrap();
        assert_eq!(rejected.document.rejection_reason.as_deref(), Some("blurry"));

        let again = f.custody.reject(&lawyer(), &doc.id, "expired").await.unwrap();
        assert_eq!(again.from, DocumentStatus::Rejected);
        assert_eq!(again.document.status, DocumentStatus::Rejected);
        assert_eq!(again.document.rejection_reason.as_deref(), Some("expired"));
    }

    #[tokio::test]
    async fn test_resubmission_appends_and_keeps_history() {
        let f = fixture().await;
        let (actor, link) = buyer();
        let first = f
            .custody
            .upload(&actor, Some(&link), &f.task.id, "Letter", BlobRef::new("b1"))
            .await
            .unwrap()
            .document;
        f.custody.reject(&lawyer(), &first.id, "expired").await.unwrap();

        let second = f
            .custody
            .upload(&actor, Some(&link), &f.task.id, "Letter v2", BlobRef::new("b2"))
            .await
            .unwrap();
        assert_eq!(second.document.status, DocumentStatus::Private);
        assert!(second.task_change.is_none());

        let docs = f.custody.documents_for_task(&f.task.id).await.unwrap();
        assert_eq!(docs.len(), 2);
        assert_eq!(docs[0].status, DocumentStatus::Rejected);
        assert_eq!(docs[0].storage_key, BlobRef::new("b1"));
    }

    #[tokio::test]
    async fn test_rejected_override_follows_configuration() {
        let f = fixture().await;
        let doc = f
            .custody
            .upload(&lawyer(), None, &f.task.id, "Deed", BlobRef::new("b1"))
            .await
            .unwrap()
            .document;
        f.custody.reject(&lawyer(), &doc.id, "wrong page").await.unwrap();

        let strict = DocumentCustody::new(f.storage.clone(), f.storage.clone()).with_rejected_override(false);
        assert!(strict.verify(&lawyer(), &doc.id).await.is_err());

        let verified = f.custody.verify(&lawyer(), &doc.id).await.unwrap();
        assert_eq!(verified.from, DocumentStatus::Rejected);
        assert!(verified.document.rejection_reason.is_none());
    }

    /// Task rows that refuse updates while `down` is set.
    struct FlakyTasks {
        inner: Arc<InMemoryDealroomStorage>,
        down: AtomicBool,
    }

    #[async_trait]
    impl TaskStore for FlakyTasks {
        async fn insert_task(&self, task: Task) -> StorageResult<Versioned<Task>> {
            self.inner.insert_task(task).await
        }

        async fn get_task(&self, id: &TaskId) -> StorageResult<Option<Versioned<Task>>> {
            self.inner.get_task(id).await
        }

        async fn update_task(&self, task: Task, expected_version: u64) -> StorageResult<Versioned<Task>> {
            if self.down.load(Ordering::SeqCst) {
                return Err(StorageError::Backend("task store down".into()));
            }
            self.inner.update_task(task, expected_version).await
        }

        async fn list_tasks_for_deal(&self, deal_id: &DealId) -> StorageResult<Vec<Task>> {
            self.inner.list_tasks_for_deal(deal_id).await
        }

        async fn list_tasks(&self) -> StorageResult<Vec<Task>> {
            self.inner.list_tasks().await
        }
    }

    #[tokio::test]
    async fn test_committed_release_survives_task_sync_failure() {
        let f = fixture().await;
        let tasks = Arc::new(FlakyTasks {
            inner: f.storage.clone(),
            down: AtomicBool::new(false),
        });
        let custody = DocumentCustody::new(f.storage.clone(), tasks.clone());
        let doc = custody
            .upload(&lawyer(), None, &f.task.id, "Deed", BlobRef::new("b1"))
            .await
            .unwrap()
            .document;
        custody.verify(&lawyer(), &doc.id).await.unwrap();

        tasks.down.store(true, Ordering::SeqCst);
        let released = custody.release(&lawyer(), &doc.id).await.unwrap();
        assert_eq!(released.document.status, DocumentStatus::Released);
        assert!(released.task_sync_failed);
        assert!(released.task_change.is_none());
        assert_eq!(f.custody.task(&f.task.id).await.unwrap().status, TaskStatus::InReview);

        tasks.down.store(false, Ordering::SeqCst);
        let change = custody.sync_task_status(&f.task.id).await.unwrap().unwrap();
        assert_eq!(change.to, TaskStatus::Completed);
    }

    #[tokio::test]
    async fn test_committed_upload_survives_task_sync_failure() {
        let f = fixture().await;
        let tasks = Arc::new(FlakyTasks {
            inner: f.storage.clone(),
            down: AtomicBool::new(true),
        });
        let custody = DocumentCustody::new(f.storage.clone(), tasks);

        let outcome = custody
            .upload(&lawyer(), None, &f.task.id, "Deed", BlobRef::new("b1"))
            .await
            .unwrap();
        assert!(outcome.task_sync_failed);
        assert_eq!(outcome.task.status, TaskStatus::Pending);
        assert_eq!(f.storage.list_documents().await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_sync_is_idempotent() {
        let f = fixture().await;
        f.custody
            .upload(&lawyer(), None, &f.task.id, "Deed", BlobRef::new("b1"))
            .await
            .unwrap();
        assert!(f.custody.sync_task_status(&f.task.id).await.unwrap().is_none());
        assert!(f.custody.sync_task_status(&f.task.id).await.unwrap().is_none());
    }
}
