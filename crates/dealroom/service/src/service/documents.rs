use super::DealroomService;
use dealroom_audit::AuditEvent;
use dealroom_custody::{TaskStatusChange, TransitionOutcome, UploadOutcome};
use dealroom_notify::{Notification, NotificationKind};
use dealroom_policy::{can_download, can_upload, can_view_document, link_grants_download};
use dealroom_types::{
    Actor, AuditAction, BlobRef, CustodyAction, DealDocument, DealId, DealParticipation,
    DealroomError, DealroomResult, DocumentId, EntityKind, Task, TaskId, TaskStatus,
};
use serde_json::json;
use tracing::instrument;

impl DealroomService {
    /// File a new private document against a task from an existing blob.
    #[instrument(skip(self, actor, title, blob), fields(actor_id = %actor.user_id, task_id = %task_id))]
    pub async fn upload_document(
        &self,
        actor: &Actor,
        task_id: &TaskId,
        title: &str,
        blob: BlobRef,
    ) -> DealroomResult<UploadOutcome> {
        if !self.blobs.blob_exists(&blob).await? {
            return Err(DealroomError::not_found(EntityKind::Blob, &blob));
        }

        let task = self.custody.task(task_id).await?;
        let participation = self.uploader_link(actor, &task).await?;
        let outcome = self
            .custody
            .upload(actor, participation.as_ref(), task_id, title, blob)
            .await?;

        let document = &outcome.document;
        self.record(
            AuditEvent::new(AuditAction::DocumentUploaded, actor)
                .deal(&task.deal_id)
                .details(format!("Uploaded {} for {}", document.title, task.title))
                .payload(json!({
                    "document_id": document.id,
                    "task_id": task.id,
                    "uploaded_by": document.uploaded_by,
                    "status": document.status,
                    "task_sync_failed": outcome.task_sync_failed,
                })),
        )
        .await;
        self.notify(
            Notification::new(
                NotificationKind::DocumentUploaded,
                "Document uploaded",
                format!("{} was uploaded for {}", document.title, task.title),
            )
            .for_deal(&task.deal_id),
        );
        if let Some(change) = &outcome.task_change {
            self.task_changed(actor, change).await;
        }
        Ok(outcome)
    }

    /// Store the bytes in the blob store, then upload them as a document.
    #[instrument(skip(self, actor, title, bytes), fields(actor_id = %actor.user_id, task_id = %task_id, size = bytes.len()))]
    pub async fn upload_file(
        &self,
        actor: &Actor,
        task_id: &TaskId,
        title: &str,
        file_name: &str,
        bytes: Vec<u8>,
    ) -> DealroomResult<UploadOutcome> {
        let task = self.custody.task(task_id).await?;
        let participation = self.uploader_link(actor, &task).await?;
        if !can_upload(actor, &task, participation.as_ref()) {
            return Err(DealroomError::permission_denied(
                "upload document",
                format!("an active {} participant or role lawyer or admin", task.assigned_to),
            ));
        }

        let blob = self.blobs.put_blob(file_name, bytes).await?;
        self.upload_document(actor, task_id, title, blob).await
    }

    #[instrument(skip(self, actor), fields(actor_id = %actor.user_id, document_id = %document_id))]
    pub async fn verify_document(&self, actor: &Actor, document_id: &DocumentId) -> DealroomResult<DealDocument> {
        let task = self.document_task(document_id).await?;
        let outcome = self.custody.verify(actor, document_id).await?;
        Ok(self.after_transition(actor, &task, outcome).await)
    }

    /// Release a verified document. Releasing completes its task.
    #[instrument(skip(self, actor), fields(actor_id = %actor.user_id, document_id = %document_id))]
    pub async fn release_document(&self, actor: &Actor, document_id: &DocumentId) -> DealroomResult<DealDocument> {
        let task = self.document_task(document_id).await?;
        let outcome = self.custody.release(actor, document_id).await?;
        Ok(self.after_transition(actor, &task, outcome).await)
    }

    #[instrument(skip(self, actor, reason), fields(actor_id = %actor.user_id, document_id = %document_id))]
    pub async fn reject_document(
        &self,
        actor: &Actor,
        document_id: &DocumentId,
        reason: &str,
    ) -> DealroomResult<DealDocument> {
        let task = self.document_task(document_id).await?;
        let outcome = self.custody.reject(actor, document_id, reason).await?;
        Ok(self.after_transition(actor, &task, outcome).await)
    }

    /// Every document of the deal the actor may learn about, task by task.
    #[instrument(skip(self, actor), fields(actor_id = %actor.user_id, deal_id = %deal_id))]
    pub async fn visible_documents(&self, actor: &Actor, deal_id: &DealId) -> DealroomResult<Vec<DealDocument>> {
        let link = self.deal_access(actor, deal_id, "view documents").await?;
        let mut visible = Vec::new();
        for task in self.tasks.list_tasks_for_deal(deal_id).await? {
            let documents = self.custody.documents_for_task(&task.id).await?;
            visible.extend(
                documents
                    .into_iter()
                    .filter(|doc| can_view_document(actor, doc, &task, link.as_ref())),
            );
        }
        Ok(visible)
    }

    /// Resolve the blob behind a document the actor may download.
    #[instrument(skip(self, actor), fields(actor_id = %actor.user_id, document_id = %document_id))]
    pub async fn download_document(&self, actor: &Actor, document_id: &DocumentId) -> DealroomResult<BlobRef> {
        let document = self.custody.document(document_id).await?;
        if actor.is_privileged() || actor.is_principal(&document.uploaded_by) {
            return Ok(document.storage_key);
        }

        let task = self.custody.task(&document.task_id).await?;
        let link = self.ledger.active_link_for(&task.deal_id, actor).await?;
        let allowed = can_download(actor, &document)
            && link.as_ref().is_some_and(link_grants_download)
            && can_view_document(actor, &document, &task, link.as_ref());
        if !allowed {
            return Err(DealroomError::permission_denied(
                "download document",
                "a released document and a download grant on the deal",
            ));
        }
        Ok(document.storage_key)
    }

    /// The link upload rights are checked against. Staff upload without one.
    async fn uploader_link(&self, actor: &Actor, task: &Task) -> DealroomResult<Option<DealParticipation>> {
        if actor.is_privileged() {
            return Ok(None);
        }
        self.ledger.active_link_for(&task.deal_id, actor).await
    }

    async fn document_task(&self, document_id: &DocumentId) -> DealroomResult<Task> {
        let document = self.custody.document(document_id).await?;
        self.custody.task(&document.task_id).await
    }

    async fn after_transition(&self, actor: &Actor, task: &Task, outcome: TransitionOutcome) -> DealDocument {
        let document = outcome.document;

        let (action, kind, verb) = match outcome.action {
            CustodyAction::Verify => (AuditAction::DocumentVerified, NotificationKind::DocumentVerified, "verified"),
            CustodyAction::Release => (AuditAction::DocumentReleased, NotificationKind::DocumentReleased, "released"),
            CustodyAction::Reject => (AuditAction::DocumentRejected, NotificationKind::DocumentRejected, "rejected"),
        };
        let details = match (&outcome.action, &document.rejection_reason) {
            (CustodyAction::Reject, Some(reason)) => format!("{} rejected: {reason}", document.title),
            _ => format!("{} {verb}", document.title),
        };

        self.record(
            AuditEvent::new(action, actor)
                .deal(&task.deal_id)
                .details(details.clone())
                .payload(json!({
                    "document_id": document.id,
                    "task_id": task.id,
                    "from": outcome.from,
                    "to": document.status,
                    "rejection_reason": document.rejection_reason,
                    "task_sync_failed": outcome.task_sync_failed,
                })),
        )
        .await;
        self.notify(
            Notification::new(kind, format!("Document {verb}"), details).for_deal(&task.deal_id),
        );
        if let Some(change) = &outcome.task_change {
            self.task_changed(actor, change).await;
        }
        document
    }

    async fn task_changed(&self, actor: &Actor, change: &TaskStatusChange) {
        let task = &change.task;
        self.record(
            AuditEvent::new(AuditAction::TaskStatusChanged, actor)
                .deal(&task.deal_id)
                .details(format!("{} is now {}", task.title, change.to))
                .payload(json!({ "task_id": task.id, "from": change.from, "to": change.to })),
        )
        .await;
        if change.to == TaskStatus::Completed {
            self.notify(
                Notification::new(
                    NotificationKind::TaskCompleted,
                    "Task completed",
                    format!("{} has a released document", task.title),
                )
                .for_deal(&task.deal_id),
            );
        }
    }
}
