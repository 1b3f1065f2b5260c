use crate::model::{AuditQuery, Versioned};
use crate::StorageResult;
use async_trait::async_trait;
use dealroom_types::{
    AuditAppend, AuditLogEntry, BlobRef, Deal, DealDocument, DealId, DealParticipation,
    DocumentId, Identity, IdentityId, NormalizedEmail, Task, TaskId,
};

/// Storage interface for the global identity directory.
#[async_trait]
pub trait IdentityStore: Send + Sync {
    /// Insert a new identity.
    ///
    /// Canonical identities (`duplicate_of == None`) are subject to the unique
    /// index on normalised email and fail with `UniqueViolation` when the
    /// email is already held. Forced duplicates bypass the index.
    async fn insert_identity(&self, identity: Identity) -> StorageResult<Versioned<Identity>>;

    async fn get_identity(&self, id: &IdentityId) -> StorageResult<Option<Versioned<Identity>>>;

    /// Look up the canonical identity holding `email` in the unique index.
    async fn find_identity_by_email(
        &self,
        email: &NormalizedEmail,
    ) -> StorageResult<Option<Versioned<Identity>>>;

    /// Compare-and-swap update. Re-indexes the email of canonical identities.
    async fn update_identity(
        &self,
        identity: Identity,
        expected_version: u64,
    ) -> StorageResult<Versioned<Identity>>;

    /// Physically remove an identity. Returns whether a row existed.
    async fn delete_identity(&self, id: &IdentityId) -> StorageResult<bool>;

    async fn list_identities(&self) -> StorageResult<Vec<Identity>>;
}

/// Storage interface for deal participation links.
#[async_trait]
pub trait ParticipationStore: Send + Sync {
    /// Insert a link. Fails with `Conflict` when a row for the same
    /// (deal, identity) pair exists, active or not.
    async fn insert_participation(
        &self,
        link: DealParticipation,
    ) -> StorageResult<Versioned<DealParticipation>>;

    async fn find_participation(
        &self,
        deal_id: &DealId,
        identity_id: &IdentityId,
    ) -> StorageResult<Option<Versioned<DealParticipation>>>;

    async fn update_participation(
        &self,
        link: DealParticipation,
        expected_version: u64,
    ) -> StorageResult<Versioned<DealParticipation>>;

    /// All links of a deal, active or not, oldest first.
    async fn list_participations_for_deal(
        &self,
        deal_id: &DealId,
    ) -> StorageResult<Vec<DealParticipation>>;

    async fn list_participations_for_identity(
        &self,
        identity_id: &IdentityId,
    ) -> StorageResult<Vec<DealParticipation>>;

    async fn list_participations(&self) -> StorageResult<Vec<DealParticipation>>;

    /// Physically remove every link of an identity. Only used by the
    /// administrative identity deletion cascade.
    async fn delete_participations_for_identity(
        &self,
        identity_id: &IdentityId,
    ) -> StorageResult<Vec<DealParticipation>>;
}

/// Storage interface for deals.
#[async_trait]
pub trait DealStore: Send + Sync {
    async fn insert_deal(&self, deal: Deal) -> StorageResult<Versioned<Deal>>;

    async fn get_deal(&self, id: &DealId) -> StorageResult<Option<Versioned<Deal>>>;

    async fn update_deal(&self, deal: Deal, expected_version: u64)
        -> StorageResult<Versioned<Deal>>;

    async fn list_deals(&self) -> StorageResult<Vec<Deal>>;
}

/// Storage interface for document requirements.
#[async_trait]
pub trait TaskStore: Send + Sync {
    async fn insert_task(&self, task: Task) -> StorageResult<Versioned<Task>>;

    async fn get_task(&self, id: &TaskId) -> StorageResult<Option<Versioned<Task>>>;

    async fn update_task(&self, task: Task, expected_version: u64)
        -> StorageResult<Versioned<Task>>;

    async fn list_tasks_for_deal(&self, deal_id: &DealId) -> StorageResult<Vec<Task>>;

    async fn list_tasks(&self) -> StorageResult<Vec<Task>>;
}

/// Storage interface for uploaded documents.
#[async_trait]
pub trait DocumentStore: Send + Sync {
    async fn insert_document(&self, document: DealDocument)
        -> StorageResult<Versioned<DealDocument>>;

    async fn get_document(&self, id: &DocumentId)
        -> StorageResult<Option<Versioned<DealDocument>>>;

    async fn update_document(
        &self,
        document: DealDocument,
        expected_version: u64,
    ) -> StorageResult<Versioned<DealDocument>>;

    /// Documents of one task, oldest upload first.
    async fn list_documents_for_task(&self, task_id: &TaskId) -> StorageResult<Vec<DealDocument>>;

    async fn list_documents(&self) -> StorageResult<Vec<DealDocument>>;
}

/// Storage interface for append-only audit events.
#[async_trait]
pub trait AuditStore: Send + Sync {
    /// Append an event and return the canonical, hash-linked stored record.
    async fn append_audit(&self, event: AuditAppend) -> StorageResult<AuditLogEntry>;

    /// Read events oldest-first.
    async fn list_audit(&self, query: &AuditQuery) -> StorageResult<Vec<AuditLogEntry>>;

    /// Get the latest audit hash anchor.
    async fn latest_audit_hash(&self) -> StorageResult<Option<String>>;
}

/// Opaque binary storage addressed by key.
#[async_trait]
pub trait BlobStore: Send + Sync {
    /// Store bytes and return the reference documents will carry.
    async fn put_blob(&self, file_name: &str, bytes: Vec<u8>) -> StorageResult<BlobRef>;

    async fn blob_exists(&self, blob: &BlobRef) -> StorageResult<bool>;
}

/// Unified row storage bundle used by the dealroom service.
pub trait DealroomStorage:
    IdentityStore + ParticipationStore + DealStore + TaskStore + DocumentStore + AuditStore + Send + Sync
{
}

impl<T> DealroomStorage for T where
    T: IdentityStore
        + ParticipationStore
        + DealStore
        + TaskStore
        + DocumentStore
        + AuditStore
        + Send
        + Sync
{
}
