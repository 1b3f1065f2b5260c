//! In-memory reference implementation for dealroom storage traits.
//!
//! This adapter is deterministic and test-friendly. It enforces the same
//! contract a relational backend would: compare-and-swap versions on every
//! row, a unique index on normalised email for canonical identities, and a
//! unique (deal, identity) pair for participation links.

use crate::chain::compute_audit_hash;
use crate::model::{AuditQuery, Versioned};
use crate::traits::{
    AuditStore, BlobStore, DealStore, DocumentStore, IdentityStore, ParticipationStore, TaskStore,
};
use crate::{StorageError, StorageResult};
use async_trait::async_trait;
use dealroom_types::{
    AuditAppend, AuditEntryId, AuditLogEntry, BlobRef, Deal, DealDocument, DealId,
    DealParticipation, DocumentId, EntityKind, Identity, IdentityId, NormalizedEmail, Task,
    TaskId,
};
use std::collections::{HashMap, HashSet};
use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};
use uuid::Uuid;

struct Row<T> {
    record: T,
    version: u64,
    seq: u64,
}

/// Rows keyed by id, remembering insertion order.
struct VersionedTable<T> {
    entity: EntityKind,
    rows: HashMap<String, Row<T>>,
    next_seq: u64,
}

impl<T: Clone> VersionedTable<T> {
    fn new(entity: EntityKind) -> Self {
        Self {
            entity,
            rows: HashMap::new(),
            next_seq: 0,
        }
    }

    fn insert(&mut self, key: &str, record: T) -> StorageResult<Versioned<T>> {
        if self.rows.contains_key(key) {
            return Err(StorageError::Conflict(format!(
                "{} {} already exists",
                self.entity, key
            )));
        }
        self.next_seq += 1;
        self.rows.insert(
            key.to_string(),
            Row {
                record: record.clone(),
                version: 1,
                seq: self.next_seq,
            },
        );
        Ok(Versioned::new(record, 1))
    }

    fn get(&self, key: &str) -> Option<Versioned<T>> {
        self.rows
            .get(key)
            .map(|row| Versioned::new(row.record.clone(), row.version))
    }

    fn compare_and_swap(
        &mut self,
        key: &str,
        record: T,
        expected_version: u64,
    ) -> StorageResult<Versioned<T>> {
        let entity = self.entity;
        let row = self
            .rows
            .get_mut(key)
            .ok_or_else(|| StorageError::not_found(entity, key))?;

        if row.version != expected_version {
            return Err(StorageError::VersionConflict {
                entity,
                id: key.to_string(),
                expected: expected_version,
                found: row.version,
            });
        }

        row.record = record.clone();
        row.version += 1;
        Ok(Versioned::new(record, row.version))
    }

    fn remove(&mut self, key: &str) -> Option<T> {
        self.rows.remove(key).map(|row| row.record)
    }

    fn values_where(&self, mut keep: impl FnMut(&T) -> bool) -> Vec<T> {
        let mut rows = self
            .rows
            .values()
            .filter(|row| keep(&row.record))
            .collect::<Vec<_>>();
        rows.sort_by_key(|row| row.seq);
        rows.into_iter().map(|row| row.record.clone()).collect()
    }
}

struct IdentityTables {
    rows: VersionedTable<Identity>,
    by_email: HashMap<NormalizedEmail, IdentityId>,
}

struct ParticipationTables {
    rows: VersionedTable<DealParticipation>,
    pairs: HashSet<(DealId, IdentityId)>,
}

/// In-memory dealroom storage adapter.
pub struct InMemoryDealroomStorage {
    identities: RwLock<IdentityTables>,
    participations: RwLock<ParticipationTables>,
    deals: RwLock<VersionedTable<Deal>>,
    tasks: RwLock<VersionedTable<Task>>,
    documents: RwLock<VersionedTable<DealDocument>>,
    audits: RwLock<Vec<AuditLogEntry>>,
}

impl InMemoryDealroomStorage {
    pub fn new() -> Self {
        Self {
            identities: RwLock::new(IdentityTables {
                rows: VersionedTable::new(EntityKind::Identity),
                by_email: HashMap::new(),
            }),
            participations: RwLock::new(ParticipationTables {
                rows: VersionedTable::new(EntityKind::Participation),
                pairs: HashSet::new(),
            }),
            deals: RwLock::new(VersionedTable::new(EntityKind::Deal)),
            tasks: RwLock::new(VersionedTable::new(EntityKind::Task)),
            documents: RwLock::new(VersionedTable::new(EntityKind::Document)),
            audits: RwLock::new(Vec::new()),
        }
    }
}

impl Default for InMemoryDealroomStorage {
    fn default() -> Self {
        Self::new()
    }
}

fn read<'a, T>(lock: &'a RwLock<T>, name: &str) -> StorageResult<RwLockReadGuard<'a, T>> {
    lock.read()
        .map_err(|_| StorageError::Backend(format!("{name} lock poisoned")))
}

fn write<'a, T>(lock: &'a RwLock<T>, name: &str) -> StorageResult<RwLockWriteGuard<'a, T>> {
    lock.write()
        .map_err(|_| StorageError::Backend(format!("{name} lock poisoned")))
}

#[async_trait]
impl IdentityStore for InMemoryDealroomStorage {
    async fn insert_identity(&self, identity: Identity) -> StorageResult<Versioned<Identity>> {
        let mut guard = write(&self.identities, "identities")?;

        if identity.is_canonical() {
            if let Some(existing) = guard.by_email.get(&identity.email) {
                return Err(StorageError::UniqueViolation {
                    key: format!("email {}", identity.email),
                    existing_id: existing.as_str().to_string(),
                });
            }
        }

        let stored = guard.rows.insert(identity.id.as_str(), identity.clone())?;
        if identity.is_canonical() {
            guard.by_email.insert(identity.email.clone(), identity.id);
        }
        Ok(stored)
    }

    async fn get_identity(&self, id: &IdentityId) -> StorageResult<Option<Versioned<Identity>>> {
        let guard = read(&self.identities, "identities")?;
        Ok(guard.rows.get(id.as_str()))
    }

    async fn find_identity_by_email(
        &self,
        email: &NormalizedEmail,
    ) -> StorageResult<Option<Versioned<Identity>>> {
        let guard = read(&self.identities, "identities")?;
        Ok(guard
            .by_email
            .get(email)
            .and_then(|id| guard.rows.get(id.as_str())))
    }

    async fn update_identity(
        &self,
        identity: Identity,
        expected_version: u64,
    ) -> StorageResult<Versioned<Identity>> {
        let mut guard = write(&self.identities, "identities")?;
        let previous = guard
            .rows
            .get(identity.id.as_str())
            .ok_or_else(|| StorageError::not_found(EntityKind::Identity, &identity.id))?;

        let was_canonical = previous.record.is_canonical();
        let claims_email =
            identity.is_canonical() && (!was_canonical || previous.record.email != identity.email);
        if claims_email {
            if let Some(holder) = guard.by_email.get(&identity.email) {
                if holder != &identity.id {
                    return Err(StorageError::UniqueViolation {
                        key: format!("email {}", identity.email),
                        existing_id: holder.as_str().to_string(),
                    });
                }
            }
        }

        let stored = guard.rows.compare_and_swap(
            identity.id.as_str(),
            identity.clone(),
            expected_version,
        )?;

        if was_canonical && guard.by_email.get(&previous.record.email) == Some(&identity.id) {
            guard.by_email.remove(&previous.record.email);
        }
        if identity.is_canonical() {
            guard.by_email.insert(identity.email.clone(), identity.id.clone());
        }
        Ok(stored)
    }

    async fn delete_identity(&self, id: &IdentityId) -> StorageResult<bool> {
        let mut guard = write(&self.identities, "identities")?;
        match guard.rows.remove(id.as_str()) {
            Some(removed) => {
                if guard.by_email.get(&removed.email) == Some(id) {
                    guard.by_email.remove(&removed.email);
                }
                Ok(true)
            }
            None => Ok(false),
        }
    }

    async fn list_identities(&self) -> StorageResult<Vec<Identity>> {
        let guard = read(&self.identities, "identities")?;
        Ok(guard.rows.values_where(|_| true))
    }
}

#[async_trait]
impl ParticipationStore for InMemoryDealroomStorage {
    async fn insert_participation(
        &self,
        link: DealParticipation,
    ) -> StorageResult<Versioned<DealParticipation>> {
        let mut guard = write(&self.participations, "participations")?;
        let pair = (link.deal_id.clone(), link.identity_id.clone());
        if guard.pairs.contains(&pair) {
            return Err(StorageError::Conflict(format!(
                "{} already linked to {}",
                link.identity_id, link.deal_id
            )));
        }
        let key = link.id.as_str().to_string();
        let stored = guard.rows.insert(&key, link)?;
        guard.pairs.insert(pair);
        Ok(stored)
    }

    async fn find_participation(
        &self,
        deal_id: &DealId,
        identity_id: &IdentityId,
    ) -> StorageResult<Option<Versioned<DealParticipation>>> {
        let guard = read(&self.participations, "participations")?;
        let found = guard
            .rows
            .values_where(|l| &l.deal_id == deal_id && &l.identity_id == identity_id)
            .into_iter()
            .next();
        Ok(found.and_then(|link| guard.rows.get(link.id.as_str())))
    }

    async fn update_participation(
        &self,
        link: DealParticipation,
        expected_version: u64,
    ) -> StorageResult<Versioned<DealParticipation>> {
        let mut guard = write(&self.participations, "participations")?;
        let previous = guard
            .rows
            .get(link.id.as_str())
            .ok_or_else(|| StorageError::not_found(EntityKind::Participation, &link.id))?;
        if previous.record.deal_id != link.deal_id
            || previous.record.identity_id != link.identity_id
        {
            return Err(StorageError::Conflict(format!(
                "{} cannot be re-pointed to another deal or identity",
                link.id
            )));
        }
        guard
            .rows
            .compare_and_swap(link.id.as_str(), link.clone(), expected_version)
    }

    async fn list_participations_for_deal(
        &self,
        deal_id: &DealId,
    ) -> StorageResult<Vec<DealParticipation>> {
        let guard = read(&self.participations, "participations")?;
        Ok(guard.rows.values_where(|l| &l.deal_id == deal_id))
    }

    async fn list_participations_for_identity(
        &self,
        identity_id: &IdentityId,
    ) -> StorageResult<Vec<DealParticipation>> {
        let guard = read(&self.participations, "participations")?;
        Ok(guard.rows.values_where(|l| &l.identity_id == identity_id))
    }

    async fn list_participations(&self) -> StorageResult<Vec<DealParticipation>> {
        let guard = read(&self.participations, "participations")?;
        Ok(guard.rows.values_where(|_| true))
    }

    async fn delete_participations_for_identity(
        &self,
        identity_id: &IdentityId,
    ) -> StorageResult<Vec<DealParticipation>> {
        let mut guard = write(&self.participations, "participations")?;
        let doomed = guard.rows.values_where(|l| &l.identity_id == identity_id);
        for link in &doomed {
            guard.rows.remove(link.id.as_str());
            guard
                .pairs
                .remove(&(link.deal_id.clone(), link.identity_id.clone()));
        }
        Ok(doomed)
    }
}

#[async_trait]
impl DealStore for InMemoryDealroomStorage {
    async fn insert_deal(&self, deal: Deal) -> StorageResult<Versioned<Deal>> {
        let mut guard = write(&self.deals, "deals")?;
        let key = deal.id.as_str().to_string();
        guard.insert(&key, deal)
    }

    async fn get_deal(&self, id: &DealId) -> StorageResult<Option<Versioned<Deal>>> {
        let guard = read(&self.deals, "deals")?;
        Ok(guard.get(id.as_str()))
    }

    async fn update_deal(&self, deal: Deal, expected_version: u64) -> StorageResult<Versioned<Deal>> {
        let mut guard = write(&self.deals, "deals")?;
        let key = deal.id.as_str().to_string();
        guard.compare_and_swap(&key, deal, expected_version)
    }

    async fn list_deals(&self) -> StorageResult<Vec<Deal>> {
        let guard = read(&self.deals, "deals")?;
        Ok(guard.values_where(|_| true))
    }
}

#[async_trait]
impl TaskStore for InMemoryDealroomStorage {
    async fn insert_task(&self, task: Task) -> StorageResult<Versioned<Task>> {
        let mut guard = write(&self.tasks, "tasks")?;
        let key = task.id.as_str().to_string();
        guard.insert(&key, task)
    }

    async fn get_task(&self, id: &TaskId) -> StorageResult<Option<Versioned<Task>>> {
        let guard = read(&self.tasks, "tasks")?;
        Ok(guard.get(id.as_str()))
    }

    async fn update_task(&self, task: Task, expected_version: u64) -> StorageResult<Versioned<Task>> {
        let mut guard = write(&self.tasks, "tasks")?;
        let key = task.id.as_str().to_string();
        guard.compare_and_swap(&key, task, expected_version)
    }

    async fn list_tasks_for_deal(&self, deal_id: &DealId) -> StorageResult<Vec<Task>> {
        let guard = read(&self.tasks, "tasks")?;
        Ok(guard.values_where(|t| &t.deal_id == deal_id))
    }

    async fn list_tasks(&self) -> StorageResult<Vec<Task>> {
        let guard = read(&self.tasks, "tasks")?;
        Ok(guard.values_where(|_| true))
    }
}

#[async_trait]
impl DocumentStore for InMemoryDealroomStorage {
    async fn insert_document(
        &self,
        document: DealDocument,
    ) -> StorageResult<Versioned<DealDocument>> {
        let mut guard = write(&self.documents, "documents")?;
        let key = document.id.as_str().to_string();
        guard.insert(&key, document)
    }

    async fn get_document(
        &self,
        id: &DocumentId,
    ) -> StorageResult<Option<Versioned<DealDocument>>> {
        let guard = read(&self.documents, "documents")?;
        Ok(guard.get(id.as_str()))
    }

    async fn update_document(
        &self,
        document: DealDocument,
        expected_version: u64,
    ) -> StorageResult<Versioned<DealDocument>> {
        let mut guard = write(&self.documents, "documents")?;
        let key = document.id.as_str().to_string();
        guard.compare_and_swap(&key, document, expected_version)
    }

    async fn list_documents_for_task(&self, task_id: &TaskId) -> StorageResult<Vec<DealDocument>> {
        let guard = read(&self.documents, "documents")?;
        Ok(guard.values_where(|d| &d.task_id == task_id))
    }

    async fn list_documents(&self) -> StorageResult<Vec<DealDocument>> {
        let guard = read(&self.documents, "documents")?;
        Ok(guard.values_where(|_| true))
    }
}

#[async_trait]
impl AuditStore for InMemoryDealroomStorage {
    async fn append_audit(&self, event: AuditAppend) -> StorageResult<AuditLogEntry> {
        let mut guard = write(&self.audits, "audit")?;

        let previous_hash = guard.last().map(|e| e.hash.clone());
        let sequence = guard.len() as u64 + 1;
        let hash = compute_audit_hash(&event, previous_hash.as_deref(), sequence)?;

        let entry = AuditLogEntry {
            id: AuditEntryId::generate(),
            sequence,
            deal_id: event.deal_id,
            actor_id: event.actor_id,
            actor_name: event.actor_name,
            action: event.action,
            details: event.details,
            payload: event.payload,
            timestamp: event.timestamp,
            previous_hash,
            hash,
        };

        guard.push(entry.clone());
        Ok(entry)
    }

    async fn list_audit(&self, query: &AuditQuery) -> StorageResult<Vec<AuditLogEntry>> {
        let guard = read(&self.audits, "audit")?;
        let matching = guard
            .iter()
            .filter(|e| query.deal_id.is_none() || e.deal_id == query.deal_id)
            .filter(|e| query.actor_id.as_ref().map_or(true, |a| &e.actor_id == a))
            .filter(|e| query.action.map_or(true, |a| e.action == a))
            .filter(|e| query.after.map_or(true, |t| e.timestamp >= t))
            .filter(|e| query.before.map_or(true, |t| e.timestamp <= t))
            .cloned()
            .collect::<Vec<_>>();
        Ok(query.window.apply(matching))
    }

    async fn latest_audit_hash(&self) -> StorageResult<Option<String>> {
        let guard = read(&self.audits, "audit")?;
        Ok(guard.last().map(|e| e.hash.clone()))
    }
}

/// In-memory blob store. Keys are random so uploads never overwrite each other.
#[derive(Default)]
pub struct InMemoryBlobStore {
    blobs: RwLock<HashMap<BlobRef, Vec<u8>>>,
}

impl InMemoryBlobStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, blob: &BlobRef) -> StorageResult<Option<Vec<u8>>> {
        let guard = read(&self.blobs, "blobs")?;
        Ok(guard.get(blob).cloned())
    }
}

#[async_trait]
impl BlobStore for InMemoryBlobStore {
    async fn put_blob(&self, file_name: &str, bytes: Vec<u8>) -> StorageResult<BlobRef> {
        let blob = BlobRef::new(format!("blobs/{}/{}", Uuid::new_v4(), file_name));
        let mut guard = write(&self.blobs, "blobs")?;
        guard.insert(blob.clone(), bytes);
        Ok(blob)
    }

    async fn blob_exists(&self, blob: &BlobRef) -> StorageResult<bool> {
        let guard = read(&self.blobs, "blobs")?;
        Ok(guard.contains_key(blob))
    }
}
