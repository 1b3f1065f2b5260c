//! Dealroom Directory - deduplicated registry of external participants
//!
//! The same person shows up across many deals. The directory keeps one
//! durable identity per normalised email, independent of any deal, and is the
//! only place where name and email are edited. The storage unique index on
//! normalised email is the final arbiter; the lookup here is a fast path.

#![deny(unsafe_code)]

mod resolution;

pub use resolution::{Resolution, ResolveMode};

use chrono::Utc;
use dealroom_storage::{IdentityStore, ParticipationStore, StorageError, Versioned};
use dealroom_types::{
    DealParticipation, DealroomError, DealroomResult, EntityKind, Identity, IdentityCandidate,
    IdentityId, IdentityUpdate, InvitationStatus, NormalizedEmail,
};
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Result of an administrative identity deletion.
#[derive(Debug, Clone)]
pub struct DeletedIdentity {
    pub identity: Identity,
    /// Deal links removed by the cascade.
    pub removed_links: Vec<DealParticipation>,
    /// Oldest forced duplicate, now canonical for the email.
    pub promoted: Option<Identity>,
}

/// Global participant directory.
pub struct IdentityDirectory {
    identities: Arc<dyn IdentityStore>,
    participations: Arc<dyn ParticipationStore>,
}

impl IdentityDirectory {
    pub fn new(
        identities: Arc<dyn IdentityStore>,
        participations: Arc<dyn ParticipationStore>,
    ) -> Self {
        Self {
            identities,
            participations,
        }
    }

    /// Case-insensitive, whitespace-trimmed exact match on email.
    pub async fn find_by_email(&self, email: &str) -> DealroomResult<Option<Identity>> {
        let email = NormalizedEmail::new(email);
        if email.is_empty() {
            return Ok(None);
        }
        let found = self.identities.find_identity_by_email(&email).await?;
        Ok(found.map(Versioned::into_inner))
    }

    pub async fn get(&self, id: &IdentityId) -> DealroomResult<Identity> {
        self.identities
            .get_identity(id)
            .await?
            .map(Versioned::into_inner)
            .ok_or_else(|| DealroomError::not_found(EntityKind::Identity, id))
    }

    /// Look up an identity without failing when it is gone.
    pub async fn lookup(&self, id: &IdentityId) -> DealroomResult<Option<Identity>> {
        Ok(self
            .identities
            .get_identity(id)
            .await?
            .map(Versioned::into_inner))
    }

    /// Return the identity for the candidate's email, creating it if unseen.
    ///
    /// Known emails are handled according to `mode`. A new identity always
    /// starts with a pending invitation.
    pub async fn resolve_or_create(
        &self,
        candidate: &IdentityCandidate,
        mode: ResolveMode,
    ) -> DealroomResult<Resolution> {
        validate_candidate(candidate)?;
        let email = candidate.normalized_email();

        if let Some(existing) = self.identities.find_identity_by_email(&email).await? {
            return self.settle_existing(candidate, existing.record, mode).await;
        }

        match self.identities.insert_identity(Identity::from_candidate(candidate)).await {
            Ok(stored) => {
                info!(identity_id = %stored.record.id, email = %email, "Identity created");
                Ok(Resolution::Created {
                    identity: stored.record,
                })
            }
            Err(StorageError::UniqueViolation { .. }) => {
                // Lost the race against a concurrent create of the same email.
                debug!(email = %email, "Email claimed concurrently, resolving to winner");
                let existing = self.canonical(&email).await?;
                self.settle_existing(candidate, existing, mode).await
            }
            Err(err) => Err(err.into()),
        }
    }

    /// Strict create. Fails with `DuplicateIdentity` when the email is known,
    /// unless `force` is set, in which case a duplicate record is written.
    pub async fn create_identity(
        &self,
        candidate: &IdentityCandidate,
        force: bool,
    ) -> DealroomResult<Identity> {
        let mode = if force {
            ResolveMode::ForceCreate
        } else {
            ResolveMode::Confirm
        };
        match self.resolve_or_create(candidate, mode).await? {
            Resolution::NeedsDecision { existing } | Resolution::Resolved { identity: existing } => {
                Err(DealroomError::DuplicateIdentity {
                    existing: Box::new(existing),
                })
            }
            Resolution::ForcedCreate { identity } | Resolution::Created { identity } => Ok(identity),
        }
    }

    /// Edit directory fields. Every roster reads through the directory, so
    /// the change is visible in every deal the identity belongs to.
    pub async fn update_identity(
        &self,
        id: &IdentityId,
        update: &IdentityUpdate,
    ) -> DealroomResult<Identity> {
        let current = self
            .identities
            .get_identity(id)
            .await?
            .ok_or_else(|| DealroomError::not_found(EntityKind::Identity, id))?;

        let mut identity = current.record.clone();
        if let Some(name) = &update.name {
            let name = name.trim();
            if name.is_empty() {
                return Err(DealroomError::InvalidInput("name must not be empty".into()));
            }
            identity.name = name.to_string();
        }
        if let Some(email) = &update.email {
            let email = NormalizedEmail::new(email);
            if !email.is_plausible() {
                return Err(DealroomError::InvalidInput(format!(
                    "'{email}' is not a valid email address"
                )));
            }
            identity.email = email;
        }
        if let Some(phone) = &update.phone {
            identity.phone = non_blank(phone);
        }
        if let Some(agency) = &update.agency {
            identity.agency = non_blank(agency);
        }
        if let Some(notes) = &update.internal_notes {
            identity.internal_notes = non_blank(notes);
        }
        identity.updated_at = Utc::now();

        match self
            .identities
            .update_identity(identity.clone(), current.version)
            .await
        {
            Ok(stored) => {
                info!(identity_id = %id, "Identity updated");
                Ok(stored.record)
            }
            Err(StorageError::UniqueViolation { .. }) => {
                let existing = self.canonical(&identity.email).await?;
                Err(DealroomError::DuplicateIdentity {
                    existing: Box::new(existing),
                })
            }
            Err(err) => Err(err.into()),
        }
    }

    pub async fn set_invitation_status(
        &self,
        id: &IdentityId,
        status: InvitationStatus,
    ) -> DealroomResult<Identity> {
        let current = self
            .identities
            .get_identity(id)
            .await?
            .ok_or_else(|| DealroomError::not_found(EntityKind::Identity, id))?;

        let mut identity = current.record;
        identity.invitation_status = status;
        identity.updated_at = Utc::now();
        let stored = self
            .identities
            .update_identity(identity, current.version)
            .await?;
        Ok(stored.record)
    }

    /// Destructive removal of an identity and every deal link it holds.
    pub async fn delete_identity(&self, id: &IdentityId) -> DealroomResult<DeletedIdentity> {
        let identity = self.get(id).await?;

        let removed_links = self
            .participations
            .delete_participations_for_identity(id)
            .await?;
        if !self.identities.delete_identity(id).await? {
            warn!(identity_id = %id, "Identity vanished during deletion");
        }

        let promoted = if identity.is_canonical() {
            self.promote_duplicate(id).await?
        } else {
            None
        };

        info!(
            identity_id = %id,
            links = removed_links.len(),
            promoted = ?promoted.as_ref().map(|p| &p.id),
            "Identity deleted with cascade"
        );
        Ok(DeletedIdentity {
            identity,
            removed_links,
            promoted,
        })
    }

    /// Hand the email of a deleted canonical identity to its oldest duplicate
    /// and point the remaining duplicates at it.
    async fn promote_duplicate(&self, deleted: &IdentityId) -> DealroomResult<Option<Identity>> {
        let duplicates = self
            .identities
            .list_identities()
            .await?
            .into_iter()
            .filter(|i| i.duplicate_of.as_ref() == Some(deleted))
            .collect::<Vec<_>>();
        let Some((heir, rest)) = duplicates.split_first() else {
            return Ok(None);
        };

        let promoted = self.repoint(&heir.id, None).await?;
        for duplicate in rest {
            self.repoint(&duplicate.id, Some(promoted.id.clone())).await?;
        }
        debug!(
            identity_id = %promoted.id,
            repointed = rest.len(),
            "Duplicate promoted to canonical"
        );
        Ok(Some(promoted))
    }

    async fn repoint(&self, id: &IdentityId, duplicate_of: Option<IdentityId>) -> DealroomResult<Identity> {
        let current = self
            .identities
            .get_identity(id)
            .await?
            .ok_or_else(|| DealroomError::not_found(EntityKind::Identity, id))?;
        let mut identity = current.record;
        identity.duplicate_of = duplicate_of;
        identity.updated_at = Utc::now();
        let stored = self
            .identities
            .update_identity(identity, current.version)
            .await?;
        Ok(stored.record)
    }

    /// Case-insensitive substring search over name and email.
    pub async fn search(&self, query: &str) -> DealroomResult<Vec<Identity>> {
        let needle = query.trim().to_lowercase();
        let all = self.identities.list_identities().await?;
        if needle.is_empty() {
            return Ok(all);
        }
        Ok(all
            .into_iter()
            .filter(|i| {
                i.email.as_str().contains(&needle) || i.name.to_lowercase().contains(&needle)
            })
            .collect())
    }

    pub async fn list(&self) -> DealroomResult<Vec<Identity>> {
        Ok(self.identities.list_identities().await?)
    }

    async fn canonical(&self, email: &NormalizedEmail) -> DealroomResult<Identity> {
        self.identities
            .find_identity_by_email(email)
            .await?
            .map(Versioned::into_inner)
            .ok_or_else(|| {
                DealroomError::StorageFailure(format!(
                    "unique index reported {email} but no identity holds it"
                ))
            })
    }

    async fn settle_existing(
        &self,
        candidate: &IdentityCandidate,
        existing: Identity,
        mode: ResolveMode,
    ) -> DealroomResult<Resolution> {
        match mode {
            ResolveMode::UseExisting => {
                debug!(identity_id = %existing.id, "Resolved to existing identity");
                Ok(Resolution::Resolved { identity: existing })
            }
            ResolveMode::Confirm => Ok(Resolution::NeedsDecision { existing }),
            ResolveMode::ForceCreate => {
                let mut duplicate = Identity::from_candidate(candidate);
                duplicate.duplicate_of = Some(existing.id.clone());
                let stored = self.identities.insert_identity(duplicate).await?;
                warn!(
                    identity_id = %stored.record.id,
                    duplicate_of = %existing.id,
                    "Duplicate identity force-created"
                );
                Ok(Resolution::ForcedCreate {
                    identity: stored.record,
                })
            }
        }
    }
}

fn validate_candidate(candidate: &IdentityCandidate) -> DealroomResult<()> {
    if candidate.name.trim().is_empty() {
        return Err(DealroomError::InvalidInput("name must not be empty".into()));
    }
    let email = candidate.normalized_email();
    if !email.is_plausible() {
        return Err(DealroomError::InvalidInput(format!(
            "'{email}' is not a valid email address"
        )));
    }
    Ok(())
}

fn non_blank(value: &str) -> Option<String> {
    let value = value.trim();
    (!value.is_empty()).then(|| value.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use dealroom_storage::InMemoryDealroomStorage;
    use dealroom_types::{DealId, PermissionOverrides, Role};
    use proptest::prelude::*;

    fn directory() -> (Arc<InMemoryDealroomStorage>, IdentityDirectory) {
        let storage = Arc::new(InMemoryDealroomStorage::new());
        let directory = IdentityDirectory::new(storage.clone(), storage.clone());
        (storage, directory)
    }

    #[tokio::test]
    async fn test_resolve_twice_yields_same_identity() {
        let (_, dir) = directory();
        let first = dir
            .resolve_or_create(&IdentityCandidate::new("Ann", "A@B.com"), ResolveMode::UseExisting)
            .await
            .unwrap();
        assert!(matches!(first, Resolution::Created { .. }));

        let second = dir
            .resolve_or_create(&IdentityCandidate::new("Ann B", " a@b.com "), ResolveMode::UseExisting)
            .await
            .unwrap();
        let Resolution::Resolved { identity } = second else {
            panic!("expected existing identity");
        };
        assert_eq!(Some(&identity), first.identity());
        assert_eq!(identity.name, "Ann");
        assert_eq!(dir.list().await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_confirm_mode_surfaces_existing_without_writing() {
        let (_, dir) = directory();
        let ann = dir
            .create_identity(&IdentityCandidate::new("Ann", "ann@x.io"), false)
            .await
            .unwrap();

        let outcome = dir
            .resolve_or_create(&IdentityCandidate::new("Other", "ANN@x.io"), ResolveMode::Confirm)
            .await
            .unwrap();
        assert_eq!(outcome, Resolution::NeedsDecision { existing: ann });
        assert_eq!(dir.list().await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_strict_create_requires_force() {
        let (_, dir) = directory();
        let ann = dir
            .create_identity(&IdentityCandidate::new("Ann", "ann@x.io"), false)
            .await
            .unwrap();

        let err = dir
            .create_identity(&IdentityCandidate::new("Ann 2", " Ann@X.io"), false)
            .await
            .unwrap_err();
        match err {
            DealroomError::DuplicateIdentity { existing } => assert_eq!(existing.id, ann.id),
            other => panic!("unexpected {other:?}"),
        }

        let forced = dir
            .create_identity(&IdentityCandidate::new("Ann 2", "ann@x.io"), true)
            .await
            .unwrap();
        assert_ne!(forced.id, ann.id);
        assert_eq!(forced.duplicate_of, Some(ann.id.clone()));

        let found = dir.find_by_email("ANN@X.IO").await.unwrap().unwrap();
        assert_eq!(found.id, ann.id);
    }

    #[tokio::test]
    async fn test_concurrent_resolve_creates_one_identity() {
        let (_, dir) = directory();
        let dir = Arc::new(dir);

        let handles = (0..8)
            .map(|i| {
                let dir = dir.clone();
                tokio::spawn(async move {
                    let email = if i % 2 == 0 { "new@deal.io" } else { " NEW@deal.io " };
                    dir.resolve_or_create(
                        &IdentityCandidate::new("New", email),
                        ResolveMode::UseExisting,
                    )
                    .await
                })
            })
            .collect::<Vec<_>>();

        let mut ids = Vec::new();
        for handle in handles {
            let resolution = handle.await.unwrap().unwrap();
            ids.push(resolution.into_identity().unwrap().id);
        }
        ids.dedup();
        assert_eq!(ids.len(), 1);
        assert_eq!(dir.list().await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_invalid_candidates_are_rejected() {
        let (_, dir) = directory();
        let err = dir
            .resolve_or_create(&IdentityCandidate::new("Ann", "  "), ResolveMode::UseExisting)
            .await
            .unwrap_err();
        assert!(matches!(err, DealroomError::InvalidInput(_)));

        let err = dir
            .resolve_or_create(&IdentityCandidate::new(" ", "a@b.io"), ResolveMode::UseExisting)
            .await
            .unwrap_err();
        assert!(matches!(err, DealroomError::InvalidInput(_)));
    }

    #[tokio::test]
    async fn test_update_email_collision_reports_holder() {
        let (_, dir) = directory();
        let ann = dir
            .create_identity(&IdentityCandidate::new("Ann", "ann@x.io"), false)
            .await
            .unwrap();
        let bob = dir
            .create_identity(&IdentityCandidate::new("Bob", "bob@x.io"), false)
            .await
            .unwrap();

        let update = IdentityUpdate {
            email: Some(" ANN@x.io ".into()),
            ..Default::default()
        };
        match dir.update_identity(&bob.id, &update).await.unwrap_err() {
            DealroomError::DuplicateIdentity { existing } => assert_eq!(existing.id, ann.id),
            other => panic!("unexpected {other:?}"),
        }

        let update = IdentityUpdate {
            name: Some("Robert".into()),
            phone: Some(" 555 ".into()),
            ..Default::default()
        };
        let bob = dir.update_identity(&bob.id, &update).await.unwrap();
        assert_eq!(bob.name, "Robert");
        assert_eq!(bob.phone.as_deref(), Some("555"));
    }

    #[tokio::test]
    async fn test_delete_cascades_links() {
        let (storage, dir) = directory();
        let ann = dir
            .create_identity(&IdentityCandidate::new("Ann", "ann@x.io"), false)
            .await
            .unwrap();
        for deal in ["d1", "d2"] {
            storage
                .insert_participation(DealParticipation::new(
                    DealId::new(deal),
                    ann.id.clone(),
                    Role::Buyer,
                    &PermissionOverrides::default(),
                ))
                .await
                .unwrap();
        }

        let deleted = dir.delete_identity(&ann.id).await.unwrap();
        assert_eq!(deleted.removed_links.len(), 2);
        assert!(dir.lookup(&ann.id).await.unwrap().is_none());
        assert!(dir.find_by_email("ann@x.io").await.unwrap().is_none());
        assert!(storage
            .list_participations_for_identity(&ann.id)
            .await
            .unwrap()
            .is_empty());

        let err = dir.delete_identity(&ann.id).await.unwrap_err();
        assert!(matches!(err, DealroomError::NotFound { .. }));
    }

    #[tokio::test]
    async fn test_deleting_canonical_promotes_oldest_duplicate() {
        let (_, dir) = directory();
        let ann = dir
            .create_identity(&IdentityCandidate::new("Ann", "ann@x.io"), false)
            .await
            .unwrap();
        let older = dir
            .create_identity(&IdentityCandidate::new("Ann L.", "ANN@x.io"), true)
            .await
            .unwrap();
        let newer = dir
            .create_identity(&IdentityCandidate::new("A. Lee", "ann@x.io"), true)
            .await
            .unwrap();
        assert_eq!(older.duplicate_of.as_ref(), Some(&ann.id));

        let deleted = dir.delete_identity(&ann.id).await.unwrap();
        let promoted = deleted.promoted.unwrap();
        assert_eq!(promoted.id, older.id);
        assert!(promoted.is_canonical());

        assert_eq!(dir.find_by_email("ann@x.io").await.unwrap().unwrap().id, older.id);
        let newer = dir.lookup(&newer.id).await.unwrap().unwrap();
        assert_eq!(newer.duplicate_of.as_ref(), Some(&older.id));

        let err = dir
            .create_identity(&IdentityCandidate::new("Ann", "ann@x.io"), false)
            .await
            .unwrap_err();
        assert!(matches!(err, DealroomError::DuplicateIdentity { .. }));

        let plain = dir.delete_identity(&newer.id).await.unwrap();
        assert!(plain.promoted.is_none());
    }

    #[tokio::test]
    async fn test_search_matches_name_and_normalised_email() {
        let (_, dir) = directory();
        dir.create_identity(&IdentityCandidate::new("Ann Lee", "ann@x.io"), false)
            .await
            .unwrap();
        dir.create_identity(&IdentityCandidate::new("Bob", "bob@agency.io"), false)
            .await
            .unwrap();

        assert_eq!(dir.search("  LEE ").await.unwrap().len(), 1);
        assert_eq!(dir.search("AGENCY.IO").await.unwrap().len(), 1);
        assert_eq!(dir.search("").await.unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_invitation_status_changes() {
        let (_, dir) = directory();
        let ann = dir
            .create_identity(&IdentityCandidate::new("Ann", "ann@x.io"), false)
            .await
            .unwrap();
        let ann = dir
            .set_invitation_status(&ann.id, InvitationStatus::Accepted)
            .await
            .unwrap();
        assert_eq!(ann.invitation_status, InvitationStatus::Accepted);
    }

    proptest! {
        #[test]
        fn casing_and_whitespace_variants_resolve_to_one_identity(
            local in "[a-z][a-z0-9]{0,10}",
            domain in "[a-z]{1,8}",
            pad in "[ \t]{0,3}",
            upper in proptest::collection::vec(any::<bool>(), 0..12),
        ) {
            let rt = tokio::runtime::Runtime::new().unwrap();
            rt.block_on(async {
                let (_, dir) = directory();
                let canonical = format!("{local}@{domain}.com");
                let variant: String = canonical
                    .chars()
                    .enumerate()
                    .map(|(i, c)| {
                        if upper.get(i).copied().unwrap_or(false) {
                            c.to_ascii_uppercase()
                        } else {
                            c
                        }
                    })
                    .collect();
                let variant = format!("{pad}{variant}{pad}");

                let first = dir
                    .resolve_or_create(&IdentityCandidate::new("P", canonical), ResolveMode::UseExisting)
                    .await
                    .unwrap();
                let second = dir
                    .resolve_or_create(&IdentityCandidate::new("P", variant), ResolveMode::UseExisting)
                    .await
                    .unwrap();

                assert_eq!(first.identity().map(|i| &i.id), second.identity().map(|i| &i.id));
                assert_eq!(dir.list().await.unwrap().len(), 1);
            });
        }
    }
}
