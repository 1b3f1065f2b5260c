//! Dealroom Participation - deal participation ledger
//!
//! Many-to-many links between directory identities and deals. Each link
//! carries a deal-scoped role and permissions. A (deal, identity) pair owns
//! at most one row; removal deactivates it and re-adding reactivates the same
//! row, so document provenance and audit history always point somewhere.

#![deny(unsafe_code)]

use dealroom_directory::{IdentityDirectory, Resolution, ResolveMode};
use dealroom_storage::{ParticipationStore, StorageError, Versioned};
use dealroom_types::{
    Actor, DealId, DealParticipation, DealroomError, DealroomResult, EntityKind, Identity,
    IdentityCandidate, IdentityId, ParticipantPermissions, ParticipantUpdate,
    PermissionOverrides, Role,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Who to add: a known directory identity, or contact details to resolve.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IdentityRef {
    Id(IdentityId),
    Candidate(IdentityCandidate),
}

impl From<IdentityId> for IdentityRef {
    fn from(id: IdentityId) -> Self {
        IdentityRef::Id(id)
    }
}

impl From<IdentityCandidate> for IdentityRef {
    fn from(candidate: IdentityCandidate) -> Self {
        IdentityRef::Candidate(candidate)
    }
}

/// What an add did to the ledger.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LinkChange {
    Added,
    Reactivated,
    /// An active link already existed and was returned untouched.
    Unchanged,
}

#[derive(Debug, Clone, Serialize)]
pub struct AddOutcome {
    pub participation: DealParticipation,
    pub identity: Identity,
    pub change: LinkChange,
    /// Whether the directory created a new identity on the way.
    pub identity_created: bool,
}

/// One active roster member joined with its directory record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RosterEntry {
    pub participation: DealParticipation,
    pub identity: Identity,
}

/// Deal participation ledger.
pub struct ParticipationLedger {
    participations: Arc<dyn ParticipationStore>,
    directory: Arc<IdentityDirectory>,
}

impl ParticipationLedger {
    pub fn new(participations: Arc<dyn ParticipationStore>, directory: Arc<IdentityDirectory>) -> Self {
        Self {
            participations,
            directory,
        }
    }

    /// Link an identity to a deal. Idempotent for active links.
    pub async fn add(
        &self,
        deal_id: &DealId,
        identity_ref: IdentityRef,
        role: Role,
        overrides: &PermissionOverrides,
    ) -> DealroomResult<AddOutcome> {
        let (identity, identity_created) = match identity_ref {
            IdentityRef::Id(id) => (self.directory.get(&id).await?, false),
            IdentityRef::Candidate(candidate) => {
                let resolution = self
                    .directory
                    .resolve_or_create(&candidate, ResolveMode::UseExisting)
                    .await?;
                let created = resolution.is_new_record();
                let identity = resolution_identity(resolution)?;
                (identity, created)
            }
        };

        if let Some(existing) = self.participations.find_participation(deal_id, &identity.id).await? {
            return self.settle_existing(existing, identity, role, overrides, identity_created).await;
        }

        let link = DealParticipation::new(deal_id.clone(), identity.id.clone(), role, overrides);
        match self.participations.insert_participation(link).await {
            Ok(stored) => {
                info!(
                    deal_id = %deal_id,
                    identity_id = %identity.id,
                    role = %role,
                    "Participant added"
                );
                Ok(AddOutcome {
                    participation: stored.record,
                    identity,
                    change: LinkChange::Added,
                    identity_created,
                })
            }
            Err(StorageError::Conflict(_)) => {
                debug!(deal_id = %deal_id, identity_id = %identity.id, "Link created concurrently");
                let existing = self.find(deal_id, &identity.id).await?;
                self.settle_existing(existing, identity, role, overrides, identity_created).await
            }
            Err(err) => Err(err.into()),
        }
    }

    /// Soft-remove a participant. Documents they uploaded stay on record.
    pub async fn remove(&self, deal_id: &DealId, identity_id: &IdentityId) -> DealroomResult<DealParticipation> {
        let current = self.find(deal_id, identity_id).await?;
        if !current.record.is_active {
            return Ok(current.record);
        }

        let mut link = current.record;
        link.is_active = false;
        let stored = self
            .participations
            .update_participation(link, current.version)
            .await?;
        info!(deal_id = %deal_id, identity_id = %identity_id, "Participant deactivated");
        Ok(stored.record)
    }

    /// Change a participant's deal-scoped role or permissions.
    ///
    /// A role change resets permissions to the new role's defaults before
    /// any overrides in the same update are applied.
    pub async fn update(
        &self,
        deal_id: &DealId,
        identity_id: &IdentityId,
        update: &ParticipantUpdate,
    ) -> DealroomResult<DealParticipation> {
        let current = self.find(deal_id, identity_id).await?;
        if !current.record.is_active {
            return Err(DealroomError::invalid_transition(
                EntityKind::Participation,
                "inactive",
                "update",
            ));
        }

        let mut link = current.record.clone();
        if let Some(role) = update.role {
            if role != link.role {
                link.role = role;
                link.permissions = ParticipantPermissions::defaults_for(role);
            }
        }
        if let Some(overrides) = &update.permissions {
            link.permissions.apply(overrides);
        }
        if link == current.record {
            return Ok(link);
        }

        let stored = self
            .participations
            .update_participation(link, current.version)
            .await?;
        info!(deal_id = %deal_id, identity_id = %identity_id, role = %stored.record.role, "Participant updated");
        Ok(stored.record)
    }

    /// Active links joined with the directory. Links whose identity no
    /// longer exists are skipped.
    pub async fn roster(&self, deal_id: &DealId) -> DealroomResult<Vec<RosterEntry>> {
        let links = self.participations.list_participations_for_deal(deal_id).await?;
        let mut roster = Vec::with_capacity(links.len());
        for participation in links.into_iter().filter(|l| l.is_active) {
            match self.directory.lookup(&participation.identity_id).await? {
                Some(identity) => roster.push(RosterEntry {
                    participation,
                    identity,
                }),
                None => warn!(
                    deal_id = %deal_id,
                    identity_id = %participation.identity_id,
                    "Skipping roster link to missing identity"
                ),
            }
        }
        Ok(roster)
    }

    /// All links of a deal, including deactivated ones.
    pub async fn links(&self, deal_id: &DealId) -> DealroomResult<Vec<DealParticipation>> {
        Ok(self.participations.list_participations_for_deal(deal_id).await?)
    }

    /// The actor's active link on a deal, matched by linked identity first
    /// and by normalised email otherwise.
    pub async fn active_link_for(&self, deal_id: &DealId, actor: &Actor) -> DealroomResult<Option<DealParticipation>> {
        let identity_id = match &actor.identity_id {
            Some(id) => id.clone(),
            None => match self.directory.find_by_email(actor.email.as_str()).await? {
                Some(identity) => identity.id,
                None => return Ok(None),
            },
        };
        let link = self
            .participations
            .find_participation(deal_id, &identity_id)
            .await?
            .map(Versioned::into_inner);
        Ok(link.filter(|l| l.is_active))
    }

    async fn find(&self, deal_id: &DealId, identity_id: &IdentityId) -> DealroomResult<Versioned<DealParticipation>> {
        self.participations
            .find_participation(deal_id, identity_id)
            .await?
            .ok_or_else(|| {
                DealroomError::not_found(EntityKind::Participation, format!("{deal_id}/{identity_id}"))
            })
    }

    async fn settle_existing(
        &self,
        existing: Versioned<DealParticipation>,
        identity: Identity,
        role: Role,
        overrides: &PermissionOverrides,
        identity_created: bool,
    ) -> DealroomResult<AddOutcome> {
        if existing.record.is_active {
            debug!(participation_id = %existing.record.id, "Participant already active");
            return Ok(AddOutcome {
                participation: existing.record,
                identity,
                change: LinkChange::Unchanged,
                identity_created,
            });
        }

        let mut link = existing.record;
        link.is_active = true;
        link.role = role;
        link.permissions = ParticipantPermissions::defaults_for(role);
        link.permissions.apply(overrides);
        let stored = self
            .participations
            .update_participation(link, existing.version)
            .await?;
        info!(
            deal_id = %stored.record.deal_id,
            identity_id = %identity.id,
            "Participant reactivated"
        );
        Ok(AddOutcome {
            participation: stored.record,
            identity,
            change: LinkChange::Reactivated,
            identity_created,
        })
    }
}

fn resolution_identity(resolution: Resolution) -> DealroomResult<Identity> {
    match resolution {
        Resolution::NeedsDecision { existing } => Err(DealroomError::DuplicateIdentity {
            existing: Box::new(existing),
        }),
        other => other
            .into_identity()
            .ok_or_else(|| DealroomError::InvalidInput("identity could not be resolved".into())),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use dealroom_storage::{IdentityStore, InMemoryDealroomStorage};

    fn ledger() -> (Arc<InMemoryDealroomStorage>, Arc<IdentityDirectory>, ParticipationLedger) {
        let storage = Arc::new(InMemoryDealroomStorage::new());
        let directory = Arc::new(IdentityDirectory::new(storage.clone(), storage.clone()));
        let ledger = ParticipationLedger::new(storage.clone(), directory.clone());
        (storage, directory, ledger)
    }

    fn ann() -> IdentityRef {
        IdentityCandidate::new("Ann", "Ann@X.io").into()
    }

    #[tokio::test]
    async fn test_add_by_email_resolves_and_links() {
        let (_, directory, ledger) = ledger();
        let deal = DealId::new("d1");

        let outcome = ledger
            .add(&deal, ann(), Role::Buyer, &PermissionOverrides::default())
            .await
            .unwrap();
        assert_eq!(outcome.change, LinkChange::Added);
        assert!(outcome.identity_created);

        let again = ledger
            .add(&deal, IdentityCandidate::new("Ann", " ann@x.io").into(), Role::Seller, &PermissionOverrides::default())
            .await
            .unwrap();
        assert_eq!(again.change, LinkChange::Unchanged);
        assert!(!again.identity_created);
        assert_eq!(again.participation.id, outcome.participation.id);
        assert_eq!(again.participation.role, Role::Buyer);
        assert_eq!(directory.list().await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_same_identity_joins_many_deals() {
        let (_, directory, ledger) = ledger();
        for deal in ["d1", "d2", "d3"] {
            ledger
                .add(&DealId::new(deal), ann(), Role::Buyer, &PermissionOverrides::default())
                .await
                .unwrap();
        }
        assert_eq!(directory.list().await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_remove_then_readd_reactivates_same_row() {
        let (storage, _, ledger) = ledger();
        let deal = DealId::new("d1");
        let added = ledger
            .add(&deal, ann(), Role::Buyer, &PermissionOverrides::default())
            .await
            .unwrap();

        let removed = ledger.remove(&deal, &added.identity.id).await.unwrap();
        assert!(!removed.is_active);
        assert!(ledger.roster(&deal).await.unwrap().is_empty());

        let back = ledger
            .add(&deal, added.identity.id.clone().into(), Role::Seller, &PermissionOverrides::default())
            .await
            .unwrap();
        assert_eq!(back.change, LinkChange::Reactivated);
        assert_eq!(back.participation.id, added.participation.id);
        assert_eq!(back.participation.role, Role::Seller);
        assert_eq!(storage.list_participations_for_deal(&deal).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_update_role_resets_permissions() {
        let (_, _, ledger) = ledger();
        let deal = DealId::new("d1");
        let added = ledger
            .add(
                &deal,
                ann(),
                Role::Buyer,
                &PermissionOverrides {
                    can_download: Some(false),
                    ..Default::default()
                },
            )
            .await
            .unwrap();
        assert!(!added.participation.permissions.can_download);

        let updated = ledger
            .update(
                &deal,
                &added.identity.id,
                &ParticipantUpdate {
                    role: Some(Role::Broker),
                    permissions: Some(PermissionOverrides {
                        can_view_all_documents: Some(true),
                        ..Default::default()
                    }),
                },
            )
            .await
            .unwrap();
        assert_eq!(updated.role, Role::Broker);
        assert!(updated.permissions.can_download);
        assert!(updated.permissions.can_view_all_documents);
    }

    #[tokio::test]
    async fn test_update_inactive_link_fails() {
        let (_, _, ledger) = ledger();
        let deal = DealId::new("d1");
        let added = ledger
            .add(&deal, ann(), Role::Buyer, &PermissionOverrides::default())
            .await
            .unwrap();
        ledger.remove(&deal, &added.identity.id).await.unwrap();

        let err = ledger
            .update(&deal, &added.identity.id, &ParticipantUpdate::default())
            .await
            .unwrap_err();
        assert!(matches!(err, DealroomError::InvalidTransition { .. }));
    }

    #[tokio::test]
    async fn test_roster_skips_dangling_links() {
        let (storage, _, ledger) = ledger();
        let deal = DealId::new("d1");
        let added = ledger
            .add(&deal, ann(), Role::Buyer, &PermissionOverrides::default())
            .await
            .unwrap();
        ledger
            .add(&deal, IdentityCandidate::new("Bob", "bob@x.io").into(), Role::Seller, &PermissionOverrides::default())
            .await
            .unwrap();

        // Remove the identity row only, leaving its link behind.
        storage.delete_identity(&added.identity.id).await.unwrap();

        let roster = ledger.roster(&deal).await.unwrap();
        assert_eq!(roster.len(), 1);
        assert_eq!(roster[0].identity.name, "Bob");
    }

    #[tokio::test]
    async fn test_active_link_matches_actor_by_email() {
        let (_, _, ledger) = ledger();
        let deal = DealId::new("d1");
        ledger
            .add(&deal, ann(), Role::Buyer, &PermissionOverrides::default())
            .await
            .unwrap();

        let actor = Actor::new("session-7", Role::Buyer, " ANN@x.io ");
        let link = ledger.active_link_for(&deal, &actor).await.unwrap();
        assert_eq!(link.map(|l| l.role), Some(Role::Buyer));

        let stranger = Actor::new("session-8", Role::Buyer, "zed@x.io");
        assert!(ledger.active_link_for(&deal, &stranger).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_remove_unknown_link_is_not_found() {
        let (_, _, ledger) = ledger();
        let err = ledger
            .remove(&DealId::new("d1"), &IdentityId::new("nobody"))
            .await
            .unwrap_err();
        assert!(matches!(err, DealroomError::NotFound { .. }));
    }
}
