use super::DealroomService;
use dealroom_audit::AuditEvent;
use dealroom_directory::{DeletedIdentity, Resolution, ResolveMode};
use dealroom_policy::{authorize, has_capability, Capability};
use dealroom_types::{
    Actor, AuditAction, DealroomError, DealroomResult, Identity, IdentityCandidate, IdentityId,
    IdentityUpdate, InvitationStatus,
};
use serde_json::json;
use tracing::instrument;

impl DealroomService {
    /// Resolve a candidate against the directory, creating it when unseen.
    #[instrument(skip(self, actor, candidate), fields(actor_id = %actor.user_id))]
    pub async fn resolve_or_create_identity(
        &self,
        actor: &Actor,
        candidate: &IdentityCandidate,
        mode: ResolveMode,
    ) -> DealroomResult<Resolution> {
        authorize(actor, Capability::ManageDirectory, "resolve identity")?;
        let resolution = self.directory.resolve_or_create(candidate, mode).await?;
        if resolution.is_new_record() {
            if let Some(identity) = resolution.identity() {
                self.record_identity_created(actor, identity).await;
            }
        }
        Ok(resolution)
    }

    /// Strict create: `DuplicateIdentity` for a known email unless `force`.
    #[instrument(skip(self, actor, candidate), fields(actor_id = %actor.user_id))]
    pub async fn create_identity(
        &self,
        actor: &Actor,
        candidate: &IdentityCandidate,
        force: bool,
    ) -> DealroomResult<Identity> {
        authorize(actor, Capability::ManageDirectory, "create identity")?;
        let identity = self.directory.create_identity(candidate, force).await?;
        self.record_identity_created(actor, &identity).await;
        Ok(identity)
    }

    #[instrument(skip(self, actor, update), fields(actor_id = %actor.user_id, identity_id = %identity_id))]
    pub async fn update_identity(
        &self,
        actor: &Actor,
        identity_id: &IdentityId,
        update: &IdentityUpdate,
    ) -> DealroomResult<Identity> {
        authorize(actor, Capability::ManageDirectory, "update identity")?;
        let before = self.directory.get(identity_id).await?;
        let identity = self.directory.update_identity(identity_id, update).await?;

        self.record(
            AuditEvent::new(AuditAction::IdentityUpdated, actor)
                .details(format!("Updated directory entry for {}", identity.name))
                .payload(json!({
                    "identity_id": identity.id,
                    "name": { "from": before.name, "to": identity.name },
                    "email": { "from": before.email, "to": identity.email },
                })),
        )
        .await;
        Ok(identity)
    }

    /// Remove an identity and cascade removal of all its deal links.
    #[instrument(skip(self, actor), fields(actor_id = %actor.user_id, identity_id = %identity_id))]
    pub async fn delete_identity(&self, actor: &Actor, identity_id: &IdentityId) -> DealroomResult<DeletedIdentity> {
        authorize(actor, Capability::DeleteIdentities, "delete identity")?;
        let deleted = self.directory.delete_identity(identity_id).await?;

        self.record(
            AuditEvent::new(AuditAction::IdentityDeleted, actor)
                .details(format!(
                    "Deleted {} and {} deal link(s)",
                    deleted.identity.name,
                    deleted.removed_links.len()
                ))
                .payload(json!({
                    "identity_id": identity_id,
                    "email": deleted.identity.email,
                    "promoted_id": deleted.promoted.as_ref().map(|p| &p.id),
                })),
        )
        .await;
        for link in &deleted.removed_links {
            self.record(
                AuditEvent::new(AuditAction::ParticipantRemoved, actor)
                    .deal(&link.deal_id)
                    .details(format!(
                        "{} removed with their directory entry",
                        deleted.identity.name
                    ))
                    .payload(json!({ "identity_id": identity_id, "role": link.role, "cascade": true })),
            )
            .await;
        }
        Ok(deleted)
    }

    /// Staff may set any invitation; an invitee may answer their own.
    #[instrument(skip(self, actor), fields(actor_id = %actor.user_id, identity_id = %identity_id))]
    pub async fn set_invitation_status(
        &self,
        actor: &Actor,
        identity_id: &IdentityId,
        status: InvitationStatus,
    ) -> DealroomResult<Identity> {
        if !has_capability(actor, Capability::ManageDirectory) {
            let own = self.directory.get(identity_id).await?;
            if !(actor.is_principal(own.id.as_str()) || actor.email == own.email) {
                return Err(DealroomError::permission_denied(
                    "answer invitation",
                    "the invited identity or role broker, lawyer or admin",
                ));
            }
        }

        let before = self.directory.get(identity_id).await?;
        let identity = self.directory.set_invitation_status(identity_id, status).await?;
        self.record(
            AuditEvent::new(AuditAction::InvitationStatusChanged, actor)
                .details(format!("Invitation for {} is now {:?}", identity.name, status))
                .payload(json!({
                    "identity_id": identity_id,
                    "from": before.invitation_status,
                    "to": status,
                })),
        )
        .await;
        Ok(identity)
    }

    /// Case-insensitive search over names and normalised emails.
    #[instrument(skip(self, actor), fields(actor_id = %actor.user_id))]
    pub async fn search_identities(&self, actor: &Actor, query: &str) -> DealroomResult<Vec<Identity>> {
        authorize(actor, Capability::ManageDirectory, "search directory")?;
        self.directory.search(query).await
    }

    pub(super) async fn record_identity_created(&self, actor: &Actor, identity: &Identity) {
        let details = match &identity.duplicate_of {
            Some(original) => format!("Force-created duplicate of {original} for {}", identity.email),
            None => format!("Created directory entry for {}", identity.email),
        };
        self.record(
            AuditEvent::new(AuditAction::IdentityCreated, actor)
                .details(details)
                .payload(json!({
                    "identity_id": identity.id,
                    "email": identity.email,
                    "duplicate_of": identity.duplicate_of,
                })),
        )
        .await;
    }
}
