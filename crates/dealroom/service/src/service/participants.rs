use super::DealroomService;
use dealroom_audit::AuditEvent;
use dealroom_notify::{Notification, NotificationKind};
use dealroom_participation::{AddOutcome, IdentityRef, LinkChange, RosterEntry};
use dealroom_policy::{authorize, Capability};
use dealroom_types::{
    Actor, AuditAction, DealId, DealParticipation, DealroomResult, IdentityId, ParticipantUpdate,
    PermissionOverrides, Role,
};
use serde_json::json;
use tracing::instrument;

impl DealroomService {
    /// Link an identity to a deal, resolving contact details through the
    /// directory first. Adding an active participant again changes nothing.
    #[instrument(skip(self, actor, identity, overrides), fields(actor_id = %actor.user_id, deal_id = %deal_id, role = %role))]
    pub async fn add_participant(
        &self,
        actor: &Actor,
        deal_id: &DealId,
        identity: IdentityRef,
        role: Role,
        overrides: &PermissionOverrides,
    ) -> DealroomResult<AddOutcome> {
        authorize(actor, Capability::ManageParticipants, "add participant")?;
        let deal = self.lifecycle.get(deal_id).await?;
        let outcome = self.ledger.add(deal_id, identity, role, overrides).await?;

        if outcome.identity_created {
            self.record_identity_created(actor, &outcome.identity).await;
        }

        let action = match outcome.change {
            LinkChange::Added => AuditAction::ParticipantAdded,
            LinkChange::Reactivated => AuditAction::ParticipantReactivated,
            LinkChange::Unchanged => return Ok(outcome),
        };
        let link = &outcome.participation;
        self.record(
            AuditEvent::new(action, actor)
                .deal(deal_id)
                .details(format!("{} joined as {}", outcome.identity.name, link.role))
                .payload(json!({
                    "identity_id": link.identity_id,
                    "participation_id": link.id,
                    "role": link.role,
                    "permissions": link.permissions,
                })),
        )
        .await;
        self.notify(
            Notification::new(
                NotificationKind::ParticipantAdded,
                "Participant added",
                format!("{} joined {} as {}", outcome.identity.name, deal.title, link.role),
            )
            .for_deal(deal_id),
        );
        Ok(outcome)
    }

    /// Deactivate a participant. Their uploads and history stay on record.
    #[instrument(skip(self, actor), fields(actor_id = %actor.user_id, deal_id = %deal_id, identity_id = %identity_id))]
    pub async fn remove_participant(
        &self,
        actor: &Actor,
        deal_id: &DealId,
        identity_id: &IdentityId,
    ) -> DealroomResult<DealParticipation> {
        authorize(actor, Capability::ManageParticipants, "remove participant")?;
        let before = self.ledger.links(deal_id).await?;
        let was_active = before
            .iter()
            .any(|l| &l.identity_id == identity_id && l.is_active);
        let link = self.ledger.remove(deal_id, identity_id).await?;
        if !was_active {
            return Ok(link);
        }

        let name = self
            .directory
            .lookup(identity_id)
            .await?
            .map(|i| i.name)
            .unwrap_or_else(|| identity_id.to_string());
        self.record(
            AuditEvent::new(AuditAction::ParticipantRemoved, actor)
                .deal(deal_id)
                .details(format!("{name} removed from the deal"))
                .payload(json!({ "identity_id": identity_id, "role": link.role })),
        )
        .await;
        self.notify(
            Notification::new(
                NotificationKind::ParticipantRemoved,
                "Participant removed",
                format!("{name} no longer participates in this deal"),
            )
            .for_deal(deal_id),
        );
        Ok(link)
    }

    #[instrument(skip(self, actor, update), fields(actor_id = %actor.user_id, deal_id = %deal_id, identity_id = %identity_id))]
    pub async fn update_participant(
        &self,
        actor: &Actor,
        deal_id: &DealId,
        identity_id: &IdentityId,
        update: &ParticipantUpdate,
    ) -> DealroomResult<DealParticipation> {
        authorize(actor, Capability::ManageParticipants, "update participant")?;
        let before = self
            .ledger
            .links(deal_id)
            .await?
            .into_iter()
            .find(|l| &l.identity_id == identity_id);
        let link = self.ledger.update(deal_id, identity_id, update).await?;
        if before.as_ref() == Some(&link) {
            return Ok(link);
        }

        self.record(
            AuditEvent::new(AuditAction::ParticipantUpdated, actor)
                .deal(deal_id)
                .details(format!("Participant role is now {}", link.role))
                .payload(json!({
                    "identity_id": identity_id,
                    "from": before.map(|b| json!({ "role": b.role, "permissions": b.permissions })),
                    "to": { "role": link.role, "permissions": link.permissions },
                })),
        )
        .await;
        Ok(link)
    }

    /// Active participants of a deal with their directory records.
    #[instrument(skip(self, actor), fields(actor_id = %actor.user_id, deal_id = %deal_id))]
    pub async fn roster(&self, actor: &Actor, deal_id: &DealId) -> DealroomResult<Vec<RosterEntry>> {
        self.deal_access(actor, deal_id, "view participants").await?;
        self.lifecycle.get(deal_id).await?;
        self.ledger.roster(deal_id).await
    }
}
