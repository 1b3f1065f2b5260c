use super::DealroomService;
use dealroom_audit::AuditEvent;
use dealroom_lifecycle::StatusChange;
use dealroom_notify::{Notification, NotificationKind};
use dealroom_policy::{authorize, can_view_timeline, has_capability, Capability};
use dealroom_types::{
    Actor, AuditAction, Deal, DealId, DealStatus, DealroomError, DealroomResult, NewDeal,
    NewTask, StepId, Task, TaskId, TaskStatus, TimelineStep,
};
use serde_json::json;
use tracing::{info, instrument};

impl DealroomService {
    /// Open a deal on the first step of its timeline, or of the configured
    /// default timeline when none is supplied.
    #[instrument(skip(self, actor, new), fields(actor_id = %actor.user_id))]
    pub async fn create_deal(&self, actor: &Actor, new: NewDeal) -> DealroomResult<Deal> {
        authorize(actor, Capability::EditDeals, "create deal")?;
        let deal = self.lifecycle.create(new, &self.default_timeline).await?;
        self.record(
            AuditEvent::new(AuditAction::DealCreated, actor)
                .deal(&deal.id)
                .details(format!("Opened deal {}", deal.title))
                .payload(json!({
                    "title": deal.title,
                    "property_address": deal.property_address,
                    "timeline": deal.timeline,
                    "current_step_id": deal.current_step_id,
                })),
        )
        .await;
        Ok(deal)
    }

    /// A deal, for staff and the deal's active participants.
    #[instrument(skip(self, actor), fields(actor_id = %actor.user_id, deal_id = %deal_id))]
    pub async fn deal(&self, actor: &Actor, deal_id: &DealId) -> DealroomResult<Deal> {
        self.deal_access(actor, deal_id, "view deal").await?;
        self.lifecycle.get(deal_id).await
    }

    /// The deal's timeline and current step, subject to the participant's
    /// timeline grant.
    #[instrument(skip(self, actor), fields(actor_id = %actor.user_id, deal_id = %deal_id))]
    pub async fn timeline(&self, actor: &Actor, deal_id: &DealId) -> DealroomResult<(Vec<TimelineStep>, StepId)> {
        let link = self.deal_access(actor, deal_id, "view timeline").await?;
        if !(can_view_timeline(actor, link.as_ref()) || has_capability(actor, Capability::EditDeals)) {
            return Err(DealroomError::permission_denied(
                "view timeline",
                "the timeline grant on this deal",
            ));
        }
        let deal = self.lifecycle.get(deal_id).await?;
        Ok((deal.timeline, deal.current_step_id))
    }

    /// Add a document requirement. Tasks start pending.
    #[instrument(skip(self, actor, new), fields(actor_id = %actor.user_id, deal_id = %deal_id))]
    pub async fn create_task(&self, actor: &Actor, deal_id: &DealId, new: NewTask) -> DealroomResult<Task> {
        authorize(actor, Capability::EditDeals, "create task")?;
        let title = new.title.trim();
        if title.is_empty() {
            return Err(DealroomError::InvalidInput("task title must not be empty".into()));
        }
        self.lifecycle.get(deal_id).await?;

        let task = Task {
            id: TaskId::generate(),
            deal_id: deal_id.clone(),
            title: title.to_string(),
            assigned_to: new.assigned_to,
            status: TaskStatus::Pending,
            required: new.required,
        };
        let task = self.tasks.insert_task(task).await?.record;
        info!(task_id = %task.id, deal_id = %deal_id, assigned_to = %task.assigned_to, "Task created");

        self.record(
            AuditEvent::new(AuditAction::TaskCreated, actor)
                .deal(deal_id)
                .details(format!("Requested {} from {}", task.title, task.assigned_to))
                .payload(json!({
                    "task_id": task.id,
                    "assigned_to": task.assigned_to,
                    "required": task.required,
                })),
        )
        .await;
        Ok(task)
    }

    /// Tasks of a deal with their derived status.
    #[instrument(skip(self, actor), fields(actor_id = %actor.user_id, deal_id = %deal_id))]
    pub async fn deal_tasks(&self, actor: &Actor, deal_id: &DealId) -> DealroomResult<Vec<Task>> {
        self.deal_access(actor, deal_id, "view tasks").await?;
        Ok(self.tasks.list_tasks_for_deal(deal_id).await?)
    }

    #[instrument(skip(self, actor, notes), fields(actor_id = %actor.user_id, deal_id = %deal_id))]
    pub async fn close_deal(&self, actor: &Actor, deal_id: &DealId, notes: Option<&str>) -> DealroomResult<Deal> {
        authorize(actor, Capability::CloseDeals, "close deal")?;
        let change = self.lifecycle.close(deal_id, &actor.user_id, notes).await?;
        self.record(
            AuditEvent::new(AuditAction::DealClosed, actor)
                .deal(deal_id)
                .details(match &change.deal.closure_notes {
                    Some(notes) => format!("Deal closed: {notes}"),
                    None => "Deal closed".to_string(),
                })
                .payload(status_payload(&change)),
        )
        .await;
        self.notify(
            Notification::new(
                NotificationKind::DealClosed,
                "Deal closed",
                format!("{} has been closed", change.deal.title),
            )
            .for_deal(deal_id),
        );
        Ok(change.deal)
    }

    /// Return a closed deal to active, clearing its closure fields.
    #[instrument(skip(self, actor), fields(actor_id = %actor.user_id, deal_id = %deal_id))]
    pub async fn reopen_deal(&self, actor: &Actor, deal_id: &DealId) -> DealroomResult<Deal> {
        authorize(actor, Capability::CloseDeals, "reopen deal")?;
        let change = self.lifecycle.reopen(deal_id).await?;
        self.record(
            AuditEvent::new(AuditAction::DealReopened, actor)
                .deal(deal_id)
                .details("Deal reopened")
                .payload(status_payload(&change)),
        )
        .await;
        self.notify(
            Notification::new(
                NotificationKind::DealReopened,
                "Deal reopened",
                format!("{} is active again", change.deal.title),
            )
            .for_deal(deal_id),
        );
        Ok(change.deal)
    }

    /// Hold or activate a deal. Closing goes through [`Self::close_deal`]
    /// and its stricter authorization.
    #[instrument(skip(self, actor), fields(actor_id = %actor.user_id, deal_id = %deal_id, target = %status))]
    pub async fn set_deal_status(&self, actor: &Actor, deal_id: &DealId, status: DealStatus) -> DealroomResult<Deal> {
        if status == DealStatus::Closed {
            return self.close_deal(actor, deal_id, None).await;
        }
        authorize(actor, Capability::EditDeals, "change deal status")?;
        let change = self.lifecycle.set_status(deal_id, status).await?;
        if !change.changed() {
            return Ok(change.deal);
        }

        self.record(
            AuditEvent::new(AuditAction::DealStatusChanged, actor)
                .deal(deal_id)
                .details(format!("Status changed from {} to {}", change.from, change.to))
                .payload(status_payload(&change)),
        )
        .await;
        self.notify(
            Notification::new(
                NotificationKind::DealStatusChanged,
                "Deal status changed",
                format!("{} is now {}", change.deal.title, change.to),
            )
            .for_deal(deal_id),
        );
        Ok(change.deal)
    }

    #[instrument(skip(self, actor), fields(actor_id = %actor.user_id, deal_id = %deal_id, step_id = %step_id))]
    pub async fn advance_timeline_step(&self, actor: &Actor, deal_id: &DealId, step_id: &StepId) -> DealroomResult<Deal> {
        authorize(actor, Capability::EditDeals, "advance timeline")?;
        let change = self.lifecycle.advance_step(deal_id, step_id).await?;
        let label = change
            .deal
            .current_step()
            .map(|s| s.label.clone())
            .unwrap_or_else(|| step_id.to_string());

        self.record(
            AuditEvent::new(AuditAction::TimelineStepAdvanced, actor)
                .deal(deal_id)
                .details(format!("Current step is now {label}"))
                .payload(json!({ "from": change.from, "to": change.to })),
        )
        .await;
        self.notify(
            Notification::new(
                NotificationKind::TimelineAdvanced,
                "Timeline updated",
                format!("{} moved to {label}", change.deal.title),
            )
            .for_deal(deal_id),
        );
        Ok(change.deal)
    }

    /// Swap a deal's timeline. A current step missing from the new timeline
    /// is reset to its first step.
    #[instrument(skip(self, actor, steps), fields(actor_id = %actor.user_id, deal_id = %deal_id, steps = steps.len()))]
    pub async fn replace_timeline(&self, actor: &Actor, deal_id: &DealId, steps: &[TimelineStep]) -> DealroomResult<Deal> {
        authorize(actor, Capability::EditDeals, "replace timeline")?;
        let change = self.lifecycle.replace_timeline(deal_id, steps).await?;

        let details = match &change.reset_from {
            Some(stale) => format!(
                "Timeline replaced; current step reset from {stale} to {}",
                change.deal.current_step_id
            ),
            None => "Timeline replaced".to_string(),
        };
        self.record(
            AuditEvent::new(AuditAction::TimelineReplaced, actor)
                .deal(deal_id)
                .details(details)
                .payload(json!({
                    "from": change.previous,
                    "to": change.deal.timeline,
                    "current_step_reset_from": change.reset_from,
                    "current_step_id": change.deal.current_step_id,
                })),
        )
        .await;
        self.notify(
            Notification::new(
                NotificationKind::TimelineReplaced,
                "Timeline replaced",
                format!("{} has a new timeline", change.deal.title),
            )
            .for_deal(deal_id),
        );
        Ok(change.deal)
    }
}

fn status_payload(change: &StatusChange) -> serde_json::Value {
    json!({
        "from": change.from,
        "to": change.to,
        "closed_at": change.deal.closed_at,
        "closed_by": change.deal.closed_by,
        "closure_notes": change.deal.closure_notes,
    })
}
