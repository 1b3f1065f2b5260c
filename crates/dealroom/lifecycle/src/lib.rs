//! Dealroom Lifecycle - deal status and timeline tracker
//!
//! Status moves `active ⇄ on_hold`, either of them to `closed`, and `closed`
//! back to `active` on reopen. Hold and activate are refused on a closed
//! deal. The timeline is an ordered list of 3 to 5 steps and the current step
//! always references one of them.
//!
//! Authorization is the caller's concern; this crate only enforces the
//! state rules and writes with compare-and-swap.

#![deny(unsafe_code)]

mod timeline;

pub use timeline::{timeline_from_labels, validate_timeline};

use chrono::Utc;
use dealroom_storage::{DealStore, Versioned};
use dealroom_types::{
    Deal, DealId, DealStatus, DealroomError, DealroomResult, EntityKind, NewDeal, StepId,
    TimelineStep,
};
use serde::Serialize;
use std::sync::Arc;
use tracing::{info, warn};

/// A status change applied to a deal.
#[derive(Debug, Clone, Serialize)]
pub struct StatusChange {
    pub deal: Deal,
    pub from: DealStatus,
    pub to: DealStatus,
}

impl StatusChange {
    pub fn changed(&self) -> bool {
        self.from != self.to
    }
}

/// A current-step change applied to a deal.
#[derive(Debug, Clone, Serialize)]
pub struct StepChange {
    pub deal: Deal,
    pub from: StepId,
    pub to: StepId,
}

/// Result of replacing a deal's timeline.
#[derive(Debug, Clone, Serialize)]
pub struct TimelineChange {
    pub deal: Deal,
    pub previous: Vec<TimelineStep>,
    /// Set when the current step was absent from the new timeline and was
    /// reset to its first step.
    pub reset_from: Option<StepId>,
}

/// Deal lifecycle over the deal store.
pub struct DealLifecycle {
    deals: Arc<dyn DealStore>,
}

impl DealLifecycle {
    pub fn new(deals: Arc<dyn DealStore>) -> Self {
        Self { deals }
    }

    /// Open a new active deal positioned on the first timeline step.
    pub async fn create(&self, new: NewDeal, default_timeline: &[TimelineStep]) -> DealroomResult<Deal> {
        let title = new.title.trim();
        if title.is_empty() {
            return Err(DealroomError::InvalidInput("deal title must not be empty".into()));
        }

        let timeline = validate_timeline(new.timeline.as_deref().unwrap_or(default_timeline))?;
        let current_step_id = first_step(&timeline)?;

        let deal = Deal {
            id: DealId::generate(),
            deal_number: new.deal_number.map(|n| n.trim().to_string()).filter(|n| !n.is_empty()),
            title: title.to_string(),
            property_address: new.property_address.trim().to_string(),
            status: DealStatus::Active,
            closed_at: None,
            closed_by: None,
            closure_notes: None,
            timeline,
            current_step_id,
            created_at: Utc::now(),
        };
        let stored = self.deals.insert_deal(deal).await?;
        info!(deal_id = %stored.record.id, "Deal created");
        Ok(stored.record)
    }

    pub async fn get(&self, deal_id: &DealId) -> DealroomResult<Deal> {
        Ok(self.load(deal_id).await?.record)
    }

    pub async fn list(&self) -> DealroomResult<Vec<Deal>> {
        Ok(self.deals.list_deals().await?)
    }

    pub async fn close(&self, deal_id: &DealId, actor_id: &str, notes: Option<&str>) -> DealroomResult<StatusChange> {
        let current = self.load(deal_id).await?;
        let from = current.record.status;
        if from == DealStatus::Closed {
            return Err(DealroomError::invalid_transition(EntityKind::Deal, from, "close"));
        }

        let mut deal = current.record;
        deal.status = DealStatus::Closed;
        deal.closed_at = Some(Utc::now());
        deal.closed_by = Some(actor_id.to_string());
        deal.closure_notes = notes.map(str::trim).filter(|n| !n.is_empty()).map(str::to_string);
        self.write_status(deal, current.version, from).await
    }

    pub async fn reopen(&self, deal_id: &DealId) -> DealroomResult<StatusChange> {
        let current = self.load(deal_id).await?;
        let from = current.record.status;
        if from != DealStatus::Closed {
            return Err(DealroomError::invalid_transition(EntityKind::Deal, from, "reopen"));
        }

        let mut deal = current.record;
        deal.status = DealStatus::Active;
        deal.closed_at = None;
        deal.closed_by = None;
        deal.closure_notes = None;
        self.write_status(deal, current.version, from).await
    }

    /// Move between active and on hold. Writing the current status is a no-op.
    pub async fn set_status(&self, deal_id: &DealId, target: DealStatus) -> DealroomResult<StatusChange> {
        if target == DealStatus::Closed {
            return Err(DealroomError::InvalidInput(
                "deals are closed through close, not a status write".into(),
            ));
        }

        let current = self.load(deal_id).await?;
        let from = current.record.status;
        if from == DealStatus::Closed {
            return Err(DealroomError::invalid_transition(
                EntityKind::Deal,
                from,
                format!("set {target} on"),
            ));
        }
        if from == target {
            return Ok(StatusChange {
                deal: current.record,
                from,
                to: target,
            });
        }

        let mut deal = current.record;
        deal.status = target;
        self.write_status(deal, current.version, from).await
    }

    pub async fn advance_step(&self, deal_id: &DealId, step_id: &StepId) -> DealroomResult<StepChange> {
        let current = self.load(deal_id).await?;
        if !current.record.has_step(step_id) {
            return Err(DealroomError::not_found(EntityKind::TimelineStep, step_id));
        }

        let from = current.record.current_step_id.clone();
        let mut deal = current.record;
        deal.current_step_id = step_id.clone();
        let stored = self.deals.update_deal(deal, current.version).await?;
        info!(deal_id = %deal_id, from = %from, to = %step_id, "Timeline step advanced");
        Ok(StepChange {
            deal: stored.record,
            from,
            to: step_id.clone(),
        })
    }

    /// Swap in a new timeline. When the current step is not part of it the
    /// current step moves to the new first step.
    pub async fn replace_timeline(&self, deal_id: &DealId, steps: &[TimelineStep]) -> DealroomResult<TimelineChange> {
        let timeline = validate_timeline(steps)?;
        let current = self.load(deal_id).await?;

        let mut deal = current.record;
        let previous = std::mem::replace(&mut deal.timeline, timeline);
        let reset_from = if deal.has_step(&deal.current_step_id) {
            None
        } else {
            let stale = std::mem::replace(&mut deal.current_step_id, first_step(&deal.timeline)?);
            warn!(
                deal_id = %deal_id,
                from = %stale,
                to = %deal.current_step_id,
                "Current step missing from new timeline, reset to first step"
            );
            Some(stale)
        };

        let stored = self.deals.update_deal(deal, current.version).await?;
        info!(deal_id = %deal_id, steps = stored.record.timeline.len(), "Timeline replaced");
        Ok(TimelineChange {
            deal: stored.record,
            previous,
            reset_from,
        })
    }

    async fn load(&self, deal_id: &DealId) -> DealroomResult<Versioned<Deal>> {
        self.deals
            .get_deal(deal_id)
            .await?
            .ok_or_else(|| DealroomError::not_found(EntityKind::Deal, deal_id))
    }

    async fn write_status(&self, deal: Deal, expected_version: u64, from: DealStatus) -> DealroomResult<StatusChange> {
        let to = deal.status;
        let stored = self.deals.update_deal(deal, expected_version).await?;
        info!(deal_id = %stored.record.id, from = %from, to = %to, "Deal status changed");
        Ok(StatusChange {
            deal: stored.record,
            from,
            to,
        })
    }
}

fn first_step(timeline: &[TimelineStep]) -> DealroomResult<StepId> {
    timeline
        .first()
        .map(|s| s.id.clone())
        .ok_or_else(|| DealroomError::InvalidInput("timeline has no steps".into()))
}
