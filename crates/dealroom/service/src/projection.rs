//! Read-side projection from raw rows.
//!
//! [`project`] is a pure function: the same rows always give the same views
//! and nothing is cached between calls. Re-run it whenever any input changes.

use dealroom_participation::RosterEntry;
use dealroom_types::{Deal, DealId, DealParticipation, Identity, IdentityId, Task, TaskStatus};
use serde::Serialize;
use std::collections::HashMap;

/// Counts of a deal's document requirements by derived status.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct TaskProgress {
    pub total: usize,
    pub pending: usize,
    pub in_review: usize,
    pub completed: usize,
    /// Required tasks that are not completed yet.
    pub required_outstanding: usize,
}

impl TaskProgress {
    fn tally(tasks: &[Task]) -> Self {
        tasks.iter().fold(Self::default(), |mut p, t| {
            p.total += 1;
            match t.status {
                TaskStatus::Pending => p.pending += 1,
                TaskStatus::InReview => p.in_review += 1,
                TaskStatus::Completed => p.completed += 1,
            }
            if t.required && t.status != TaskStatus::Completed {
                p.required_outstanding += 1;
            }
            p
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DealView {
    pub deal: Deal,
    pub current_step_label: Option<String>,
    pub tasks: Vec<Task>,
    pub progress: TaskProgress,
    /// Active participants joined with the directory.
    pub roster: Vec<RosterEntry>,
}

/// One identity with every deal it is actively linked to.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct IdentityView {
    pub identity: Identity,
    pub active_deals: Vec<DealId>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct Projection {
    pub deals: Vec<DealView>,
    pub identities: Vec<IdentityView>,
}

impl Projection {
    pub fn deal(&self, deal_id: &DealId) -> Option<&DealView> {
        self.deals.iter().find(|d| &d.deal.id == deal_id)
    }
}

/// Build deal, task and roster views from raw rows.
///
/// Links to deals or identities missing from the input are ignored, and so
/// are tasks of unknown deals.
pub fn project(
    identities: &[Identity],
    links: &[DealParticipation],
    deals: &[Deal],
    tasks: &[Task],
) -> Projection {
    let by_id: HashMap<&IdentityId, &Identity> = identities.iter().map(|i| (&i.id, i)).collect();

    let mut tasks_by_deal: HashMap<&DealId, Vec<Task>> = HashMap::new();
    for task in tasks {
        tasks_by_deal.entry(&task.deal_id).or_default().push(task.clone());
    }

    let mut roster_by_deal: HashMap<&DealId, Vec<RosterEntry>> = HashMap::new();
    let mut deals_by_identity: HashMap<&IdentityId, Vec<DealId>> = HashMap::new();
    for link in links.iter().filter(|l| l.is_active) {
        let Some(identity) = by_id.get(&link.identity_id) else {
            continue;
        };
        roster_by_deal.entry(&link.deal_id).or_default().push(RosterEntry {
            participation: link.clone(),
            identity: (*identity).clone(),
        });
        deals_by_identity
            .entry(&link.identity_id)
            .or_default()
            .push(link.deal_id.clone());
    }

    let deal_views = deals
        .iter()
        .map(|deal| {
            let tasks = tasks_by_deal.remove(&deal.id).unwrap_or_default();
            DealView {
                current_step_label: deal.current_step().map(|s| s.label.clone()),
                progress: TaskProgress::tally(&tasks),
                tasks,
                roster: roster_by_deal.remove(&deal.id).unwrap_or_default(),
                deal: deal.clone(),
            }
        })
        .collect::<Vec<_>>();

    let known_deals = deals.iter().map(|d| &d.id).collect::<Vec<_>>();
    let identity_views = identities
        .iter()
        .map(|identity| IdentityView {
            identity: identity.clone(),
            active_deals: deals_by_identity
                .get(&identity.id)
                .map(|ids| {
                    ids.iter()
                        .filter(|id| known_deals.contains(id))
                        .cloned()
                        .collect()
                })
                .unwrap_or_default(),
        })
        .collect();

    Projection {
        deals: deal_views,
        identities: identity_views,
    }
}
