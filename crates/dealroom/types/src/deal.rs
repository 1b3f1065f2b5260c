//! Deals, their timelines, and document requirements (tasks)

use crate::ids::{DealId, StepId, TaskId};
use crate::role::Role;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

/// Minimum number of steps in a deal timeline.
pub const MIN_TIMELINE_STEPS: usize = 3;
/// Maximum number of steps in a deal timeline.
pub const MAX_TIMELINE_STEPS: usize = 5;

/// Lifecycle status of a deal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DealStatus {
    Active,
    OnHold,
    Closed,
}

impl DealStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            DealStatus::Active => "active",
            DealStatus::OnHold => "on_hold",
            DealStatus::Closed => "closed",
        }
    }
}

impl fmt::Display for DealStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One phase of a deal's progress.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimelineStep {
    pub id: StepId,
    pub label: String,
    pub order: u32,
}

impl TimelineStep {
    pub fn new(id: impl Into<String>, label: impl Into<String>, order: u32) -> Self {
        Self {
            id: StepId::new(id),
            label: label.into(),
            order,
        }
    }
}

/// Ways a proposed timeline can break the 3..=5 / unique / 1..N invariant.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Error)]
pub enum TimelineViolation {
    #[error("timeline has {len} steps, expected between {min} and {max}")]
    StepCount { len: usize, min: usize, max: usize },

    #[error("step id {0} appears more than once")]
    DuplicateStepId(StepId),

    #[error("step orders must be exactly 1..={len} with no gaps, got {found:?}")]
    NonSequentialOrder { len: usize, found: Vec<u32> },

    #[error("step {0} has an empty label")]
    EmptyLabel(StepId),
}

/// A real-estate transaction.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Deal {
    pub id: DealId,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub deal_number: Option<String>,
    pub title: String,
    pub property_address: String,
    pub status: DealStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub closed_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub closed_by: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub closure_notes: Option<String>,
    /// Kept sorted by `order`.
    pub timeline: Vec<TimelineStep>,
    pub current_step_id: StepId,
    pub created_at: DateTime<Utc>,
}

impl Deal {
    pub fn current_step(&self) -> Option<&TimelineStep> {
        self.timeline.iter().find(|s| s.id == self.current_step_id)
    }

    pub fn has_step(&self, step_id: &StepId) -> bool {
        self.timeline.iter().any(|s| &s.id == step_id)
    }
}

/// Request to open a new deal.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewDeal {
    pub deal_number: Option<String>,
    pub title: String,
    pub property_address: String,
    /// Falls back to the configured default timeline when absent.
    pub timeline: Option<Vec<TimelineStep>>,
}

/// Derived status of a document requirement.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskStatus {
    Pending,
    InReview,
    Completed,
}

impl TaskStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            TaskStatus::Pending => "pending",
            TaskStatus::InReview => "in_review",
            TaskStatus::Completed => "completed",
        }
    }
}

impl fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A named document requirement assigned to a role within a deal.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Task {
    pub id: TaskId,
    pub deal_id: DealId,
    pub title: String,
    pub assigned_to: Role,
    /// Derived from the task's documents; never set directly by callers.
    pub status: TaskStatus,
    pub required: bool,
}

/// Request to add a document requirement to a deal.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewTask {
    pub title: String,
    pub assigned_to: Role,
    pub required: bool,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_current_step_lookup() {
        let deal = Deal {
            id: DealId::new("d1"),
            deal_number: None,
            title: "12 Elm".into(),
            property_address: "12 Elm St".into(),
            status: DealStatus::Active,
            closed_at: None,
            closed_by: None,
            closure_notes: None,
            timeline: vec![
                TimelineStep::new("a", "Offer", 1),
                TimelineStep::new("b", "Inspection", 2),
                TimelineStep::new("c", "Closing", 3),
            ],
            current_step_id: StepId::new("b"),
            created_at: Utc::now(),
        };
        assert_eq!(deal.current_step().map(|s| s.label.as_str()), Some("Inspection"));
        assert!(deal.has_step(&StepId::new("c")));
        assert!(!deal.has_step(&StepId::new("z")));
    }

    #[test]
    fn test_status_serde_names() {
        assert_eq!(serde_json::to_string(&DealStatus::OnHold).unwrap(), "\"on_hold\"");
        assert_eq!(serde_json::to_string(&TaskStatus::InReview).unwrap(), "\"in_review\"");
    }
}
