//! Timeline validation.

use dealroom_types::{StepId, TimelineStep, TimelineViolation, MAX_TIMELINE_STEPS, MIN_TIMELINE_STEPS};
use std::collections::HashSet;

/// Check a proposed timeline and return it sorted by `order`.
///
/// A valid timeline has 3 to 5 steps, unique ids, non-empty labels, and
/// orders that are exactly `1..=len` once sorted.
pub fn validate_timeline(steps: &[TimelineStep]) -> Result<Vec<TimelineStep>, TimelineViolation> {
    let len = steps.len();
    if !(MIN_TIMELINE_STEPS..=MAX_TIMELINE_STEPS).contains(&len) {
        return Err(TimelineViolation::StepCount {
            len,
            min: MIN_TIMELINE_STEPS,
            max: MAX_TIMELINE_STEPS,
        });
    }

    let mut seen = HashSet::with_capacity(len);
    for step in steps {
        if !seen.insert(&step.id) {
            return Err(TimelineViolation::DuplicateStepId(step.id.clone()));
        }
        if step.label.trim().is_empty() {
            return Err(TimelineViolation::EmptyLabel(step.id.clone()));
        }
    }

    let mut sorted = steps.to_vec();
    sorted.sort_by_key(|s| s.order);
    let sequential = sorted
        .iter()
        .zip(1u32..)
        .all(|(step, expected)| step.order == expected);
    if !sequential {
        return Err(TimelineViolation::NonSequentialOrder {
            len,
            found: sorted.iter().map(|s| s.order).collect(),
        });
    }

    Ok(sorted)
}

/// Build a timeline from ordered labels, numbering ids and orders from 1.
pub fn timeline_from_labels<S: AsRef<str>>(labels: &[S]) -> Result<Vec<TimelineStep>, TimelineViolation> {
    let steps = labels
        .iter()
        .zip(1u32..)
        .map(|(label, order)| TimelineStep {
            id: StepId::new(format!("step-{order}")),
            label: label.as_ref().trim().to_string(),
            order,
        })
        .collect::<Vec<_>>();
    validate_timeline(&steps)
}
