use chrono::{DateTime, Utc};
use dealroom_types::{AuditAction, DealId};
use serde::{Deserialize, Serialize};

/// A stored row together with its optimistic-concurrency version.
///
/// Versions start at 1 on insert and increase by one on every successful
/// compare-and-swap update.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Versioned<T> {
    pub record: T,
    pub version: u64,
}

impl<T> Versioned<T> {
    pub fn new(record: T, version: u64) -> Self {
        Self { record, version }
    }

    pub fn into_inner(self) -> T {
        self.record
    }

    pub fn map<U>(self, f: impl FnOnce(T) -> U) -> Versioned<U> {
        Versioned {
            record: f(self.record),
            version: self.version,
        }
    }
}

/// Generic query window for paged reads. A zero limit means unbounded.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct QueryWindow {
    pub limit: usize,
    pub offset: usize,
}

impl QueryWindow {
    pub fn first(limit: usize) -> Self {
        Self { limit, offset: 0 }
    }

    pub fn apply<T>(&self, items: Vec<T>) -> Vec<T> {
        let iter = items.into_iter().skip(self.offset);
        if self.limit == 0 {
            iter.collect()
        } else {
            iter.take(self.limit).collect()
        }
    }
}

/// Filters for audit reads. Results are ordered oldest-first by sequence.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AuditQuery {
    pub deal_id: Option<DealId>,
    pub actor_id: Option<String>,
    pub action: Option<AuditAction>,
    pub after: Option<DateTime<Utc>>,
    pub before: Option<DateTime<Utc>>,
    #[serde(default)]
    pub window: QueryWindow,
}

impl AuditQuery {
    pub fn for_deal(deal_id: DealId) -> Self {
        Self {
            deal_id: Some(deal_id),
            ..Default::default()
        }
    }
}
