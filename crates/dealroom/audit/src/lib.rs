//! Dealroom Audit - append-only record of every mutating action
//!
//! Entries are written right after the mutation they describe has committed.
//! The log is observability, not a transactional participant: a failed write
//! is reported on the operational channel and never reaches the caller.

#![deny(unsafe_code)]

mod integrity;

pub use integrity::{verify_entries, ChainVerification};

use chrono::Utc;
use dealroom_storage::{AuditQuery, AuditStore};
use dealroom_types::{Actor, AuditAction, AuditAppend, AuditLogEntry, DealId, DealroomResult};
use serde_json::Value;
use std::sync::Arc;
use tracing::{debug, error};

/// Builder for one audit entry.
#[derive(Debug, Clone)]
pub struct AuditEvent {
    action: AuditAction,
    actor_id: String,
    actor_name: String,
    deal_id: Option<DealId>,
    details: String,
    payload: Value,
}

impl AuditEvent {
    pub fn new(action: AuditAction, actor: &Actor) -> Self {
        Self {
            action,
            actor_id: actor.user_id.clone(),
            actor_name: actor.display_name.clone(),
            deal_id: None,
            details: String::new(),
            payload: Value::Null,
        }
    }

    pub fn deal(mut self, deal_id: &DealId) -> Self {
        self.deal_id = Some(deal_id.clone());
        self
    }

    pub fn details(mut self, details: impl Into<String>) -> Self {
        self.details = details.into();
        self
    }

    /// Structured context, typically the old and new state.
    pub fn payload(mut self, payload: Value) -> Self {
        self.payload = payload;
        self
    }

    pub fn action(&self) -> AuditAction {
        self.action
    }

    fn into_append(self) -> AuditAppend {
        AuditAppend {
            deal_id: self.deal_id,
            actor_id: self.actor_id,
            actor_name: self.actor_name,
            action: self.action,
            details: self.details,
            payload: self.payload,
            timestamp: Utc::now(),
        }
    }
}

/// Best-effort audit writer and reader.
pub struct AuditLog {
    store: Arc<dyn AuditStore>,
    enabled: bool,
}

impl AuditLog {
    pub fn new(store: Arc<dyn AuditStore>) -> Self {
        Self {
            store,
            enabled: true,
        }
    }

    pub fn with_enabled(mut self, enabled: bool) -> Self {
        self.enabled = enabled;
        self
    }

    /// Append an entry. Failures are logged and swallowed.
    pub async fn record(&self, event: AuditEvent) -> Option<AuditLogEntry> {
        if !self.enabled {
            return None;
        }

        let action = event.action;
        let append = event.into_append();
        let deal_id = append.deal_id.clone();
        match self.store.append_audit(append).await {
            Ok(entry) => {
                debug!(sequence = entry.sequence, action = %action, "Audit entry appended");
                Some(entry)
            }
            Err(err) => {
                error!(
                    action = %action,
                    deal_id = ?deal_id,
                    error = %err,
                    "Audit write failed; primary mutation already committed"
                );
                None
            }
        }
    }

    /// Entries of one deal, oldest first.
    pub async fn trail(&self, deal_id: &DealId) -> DealroomResult<Vec<AuditLogEntry>> {
        self.query(&AuditQuery::for_deal(deal_id.clone())).await
    }

    pub async fn query(&self, query: &AuditQuery) -> DealroomResult<Vec<AuditLogEntry>> {
        Ok(self.store.list_audit(query).await?)
    }

    /// Walk the whole chain and check every hash and link.
    pub async fn verify_chain(&self) -> DealroomResult<ChainVerification> {
        let entries = self.store.list_audit(&AuditQuery::default()).await?;
        Ok(verify_entries(&entries)?)
    }
}
