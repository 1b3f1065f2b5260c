//! Hash linking for the append-only audit table

use crate::{StorageError, StorageResult};
use dealroom_types::{AuditAppend, AuditLogEntry};
use sha2::{Digest, Sha256};

/// Hash an audit payload at a position in the chain.
pub fn compute_audit_hash(
    event: &AuditAppend,
    previous_hash: Option<&str>,
    sequence: u64,
) -> StorageResult<String> {
    let serializable = serde_json::json!({
        "previous_hash": previous_hash,
        "sequence": sequence,
        "deal_id": event.deal_id,
        "actor_id": event.actor_id,
        "actor_name": event.actor_name,
        "action": event.action,
        "details": event.details,
        "payload": event.payload,
        "timestamp": event.timestamp,
    });
    let serialized = serde_json::to_vec(&serializable)
        .map_err(|e| StorageError::Serialization(e.to_string()))?;

    let mut hasher = Sha256::new();
    hasher.update(&serialized);
    Ok(hex::encode(hasher.finalize()))
}

/// Recompute the hash a stored entry should carry.
pub fn recompute_entry_hash(entry: &AuditLogEntry) -> StorageResult<String> {
    let event = AuditAppend {
        deal_id: entry.deal_id.clone(),
        actor_id: entry.actor_id.clone(),
        actor_name: entry.actor_name.clone(),
        action: entry.action,
        details: entry.details.clone(),
        payload: entry.payload.clone(),
        timestamp: entry.timestamp,
    };
    compute_audit_hash(&event, entry.previous_hash.as_deref(), entry.sequence)
}
