//! Integrity verification for the audit chain

use dealroom_storage::{recompute_entry_hash, StorageResult};
use dealroom_types::AuditLogEntry;
use serde::Serialize;

/// Result of chain verification
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ChainVerification {
    /// Whether the chain is valid
    pub valid: bool,

    /// Total number of entries checked
    pub total_entries: usize,

    /// Number of entries successfully verified
    pub verified_entries: usize,

    /// Sequence number of the first invalid entry (if any)
    pub first_invalid_sequence: Option<u64>,

    /// Error message (if any)
    pub error_message: Option<String>,
}

impl ChainVerification {
    fn broken(total: usize, verified: usize, sequence: u64, message: String) -> Self {
        Self {
            valid: false,
            total_entries: total,
            verified_entries: verified,
            first_invalid_sequence: Some(sequence),
            error_message: Some(message),
        }
    }
}

/// Verify a full chain, oldest entry first.
///
/// Each entry's hash must match its recomputed content hash, link to the
/// previous entry's hash, and carry the next sequence number.
pub fn verify_entries(entries: &[AuditLogEntry]) -> StorageResult<ChainVerification> {
    let total = entries.len();

    for (i, entry) in entries.iter().enumerate() {
        if recompute_entry_hash(entry)? != entry.hash {
            return Ok(ChainVerification::broken(
                total,
                i,
                entry.sequence,
                format!("Entry {} has invalid hash", entry.sequence),
            ));
        }

        let expected_previous = i.checked_sub(1).map(|p| &entries[p].hash);
        if entry.previous_hash.as_ref() != expected_previous {
            return Ok(ChainVerification::broken(
                total,
                i,
                entry.sequence,
                format!(
                    "Entry {} has broken chain link (expected prev: {:?}, got: {:?})",
                    entry.sequence, expected_previous, entry.previous_hash
                ),
            ));
        }

        if entry.sequence != i as u64 + 1 {
            return Ok(ChainVerification::broken(
                total,
                i,
                entry.sequence,
                format!("Entry at position {} carries sequence {}", i + 1, entry.sequence),
            ));
        }
    }

    Ok(ChainVerification {
        valid: true,
        total_entries: total,
        verified_entries: total,
        first_invalid_sequence: None,
        error_message: None,
    })
}
