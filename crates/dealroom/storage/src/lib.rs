//! Dealroom storage abstractions.
//!
//! This crate defines the persistence contract for the custody core:
//! - versioned row stores for identities, participations, deals, tasks and documents
//! - the append-only, hash-linked audit table
//! - an opaque blob store for uploaded bytes
//!
//! Every update is a compare-and-swap against the version read earlier, so two
//! writers racing on the same row cannot both succeed. The email unique index
//! on canonical identities is the final arbiter of directory deduplication.

#![deny(unsafe_code)]
#![warn(rust_2018_idioms)]

pub mod chain;
mod error;
pub mod memory;
mod model;
mod traits;

pub use chain::{compute_audit_hash, recompute_entry_hash};
pub use error::{StorageError, StorageResult};
pub use memory::{InMemoryBlobStore, InMemoryDealroomStorage};
pub use model::{AuditQuery, QueryWindow, Versioned};
pub use traits::{
    AuditStore, BlobStore, DealStore, DealroomStorage, DocumentStore, IdentityStore,
    ParticipationStore, TaskStore,
};
