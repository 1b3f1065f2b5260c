//! Dealroom Types - shared data model for the deal custody core
//!
//! Every other dealroom crate speaks in these types:
//!
//! - **Identity / DealParticipation**: the global participant directory and
//!   its deal-scoped links
//! - **Deal / TimelineStep / Task**: deal lifecycle and document requirements
//! - **DealDocument**: one uploaded file attempt with its custody status
//! - **AuditLogEntry**: append-only record of every mutation
//! - **DealroomError**: the typed error taxonomy returned at the call boundary

#![deny(unsafe_code)]

pub mod audit;
pub mod deal;
pub mod document;
pub mod email;
pub mod error;
pub mod identity;
pub mod ids;
pub mod role;

pub use audit::{AuditAction, AuditAppend, AuditLogEntry};
pub use deal::{
    Deal, DealStatus, NewDeal, NewTask, Task, TaskStatus, TimelineStep, TimelineViolation,
    MAX_TIMELINE_STEPS, MIN_TIMELINE_STEPS,
};
pub use document::{CustodyAction, DealDocument, DocumentStatus};
pub use email::{normalize_email, NormalizedEmail};
pub use error::{DealroomError, DealroomResult, EntityKind};
pub use identity::{
    DealParticipation, Identity, IdentityCandidate, IdentityUpdate, InvitationStatus,
    ParticipantPermissions, ParticipantUpdate, PermissionOverrides,
};
pub use ids::{
    AuditEntryId, BlobRef, DealId, DocumentId, IdentityId, ParticipationId, StepId, TaskId,
};
pub use role::{Actor, Role};
