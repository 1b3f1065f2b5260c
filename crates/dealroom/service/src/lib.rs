//! Dealroom Service - the in-process API over the deal custody core
//!
//! [`DealroomService`] is the single entry point for every inbound
//! operation. It authorizes the actor, routes the mutation to the owning
//! component, and then writes the audit entry and queues notifications:
//!
//! - **Directory**: resolve, create, update, delete and search identities
//! - **Participation**: add, remove and update deal participants; roster
//! - **Custody**: upload, verify, release and reject documents
//! - **Lifecycle**: create, close, reopen, hold deals; advance and replace timelines
//! - **Reads**: visible documents, downloads, audit trail, projection snapshot

#![deny(unsafe_code)]

pub mod config;
pub mod projection;
mod service;
pub mod telemetry;

pub use config::{
    AuditConfig, CustodyConfig, DealroomConfig, LoggingConfig, NotificationConfig,
    TimelineConfig,
};
pub use projection::{project, DealView, IdentityView, Projection, TaskProgress};
pub use service::{DealroomService, DealroomServiceBuilder};

pub use dealroom_audit::ChainVerification;
pub use dealroom_custody::{TaskStatusChange, UploadOutcome};
pub use dealroom_directory::{DeletedIdentity, Resolution, ResolveMode};
pub use dealroom_notify::{
    MemoryNotificationSink, Notification, NotificationKind, NotificationSink, NotifyError,
};
pub use dealroom_participation::{AddOutcome, IdentityRef, LinkChange, RosterEntry};
