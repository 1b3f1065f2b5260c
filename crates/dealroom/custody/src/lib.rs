//! Dealroom Custody - document custody state machine
//!
//! A document moves `private → verified → released`, or is rejected from
//! `private` or `verified`. Released is terminal. The owning task's status is
//! derived from its documents and re-derived after every upload and release.

#![deny(unsafe_code)]

mod engine;
mod machine;

pub use engine::{DocumentCustody, TaskStatusChange, TransitionOutcome, UploadOutcome};
pub use machine::{next_status, recompute_task_status};
