//! Dealroom Policy - permission resolver
//!
//! Pure functions, no side effects. Consulted before every document read,
//! download and custody transition, and before every administrative action.

#![deny(unsafe_code)]

mod capability;
mod documents;

pub use capability::{authorize, can_close_deals, can_edit_deals, has_capability, Capability};
pub use documents::{
    can_download, can_see_metadata, can_transition_document, can_upload, can_view_all_documents_of_role,
    can_view_document, can_view_timeline, link_grants_download,
};
