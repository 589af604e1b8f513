//! The syncs coordinating the concepts.
//!
//! Concepts never call each other. Everything that spans concepts is a sync:
//! request routing and authorization, signing in, responses, cascading
//! deletes and the completion of events that have ended.

pub mod authentication;
mod common;
pub mod event;
pub mod interest;

use concord_core::sync::SyncSet;

pub use common::INVALID_SESSION;
pub use event::EVENT_NOT_FOUND;

/// Every sync of the application.
#[must_use]
pub fn all() -> SyncSet {
    let mut syncs = event::all();
    syncs.merge(interest::all());
    syncs.merge(authentication::all());
    syncs
}
