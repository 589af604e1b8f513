//! Core traits and types for the Concord synchronization engine.
//!
//! Applications are built from independent *concepts* wired together by
//! declarative *syncs*. This crate provides the machinery:
//!
//! - [`action`] - Action identities, outcomes and log records
//! - [`concept`] - The `Concept` trait and the registry of actions and queries
//! - [`symbol`] - Pattern variables
//! - [`frame`] - Binding frames and the frame relation flowing through syncs
//! - [`pattern`] - Templates, action patterns and the when-clause join
//! - [`sync`] - Sync definitions (`when` / `where` / `then`)
//! - [`log`] - The append-only action log abstraction (`ActionLog`)
//! - [`engine`] - The dispatcher that drains flows to quiescence
//! - [`subscription`] - Push-based log watchers
//! - [`config`] - Engine limits loaded from TOML
//!
//! # Example
//!
//! ```
//! use concord_core::{concept::ConceptRegistry, engine::Engine, sync::SyncSet};
//!
//! let engine = Engine::builder(ConceptRegistry::builder().build())
//!     .syncs(SyncSet::new())
//!     .build()
//!     .unwrap();
//! assert!(engine.log().is_empty());
//! ```
//!
//! Most users should depend on the [`concord`](https://docs.rs/concord) crate,
//! which re-exports these types with a cleaner API surface.

pub mod action;
pub mod concept;
pub mod config;
pub mod engine;
pub mod frame;
pub mod log;
pub mod pattern;
pub mod subscription;
pub mod symbol;
pub mod sync;

// Test utilities module: public when feature enabled, internal for crate tests
#[cfg(feature = "test-util")]
pub mod test;

#[cfg(all(test, not(feature = "test-util")))]
pub(crate) mod test;
