//! Concepts for an event-scheduling application, and the syncs wiring them
//! together.
//!
//! Each concept is an in-memory store that knows nothing about the others:
//!
//! - [`requesting`] - Bridges external requests into the action log
//! - [`authentication`] - Username and password accounts
//! - [`session`] - Maps session tokens to users
//! - [`event`] - Scheduled events and their lifecycle
//! - [`interest`] - Personal (tag) and item interests of users
//! - [`reviewing`] - Ratings and reviews of items
//!
//! Authorization, request/response wiring, cascading deletes and derived
//! completion of past events all live in [`syncs`]. [`App`] puts everything
//! behind a single request entry point.
//!
//! ```no_run
//! use concord_concepts::App;
//! use concord_core::config::EngineConfig;
//! use serde_json::json;
//!
//! # async fn run() -> Result<(), Box<dyn std::error::Error>> {
//! let app = App::new(EngineConfig::default())?;
//! let session = app.session().create("alice").await;
//! let fields = json!({ "session": session }).as_object().cloned().unwrap_or_default();
//! let response = app.request("/Event/_getAllEvents", fields).await?;
//! println!("{}", serde_json::Value::Object(response));
//! # Ok(())
//! # }
//! ```

pub mod app;
pub mod authentication;
pub mod event;
pub mod interest;
pub mod requesting;
pub mod reviewing;
pub mod session;
pub mod syncs;

pub use app::{App, AppBuilder, RequestError};
