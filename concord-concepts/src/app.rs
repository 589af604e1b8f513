//! The assembled application: concepts, syncs and an engine behind a single
//! request entry point.

use std::sync::Arc;

use concord_core::{
    action::Record,
    concept::ConceptRegistry,
    config::EngineConfig,
    engine::{Engine, EngineError},
    sync::SyncSet,
};
use serde_json::Value;
use thiserror::Error;

use crate::{
    authentication::UserAuthentication,
    event::{Clock, Event},
    interest::UserInterest,
    requesting::Requesting,
    reviewing::Reviewing,
    session::Session,
    syncs,
};

/// Errors returned by [`App::request`].
#[derive(Debug, Error)]
pub enum RequestError {
    #[error(transparent)]
    Engine(#[from] EngineError),
    #[error("request to {path} was not answered")]
    Unanswered { path: String },
}

/// Builder for [`App`].
#[derive(Default)]
pub struct AppBuilder {
    config: EngineConfig,
    clock: Option<Clock>,
    syncs: Option<SyncSet>,
}

impl AppBuilder {
    #[must_use]
    pub fn config(mut self, config: EngineConfig) -> Self {
        self.config = config;
        self
    }

    /// Time source of the Event concept.
    #[must_use]
    pub fn clock(mut self, clock: Clock) -> Self {
        self.clock = Some(clock);
        self
    }

    /// Replace the default sync set.
    #[must_use]
    pub fn syncs(mut self, syncs: SyncSet) -> Self {
        self.syncs = Some(syncs);
        self
    }

    /// Register the concepts and build the engine.
    ///
    /// # Errors
    ///
    /// Fails if the configuration is invalid or a sync refers to an unknown
    /// action.
    pub fn build(self) -> Result<App, EngineError> {
        let requesting = Arc::new(Requesting::new());
        let session = Arc::new(Session::new());
        let authentication = Arc::new(UserAuthentication::new());
        let event = Arc::new(self.clock.map_or_else(Event::new, Event::with_clock));
        let interest = Arc::new(UserInterest::new());
        let reviewing = Arc::new(Reviewing::new());

        let mut registry = ConceptRegistry::builder();
        registry
            .concept(Arc::clone(&requesting))
            .concept(Arc::clone(&session))
            .concept(Arc::clone(&authentication))
            .concept(Arc::clone(&event))
            .concept(Arc::clone(&interest))
            .concept(Arc::clone(&reviewing));

        let engine = Engine::builder(registry.build())
            .syncs(self.syncs.unwrap_or_else(syncs::all))
            .config(self.config)
            .build()?;

        Ok(App {
            engine,
            requesting,
            session,
            authentication,
            event,
            interest,
            reviewing,
        })
    }
}

/// Every concept wired to the engine.
///
/// Cloning is cheap; clones share all state.
#[derive(Clone)]
pub struct App {
    engine: Engine,
    requesting: Arc<Requesting>,
    session: Arc<Session>,
    authentication: Arc<UserAuthentication>,
    event: Arc<Event>,
    interest: Arc<UserInterest>,
    reviewing: Arc<Reviewing>,
}

impl App {
    /// Build the application with the default syncs.
    ///
    /// # Errors
    ///
    /// Fails if `config` is invalid.
    pub fn new(config: EngineConfig) -> Result<Self, EngineError> {
        Self::builder().config(config).build()
    }

    #[must_use]
    pub fn builder() -> AppBuilder {
        AppBuilder::default()
    }

    /// Submit a request and wait for the syncs to answer it.
    ///
    /// The request is recorded as `Requesting.request` with `path` added to
    /// `fields`, and the flow is drained before the response is collected.
    /// The request is closed whether or not the drain succeeds.
    ///
    /// # Errors
    ///
    /// Returns [`RequestError::Engine`] if the drain fails and
    /// [`RequestError::Unanswered`] if no sync responded.
    #[tracing::instrument(skip(self, fields))]
    pub async fn request(&self, path: &str, mut fields: Record) -> Result<Record, RequestError> {
        fields.insert("path".to_string(), Value::from(path));
        let opened = self
            .engine
            .registry()
            .perform(Requesting::REQUEST, fields.clone())?
            .await;

        let unanswered = || RequestError::Unanswered { path: path.to_string() };
        let request = opened
            .get("request")
            .and_then(Value::as_str)
            .map(str::to_string)
            .ok_or_else(unanswered)?;

        let drain = match self.engine.record(Requesting::REQUEST, fields, opened).await {
            Ok(drain) => drain,
            Err(error) => {
                self.requesting.take_response(&request).await;
                return Err(error.into());
            }
        };
        let response = self.requesting.take_response(&request).await.ok_or_else(unanswered)?;
        tracing::debug!(generations = drain.generations, "request answered");
        Ok(response)
    }

    #[must_use]
    pub fn engine(&self) -> &Engine {
        &self.engine
    }

    #[must_use]
    pub fn requesting(&self) -> &Arc<Requesting> {
        &self.requesting
    }

    #[must_use]
    pub fn session(&self) -> &Arc<Session> {
        &self.session
    }

    #[must_use]
    pub fn authentication(&self) -> &Arc<UserAuthentication> {
        &self.authentication
    }

    #[must_use]
    pub fn event(&self) -> &Arc<Event> {
        &self.event
    }

    #[must_use]
    pub fn interest(&self) -> &Arc<UserInterest> {
        &self.interest
    }

    #[must_use]
    pub fn reviewing(&self) -> &Arc<Reviewing> {
        &self.reviewing
    }
}
