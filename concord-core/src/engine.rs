//! The synchronization engine.
//!
//! [`Engine`] turns one external trigger into a *flow*: it appends the
//! trigger, evaluates every sync against the flow's entries, runs the
//! resulting actions concurrently, appends their outcomes as the next
//! generation, and repeats until a generation produces nothing new.
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
//! assert!(engine.syncs().is_empty());
//! ```

use std::{collections::HashSet, sync::Arc};

use nonempty::NonEmpty;
use serde_json::Value;
use thiserror::Error;
use tokio::{sync::Semaphore, task::JoinSet};

use crate::{
    action::{ActionRecord, ActionRef, FlowId, Outcome, PendingRecord, QueryRef, Record},
    concept::ConceptRegistry,
    config::{ConfigError, EngineConfig},
    log::{ActionLog, EntryStream, LogFilter, inmemory},
    symbol::Symbol,
    sync::{Invocation, SyncRule, SyncSet},
};

/// Errors that abort a drain or prevent an engine from being built.
#[derive(Debug, Error)]
pub enum EngineError {
    #[error("no action `{0}` is registered")]
    UnknownAction(ActionRef),
    #[error("no query `{0}` is registered")]
    UnknownQuery(QueryRef),
    #[error("query `{query}` rejected its input: {message}")]
    QueryInput { query: QueryRef, message: String },
    #[error("symbol {symbol} is bound to {existing}, cannot rebind it to {attempted}")]
    SymbolConflict {
        symbol: Symbol,
        existing: Value,
        attempted: Value,
    },
    #[error("flow {flow} exceeded the limit of {limit} generations")]
    GenerationLimit { flow: FlowId, limit: usize },
    #[error("sync `{0}` is registered more than once")]
    DuplicateSync(String),
    #[error("where clause of sync `{sync}` failed: {source}")]
    Where {
        sync: String,
        #[source]
        source: Box<EngineError>,
    },
    #[error("action log error: {0}")]
    Log(#[source] Box<dyn std::error::Error + Send + Sync + 'static>),
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error("action executor is closed")]
    ExecutorClosed,
    #[error("engine task panicked")]
    TaskPanicked,
}

impl EngineError {
    fn log<E: std::error::Error + Send + Sync + 'static>(error: E) -> Self {
        Self::Log(Box::new(error))
    }
}

/// Summary of one completed drain.
#[derive(Clone, Debug)]
pub struct Drain {
    pub flow: FlowId,
    /// Generations that fired at least one sync.
    pub generations: usize,
    pub trigger: ActionRecord,
    /// Entries appended by syncs, in log order.
    pub caused: Vec<ActionRecord>,
}

impl Drain {
    /// The trigger followed by everything it caused.
    pub fn entries(&self) -> impl Iterator<Item = &ActionRecord> {
        std::iter::once(&self.trigger).chain(&self.caused)
    }

    /// Caused entries recording `action`.
    pub fn entries_for(&self, action: ActionRef) -> impl Iterator<Item = &ActionRecord> {
        self.caused.iter().filter(move |entry| entry.action == action)
    }

    #[must_use]
    pub fn output(&self) -> &Outcome {
        &self.trigger.output
    }
}

/// Builder for [`Engine`].
pub struct EngineBuilder<L = inmemory::Log> {
    registry: ConceptRegistry,
    syncs: SyncSet,
    config: EngineConfig,
    log: L,
}

impl<L> EngineBuilder<L> {
    #[must_use]
    pub fn syncs(mut self, syncs: SyncSet) -> Self {
        self.syncs.merge(syncs);
        self
    }

    #[must_use]
    pub fn sync(mut self, sync: SyncRule) -> Self {
        self.syncs.push(sync);
        self
    }

    #[must_use]
    pub fn config(mut self, config: EngineConfig) -> Self {
        self.config = config;
        self
    }

    /// Use a different action log backend.
    #[must_use]
    pub fn log<M>(self, log: M) -> EngineBuilder<M> {
        EngineBuilder {
            registry: self.registry,
            syncs: self.syncs,
            config: self.config,
            log,
        }
    }

    /// Validate the configuration and syncs and build the engine.
    ///
    /// # Errors
    ///
    /// Fails on invalid limits, duplicate sync names, or a sync that refers
    /// to an action no concept registered.
    pub fn build(self) -> Result<Engine<L>, EngineError>
    where
        L: ActionLog,
    {
        self.config.validate()?;

        let mut names = HashSet::new();
        for rule in self.syncs.iter() {
            if !names.insert(rule.name()) {
                return Err(EngineError::DuplicateSync(rule.name().to_owned()));
            }
            let referenced = rule
                .when()
                .iter()
                .map(|pattern| pattern.action)
                .chain(rule.then().iter().map(|then| then.action));
            for action in referenced {
                if !self.registry.has_action(action) {
                    tracing::error!(sync = rule.name(), %action, "sync refers to an unregistered action");
                    return Err(EngineError::UnknownAction(action));
                }
            }
        }

        tracing::debug!(syncs = self.syncs.len(), "engine built");
        Ok(Engine {
            inner: Arc::new(Shared {
                permits: Arc::new(Semaphore::new(self.config.max_concurrent_actions)),
                log: self.log,
                registry: Arc::new(self.registry),
                syncs: self.syncs,
                config: self.config,
            }),
        })
    }
}

/// Dispatcher driving flows to quiescence.
///
/// Cloning is cheap; clones share the log, registry and syncs, and can drain
/// independent flows concurrently.
pub struct Engine<L = inmemory::Log> {
    inner: Arc<Shared<L>>,
}

struct Shared<L> {
    log: L,
    registry: Arc<ConceptRegistry>,
    syncs: SyncSet,
    config: EngineConfig,
    permits: Arc<Semaphore>,
}

impl<L> Clone for Engine<L> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl Engine {
    /// Start building an engine backed by an in-memory log.
    #[must_use]
    pub fn builder(registry: ConceptRegistry) -> EngineBuilder {
        EngineBuilder {
            registry,
            syncs: SyncSet::new(),
            config: EngineConfig::default(),
            log: inmemory::Log::new(),
        }
    }
}

impl<L> Engine<L>
where
    L: ActionLog + 'static,
{
    #[must_use]
    pub fn log(&self) -> &L {
        &self.inner.log
    }

    #[must_use]
    pub fn registry(&self) -> &Arc<ConceptRegistry> {
        &self.inner.registry
    }

    #[must_use]
    pub fn syncs(&self) -> &SyncSet {
        &self.inner.syncs
    }

    #[must_use]
    pub fn config(&self) -> &EngineConfig {
        &self.inner.config
    }

    /// Run `action` in a fresh flow and drain everything it triggers.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::UnknownAction`] for unregistered actions and any
    /// fatal error raised while draining.
    #[tracing::instrument(skip_all, fields(%action))]
    pub async fn invoke(&self, action: ActionRef, input: Record) -> Result<Drain, EngineError> {
        let output = self.inner.registry.perform(action, input.clone())?.await;
        let flow = FlowId::new();
        self.drain(flow, Vec::new(), PendingRecord::new(flow, action, input, output))
            .await
    }

    /// Record an action that already completed elsewhere and drain its flow.
    ///
    /// # Errors
    ///
    /// Same as [`Engine::invoke`].
    #[tracing::instrument(skip_all, fields(%action))]
    pub async fn record(&self, action: ActionRef, input: Record, output: Outcome) -> Result<Drain, EngineError> {
        if !self.inner.registry.has_action(action) {
            return Err(EngineError::UnknownAction(action));
        }
        let flow = FlowId::new();
        self.drain(flow, Vec::new(), PendingRecord::new(flow, action, input, output))
            .await
    }

    /// Subscribe to the engine's log.
    pub fn subscribe(&self, filter: LogFilter) -> EntryStream<'_, L::Error> {
        self.inner.log.subscribe(filter)
    }

    /// Append `history` without evaluating it, then drain from `trigger`.
    pub(crate) async fn drain(
        &self,
        flow: FlowId,
        history: Vec<PendingRecord>,
        trigger: PendingRecord,
    ) -> Result<Drain, EngineError> {
        if let Some(history) = NonEmpty::from_vec(history) {
            self.append(history).await?;
        }
        self.run(flow, trigger).await.inspect_err(|error| {
            tracing::error!(%flow, %error, "drain aborted");
        })
    }

    async fn run(&self, flow: FlowId, trigger: PendingRecord) -> Result<Drain, EngineError> {
        let trigger = self.append(NonEmpty::singleton(trigger)).await?.head;
        let limit = self.inner.config.max_generations;
        let mut generation_start = trigger.position;
        let mut generations = 0;
        let mut caused = Vec::new();

        loop {
            let history: Arc<[ActionRecord]> = self
                .inner
                .log
                .load(&LogFilter::for_flow(flow))
                .await
                .map_err(EngineError::log)?
                .into();
            let invocations = self.evaluate(history, generation_start).await?;
            if invocations.is_empty() {
                break;
            }
            generations += 1;
            tracing::debug!(generation = generations, invocations = invocations.len(), "generation evaluated");
            if generations > limit {
                return Err(EngineError::GenerationLimit { flow, limit });
            }
            let outcomes = self.execute(flow, invocations).await?;
            let Some(outcomes) = NonEmpty::from_vec(outcomes) else {
                break;
            };
            let stored = self.append(outcomes).await?;
            generation_start = stored.head.position;
            caused.extend(stored.iter().cloned());
        }

        tracing::debug!(generations, caused = caused.len(), "flow quiescent");
        Ok(Drain {
            flow,
            generations,
            trigger,
            caused,
        })
    }

    async fn append(&self, batch: NonEmpty<PendingRecord>) -> Result<NonEmpty<ActionRecord>, EngineError> {
        self.inner.log.append(batch).await.map_err(EngineError::log)
    }

    /// Evaluate every sync concurrently; results keep registration order.
    async fn evaluate(&self, history: Arc<[ActionRecord]>, generation_start: u64) -> Result<Vec<Invocation>, EngineError> {
        let mut tasks = JoinSet::new();
        let mut slots = 0;

        for rule in self.inner.syncs.iter() {
            let relevant = history
                .iter()
                .any(|entry| entry.position >= generation_start && rule.watches(entry.action));
            if !relevant {
                continue;
            }
            let index = slots;
            slots += 1;
            let rule = Arc::clone(rule);
            let registry = Arc::clone(&self.inner.registry);
            let history = Arc::clone(&history);
            tasks.spawn(async move {
                let fired = rule
                    .evaluate(&registry, &history, generation_start)
                    .await
                    .map_err(|source| EngineError::Where {
                        sync: rule.name().to_owned(),
                        source: Box::new(source),
                    });
                (index, fired)
            });
        }

        let mut fired: Vec<Vec<Invocation>> = vec![Vec::new(); slots];
        while let Some(joined) = tasks.join_next().await {
            let (index, invocations) = joined.map_err(|_| EngineError::TaskPanicked)?;
            fired[index] = invocations?;
        }
        Ok(fired.into_iter().flatten().collect())
    }

    /// Run invocations concurrently and return their outcomes in submission
    /// order.
    async fn execute(&self, flow: FlowId, invocations: Vec<Invocation>) -> Result<Vec<PendingRecord>, EngineError> {
        let mut tasks = JoinSet::new();
        let mut outcomes: Vec<Option<Outcome>> = vec![None; invocations.len()];

        for (index, invocation) in invocations.iter().enumerate() {
            let running = self
                .inner
                .registry
                .perform(invocation.action, invocation.input.clone())?;
            let permit = Arc::clone(&self.inner.permits)
                .acquire_owned()
                .await
                .map_err(|_| EngineError::ExecutorClosed)?;
            tracing::debug!(sync = %invocation.sync, action = %invocation.action, "invoking action");
            tasks.spawn(async move {
                let outcome = running.await;
                drop(permit);
                (index, outcome)
            });
        }

        while let Some(joined) = tasks.join_next().await {
            let (index, outcome) = joined.map_err(|_| EngineError::TaskPanicked)?;
            outcomes[index] = Some(outcome);
        }

        invocations
            .into_iter()
            .zip(outcomes)
            .map(|(invocation, outcome)| {
                let outcome = outcome.ok_or(EngineError::TaskPanicked)?;
                if let Outcome::Err(message) = &outcome {
                    tracing::debug!(action = %invocation.action, %message, "action returned an error");
                }
                Ok(PendingRecord::new(flow, invocation.action, invocation.input, outcome))
            })
            .collect()
    }
}
