//! Declarative synchronizations.
//!
//! A sync reads: *when* these actions have completed (in the same flow),
//! *where* these extra conditions hold, *then* invoke these actions. Syncs are
//! built once at startup through [`SyncRule::new`], which hands the builder a
//! [`Vars`] provider so every sync gets its own fresh symbols.
//!
//! ```
//! use concord_core::{
//!     action::ActionRef,
//!     sync::{SyncRule, SyncSpec},
//!     template,
//! };
//!
//! const REQUEST: ActionRef = ActionRef::new("Requesting", "request");
//! const RESPOND: ActionRef = ActionRef::new("Requesting", "respond");
//!
//! let echo = SyncRule::new("Echo", |v| {
//!     let (request, message) = (v.var("request"), v.var("message"));
//!     SyncSpec::when(REQUEST, template! { path: "/echo", message }, template! { request })
//!         .then(RESPOND, template! { request, message })
//! });
//! assert_eq!(echo.name(), "Echo");
//! ```

use std::{fmt, future::Future, sync::Arc};

use nonempty::NonEmpty;

use crate::{
    action::{ActionRecord, ActionRef, Record},
    concept::{BoxFuture, ConceptRegistry},
    engine::EngineError,
    frame::{Frame, Frames},
    pattern::{ActionPattern, Template, join},
    symbol::Vars,
};

/// Type-erased where clause.
pub type WhereFn =
    Arc<dyn Fn(Arc<ConceptRegistry>, Frames) -> BoxFuture<'static, Result<Frames, EngineError>> + Send + Sync>;

/// An action a sync invokes, with its input template.
#[derive(Clone, Debug, PartialEq)]
pub struct ThenAction {
    pub action: ActionRef,
    pub input: Template,
}

/// A concrete action a sync asked the engine to run.
#[derive(Clone, Debug, PartialEq)]
pub struct Invocation {
    pub sync: Arc<str>,
    pub action: ActionRef,
    pub input: Record,
}

/// Body of a sync under construction.
pub struct SyncSpec {
    when: NonEmpty<ActionPattern>,
    where_clause: Option<WhereFn>,
    then: Vec<ThenAction>,
}

impl SyncSpec {
    /// Start a sync with its first `when` pattern.
    #[must_use]
    pub fn when(action: ActionRef, input: Template, output: Template) -> Self {
        Self {
            when: NonEmpty::singleton(ActionPattern::new(action, input, output)),
            where_clause: None,
            then: Vec::new(),
        }
    }

    /// Require one more completed action in the same flow.
    #[must_use]
    pub fn and_when(mut self, action: ActionRef, input: Template, output: Template) -> Self {
        self.when.push(ActionPattern::new(action, input, output));
        self
    }

    /// Transform the matched frames before the `then` clause runs.
    ///
    /// The clause may filter, extend or replace frames, and may call concept
    /// queries through the registry it is given. Returning no frames means the
    /// sync does not fire.
    #[must_use]
    pub fn where_clause<F, Fut>(mut self, clause: F) -> Self
    where
        F: Fn(Arc<ConceptRegistry>, Frames) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<Frames, EngineError>> + Send + 'static,
    {
        let erased: WhereFn = Arc::new(
            move |registry: Arc<ConceptRegistry>, frames: Frames| -> BoxFuture<'static, Result<Frames, EngineError>> {
                Box::pin(clause(registry, frames))
            },
        );
        self.where_clause = Some(erased);
        self
    }

    /// Invoke `action` once per surviving frame.
    #[must_use]
    pub fn then(mut self, action: ActionRef, input: Template) -> Self {
        self.then.push(ThenAction { action, input });
        self
    }
}

/// A named, immutable synchronization.
pub struct SyncRule {
    name: Arc<str>,
    when: NonEmpty<ActionPattern>,
    where_clause: Option<WhereFn>,
    then: Vec<ThenAction>,
}

impl SyncRule {
    /// Build a sync. `build` receives a fresh symbol provider.
    pub fn new(name: impl Into<Arc<str>>, build: impl FnOnce(&mut Vars) -> SyncSpec) -> Self {
        let mut vars = Vars::new();
        let SyncSpec {
            when,
            where_clause,
            then,
        } = build(&mut vars);
        Self {
            name: name.into(),
            when,
            where_clause,
            then,
        }
    }

    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    #[must_use]
    pub const fn when(&self) -> &NonEmpty<ActionPattern> {
        &self.when
    }

    #[must_use]
    pub fn then(&self) -> &[ThenAction] {
        &self.then
    }

    /// Whether a completed `action` can take part in this sync.
    #[must_use]
    pub fn watches(&self, action: ActionRef) -> bool {
        self.when.iter().any(|pattern| pattern.action == action)
    }

    /// Evaluate the sync over one flow's entries.
    ///
    /// `entries` is the flow's history up to and including the current
    /// generation, which starts at `generation_start`. Only matches that use at
    /// least one entry from the current generation fire, so a given
    /// combination of entries fires exactly once over the life of a flow.
    ///
    /// # Errors
    ///
    /// Propagates errors raised by the where clause.
    #[tracing::instrument(skip_all, fields(sync = %self.name, generation_start))]
    pub async fn evaluate(
        &self,
        registry: &Arc<ConceptRegistry>,
        entries: &[ActionRecord],
        generation_start: u64,
    ) -> Result<Vec<Invocation>, EngineError> {
        let fresh = entries
            .iter()
            .any(|entry| entry.position >= generation_start && self.watches(entry.action));
        if !fresh {
            return Ok(Vec::new());
        }

        let patterns: Vec<ActionPattern> = self.when.iter().cloned().collect();
        let frames: Frames = join(&patterns, entries, Frame::new())
            .into_iter()
            .filter(|matched| matched.newest().is_some_and(|newest| newest >= generation_start))
            .map(|matched| matched.frame)
            .collect();
        if frames.is_empty() {
            return Ok(Vec::new());
        }
        tracing::trace!(frames = frames.len(), "when clause matched");

        let frames = match &self.where_clause {
            Some(clause) => clause(Arc::clone(registry), frames).await?,
            None => frames,
        };

        let mut invocations = Vec::with_capacity(frames.len() * self.then.len());
        for frame in &frames {
            for then in &self.then {
                match then.input.resolve(frame) {
                    Some(input) => invocations.push(Invocation {
                        sync: Arc::clone(&self.name),
                        action: then.action,
                        input,
                    }),
                    None => tracing::trace!(action = %then.action, "unbound symbol in then clause, skipping"),
                }
            }
        }

        if !invocations.is_empty() {
            tracing::debug!(invocations = invocations.len(), "sync fired");
        }
        Ok(invocations)
    }
}

impl fmt::Debug for SyncRule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SyncRule")
            .field("name", &self.name)
            .field("when", &self.when)
            .field("where_clause", &self.where_clause.is_some())
            .field("then", &self.then)
            .finish()
    }
}

/// Ordered collection of syncs registered with an engine.
///
/// Order only affects the order in which a generation's invocations are
/// submitted, never which invocations are produced.
#[derive(Clone, Debug, Default)]
pub struct SyncSet {
    rules: Vec<Arc<SyncRule>>,
}

impl SyncSet {
    #[must_use]
    pub const fn new() -> Self {
        Self { rules: Vec::new() }
    }

    #[must_use]
    pub fn with(mut self, rule: SyncRule) -> Self {
        self.push(rule);
        self
    }

    pub fn push(&mut self, rule: SyncRule) {
        self.rules.push(Arc::new(rule));
    }

    /// Append every sync of `other`.
    pub fn merge(&mut self, other: Self) {
        self.rules.extend(other.rules);
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.rules.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Arc<SyncRule>> {
        self.rules.iter()
    }

    #[must_use]
    pub fn get(&self, name: &str) -> Option<&Arc<SyncRule>> {
        self.rules.iter().find(|rule| rule.name() == name)
    }
}

impl FromIterator<SyncRule> for SyncSet {
    fn from_iter<T: IntoIterator<Item = SyncRule>>(iter: T) -> Self {
        Self {
            rules: iter.into_iter().map(Arc::new).collect(),
        }
    }
}

impl Extend<SyncRule> for SyncSet {
    fn extend<T: IntoIterator<Item = SyncRule>>(&mut self, iter: T) {
        self.rules.extend(iter.into_iter().map(Arc::new));
    }
}
