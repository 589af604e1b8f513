//! Test utilities for syncs.
//!
//! [`TestFramework`] runs a set of syncs against stubbed concepts using a
//! given-when-then pattern: *given* some earlier entries of a flow, *when* an
//! action completes, *then* expect the actions the syncs caused.
//!
//! ```ignore
//! use concord_core::test::{TestFramework, record};
//!
//! #[tokio::test]
//! async fn request_creates_event() {
//!     TestFramework::new(event_syncs())
//!         .stub_query(Session::GET_USER, vec![record(json!({ "user": "alice" }))])
//!         .when(
//!             Requesting::REQUEST,
//!             record(json!({ "path": "/Event/createEvent", "session": "s1", "name": "Party" })),
//!             Outcome::Ok(record(json!({ "request": "r1" }))),
//!         )
//!         .await
//!         .then_expect_invocation(Event::CREATE_EVENT, record(json!({ "organizer": "alice", "name": "Party" })));
//! }
//! ```
//!
//! Every action mentioned by the syncs is stubbed automatically with a handler
//! that echoes its input. Use [`TestFramework::stub_action`] to script other
//! outcomes and [`TestFramework::stub_query`] to answer where-clause queries.

use std::{collections::HashSet, fmt, sync::Arc};

use serde_json::Value;

use crate::{
    action::{ActionRecord, ActionRef, FlowId, Outcome, PendingRecord, QueryRef, Record},
    concept::ConceptRegistry,
    config::EngineConfig,
    engine::{Drain, Engine, EngineError},
    sync::{SyncRule, SyncSet},
};

/// Build a [`Record`] from a JSON object literal.
///
/// # Panics
///
/// Panics if `value` is not a JSON object.
#[must_use]
#[track_caller]
pub fn record(value: Value) -> Record {
    match value {
        Value::Object(map) => map,
        other => panic!("expected a JSON object, got {other}"),
    }
}

type ActionStub = Arc<dyn Fn(Record) -> Outcome + Send + Sync>;
type QueryStub = Arc<dyn Fn(&Record) -> Vec<Record> + Send + Sync>;

/// Given-when-then harness for syncs.
pub struct TestFramework {
    syncs: SyncSet,
    actions: Vec<(ActionRef, ActionStub)>,
    queries: Vec<(QueryRef, QueryStub)>,
    given: Vec<(ActionRef, Record, Outcome)>,
    config: EngineConfig,
}

impl TestFramework {
    #[must_use]
    pub fn new(syncs: SyncSet) -> Self {
        Self {
            syncs,
            actions: Vec::new(),
            queries: Vec::new(),
            given: Vec::new(),
            config: EngineConfig::default(),
        }
    }

    /// Add one more sync under test.
    #[must_use]
    pub fn with_sync(mut self, sync: SyncRule) -> Self {
        self.syncs.push(sync);
        self
    }

    /// Make `action` always complete with `outcome`.
    #[must_use]
    pub fn stub_action(self, action: ActionRef, outcome: Outcome) -> Self {
        self.stub_action_fn(action, move |_| outcome.clone())
    }

    /// Compute the outcome of `action` from its input.
    #[must_use]
    pub fn stub_action_fn<F>(mut self, action: ActionRef, handler: F) -> Self
    where
        F: Fn(Record) -> Outcome + Send + Sync + 'static,
    {
        self.actions.push((action, Arc::new(handler)));
        self
    }

    /// Make `query` return `rows` whatever its input.
    #[must_use]
    pub fn stub_query(self, query: QueryRef, rows: Vec<Record>) -> Self {
        self.stub_query_fn(query, move |_| rows.clone())
    }

    /// Compute the rows of `query` from its input.
    #[must_use]
    pub fn stub_query_fn<F>(mut self, query: QueryRef, handler: F) -> Self
    where
        F: Fn(&Record) -> Vec<Record> + Send + Sync + 'static,
    {
        self.queries.push((query, Arc::new(handler)));
        self
    }

    /// Earlier entries of the flow. They are visible to syncs but do not
    /// trigger anything themselves.
    #[must_use]
    pub fn given(mut self, action: ActionRef, input: Record, output: Outcome) -> Self {
        self.given.push((action, input, output));
        self
    }

    #[must_use]
    pub fn config(mut self, config: EngineConfig) -> Self {
        self.config = config;
        self
    }

    /// Record `action` as completed and drain the flow.
    pub async fn when(self, action: ActionRef, input: Record, output: Outcome) -> TestResult {
        let engine = match self.engine(action) {
            Ok(engine) => engine,
            Err(error) => return TestResult { result: Err(error) },
        };
        let flow = FlowId::new();
        let history = self
            .given
            .into_iter()
            .map(|(action, input, output)| PendingRecord::new(flow, action, input, output))
            .collect();
        let trigger = PendingRecord::new(flow, action, input, output);
        TestResult {
            result: engine.drain(flow, history, trigger).await,
        }
    }

    fn engine(&self, trigger: ActionRef) -> Result<Engine, EngineError> {
        let mut builder = ConceptRegistry::builder();
        let mut stubbed = HashSet::new();

        for (action, stub) in &self.actions {
            let stub = Arc::clone(stub);
            builder.action_fn(*action, move |input| std::future::ready(stub(input)));
            stubbed.insert(*action);
        }

        let mentioned = self
            .syncs
            .iter()
            .flat_map(|rule| {
                let when = rule.when().iter().map(|pattern| pattern.action);
                let then = rule.then().iter().map(|then| then.action);
                when.chain(then).collect::<Vec<_>>()
            })
            .chain(self.given.iter().map(|(action, _, _)| *action))
            .chain(std::iter::once(trigger));
        for action in mentioned {
            if stubbed.insert(action) {
                builder.action_fn(action, |input| std::future::ready(Outcome::Ok(input)));
            }
        }

        for (query, stub) in &self.queries {
            let stub = Arc::clone(stub);
            builder.query_fn(*query, move |input| std::future::ready(stub(&input)));
        }

        Engine::builder(builder.build())
            .syncs(self.syncs.clone())
            .config(self.config.clone())
            .build()
    }
}

/// Outcome of a drain, ready for assertions.
pub struct TestResult {
    result: Result<Drain, EngineError>,
}

impl TestResult {
    /// Assert that the syncs caused exactly these actions, in order.
    ///
    /// # Panics
    ///
    /// Panics if the drain failed or the caused actions differ.
    #[track_caller]
    pub fn then_expect_invocations(self, expected: &[(ActionRef, Record)]) {
        let drain = self.expect_drain();
        let actual: Vec<_> = drain
            .caused
            .iter()
            .map(|entry| (entry.action, entry.input.clone()))
            .collect();
        assert_eq!(actual, expected, "Expected invocations did not match actual invocations");
    }

    /// Assert that the syncs caused `action` with exactly `input`, among
    /// possibly other actions.
    ///
    /// # Panics
    ///
    /// Panics if the drain failed or no such invocation happened.
    #[track_caller]
    pub fn then_expect_invocation(self, action: ActionRef, input: Record) -> Self {
        let drain = self.expect_drain();
        assert!(
            drain
                .caused
                .iter()
                .any(|entry| entry.action == action && entry.input == input),
            "Expected {action} with {} but got: {}",
            Value::Object(input.clone()),
            Caused(&drain.caused)
        );
        self
    }

    /// Assert that nothing was caused.
    ///
    /// # Panics
    ///
    /// Panics if the drain failed or any action ran.
    #[track_caller]
    pub fn then_expect_no_invocations(self) {
        let drain = self.expect_drain();
        assert!(
            drain.caused.is_empty(),
            "Expected no invocations but got: {}",
            Caused(&drain.caused)
        );
    }

    /// Assert that `action` was never invoked.
    ///
    /// # Panics
    ///
    /// Panics if the drain failed or `action` ran.
    #[track_caller]
    pub fn then_expect_no_invocation_of(self, action: ActionRef) -> Self {
        let drain = self.expect_drain();
        assert!(
            drain.caused.iter().all(|entry| entry.action != action),
            "Expected no {action} but got: {}",
            Caused(&drain.caused)
        );
        self
    }

    /// Assert that the drain failed with an error containing the given
    /// message.
    ///
    /// # Panics
    ///
    /// Panics if the drain succeeded or the message differs.
    #[track_caller]
    pub fn then_expect_error_message(self, expected_substring: &str) {
        match self.result {
            Ok(drain) => panic!("Expected error but got: {}", Caused(&drain.caused)),
            Err(error) => {
                let error_msg = error.to_string();
                assert!(
                    error_msg.contains(expected_substring),
                    "Expected error message to contain '{expected_substring}' but got: {error_msg}"
                );
            }
        }
    }

    /// Get the raw result for custom assertions.
    ///
    /// # Errors
    ///
    /// Returns any error that aborted the drain.
    pub fn inspect_result(self) -> Result<Drain, EngineError> {
        self.result
    }

    #[track_caller]
    fn expect_drain(&self) -> &Drain {
        match &self.result {
            Ok(drain) => drain,
            Err(error) => panic!("Expected a drain but got error: {error}"),
        }
    }
}

struct Caused<'a>(&'a [ActionRecord]);

impl fmt::Display for Caused<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.0.is_empty() {
            return f.write_str("nothing");
        }
        for (index, entry) in self.0.iter().enumerate() {
            if index > 0 {
                f.write_str(", ")?;
            }
            write!(f, "{} {}", entry.action, Value::Object(entry.input.clone()))?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;
    use crate::{pattern::Template, sync::SyncSpec, template};

    const REQUEST: ActionRef = ActionRef::new("Requesting", "request");
    const RESPOND: ActionRef = ActionRef::new("Requesting", "respond");
    const CREATE: ActionRef = ActionRef::new("Event", "createEvent");
    const GET_USER: QueryRef = QueryRef::new("Session", "_getUser");

    fn create_request() -> SyncRule {
        SyncRule::new("RequestCreate", |v| {
            let (request, session, user, name) = (v.var("request"), v.var("session"), v.var("user"), v.var("name"));
            let (input, output) = (template! { session }, template! { user: &user });
            SyncSpec::when(REQUEST, template! { path: "/create", session, name }, template! { request })
                .where_clause(move |registry, frames| {
                    let (input, output) = (input.clone(), output.clone());
                    async move { frames.query(&registry, GET_USER, &input, &output).await }
                })
                .then(CREATE, template! { organizer: &user, name })
        })
    }

    fn create_response() -> SyncRule {
        SyncRule::new("CreateResponse", |v| {
            let (request, event) = (v.var("request"), v.var("event"));
            SyncSpec::when(REQUEST, template! { path: "/create" }, template! { request })
                .and_when(CREATE, Template::new(), template! { event })
                .then(RESPOND, template! { request, event })
        })
    }

    #[tokio::test]
    async fn drives_syncs_against_stubs() {
        TestFramework::new(SyncSet::new())
            .with_sync(create_request())
            .with_sync(create_response())
            .stub_query(GET_USER, vec![record(json!({ "user": "alice" }))])
            .stub_action(CREATE, Outcome::Ok(record(json!({ "event": "e1" }))))
            .when(
                REQUEST,
                record(json!({ "path": "/create", "session": "s1", "name": "Party" })),
                Outcome::Ok(record(json!({ "request": "r1" }))),
            )
            .await
            .then_expect_invocations(&[
                (CREATE, record(json!({ "organizer": "alice", "name": "Party" }))),
                (RESPOND, record(json!({ "request": "r1", "event": "e1" }))),
            ]);
    }

    #[tokio::test]
    async fn given_entries_are_visible_but_do_not_trigger() {
        TestFramework::new(SyncSet::new().with(create_response()))
            .given(
                REQUEST,
                record(json!({ "path": "/create" })),
                Outcome::Ok(record(json!({ "request": "r1" }))),
            )
            .when(CREATE, Record::new(), Outcome::Ok(record(json!({ "event": "e1" }))))
            .await
            .then_expect_invocation(RESPOND, record(json!({ "request": "r1", "event": "e1" })))
            .then_expect_no_invocation_of(CREATE);
    }

    #[tokio::test]
    async fn unknown_session_causes_nothing() {
        TestFramework::new(SyncSet::new().with(create_request()))
            .stub_query(GET_USER, Vec::new())
            .when(
                REQUEST,
                record(json!({ "path": "/create", "session": "nope", "name": "Party" })),
                Outcome::Ok(record(json!({ "request": "r1" }))),
            )
            .await
            .then_expect_no_invocations();
    }

    #[tokio::test]
    async fn missing_query_stub_is_reported() {
        TestFramework::new(SyncSet::new().with(create_request()))
            .when(
                REQUEST,
                record(json!({ "path": "/create", "session": "s1", "name": "Party" })),
                Outcome::Ok(record(json!({ "request": "r1" }))),
            )
            .await
            .then_expect_error_message("no query `Session._getUser` is registered");
    }

    #[tokio::test]
    async fn inspect_result_exposes_drain() {
        let drain = TestFramework::new(SyncSet::new())
            .when(CREATE, Record::new(), Outcome::empty())
            .await
            .inspect_result()
            .unwrap();
        assert_eq!(drain.generations, 0);
        assert!(drain.caused.is_empty());
    }

    #[test]
    #[should_panic(expected = "expected a JSON object")]
    fn record_rejects_non_objects() {
        let _ = record(json!([1, 2]));
    }
}
