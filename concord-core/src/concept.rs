//! Concepts and the operation registry.
//!
//! A concept is an independent unit of state with named actions (which
//! mutate and are logged) and queries (which only read). Concepts register
//! typed handlers with a [`RegistryBuilder`]; the resulting
//! [`ConceptRegistry`] maps `(concept, operation)` references to type-erased
//! handles the engine and where clauses can call.

use std::{collections::HashMap, fmt, future::Future, pin::Pin, sync::Arc};

use serde::{Serialize, de::DeserializeOwned};
use serde_json::Value;

use crate::{
    action::{ActionRef, Outcome, QueryRef, Record},
    engine::EngineError,
};

/// Boxed future returned by erased concept handlers.
pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

pub(crate) type ActionHandler = Arc<dyn Fn(Record) -> BoxFuture<'static, Outcome> + Send + Sync>;
pub(crate) type QueryHandler =
    Arc<dyn Fn(Record) -> BoxFuture<'static, Result<Vec<Record>, String>> + Send + Sync>;

/// A unit of state exposing actions and queries.
///
/// ```ignore
/// impl Concept for Counter {
///     const NAME: &'static str = "Counter";
///
///     fn register(self: Arc<Self>, registry: &mut RegistryBuilder) {
///         registry
///             .action(&self, "increment", |c: Arc<Self>, input: Increment| async move {
///                 c.increment(input).await
///             })
///             .query(&self, "_get", |c: Arc<Self>, input: Get| async move { c.get(input).await });
///     }
/// }
/// ```
// ANCHOR: concept_trait
pub trait Concept: Send + Sync + 'static {
    /// Concept identifier used in action and query references.
    const NAME: &'static str;

    /// Register this concept's operations.
    fn register(self: Arc<Self>, registry: &mut RegistryBuilder);
}
// ANCHOR_END: concept_trait

/// Decode a record into a typed operation input.
///
/// # Errors
///
/// Returns a human-readable message naming the offending field.
pub fn decode<I: DeserializeOwned>(record: Record) -> Result<I, String> {
    serde_json::from_value(Value::Object(record)).map_err(|e| format!("invalid input: {e}"))
}

/// Encode a typed operation output as a record.
///
/// Unit outputs become an empty record.
///
/// # Errors
///
/// Fails if the value does not serialize to a JSON object.
pub fn encode<O: Serialize>(output: &O) -> Result<Record, String> {
    match serde_json::to_value(output) {
        Ok(Value::Object(record)) => Ok(record),
        Ok(Value::Null) => Ok(Record::new()),
        Ok(other) => Err(format!("output must be an object, got {other}")),
        Err(e) => Err(format!("invalid output: {e}")),
    }
}

/// Collects operation handlers before the registry is frozen.
#[derive(Default)]
pub struct RegistryBuilder {
    actions: HashMap<ActionRef, ActionHandler>,
    queries: HashMap<QueryRef, QueryHandler>,
}

impl RegistryBuilder {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register every operation of `concept`.
    pub fn concept<C: Concept>(&mut self, concept: Arc<C>) -> &mut Self {
        concept.register(self);
        self
    }

    /// Register a typed action handler for `concept`.
    ///
    /// Input decoding failures and `Err` results both become error outcomes.
    pub fn action<C, I, O, F, Fut>(&mut self, concept: &Arc<C>, name: &'static str, handler: F) -> &mut Self
    where
        C: Concept,
        I: DeserializeOwned + Send + 'static,
        O: Serialize + Send + 'static,
        F: Fn(Arc<C>, I) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<O, String>> + Send + 'static,
    {
        let concept = Arc::clone(concept);
        let erased: ActionHandler = Arc::new(move |record: Record| -> BoxFuture<'static, Outcome> {
            match decode::<I>(record) {
                Ok(input) => {
                    let running = handler(Arc::clone(&concept), input);
                    Box::pin(async move {
                        match running.await.and_then(|output| encode(&output)) {
                            Ok(record) => Outcome::Ok(record),
                            Err(message) => Outcome::Err(message),
                        }
                    })
                }
                Err(message) => Box::pin(std::future::ready(Outcome::Err(message))),
            }
        });
        self.insert_action(ActionRef::new(C::NAME, name), erased)
    }

    /// Register a typed query handler for `concept`.
    ///
    /// Input decoding failures surface as [`EngineError::QueryInput`] from
    /// [`ConceptRegistry::query`]. Inside a where clause they yield no rows
    /// for the offending frame instead.
    pub fn query<C, I, O, F, Fut>(&mut self, concept: &Arc<C>, name: &'static str, handler: F) -> &mut Self
    where
        C: Concept,
        I: DeserializeOwned + Send + 'static,
        O: Serialize + Send + 'static,
        F: Fn(Arc<C>, I) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Vec<O>> + Send + 'static,
    {
        let concept = Arc::clone(concept);
        let erased: QueryHandler = Arc::new(move |record: Record| -> BoxFuture<'static, Result<Vec<Record>, String>> {
            match decode::<I>(record) {
                Ok(input) => {
                    let running = handler(Arc::clone(&concept), input);
                    Box::pin(async move { running.await.iter().map(encode).collect() })
                }
                Err(message) => Box::pin(std::future::ready(Err(message))),
            }
        });
        self.insert_query(QueryRef::new(C::NAME, name), erased)
    }

    /// Register an untyped action handler.
    pub fn action_fn<F, Fut>(&mut self, action: ActionRef, handler: F) -> &mut Self
    where
        F: Fn(Record) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Outcome> + Send + 'static,
    {
        let erased: ActionHandler =
            Arc::new(move |record: Record| -> BoxFuture<'static, Outcome> { Box::pin(handler(record)) });
        self.insert_action(action, erased)
    }

    /// Register an untyped query handler.
    pub fn query_fn<F, Fut>(&mut self, query: QueryRef, handler: F) -> &mut Self
    where
        F: Fn(Record) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Vec<Record>> + Send + 'static,
    {
        let erased: QueryHandler = Arc::new(move |record: Record| -> BoxFuture<'static, Result<Vec<Record>, String>> {
            let running = handler(record);
            Box::pin(async move { Ok(running.await) })
        });
        self.insert_query(query, erased)
    }

    #[must_use]
    pub fn has_action(&self, action: ActionRef) -> bool {
        self.actions.contains_key(&action)
    }

    #[must_use]
    pub fn has_query(&self, query: QueryRef) -> bool {
        self.queries.contains_key(&query)
    }

    #[must_use]
    pub fn build(self) -> ConceptRegistry {
        tracing::debug!(
            actions = self.actions.len(),
            queries = self.queries.len(),
            "concept registry built"
        );
        ConceptRegistry {
            actions: self.actions,
            queries: self.queries,
        }
    }

    fn insert_action(&mut self, action: ActionRef, handler: ActionHandler) -> &mut Self {
        if self.actions.insert(action, handler).is_some() {
            tracing::warn!(%action, "action handler replaced");
        }
        self
    }

    fn insert_query(&mut self, query: QueryRef, handler: QueryHandler) -> &mut Self {
        if self.queries.insert(query, handler).is_some() {
            tracing::warn!(%query, "query handler replaced");
        }
        self
    }
}

/// Frozen map from operation references to handlers.
pub struct ConceptRegistry {
    actions: HashMap<ActionRef, ActionHandler>,
    queries: HashMap<QueryRef, QueryHandler>,
}

impl ConceptRegistry {
    #[must_use]
    pub fn builder() -> RegistryBuilder {
        RegistryBuilder::new()
    }

    #[must_use]
    pub fn has_action(&self, action: ActionRef) -> bool {
        self.actions.contains_key(&action)
    }

    #[must_use]
    pub fn has_query(&self, query: QueryRef) -> bool {
        self.queries.contains_key(&query)
    }

    /// Start running an action.
    ///
    /// The returned future owns everything it needs, so it can be spawned.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::UnknownAction`] if nothing is registered under
    /// `action`.
    pub fn perform(&self, action: ActionRef, input: Record) -> Result<BoxFuture<'static, Outcome>, EngineError> {
        let handler = self
            .actions
            .get(&action)
            .ok_or(EngineError::UnknownAction(action))?;
        Ok(handler(input))
    }

    /// Run a query and return its rows.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::UnknownQuery`] for unregistered queries and
    /// [`EngineError::QueryInput`] if the concept rejects `input`.
    pub async fn query(&self, query: QueryRef, input: Record) -> Result<Vec<Record>, EngineError> {
        let handler = self.query_handler(query)?;
        handler(input)
            .await
            .map_err(|message| EngineError::QueryInput { query, message })
    }

    pub(crate) fn query_handler(&self, query: QueryRef) -> Result<QueryHandler, EngineError> {
        self.queries
            .get(&query)
            .cloned()
            .ok_or(EngineError::UnknownQuery(query))
    }
}

impl fmt::Debug for ConceptRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut actions: Vec<_> = self.actions.keys().map(ToString::to_string).collect();
        let mut queries: Vec<_> = self.queries.keys().map(ToString::to_string).collect();
        actions.sort();
        queries.sort();
        f.debug_struct("ConceptRegistry")
            .field("actions", &actions)
            .field("queries", &queries)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use serde::{Deserialize, Serialize};
    use serde_json::json;
    use tokio::sync::Mutex;

    use super::*;

    #[derive(Default)]
    struct Counter {
        value: Mutex<i64>,
    }

    #[derive(Deserialize)]
    struct Increment {
        by: i64,
    }

    #[derive(Serialize)]
    struct Total {
        value: i64,
    }

    #[derive(Deserialize)]
    struct Get {}

    impl Counter {
        async fn increment(&self, input: Increment) -> Result<Total, String> {
            if input.by <= 0 {
                return Err("increment must be positive".to_string());
            }
            let mut value = self.value.lock().await;
            *value += input.by;
            Ok(Total { value: *value })
        }

        async fn get(&self, _: Get) -> Vec<Total> {
            vec![Total {
                value: *self.value.lock().await,
            }]
        }
    }

    impl Concept for Counter {
        const NAME: &'static str = "Counter";

        fn register(self: Arc<Self>, registry: &mut RegistryBuilder) {
            registry
                .action(&self, "increment", |c: Arc<Self>, input: Increment| async move {
                    c.increment(input).await
                })
                .query(&self, "_get", |c: Arc<Self>, input: Get| async move { c.get(input).await });
        }
    }

    const INCREMENT: ActionRef = ActionRef::new("Counter", "increment");
    const GET: QueryRef = QueryRef::new("Counter", "_get");

    fn record(value: Value) -> Record {
        match value {
            Value::Object(map) => map,
            other => panic!("expected object, got {other}"),
        }
    }

    fn registry() -> ConceptRegistry {
        let mut builder = ConceptRegistry::builder();
        builder.concept(Arc::new(Counter::default()));
        builder.build()
    }

    #[tokio::test]
    async fn typed_action_round_trips_through_records() {
        let registry = registry();
        let outcome = registry
            .perform(INCREMENT, record(json!({ "by": 2 })))
            .unwrap()
            .await;
        assert_eq!(outcome, Outcome::Ok(record(json!({ "value": 2 }))));

        let rows = registry.query(GET, Record::new()).await.unwrap();
        assert_eq!(rows, vec![record(json!({ "value": 2 }))]);
    }

    #[tokio::test]
    async fn business_errors_become_error_outcomes() {
        let registry = registry();
        let outcome = registry
            .perform(INCREMENT, record(json!({ "by": 0 })))
            .unwrap()
            .await;
        assert_eq!(outcome, Outcome::error("increment must be positive"));
    }

    #[tokio::test]
    async fn malformed_action_input_is_an_error_outcome() {
        let registry = registry();
        let outcome = registry
            .perform(INCREMENT, record(json!({ "by": "lots" })))
            .unwrap()
            .await;
        assert!(outcome.error_message().unwrap().starts_with("invalid input"));
    }

    #[tokio::test]
    async fn malformed_query_input_is_an_engine_error() {
        let counter = Arc::new(Counter::default());
        let mut builder = ConceptRegistry::builder();
        builder.query(&counter, "_strict", |c: Arc<Counter>, input: Increment| async move {
            let _ = input.by;
            c.get(Get {}).await
        });
        let err = builder
            .build()
            .query(QueryRef::new("Counter", "_strict"), Record::new())
            .await
            .unwrap_err();
        assert!(matches!(err, EngineError::QueryInput { .. }));
    }

    #[test]
    fn unknown_operations_are_reported() {
        let registry = registry();
        assert!(matches!(
            registry.perform(ActionRef::new("Counter", "reset"), Record::new()),
            Err(EngineError::UnknownAction(_))
        ));
        assert!(registry.has_action(INCREMENT));
        assert!(registry.has_query(GET));
    }

    #[test]
    fn encode_rejects_non_objects() {
        assert_eq!(encode(&()), Ok(Record::new()));
        assert!(encode(&5).is_err());
    }

    #[test]
    fn debug_lists_sorted_operations() {
        let debug = format!("{:?}", registry());
        assert!(debug.contains("Counter.increment"));
        assert!(debug.contains("Counter._get"));
    }
}
