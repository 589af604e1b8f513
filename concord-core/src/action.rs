//! Action references, outcomes and log records.
//!
//! Every completed action is described by an [`ActionRecord`]: which concept
//! operation ran, in which flow, with which input and what it produced.
//! Outputs are either a record of named fields or a business error message;
//! both are ordinary outcomes that syncs may match on.

use std::{borrow::Cow, fmt};

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use uuid::Uuid;

/// Named fields flowing in and out of concept operations.
pub type Record = Map<String, Value>;

/// Field name under which an error outcome exposes its message to patterns.
pub const ERROR_FIELD: &str = "error";

/// Reference to a concept action, e.g. `Event.createEvent`.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub struct ActionRef {
    pub concept: &'static str,
    pub name: &'static str,
}

impl ActionRef {
    #[must_use]
    pub const fn new(concept: &'static str, name: &'static str) -> Self {
        Self { concept, name }
    }
}

impl fmt::Display for ActionRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.concept, self.name)
    }
}

/// Reference to a concept query, e.g. `Session._getUser`.
///
/// Queries are side-effect free and never appear in the action log.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub struct QueryRef {
    pub concept: &'static str,
    pub name: &'static str,
}

impl QueryRef {
    #[must_use]
    pub const fn new(concept: &'static str, name: &'static str) -> Self {
        Self { concept, name }
    }
}

impl fmt::Display for QueryRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.concept, self.name)
    }
}

/// Result of running an action.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Outcome {
    Ok(Record),
    #[serde(rename = "error")]
    Err(String),
}

impl Outcome {
    /// Successful outcome with no output fields.
    #[must_use]
    pub fn empty() -> Self {
        Self::Ok(Record::new())
    }

    pub fn error(message: impl Into<String>) -> Self {
        Self::Err(message.into())
    }

    #[must_use]
    pub const fn is_error(&self) -> bool {
        matches!(self, Self::Err(_))
    }

    #[must_use]
    pub fn error_message(&self) -> Option<&str> {
        match self {
            Self::Ok(_) => None,
            Self::Err(message) => Some(message),
        }
    }

    /// The outcome as named fields. Errors appear as a single `error` field.
    #[must_use]
    pub fn fields(&self) -> Cow<'_, Record> {
        match self {
            Self::Ok(record) => Cow::Borrowed(record),
            Self::Err(message) => {
                let mut record = Record::new();
                record.insert(ERROR_FIELD.to_owned(), Value::String(message.clone()));
                Cow::Owned(record)
            }
        }
    }

    /// Look up a single output field.
    #[must_use]
    pub fn get(&self, field: &str) -> Option<&Value> {
        match self {
            Self::Ok(record) => record.get(field),
            Self::Err(_) => None,
        }
    }
}

impl From<Record> for Outcome {
    fn from(record: Record) -> Self {
        Self::Ok(record)
    }
}

/// Identifier of a flow: one external trigger and everything it caused.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct FlowId(Uuid);

impl FlowId {
    #[must_use]
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    #[must_use]
    pub const fn as_uuid(&self) -> &Uuid {
        &self.0
    }
}

impl Default for FlowId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for FlowId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

/// A completed action that has not been given a log position yet.
#[derive(Clone, Debug, PartialEq)]
pub struct PendingRecord {
    pub flow: FlowId,
    pub action: ActionRef,
    pub input: Record,
    pub output: Outcome,
}

impl PendingRecord {
    #[must_use]
    pub fn new(flow: FlowId, action: ActionRef, input: Record, output: Outcome) -> Self {
        Self {
            flow,
            action,
            input,
            output,
        }
    }

    /// Attach the position assigned by the log.
    #[must_use]
    pub fn at(self, position: u64) -> ActionRecord {
        ActionRecord {
            position,
            flow: self.flow,
            action: self.action,
            input: self.input,
            output: self.output,
        }
    }
}

/// Entry of the action log.
///
/// Positions are assigned by the log, strictly increasing and never reused.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct ActionRecord {
    pub position: u64,
    pub flow: FlowId,
    pub action: ActionRef,
    pub input: Record,
    pub output: Outcome,
}

impl ActionRecord {
    #[must_use]
    pub fn is_error(&self) -> bool {
        self.output.is_error()
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    fn record(value: Value) -> Record {
        match value {
            Value::Object(map) => map,
            other => panic!("expected object, got {other}"),
        }
    }

    #[test]
    fn action_ref_displays_qualified_name() {
        let action = ActionRef::new("Event", "createEvent");
        assert_eq!(action.to_string(), "Event.createEvent");
        assert_eq!(QueryRef::new("Session", "_getUser").to_string(), "Session._getUser");
    }

    #[test]
    fn error_outcome_exposes_error_field() {
        let outcome = Outcome::error("Event not found.");
        let fields = outcome.fields();
        assert_eq!(fields.get("error"), Some(&json!("Event not found.")));
        assert!(outcome.is_error());
        assert_eq!(outcome.get("error"), None);
    }

    #[test]
    fn ok_outcome_borrows_fields() {
        let outcome = Outcome::Ok(record(json!({ "event": "e1" })));
        assert!(matches!(outcome.fields(), Cow::Borrowed(_)));
        assert_eq!(outcome.get("event"), Some(&json!("e1")));
        assert_eq!(outcome.error_message(), None);
    }

    #[test]
    fn outcome_serializes_tagged() {
        let ok = serde_json::to_value(Outcome::empty()).unwrap();
        let err = serde_json::to_value(Outcome::error("nope")).unwrap();
        assert_eq!(ok, json!({ "ok": {} }));
        assert_eq!(err, json!({ "error": "nope" }));
    }

    #[test]
    fn pending_record_takes_position() {
        let flow = FlowId::new();
        let pending = PendingRecord::new(
            flow,
            ActionRef::new("Counter", "increment"),
            Record::new(),
            Outcome::empty(),
        );
        let stored = pending.at(7);
        assert_eq!(stored.position, 7);
        assert_eq!(stored.flow, flow);
        assert!(!stored.is_error());
    }

    #[test]
    fn flow_ids_are_unique() {
        assert_ne!(FlowId::new(), FlowId::new());
    }
}
