//! Pattern unification against action records.
//!
//! A [`Template`] is a set of named fields whose values are either literals
//! or symbols. Matching a template against a record checks literals for
//! equality and binds symbols into a [`Frame`]. [`join`] unifies a sequence of
//! [`ActionPattern`]s against a set of log entries, left to right.

use std::collections::BTreeSet;

use serde_json::Value;

use crate::{
    action::{ActionRecord, ActionRef, Record},
    frame::Frame,
    symbol::Symbol,
};

/// A template field value.
#[derive(Clone, Debug, PartialEq)]
pub enum Term {
    Value(Value),
    Var(Symbol),
}

impl From<Symbol> for Term {
    fn from(symbol: Symbol) -> Self {
        Self::Var(symbol)
    }
}

impl From<&Symbol> for Term {
    fn from(symbol: &Symbol) -> Self {
        Self::Var(symbol.clone())
    }
}

impl From<Value> for Term {
    fn from(value: Value) -> Self {
        Self::Value(value)
    }
}

impl From<&str> for Term {
    fn from(value: &str) -> Self {
        Self::Value(Value::String(value.to_owned()))
    }
}

impl From<String> for Term {
    fn from(value: String) -> Self {
        Self::Value(Value::String(value))
    }
}

impl From<bool> for Term {
    fn from(value: bool) -> Self {
        Self::Value(Value::Bool(value))
    }
}

impl From<i64> for Term {
    fn from(value: i64) -> Self {
        Self::Value(Value::from(value))
    }
}

/// Named fields to match against, or to build, a [`Record`].
///
/// Matching is open: fields of the record that the template does not mention
/// are ignored.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Template {
    fields: Vec<(String, Term)>,
}

impl Template {
    #[must_use]
    pub const fn new() -> Self {
        Self { fields: Vec::new() }
    }

    /// Add (or replace) a field.
    #[must_use]
    pub fn field(mut self, name: impl Into<String>, term: impl Into<Term>) -> Self {
        let name = name.into();
        let term = term.into();
        match self.fields.iter_mut().find(|(existing, _)| *existing == name) {
            Some(slot) => slot.1 = term,
            None => self.fields.push((name, term)),
        }
        self
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &Term)> {
        self.fields.iter().map(|(name, term)| (name.as_str(), term))
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    /// Symbols mentioned by the template.
    pub fn symbols(&self) -> impl Iterator<Item = &Symbol> {
        self.fields.iter().filter_map(|(_, term)| match term {
            Term::Var(symbol) => Some(symbol),
            Term::Value(_) => None,
        })
    }

    /// Extend `frame` so that the template matches `record`.
    ///
    /// Returns `None` when a field is missing, a literal differs, or a symbol
    /// is already bound to a different value.
    #[must_use]
    pub fn unify(&self, record: &Record, frame: &Frame) -> Option<Frame> {
        let mut next = frame.clone();
        for (name, term) in &self.fields {
            let value = record.get(name)?;
            match term {
                Term::Value(expected) if expected != value => return None,
                Term::Value(_) => {}
                Term::Var(symbol) => {
                    if !next.unify_in_place(symbol, value) {
                        return None;
                    }
                }
            }
        }
        Some(next)
    }

    /// Build a record by substituting bound symbols.
    ///
    /// Returns `None` if any symbol is unbound in `frame`.
    #[must_use]
    pub fn resolve(&self, frame: &Frame) -> Option<Record> {
        self.fields
            .iter()
            .map(|(name, term)| {
                let value = match term {
                    Term::Value(value) => value.clone(),
                    Term::Var(symbol) => frame.get(symbol)?.clone(),
                };
                Some((name.clone(), value))
            })
            .collect()
    }
}

/// Build a [`Template`] from `name: term` pairs.
///
/// A bare `name` is shorthand for `name: &name`, binding the field to the
/// symbol held in the local variable of the same name.
///
/// ```
/// use concord_core::{symbol::Symbol, template};
///
/// let request = Symbol::fresh("request");
/// let template = template! { path: "/Event/createEvent", request };
/// assert_eq!(template.iter().count(), 2);
/// ```
#[macro_export]
macro_rules! template {
    (@term $key:ident) => {
        &$key
    };
    (@term $key:ident : $value:expr) => {
        $value
    };
    () => {
        $crate::pattern::Template::new()
    };
    ($($key:ident $(: $value:expr)?),+ $(,)?) => {
        $crate::pattern::Template::new()
            $(.field(stringify!($key), $crate::template!(@term $key $(: $value)?)))+
    };
}

/// A single entry of a sync's `when` clause.
#[derive(Clone, Debug, PartialEq)]
pub struct ActionPattern {
    pub action: ActionRef,
    pub input: Template,
    pub output: Template,
}

impl ActionPattern {
    #[must_use]
    pub const fn new(action: ActionRef, input: Template, output: Template) -> Self {
        Self {
            action,
            input,
            output,
        }
    }

    /// Unify one log entry with this pattern under `frame`.
    ///
    /// Error outcomes match through their `error` field.
    #[must_use]
    pub fn unify(&self, entry: &ActionRecord, frame: &Frame) -> Option<Frame> {
        if entry.action != self.action {
            return None;
        }
        let frame = self.input.unify(&entry.input, frame)?;
        self.output.unify(&entry.output.fields(), &frame)
    }
}

/// One successful join: the bindings plus the log positions that matched.
#[derive(Clone, Debug, PartialEq)]
pub struct Match {
    pub frame: Frame,
    pub positions: Vec<u64>,
}

impl Match {
    /// Position of the most recent entry used by this match.
    #[must_use]
    pub fn newest(&self) -> Option<u64> {
        self.positions.iter().copied().max()
    }
}

/// Unify `patterns` in order against `entries`, starting from `seed`.
///
/// Each pattern must be satisfied by a distinct entry. An empty pattern list
/// yields the seed unchanged.
#[must_use]
pub fn join(patterns: &[ActionPattern], entries: &[ActionRecord], seed: Frame) -> Vec<Match> {
    let mut matches = vec![Match {
        frame: seed,
        positions: Vec::new(),
    }];

    for pattern in patterns {
        let mut next = Vec::new();
        for partial in &matches {
            let used: BTreeSet<u64> = partial.positions.iter().copied().collect();
            for entry in entries.iter().filter(|e| !used.contains(&e.position)) {
                if let Some(frame) = pattern.unify(entry, &partial.frame) {
                    let mut positions = partial.positions.clone();
                    positions.push(entry.position);
                    next.push(Match { frame, positions });
                }
            }
        }
        matches = next;
        if matches.is_empty() {
            break;
        }
    }

    matches
}
