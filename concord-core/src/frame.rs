//! Binding frames and frame relations.
//!
//! A [`Frame`] maps symbols to values and is never mutated in place; every
//! extension yields a new frame. [`Frames`] is an ordered relation of frames
//! that where clauses filter, map and join against concept queries.

use std::{collections::BTreeMap, sync::Arc};

use serde_json::Value;
use tokio::task::JoinSet;

use crate::{
    action::{QueryRef, Record},
    concept::ConceptRegistry,
    engine::EngineError,
    pattern::Template,
    symbol::Symbol,
};

/// Immutable mapping from symbols to values.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Frame {
    bindings: BTreeMap<Symbol, Value>,
}

impl Frame {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn get(&self, symbol: &Symbol) -> Option<&Value> {
        self.bindings.get(symbol)
    }

    #[must_use]
    pub fn contains(&self, symbol: &Symbol) -> bool {
        self.bindings.contains_key(symbol)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.bindings.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.bindings.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&Symbol, &Value)> {
        self.bindings.iter()
    }

    /// Extend the frame with one more binding.
    ///
    /// Rebinding a symbol to the value it already holds is a no-op.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::SymbolConflict`] if the symbol is bound to a
    /// different value.
    pub fn with(&self, symbol: &Symbol, value: Value) -> Result<Self, EngineError> {
        match self.bindings.get(symbol) {
            Some(existing) if *existing == value => Ok(self.clone()),
            Some(existing) => Err(EngineError::SymbolConflict {
                symbol: symbol.clone(),
                existing: existing.clone(),
                attempted: value,
            }),
            None => {
                let mut next = self.clone();
                next.bindings.insert(symbol.clone(), value);
                Ok(next)
            }
        }
    }

    /// Bind in place when the symbol is free. Returns `false` on a clash.
    pub(crate) fn unify_in_place(&mut self, symbol: &Symbol, value: &Value) -> bool {
        match self.bindings.get(symbol) {
            Some(existing) => existing == value,
            None => {
                self.bindings.insert(symbol.clone(), value.clone());
                true
            }
        }
    }
}

impl<const N: usize> From<[(Symbol, Value); N]> for Frame {
    fn from(bindings: [(Symbol, Value); N]) -> Self {
        Self {
            bindings: bindings.into_iter().collect(),
        }
    }
}

/// Ordered collection of frames.
///
/// Order is preserved through every operation so that the actions a sync
/// produces come out in a reproducible order.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Frames(Vec<Frame>);

impl Frames {
    #[must_use]
    pub const fn new() -> Self {
        Self(Vec::new())
    }

    #[must_use]
    pub fn single(frame: Frame) -> Self {
        Self(vec![frame])
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.0.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    #[must_use]
    pub fn first(&self) -> Option<&Frame> {
        self.0.first()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Frame> {
        self.0.iter()
    }

    pub fn push(&mut self, frame: Frame) {
        self.0.push(frame);
    }

    #[must_use]
    pub fn into_vec(self) -> Vec<Frame> {
        self.0
    }

    /// Keep the frames matching `predicate`.
    #[must_use]
    pub fn filter(self, mut predicate: impl FnMut(&Frame) -> bool) -> Self {
        Self(self.0.into_iter().filter(|frame| predicate(frame)).collect())
    }

    /// Transform each frame.
    ///
    /// # Errors
    ///
    /// Stops at the first error returned by `f`.
    pub fn try_map(
        self,
        f: impl FnMut(Frame) -> Result<Frame, EngineError>,
    ) -> Result<Self, EngineError> {
        self.0.into_iter().map(f).collect::<Result<Vec<_>, _>>().map(Self)
    }

    /// Join every frame against a concept query.
    ///
    /// `input` is resolved against each frame; frames with unbound inputs are
    /// dropped. Each returned row is unified with `output`, yielding one frame
    /// per compatible row. A frame whose query returns nothing drops out, and
    /// so does a frame whose input the concept rejects.
    ///
    /// Lookups for different frames run concurrently, but the result keeps
    /// frame order and row order.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::UnknownQuery`] if the query is not registered.
    #[tracing::instrument(skip_all, fields(%query, frames = self.len()))]
    pub async fn query(
        self,
        registry: &ConceptRegistry,
        query: QueryRef,
        input: &Template,
        output: &Template,
    ) -> Result<Self, EngineError> {
        let lookups = self.lookup(registry, query, input).await?;
        let mut joined = Vec::new();
        for (frame, rows) in lookups {
            let Ok(rows) = rows else { continue };
            joined.extend(rows.iter().filter_map(|row| output.unify(row, &frame)));
        }
        tracing::trace!(frames = joined.len(), "query join complete");
        Ok(Self(joined))
    }

    /// Run a concept query for every frame and bind all returned rows, as a
    /// JSON array, to `into`.
    ///
    /// Unlike [`Frames::query`], frames with no matching rows are kept with an
    /// empty array. Frames whose input the concept rejects are dropped.
    ///
    /// # Errors
    ///
    /// Same as [`Frames::query`], plus [`EngineError::SymbolConflict`] if
    /// `into` is already bound to a different value.
    #[tracing::instrument(skip_all, fields(%query, frames = self.len()))]
    pub async fn query_all(
        self,
        registry: &ConceptRegistry,
        query: QueryRef,
        input: &Template,
        into: &Symbol,
    ) -> Result<Self, EngineError> {
        let lookups = self.lookup(registry, query, input).await?;
        lookups
            .into_iter()
            .filter_map(|(frame, rows)| rows.ok().map(|rows| (frame, rows)))
            .map(|(frame, rows)| {
                let rows = rows.into_iter().map(Value::Object).collect();
                frame.with(into, Value::Array(rows))
            })
            .collect::<Result<Vec<_>, _>>()
            .map(Self)
    }

    /// Keep only the frames whose `query` input the concept rejects, binding
    /// the rejection message to `into`.
    ///
    /// This is the complement of [`Frames::query`] and [`Frames::query_all`]
    /// for malformed input, so a guard sync can answer requests that would
    /// otherwise match nothing.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::UnknownQuery`] if the query is not registered,
    /// or [`EngineError::SymbolConflict`] if `into` is already bound to a
    /// different value.
    #[tracing::instrument(skip_all, fields(%query, frames = self.len()))]
    pub async fn rejected(
        self,
        registry: &ConceptRegistry,
        query: QueryRef,
        input: &Template,
        into: &Symbol,
    ) -> Result<Self, EngineError> {
        let lookups = self.lookup(registry, query, input).await?;
        lookups
            .into_iter()
            .filter_map(|(frame, rows)| rows.err().map(|message| frame.with(into, Value::String(message))))
            .collect::<Result<Vec<_>, _>>()
            .map(Self)
    }

    async fn lookup(
        self,
        registry: &ConceptRegistry,
        query: QueryRef,
        input: &Template,
    ) -> Result<Vec<(Frame, Result<Vec<Record>, String>)>, EngineError> {
        let handler = registry.query_handler(query)?;
        let mut tasks = JoinSet::new();
        let mut frames = Vec::with_capacity(self.len());

        for frame in self.0 {
            let Some(args) = input.resolve(&frame) else {
                tracing::trace!("query input has unbound symbols, dropping frame");
                continue;
            };
            let index = frames.len();
            let handler = Arc::clone(&handler);
            tasks.spawn(async move { (index, handler(args).await) });
            frames.push(frame);
        }

        let mut results: Vec<Option<Result<Vec<Record>, String>>> = vec![None; frames.len()];
        while let Some(joined) = tasks.join_next().await {
            let (index, rows) = joined.map_err(|_| EngineError::TaskPanicked)?;
            if let Err(message) = &rows {
                tracing::debug!(%message, "query rejected its input");
            }
            results[index] = Some(rows);
        }

        Ok(frames
            .into_iter()
            .zip(results)
            .map(|(frame, rows)| (frame, rows.unwrap_or_else(|| Ok(Vec::new()))))
            .collect())
    }
}

impl FromIterator<Frame> for Frames {
    fn from_iter<T: IntoIterator<Item = Frame>>(iter: T) -> Self {
        Self(iter.into_iter().collect())
    }
}

impl IntoIterator for Frames {
    type IntoIter = std::vec::IntoIter<Frame>;
    type Item = Frame;

    fn into_iter(self) -> Self::IntoIter {
        self.0.into_iter()
    }
}

impl<'a> IntoIterator for &'a Frames {
    type IntoIter = std::slice::Iter<'a, Frame>;
    type Item = &'a Frame;

    fn into_iter(self) -> Self::IntoIter {
        self.0.iter()
    }
}

impl From<Vec<Frame>> for Frames {
    fn from(frames: Vec<Frame>) -> Self {
        Self(frames)
    }
}
