//! Action log abstractions.
//!
//! The log is an append-only, totally ordered record of completed actions.
//! This module describes the storage contract ([`ActionLog`]), the filters
//! used to read it back, and a reference in-memory implementation.

use std::{future::Future, pin::Pin};

use futures_core::Stream;
pub use nonempty::NonEmpty;

use crate::action::{ActionRecord, ActionRef, FlowId, PendingRecord};

pub mod inmemory;

/// Boxed stream of log entries returned by [`ActionLog::subscribe`].
pub type EntryStream<'a, E> = Pin<Box<dyn Stream<Item = Result<ActionRecord, E>> + Send + 'a>>;

/// Filter describing which entries should be read from the log.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct LogFilter {
    pub flow: Option<FlowId>,
    pub action: Option<ActionRef>,
    /// Only entries with position strictly greater than this value.
    pub after_position: Option<u64>,
}

impl LogFilter {
    /// Every entry in the log.
    #[must_use]
    pub fn all() -> Self {
        Self::default()
    }

    /// Entries belonging to a single flow.
    #[must_use]
    pub fn for_flow(flow: FlowId) -> Self {
        Self {
            flow: Some(flow),
            ..Self::default()
        }
    }

    /// Entries recording a single action, across all flows.
    #[must_use]
    pub fn for_action(action: ActionRef) -> Self {
        Self {
            action: Some(action),
            ..Self::default()
        }
    }

    #[must_use]
    pub const fn after(mut self, position: u64) -> Self {
        self.after_position = Some(position);
        self
    }

    #[must_use]
    pub fn matches(&self, entry: &ActionRecord) -> bool {
        self.flow.is_none_or(|flow| entry.flow == flow)
            && self.action.is_none_or(|action| entry.action == action)
            && self.after_position.is_none_or(|after| entry.position > after)
    }
}

/// Abstraction over the persistence layer for completed actions.
///
/// Appends are atomic per batch: the entries of one batch receive contiguous
/// positions in the order given, and readers never observe half a batch.
// ANCHOR: action_log_trait
pub trait ActionLog: Send + Sync {
    type Error: std::error::Error + Send + Sync + 'static;

    /// Append a batch of entries, returning them with their positions.
    fn append(
        &self,
        entries: NonEmpty<PendingRecord>,
    ) -> impl Future<Output = Result<NonEmpty<ActionRecord>, Self::Error>> + Send + '_;

    /// Load entries matching `filter`, ordered by position.
    fn load<'a>(
        &'a self,
        filter: &'a LogFilter,
    ) -> impl Future<Output = Result<Vec<ActionRecord>, Self::Error>> + Send + 'a;

    /// Position of the most recent entry, if any.
    fn last_position(&self) -> impl Future<Output = Result<Option<u64>, Self::Error>> + Send + '_;

    /// Subscribe to entries matching `filter`.
    ///
    /// The stream first yields stored entries (honouring
    /// `filter.after_position`), then entries as they are appended.
    fn subscribe(&self, filter: LogFilter) -> EntryStream<'_, Self::Error>;
}
// ANCHOR_END: action_log_trait
