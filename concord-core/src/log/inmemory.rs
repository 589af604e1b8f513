//! In-memory action log.
//!
//! [`Log`] keeps every entry in a vector guarded by a lock, with a per-flow
//! index so the engine can read back a single flow cheaply. Live entries are
//! fanned out to subscribers over a `tokio::sync::broadcast` channel.
//!
//! # Example
//!
//! ```
//! use concord_core::log::inmemory;
//!
//! let log = inmemory::Log::new();
//! ```

use std::{
    collections::HashMap,
    sync::{Arc, RwLock},
};

use nonempty::NonEmpty;
use tokio::sync::broadcast;
use tokio_stream::{StreamExt as _, wrappers::BroadcastStream, wrappers::errors::BroadcastStreamRecvError};

use crate::{
    action::{ActionRecord, FlowId, PendingRecord},
    log::{ActionLog, EntryStream, LogFilter},
};

const DEFAULT_CHANNEL_CAPACITY: usize = 1024;

/// Thread-safe in-memory action log.
#[derive(Clone)]
pub struct Log {
    inner: Arc<RwLock<Inner>>,
    live: broadcast::Sender<ActionRecord>,
}

struct Inner {
    entries: Vec<ActionRecord>,
    by_flow: HashMap<FlowId, Vec<usize>>,
    next_position: u64,
}

impl Log {
    #[must_use]
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_CHANNEL_CAPACITY)
    }

    /// Create a log whose subscribers may fall `capacity` entries behind
    /// before they start missing entries.
    #[must_use]
    pub fn with_capacity(capacity: usize) -> Self {
        let (live, _) = broadcast::channel(capacity.max(1));
        Self {
            inner: Arc::new(RwLock::new(Inner {
                entries: Vec::new(),
                by_flow: HashMap::new(),
                next_position: 0,
            })),
            live,
        }
    }

    /// Number of entries appended so far.
    #[must_use]
    pub fn len(&self) -> usize {
        self.inner.read().expect("in-memory log lock poisoned").entries.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn snapshot(&self, filter: &LogFilter) -> Vec<ActionRecord> {
        let inner = self.inner.read().expect("in-memory log lock poisoned");
        inner.select(filter)
    }
}

impl Default for Log {
    fn default() -> Self {
        Self::new()
    }
}

impl Inner {
    fn select(&self, filter: &LogFilter) -> Vec<ActionRecord> {
        match filter.flow {
            Some(flow) => self
                .by_flow
                .get(&flow)
                .into_iter()
                .flatten()
                .map(|&index| &self.entries[index])
                .filter(|entry| filter.matches(entry))
                .cloned()
                .collect(),
            None => self
                .entries
                .iter()
                .filter(|entry| filter.matches(entry))
                .cloned()
                .collect(),
        }
    }
}

/// Error type for the in-memory log.
#[derive(Debug, thiserror::Error)]
pub enum InMemoryError {
    /// A subscriber fell behind the live channel and entries were dropped.
    #[error("subscriber lagged behind and missed {0} entries")]
    Lagged(u64),
}

impl ActionLog for Log {
    type Error = InMemoryError;

    #[tracing::instrument(skip_all, fields(entry_count = entries.len()))]
    fn append(
        &self,
        entries: NonEmpty<PendingRecord>,
    ) -> impl Future<Output = Result<NonEmpty<ActionRecord>, Self::Error>> + Send + '_ {
        let mut inner = self.inner.write().expect("in-memory log lock poisoned");
        let stored = entries.map(|pending| {
            let position = inner.next_position;
            inner.next_position += 1;
            pending.at(position)
        });

        for entry in stored.iter() {
            let index = inner.entries.len();
            inner.by_flow.entry(entry.flow).or_default().push(index);
            inner.entries.push(entry.clone());
            // Sent under the write lock so subscribers see positions in order.
            let _ = self.live.send(entry.clone());
        }
        drop(inner);

        tracing::debug!(
            first_position = stored.first().position,
            last_position = stored.last().position,
            "entries appended to log"
        );
        std::future::ready(Ok(stored))
    }

    #[tracing::instrument(skip_all)]
    fn load<'a>(
        &'a self,
        filter: &'a LogFilter,
    ) -> impl Future<Output = Result<Vec<ActionRecord>, Self::Error>> + Send + 'a {
        let entries = self.snapshot(filter);
        tracing::trace!(entries_loaded = entries.len(), "loaded entries from log");
        std::future::ready(Ok(entries))
    }

    fn last_position(&self) -> impl Future<Output = Result<Option<u64>, Self::Error>> + Send + '_ {
        let inner = self.inner.read().expect("in-memory log lock poisoned");
        let position = inner.entries.last().map(|entry| entry.position);
        drop(inner);
        std::future::ready(Ok(position))
    }

    fn subscribe(&self, filter: LogFilter) -> EntryStream<'_, Self::Error> {
        // Attach to the live channel under the read lock: every later append
        // is delivered live, every earlier one is in the snapshot.
        let (receiver, history) = {
            let inner = self.inner.read().expect("in-memory log lock poisoned");
            (self.live.subscribe(), inner.select(&filter))
        };
        let watermark = history
            .last()
            .map(|entry| entry.position)
            .or(filter.after_position);
        tracing::debug!(replayed = history.len(), ?watermark, "log subscription attached");

        let live = BroadcastStream::new(receiver).filter_map(move |received| match received {
            Ok(entry) => (watermark.is_none_or(|w| entry.position > w) && filter.matches(&entry))
                .then_some(Ok(entry)),
            Err(BroadcastStreamRecvError::Lagged(missed)) => {
                tracing::warn!(missed, "log subscriber lagged");
                Some(Err(InMemoryError::Lagged(missed)))
            }
        });

        Box::pin(tokio_stream::iter(history.into_iter().map(Ok)).chain(live))
    }
}
