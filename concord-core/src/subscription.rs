//! Push-based log watchers.
//!
//! A watcher follows the action log in a background task: it replays stored
//! entries matching its filter, then keeps delivering entries as drains append
//! them. Watchers observe only; they never feed back into the engine.
//!
//! # Example
//!
//! ```ignore
//! let watcher = engine
//!     .watch(LogFilter::for_action(Event::DELETE_EVENT))
//!     .on_catchup_complete(|| println!("ready"))
//!     .on_entry(|entry| println!("{} at {}", entry.action, entry.position))
//!     .start()
//!     .await?;
//!
//! // Later, shut down gracefully
//! watcher.stop().await?;
//! ```

use thiserror::Error;
use tokio::task::JoinHandle;
use tokio_stream::StreamExt as _;

use crate::{
    action::ActionRecord,
    engine::Engine,
    log::{ActionLog, LogFilter},
};

/// Errors that can occur during a watcher's lifecycle.
#[derive(Debug, Error)]
pub enum SubscriptionError<LogError>
where
    LogError: std::error::Error + 'static,
{
    /// The action log returned an error.
    #[error("log error: {0}")]
    Log(#[source] LogError),
    /// The watcher task panicked.
    #[error("subscription task panicked")]
    TaskPanicked,
}

/// Handle to a running watcher.
///
/// Dropping the handle does **not** stop the watcher. Call [`stop()`] for
/// graceful shutdown.
///
/// [`stop()`]: SubscriptionHandle::stop
pub struct SubscriptionHandle<LogError>
where
    LogError: std::error::Error + 'static,
{
    stop_tx: Option<tokio::sync::oneshot::Sender<()>>,
    task: JoinHandle<Result<(), SubscriptionError<LogError>>>,
}

impl<LogError> SubscriptionHandle<LogError>
where
    LogError: std::error::Error + 'static,
{
    /// Stop the watcher and wait for it to finish.
    ///
    /// # Errors
    ///
    /// Returns the watcher's error if it failed before being stopped.
    pub async fn stop(mut self) -> Result<(), SubscriptionError<LogError>> {
        if let Some(tx) = self.stop_tx.take() {
            let _ = tx.send(());
        }
        self.task
            .await
            .map_err(|_| SubscriptionError::TaskPanicked)?
    }

    #[must_use]
    pub fn is_running(&self) -> bool {
        !self.task.is_finished()
    }
}

type EntryCallback = Box<dyn Fn(&ActionRecord) + Send + Sync + 'static>;

/// Builder for configuring and starting a watcher.
///
/// Created via [`Engine::watch`].
pub struct SubscriptionBuilder<L> {
    log: L,
    filter: LogFilter,
    on_entry: Option<EntryCallback>,
    on_catchup_complete: Option<Box<dyn FnOnce() + Send + 'static>>,
}

impl<L> SubscriptionBuilder<L>
where
    L: ActionLog + Clone + 'static,
{
    pub(crate) const fn new(log: L, filter: LogFilter) -> Self {
        Self {
            log,
            filter,
            on_entry: None,
            on_catchup_complete: None,
        }
    }

    /// Register a callback invoked for each delivered entry.
    ///
    /// Callbacks must complete quickly; blocking one stalls the watcher.
    #[must_use]
    pub fn on_entry<F>(mut self, callback: F) -> Self
    where
        F: Fn(&ActionRecord) + Send + Sync + 'static,
    {
        self.on_entry = Some(Box::new(callback));
        self
    }

    /// Register a one-shot callback fired once every entry stored before the
    /// watcher started has been delivered.
    #[must_use]
    pub fn on_catchup_complete<F>(mut self, callback: F) -> Self
    where
        F: FnOnce() + Send + 'static,
    {
        self.on_catchup_complete = Some(Box::new(callback));
        self
    }

    /// Start the watcher task.
    ///
    /// # Errors
    ///
    /// Returns an error if the catch-up target cannot be read from the log.
    pub async fn start(self) -> Result<SubscriptionHandle<L::Error>, SubscriptionError<L::Error>> {
        let Self {
            log,
            filter,
            on_entry,
            mut on_catchup_complete,
        } = self;

        let catchup_target = log
            .load(&filter)
            .await
            .map_err(SubscriptionError::Log)?
            .last()
            .map(|entry| entry.position);

        let (stop_tx, mut stop_rx) = tokio::sync::oneshot::channel();

        let task = tokio::spawn(async move {
            let mut stream = log.subscribe(filter);
            let mut last_position: Option<u64> = None;

            if catchup_target.is_none()
                && let Some(callback) = on_catchup_complete.take()
            {
                callback();
            }

            loop {
                tokio::select! {
                    biased;
                    _ = &mut stop_rx => {
                        tracing::debug!("log watcher stopped");
                        break;
                    }
                    next = stream.next() => {
                        let Some(result) = next else {
                            tracing::debug!("log stream ended");
                            break;
                        };
                        let entry = result.map_err(SubscriptionError::Log)?;

                        if last_position.is_some_and(|last| entry.position <= last) {
                            continue;
                        }
                        last_position = Some(entry.position);

                        if let Some(ref callback) = on_entry {
                            callback(&entry);
                        }

                        if last_position >= catchup_target
                            && let Some(callback) = on_catchup_complete.take()
                        {
                            callback();
                        }
                    }
                }
            }
            Ok(())
        });

        Ok(SubscriptionHandle {
            stop_tx: Some(stop_tx),
            task,
        })
    }
}

impl<L> Engine<L>
where
    L: ActionLog + Clone + 'static,
{
    /// Watch log entries matching `filter` from a background task.
    #[must_use]
    pub fn watch(&self, filter: LogFilter) -> SubscriptionBuilder<L> {
        SubscriptionBuilder::new(self.log().clone(), filter)
    }
}
