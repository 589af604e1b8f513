#![doc = include_str!("../README.md")]

#[cfg(feature = "test-util")]
pub use concord_core::test;
pub use concord_core::{
    action,
    action::{ActionRecord, ActionRef, FlowId, Outcome, QueryRef, Record},
    concept,
    concept::{Concept, ConceptRegistry, RegistryBuilder},
    config,
    config::{ConfigError, EngineConfig},
    engine,
    engine::{Drain, Engine, EngineBuilder, EngineError},
    frame,
    frame::{Frame, Frames},
    pattern,
    pattern::{ActionPattern, Template, Term},
    subscription,
    symbol,
    symbol::{Symbol, Vars},
    sync,
    sync::{SyncRule, SyncSet, SyncSpec},
    template,
};

pub mod log {

    pub use concord_core::log::{ActionLog, EntryStream, LogFilter, NonEmpty};

    // Low-level append input for ActionLog implementors only.
    // Most users record actions through the Engine instead.
    #[doc(hidden)]
    pub use concord_core::action::PendingRecord;

    pub use concord_core::log::inmemory;
}
