//! Unique variable identifiers used in sync patterns.
//!
//! A [`Symbol`] is minted once and compared by identity, so two symbols with
//! the same display name never unify with each other. [`Vars`] hands out
//! symbols by name while a sync is being declared.

use std::{
    collections::HashMap,
    fmt,
    hash::{Hash, Hasher},
    sync::{
        Arc,
        atomic::{AtomicU64, Ordering},
    },
};

static NEXT_SYMBOL: AtomicU64 = AtomicU64::new(0);

/// A pattern variable.
///
/// Equality, ordering and hashing use the identity minted by
/// [`Symbol::fresh`]. The name is only used for diagnostics.
#[derive(Clone)]
pub struct Symbol {
    id: u64,
    name: Arc<str>,
}

impl Symbol {
    /// Mint a symbol that is distinct from every other symbol in the process.
    #[must_use]
    pub fn fresh(name: impl Into<Arc<str>>) -> Self {
        Self {
            id: NEXT_SYMBOL.fetch_add(1, Ordering::Relaxed),
            name: name.into(),
        }
    }

    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    #[must_use]
    pub const fn id(&self) -> u64 {
        self.id
    }
}

impl PartialEq for Symbol {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

impl Eq for Symbol {}

impl Hash for Symbol {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.id.hash(state);
    }
}

impl PartialOrd for Symbol {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Symbol {
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        self.id.cmp(&other.id)
    }
}

impl fmt::Debug for Symbol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "?{}#{}", self.name, self.id)
    }
}

impl fmt::Display for Symbol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "?{}", self.name)
    }
}

/// Fresh-symbol provider handed to sync builders.
///
/// Asking for the same name twice returns the same symbol, so a builder can
/// refer to a variable by name in several patterns without threading it
/// through by hand.
#[derive(Debug, Default)]
pub struct Vars {
    symbols: HashMap<String, Symbol>,
}

impl Vars {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Symbol registered under `name`, minting it on first use.
    pub fn var(&mut self, name: &str) -> Symbol {
        self.symbols
            .entry(name.to_owned())
            .or_insert_with(|| Symbol::fresh(name))
            .clone()
    }

    /// Mint an anonymous symbol that is never returned by [`Vars::var`].
    pub fn fresh(&mut self, name: &str) -> Symbol {
        Symbol::fresh(name)
    }

    /// Number of named symbols handed out so far.
    #[must_use]
    pub fn len(&self) -> usize {
        self.symbols.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.symbols.is_empty()
    }
}
