//! Immutable signal registry snapshots.
//!
//! A [`Registry`] is a fully-built, never-mutated set of signal records.
//! The control path builds a candidate snapshot during a reload pass and
//! publishes it with a single atomic swap (`ArcSwap` in
//! [`crate::engine::EngineShared`]); the render path therefore always sees
//! either the fully-old or fully-new set, never an intermediate state.

use std::sync::Arc;

use crate::arena::ArenaSlice;
use crate::signal::SignalFnRef;

/// One registered signal: stable identifier, current function, owned slice.
#[derive(Clone)]
pub struct SignalRecord {
    pub(crate) id: Arc<str>,
    pub(crate) func: SignalFnRef,
    pub(crate) slice: ArenaSlice,
}

impl SignalRecord {
    /// The signal's stable textual identifier.
    pub fn id(&self) -> &str {
        &self.id
    }

    /// The arena slice owned by this signal.
    pub fn slice(&self) -> ArenaSlice {
        self.slice
    }
}

impl std::fmt::Debug for SignalRecord {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SignalRecord")
            .field("id", &self.id)
            .field("slice", &self.slice)
            .finish_non_exhaustive()
    }
}

/// An immutable snapshot of all registered signals, in registration order.
#[derive(Debug, Default)]
pub struct Registry {
    pub(crate) records: Vec<SignalRecord>,
}

impl Registry {
    /// The empty registry.
    pub fn empty() -> Self {
        Self::default()
    }

    pub(crate) fn new(records: Vec<SignalRecord>) -> Self {
        Self { records }
    }

    /// Number of registered signals.
    pub fn len(&self) -> usize {
        self.records.len()
    }

    /// Whether no signals are registered.
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Whether a signal with the given identifier is registered.
    pub fn contains(&self, id: &str) -> bool {
        self.get(id).is_some()
    }

    /// Look up a record by identifier.
    pub fn get(&self, id: &str) -> Option<&SignalRecord> {
        self.records.iter().find(|r| &*r.id == id)
    }

    /// Iterate over registered identifiers in registration order.
    pub fn ids(&self) -> impl Iterator<Item = &str> {
        self.records.iter().map(|r| &*r.id)
    }
}
