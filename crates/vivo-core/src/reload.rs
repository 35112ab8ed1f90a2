//! Hot-reload coordination: the two-phase build/commit protocol.
//!
//! An external mechanism (file watcher, REPL, test harness) drives the
//! sequence: [`Engine::begin_reload`], one [`ReloadSession::signal`] call
//! per registration the user's code replays, then [`ReloadSession::commit`].
//! The session builds a candidate record set against the allocation table:
//! identifiers that persist reuse their arena slices, new identifiers get
//! fresh ones, and identifiers absent from the candidate set have their
//! slices reclaimed after the swap. The render loop never observes a
//! partially-built registry.

use std::collections::HashSet;
use std::sync::Arc;

use crate::arena::{ArenaSlice, StateView};
use crate::context::Universe;
use crate::engine::{Engine, OwnerKey};
use crate::error::EngineError;
use crate::registry::{Registry, SignalRecord};
use crate::signal::Frame;

/// Hands out helper state slots while a signal's build closure runs.
///
/// The ordinal counter is reset to zero immediately before each signal's
/// build closure executes, so the same call-site receives the same ordinal,
/// and hence the same arena slice, across reloads.
///
/// # Known hazard
///
/// Slot identity is `(signal id, claim ordinal)`. If an edit changes the
/// sequence or count of [`helper`](Self::helper) calls between reloads
/// (a branch now skips a claim, say), later call-sites inherit an earlier
/// predecessor's state. Keep helper claims unconditional and in a stable
/// order within a build closure.
pub struct SignalBuilder<'e> {
    engine: &'e mut Engine,
    id: Arc<str>,
    next_ordinal: u32,
    /// Allocations made for this candidate: `(key, new slice, displaced
    /// slice if the key previously held a different length)`. Used for
    /// rollback when the build fails.
    fresh: Vec<(OwnerKey, ArenaSlice, Option<ArenaSlice>)>,
    error: Option<EngineError>,
}

impl SignalBuilder<'_> {
    /// Claim a persistent state slot of `len` cells for one helper
    /// call-site.
    ///
    /// Reload-stable: the same claim order yields the same memory. A claim
    /// whose length changed across reloads gets a fresh zeroed slice (the
    /// old one is scheduled for release).
    ///
    /// On arena exhaustion this returns a dead zero-length view and the
    /// enclosing registration fails with the underlying error once the
    /// build closure returns.
    pub fn helper(&mut self, len: usize) -> StateView {
        let ordinal = self.next_ordinal;
        self.next_ordinal += 1;
        if self.error.is_some() {
            return self.engine.arena.view(ArenaSlice::EMPTY);
        }
        let key = OwnerKey::Helper(Arc::clone(&self.id), ordinal);
        match self.claim(key, len) {
            Ok(slice) => self.engine.arena.view(slice),
            Err(err) => {
                self.error = Some(err);
                self.engine.arena.view(ArenaSlice::EMPTY)
            }
        }
    }

    /// Sample rate of the engine, for precomputing coefficients.
    pub fn sample_rate(&self) -> u32 {
        self.engine.config().sample_rate
    }

    /// Identifier of the signal being built.
    pub fn id(&self) -> &str {
        &self.id
    }

    fn claim(&mut self, key: OwnerKey, len: usize) -> Result<ArenaSlice, EngineError> {
        match self.engine.table.get(&key).copied() {
            Some(existing) if existing.len() == len => Ok(existing),
            existing => {
                let slice = self.engine.arena.allocate(len)?;
                self.engine.table.insert(key.clone(), slice);
                self.fresh.push((key, slice, existing));
                Ok(slice)
            }
        }
    }
}

pub(crate) struct CandidateOutcome {
    pub(crate) record: SignalRecord,
    /// Slices displaced by length changes; still referenced by the committed
    /// registry until the caller swaps, so release is the caller's job.
    pub(crate) replaced: Vec<ArenaSlice>,
}

impl Engine {
    /// Build one candidate record: resolve the signal's slice against the
    /// allocation table, run the build closure with a fresh helper-ordinal
    /// counter, and record every key the candidate claimed in `touched`.
    ///
    /// On failure every allocation made for this candidate is rolled back;
    /// the table and arena are left exactly as before the call.
    pub(crate) fn build_candidate<B, F>(
        &mut self,
        id: &str,
        state_len: usize,
        build: B,
        touched: &mut HashSet<OwnerKey>,
    ) -> Result<CandidateOutcome, EngineError>
    where
        B: FnOnce(&mut SignalBuilder<'_>) -> F,
        F: Fn(&mut Universe) -> Frame + Send + Sync + 'static,
    {
        if id.is_empty() {
            return Err(EngineError::InvalidConfig(
                "signal id must be nonempty".into(),
            ));
        }
        let id: Arc<str> = Arc::from(id);

        let mut builder = SignalBuilder {
            engine: self,
            id: Arc::clone(&id),
            next_ordinal: 0,
            fresh: Vec::new(),
            error: None,
        };

        // The signal's own slice goes through the same claim path as helper
        // slots, so length changes and rollback behave identically.
        let slice = match builder.claim(OwnerKey::Signal(Arc::clone(&id)), state_len) {
            Ok(slice) => slice,
            Err(err) => return Err(err),
        };

        let func = build(&mut builder);

        let error = builder.error.take();
        let fresh = std::mem::take(&mut builder.fresh);
        let ordinals = builder.next_ordinal;
        drop(builder);

        if let Some(err) = error {
            for (key, new_slice, displaced) in fresh.into_iter().rev() {
                self.arena.release(new_slice);
                match displaced {
                    Some(old) => {
                        self.table.insert(key, old);
                    }
                    None => {
                        self.table.remove(&key);
                    }
                }
            }
            return Err(err);
        }

        touched.insert(OwnerKey::Signal(Arc::clone(&id)));
        for ordinal in 0..ordinals {
            touched.insert(OwnerKey::Helper(Arc::clone(&id), ordinal));
        }

        let replaced = fresh.iter().filter_map(|(_, _, old)| *old).collect();
        Ok(CandidateOutcome {
            record: SignalRecord {
                id,
                func: Arc::new(func),
                slice,
            },
            replaced,
        })
    }
}

/// Counts reported by [`ReloadSession::commit`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReloadSummary {
    /// Signals new in this pass.
    pub added: usize,
    /// Signals carried over from the previous registry (slices preserved).
    pub retained: usize,
    /// Signals from the previous registry absent from this pass.
    pub removed: usize,
}

/// An in-progress registration pass.
///
/// Dropping a session without committing abandons the candidate set; any
/// slices it allocated stay in the table and are reconciled away (released)
/// by the next committed pass that does not claim them.
pub struct ReloadSession<'e> {
    engine: &'e mut Engine,
    candidates: Vec<SignalRecord>,
    replaced: Vec<ArenaSlice>,
    touched: HashSet<OwnerKey>,
}

impl<'e> ReloadSession<'e> {
    pub(crate) fn new(engine: &'e mut Engine) -> Self {
        Self {
            engine,
            candidates: Vec::new(),
            replaced: Vec::new(),
            touched: HashSet::new(),
        }
    }

    /// Register a signal into the candidate set.
    ///
    /// `state_len` is the signal's own state slice length in cells. The
    /// build closure receives a [`SignalBuilder`] for helper slots and
    /// returns the render closure. An id already in the committed registry
    /// keeps its slice; an id already registered *in this pass* is an error.
    pub fn signal<B, F>(&mut self, id: &str, state_len: usize, build: B) -> Result<(), EngineError>
    where
        B: FnOnce(&mut SignalBuilder<'_>) -> F,
        F: Fn(&mut Universe) -> Frame + Send + Sync + 'static,
    {
        if self.candidates.iter().any(|r| r.id() == id) {
            return Err(EngineError::DuplicateSignal(id.to_string()));
        }
        let outcome = self
            .engine
            .build_candidate(id, state_len, build, &mut self.touched)?;
        self.replaced.extend(outcome.replaced);
        self.candidates.push(outcome.record);
        Ok(())
    }

    /// Number of candidates registered so far.
    pub fn len(&self) -> usize {
        self.candidates.len()
    }

    /// Whether the candidate set is empty.
    pub fn is_empty(&self) -> bool {
        self.candidates.is_empty()
    }

    /// Atomically publish the candidate set and schedule release of slices
    /// whose owners did not survive the pass.
    pub fn commit(self) -> ReloadSummary {
        let ReloadSession {
            engine,
            candidates,
            mut replaced,
            touched,
        } = self;

        let previous = engine.shared_ref().load_registry();
        let retained = candidates
            .iter()
            .filter(|r| previous.contains(r.id()))
            .count();
        let added = candidates.len() - retained;
        let removed = previous
            .ids()
            .filter(|id| !candidates.iter().any(|c| c.id() == *id))
            .count();

        let departed = engine.take_departed(|key| !touched.contains(key));
        let retired = engine
            .shared_ref()
            .swap_registry(Registry::new(candidates));
        drop(previous);

        replaced.extend(departed);
        engine.queue_release(replaced, retired);
        engine.reclaim();

        tracing::debug!(added, retained, removed, "reload committed");
        ReloadSummary {
            added,
            retained,
            removed,
        }
    }
}
