//! Engine ownership and the control/render split.
//!
//! [`Engine`] is the control-path object: it owns the state arena, the
//! allocation table mapping identifiers to arena slices, and the queue of
//! deferred releases. [`EngineShared`] is the cloneable handle the render
//! path sees: the committed registry behind an `ArcSwap`, the raw arena
//! cells, the render generation counter, and the listener position.
//!
//! The control path never mutates slice memory directly, only ownership
//! bookkeeping. The registry swap is a single atomic pointer update, so the
//! render loop observes either the fully-old or fully-new set. Slices owned
//! by departed identifiers are queued and only zeroed once the render loop
//! has advanced at least one frame past the swap (or the retired snapshot
//! is provably unreferenced), closing the freed-while-referenced race.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::sync::atomic::{AtomicU32, AtomicU64, Ordering};

use arc_swap::ArcSwap;

use crate::arena::{ArenaSlice, Cells, StateArena, StateView};
use crate::config::EngineConfig;
use crate::context::Position;
use crate::diag::FaultSender;
use crate::error::EngineError;
use crate::mixer::Mixer;
use crate::registry::{Registry, SignalRecord};
use crate::reload::ReloadSession;

/// Identity of an arena slice owner: a signal, or one helper call-site
/// within a signal's build closure.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub(crate) enum OwnerKey {
    Signal(Arc<str>),
    Helper(Arc<str>, u32),
}

impl OwnerKey {
    pub(crate) fn id(&self) -> &str {
        match self {
            OwnerKey::Signal(id) | OwnerKey::Helper(id, _) => id,
        }
    }
}

struct SharedState {
    registry: ArcSwap<Registry>,
    cells: Arc<Cells>,
    /// Bumped once per rendered frame. Gates deferred slice release.
    render_gen: AtomicU64,
    /// Listener coordinates as f32 bits, written by the host, read per frame.
    position: [AtomicU32; 3],
}

/// Handle to the state shared between the control and render paths.
///
/// Cloneable into `'static + Send` contexts (the render thread). Registry
/// reads are wait-free `ArcSwap` loads.
#[derive(Clone)]
pub struct EngineShared {
    inner: Arc<SharedState>,
}

impl EngineShared {
    pub(crate) fn load_registry(&self) -> Arc<Registry> {
        // Full load (refcount bump) so retired snapshots can be proven
        // unreferenced via strong_count during deferred release.
        self.inner.registry.load_full()
    }

    pub(crate) fn swap_registry(&self, next: Registry) -> Arc<Registry> {
        self.inner.registry.swap(Arc::new(next))
    }

    /// Frames rendered so far by the attached mixer.
    pub fn render_generation(&self) -> u64 {
        self.inner.render_gen.load(Ordering::Acquire)
    }

    pub(crate) fn bump_render_generation(&self) {
        self.inner.render_gen.fetch_add(1, Ordering::Release);
    }

    /// Current listener coordinates.
    pub fn position(&self) -> Position {
        Position {
            x: f32::from_bits(self.inner.position[0].load(Ordering::Relaxed)),
            y: f32::from_bits(self.inner.position[1].load(Ordering::Relaxed)),
            z: f32::from_bits(self.inner.position[2].load(Ordering::Relaxed)),
        }
    }

    /// Move the listener. Takes effect on the next rendered frame.
    pub fn set_position(&self, position: Position) {
        self.inner.position[0].store(position.x.to_bits(), Ordering::Relaxed);
        self.inner.position[1].store(position.y.to_bits(), Ordering::Relaxed);
        self.inner.position[2].store(position.z.to_bits(), Ordering::Relaxed);
    }

    /// Construct a view over `slice`. Intended for hosts inspecting signal
    /// state; the render path builds its views the same way.
    pub fn view(&self, slice: ArenaSlice) -> StateView {
        StateView::new(Arc::clone(&self.inner.cells), slice)
    }
}

/// Slices waiting for the render loop to move past the registry swap that
/// retired them.
struct PendingRelease {
    slices: Vec<ArenaSlice>,
    /// Render generation at the time of the swap.
    stamp: u64,
    /// The registry snapshot that last referenced these slices.
    retired: Arc<Registry>,
}

/// The control-path engine object.
///
/// No ambient globals: every engine owns its arena and registry, so
/// multiple independent instances can coexist (tests run dozens).
pub struct Engine {
    config: EngineConfig,
    shared: EngineShared,
    pub(crate) arena: StateArena,
    pub(crate) table: HashMap<OwnerKey, ArenaSlice>,
    pending: Vec<PendingRelease>,
}

impl Engine {
    /// Create an engine. Fails on invalid configuration.
    pub fn new(config: EngineConfig) -> Result<Self, EngineError> {
        config.validate()?;
        let arena = StateArena::new(config.arena_capacity);
        let shared = EngineShared {
            inner: Arc::new(SharedState {
                registry: ArcSwap::from_pointee(Registry::empty()),
                cells: arena.cells(),
                render_gen: AtomicU64::new(0),
                position: [AtomicU32::new(0), AtomicU32::new(0), AtomicU32::new(0)],
            }),
        };
        Ok(Self {
            config,
            shared,
            arena,
            table: HashMap::new(),
            pending: Vec::new(),
        })
    }

    /// The engine configuration.
    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Clone the shared handle for the render path or observers.
    pub fn shared(&self) -> EngineShared {
        self.shared.clone()
    }

    /// Build the mixer that renders this engine's registry.
    pub fn mixer(&self, faults: FaultSender) -> Mixer {
        Mixer::new(self.shared(), &self.config, faults)
    }

    /// The committed registry snapshot.
    pub fn registry(&self) -> Arc<Registry> {
        self.shared.load_registry()
    }

    /// Start a fresh registration pass. See [`ReloadSession`].
    pub fn begin_reload(&mut self) -> ReloadSession<'_> {
        self.reclaim();
        ReloadSession::new(self)
    }

    /// Register or replace a single signal outside a reload pass.
    ///
    /// Re-registration under an existing id preserves the id's arena slice
    /// (phase continuity); helper call-sites not re-claimed by the new build
    /// closure are scheduled for release.
    pub fn register<B, F>(&mut self, id: &str, state_len: usize, build: B) -> Result<(), EngineError>
    where
        B: FnOnce(&mut crate::reload::SignalBuilder<'_>) -> F,
        F: Fn(&mut crate::context::Universe) -> crate::signal::Frame + Send + Sync + 'static,
    {
        self.reclaim();
        let mut touched = HashSet::new();
        let outcome = self.build_candidate(id, state_len, build, &mut touched)?;

        let current = self.shared.load_registry();
        let mut records: Vec<SignalRecord> = current
            .records
            .iter()
            .filter(|r| &*r.id != id)
            .cloned()
            .collect();
        records.push(outcome.record);

        let mut departed = self.take_departed(|key| key.id() == id && !touched.contains(key));
        departed.extend(outcome.replaced);
        let retired = self.shared.swap_registry(Registry::new(records));
        drop(current);
        self.queue_release(departed, retired);
        tracing::debug!(id, state_len, "signal registered");
        Ok(())
    }

    /// Remove a signal and schedule release of everything it owns.
    ///
    /// Returns `false` if no signal with that id was registered. A later
    /// re-registration under the same id gets freshly zeroed memory.
    pub fn unregister(&mut self, id: &str) -> bool {
        self.reclaim();
        let current = self.shared.load_registry();
        if !current.contains(id) {
            return false;
        }
        let records: Vec<SignalRecord> = current
            .records
            .iter()
            .filter(|r| &*r.id != id)
            .cloned()
            .collect();
        let departed = self.take_departed(|key| key.id() == id);
        let retired = self.shared.swap_registry(Registry::new(records));
        drop(current);
        self.queue_release(departed, retired);
        tracing::debug!(id, "signal unregistered");
        true
    }

    /// Apply any deferred releases whose retiring swap the render loop has
    /// provably moved past.
    ///
    /// Called automatically at the start of every control-path operation;
    /// exposed for hosts that reload rarely and want the arena swept.
    pub fn reclaim(&mut self) {
        let generation = self.shared.render_generation();
        let mut idx = 0;
        while idx < self.pending.len() {
            let entry = &self.pending[idx];
            // Either the render loop completed a frame after the swap, or
            // nothing holds the retired snapshot any more (offline engines).
            let ready = generation > entry.stamp || Arc::strong_count(&entry.retired) == 1;
            if ready {
                let entry = self.pending.swap_remove(idx);
                for slice in entry.slices {
                    self.arena.release(slice);
                }
            } else {
                idx += 1;
            }
        }
    }

    /// Arena slice owned by a signal id, if registered in the allocation
    /// table.
    pub fn signal_slice(&self, id: &str) -> Option<ArenaSlice> {
        self.table.get(&OwnerKey::Signal(Arc::from(id))).copied()
    }

    /// Arena slice owned by a helper call-site `(id, ordinal)`.
    pub fn helper_slice(&self, id: &str, ordinal: u32) -> Option<ArenaSlice> {
        self.table
            .get(&OwnerKey::Helper(Arc::from(id), ordinal))
            .copied()
    }

    /// Cells currently owned by live slices.
    pub fn arena_allocated(&self) -> usize {
        self.arena.allocated()
    }

    /// Release batches still waiting on the render loop.
    pub fn pending_releases(&self) -> usize {
        self.pending.len()
    }

    pub(crate) fn take_departed<P>(&mut self, pred: P) -> Vec<ArenaSlice>
    where
        P: Fn(&OwnerKey) -> bool,
    {
        let keys: Vec<OwnerKey> = self.table.keys().filter(|k| pred(k)).cloned().collect();
        keys.into_iter()
            .filter_map(|key| self.table.remove(&key))
            .collect()
    }

    pub(crate) fn queue_release(&mut self, slices: Vec<ArenaSlice>, retired: Arc<Registry>) {
        if slices.is_empty() {
            return;
        }
        self.pending.push(PendingRelease {
            slices,
            stamp: self.shared.render_generation(),
            retired,
        });
    }

    pub(crate) fn shared_ref(&self) -> &EngineShared {
        &self.shared
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::signal::Frame;

    fn engine() -> Engine {
        Engine::new(EngineConfig {
            arena_capacity: 64,
            ..Default::default()
        })
        .unwrap()
    }

    #[test]
    fn register_allocates_and_publishes() {
        let mut engine = engine();
        engine
            .register("a", 2, |_| |_u: &mut crate::Universe| Frame::mono(0.0))
            .unwrap();

        assert!(engine.registry().contains("a"));
        assert_eq!(engine.signal_slice("a").unwrap().len(), 2);
        assert_eq!(engine.arena_allocated(), 2);
    }

    #[test]
    fn re_registration_keeps_offset() {
        let mut engine = engine();
        engine
            .register("a", 4, |_| |_u: &mut crate::Universe| Frame::mono(0.0))
            .unwrap();
        let first = engine.signal_slice("a").unwrap();

        engine
            .register("a", 4, |_| |_u: &mut crate::Universe| Frame::mono(1.0))
            .unwrap();
        assert_eq!(engine.signal_slice("a").unwrap(), first);
        assert_eq!(engine.registry().len(), 1);
    }

    #[test]
    fn unregister_defers_release_until_reclaimable() {
        let mut engine = engine();
        engine
            .register("a", 4, |_| |_u: &mut crate::Universe| Frame::mono(0.0))
            .unwrap();
        assert!(engine.unregister("a"));
        assert!(!engine.registry().contains("a"));

        // Nothing holds the retired snapshot, so reclaim frees immediately.
        engine.reclaim();
        assert_eq!(engine.pending_releases(), 0);
        assert_eq!(engine.arena_allocated(), 0);
    }

    #[test]
    fn release_waits_while_retired_snapshot_is_held() {
        let mut engine = engine();
        engine
            .register("a", 4, |_| |_u: &mut crate::Universe| Frame::mono(0.0))
            .unwrap();

        // Simulate a render path holding the committed snapshot mid-frame.
        let held = engine.registry();
        assert!(engine.unregister("a"));
        engine.reclaim();
        assert_eq!(engine.pending_releases(), 1);
        assert_eq!(engine.arena_allocated(), 4);

        drop(held);
        engine.reclaim();
        assert_eq!(engine.pending_releases(), 0);
        assert_eq!(engine.arena_allocated(), 0);
    }

    #[test]
    fn unregister_unknown_id_is_noop() {
        let mut engine = engine();
        assert!(!engine.unregister("nope"));
    }

    #[test]
    fn position_roundtrip() {
        let engine = engine();
        let shared = engine.shared();
        shared.set_position(Position {
            x: 1.0,
            y: -2.0,
            z: 0.5,
        });
        assert_eq!(
            shared.position(),
            Position {
                x: 1.0,
                y: -2.0,
                z: 0.5
            }
        );
    }
}
