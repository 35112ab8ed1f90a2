//! The state arena: a fixed block of numeric memory shared between the
//! control path and the render path.
//!
//! Every registered signal and every stateful helper call-site owns a
//! disjoint slice of the arena. The slice backing a given identifier is
//! stable across hot-reloads, which is what makes oscillator phase and
//! filter memory survive code replacement.
//!
//! Cells are stored as `f32` bit patterns in a flat `[AtomicU32]`, so both
//! paths can touch the memory without locks and without `unsafe`. Allocation
//! and release run only on the control path; the render path only ever
//! constructs [`StateView`]s, which cannot fail and do not allocate.

use std::sync::Arc;
use std::sync::atomic::{AtomicU32, Ordering};

use crate::error::EngineError;

/// A `(offset, length)` pair describing a disjoint region of the arena.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ArenaSlice {
    offset: u32,
    len: u32,
}

impl ArenaSlice {
    /// The empty slice. Views over it have length zero.
    pub const EMPTY: ArenaSlice = ArenaSlice { offset: 0, len: 0 };

    /// Offset of the first cell.
    pub fn offset(&self) -> usize {
        self.offset as usize
    }

    /// Number of cells.
    pub fn len(&self) -> usize {
        self.len as usize
    }

    /// Whether the slice has zero length.
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }
}

/// The raw cell storage, shared by the arena and every live [`StateView`].
pub(crate) struct Cells {
    cells: Box<[AtomicU32]>,
}

impl Cells {
    fn new(capacity: usize) -> Self {
        Self {
            cells: (0..capacity).map(|_| AtomicU32::new(0)).collect(),
        }
    }

    #[inline]
    fn get(&self, idx: usize) -> f32 {
        f32::from_bits(self.cells[idx].load(Ordering::Relaxed))
    }

    #[inline]
    fn set(&self, idx: usize, value: f32) {
        self.cells[idx].store(value.to_bits(), Ordering::Relaxed);
    }
}

/// A read/write window over one arena slice, handed to signal functions as
/// their persistent `state`.
///
/// Views are cheap to clone and safe to recreate per call; the underlying
/// memory identity is what persists. Loads and stores are relaxed atomics:
/// a slice has exactly one owner, so there is no ordering to establish.
#[derive(Clone)]
pub struct StateView {
    cells: Arc<Cells>,
    offset: usize,
    len: usize,
}

impl StateView {
    pub(crate) fn new(cells: Arc<Cells>, slice: ArenaSlice) -> Self {
        Self {
            cells,
            offset: slice.offset(),
            len: slice.len(),
        }
    }

    /// Read cell `idx`.
    ///
    /// # Panics
    ///
    /// Panics if `idx >= len()`. In the render path the panic is contained
    /// per signal; the faulting signal contributes silence for the frame.
    #[inline]
    pub fn get(&self, idx: usize) -> f32 {
        assert!(idx < self.len, "state index {idx} out of range {}", self.len);
        self.cells.get(self.offset + idx)
    }

    /// Write cell `idx`.
    ///
    /// # Panics
    ///
    /// Panics if `idx >= len()`.
    #[inline]
    pub fn set(&self, idx: usize, value: f32) {
        assert!(idx < self.len, "state index {idx} out of range {}", self.len);
        self.cells.set(self.offset + idx, value);
    }

    /// Number of cells in the view.
    pub fn len(&self) -> usize {
        self.len
    }

    /// Whether the view has zero length.
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Set every cell to `value`.
    pub fn fill(&self, value: f32) {
        for idx in 0..self.len {
            self.cells.set(self.offset + idx, value);
        }
    }
}

impl std::fmt::Debug for StateView {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StateView")
            .field("offset", &self.offset)
            .field("len", &self.len)
            .finish()
    }
}

/// Fixed-capacity allocator over the shared cell block.
///
/// Allocation policy: released slices are kept on a free list and reused
/// first-fit by exact length; everything else comes from monotonic bump
/// allocation below the high-water mark. Slice sizes are small and bounded,
/// so exact-length reuse keeps the allocator O(1) amortized without
/// fragmentation pathologies.
pub struct StateArena {
    cells: Arc<Cells>,
    capacity: usize,
    high_water: usize,
    free: Vec<ArenaSlice>,
}

impl StateArena {
    /// Create an arena with `capacity` f32 cells, all zeroed.
    pub fn new(capacity: usize) -> Self {
        Self {
            cells: Arc::new(Cells::new(capacity)),
            capacity,
            high_water: 0,
            free: Vec::new(),
        }
    }

    /// Total capacity in cells.
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Cells currently owned by live slices.
    pub fn allocated(&self) -> usize {
        self.high_water - self.free.iter().map(|s| s.len()).sum::<usize>()
    }

    /// Allocate a slice of `len` cells. Control path only.
    ///
    /// Zero-length requests succeed and return [`ArenaSlice::EMPTY`].
    /// Exhaustion is a configuration error reported to the caller, never a
    /// silent truncation.
    pub fn allocate(&mut self, len: usize) -> Result<ArenaSlice, EngineError> {
        if len == 0 {
            return Ok(ArenaSlice::EMPTY);
        }

        // Exact-length reuse first: a freed slice was zeroed on release.
        if let Some(pos) = self.free.iter().position(|s| s.len() == len) {
            return Ok(self.free.swap_remove(pos));
        }

        if self.high_water + len > self.capacity {
            return Err(EngineError::ArenaExhausted {
                requested: len,
                available: self.capacity - self.allocated(),
                capacity: self.capacity,
            });
        }

        let slice = ArenaSlice {
            offset: self.high_water as u32,
            len: len as u32,
        };
        self.high_water += len;
        Ok(slice)
    }

    /// Return a slice to the free list, zeroing it first so a future owner
    /// never observes stale values from an unrelated predecessor.
    ///
    /// Control path only, and only for slices no longer reachable from the
    /// committed registry (the reload coordinator defers release by at least
    /// one render cycle past the swap).
    pub fn release(&mut self, slice: ArenaSlice) {
        if slice.is_empty() {
            return;
        }
        for idx in slice.offset()..slice.offset() + slice.len() {
            self.cells.set(idx, 0.0);
        }
        self.free.push(slice);
    }

    /// Construct a view over `slice`. Render path safe: no allocation beyond
    /// an `Arc` clone, cannot fail.
    pub fn view(&self, slice: ArenaSlice) -> StateView {
        StateView::new(Arc::clone(&self.cells), slice)
    }

    pub(crate) fn cells(&self) -> Arc<Cells> {
        Arc::clone(&self.cells)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bump_allocation_is_sequential_and_disjoint() {
        let mut arena = StateArena::new(64);
        let a = arena.allocate(4).unwrap();
        let b = arena.allocate(8).unwrap();
        let c = arena.allocate(2).unwrap();

        assert_eq!(a.offset(), 0);
        assert_eq!(b.offset(), 4);
        assert_eq!(c.offset(), 12);
        assert_eq!(arena.allocated(), 14);
    }

    #[test]
    fn exact_fit_reuse() {
        let mut arena = StateArena::new(16);
        let a = arena.allocate(4).unwrap();
        let _b = arena.allocate(4).unwrap();

        arena.release(a);
        let c = arena.allocate(4).unwrap();
        assert_eq!(c.offset(), a.offset());

        // A different length must not reuse the freed region.
        arena.release(c);
        let d = arena.allocate(2).unwrap();
        assert_eq!(d.offset(), 8);
    }

    #[test]
    fn released_slices_are_zeroed() {
        let mut arena = StateArena::new(8);
        let slice = arena.allocate(4).unwrap();

        let view = arena.view(slice);
        view.set(0, 1.5);
        view.set(3, -2.5);

        arena.release(slice);
        let again = arena.allocate(4).unwrap();
        assert_eq!(again, slice);

        let view = arena.view(again);
        for idx in 0..4 {
            assert_eq!(view.get(idx), 0.0);
        }
    }

    #[test]
    fn exhaustion_is_an_error() {
        let mut arena = StateArena::new(8);
        arena.allocate(6).unwrap();
        let err = arena.allocate(4).unwrap_err();
        assert!(matches!(
            err,
            EngineError::ArenaExhausted {
                requested: 4,
                available: 2,
                capacity: 8,
            }
        ));
        // The failed request must not have consumed anything.
        assert_eq!(arena.allocated(), 6);
        arena.allocate(2).unwrap();
    }

    #[test]
    fn zero_length_allocation_is_empty() {
        let mut arena = StateArena::new(4);
        let slice = arena.allocate(0).unwrap();
        assert!(slice.is_empty());
        assert_eq!(arena.allocated(), 0);
        assert!(arena.view(slice).is_empty());
    }

    #[test]
    fn view_reads_what_was_written() {
        let mut arena = StateArena::new(8);
        let slice = arena.allocate(3).unwrap();
        let writer = arena.view(slice);
        let reader = arena.view(slice);

        writer.set(1, 0.25);
        assert_eq!(reader.get(1), 0.25);
        assert_eq!(reader.get(0), 0.0);

        writer.fill(7.0);
        for idx in 0..3 {
            assert_eq!(reader.get(idx), 7.0);
        }
    }

    #[test]
    #[should_panic]
    fn view_bounds_are_enforced() {
        let mut arena = StateArena::new(8);
        let slice = arena.allocate(2).unwrap();
        arena.view(slice).get(2);
    }
}
