//! Lock-free single-producer single-consumer frame transport.
//!
//! The render loop writes interleaved frames on one side; the audio sink's
//! pull callback drains them on the other. Capacity is rounded up to a
//! power of two so cursor wraparound is a branch-free mask. Cursors are
//! monotonically increasing counters with release stores and acquire loads:
//! a consumer that observes an advanced write cursor is guaranteed to see
//! the frame data behind it.
//!
//! Overrun policy: [`RingProducer::write`] stops at Full and reports a
//! short count; the producer backs off cooperatively instead of overwriting
//! unread frames. Underrun policy: [`RingConsumer::read`] zero-fills the
//! deficit, bumps a counter, and never blocks, since the consumer is
//! typically a hardware-driven deadline.

use std::sync::Arc;
use std::sync::atomic::{AtomicU32, AtomicU64, AtomicUsize, Ordering};

use crate::signal::MAX_CHANNELS;

struct RingShared {
    /// Interleaved sample cells, `capacity * channels` f32 bit patterns.
    data: Box<[AtomicU32]>,
    /// Total frames ever written. Monotonic; masked for indexing.
    write_pos: AtomicUsize,
    /// Total frames ever read. Monotonic; masked for indexing.
    read_pos: AtomicUsize,
    /// Number of short reads (one increment per read call with a deficit).
    underruns: AtomicU64,
    /// Number of short writes (one increment per write call that hit Full).
    overruns: AtomicU64,
    capacity: usize,
    mask: usize,
    channels: usize,
}

impl RingShared {
    fn occupied(&self) -> usize {
        let write = self.write_pos.load(Ordering::Acquire);
        let read = self.read_pos.load(Ordering::Acquire);
        write.wrapping_sub(read)
    }
}

/// Create a ring buffer holding `frames` frames of `channels` channels.
///
/// `frames` is rounded up to the next power of two.
///
/// # Panics
///
/// Panics if `frames` is zero or `channels` is not in `1..=MAX_CHANNELS`.
pub fn ring_buffer(frames: usize, channels: usize) -> (RingProducer, RingConsumer) {
    assert!(frames > 0, "ring capacity must be nonzero");
    assert!(
        channels >= 1 && channels <= MAX_CHANNELS,
        "channel count out of range"
    );
    let capacity = frames.next_power_of_two();
    let shared = Arc::new(RingShared {
        data: (0..capacity * channels).map(|_| AtomicU32::new(0)).collect(),
        write_pos: AtomicUsize::new(0),
        read_pos: AtomicUsize::new(0),
        underruns: AtomicU64::new(0),
        overruns: AtomicU64::new(0),
        capacity,
        mask: capacity - 1,
        channels,
    });
    (
        RingProducer {
            shared: Arc::clone(&shared),
        },
        RingConsumer { shared },
    )
}

/// Producer side, owned by the render loop.
pub struct RingProducer {
    shared: Arc<RingShared>,
}

impl RingProducer {
    /// Write interleaved frames, stopping at Full. Returns frames written.
    ///
    /// Any trailing partial frame in `samples` is ignored.
    pub fn write(&mut self, samples: &[f32]) -> usize {
        let channels = self.shared.channels;
        let frames = samples.len() / channels;

        let write = self.shared.write_pos.load(Ordering::Relaxed);
        let read = self.shared.read_pos.load(Ordering::Acquire);
        let free = self.shared.capacity - write.wrapping_sub(read);
        let count = frames.min(free);

        for f in 0..count {
            let slot = (write.wrapping_add(f) & self.shared.mask) * channels;
            for c in 0..channels {
                self.shared.data[slot + c]
                    .store(samples[f * channels + c].to_bits(), Ordering::Relaxed);
            }
        }
        self.shared
            .write_pos
            .store(write.wrapping_add(count), Ordering::Release);

        if count < frames {
            self.shared.overruns.fetch_add(1, Ordering::Relaxed);
        }
        count
    }

    /// Frames that can currently be written without overrunning.
    pub fn free_frames(&self) -> usize {
        self.shared.capacity - self.shared.occupied()
    }

    /// Capacity in frames (after power-of-two rounding).
    pub fn capacity(&self) -> usize {
        self.shared.capacity
    }

    /// Channels per frame.
    pub fn channels(&self) -> usize {
        self.shared.channels
    }

    /// Number of short writes so far.
    pub fn overruns(&self) -> u64 {
        self.shared.overruns.load(Ordering::Relaxed)
    }

    /// A cloneable observability handle.
    pub fn monitor(&self) -> RingMonitor {
        RingMonitor {
            shared: Arc::clone(&self.shared),
        }
    }
}

/// Consumer side, owned by the audio sink.
pub struct RingConsumer {
    shared: Arc<RingShared>,
}

impl RingConsumer {
    /// Fill `dst` with interleaved frames. Returns frames actually read.
    ///
    /// On underrun the missing portion of `dst` (and any trailing partial
    /// frame) is zero-filled and the underrun counter is incremented once.
    pub fn read(&mut self, dst: &mut [f32]) -> usize {
        let channels = self.shared.channels;
        let want = dst.len() / channels;

        let read = self.shared.read_pos.load(Ordering::Relaxed);
        let write = self.shared.write_pos.load(Ordering::Acquire);
        let available = write.wrapping_sub(read);
        let count = want.min(available);

        for f in 0..count {
            let slot = (read.wrapping_add(f) & self.shared.mask) * channels;
            for c in 0..channels {
                dst[f * channels + c] =
                    f32::from_bits(self.shared.data[slot + c].load(Ordering::Relaxed));
            }
        }
        dst[count * channels..].fill(0.0);
        self.shared
            .read_pos
            .store(read.wrapping_add(count), Ordering::Release);

        if count < want {
            self.shared.underruns.fetch_add(1, Ordering::Relaxed);
        }
        count
    }

    /// Frames currently readable.
    pub fn available_frames(&self) -> usize {
        self.shared.occupied()
    }

    /// Number of short reads so far.
    pub fn underruns(&self) -> u64 {
        self.shared.underruns.load(Ordering::Relaxed)
    }

    /// Channels per frame.
    pub fn channels(&self) -> usize {
        self.shared.channels
    }

    /// A cloneable observability handle.
    pub fn monitor(&self) -> RingMonitor {
        RingMonitor {
            shared: Arc::clone(&self.shared),
        }
    }
}

/// Read-only view of ring buffer health, cloneable to any thread.
#[derive(Clone)]
pub struct RingMonitor {
    shared: Arc<RingShared>,
}

impl RingMonitor {
    /// Frames currently buffered.
    pub fn occupied_frames(&self) -> usize {
        self.shared.occupied()
    }

    /// Capacity in frames.
    pub fn capacity(&self) -> usize {
        self.shared.capacity
    }

    /// Number of short reads so far.
    pub fn underruns(&self) -> u64 {
        self.shared.underruns.load(Ordering::Relaxed)
    }

    /// Number of short writes so far.
    pub fn overruns(&self) -> u64 {
        self.shared.overruns.load(Ordering::Relaxed)
    }
}
