//! Signal function contract and the per-frame sample type.

use std::sync::Arc;

use crate::context::Universe;

/// Maximum output channel count supported by the engine.
pub const MAX_CHANNELS: usize = 8;

/// One frame of audio: up to [`MAX_CHANNELS`] per-channel samples.
///
/// A mono frame broadcasts to every output channel during mixing; a wider
/// frame must match the engine's channel count exactly (a mismatch is a
/// reportable configuration fault, never a crash).
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Frame {
    samples: [f32; MAX_CHANNELS],
    channels: usize,
}

impl Frame {
    /// A mono frame.
    pub fn mono(sample: f32) -> Self {
        let mut samples = [0.0; MAX_CHANNELS];
        samples[0] = sample;
        Self {
            samples,
            channels: 1,
        }
    }

    /// A stereo frame.
    pub fn stereo(left: f32, right: f32) -> Self {
        let mut samples = [0.0; MAX_CHANNELS];
        samples[0] = left;
        samples[1] = right;
        Self {
            samples,
            channels: 2,
        }
    }

    /// A zeroed frame of the given width.
    ///
    /// # Panics
    ///
    /// Panics if `channels` is zero or exceeds [`MAX_CHANNELS`].
    pub fn silence(channels: usize) -> Self {
        assert!(channels >= 1 && channels <= MAX_CHANNELS);
        Self {
            samples: [0.0; MAX_CHANNELS],
            channels,
        }
    }

    /// Build a frame from a slice of per-channel samples.
    ///
    /// # Panics
    ///
    /// Panics if the slice is empty or longer than [`MAX_CHANNELS`].
    pub fn from_slice(values: &[f32]) -> Self {
        assert!(!values.is_empty() && values.len() <= MAX_CHANNELS);
        let mut samples = [0.0; MAX_CHANNELS];
        samples[..values.len()].copy_from_slice(values);
        Self {
            samples,
            channels: values.len(),
        }
    }

    /// Channel count of this frame.
    pub fn channels(&self) -> usize {
        self.channels
    }

    /// Sample for channel `ch`.
    ///
    /// # Panics
    ///
    /// Panics if `ch >= channels()`.
    #[inline]
    pub fn sample(&self, ch: usize) -> f32 {
        assert!(ch < self.channels);
        self.samples[ch]
    }

    /// The valid per-channel samples.
    pub fn as_slice(&self) -> &[f32] {
        &self.samples[..self.channels]
    }

    /// Whether every sample is finite (no NaN or infinity).
    pub fn is_finite(&self) -> bool {
        self.samples[..self.channels].iter().all(|s| s.is_finite())
    }
}

impl From<f32> for Frame {
    fn from(sample: f32) -> Self {
        Frame::mono(sample)
    }
}

impl From<(f32, f32)> for Frame {
    fn from((left, right): (f32, f32)) -> Self {
        Frame::stereo(left, right)
    }
}

impl From<[f32; 2]> for Frame {
    fn from(lr: [f32; 2]) -> Self {
        Frame::stereo(lr[0], lr[1])
    }
}

/// A user signal function, evaluated once per output frame.
///
/// The function reads and writes its persistent state through
/// [`Universe::state`]; it must not stash the view anywhere that outlives
/// the call (the view object may be recreated per call, only the underlying
/// memory identity is stable). State lives in the arena rather than in
/// closure captures, which is what makes hot-reload replacement safe.
pub type SignalFn = dyn Fn(&mut Universe) -> Frame + Send + Sync;

/// Shared handle to a signal function.
pub type SignalFnRef = Arc<SignalFn>;
