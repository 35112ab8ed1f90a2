//! Engine configuration.
//!
//! All values are fixed for the lifetime of an [`crate::Engine`]. The sample
//! rate is expected to be queried from the audio sink before the engine is
//! constructed; the engine never renegotiates it.

use crate::error::EngineError;
use crate::signal::MAX_CHANNELS;

/// Configuration for an engine instance.
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// Sample rate in Hz, immutable for the process lifetime.
    pub sample_rate: u32,
    /// Output channel count (1..=[`MAX_CHANNELS`]).
    pub channels: usize,
    /// State arena capacity in f32 cells, shared by all signals and helpers.
    pub arena_capacity: usize,
    /// Ring buffer capacity in frames. Rounded up to a power of two.
    ///
    /// Larger buffers tolerate more control-path jitter at the cost of
    /// output latency.
    pub ring_frames: usize,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            sample_rate: 48000,
            channels: 2,
            arena_capacity: 4096,
            ring_frames: 2048,
        }
    }
}

impl EngineConfig {
    /// Validate the configuration.
    pub fn validate(&self) -> Result<(), EngineError> {
        if self.sample_rate == 0 {
            return Err(EngineError::InvalidSampleRate(self.sample_rate));
        }
        if self.channels == 0 || self.channels > MAX_CHANNELS {
            return Err(EngineError::InvalidChannelCount(self.channels));
        }
        if self.arena_capacity == 0 {
            return Err(EngineError::InvalidConfig(
                "arena capacity must be nonzero".into(),
            ));
        }
        if self.ring_frames == 0 {
            return Err(EngineError::InvalidConfig(
                "ring buffer capacity must be nonzero".into(),
            ));
        }
        Ok(())
    }
}
