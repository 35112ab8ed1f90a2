//! Error types for engine configuration and registration.

use thiserror::Error;

use crate::signal::MAX_CHANNELS;

/// Errors reported synchronously from registration, reload, or engine
/// construction.
///
/// These are configuration errors: fatal to the attempt that raised them,
/// never to the running process. Per-signal runtime failures travel through
/// the diagnostics channel instead (see [`crate::diag`]).
#[derive(Debug, Error)]
pub enum EngineError {
    /// The state arena cannot satisfy an allocation request.
    #[error(
        "state arena exhausted: requested {requested} cells, {available} of {capacity} available"
    )]
    ArenaExhausted {
        /// Number of cells requested.
        requested: usize,
        /// Cells still unallocated (bump region plus exact-fit free slices).
        available: usize,
        /// Total arena capacity in cells.
        capacity: usize,
    },

    /// The same identifier was registered twice within one reload pass.
    #[error("signal '{0}' registered twice in one reload pass")]
    DuplicateSignal(String),

    /// Sample rate is zero or otherwise unusable.
    #[error("invalid sample rate: {0}")]
    InvalidSampleRate(u32),

    /// Channel count outside the supported range.
    #[error("invalid channel count: {0} (must be 1..={MAX_CHANNELS})")]
    InvalidChannelCount(usize),

    /// Any other invalid configuration value.
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),
}
