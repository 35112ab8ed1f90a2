//! Audio output layer for the Vivo live-coding engine.
//!
//! This crate provides:
//!
//! - **Device enumeration**: [`list_output_devices`] and
//!   [`default_output_device`] for discovering sinks
//! - **Output streaming**: [`OutputStream`] for a pull-model cpal stream
//!   that drains the engine's ring buffer
//! - **Turnkey hosting**: [`LiveEngine`] wires the core engine, the render
//!   thread, and the hardware stream together
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use vivo_io::{LiveEngine, LiveOptions};
//! use vivo_core::Frame;
//!
//! let mut live = LiveEngine::start(LiveOptions::default())?;
//!
//! live.register("drone", 1, |_| {
//!     |u: &mut vivo_core::Universe| {
//!         let phase = u.state().get(0);
//!         u.state().set(0, (phase + 220.0 * u.dt as f32) % 1.0);
//!         Frame::mono((phase * std::f32::consts::TAU).sin() * 0.2)
//!     }
//! })?;
//!
//! std::thread::sleep(std::time::Duration::from_secs(2));
//! // Dropping `live` stops the render thread and the stream.
//! ```

mod engine;
mod stream;

pub use engine::{LiveEngine, LiveOptions};
pub use stream::{
    AudioDevice, OutputStream, default_output_device, find_output_device, list_output_devices,
};

/// Error types for audio output operations.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Audio stream setup or runtime error.
    #[error("Audio stream error: {0}")]
    Stream(String),

    /// No audio device available on the system.
    #[error("No audio device available")]
    NoDevice,

    /// The requested sample format is not supported.
    #[error("Unsupported sample format: {0}")]
    UnsupportedFormat(String),

    /// The requested audio device was not found.
    #[error("Device not found: {0}")]
    DeviceNotFound(String),

    /// Engine construction or registration error.
    #[error("Engine error: {0}")]
    Engine(#[from] vivo_core::EngineError),
}

/// Convenience result type for audio output operations.
pub type Result<T> = std::result::Result<T, Error>;
