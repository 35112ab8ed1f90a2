//! Vivo Core - the live-coding signal-synthesis engine
//!
//! This crate evaluates many independently-registered signal functions once
//! per audio sample, mixes and soft-limits their outputs, and streams frames
//! through a lock-free ring buffer, while the functions themselves can be
//! replaced at runtime without resetting their oscillator/filter state.
//!
//! # Core Abstractions
//!
//! ## State & Context
//!
//! - [`StateArena`] / [`StateView`] - fixed numeric memory, sliced per owner
//! - [`Universe`] - the per-call context (time, sample rate, state slice)
//!
//! ## Registration & Hot-Reload
//!
//! - [`Engine`] - control-path owner: arena, allocation table, registry
//! - [`ReloadSession`] - two-phase build-candidate/commit-swap protocol
//! - [`SignalBuilder`] - reload-stable helper state slots
//!
//! ## Rendering & Transport
//!
//! - [`Mixer`] - the real-time render loop (mix, limit, advance time)
//! - [`ring_buffer`] - SPSC frame transport with underrun accounting
//! - [`fault_channel`] - non-real-time diagnostics for per-signal faults
//!
//! # Example
//!
//! ```rust
//! use vivo_core::{Engine, EngineConfig, Frame, fault_channel};
//!
//! let mut engine = Engine::new(EngineConfig::default())?;
//!
//! // A 440 Hz sine keeping its phase in the arena, not in the closure:
//! // replacing the function on reload leaves the phase untouched.
//! engine.register("drone", 1, |_| {
//!     |u: &mut vivo_core::Universe| {
//!         let phase = u.state().get(0);
//!         u.state().set(0, (phase + 440.0 * u.dt as f32) % 1.0);
//!         Frame::mono((phase * std::f32::consts::TAU).sin() * 0.2)
//!     }
//! })?;
//!
//! let (faults, _fault_rx) = fault_channel(64);
//! let mut mixer = engine.mixer(faults);
//! let frame = mixer.render_frame();
//! assert!(frame.sample(0).abs() <= 1.0);
//! # Ok::<(), vivo_core::EngineError>(())
//! ```
//!
//! # Design Principles
//!
//! - **Real-time safe**: no allocation, locks, or logging in the render path
//! - **Phase continuity**: state memory identity is keyed by signal id and
//!   survives arbitrary code replacement
//! - **Atomic handoff**: registry swaps are single pointer updates; the
//!   render loop never sees a partially-built set
//! - **No ambient globals**: every engine owns its arena; instances coexist

pub mod arena;
pub mod config;
pub mod context;
pub mod diag;
pub mod engine;
pub mod error;
pub mod mixer;
pub mod registry;
pub mod reload;
pub mod ring;
pub mod signal;

// Re-export main types at crate root
pub use arena::{ArenaSlice, StateArena, StateView};
pub use config::EngineConfig;
pub use context::{Position, Universe};
pub use diag::{FaultKind, FaultReceiver, FaultSender, SignalFault, fault_channel};
pub use engine::{Engine, EngineShared};
pub use error::EngineError;
pub use mixer::Mixer;
pub use registry::{Registry, SignalRecord};
pub use reload::{ReloadSession, ReloadSummary, SignalBuilder};
pub use ring::{RingConsumer, RingMonitor, RingProducer, ring_buffer};
pub use signal::{Frame, MAX_CHANNELS, SignalFn, SignalFnRef};
