//! The universe state context passed to every signal function.

use std::sync::Arc;

use crate::arena::StateView;

/// Listener coordinates, mutable from outside the render path.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Position {
    /// X coordinate.
    pub x: f32,
    /// Y coordinate.
    pub y: f32,
    /// Z coordinate.
    pub z: f32,
}

/// The single value passed to every signal function on every sample.
///
/// The mixer owns one `Universe` and rebinds [`name`](Self::name) and
/// [`state`](Self::state) per record before each invocation. Time fields
/// advance once per frame and are continuous across hot-reloads.
pub struct Universe {
    /// Elapsed seconds, monotonically increasing, continuous across reloads.
    pub t: f64,
    /// Fixed reciprocal of the sample rate.
    pub dt: f64,
    /// Frame index within the current render call.
    pub idx: u64,
    /// Sample rate in Hz, constant for the process lifetime.
    pub sr: u32,
    /// Listener coordinates, refreshed once per frame from the shared engine
    /// state.
    pub position: Position,
    name: Arc<str>,
    state: StateView,
}

impl Universe {
    pub(crate) fn new(sr: u32, state: StateView) -> Self {
        Self {
            t: 0.0,
            dt: 1.0 / f64::from(sr),
            idx: 0,
            sr,
            position: Position::default(),
            name: Arc::from(""),
            state,
        }
    }

    /// Identifier of the signal currently being evaluated. Read-only.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// The numeric state slice owned by the current signal.
    ///
    /// The underlying memory is stable per identifier across hot-reloads;
    /// the view object itself may be recreated per call and must not be
    /// retained beyond it.
    pub fn state(&self) -> &StateView {
        &self.state
    }

    pub(crate) fn bind(&mut self, name: Arc<str>, state: StateView) {
        self.name = name;
        self.state = state;
    }
}
