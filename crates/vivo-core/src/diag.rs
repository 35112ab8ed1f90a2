//! Non-real-time diagnostics channel for per-signal runtime faults.
//!
//! The render path must never log or block. When a signal panics or
//! produces an unusable frame, the mixer pushes a [`SignalFault`] onto a
//! bounded channel with `try_send`; a full queue drops the report rather
//! than stall the frame. The control path drains the receiver at leisure.

use std::sync::Arc;

use crossbeam_channel::{Receiver, Sender, TrySendError};

/// What went wrong inside one signal invocation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FaultKind {
    /// The signal function panicked. Its contribution was silence for the
    /// frame; it stays registered and runs again next frame.
    Panic,
    /// The signal returned NaN or infinity; the frame was dropped before it
    /// could poison the mix.
    NonFinite,
    /// The frame width neither matched the output channel count nor was
    /// mono-broadcastable.
    ChannelMismatch {
        /// Channel count the signal produced.
        got: usize,
        /// Engine output channel count.
        want: usize,
    },
}

/// A runtime fault from one signal invocation, queued off the render path.
#[derive(Debug, Clone)]
pub struct SignalFault {
    /// Identifier of the faulting signal.
    pub id: Arc<str>,
    /// Value of `Universe::idx` when the fault occurred.
    pub frame: u64,
    /// Fault category.
    pub kind: FaultKind,
}

/// Render-path side of the diagnostics channel.
#[derive(Clone)]
pub struct FaultSender {
    tx: Sender<SignalFault>,
}

impl FaultSender {
    /// Queue a fault without blocking. A full or disconnected channel drops
    /// the report.
    #[inline]
    pub fn report(&self, fault: SignalFault) {
        match self.tx.try_send(fault) {
            Ok(()) | Err(TrySendError::Full(_) | TrySendError::Disconnected(_)) => {}
        }
    }
}

/// Control-path side of the diagnostics channel.
pub type FaultReceiver = Receiver<SignalFault>;

/// Create a bounded fault channel.
pub fn fault_channel(capacity: usize) -> (FaultSender, FaultReceiver) {
    let (tx, rx) = crossbeam_channel::bounded(capacity);
    (FaultSender { tx }, rx)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reports_are_received_in_order() {
        let (tx, rx) = fault_channel(4);
        tx.report(SignalFault {
            id: Arc::from("a"),
            frame: 1,
            kind: FaultKind::Panic,
        });
        tx.report(SignalFault {
            id: Arc::from("b"),
            frame: 2,
            kind: FaultKind::NonFinite,
        });

        let first = rx.try_recv().unwrap();
        assert_eq!(&*first.id, "a");
        assert_eq!(first.kind, FaultKind::Panic);
        let second = rx.try_recv().unwrap();
        assert_eq!(second.frame, 2);
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn full_channel_drops_instead_of_blocking() {
        let (tx, rx) = fault_channel(1);
        for frame in 0..10 {
            tx.report(SignalFault {
                id: Arc::from("x"),
                frame,
                kind: FaultKind::Panic,
            });
        }
        assert_eq!(rx.try_recv().unwrap().frame, 0);
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn disconnected_receiver_is_silent() {
        let (tx, rx) = fault_channel(1);
        drop(rx);
        tx.report(SignalFault {
            id: Arc::from("x"),
            frame: 0,
            kind: FaultKind::Panic,
        });
    }
}
