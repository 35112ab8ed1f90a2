//! The render loop: evaluate every registered signal once per frame, mix,
//! soft-limit, and hand frames to the ring buffer.
//!
//! Real-time constraints: no heap allocation, no locks, no logging. A
//! panicking signal is contained with `catch_unwind` and contributes
//! silence for the frame; the fault goes to the diagnostics channel via a
//! non-blocking send. Runtime cost is linear in registry size.

use std::panic::{AssertUnwindSafe, catch_unwind};

use libm::tanhf;

use crate::config::EngineConfig;
use crate::context::Universe;
use crate::diag::{FaultKind, FaultSender, SignalFault};
use crate::engine::EngineShared;
use crate::ring::RingProducer;
use crate::signal::{Frame, MAX_CHANNELS};

use crate::arena::ArenaSlice;

/// The real-time producer: renders the committed registry frame by frame.
///
/// One mixer per engine; it owns the [`Universe`] whose time fields advance
/// monotonically across hot-reloads.
pub struct Mixer {
    shared: EngineShared,
    faults: FaultSender,
    universe: Universe,
    channels: usize,
}

impl Mixer {
    pub(crate) fn new(shared: EngineShared, config: &EngineConfig, faults: FaultSender) -> Self {
        let universe = Universe::new(config.sample_rate, shared.view(ArenaSlice::EMPTY));
        Self {
            shared,
            faults,
            universe,
            channels: config.channels,
        }
    }

    /// Output channel count.
    pub fn channels(&self) -> usize {
        self.channels
    }

    /// Elapsed rendered time in seconds.
    pub fn elapsed(&self) -> f64 {
        self.universe.t
    }

    /// Render one output frame from the currently committed registry.
    ///
    /// For each record: bind the record's id and state view into the
    /// universe context, invoke the function, and accumulate its result.
    /// Mono results broadcast to all channels; wider results must match the
    /// output channel count (a mismatch is reported, not mixed). The summed
    /// channels pass through a hyperbolic-tangent limiter, trading harmonic
    /// coloration for hard amplitude safety: output stays within [-1, 1]
    /// no matter how many signals are summed.
    pub fn render_frame(&mut self) -> Frame {
        let registry = self.shared.load_registry();
        self.universe.position = self.shared.position();

        let mut acc = [0.0f32; MAX_CHANNELS];
        for record in &registry.records {
            self.universe
                .bind(record.id.clone(), self.shared.view(record.slice));

            let func = &*record.func;
            let universe = &mut self.universe;
            let result = catch_unwind(AssertUnwindSafe(|| func(universe)));

            match result {
                Err(_) => self.faults.report(SignalFault {
                    id: record.id.clone(),
                    frame: self.universe.idx,
                    kind: FaultKind::Panic,
                }),
                Ok(frame) if !frame.is_finite() => self.faults.report(SignalFault {
                    id: record.id.clone(),
                    frame: self.universe.idx,
                    kind: FaultKind::NonFinite,
                }),
                Ok(frame) if frame.channels() == 1 => {
                    let sample = frame.sample(0);
                    for channel in acc.iter_mut().take(self.channels) {
                        *channel += sample;
                    }
                }
                Ok(frame) if frame.channels() == self.channels => {
                    for (channel, sample) in acc.iter_mut().zip(frame.as_slice()) {
                        *channel += sample;
                    }
                }
                Ok(frame) => self.faults.report(SignalFault {
                    id: record.id.clone(),
                    frame: self.universe.idx,
                    kind: FaultKind::ChannelMismatch {
                        got: frame.channels(),
                        want: self.channels,
                    },
                }),
            }
        }

        for channel in acc.iter_mut().take(self.channels) {
            *channel = tanhf(*channel);
        }

        self.universe.t += self.universe.dt;
        self.universe.idx += 1;
        self.shared.bump_render_generation();

        Frame::from_slice(&acc[..self.channels])
    }

    /// Fill the ring buffer with as many frames as it currently has room
    /// for, and return the count written.
    ///
    /// `Universe::idx` restarts at zero for each call. A return of zero
    /// means the ring is full; the caller should yield (cooperative
    /// back-off) rather than spin, and never overwrite unread frames.
    pub fn render_into(&mut self, producer: &mut RingProducer) -> usize {
        debug_assert_eq!(producer.channels(), self.channels);
        let free = producer.free_frames();
        self.universe.idx = 0;
        for _ in 0..free {
            let frame = self.render_frame();
            producer.write(frame.as_slice());
        }
        free
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::diag::fault_channel;
    use crate::engine::Engine;
    use crate::ring::ring_buffer;

    fn engine(channels: usize) -> Engine {
        Engine::new(EngineConfig {
            channels,
            arena_capacity: 64,
            ..Default::default()
        })
        .unwrap()
    }

    #[test]
    fn empty_registry_renders_silence() {
        let engine = engine(2);
        let (tx, _rx) = fault_channel(8);
        let mut mixer = engine.mixer(tx);

        let frame = mixer.render_frame();
        assert_eq!(frame.as_slice(), &[0.0, 0.0]);
        assert!((mixer.elapsed() - 1.0 / 48000.0).abs() < 1e-12);
    }

    #[test]
    fn limiter_bounds_hot_mix() {
        let mut engine = engine(1);
        for id in ["a", "b", "c"] {
            engine
                .register(id, 0, |_| |_u: &mut Universe| Frame::mono(0.9))
                .unwrap();
        }
        let (tx, _rx) = fault_channel(8);
        let mut mixer = engine.mixer(tx);

        let frame = mixer.render_frame();
        let out = frame.sample(0);
        // tanh(2.7), strictly inside the unit range and below the raw sum.
        assert!(out > 0.0 && out < 1.0);
        assert!((out - libm::tanhf(2.7)).abs() < 1e-6);
    }

    #[test]
    fn mono_broadcasts_to_all_channels() {
        let mut engine = engine(2);
        engine
            .register("m", 0, |_| |_u: &mut Universe| Frame::mono(0.5))
            .unwrap();
        let (tx, _rx) = fault_channel(8);
        let mut mixer = engine.mixer(tx);

        let frame = mixer.render_frame();
        assert_eq!(frame.sample(0), frame.sample(1));
    }

    #[test]
    fn panicking_signal_is_silenced_and_reported() {
        let mut engine = engine(1);
        engine
            .register("bad", 0, |_| {
                |_u: &mut Universe| -> Frame { panic!("boom") }
            })
            .unwrap();
        engine
            .register("good", 0, |_| |_u: &mut Universe| Frame::mono(0.25))
            .unwrap();

        let (tx, rx) = fault_channel(8);
        let mut mixer = engine.mixer(tx);

        // Silence the default hook's stderr noise for this test.
        let prev_hook = std::panic::take_hook();
        std::panic::set_hook(Box::new(|_| {}));
        let frame = mixer.render_frame();
        std::panic::set_hook(prev_hook);

        assert!((frame.sample(0) - libm::tanhf(0.25)).abs() < 1e-6);
        let fault = rx.try_recv().unwrap();
        assert_eq!(&*fault.id, "bad");
        assert_eq!(fault.kind, FaultKind::Panic);

        // Still registered: it gets another chance (and faults again).
        std::panic::set_hook(Box::new(|_| {}));
        mixer.render_frame();
        let _ = std::panic::take_hook();
        assert!(rx.try_recv().is_ok());
    }

    #[test]
    fn non_finite_output_is_dropped() {
        let mut engine = engine(1);
        engine
            .register("nan", 0, |_| |_u: &mut Universe| Frame::mono(f32::NAN))
            .unwrap();
        let (tx, rx) = fault_channel(8);
        let mut mixer = engine.mixer(tx);

        let frame = mixer.render_frame();
        assert_eq!(frame.sample(0), 0.0);
        assert_eq!(rx.try_recv().unwrap().kind, FaultKind::NonFinite);
    }

    #[test]
    fn channel_mismatch_is_reported_not_mixed() {
        let mut engine = engine(2);
        engine
            .register("quad", 0, |_| {
                |_u: &mut Universe| Frame::from_slice(&[0.1, 0.2, 0.3, 0.4])
            })
            .unwrap();
        let (tx, rx) = fault_channel(8);
        let mut mixer = engine.mixer(tx);

        let frame = mixer.render_frame();
        assert_eq!(frame.as_slice(), &[0.0, 0.0]);
        assert_eq!(
            rx.try_recv().unwrap().kind,
            FaultKind::ChannelMismatch { got: 4, want: 2 }
        );
    }

    #[test]
    fn state_persists_between_frames() {
        let mut engine = engine(1);
        engine
            .register("counter", 1, |_| {
                |u: &mut Universe| {
                    let n = u.state().get(0) + 1.0;
                    u.state().set(0, n);
                    Frame::mono(0.0)
                }
            })
            .unwrap();
        let (tx, _rx) = fault_channel(8);
        let mut mixer = engine.mixer(tx);

        for _ in 0..5 {
            mixer.render_frame();
        }
        let slice = engine.signal_slice("counter").unwrap();
        assert_eq!(engine.shared().view(slice).get(0), 5.0);
    }

    #[test]
    fn render_into_respects_ring_capacity() {
        let mut engine = engine(1);
        engine
            .register("c", 0, |_| |_u: &mut Universe| Frame::mono(0.1))
            .unwrap();
        let (tx, _rx) = fault_channel(8);
        let mut mixer = engine.mixer(tx);
        let (mut producer, mut consumer) = ring_buffer(16, 1);

        assert_eq!(mixer.render_into(&mut producer), 16);
        assert_eq!(mixer.render_into(&mut producer), 0);

        let mut dst = [0.0f32; 8];
        consumer.read(&mut dst);
        assert_eq!(mixer.render_into(&mut producer), 8);
    }

    #[test]
    fn render_generation_advances_per_frame() {
        let engine = engine(1);
        let (tx, _rx) = fault_channel(8);
        let mut mixer = engine.mixer(tx);
        let shared = engine.shared();

        assert_eq!(shared.render_generation(), 0);
        mixer.render_frame();
        mixer.render_frame();
        assert_eq!(shared.render_generation(), 2);
    }
}
