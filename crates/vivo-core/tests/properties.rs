//! Property-based tests for the engine invariants.
//!
//! Covers limiter output bounds, arena slice disjointness under arbitrary
//! allocate/release sequences, and ring buffer FIFO integrity under
//! arbitrary chunking, using proptest for randomized input generation.

use proptest::prelude::*;
use vivo_core::{
    ArenaSlice, Engine, EngineConfig, Frame, StateArena, Universe, fault_channel, ring_buffer,
};

fn overlaps(a: ArenaSlice, b: ArenaSlice) -> bool {
    a.offset() < b.offset() + b.len() && b.offset() < a.offset() + a.len()
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(200))]

    /// For any set of signals producing constant values in [-1, 1], the
    /// mixed frame is finite and stays within [-1, 1] on every channel.
    #[test]
    fn mixed_output_is_bounded(
        values in prop::collection::vec(-1.0f32..=1.0f32, 1..=12),
        channels in 1usize..=4,
    ) {
        let mut engine = Engine::new(EngineConfig {
            channels,
            ..Default::default()
        }).unwrap();

        let mut pass = engine.begin_reload();
        for (n, value) in values.iter().copied().enumerate() {
            pass.signal(&format!("sig{n}"), 0, move |_| {
                move |_u: &mut Universe| Frame::mono(value)
            })?;
        }
        pass.commit();

        let (tx, _rx) = fault_channel(16);
        let mut mixer = engine.mixer(tx);
        let frame = mixer.render_frame();

        for c in 0..channels {
            let out = frame.sample(c);
            prop_assert!(out.is_finite());
            prop_assert!(
                (-1.0..=1.0).contains(&out),
                "channel {} out of range: {} (inputs {:?})",
                c, out, values
            );
        }
    }

    /// Under any sequence of allocations and releases, live slices stay
    /// pairwise disjoint, within capacity, and the allocated count matches
    /// the sum of live lengths.
    #[test]
    fn arena_slices_stay_disjoint(
        ops in prop::collection::vec((1usize..=8, prop::bool::ANY), 1..=48),
    ) {
        let capacity = 64;
        let mut arena = StateArena::new(capacity);
        let mut live: Vec<ArenaSlice> = Vec::new();

        for (len, release) in ops {
            if release && !live.is_empty() {
                let slice = live.swap_remove(len % live.len());
                arena.release(slice);
            } else if let Ok(slice) = arena.allocate(len) {
                live.push(slice);
            }

            let total: usize = live.iter().map(|s| s.len()).sum();
            prop_assert_eq!(arena.allocated(), total);
            prop_assert!(total <= capacity);
            prop_assert!(live.iter().all(|s| s.offset() + s.len() <= capacity));
            for (i, a) in live.iter().enumerate() {
                for b in &live[i + 1..] {
                    prop_assert!(
                        !overlaps(*a, *b),
                        "overlap between {:?} and {:?}", a, b
                    );
                }
            }
        }
    }

    /// Whatever chunk sizes the producer and consumer use, samples come out
    /// in the order they went in, with nothing lost or duplicated.
    #[test]
    fn ring_preserves_fifo_order(
        write_chunks in prop::collection::vec(1usize..=24, 1..=40),
        read_chunk in 1usize..=24,
    ) {
        let (mut producer, mut consumer) = ring_buffer(32, 1);
        let mut next_in = 0.0f32;
        let mut next_out = 0.0f32;

        for chunk in write_chunks {
            let samples: Vec<f32> =
                (0..chunk).map(|i| next_in + i as f32).collect();
            let written = producer.write(&samples);
            prop_assert!(written <= chunk);
            next_in += written as f32;

            let mut dst = vec![0.0f32; read_chunk];
            let got = consumer.read(&mut dst);
            for &sample in &dst[..got] {
                prop_assert_eq!(sample, next_out);
                next_out += 1.0;
            }
        }

        // Drain: every written sample comes back exactly once.
        while next_out < next_in {
            let mut dst = vec![0.0f32; read_chunk];
            let got = consumer.read(&mut dst);
            prop_assert!(got > 0);
            for &sample in &dst[..got] {
                prop_assert_eq!(sample, next_out);
                next_out += 1.0;
            }
        }
    }

    /// Registering any sequence of ids across two reload passes leaves the
    /// registry slices pairwise disjoint, whatever was reused or released.
    #[test]
    fn reload_keeps_registry_slices_disjoint(
        first in prop::collection::vec(1usize..=6, 1..=6),
        second in prop::collection::vec(1usize..=6, 1..=6),
    ) {
        let mut engine = Engine::new(EngineConfig {
            arena_capacity: 256,
            ..Default::default()
        }).unwrap();

        let mut pass = engine.begin_reload();
        for (n, len) in first.iter().copied().enumerate() {
            pass.signal(&format!("s{n}"), len, |_| {
                |_u: &mut Universe| Frame::mono(0.0)
            })?;
        }
        pass.commit();

        // Second pass keeps even-numbered ids and adds fresh ones; odd ids
        // depart and their slices become reusable.
        let mut pass = engine.begin_reload();
        for (n, len) in second.iter().copied().enumerate() {
            let id = if n % 2 == 0 {
                format!("s{n}")
            } else {
                format!("t{n}")
            };
            pass.signal(&id, len, |_| |_u: &mut Universe| Frame::mono(0.0))?;
        }
        pass.commit();
        engine.reclaim();

        let registry = engine.registry();
        let slices: Vec<ArenaSlice> =
            registry.ids().filter_map(|id| engine.signal_slice(id)).collect();
        prop_assert_eq!(slices.len(), registry.len());
        for (i, a) in slices.iter().enumerate() {
            for b in &slices[i + 1..] {
                if !a.is_empty() && !b.is_empty() {
                    prop_assert!(!overlaps(*a, *b));
                }
            }
        }
    }
}
