//! Turnkey hosting: core engine + render thread + hardware stream.
//!
//! [`LiveEngine`] queries the output device for its native sample rate and
//! channel count, builds the core engine to match, and runs the render loop
//! on a dedicated thread that fills the ring buffer. The cpal callback pulls
//! from the other end. Dropping the handle stops the stream and joins the
//! render thread.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread::JoinHandle;
use std::time::Duration;

use cpal::traits::DeviceTrait;

use vivo_core::{
    Engine, EngineConfig, FaultReceiver, Frame, MAX_CHANNELS, Position, ReloadSession, RingMonitor,
    SignalBuilder, SignalFault, Universe, fault_channel, ring_buffer,
};

use crate::stream::{OutputStream, resolve_output_device};
use crate::{Error, Result};

/// Options for [`LiveEngine::start`].
#[derive(Debug, Clone)]
pub struct LiveOptions {
    /// Output device selector: index, exact name, or partial name.
    /// `None` uses the system default.
    pub device: Option<String>,
    /// State arena capacity in f32 cells.
    pub arena_capacity: usize,
    /// Ring buffer size in frames (rounded up to a power of two).
    pub ring_frames: usize,
    /// Requested hardware period in frames.
    pub buffer_size: u32,
    /// Capacity of the bounded fault queue.
    pub fault_capacity: usize,
}

impl Default for LiveOptions {
    fn default() -> Self {
        Self {
            device: None,
            arena_capacity: 4096,
            ring_frames: 2048,
            buffer_size: 256,
            fault_capacity: 256,
        }
    }
}

/// A live engine attached to an output device.
///
/// The control-path API ([`register`](Self::register),
/// [`begin_reload`](Self::begin_reload), [`unregister`](Self::unregister))
/// runs on the caller's thread while the render thread and the hardware
/// callback keep producing audio.
pub struct LiveEngine {
    engine: Engine,
    faults: FaultReceiver,
    monitor: RingMonitor,
    stop: Arc<AtomicBool>,
    render: Option<JoinHandle<()>>,
    stream: OutputStream,
}

impl LiveEngine {
    /// Open the output device, build the engine at the device's native
    /// rate, and start rendering.
    pub fn start(options: LiveOptions) -> Result<Self> {
        let host = cpal::default_host();
        let (device, device_name) = resolve_output_device(&host, options.device.as_deref())?;

        let device_config = device
            .default_output_config()
            .map_err(|e| Error::Stream(e.to_string()))?;
        if device_config.sample_format() != cpal::SampleFormat::F32 {
            return Err(Error::UnsupportedFormat(format!(
                "{:?}",
                device_config.sample_format()
            )));
        }

        let sample_rate = device_config.sample_rate();
        let device_channels = device_config.channels();
        let channels = usize::from(device_channels).clamp(1, MAX_CHANNELS);

        let engine = Engine::new(EngineConfig {
            sample_rate,
            channels,
            arena_capacity: options.arena_capacity,
            ring_frames: options.ring_frames,
        })?;

        let (fault_tx, fault_rx) = fault_channel(options.fault_capacity);
        let (mut producer, consumer) = ring_buffer(options.ring_frames, channels);
        let monitor = consumer.monitor();
        let mut mixer = engine.mixer(fault_tx);

        // When the ring is full, sleep for a quarter of its span so the
        // callback always finds frames without the producer spinning.
        let backoff =
            Duration::from_secs_f64(producer.capacity() as f64 / (4.0 * f64::from(sample_rate)));
        let stop = Arc::new(AtomicBool::new(false));
        let render_stop = Arc::clone(&stop);
        let render = std::thread::Builder::new()
            .name("vivo-render".into())
            .spawn(move || {
                tracing::debug!("render thread started");
                while !render_stop.load(Ordering::Relaxed) {
                    if mixer.render_into(&mut producer) == 0 {
                        std::thread::sleep(backoff);
                    }
                }
                tracing::debug!("render thread stopped");
            })
            .map_err(|e| Error::Stream(e.to_string()))?;

        let stream = OutputStream::build(
            &device,
            device_name,
            sample_rate,
            device_channels,
            options.buffer_size,
            consumer,
        )?;

        Ok(Self {
            engine,
            faults: fault_rx,
            monitor,
            stop,
            render: Some(render),
            stream,
        })
    }

    /// Register or replace a single signal. See [`Engine::register`].
    pub fn register<B, F>(&mut self, id: &str, state_len: usize, build: B) -> Result<()>
    where
        B: FnOnce(&mut SignalBuilder<'_>) -> F,
        F: Fn(&mut Universe) -> Frame + Send + Sync + 'static,
    {
        self.engine.register(id, state_len, build)?;
        Ok(())
    }

    /// Remove a signal. Returns `false` if the id was not registered.
    pub fn unregister(&mut self, id: &str) -> bool {
        self.engine.unregister(id)
    }

    /// Start a full registration pass. See [`ReloadSession`].
    pub fn begin_reload(&mut self) -> ReloadSession<'_> {
        self.engine.begin_reload()
    }

    /// Move the listener position.
    pub fn set_position(&self, position: Position) {
        self.engine.shared().set_position(position);
    }

    /// Drain queued per-signal faults.
    pub fn take_faults(&self) -> Vec<SignalFault> {
        self.faults.try_iter().collect()
    }

    /// Number of short reads the hardware callback has suffered.
    pub fn underruns(&self) -> u64 {
        self.monitor.underruns()
    }

    /// Number of short writes the render thread has absorbed.
    pub fn overruns(&self) -> u64 {
        self.monitor.overruns()
    }

    /// Frames currently buffered between render thread and callback.
    pub fn buffered_frames(&self) -> usize {
        self.monitor.occupied_frames()
    }

    /// The engine sample rate (the device's native rate).
    pub fn sample_rate(&self) -> u32 {
        self.engine.config().sample_rate
    }

    /// The engine channel count.
    pub fn channels(&self) -> usize {
        self.engine.config().channels
    }

    /// Name of the output device in use.
    pub fn device_name(&self) -> &str {
        self.stream.device_name()
    }

    /// The underlying control-path engine.
    pub fn engine(&self) -> &Engine {
        &self.engine
    }
}

impl Drop for LiveEngine {
    fn drop(&mut self) {
        self.stop.store(true, Ordering::Relaxed);
        if let Some(handle) = self.render.take() {
            let _ = handle.join();
        }
    }
}
