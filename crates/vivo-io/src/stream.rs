//! Output device discovery and the cpal pull stream.
//!
//! The hardware callback owns the consumer side of the engine's ring
//! buffer: each invocation drains as many frames as the device asks for,
//! and the consumer's zero-fill underrun policy means the callback never
//! blocks and never plays garbage. Channel-count mismatches between the
//! engine and the device are adapted frame by frame in the callback.

use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use cpal::{Device, Host, Stream};

use vivo_core::RingConsumer;

use crate::{Error, Result};

/// Extract device name via `description()` (cpal 0.17+).
pub(crate) fn device_name(device: &Device) -> std::result::Result<String, cpal::DeviceNameError> {
    device.description().map(|d| d.name().to_string())
}

/// Audio output device information.
#[derive(Debug, Clone)]
pub struct AudioDevice {
    /// Human-readable device name.
    pub name: String,
    /// Default sample rate in Hz.
    pub default_sample_rate: u32,
    /// Default channel count.
    pub default_channels: u16,
}

fn describe(device: &Device) -> Option<AudioDevice> {
    let name = device_name(device).ok()?;
    let config = device.default_output_config().ok()?;
    Some(AudioDevice {
        name,
        default_sample_rate: config.sample_rate(),
        default_channels: config.channels(),
    })
}

/// List all available output devices.
pub fn list_output_devices() -> Result<Vec<AudioDevice>> {
    let host = cpal::default_host();
    let mut devices = Vec::new();
    if let Ok(outputs) = host.output_devices() {
        for device in outputs {
            if let Some(info) = describe(&device) {
                devices.push(info);
            }
        }
    }
    Ok(devices)
}

/// Get the default output device info, if any.
pub fn default_output_device() -> Option<AudioDevice> {
    let host = cpal::default_host();
    host.default_output_device().as_ref().and_then(describe)
}

/// Find an output device by exact name, partial name, or index.
pub fn find_output_device(name_or_index: &str) -> Result<AudioDevice> {
    let (device, _) = resolve_output_device(&cpal::default_host(), Some(name_or_index))?;
    describe(&device).ok_or_else(|| Error::DeviceNotFound(name_or_index.to_string()))
}

/// Resolve the cpal device behind a selector: `None` means the system
/// default, otherwise a numeric index, an exact name, or a case-insensitive
/// partial name.
pub(crate) fn resolve_output_device(
    host: &Host,
    selector: Option<&str>,
) -> Result<(Device, String)> {
    let Some(selector) = selector else {
        let device = host.default_output_device().ok_or(Error::NoDevice)?;
        let name = device_name(&device).unwrap_or_else(|_| "<unknown>".to_string());
        return Ok((device, name));
    };

    let devices: Vec<Device> = host
        .output_devices()
        .map_err(|e| Error::Stream(e.to_string()))?
        .collect();

    if let Ok(index) = selector.parse::<usize>() {
        let device = devices.get(index).cloned().ok_or_else(|| {
            Error::DeviceNotFound(format!(
                "output device index {} (only {} devices available)",
                index,
                devices.len()
            ))
        })?;
        let name = device_name(&device).unwrap_or_else(|_| "<unknown>".to_string());
        return Ok((device, name));
    }

    for device in &devices {
        if let Ok(name) = device_name(device) {
            if name == selector {
                return Ok((device.clone(), name));
            }
        }
    }

    let search = selector.to_lowercase();
    for device in &devices {
        if let Ok(name) = device_name(device) {
            if name.to_lowercase().contains(&search) {
                return Ok((device.clone(), name));
            }
        }
    }

    Err(Error::DeviceNotFound(format!(
        "no output device matching '{selector}'"
    )))
}

/// A running cpal output stream draining a ring buffer consumer.
///
/// The stream plays from construction until drop. The callback reads
/// engine-channel frames from the ring and adapts them to the device's
/// channel count: mono broadcasts, extra device channels are silenced,
/// extra engine channels are dropped.
pub struct OutputStream {
    _stream: Stream,
    device_name: String,
    sample_rate: u32,
    device_channels: u16,
}

impl OutputStream {
    /// Open an output stream on the selected device (`None` for the system
    /// default) at the device's native sample rate and channel count.
    ///
    /// `consumer` carries the engine's channel count; `buffer_size` is the
    /// requested hardware period in frames.
    pub fn open(
        selector: Option<&str>,
        buffer_size: u32,
        consumer: RingConsumer,
    ) -> Result<Self> {
        let host = cpal::default_host();
        let (device, name) = resolve_output_device(&host, selector)?;
        let config = device
            .default_output_config()
            .map_err(|e| Error::Stream(e.to_string()))?;
        Self::build(
            &device,
            name,
            config.sample_rate(),
            config.channels(),
            buffer_size,
            consumer,
        )
    }

    pub(crate) fn build(
        device: &Device,
        device_name: String,
        sample_rate: u32,
        device_channels: u16,
        buffer_size: u32,
        mut consumer: RingConsumer,
    ) -> Result<Self> {
        let stream_config = cpal::StreamConfig {
            channels: device_channels,
            sample_rate,
            buffer_size: cpal::BufferSize::Fixed(buffer_size),
        };

        let engine_channels = consumer.channels();
        // Scratch holds one hardware period of engine-channel frames when
        // adaptation is needed; grown in the callback only if the device
        // asks for a larger period than requested.
        let mut scratch: Vec<f32> = Vec::new();

        let stream = device
            .build_output_stream(
                &stream_config,
                move |data: &mut [f32], _: &cpal::OutputCallbackInfo| {
                    let device_channels = usize::from(device_channels);
                    if engine_channels == device_channels {
                        consumer.read(data);
                        return;
                    }
                    let frames = data.len() / device_channels;
                    let needed = frames * engine_channels;
                    if scratch.len() < needed {
                        scratch.resize(needed, 0.0);
                    }
                    consumer.read(&mut scratch[..needed]);
                    adapt_channels(
                        &scratch[..needed],
                        engine_channels,
                        data,
                        device_channels,
                    );
                },
                move |err| {
                    tracing::error!(error = %err, "output stream error");
                },
                None,
            )
            .map_err(|e| Error::Stream(e.to_string()))?;

        stream.play().map_err(|e| Error::Stream(e.to_string()))?;
        tracing::info!(
            device = %device_name,
            channels = device_channels,
            sample_rate,
            "output stream started"
        );

        Ok(Self {
            _stream: stream,
            device_name,
            sample_rate,
            device_channels,
        })
    }

    /// Name of the device the stream plays on.
    pub fn device_name(&self) -> &str {
        &self.device_name
    }

    /// Stream sample rate in Hz.
    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    /// Device channel count.
    pub fn channels(&self) -> u16 {
        self.device_channels
    }
}

/// Re-layout interleaved frames from the engine's channel count to the
/// device's. Mono broadcasts to every device channel; otherwise channels
/// are copied positionally, silencing device channels the engine lacks.
fn adapt_channels(src: &[f32], src_channels: usize, dst: &mut [f32], dst_channels: usize) {
    let frames = src.len() / src_channels;
    debug_assert_eq!(dst.len(), frames * dst_channels);

    if src_channels == 1 {
        for f in 0..frames {
            let sample = src[f];
            dst[f * dst_channels..(f + 1) * dst_channels].fill(sample);
        }
        return;
    }

    let copy = src_channels.min(dst_channels);
    for f in 0..frames {
        let src_base = f * src_channels;
        let dst_base = f * dst_channels;
        dst[dst_base..dst_base + copy].copy_from_slice(&src[src_base..src_base + copy]);
        dst[dst_base + copy..dst_base + dst_channels].fill(0.0);
    }
}
