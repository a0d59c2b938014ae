//! cpal output stream
//!
//! Opens the platform output device and drains the frame ring from its
//! callback. Only built with the `cpal-output` feature.

use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};

use crate::config::EngineConfig;
use crate::engine::ring::RingReader;
use crate::error::{Result, SongrackError};

/// A running output stream. Audio stops when this is dropped.
pub struct OutputStream {
    _stream: cpal::Stream,
    device_name: String,
}

impl OutputStream {
    /// Name of the device the stream was opened on.
    pub fn device_name(&self) -> &str {
        &self.device_name
    }
}

fn device_name(device: &cpal::Device) -> String {
    device
        .description()
        .map(|d| d.name().to_string())
        .unwrap_or_else(|_| "unknown".to_string())
}

fn find_output_device(host: &cpal::Host, name: Option<&str>) -> Result<cpal::Device> {
    match name {
        Some(search) => {
            let search_lower = search.to_lowercase();
            let devices = host.output_devices().map_err(|e| SongrackError::Stream {
                reason: e.to_string(),
            })?;
            devices
                .into_iter()
                .find(|device| device_name(device).to_lowercase().contains(&search_lower))
                .ok_or_else(|| SongrackError::DeviceNotFound {
                    name: search.to_string(),
                })
        }
        None => host.default_output_device().ok_or(SongrackError::NoDevice),
    }
}

/// Open the configured output device and start pulling from `reader`.
///
/// Any failure here is fatal to playback and is returned to the caller.
pub fn open_output(config: &EngineConfig, mut reader: RingReader) -> Result<OutputStream> {
    let host = cpal::default_host();
    let device = find_output_device(&host, config.device.as_deref())?;
    let name = device_name(&device);

    let stream_config = cpal::StreamConfig {
        channels: config.channels as u16,
        sample_rate: config.sample_rate,
        buffer_size: cpal::BufferSize::Fixed(config.block_frames as u32),
    };

    let channels = config.channels;
    let stream = device
        .build_output_stream(
            &stream_config,
            move |data: &mut [f32], _: &cpal::OutputCallbackInfo| {
                let frames = data.len() / channels;
                reader.write(data, frames, frames);
            },
            move |err| {
                tracing::error!(error = %err, "output stream error");
            },
            None,
        )
        .map_err(|e| SongrackError::Stream {
            reason: e.to_string(),
        })?;

    stream.play().map_err(|e| SongrackError::Stream {
        reason: e.to_string(),
    })?;
    tracing::info!(
        device = %name,
        channels = config.channels,
        sample_rate = config.sample_rate,
        "output stream started"
    );

    Ok(OutputStream {
        _stream: stream,
        device_name: name,
    })
}
