//! Device Bridge
//!
//! The mixing side of the path to the hardware. Rendered blocks are queued
//! into the frame ring; the device callback drains the other end through a
//! [`RingReader`]. Sample rate and channel count are fixed for the bridge's
//! lifetime, so changing either means building a new bridge.

use crate::config::EngineConfig;
use crate::engine::ring::{frame_ring, RingReader, RingWriter};
use crate::error::Result;

/// Mixer-facing half of the output device.
pub struct DeviceBridge {
    writer: RingWriter,
    sample_rate: u32,
    num_channels: usize,
}

impl DeviceBridge {
    /// Create a bridge and the reader the device callback will own.
    pub fn new(sample_rate: u32, num_channels: usize, capacity_frames: usize) -> (Self, RingReader) {
        let (writer, reader) = frame_ring(capacity_frames, num_channels);
        tracing::debug!(
            sample_rate,
            channels = num_channels,
            capacity_frames,
            "device bridge created"
        );
        (
            Self {
                writer,
                sample_rate,
                num_channels,
            },
            reader,
        )
    }

    /// Create a bridge sized from the engine config.
    pub fn from_config(config: &EngineConfig) -> Result<(Self, RingReader)> {
        config.validate()?;
        Ok(Self::new(
            config.sample_rate,
            config.channels,
            config.ring_capacity_frames(),
        ))
    }

    /// Stream sample rate in Hz
    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    /// Interleaved output channels
    pub fn num_channels(&self) -> usize {
        self.num_channels
    }

    /// Queue a rendered block. False means the ring is full and nothing was
    /// written; the caller retries next block or drops it.
    pub fn queue(&mut self, samples: &[f32]) -> bool {
        self.writer.queue(samples)
    }

    /// Backlog in frames, for latency monitoring.
    pub fn num_queued_frames(&self) -> usize {
        self.writer.num_queued_frames()
    }

    /// Ring capacity in frames.
    pub fn capacity_frames(&self) -> usize {
        self.writer.capacity_frames()
    }

    /// Backlog converted to seconds.
    pub fn latency_secs(&self) -> f64 {
        self.num_queued_frames() as f64 / self.sample_rate as f64
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_properties_fixed_from_config() {
        let config = EngineConfig::default();
        let (bridge, reader) = DeviceBridge::from_config(&config).unwrap();
        assert_eq!(bridge.sample_rate(), 48_000);
        assert_eq!(bridge.num_channels(), 2);
        assert_eq!(bridge.capacity_frames(), 24_000);
        assert_eq!(reader.channels(), 2);
    }

    #[test]
    fn test_queue_reports_backlog() {
        let (mut bridge, mut reader) = DeviceBridge::new(1_000, 2, 100);
        assert!(bridge.queue(&[0.25; 100]));
        assert_eq!(bridge.num_queued_frames(), 50);
        assert_relative_eq!(bridge.latency_secs(), 0.05);

        let mut out = [0.0; 40];
        assert_eq!(reader.write(&mut out, 20, 20), 20);
        assert_eq!(bridge.num_queued_frames(), 30);
    }

    #[test]
    fn test_full_ring_rejects_block() {
        let (mut bridge, _reader) = DeviceBridge::new(1_000, 2, 4);
        assert!(bridge.queue(&[0.0; 8]));
        assert!(!bridge.queue(&[0.0; 2]));
    }
}
