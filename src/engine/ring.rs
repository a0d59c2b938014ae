//! Frame Ring Buffer
//!
//! Single-producer/single-consumer ring of interleaved frames between the
//! mixer thread (producer) and the device callback (consumer). Built on
//! `rtrb`, so neither side locks.

use rtrb::{Consumer, Producer, RingBuffer};

/// Create a ring holding `capacity_frames` frames of `channels` samples.
pub fn frame_ring(capacity_frames: usize, channels: usize) -> (RingWriter, RingReader) {
    let channels = channels.max(1);
    let (producer, consumer) = RingBuffer::<f32>::new(capacity_frames * channels);
    (
        RingWriter {
            producer,
            channels,
        },
        RingReader {
            consumer,
            channels,
        },
    )
}

// ============================================================================
// Producer side
// ============================================================================

/// Mixer-side handle: queues rendered frames.
pub struct RingWriter {
    producer: Producer<f32>,
    channels: usize,
}

impl RingWriter {
    /// Append interleaved frames.
    ///
    /// All or nothing: returns false without writing anything when the ring
    /// cannot take the whole buffer.
    pub fn queue(&mut self, samples: &[f32]) -> bool {
        let Ok(mut chunk) = self.producer.write_chunk(samples.len()) else {
            return false;
        };
        let (first, second) = chunk.as_mut_slices();
        let split = first.len();
        first.copy_from_slice(&samples[..split]);
        second.copy_from_slice(&samples[split..]);
        chunk.commit_all();
        true
    }

    /// Frames written but not yet consumed.
    pub fn num_queued_frames(&self) -> usize {
        (self.capacity_frames() * self.channels - self.producer.slots()) / self.channels
    }

    /// Frames that can still be queued.
    pub fn free_frames(&self) -> usize {
        self.producer.slots() / self.channels
    }

    /// Ring capacity in frames.
    pub fn capacity_frames(&self) -> usize {
        self.producer.buffer().capacity() / self.channels
    }

    /// Interleaved channel count.
    pub fn channels(&self) -> usize {
        self.channels
    }
}

// ============================================================================
// Consumer side
// ============================================================================

/// Device-side handle: drains frames into the driver buffer.
pub struct RingReader {
    consumer: Consumer<f32>,
    channels: usize,
}

impl RingReader {
    /// Fill `out` from the ring.
    ///
    /// Copies up to `max_frames` queued frames (bounded by the size of `out`)
    /// and zero-fills the rest of `out` on underrun. At least `min_frames`
    /// frames of `out` are always written. Never blocks or allocates.
    ///
    /// Returns the number of real frames drained.
    pub fn write(&mut self, out: &mut [f32], min_frames: usize, max_frames: usize) -> usize {
        let out_frames = out.len() / self.channels;
        let wanted = max_frames.max(min_frames).min(out_frames);
        let available = self.consumer.slots() / self.channels;
        let frames = wanted.min(available);
        let samples = frames * self.channels;

        if samples > 0 {
            if let Ok(chunk) = self.consumer.read_chunk(samples) {
                let (first, second) = chunk.as_slices();
                out[..first.len()].copy_from_slice(first);
                out[first.len()..samples].copy_from_slice(second);
                chunk.commit_all();
            }
        }

        out[samples..].fill(0.0);
        frames
    }

    /// Frames available to read.
    pub fn num_queued_frames(&self) -> usize {
        self.consumer.slots() / self.channels
    }

    /// Interleaved channel count.
    pub fn channels(&self) -> usize {
        self.channels
    }
}
