//! Audio Frame Buffer
//!
//! Interleaved sample storage owned by a single graph node. The backing
//! vector only changes size when the block size or channel count does.

// ============================================================================
// Helper Functions
// ============================================================================

/// Convert decibels to a gain factor using the power-ratio exponent.
///
/// `10^(db/10)`: the gain and bus controller stages both scale by this,
/// so +10 dB multiplies the signal by ten.
#[inline]
pub fn db_to_factor(db: f32) -> f32 {
    10.0_f32.powf(db / 10.0)
}

/// Peak absolute sample value of an interleaved channel.
pub fn channel_peak(samples: &[f32], channel: usize, channels: usize) -> f32 {
    samples
        .iter()
        .skip(channel)
        .step_by(channels.max(1))
        .fold(0.0_f32, |peak, s| peak.max(s.abs()))
}

// ============================================================================
// AudioFrameBuffer
// ============================================================================

/// Fixed-length interleaved buffer of `frames * channels` samples.
#[derive(Debug, Clone, Default)]
pub struct AudioFrameBuffer {
    samples: Vec<f32>,
    frames: usize,
    channels: usize,
}

impl AudioFrameBuffer {
    /// Create a zeroed buffer.
    pub fn new(frames: usize, channels: usize) -> Self {
        Self {
            samples: vec![0.0; frames * channels],
            frames,
            channels,
        }
    }

    /// Make the buffer hold `frames * channels` samples.
    ///
    /// Returns true when the buffer was reallocated. Contents are zeroed on
    /// reallocation and preserved otherwise.
    pub fn ensure(&mut self, frames: usize, channels: usize) -> bool {
        if self.frames == frames && self.channels == channels {
            return false;
        }
        self.samples = vec![0.0; frames * channels];
        self.frames = frames;
        self.channels = channels;
        true
    }

    /// Number of frames
    pub fn frames(&self) -> usize {
        self.frames
    }

    /// Number of interleaved channels
    pub fn channels(&self) -> usize {
        self.channels
    }

    /// Total sample count
    pub fn len(&self) -> usize {
        self.samples.len()
    }

    /// True when the buffer holds no samples
    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    /// Interleaved samples
    pub fn as_slice(&self) -> &[f32] {
        &self.samples
    }

    /// Mutable interleaved samples
    pub fn as_mut_slice(&mut self) -> &mut [f32] {
        &mut self.samples
    }

    /// Zero every sample
    pub fn clear(&mut self) {
        self.samples.fill(0.0);
    }
}
