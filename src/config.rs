//! Engine configuration
//!
//! Loaded from TOML. Every field has a default, so an empty file is a
//! valid config.

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::{Result, SongrackError};

// ============================================================================
// Constants
// ============================================================================

/// Default output sample rate in Hz
pub const DEFAULT_SAMPLE_RATE: u32 = 48_000;

/// Frames rendered per graph evaluation
pub const DEFAULT_BLOCK_FRAMES: usize = 256;

/// Ring buffer length in seconds of audio
pub const DEFAULT_RING_SECONDS: f32 = 0.5;

/// Default number of undo steps kept (0 = unlimited)
pub const DEFAULT_MAX_UNDO_LEVELS: usize = 100;

// ============================================================================
// EngineConfig
// ============================================================================

/// Configuration for the audio engine and the initial song layout.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Output sample rate in Hz
    pub sample_rate: u32,
    /// Interleaved output channels. The DSP units are stereo.
    pub channels: usize,
    /// Frames per render block
    pub block_frames: usize,
    /// Ring buffer capacity, in seconds of audio
    pub ring_seconds: f32,
    /// Undo history depth, 0 keeps everything
    pub max_undo_levels: usize,
    /// Substring of the output device name; default device when unset
    pub device: Option<String>,
    /// Initial song tempo in BPM
    pub tempo: f32,
    /// Initial song length in bars
    pub song_length: usize,
    /// Patterns allocated per channel
    pub max_patterns: usize,
    /// Channels created with a new song
    pub initial_channels: usize,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            sample_rate: DEFAULT_SAMPLE_RATE,
            channels: 2,
            block_frames: DEFAULT_BLOCK_FRAMES,
            ring_seconds: DEFAULT_RING_SECONDS,
            max_undo_levels: DEFAULT_MAX_UNDO_LEVELS,
            device: None,
            tempo: 120.0,
            song_length: 4,
            max_patterns: 4,
            initial_channels: 1,
        }
    }
}

impl EngineConfig {
    /// Load and validate a config from a TOML file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let content = std::fs::read_to_string(path.as_ref())?;
        Self::from_toml(&content)
    }

    /// Parse and validate a config from a TOML string.
    pub fn from_toml(toml_str: &str) -> Result<Self> {
        let config: EngineConfig = toml::from_str(toml_str)?;
        config.validate()?;
        Ok(config)
    }

    /// Serialize the config to pretty TOML.
    pub fn to_toml(&self) -> Result<String> {
        Ok(toml::to_string_pretty(self)?)
    }

    /// Reject settings the engine cannot run with.
    pub fn validate(&self) -> Result<()> {
        if self.sample_rate == 0 {
            return Err(invalid("sample_rate must be greater than zero"));
        }
        if self.channels != 2 {
            return Err(invalid("only stereo output (channels = 2) is supported"));
        }
        if self.block_frames == 0 {
            return Err(invalid("block_frames must be greater than zero"));
        }
        if !(self.ring_seconds > 0.0) {
            return Err(invalid("ring_seconds must be positive"));
        }
        if self.ring_capacity_frames() < self.block_frames {
            return Err(invalid("ring buffer must hold at least one block"));
        }
        if !(self.tempo > 0.0) {
            return Err(invalid("tempo must be positive"));
        }
        if self.song_length == 0 {
            return Err(invalid("song_length must be at least one bar"));
        }
        Ok(())
    }

    /// Ring buffer capacity in frames.
    pub fn ring_capacity_frames(&self) -> usize {
        (self.sample_rate as f32 * self.ring_seconds) as usize
    }
}

fn invalid(reason: &str) -> SongrackError {
    SongrackError::InvalidConfig {
        reason: reason.to_string(),
    }
}
