//! Song transport
//!
//! Tracks play state and the playhead in beats. The song advances it from
//! the mixer with the wall-clock time of each rendered block.

use std::fmt;

/// Beats in every bar
pub const BEATS_PER_BAR: u32 = 4;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TransportState {
    #[default]
    Stopped,
    Playing,
}

impl fmt::Display for TransportState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TransportState::Stopped => write!(f, "Stopped"),
            TransportState::Playing => write!(f, "Playing"),
        }
    }
}

/// What happened when the playhead moved.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Advance {
    /// Still inside the song
    Continued,
    /// Wrapped back to the first bar
    Looped,
    /// Ran off the end and stopped at bar 0
    Finished,
}

/// Play state and playhead.
#[derive(Debug, Clone)]
pub struct Transport {
    state: TransportState,
    /// Playhead in beats from the start of the song
    position: f64,
    /// Bar the playhead is in, or the cursor bar while stopped
    bar_position: usize,
    looping: bool,
}

impl Default for Transport {
    fn default() -> Self {
        Self::new()
    }
}

impl Transport {
    pub fn new() -> Self {
        Self {
            state: TransportState::Stopped,
            position: 0.0,
            bar_position: 0,
            looping: true,
        }
    }

    /// Start from the beginning of the cursor bar.
    pub fn play(&mut self) {
        self.state = TransportState::Playing;
        self.position = self.bar_start();
        tracing::debug!(bar = self.bar_position, "transport play");
    }

    /// Stop and return the playhead to the cursor bar.
    pub fn stop(&mut self) {
        self.state = TransportState::Stopped;
        self.position = self.bar_start();
        tracing::debug!(bar = self.bar_position, "transport stop");
    }

    /// Move the cursor to `bar`.
    pub fn seek_bar(&mut self, bar: usize) {
        self.bar_position = bar;
        self.position = self.bar_start();
    }

    /// Keep the cursor inside a song of `length` bars.
    pub fn clamp_to(&mut self, length: usize) {
        if self.bar_position >= length {
            self.seek_bar(length.saturating_sub(1));
        }
    }

    /// Move the playhead by `elapsed` seconds at `tempo` BPM through a song
    /// of `length` bars.
    pub fn advance(&mut self, elapsed: f64, tempo: f32, length: usize) -> Advance {
        if self.state != TransportState::Playing {
            return Advance::Continued;
        }

        self.position += elapsed * (tempo as f64 / 60.0);
        let song_beats = (length as u32 * BEATS_PER_BAR) as f64;
        let mut result = Advance::Continued;

        if self.position >= song_beats {
            if self.looping && song_beats > 0.0 {
                self.position %= song_beats;
                result = Advance::Looped;
            } else {
                self.bar_position = 0;
                self.position = 0.0;
                self.stop();
                return Advance::Finished;
            }
        }

        self.bar_position = (self.position / BEATS_PER_BAR as f64) as usize;
        result
    }

    /// Playhead offset in beats from the start of the current bar
    pub fn position_in_bar(&self) -> f32 {
        self.position.rem_euclid(BEATS_PER_BAR as f64) as f32
    }

    pub fn position(&self) -> f64 {
        self.position
    }

    pub fn bar_position(&self) -> usize {
        self.bar_position
    }

    pub fn is_playing(&self) -> bool {
        self.state == TransportState::Playing
    }

    pub fn state(&self) -> TransportState {
        self.state
    }

    pub fn looping(&self) -> bool {
        self.looping
    }

    pub fn set_looping(&mut self, looping: bool) {
        self.looping = looping;
    }

    fn bar_start(&self) -> f64 {
        (self.bar_position as u32 * BEATS_PER_BAR) as f64
    }
}
