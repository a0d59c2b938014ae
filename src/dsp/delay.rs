//! Delay Effect
//!
//! Stereo feedback delay with a per-channel time offset and an optional
//! tempo-synced delay time. Parameters live in a shared [`DelayControls`]
//! so the control thread can adjust them without taking the graph lock.

use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::Arc;

use crate::dsp::param::AtomicParam;
use crate::graph::module::{Inputs, Module, ProcessContext};
use crate::impl_module_common;
use crate::snapshot::{StateReader, StateWriter};

// ============================================================================
// Constants
// ============================================================================

/// Longest delay time settable in seconds
pub const MAX_DELAY_SECS: f32 = 4.0;

/// Largest stereo offset in seconds (either direction)
pub const MAX_STEREO_OFFSET_SECS: f32 = 1.0;

/// Number of tempo divisions, from 1/64 up to 8 bars' worth of beats
pub const DIVISION_COUNT: u32 = 30;

const STATE_SIZE: usize = 8 + 4 + 4 + 4 + 1 + 1;

/// Display names for each tempo division index
pub const DIVISION_NAMES: [&str; DIVISION_COUNT as usize] = [
    "1/64", "1/64 dotted", "1/48", "1/32", "1/32 dotted", "1/24", "1/16", "1/16 dotted",
    "1/12", "1/8", "1/8 dotted", "1/6", "1/4", "1/4 dotted", "1/3", "1/2", "1/2 dotted",
    "2/3", "1/1", "1/1 dotted", "3/3", "2/1", "2/1 dotted", "6/3", "4/1", "4/1 dotted",
    "12/3", "8/1", "8/1 dotted", "24/3",
];

// ============================================================================
// Helper Functions
// ============================================================================

/// Length in seconds of a tempo division at `tempo` BPM.
///
/// Divisions come in groups of three (straight, dotted, triplet); each group
/// doubles the straight length, starting at 1/64 of a beat.
pub fn division_to_secs(tempo: f32, division: u32) -> f64 {
    let exponent = division as i32 / 3 - 6;
    let beats = match division % 3 {
        0 => 2.0_f64.powi(exponent),
        1 => 2.0_f64.powi(exponent) * 1.5,
        _ => 1.5_f64.powi(exponent),
    };
    beats * (60.0 / tempo.max(1.0) as f64)
}

// ============================================================================
// Controls
// ============================================================================

/// Delay parameters shared between the control and render threads.
#[derive(Debug)]
pub struct DelayControls {
    /// Delay time in seconds (0-4)
    pub delay_time: AtomicParam,
    /// Extra delay on the right (positive) or left (negative) channel
    pub stereo_offset: AtomicParam,
    /// Amount fed back into the line (0-1)
    pub feedback: AtomicParam,
    /// Dry/wet balance, -1 fully dry to 1 fully wet
    pub mix: AtomicParam,
    tempo_sync: AtomicBool,
    division: AtomicU32,
    panic: AtomicBool,
}

impl Default for DelayControls {
    fn default() -> Self {
        Self {
            delay_time: AtomicParam::new(0.25, 0.0, MAX_DELAY_SECS),
            stereo_offset: AtomicParam::new(0.0, -MAX_STEREO_OFFSET_SECS, MAX_STEREO_OFFSET_SECS),
            feedback: AtomicParam::new(0.6, 0.0, 1.0),
            mix: AtomicParam::new(0.0, -1.0, 1.0),
            tempo_sync: AtomicBool::new(false),
            division: AtomicU32::new(12),
            panic: AtomicBool::new(false),
        }
    }
}

impl DelayControls {
    /// Use the tempo division instead of the delay time.
    pub fn set_tempo_sync(&self, enabled: bool) {
        self.tempo_sync.store(enabled, Ordering::Release);
    }

    pub fn tempo_sync(&self) -> bool {
        self.tempo_sync.load(Ordering::Acquire)
    }

    /// Select a tempo division (clamped to the last one).
    pub fn set_division(&self, division: u32) {
        self.division
            .store(division.min(DIVISION_COUNT - 1), Ordering::Release);
    }

    pub fn division(&self) -> u32 {
        self.division.load(Ordering::Acquire)
    }

    /// Ask the render thread to clear the delay lines before its next block.
    pub fn panic(&self) {
        self.panic.store(true, Ordering::Release);
    }

    fn take_panic(&self) -> bool {
        self.panic.swap(false, Ordering::AcqRel)
    }
}

// ============================================================================
// Delay Module
// ============================================================================

/// Stereo feedback delay.
///
/// Each block: read the line as the wet signal, output
/// `input * dry + line * wet` with `wet = (mix + 1) / 2`, write
/// `feedback * (line + input)` back, and advance the index, wrapping once it
/// passes the current delay length.
#[derive(Debug)]
pub struct DelayModule {
    controls: Arc<DelayControls>,
    lines: [Vec<f32>; 2],
    index: [usize; 2],
}

impl DelayModule {
    /// Create a delay with lines long enough for the largest delay time plus
    /// offset at `sample_rate`.
    pub fn new(sample_rate: u32) -> Self {
        let capacity =
            ((MAX_DELAY_SECS + MAX_STEREO_OFFSET_SECS) * sample_rate as f32) as usize + 1;
        Self {
            controls: Arc::new(DelayControls::default()),
            lines: [vec![0.0; capacity], vec![0.0; capacity]],
            index: [0; 2],
        }
    }

    /// Shared handle to the parameters
    pub fn controls(&self) -> Arc<DelayControls> {
        Arc::clone(&self.controls)
    }

    /// Samples per delay line
    pub fn line_capacity(&self) -> usize {
        self.lines[0].len()
    }

    /// Effective delay time in seconds, before the stereo offset.
    pub fn effective_delay_secs(&self, tempo: f32) -> f64 {
        if self.controls.tempo_sync() {
            division_to_secs(tempo, self.controls.division())
        } else {
            self.controls.delay_time.get() as f64
        }
    }
}

impl Module for DelayModule {
    impl_module_common!("effect.delay", "Delay");

    fn process(&mut self, inputs: &Inputs<'_>, output: &mut [f32], ctx: &ProcessContext) {
        if self.controls.take_panic() {
            for line in &mut self.lines {
                line.fill(0.0);
            }
        }

        let mix = self.controls.mix.get();
        let feedback = self.controls.feedback.get();
        let stereo_offset = self.controls.stereo_offset.get() as f64;
        let delay_time = self.effective_delay_secs(ctx.tempo);

        let mut times = [delay_time; 2];
        if stereo_offset > 0.0 {
            times[1] += stereo_offset;
        } else {
            times[0] -= stereo_offset;
        }

        let last = self.line_capacity() - 1;
        let delay_samples =
            times.map(|t| ((t * ctx.sample_rate as f64).round().max(0.0) as usize).min(last));

        let wet = (mix + 1.0) / 2.0;
        let dry = 1.0 - wet;
        let channels = ctx.channels.max(1);

        for (i, out) in output.iter_mut().enumerate() {
            let input = inputs.sample(i);
            let c = i % channels;
            if c >= 2 {
                *out = input;
                continue;
            }

            let line = &mut self.lines[c];
            let idx = self.index[c];
            let delayed = line[idx];
            *out = input * dry + delayed * wet;
            line[idx] = feedback * (delayed + input);

            self.index[c] = if idx >= delay_samples[c] { 0 } else { idx + 1 };
        }
    }

    fn state_size(&self) -> usize {
        STATE_SIZE
    }

    fn save_state(&self, out: &mut Vec<u8>) {
        let c = &self.controls;
        StateWriter::new(out)
            .f64(c.delay_time.get() as f64)
            .f32(c.stereo_offset.get())
            .f32(c.feedback.get())
            .f32(c.mix.get())
            .bool(c.tempo_sync())
            .u8(c.division() as u8);
    }

    fn load_state(&mut self, blob: &[u8]) -> bool {
        let Some(mut reader) = StateReader::exact(blob, STATE_SIZE) else {
            return false;
        };
        let (
            Some(delay_time),
            Some(stereo_offset),
            Some(feedback),
            Some(mix),
            Some(tempo_sync),
            Some(division),
        ) = (
            reader.f64(),
            reader.f32(),
            reader.f32(),
            reader.f32(),
            reader.bool(),
            reader.u8(),
        )
        else {
            return false;
        };

        let c = &self.controls;
        c.delay_time.set(delay_time as f32);
        c.stereo_offset.set(stereo_offset);
        c.feedback.set(feedback);
        c.mix.set(mix);
        c.set_tempo_sync(tempo_sync);
        c.set_division(division as u32);
        true
    }
}
