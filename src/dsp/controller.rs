//! Bus Controller
//!
//! Fader at the end of every FX bus: gain, mute, and a windowed peak meter
//! that control threads can poll.

use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;

use crate::engine::buffer::db_to_factor;
use crate::graph::module::{Inputs, Module, ProcessContext};
use crate::impl_module_common;
use crate::snapshot::{StateReader, StateWriter};

const STATE_VERSION: u8 = 0;
const STATE_SIZE: usize = 1 + 4 + 1;

/// Frames per meter window
pub const METER_WINDOW_FRAMES: usize = 1024;

/// Latest per-channel peak, updated once per window.
#[derive(Debug, Default)]
pub struct PeakMeter {
    peaks: [AtomicU32; 2],
}

impl PeakMeter {
    /// (left, right) peak of the last completed window, after gain
    pub fn peaks(&self) -> (f32, f32) {
        (
            f32::from_bits(self.peaks[0].load(Ordering::Relaxed)),
            f32::from_bits(self.peaks[1].load(Ordering::Relaxed)),
        )
    }

    fn publish(&self, peaks: [f32; 2]) {
        for (slot, peak) in self.peaks.iter().zip(peaks) {
            slot.store(peak.to_bits(), Ordering::Relaxed);
        }
    }
}

/// FX bus fader.
///
/// The meter keeps running while muted so a soloed-out bus still shows
/// activity.
#[derive(Debug)]
pub struct BusController {
    gain_db: f32,
    pub mute: bool,
    pub mute_override: bool,
    meter: Arc<PeakMeter>,
    accum: [f32; 2],
    count: usize,
}

impl BusController {
    pub fn new() -> Self {
        Self {
            gain_db: 0.0,
            mute: false,
            mute_override: false,
            meter: Arc::new(PeakMeter::default()),
            accum: [0.0; 2],
            count: 0,
        }
    }

    pub fn gain_db(&self) -> f32 {
        self.gain_db
    }

    pub fn set_gain_db(&mut self, gain_db: f32) {
        self.gain_db = gain_db;
    }

    pub fn is_muted(&self) -> bool {
        self.mute || self.mute_override
    }

    pub fn meter(&self) -> Arc<PeakMeter> {
        Arc::clone(&self.meter)
    }
}

impl Default for BusController {
    fn default() -> Self {
        Self::new()
    }
}

impl Module for BusController {
    impl_module_common!("effect.controller", "Bus Controller");

    fn process(&mut self, inputs: &Inputs<'_>, output: &mut [f32], ctx: &ProcessContext) {
        let factor = db_to_factor(self.gain_db);
        let muted = self.is_muted();
        let channels = ctx.channels.max(1);

        inputs.sum_into(output);
        for frame in output.chunks_exact_mut(channels) {
            for (c, sample) in frame.iter_mut().enumerate() {
                *sample *= factor;
                if c < 2 {
                    self.accum[c] = self.accum[c].max(sample.abs());
                }
                if muted {
                    *sample = 0.0;
                }
            }

            self.count += 1;
            if self.count >= METER_WINDOW_FRAMES {
                self.meter.publish(self.accum);
                self.accum = [0.0; 2];
                self.count = 0;
            }
        }
    }

    fn state_size(&self) -> usize {
        STATE_SIZE
    }

    fn save_state(&self, out: &mut Vec<u8>) {
        StateWriter::new(out)
            .u8(STATE_VERSION)
            .f32(self.gain_db)
            .bool(self.mute);
    }

    fn load_state(&mut self, blob: &[u8]) -> bool {
        let Some(mut reader) = StateReader::exact(blob, STATE_SIZE) else {
            return false;
        };
        if reader.u8() != Some(STATE_VERSION) {
            return false;
        }
        let (Some(gain_db), Some(mute)) = (reader.f32(), reader.bool()) else {
            return false;
        };
        self.gain_db = gain_db;
        self.mute = mute;
        true
    }
}
