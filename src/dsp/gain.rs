//! Gain Stage
//!
//! Multiplies the summed input by `10^(gain_db / 10)`.

use crate::engine::buffer::db_to_factor;
use crate::graph::module::{Inputs, Module, ProcessContext};
use crate::impl_module_common;
use crate::snapshot::{StateReader, StateWriter};

// ============================================================================
// Constants
// ============================================================================

/// Minimum gain in dB
pub const MIN_GAIN_DB: f32 = -60.0;

/// Maximum gain in dB
pub const MAX_GAIN_DB: f32 = 20.0;

const STATE_VERSION: u8 = 0;
const STATE_SIZE: usize = 1 + 4;

// ============================================================================
// Gain Module
// ============================================================================

/// Simple gain stage
///
/// # Parameters
/// - `gain_db`: gain in decibels (-60 to +20 dB), applied with the
///   power-ratio exponent so 0 dB is unity.
///
/// # Example
/// ```
/// use songrack::dsp::gain::GainModule;
/// use songrack::graph::{Inputs, Module, ProcessContext};
///
/// let mut gain = GainModule::new(0.0);
/// let input = [0.5_f32; 8];
/// let slices: [&[f32]; 1] = [&input];
/// let mut out = [0.0_f32; 8];
/// gain.process(&Inputs::from_slices(&slices), &mut out, &ProcessContext::new(4, 2, 48_000));
/// assert_eq!(out, input);
/// ```
#[derive(Debug, Clone)]
pub struct GainModule {
    gain_db: f32,
}

impl GainModule {
    /// Create a gain stage, clamping `gain_db` to the valid range
    pub fn new(gain_db: f32) -> Self {
        Self {
            gain_db: gain_db.clamp(MIN_GAIN_DB, MAX_GAIN_DB),
        }
    }

    /// Set the gain in decibels
    pub fn set_gain_db(&mut self, db: f32) {
        self.gain_db = db.clamp(MIN_GAIN_DB, MAX_GAIN_DB);
    }

    /// Current gain in decibels
    pub fn gain_db(&self) -> f32 {
        self.gain_db
    }

    /// Multiplier applied to the signal
    pub fn factor(&self) -> f32 {
        db_to_factor(self.gain_db)
    }
}

impl Default for GainModule {
    fn default() -> Self {
        Self::new(0.0)
    }
}

impl Module for GainModule {
    impl_module_common!("effect.gain", "Gain");

    fn process(&mut self, inputs: &Inputs<'_>, output: &mut [f32], _ctx: &ProcessContext) {
        let factor = self.factor();
        inputs.sum_into(output);
        for sample in output.iter_mut() {
            *sample *= factor;
        }
    }

    fn state_size(&self) -> usize {
        STATE_SIZE
    }

    fn save_state(&self, out: &mut Vec<u8>) {
        StateWriter::new(out).u8(STATE_VERSION).f32(self.gain_db);
    }

    fn load_state(&mut self, blob: &[u8]) -> bool {
        let Some(mut reader) = StateReader::exact(blob, STATE_SIZE) else {
            return false;
        };
        if reader.u8() != Some(STATE_VERSION) {
            return false;
        }
        match reader.f32() {
            Some(gain_db) => {
                self.gain_db = gain_db;
                true
            }
            None => false,
        }
    }
}
