//! Channel Volume
//!
//! Per-channel fader with panning and mute. A new gain is only picked up
//! when the signal crosses zero, so fader moves never click.

use crate::graph::module::{Inputs, Module, ProcessContext};
use crate::impl_module_common;
use crate::snapshot::{StateReader, StateWriter};

const STATE_VERSION: u8 = 0;
const STATE_SIZE: usize = 1 + 4 + 4 + 1;

/// Default fader position
pub const DEFAULT_VOLUME: f32 = 0.5;

#[inline]
fn is_zero_crossing(prev: f32, next: f32) -> bool {
    (prev == 0.0 && next == 0.0) || ((prev >= 0.0) != (next >= 0.0))
}

/// Stereo fader.
///
/// `mute` is user-controlled and saved with the state; `mute_override` is
/// set by the song when another channel is soloed and is never saved.
#[derive(Debug, Clone)]
pub struct VolumeModule {
    volume: f32,
    panning: f32,
    pub mute: bool,
    pub mute_override: bool,
    current: [f32; 2],
    last: [f32; 2],
}

impl VolumeModule {
    pub fn new() -> Self {
        Self {
            volume: DEFAULT_VOLUME,
            panning: 0.0,
            mute: false,
            mute_override: false,
            current: [DEFAULT_VOLUME; 2],
            last: [0.0; 2],
        }
    }

    pub fn volume(&self) -> f32 {
        self.volume
    }

    /// Set the fader (0..1)
    pub fn set_volume(&mut self, volume: f32) {
        self.volume = volume.clamp(0.0, 1.0);
    }

    pub fn panning(&self) -> f32 {
        self.panning
    }

    /// Set panning (-1 left .. 1 right)
    pub fn set_panning(&mut self, panning: f32) {
        self.panning = panning.clamp(-1.0, 1.0);
    }

    /// Muted by the user or by another channel's solo
    pub fn is_muted(&self) -> bool {
        self.mute || self.mute_override
    }

    /// Gains the fader is moving towards, (left, right)
    pub fn target_gains(&self) -> [f32; 2] {
        let right = (self.panning + 1.0) / 2.0;
        [self.volume * (1.0 - right), self.volume * right]
    }
}

impl Default for VolumeModule {
    fn default() -> Self {
        Self::new()
    }
}

impl Module for VolumeModule {
    impl_module_common!("effect.volume", "Volume");

    fn process(&mut self, inputs: &Inputs<'_>, output: &mut [f32], ctx: &ProcessContext) {
        if self.is_muted() {
            output.fill(0.0);
            self.last = [0.0; 2];
            return;
        }

        let targets = self.target_gains();
        let channels = ctx.channels.max(1);
        for (i, out) in output.iter_mut().enumerate() {
            let c = i % channels;
            let input = inputs.sample(i);
            if c >= 2 {
                *out = input;
                continue;
            }
            if is_zero_crossing(self.last[c], input) {
                self.current[c] = targets[c];
            }
            *out = input * self.current[c];
            self.last[c] = input;
        }
    }

    fn state_size(&self) -> usize {
        STATE_SIZE
    }

    fn save_state(&self, out: &mut Vec<u8>) {
        StateWriter::new(out)
            .u8(STATE_VERSION)
            .f32(self.volume)
            .f32(self.panning)
            .bool(self.mute);
    }

    fn load_state(&mut self, blob: &[u8]) -> bool {
        let Some(mut reader) = StateReader::exact(blob, STATE_SIZE) else {
            return false;
        };
        if reader.u8() != Some(STATE_VERSION) {
            return false;
        }
        let (Some(volume), Some(panning), Some(mute)) = (reader.f32(), reader.f32(), reader.bool())
        else {
            return false;
        };
        self.volume = volume;
        self.panning = panning;
        self.mute = mute;
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn run(volume: &mut VolumeModule, input: &[f32]) -> Vec<f32> {
        let mut out = vec![0.0; input.len()];
        let slices: [&[f32]; 1] = [input];
        let ctx = ProcessContext::new(input.len() / 2, 2, 48_000);
        volume.process(&Inputs::from_slices(&slices), &mut out, &ctx);
        out
    }

    #[test]
    fn test_centre_pan_halves_each_side() {
        let mut volume = VolumeModule::new();
        volume.set_volume(1.0);
        assert_eq!(volume.target_gains(), [0.5, 0.5]);
        volume.set_panning(-1.0);
        assert_eq!(volume.target_gains(), [1.0, 0.0]);
    }

    #[test]
    fn test_gain_change_waits_for_zero_crossing() {
        let mut volume = VolumeModule::new();
        volume.set_volume(1.0);
        // Full volume at centre pan matches the starting gain
        let out = run(&mut volume, &[0.2, 0.2, 0.4, 0.4]);
        assert_relative_eq!(out[2], 0.2);

        volume.set_volume(0.0);
        let out = run(&mut volume, &[0.6, 0.6, -0.5, -0.5, -0.4, -0.4]);
        // Old gain holds until the sign flips
        assert_relative_eq!(out[0], 0.3);
        assert_eq!(out[2], 0.0);
        assert_eq!(out[4], 0.0);
    }

    #[test]
    fn test_mute_and_override_silence() {
        let mut volume = VolumeModule::new();
        volume.mute_override = true;
        assert!(run(&mut volume, &[0.5; 4]).iter().all(|&s| s == 0.0));
        volume.mute_override = false;
        volume.mute = true;
        assert!(run(&mut volume, &[0.5; 4]).iter().all(|&s| s == 0.0));
    }

    #[test]
    fn test_state_roundtrip_skips_override() {
        let mut source = VolumeModule::new();
        source.set_volume(0.8);
        source.set_panning(0.25);
        source.mute = true;
        source.mute_override = true;

        let mut blob = Vec::new();
        source.save_state(&mut blob);
        assert_eq!(blob.len(), 10);

        let mut restored = VolumeModule::new();
        assert!(restored.load_state(&blob));
        assert_eq!(restored.volume(), 0.8);
        assert_eq!(restored.panning(), 0.25);
        assert!(restored.mute);
        assert!(!restored.mute_override);
    }
}
