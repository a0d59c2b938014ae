//! Waveform Synth
//!
//! Sixteen-voice synth: three detunable oscillators per
//! voice shaped by one ADSR envelope. Notes arrive as [`NoteEvent`]s queued
//! on the node and drained before each block.

use std::f32::consts::TAU;

use crate::graph::module::{Inputs, Module, NoteEvent, ProcessContext};
use crate::impl_module_common;
use crate::snapshot::{StateReader, StateWriter};

// ============================================================================
// Constants
// ============================================================================

/// Simultaneous voices
pub const VOICE_COUNT: usize = 16;

/// Oscillators per voice
pub const OSCILLATOR_COUNT: usize = 3;

/// Shortest release time in seconds
pub const MIN_RELEASE_SECS: f32 = 0.001;

/// Number of addressable keys
pub const KEY_COUNT: i32 = 128;

const STATE_VERSION: u8 = 0;
const STATE_SIZE: usize = 1 + OSCILLATOR_COUNT * (1 + 4 + 4 + 4 + 4) + 4 * 4;

/// Frequency of `key` in 12-tone equal temperament with key 57 at 440 Hz.
///
/// Keys outside `0..128` have no frequency.
pub fn key_frequency(key: i32) -> Option<f32> {
    (0..KEY_COUNT)
        .contains(&key)
        .then(|| 440.0 * 2.0_f32.powf((key - 57) as f32 / 12.0))
}

// ============================================================================
// Waveforms
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Waveform {
    Sine,
    Square,
    Sawtooth,
    Triangle,
    Noise,
}

impl Waveform {
    pub const ALL: [Waveform; 5] = [
        Waveform::Sine,
        Waveform::Square,
        Waveform::Sawtooth,
        Waveform::Triangle,
        Waveform::Noise,
    ];

    fn to_u8(self) -> u8 {
        self as u8
    }

    fn from_u8(value: u8) -> Option<Self> {
        Self::ALL.get(value as usize).copied()
    }

    /// Sample the waveform at `phase` radians. `noise` supplies the next
    /// white-noise value for [`Waveform::Noise`].
    #[inline]
    pub fn sample(self, phase: f32, noise: impl FnOnce() -> f32) -> f32 {
        match self {
            Waveform::Sine => phase.sin(),
            Waveform::Square => {
                if phase.sin() >= 0.0 {
                    1.0
                } else {
                    -1.0
                }
            }
            Waveform::Sawtooth => 2.0 * (phase / TAU + 0.5).rem_euclid(1.0) - 1.0,
            Waveform::Triangle => {
                let u = (phase / TAU - 0.25).rem_euclid(1.0);
                4.0 * (u - 0.5).abs() - 1.0
            }
            Waveform::Noise => noise(),
        }
    }
}

// ============================================================================
// Oscillator and envelope settings
// ============================================================================

/// One oscillator's settings, shared by every voice.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Oscillator {
    pub waveform: Waveform,
    /// 0..1
    pub volume: f32,
    /// -1 (left) to 1 (right)
    pub pan: f32,
    /// Semitones
    pub coarse: i32,
    /// Cents
    pub fine: f32,
}

impl Oscillator {
    pub fn new(waveform: Waveform, volume: f32) -> Self {
        Self {
            waveform,
            volume,
            pan: 0.0,
            coarse: 0,
            fine: 0.0,
        }
    }

    /// Oscillator pitch for a voice playing at `freq`.
    pub fn frequency(&self, freq: f32) -> f32 {
        freq * 2.0_f32.powf((self.coarse as f32 + self.fine / 100.0) / 12.0)
    }

    /// (left, right) gains from the pan position.
    pub fn pan_gains(&self) -> (f32, f32) {
        let right = (self.pan + 1.0) / 2.0;
        (1.0 - right, right)
    }
}

/// ADSR envelope in seconds, sustain as a level.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Envelope {
    pub attack: f32,
    pub decay: f32,
    pub sustain: f32,
    pub release: f32,
}

impl Default for Envelope {
    fn default() -> Self {
        Self {
            attack: 0.0,
            decay: 0.0,
            sustain: 1.0,
            release: MIN_RELEASE_SECS,
        }
    }
}

impl Envelope {
    /// Level while the key is held, `time` seconds after note-on.
    pub fn held_level(&self, time: f32) -> f32 {
        if time < self.attack {
            time / self.attack
        } else if time < self.attack + self.decay {
            1.0 - (time - self.attack) / self.decay * (1.0 - self.sustain)
        } else {
            self.sustain
        }
    }
}

// ============================================================================
// Voices
// ============================================================================

#[derive(Debug, Clone, Copy, Default)]
struct Voice {
    active: bool,
    key: i32,
    freq: f32,
    volume: f32,
    time: f32,
    released: bool,
    release_time: f32,
    release_level: f32,
    phases: [f32; OSCILLATOR_COUNT],
    serial: u64,
    noise: u32,
}

impl Voice {
    fn next_noise(&mut self) -> f32 {
        // xorshift32
        let mut x = self.noise;
        x ^= x << 13;
        x ^= x >> 17;
        x ^= x << 5;
        self.noise = x;
        (x as f32 / u32::MAX as f32) * 2.0 - 1.0
    }

    /// Envelope level at the current time; deactivates the voice once the
    /// release has run out.
    fn level(&mut self, envelope: &Envelope) -> f32 {
        if !self.released {
            return envelope.held_level(self.time);
        }
        let t = (self.time - self.release_time) / envelope.release;
        if t > 1.0 {
            self.active = false;
            return 0.0;
        }
        (1.0 - t) * self.release_level
    }
}

// ============================================================================
// Synth Module
// ============================================================================

/// Polyphonic three-oscillator synth.
///
/// Ignores its inputs. A note-on takes the first free voice, or steals the
/// voice that started longest ago; a note-off releases the first held voice
/// on that key.
#[derive(Debug, Clone)]
pub struct WaveformSynth {
    oscillators: [Oscillator; OSCILLATOR_COUNT],
    envelope: Envelope,
    voices: [Voice; VOICE_COUNT],
    next_serial: u64,
}

impl WaveformSynth {
    pub fn new() -> Self {
        let mut detuned = Oscillator::new(Waveform::Sawtooth, 0.5);
        detuned.fine = 6.0;
        Self {
            oscillators: [
                Oscillator::new(Waveform::Triangle, 0.5),
                detuned,
                Oscillator::new(Waveform::Sine, 0.0),
            ],
            envelope: Envelope::default(),
            voices: [Voice::default(); VOICE_COUNT],
            next_serial: 0,
        }
    }

    pub fn oscillator(&self, index: usize) -> Option<&Oscillator> {
        self.oscillators.get(index)
    }

    /// Replace an oscillator's settings. Volume and pan are clamped.
    pub fn set_oscillator(&mut self, index: usize, mut osc: Oscillator) -> bool {
        let Some(slot) = self.oscillators.get_mut(index) else {
            return false;
        };
        osc.volume = osc.volume.clamp(0.0, 1.0);
        osc.pan = osc.pan.clamp(-1.0, 1.0);
        *slot = osc;
        true
    }

    pub fn envelope(&self) -> Envelope {
        self.envelope
    }

    /// Set the envelope; negative times become zero and release is held at
    /// its minimum.
    pub fn set_envelope(&mut self, envelope: Envelope) {
        self.envelope = Envelope {
            attack: envelope.attack.max(0.0),
            decay: envelope.decay.max(0.0),
            sustain: envelope.sustain.clamp(0.0, 1.0),
            release: envelope.release.max(MIN_RELEASE_SECS),
        };
    }

    /// Voices currently sounding, including releasing ones
    pub fn active_voices(&self) -> usize {
        self.voices.iter().filter(|v| v.active).count()
    }

    /// Keys of the sounding voices
    pub fn active_keys(&self) -> Vec<i32> {
        self.voices
            .iter()
            .filter(|v| v.active)
            .map(|v| v.key)
            .collect()
    }

    /// Silence every voice immediately.
    pub fn all_notes_off(&mut self) {
        for voice in &mut self.voices {
            voice.active = false;
        }
    }

    fn note_on(&mut self, key: i32, volume: f32) {
        let Some(freq) = key_frequency(key) else {
            tracing::trace!(key, "note outside key range ignored");
            return;
        };

        let slot = match self.voices.iter().position(|v| !v.active) {
            Some(free) => free,
            None => self
                .voices
                .iter()
                .enumerate()
                .min_by_key(|(_, v)| v.serial)
                .map(|(i, _)| i)
                .unwrap_or(0),
        };

        self.next_serial += 1;
        self.voices[slot] = Voice {
            active: true,
            key,
            freq,
            volume: volume.clamp(0.0, 1.0),
            serial: self.next_serial,
            noise: 0x9E37_79B9 ^ (key as u32).wrapping_mul(0x85EB_CA6B) ^ self.next_serial as u32,
            ..Voice::default()
        };
    }

    fn note_off(&mut self, key: i32) {
        let envelope = self.envelope;
        if let Some(voice) = self
            .voices
            .iter_mut()
            .find(|v| v.active && !v.released && v.key == key)
        {
            voice.release_level = envelope.held_level(voice.time);
            voice.release_time = voice.time;
            voice.released = true;
        }
    }
}

impl Default for WaveformSynth {
    fn default() -> Self {
        Self::new()
    }
}

impl Module for WaveformSynth {
    impl_module_common!("synth.waveform", "Waveform Synth");

    fn process(&mut self, _inputs: &Inputs<'_>, output: &mut [f32], ctx: &ProcessContext) {
        output.fill(0.0);
        let channels = ctx.channels.max(1);
        let dt = 1.0 / ctx.sample_rate.max(1) as f32;

        let pans = self.oscillators.map(|osc| osc.pan_gains());
        let envelope = self.envelope;

        for voice in self.voices.iter_mut().filter(|v| v.active) {
            let steps = self.oscillators.map(|osc| TAU * osc.frequency(voice.freq) * dt);

            for frame in output.chunks_exact_mut(channels) {
                let level = voice.level(&envelope);
                if !voice.active {
                    break;
                }

                let mut left = 0.0;
                let mut right = 0.0;
                for (i, osc) in self.oscillators.iter().enumerate() {
                    let phase = voice.phases[i];
                    let value = osc.waveform.sample(phase, || voice.next_noise())
                        * osc.volume
                        * level
                        * voice.volume;
                    left += value * pans[i].0;
                    right += value * pans[i].1;
                    voice.phases[i] = (phase + steps[i]) % TAU;
                }

                frame[0] += left;
                if channels > 1 {
                    frame[1] += right;
                }
                voice.time += dt;
            }
        }
    }

    fn event(&mut self, event: NoteEvent) {
        match event {
            NoteEvent::NoteOn { key, volume } => self.note_on(key, volume),
            NoteEvent::NoteOff { key } => self.note_off(key),
        }
    }

    fn state_size(&self) -> usize {
        STATE_SIZE
    }

    fn save_state(&self, out: &mut Vec<u8>) {
        let mut writer = StateWriter::new(out);
        writer.u8(STATE_VERSION);
        for osc in &self.oscillators {
            writer
                .u8(osc.waveform.to_u8())
                .f32(osc.volume)
                .f32(osc.pan)
                .i32(osc.coarse)
                .f32(osc.fine);
        }
        let env = &self.envelope;
        writer
            .f32(env.attack)
            .f32(env.decay)
            .f32(env.sustain)
            .f32(env.release);
    }

    fn load_state(&mut self, blob: &[u8]) -> bool {
        let Some(mut reader) = StateReader::exact(blob, STATE_SIZE) else {
            return false;
        };
        if reader.u8() != Some(STATE_VERSION) {
            return false;
        }

        let mut oscillators = self.oscillators;
        for osc in &mut oscillators {
            let (Some(waveform), Some(volume), Some(pan), Some(coarse), Some(fine)) = (
                reader.u8().and_then(Waveform::from_u8),
                reader.f32(),
                reader.f32(),
                reader.i32(),
                reader.f32(),
            ) else {
                return false;
            };
            *osc = Oscillator {
                waveform,
                volume,
                pan,
                coarse,
                fine,
            };
        }

        let (Some(attack), Some(decay), Some(sustain), Some(release)) =
            (reader.f32(), reader.f32(), reader.f32(), reader.f32())
        else {
            return false;
        };

        self.oscillators = oscillators;
        self.set_envelope(Envelope {
            attack,
            decay,
            sustain,
            release,
        });
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use test_case::test_case;

    const SR: u32 = 48_000;

    fn render(synth: &mut WaveformSynth, frames: usize) -> Vec<f32> {
        let mut out = vec![0.0; frames * 2];
        synth.process(&Inputs::none(), &mut out, &ProcessContext::new(frames, 2, SR));
        out
    }

    fn peak(block: &[f32]) -> f32 {
        block.iter().fold(0.0_f32, |m, s| m.max(s.abs()))
    }

    fn sine_only() -> WaveformSynth {
        let mut synth = WaveformSynth::new();
        synth.set_oscillator(0, Oscillator::new(Waveform::Sine, 1.0));
        synth.set_oscillator(1, Oscillator::new(Waveform::Sine, 0.0));
        synth
    }

    #[test_case(57, 440.0 ; "a4")]
    #[test_case(69, 880.0 ; "a5")]
    #[test_case(45, 220.0 ; "a3")]
    #[test_case(48, 261.6256 ; "middle c")]
    fn test_key_frequency(key: i32, freq: f32) {
        assert_relative_eq!(key_frequency(key).unwrap(), freq, epsilon = 1e-3);
    }

    #[test]
    fn test_key_frequency_out_of_range() {
        assert_eq!(key_frequency(-1), None);
        assert_eq!(key_frequency(128), None);
    }

    #[test]
    fn test_waveform_shapes() {
        let quarter = TAU / 4.0;
        let none = || 0.0;
        assert_relative_eq!(Waveform::Triangle.sample(0.0, none), 0.0, epsilon = 1e-6);
        assert_relative_eq!(Waveform::Triangle.sample(quarter, none), 1.0, epsilon = 1e-6);
        assert_relative_eq!(Waveform::Triangle.sample(3.0 * quarter, none), -1.0, epsilon = 1e-6);
        assert_relative_eq!(Waveform::Sawtooth.sample(0.0, none), 0.0, epsilon = 1e-6);
        assert_eq!(Waveform::Square.sample(quarter, none), 1.0);
        assert_eq!(Waveform::Square.sample(3.0 * quarter, none), -1.0);
    }

    #[test]
    fn test_oscillator_detune_and_pan() {
        let mut osc = Oscillator::new(Waveform::Sine, 1.0);
        osc.coarse = 12;
        assert_relative_eq!(osc.frequency(440.0), 880.0, epsilon = 1e-3);
        osc.coarse = 0;
        osc.fine = 100.0;
        assert_relative_eq!(osc.frequency(440.0), 466.1638, epsilon = 1e-3);

        osc.pan = 1.0;
        assert_eq!(osc.pan_gains(), (0.0, 1.0));
        osc.pan = 0.0;
        assert_eq!(osc.pan_gains(), (0.5, 0.5));
    }

    #[test]
    fn test_silent_without_notes() {
        let mut synth = WaveformSynth::new();
        assert!(render(&mut synth, 256).iter().all(|&s| s == 0.0));
    }

    #[test]
    fn test_note_on_sounds_and_off_releases() {
        let mut synth = sine_only();
        synth.set_envelope(Envelope {
            attack: 0.01,
            release: 0.05,
            ..Envelope::default()
        });

        synth.event(NoteEvent::NoteOn { key: 57, volume: 1.0 });
        let held = render(&mut synth, 4_800);
        assert!(peak(&held) > 0.4);

        synth.event(NoteEvent::NoteOff { key: 57 });
        let mut previous = f32::MAX;
        for _ in 0..10 {
            let chunk = render(&mut synth, 240);
            let p = peak(&chunk);
            assert!(p <= previous + 1e-6, "release rose from {previous} to {p}");
            previous = p;
        }

        // 0.05 s release is 2400 frames; everything after is silence
        render(&mut synth, 480);
        let tail = render(&mut synth, 480);
        assert!(tail.iter().all(|&s| s == 0.0));
        assert_eq!(synth.active_voices(), 0);
    }

    #[test]
    fn test_voice_stealing_takes_oldest() {
        let mut synth = WaveformSynth::new();
        for key in 0..VOICE_COUNT as i32 {
            synth.event(NoteEvent::NoteOn { key, volume: 1.0 });
        }
        assert_eq!(synth.active_voices(), VOICE_COUNT);

        synth.event(NoteEvent::NoteOn { key: 100, volume: 1.0 });
        let keys = synth.active_keys();
        assert_eq!(keys.len(), VOICE_COUNT);
        assert!(keys.contains(&100));
        assert!(!keys.contains(&0));
        assert!(keys.contains(&1));
    }

    #[test]
    fn test_note_off_only_first_matching_voice() {
        let mut synth = sine_only();
        synth.event(NoteEvent::NoteOn { key: 60, volume: 1.0 });
        synth.event(NoteEvent::NoteOn { key: 60, volume: 1.0 });
        synth.event(NoteEvent::NoteOff { key: 60 });
        render(&mut synth, 480);
        assert_eq!(synth.active_voices(), 1);
    }

    #[test]
    fn test_release_has_minimum() {
        let mut synth = WaveformSynth::new();
        synth.set_envelope(Envelope {
            release: 0.0,
            ..Envelope::default()
        });
        assert_eq!(synth.envelope().release, MIN_RELEASE_SECS);
    }

    #[test]
    fn test_decay_reaches_sustain() {
        let env = Envelope {
            attack: 0.1,
            decay: 0.2,
            sustain: 0.5,
            release: 0.1,
        };
        assert_relative_eq!(env.held_level(0.05), 0.5);
        assert_relative_eq!(env.held_level(0.2), 0.75);
        assert_relative_eq!(env.held_level(1.0), 0.5);
    }

    #[test]
    fn test_state_roundtrip() {
        let mut source = WaveformSynth::new();
        source.set_oscillator(
            2,
            Oscillator {
                waveform: Waveform::Noise,
                volume: 0.3,
                pan: -0.5,
                coarse: -12,
                fine: 3.5,
            },
        );
        source.set_envelope(Envelope {
            attack: 0.02,
            decay: 0.1,
            sustain: 0.7,
            release: 0.4,
        });

        let mut blob = Vec::new();
        source.save_state(&mut blob);
        assert_eq!(blob.len(), 68);

        let mut restored = WaveformSynth::new();
        assert!(restored.load_state(&blob));
        assert_eq!(restored.oscillator(2), source.oscillator(2));
        assert_eq!(restored.oscillator(1), source.oscillator(1));
        assert_eq!(restored.envelope(), source.envelope());
    }

    #[test]
    fn test_rejects_unknown_waveform() {
        let mut blob = Vec::new();
        WaveformSynth::new().save_state(&mut blob);
        blob[1] = 9;
        let mut synth = WaveformSynth::new();
        assert!(!synth.load_state(&blob));
        assert_eq!(synth.oscillator(0).unwrap().waveform, Waveform::Triangle);
    }
}
