//! Rendering tests
//!
//! Songs rendered offline and through the mixer thread, checked by
//! listening to the output buffers.

use std::thread;
use std::time::{Duration, Instant};

use approx::assert_abs_diff_eq;
use tempfile::tempdir;

use songrack::dsp::{AnalyzerModule, DelayModule};
use songrack::engine::{
    export_wav, read_wav, render_offline, render_song, DeviceBridge, ExportFormat, Mixer,
};
use songrack::history::{AddEffect, NoteAdd};
use songrack::song::MASTER_BUS;
use songrack::{EngineConfig, History, RackTarget, Song};

const SAMPLE_RATE: f64 = 48_000.0;

/// A song with one short A4 at the start of bar 0.
fn one_note_song(length_beats: f32) -> Song {
    let mut song = Song::new(&EngineConfig::default()).unwrap();
    let mut history = History::default();
    history
        .perform(&mut song, Box::new(NoteAdd::new(0, 0, 0.0, 69, length_beats)))
        .unwrap();
    song
}

fn peak(samples: &[f32]) -> f32 {
    samples.iter().fold(0.0_f32, |m, s| m.max(s.abs()))
}

/// Interleaved stereo samples between two times.
fn window(samples: &[f32], from_secs: f64, to_secs: f64) -> &[f32] {
    let start = (from_secs * SAMPLE_RATE) as usize * 2;
    let end = ((to_secs * SAMPLE_RATE) as usize * 2).min(samples.len());
    &samples[start..end]
}

#[test]
fn test_sequenced_note_is_audible_then_releases() {
    let mut song = one_note_song(1.0);
    let out = render_song(&mut song, 0.5);

    // 16 beats at 120 BPM plus the tail
    assert_eq!(out.len(), (8.5 * SAMPLE_RATE) as usize * 2);
    assert!(peak(window(&out, 0.0, 0.5)) > 0.01);
    assert_eq!(peak(window(&out, 1.0, 8.5)), 0.0);
}

#[test]
fn test_muted_channel_renders_silence() {
    let mut song = one_note_song(2.0);
    song.set_channel_mute(0, true).unwrap();
    let out = render_song(&mut song, 0.0);
    assert_eq!(peak(&out), 0.0);

    song.set_channel_mute(0, false).unwrap();
    let out = render_song(&mut song, 0.0);
    assert!(peak(&out) > 0.01);
}

#[test]
fn test_muted_bus_silences_routed_channel() {
    let mut song = one_note_song(2.0);
    let bus = song.add_bus("Drums").unwrap();
    song.set_fx_target(0, bus).unwrap();
    assert!(peak(&render_song(&mut song, 0.0)) > 0.01);

    song.set_bus_mute(bus, true).unwrap();
    assert_eq!(peak(&render_song(&mut song, 0.0)), 0.0);
}

#[test]
fn test_delay_rings_after_the_note() {
    let mut dry = one_note_song(0.25);
    let mut wet = one_note_song(0.25);
    let mut history = History::default();
    history
        .perform(&mut wet, Box::new(AddEffect::new(RackTarget::Channel(0), "effect.delay")))
        .unwrap();
    let delay = wet.effect_node(RackTarget::Channel(0), 0).unwrap();
    let controls = wet.graph().get::<DelayModule>(delay).unwrap().controls();
    controls.delay_time.set(0.3);
    controls.feedback.set(0.5);
    controls.mix.set(0.0);

    for song in [&mut dry, &mut wet] {
        song.seek_bar(0);
        song.play();
    }
    let dry_out = render_offline(&mut dry, 1.2);
    let wet_out = render_offline(&mut wet, 1.2);

    assert_eq!(peak(window(&dry_out, 0.6, 1.2)), 0.0);
    assert!(peak(window(&wet_out, 0.6, 1.2)) > 1e-3);
}

#[test]
fn test_master_analyzer_sees_the_mix() {
    let mut song = one_note_song(2.0);
    let mut history = History::default();
    history
        .perform(
            &mut song,
            Box::new(AddEffect::new(RackTarget::Bus(MASTER_BUS), "effect.analyzer")),
        )
        .unwrap();
    let node = song.effect_node(RackTarget::Bus(MASTER_BUS), 0).unwrap();
    let tap = song.graph().get::<AnalyzerModule>(node).unwrap().tap();

    song.play();
    let out = render_offline(&mut song, 0.1);
    assert!(peak(&out) > 0.0);
    assert!(tap.blocks_captured() > 0);
    let captured_peak = tap.read(|left, right| peak(left).max(peak(right)));
    assert!(captured_peak > 0.0);
}

#[test]
fn test_export_round_trip() {
    let mut song = one_note_song(1.0);
    song.play();
    let samples = render_offline(&mut song, 0.25);

    let dir = tempdir().unwrap();
    let path = dir.path().join("note.wav");
    export_wav(&path, &samples, 48_000, 2, ExportFormat::default()).unwrap();

    let data = read_wav(&path).unwrap();
    assert_eq!(data.sample_rate, 48_000);
    assert_eq!(data.channels, 2);
    assert_eq!(data.bit_depth, 24);
    assert_eq!(data.samples.len(), samples.len());
    for (read, written) in data.samples.iter().zip(&samples) {
        assert_abs_diff_eq!(*read, *written, epsilon = 1e-5);
    }
}

#[test]
fn test_mixer_streams_sequenced_audio() {
    let mut song = one_note_song(4.0);
    song.play();
    let shared = song.into_shared();

    let (bridge, mut reader) = DeviceBridge::new(48_000, 2, 8_192);
    let mixer = Mixer::spawn(shared.clone(), bridge, 256).unwrap();

    let mut out = vec![0.0; 256 * 2];
    let mut heard = 0.0_f32;
    let mut frames = 0;
    let deadline = Instant::now() + Duration::from_secs(5);
    while frames < 9_600 && Instant::now() < deadline {
        let n = reader.write(&mut out, 0, 256);
        heard = heard.max(peak(&out[..n * 2]));
        frames += n;
        thread::sleep(Duration::from_millis(1));
    }
    mixer.stop();

    assert!(frames >= 9_600);
    assert!(heard > 0.01);
    assert!(shared.lock().is_playing());
}
