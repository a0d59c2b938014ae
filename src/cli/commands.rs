//! CLI Command Implementations
//!
//! Implements the actual logic for each CLI command.

use std::path::Path;

use tracing::{info, warn};

use crate::config::EngineConfig;
use crate::dsp::delay::DelayModule;
use crate::dsp::gain::GainModule;
use crate::dsp::registry::ModuleRegistry;
use crate::dsp::synth::{Envelope, WaveformSynth};
use crate::engine::buffer::channel_peak;
use crate::engine::io::{export_wav, ExportFormat};
use crate::engine::mixer::{render_offline, render_song};
use crate::error::Result;
use crate::history::{AddEffect, History, NoteAdd};
use crate::song::{RackTarget, Song, MASTER_BUS};

/// Seconds rendered after the last bar so releases and echoes ring out
const RENDER_TAIL_SECS: f64 = 1.0;

/// Chord arpeggiated in each bar of the demo song
const DEMO_CHORDS: [[i32; 3]; 4] = [[57, 60, 64], [53, 57, 60], [48, 52, 55], [55, 59, 62]];

/// Dotted half in the delay's division table
const DEMO_DELAY_DIVISION: u32 = 16;

/// Build a short song: an arpeggiated synth through a tempo-synced delay,
/// with a gain stage on the master bus.
///
/// Every edit goes through [`History`], the same path an editor uses.
pub fn build_demo_song(config: &EngineConfig) -> Result<Song> {
    let mut song = Song::new(config)?;
    let mut history = History::new(config.max_undo_levels);
    song.name = "Demo".to_string();

    let synth_id = song.channel(0)?.instrument();
    if let Some(synth) = song.graph_mut().get_mut::<WaveformSynth>(synth_id) {
        synth.set_envelope(Envelope {
            attack: 0.005,
            decay: 0.2,
            sustain: 0.4,
            release: 0.3,
        });
    }

    for (bar, chord) in DEMO_CHORDS.iter().enumerate().take(song.length()) {
        for (step, &key) in chord.iter().cycle().take(8).enumerate() {
            let note = NoteAdd::new(0, bar, step as f32 * 0.5, key, 0.4);
            history.perform(&mut song, Box::new(note))?;
        }
    }

    let channel_rack = RackTarget::Channel(0);
    history.perform(&mut song, Box::new(AddEffect::new(channel_rack, "effect.delay")))?;
    let master_rack = RackTarget::Bus(MASTER_BUS);
    history.perform(&mut song, Box::new(AddEffect::new(master_rack, "effect.gain")))?;

    let delay_id = song.effect_node(channel_rack, 0)?;
    if let Some(delay) = song.graph().get::<DelayModule>(delay_id) {
        let controls = delay.controls();
        controls.mix.set(-0.4);
        controls.feedback.set(0.35);
        controls.stereo_offset.set(0.01);
        controls.set_division(DEMO_DELAY_DIVISION);
        controls.set_tempo_sync(true);
    }
    let gain_id = song.effect_node(master_rack, 0)?;
    if let Some(gain) = song.graph_mut().get_mut::<GainModule>(gain_id) {
        gain.set_gain_db(-2.0);
    }

    info!(
        edits = history.undo_count(),
        nodes = song.graph().len(),
        "demo song built"
    );
    Ok(song)
}

fn load_config(path: Option<&Path>) -> Result<EngineConfig> {
    match path {
        Some(path) => {
            info!("Loading config: {}", path.display());
            EngineConfig::load(path)
        }
        None => Ok(EngineConfig::default()),
    }
}

fn load_song(config: &EngineConfig, demo: bool) -> Result<Song> {
    if demo {
        build_demo_song(config)
    } else {
        warn!("no song given, rendering an empty song (use --demo)");
        Song::new(config)
    }
}

/// List module types.
pub fn list_modules(json: bool) -> Result<()> {
    let registry = ModuleRegistry::new();

    if json {
        let descriptors: Vec<_> = registry.all_modules().collect();
        println!("{}", serde_json::to_string_pretty(&descriptors)?);
        return Ok(());
    }

    println!("Available modules:");
    println!("{:-<60}", "");
    for descriptor in registry.all_modules() {
        println!(
            "  {:<20} {:<16} {:<11} {}",
            descriptor.id,
            descriptor.name,
            descriptor.category.name(),
            descriptor.description
        );
    }
    Ok(())
}

/// Render a song to a WAV file.
pub fn render(
    out: &Path,
    seconds: Option<f64>,
    config_path: Option<&Path>,
    demo: bool,
    bit_depth: u16,
) -> Result<()> {
    let config = load_config(config_path)?;
    let mut song = load_song(&config, demo)?;

    let samples = match seconds {
        Some(seconds) => {
            song.seek_bar(0);
            song.play();
            render_offline(&mut song, seconds)
        }
        None => render_song(&mut song, RENDER_TAIL_SECS),
    };

    let channels = song.destination().channels();
    export_wav(
        out,
        &samples,
        song.sample_rate(),
        channels,
        ExportFormat::new(bit_depth),
    )?;

    let frames = samples.len() / channels;
    println!("Rendered '{}' to {}", song.name, out.display());
    println!(
        "  {:.2} s, {} frames, {} Hz, {}-bit",
        frames as f64 / song.sample_rate() as f64,
        frames,
        song.sample_rate(),
        bit_depth
    );
    println!(
        "  peak L {:.3}  R {:.3}",
        channel_peak(&samples, 0, channels),
        channel_peak(&samples, 1, channels)
    );
    Ok(())
}

/// Play a song through the output device.
#[cfg(feature = "cpal-output")]
pub fn play(seconds: f64, config_path: Option<&Path>, demo: bool) -> Result<()> {
    use crate::engine::cpal_output::open_output;
    use crate::engine::device::DeviceBridge;
    use crate::engine::mixer::Mixer;

    let config = load_config(config_path)?;
    let mut song = load_song(&config, demo)?;
    song.play();
    let shared = song.into_shared();

    let (bridge, reader) = DeviceBridge::from_config(&config)?;
    let stream = open_output(&config, reader)?;
    println!("Playing on {} for {:.1} s", stream.device_name(), seconds);

    let mixer = Mixer::from_config(&config, shared.clone(), bridge)?;
    let stats = mixer.stats();
    std::thread::sleep(std::time::Duration::from_secs_f64(seconds.max(0.0)));
    shared.lock().stop();
    mixer.stop();

    println!(
        "Blocks rendered: {} | dropped: {}",
        stats.blocks_rendered(),
        stats.blocks_dropped()
    );
    Ok(())
}

/// Print or validate engine configuration.
pub fn config(dump: bool, check: Option<&Path>) -> Result<()> {
    if let Some(path) = check {
        let config = EngineConfig::load(path)?;
        println!("Config OK: {}", path.display());
        println!(
            "  {} Hz, block {} frames, ring {} frames",
            config.sample_rate,
            config.block_frames,
            config.ring_capacity_frames()
        );
    }
    if dump || check.is_none() {
        print!("{}", EngineConfig::default().to_toml()?);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dsp::delay::DIVISION_NAMES;
    use crate::engine::io::read_wav;
    use tempfile::tempdir;

    #[test]
    fn test_demo_song_layout() {
        let song = build_demo_song(&EngineConfig::default()).unwrap();
        assert_eq!(song.name, "Demo");
        assert_eq!(song.rack(RackTarget::Channel(0)).unwrap().len(), 1);
        assert_eq!(song.rack(RackTarget::Bus(MASTER_BUS)).unwrap().len(), 1);
        let channel = song.channel(0).unwrap();
        assert_eq!(channel.sequence, vec![1, 2, 3, 4]);
        assert!(channel.patterns.iter().all(|p| p.notes.len() == 8));

        let delay = song.effect_node(RackTarget::Channel(0), 0).unwrap();
        let controls = song.graph().get::<DelayModule>(delay).unwrap().controls();
        assert!(controls.tempo_sync());
        assert_eq!(DIVISION_NAMES[controls.division() as usize], "1/2 dotted");
    }

    #[test]
    fn test_render_demo_writes_audio() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("demo.wav");
        render(&path, Some(1.0), None, true, 16).unwrap();

        let data = read_wav(&path).unwrap();
        assert_eq!(data.frames(), 48_000);
        assert!(data.samples.iter().any(|&s| s.abs() > 0.01));
    }

    #[test]
    fn test_render_bad_config() {
        let dir = tempdir().unwrap();
        let config = dir.path().join("bad.toml");
        std::fs::write(&config, "channels = 6\n").unwrap();
        let err = render(&dir.path().join("x.wav"), Some(0.1), Some(&config), true, 16)
            .unwrap_err();
        assert_eq!(err.error_code(), "INVALID_CONFIG");
    }
}
