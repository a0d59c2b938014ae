//! Mixer thread and offline rendering
//!
//! The mixer keeps the device ring topped up: while the backlog is under
//! its target it locks the song for one block, advances the sequencer,
//! renders, and queues the block. The same update-then-render step drives
//! offline renders.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use crate::config::EngineConfig;
use crate::engine::device::DeviceBridge;
use crate::error::Result;
use crate::song::{SharedSong, Song, BEATS_PER_BAR};

/// Backlog the mixer aims to keep queued, in seconds
pub const TARGET_BACKLOG_SECS: f64 = 0.05;

/// Block size of offline renders
pub const OFFLINE_BLOCK_FRAMES: usize = 64;

/// Failed queue attempts before a rendered block is dropped
const MAX_QUEUE_RETRIES: u32 = 8;

const POLL_INTERVAL: Duration = Duration::from_millis(1);

/// Counters shared between the mixer thread and its owner.
#[derive(Debug, Default)]
pub struct MixerStats {
    blocks_rendered: AtomicU64,
    blocks_dropped: AtomicU64,
}

impl MixerStats {
    /// Blocks rendered and queued
    pub fn blocks_rendered(&self) -> u64 {
        self.blocks_rendered.load(Ordering::Relaxed)
    }

    /// Blocks rendered but thrown away because the ring stayed full
    pub fn blocks_dropped(&self) -> u64 {
        self.blocks_dropped.load(Ordering::Relaxed)
    }
}

/// Handle to a running mixer thread. Dropping it stops the thread.
pub struct Mixer {
    running: Arc<AtomicBool>,
    stats: Arc<MixerStats>,
    handle: Option<JoinHandle<DeviceBridge>>,
}

impl Mixer {
    /// Start rendering `song` into `bridge` in blocks of `block_frames`.
    pub fn spawn(song: SharedSong, bridge: DeviceBridge, block_frames: usize) -> Result<Self> {
        let running = Arc::new(AtomicBool::new(true));
        let stats = Arc::new(MixerStats::default());

        let target_frames = ((bridge.sample_rate() as f64 * TARGET_BACKLOG_SECS) as usize)
            .max(block_frames)
            .min(bridge.capacity_frames());
        tracing::info!(block_frames, target_frames, "mixer starting");

        let worker = MixerWorker {
            song,
            bridge,
            block_frames: block_frames.max(1),
            target_frames,
            running: Arc::clone(&running),
            stats: Arc::clone(&stats),
        };
        let handle = thread::Builder::new()
            .name("songrack-mixer".to_string())
            .spawn(move || worker.run())?;

        Ok(Self {
            running,
            stats,
            handle: Some(handle),
        })
    }

    /// Start a mixer with the block size from `config`.
    pub fn from_config(config: &EngineConfig, song: SharedSong, bridge: DeviceBridge) -> Result<Self> {
        Self::spawn(song, bridge, config.block_frames)
    }

    pub fn stats(&self) -> Arc<MixerStats> {
        Arc::clone(&self.stats)
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::Acquire)
    }

    /// Stop rendering, wait for the queued backlog to play out, and hand
    /// the bridge back.
    pub fn stop(mut self) -> Option<DeviceBridge> {
        self.shutdown()
    }

    fn shutdown(&mut self) -> Option<DeviceBridge> {
        self.running.store(false, Ordering::Release);
        let handle = self.handle.take()?;
        match handle.join() {
            Ok(bridge) => Some(bridge),
            Err(_) => {
                tracing::error!("mixer thread panicked");
                None
            }
        }
    }
}

impl Drop for Mixer {
    fn drop(&mut self) {
        self.shutdown();
    }
}

struct MixerWorker {
    song: SharedSong,
    bridge: DeviceBridge,
    block_frames: usize,
    target_frames: usize,
    running: Arc<AtomicBool>,
    stats: Arc<MixerStats>,
}

impl MixerWorker {
    fn run(mut self) -> DeviceBridge {
        let channels = self.bridge.num_channels();
        let elapsed = self.block_frames as f64 / self.bridge.sample_rate() as f64;
        let mut block = vec![0.0; self.block_frames * channels];
        let mut pending = false;
        let mut retries = 0;

        while self.running.load(Ordering::Acquire) {
            if self.bridge.num_queued_frames() >= self.target_frames {
                thread::sleep(POLL_INTERVAL);
                continue;
            }

            if !pending {
                let mut song = self.song.lock();
                song.update(elapsed);
                song.render(&mut block);
                pending = true;
            }

            if self.bridge.queue(&block) {
                self.stats.blocks_rendered.fetch_add(1, Ordering::Relaxed);
                pending = false;
                retries = 0;
            } else {
                retries += 1;
                if retries >= MAX_QUEUE_RETRIES {
                    tracing::warn!(retries, "ring full, dropping block");
                    self.stats.blocks_dropped.fetch_add(1, Ordering::Relaxed);
                    pending = false;
                    retries = 0;
                } else {
                    thread::sleep(POLL_INTERVAL);
                }
            }
        }

        self.drain();
        tracing::info!(
            rendered = self.stats.blocks_rendered(),
            dropped = self.stats.blocks_dropped(),
            "mixer stopped"
        );
        self.bridge
    }

    /// Wait for the device to consume the backlog, bounded by its length.
    fn drain(&self) {
        let deadline = Instant::now()
            + Duration::from_secs_f64(self.bridge.latency_secs())
            + Duration::from_millis(20);
        while self.bridge.num_queued_frames() > 0 && Instant::now() < deadline {
            thread::sleep(POLL_INTERVAL);
        }
    }
}

// ============================================================================
// Offline rendering
// ============================================================================

/// Render `seconds` of audio from the song's current transport state.
pub fn render_offline(song: &mut Song, seconds: f64) -> Vec<f32> {
    let sample_rate = song.sample_rate() as f64;
    let channels = song.destination().channels();
    let mut remaining = (seconds.max(0.0) * sample_rate).round() as usize;

    let mut out = Vec::with_capacity(remaining * channels);
    let mut block = vec![0.0; OFFLINE_BLOCK_FRAMES * channels];
    while remaining > 0 {
        let frames = remaining.min(OFFLINE_BLOCK_FRAMES);
        song.update(frames as f64 / sample_rate);
        let rendered = song.render(&mut block[..frames * channels]);
        out.extend_from_slice(&block[..rendered * channels]);
        remaining -= frames;
    }
    out
}

/// Length of one pass through the song in seconds
pub fn song_duration_secs(song: &Song) -> f64 {
    let beats = (song.length() as u32 * BEATS_PER_BAR) as f64;
    beats * 60.0 / song.tempo() as f64
}

/// Play the whole song once from bar 0 and return the rendered audio
/// plus `tail_secs` of release and echo tail.
pub fn render_song(song: &mut Song, tail_secs: f64) -> Vec<f32> {
    song.stop();
    song.seek_bar(0);
    song.set_looping(false);
    song.play();
    render_offline(song, song_duration_secs(song) + tail_secs.max(0.0))
}
