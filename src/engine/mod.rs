//! Audio Engine Module
//!
//! Everything between the module graph and the outside world:
//! - Frame buffers owned by graph nodes
//! - The lock-free ring and device bridge
//! - The mixer thread and offline rendering
//! - WAV export

pub mod buffer;
#[cfg(feature = "cpal-output")]
pub mod cpal_output;
pub mod device;
pub mod io;
pub mod mixer;
pub mod ring;

pub use buffer::{db_to_factor, AudioFrameBuffer};
pub use device::DeviceBridge;
pub use io::{export_wav, read_wav, ExportFormat, WavData};
pub use mixer::{render_offline, render_song, song_duration_secs, Mixer, MixerStats};
pub use ring::{frame_ring, RingReader, RingWriter};
