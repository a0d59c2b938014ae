//! CLI Module
//!
//! Command-line interface for the songrack engine.

pub mod commands;

use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// Songrack - module graph engine and song renderer
#[derive(Parser, Debug)]
#[command(name = "songrack-cli")]
#[command(version, about, long_about = None)]
pub struct Cli {
    /// Enable verbose output
    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Option<Commands>,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// List the module types the factory can build
    #[command(name = "modules")]
    Modules {
        /// Print descriptors as JSON
        #[arg(long)]
        json: bool,
    },

    /// Render a song to a WAV file
    #[command(name = "render")]
    Render {
        /// Output WAV path
        #[arg(short, long)]
        out: PathBuf,

        /// Seconds to render (default: one pass through the song)
        #[arg(short, long)]
        seconds: Option<f64>,

        /// Engine config file (TOML)
        #[arg(short, long)]
        config: Option<PathBuf>,

        /// Build the demo song (synth, delay and gain)
        #[arg(long)]
        demo: bool,

        /// Bit depth: 16, 24 or 32
        #[arg(long, default_value_t = 24)]
        bit_depth: u16,
    },

    /// Play a song through the output device
    #[cfg(feature = "cpal-output")]
    #[command(name = "play")]
    Play {
        /// Seconds to play
        #[arg(short, long, default_value_t = 8.0)]
        seconds: f64,

        /// Engine config file (TOML)
        #[arg(short, long)]
        config: Option<PathBuf>,

        /// Build the demo song (synth, delay and gain)
        #[arg(long)]
        demo: bool,
    },

    /// Show or check engine configuration
    #[command(name = "config")]
    Config {
        /// Print the default config as TOML
        #[arg(long)]
        dump: bool,

        /// Validate a config file
        #[arg(long)]
        check: Option<PathBuf>,
    },
}
