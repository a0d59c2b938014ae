//! Songrack - Real-time Module Graph Engine
//!
//! Songrack renders songs through a pull-based graph of audio modules and
//! keeps every edit reversible.
//!
//! # Architecture
//!
//! - [`graph`]: modules live in an arena; the destination pulls blocks
//!   through input edges, and effects racks keep their chains wired
//! - [`dsp`]: the built-in modules and the factory that builds them by id
//! - [`song`]: channels, FX buses, patterns and the sequencer
//! - [`history`]: undo/redo over song edits, with merging of repeated edits
//! - [`engine`]: the mixer thread, the lock-free ring to the device, and
//!   WAV export

pub mod cli;
pub mod config;
pub mod dsp;
pub mod engine;
pub mod error;
pub mod graph;
pub mod history;
pub mod snapshot;
pub mod song;

pub use config::EngineConfig;
pub use error::{Result, SongrackError};
pub use graph::{Module, ModuleGraph, NodeId, Target};
pub use history::{Action, ActionKind, History};
pub use song::{RackTarget, SharedSong, Song};
