//! DSP modules
//!
//! Every processing unit the song can place in the graph. All of them
//! implement [`crate::graph::Module`] and are built by name through the
//! [`ModuleRegistry`].

pub mod analyzer;
pub mod controller;
pub mod delay;
pub mod gain;
pub mod param;
pub mod registry;
pub mod synth;
pub mod volume;

pub use analyzer::{AnalyzerModule, AnalyzerTap};
pub use controller::{BusController, PeakMeter};
pub use delay::{division_to_secs, DelayControls, DelayModule};
pub use gain::GainModule;
pub use param::AtomicParam;
pub use registry::{ModuleCategory, ModuleDescriptor, ModuleRegistry};
pub use synth::{key_frequency, Envelope, Oscillator, Waveform, WaveformSynth};
pub use volume::VolumeModule;
