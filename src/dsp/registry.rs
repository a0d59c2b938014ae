//! Module factory
//!
//! Maps stable type ids (`"effect.delay"`, `"synth.waveform"`, ...) to
//! constructors. Snapshots store only the id and the state blob, so every
//! saved or undone module is rebuilt through here.
//!
//! # Example
//!
//! ```
//! use songrack::dsp::registry::{ModuleCategory, ModuleRegistry};
//!
//! let registry = ModuleRegistry::new();
//! let delay = registry.create("effect.delay", 48_000).unwrap();
//! assert_eq!(delay.module_id(), "effect.delay");
//!
//! for descriptor in registry.in_category(ModuleCategory::Instrument) {
//!     println!("{}: {}", descriptor.id, descriptor.name);
//! }
//! ```

use serde::Serialize;

use crate::dsp::analyzer::AnalyzerModule;
use crate::dsp::controller::BusController;
use crate::dsp::delay::DelayModule;
use crate::dsp::gain::GainModule;
use crate::dsp::synth::WaveformSynth;
use crate::dsp::volume::VolumeModule;
use crate::graph::module::Module;

/// What role a module plays in a song.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ModuleCategory {
    /// Sound sources driven by note events
    Instrument,
    /// Rack effects
    Effect,
    /// Faders the song places itself
    Mixing,
}

impl ModuleCategory {
    pub const fn name(&self) -> &'static str {
        match self {
            ModuleCategory::Instrument => "Instrument",
            ModuleCategory::Effect => "Effect",
            ModuleCategory::Mixing => "Mixing",
        }
    }
}

/// Describes a registered module type.
#[derive(Debug, Clone, Serialize)]
pub struct ModuleDescriptor {
    /// Stable type id, stored in snapshots
    pub id: &'static str,
    /// Human-readable name
    pub name: &'static str,
    pub description: &'static str,
    pub category: ModuleCategory,
}

/// Factory function type for creating modules at a sample rate.
type ModuleFactory = fn(u32) -> Box<dyn Module>;

struct RegistryEntry {
    descriptor: ModuleDescriptor,
    factory: ModuleFactory,
}

/// Registry of every built-in module type.
pub struct ModuleRegistry {
    entries: Vec<RegistryEntry>,
}

impl Default for ModuleRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for ModuleRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_list().entries(self.ids()).finish()
    }
}

impl ModuleRegistry {
    /// Create a registry with all built-in modules registered.
    pub fn new() -> Self {
        let mut registry = Self {
            entries: Vec::with_capacity(6),
        };
        registry.register_builtin_modules();
        registry
    }

    fn register_builtin_modules(&mut self) {
        self.register(
            ModuleDescriptor {
                id: "synth.waveform",
                name: "Waveform Synth",
                description: "16-voice synth with three oscillators and an ADSR envelope",
                category: ModuleCategory::Instrument,
            },
            |_| Box::new(WaveformSynth::new()),
        );

        self.register(
            ModuleDescriptor {
                id: "effect.delay",
                name: "Delay",
                description: "Stereo feedback delay with optional tempo sync",
                category: ModuleCategory::Effect,
            },
            |sr| Box::new(DelayModule::new(sr)),
        );

        self.register(
            ModuleDescriptor {
                id: "effect.gain",
                name: "Gain",
                description: "Static gain stage in decibels",
                category: ModuleCategory::Effect,
            },
            |_| Box::new(GainModule::default()),
        );

        self.register(
            ModuleDescriptor {
                id: "effect.analyzer",
                name: "Analyzer",
                description: "Pass-through that captures blocks for display",
                category: ModuleCategory::Effect,
            },
            |_| Box::new(AnalyzerModule::new()),
        );

        self.register(
            ModuleDescriptor {
                id: "effect.volume",
                name: "Volume",
                description: "Channel fader with panning and mute",
                category: ModuleCategory::Mixing,
            },
            |_| Box::new(VolumeModule::new()),
        );

        self.register(
            ModuleDescriptor {
                id: "effect.controller",
                name: "Bus Controller",
                description: "FX bus fader with peak metering",
                category: ModuleCategory::Mixing,
            },
            |_| Box::new(BusController::new()),
        );
    }

    fn register(&mut self, descriptor: ModuleDescriptor, factory: ModuleFactory) {
        self.entries.push(RegistryEntry {
            descriptor,
            factory,
        });
    }

    /// Build a fresh module, or `None` for an unknown id.
    pub fn create(&self, id: &str, sample_rate: u32) -> Option<Box<dyn Module>> {
        match self.entries.iter().find(|e| e.descriptor.id == id) {
            Some(entry) => Some((entry.factory)(sample_rate)),
            None => {
                tracing::warn!(id, "unknown module id");
                None
            }
        }
    }

    /// Descriptor for `id`
    pub fn describe(&self, id: &str) -> Option<&ModuleDescriptor> {
        self.entries
            .iter()
            .map(|e| &e.descriptor)
            .find(|d| d.id == id)
    }

    /// Every registered id, in registration order
    pub fn ids(&self) -> Vec<&'static str> {
        self.entries.iter().map(|e| e.descriptor.id).collect()
    }

    pub fn all_modules(&self) -> impl Iterator<Item = &ModuleDescriptor> {
        self.entries.iter().map(|e| &e.descriptor)
    }

    pub fn in_category(&self, category: ModuleCategory) -> impl Iterator<Item = &ModuleDescriptor> {
        self.all_modules().filter(move |d| d.category == category)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
