//! Module trait definition
//!
//! Base trait for every processing unit in the graph: synths, effects,
//! faders and meters. Modules render interleaved stereo blocks and carry
//! their tunable state in a fixed-size binary blob.

use std::any::Any;

use crate::graph::node_graph::NodeEntry;
use crate::graph::NodeId;

// ============================================================================
// Events
// ============================================================================

/// A note event queued on a node and delivered before its next render.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum NoteEvent {
    /// Start a note. `volume` is 0..1.
    NoteOn { key: i32, volume: f32 },
    /// Release every voice playing `key`.
    NoteOff { key: i32 },
}

// ============================================================================
// Process context
// ============================================================================

/// Block parameters shared by every node in one graph evaluation.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ProcessContext {
    /// Frames in this block
    pub frames: usize,
    /// Interleaved channels
    pub channels: usize,
    /// Sample rate in Hz
    pub sample_rate: u32,
    /// Song tempo in BPM, for tempo-synced units
    pub tempo: f32,
}

impl ProcessContext {
    /// Context for a block at the default tempo.
    pub fn new(frames: usize, channels: usize, sample_rate: u32) -> Self {
        Self {
            frames,
            channels,
            sample_rate,
            tempo: 120.0,
        }
    }

    /// Same block with a different tempo.
    pub fn with_tempo(mut self, tempo: f32) -> Self {
        self.tempo = tempo;
        self
    }

    /// Samples per interleaved buffer
    pub fn samples(&self) -> usize {
        self.frames * self.channels
    }
}

// ============================================================================
// Inputs
// ============================================================================

enum InputSource<'a> {
    Graph {
        entries: &'a [NodeEntry],
        ids: &'a [NodeId],
    },
    Slices(&'a [&'a [f32]]),
}

/// Read-only view over the rendered buffers of a node's inputs.
///
/// Borrowed for the duration of one `process` call; building one does not
/// allocate.
pub struct Inputs<'a> {
    source: InputSource<'a>,
}

impl<'a> Inputs<'a> {
    pub(crate) fn from_graph(entries: &'a [NodeEntry], ids: &'a [NodeId]) -> Self {
        Self {
            source: InputSource::Graph { entries, ids },
        }
    }

    /// Wrap plain buffers, for driving a module outside a graph.
    pub fn from_slices(slices: &'a [&'a [f32]]) -> Self {
        Self {
            source: InputSource::Slices(slices),
        }
    }

    /// No inputs
    pub fn none() -> Inputs<'static> {
        Inputs {
            source: InputSource::Slices(&[]),
        }
    }

    /// Number of connected inputs
    pub fn len(&self) -> usize {
        match &self.source {
            InputSource::Graph { ids, .. } => ids.len(),
            InputSource::Slices(slices) => slices.len(),
        }
    }

    /// True when nothing is connected
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Rendered buffer of input `index`.
    pub fn get(&self, index: usize) -> Option<&'a [f32]> {
        match self.source {
            InputSource::Graph { entries, ids } => {
                let id = ids.get(index)?;
                let entry = entries.get(id.index())?;
                if entry.generation != id.generation() {
                    return None;
                }
                entry.node.as_ref().map(|node| node.buffer.as_slice())
            }
            InputSource::Slices(slices) => slices.get(index).copied(),
        }
    }

    /// Iterate over every input buffer.
    pub fn iter(&self) -> impl Iterator<Item = &'a [f32]> + '_ {
        (0..self.len()).filter_map(move |i| self.get(i))
    }

    /// Sum of all inputs at one interleaved sample position.
    #[inline]
    pub fn sample(&self, index: usize) -> f32 {
        self.iter()
            .map(|buffer| buffer.get(index).copied().unwrap_or(0.0))
            .sum()
    }

    /// Write the per-sample sum of all inputs into `output`.
    pub fn sum_into(&self, output: &mut [f32]) {
        output.fill(0.0);
        for buffer in self.iter() {
            for (out, &s) in output.iter_mut().zip(buffer) {
                *out += s;
            }
        }
    }
}

// ============================================================================
// Module trait
// ============================================================================

/// A processing unit in the module graph.
///
/// `process` runs on the render thread and must not allocate on the steady
/// state path. Everything else runs on the control side.
pub trait Module: Send + 'static {
    /// Factory identifier, e.g. `"effect.delay"`
    fn module_id(&self) -> &'static str;

    /// Human-readable display name
    fn display_name(&self) -> &str;

    /// Render one block into `output` (`ctx.frames * ctx.channels` samples).
    fn process(&mut self, inputs: &Inputs<'_>, output: &mut [f32], ctx: &ProcessContext);

    /// Handle a queued note event. Effects ignore them.
    fn event(&mut self, _event: NoteEvent) {}

    /// Size in bytes of the blob written by `save_state`.
    fn state_size(&self) -> usize;

    /// Append the module's tunable state to `out`.
    fn save_state(&self, out: &mut Vec<u8>);

    /// Restore state from a blob written by `save_state`.
    ///
    /// Returns false and leaves the module untouched when the blob has the
    /// wrong size or version.
    fn load_state(&mut self, blob: &[u8]) -> bool;

    fn as_any(&self) -> &dyn Any;

    fn as_any_mut(&mut self) -> &mut dyn Any;
}

/// Helper macro to implement the identity and downcast methods of [`Module`]
#[macro_export]
macro_rules! impl_module_common {
    ($module_id:expr, $display_name:expr) => {
        fn module_id(&self) -> &'static str {
            $module_id
        }

        fn display_name(&self) -> &str {
            $display_name
        }

        fn as_any(&self) -> &dyn std::any::Any {
            self
        }

        fn as_any_mut(&mut self) -> &mut dyn std::any::Any {
            self
        }
    };
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_inputs_from_slices_sum() {
        let a = [1.0, 2.0, 3.0, 4.0];
        let b = [0.5, 0.5, 0.5, 0.5];
        let slices: [&[f32]; 2] = [&a, &b];
        let inputs = Inputs::from_slices(&slices);

        assert_eq!(inputs.len(), 2);
        assert_eq!(inputs.sample(2), 3.5);

        let mut out = [9.0; 4];
        inputs.sum_into(&mut out);
        assert_eq!(out, [1.5, 2.5, 3.5, 4.5]);
    }

    #[test]
    fn test_no_inputs_sum_to_silence() {
        let inputs = Inputs::none();
        assert!(inputs.is_empty());
        assert_eq!(inputs.sample(0), 0.0);
        let mut out = [1.0; 4];
        inputs.sum_into(&mut out);
        assert_eq!(out, [0.0; 4]);
    }

    #[test]
    fn test_context_samples() {
        let ctx = ProcessContext::new(128, 2, 48_000).with_tempo(90.0);
        assert_eq!(ctx.samples(), 256);
        assert_eq!(ctx.tempo, 90.0);
    }
}
