//! Analyzer
//!
//! Pass-through node that copies each rendered block into a double buffer
//! for visualisation. The render thread writes the back buffer and flips;
//! readers only ever lock the front one.

use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;

use crate::graph::module::{Inputs, Module, ProcessContext};
use crate::impl_module_common;
use crate::snapshot::StateReader;

/// One captured block, split per channel.
#[derive(Debug, Default, Clone)]
struct Capture {
    left: Vec<f32>,
    right: Vec<f32>,
}

/// Shared capture buffers.
#[derive(Debug, Default)]
pub struct AnalyzerTap {
    buffers: [Mutex<Capture>; 2],
    front: AtomicUsize,
    blocks: AtomicU64,
}

impl AnalyzerTap {
    /// Run `f` over the most recently captured left and right channels.
    pub fn read<R>(&self, f: impl FnOnce(&[f32], &[f32]) -> R) -> R {
        let front = self.front.load(Ordering::Acquire);
        let capture = self.buffers[front].lock();
        f(&capture.left, &capture.right)
    }

    /// Blocks captured so far
    pub fn blocks_captured(&self) -> u64 {
        self.blocks.load(Ordering::Relaxed)
    }

    fn capture(&self, samples: &[f32], channels: usize) {
        let back = 1 - self.front.load(Ordering::Acquire);
        // A reader still holds the back buffer from before the last flip;
        // drop this block rather than wait.
        let Some(mut capture) = self.buffers[back].try_lock() else {
            return;
        };

        let frames = samples.len() / channels.max(1);
        capture.left.clear();
        capture.right.clear();
        capture.left.reserve(frames);
        capture.right.reserve(frames);
        for frame in samples.chunks_exact(channels.max(1)) {
            capture.left.push(frame[0]);
            capture.right.push(frame.get(1).copied().unwrap_or(frame[0]));
        }
        drop(capture);

        self.front.store(back, Ordering::Release);
        self.blocks.fetch_add(1, Ordering::Relaxed);
    }
}

/// Passive analyzer: output equals the summed input.
#[derive(Debug, Default)]
pub struct AnalyzerModule {
    tap: Arc<AnalyzerTap>,
}

impl AnalyzerModule {
    pub fn new() -> Self {
        Self::default()
    }

    /// Handle for reading captured blocks from another thread
    pub fn tap(&self) -> Arc<AnalyzerTap> {
        Arc::clone(&self.tap)
    }
}

impl Module for AnalyzerModule {
    impl_module_common!("effect.analyzer", "Analyzer");

    fn process(&mut self, inputs: &Inputs<'_>, output: &mut [f32], ctx: &ProcessContext) {
        inputs.sum_into(output);
        self.tap.capture(output, ctx.channels);
    }

    fn state_size(&self) -> usize {
        0
    }

    fn save_state(&self, _out: &mut Vec<u8>) {}

    fn load_state(&mut self, blob: &[u8]) -> bool {
        StateReader::exact(blob, 0).is_some()
    }
}
