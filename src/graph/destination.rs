//! Destination
//!
//! The graph root. Each call to [`Destination::process`] evaluates the
//! whole graph once and advances the playback clock by the frames rendered.

use crate::graph::module::ProcessContext;
use crate::graph::node_graph::ModuleGraph;

/// Root sink of a [`ModuleGraph`], paired with one output stream.
#[derive(Debug, Clone)]
pub struct Destination {
    sample_rate: u32,
    channels: usize,
    frame_time: u64,
}

impl Destination {
    /// Create a destination for a stream of the given format.
    pub fn new(sample_rate: u32, channels: usize) -> Self {
        Self {
            sample_rate,
            channels: channels.max(1),
            frame_time: 0,
        }
    }

    /// Render one block into `out` and return the frames rendered.
    ///
    /// `out` holds interleaved samples; its length decides the block size.
    /// Samples past the last whole frame are zeroed.
    pub fn process(&mut self, graph: &mut ModuleGraph, out: &mut [f32], tempo: f32) -> usize {
        let frames = out.len() / self.channels;
        let ctx = ProcessContext::new(frames, self.channels, self.sample_rate).with_tempo(tempo);
        let (block, tail) = out.split_at_mut(frames * self.channels);
        graph.render_root(block, &ctx);
        tail.fill(0.0);
        self.frame_time += frames as u64;
        frames
    }

    /// Playback time in seconds, accumulated from rendered frames.
    pub fn time(&self) -> f64 {
        self.frame_time as f64 / self.sample_rate as f64
    }

    /// Frames rendered since creation or the last reset
    pub fn frame_time(&self) -> u64 {
        self.frame_time
    }

    /// Rewind the clock to zero.
    pub fn reset_time(&mut self) {
        self.frame_time = 0;
    }

    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    pub fn channels(&self) -> usize {
        self.channels
    }
}
