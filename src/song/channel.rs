//! Channels
//!
//! A channel is one instrument feeding its own effects rack and fader,
//! with a sequence of patterns laid out bar by bar.

use crate::graph::{EffectsRack, NodeId};
use crate::song::pattern::Pattern;

/// Max characters kept from a channel or bus name
pub const NAME_CAPACITY: usize = 15;

pub(crate) fn clip_name(name: &str) -> String {
    name.chars().take(NAME_CAPACITY).collect()
}

/// One instrument track.
///
/// `sequence[bar]` is 0 for an empty bar, otherwise the 1-based index of
/// the pattern playing in that bar.
#[derive(Debug, Clone)]
pub struct Channel {
    pub name: String,
    pub solo: bool,
    pub sequence: Vec<usize>,
    pub patterns: Vec<Pattern>,
    pub(crate) fx_target: usize,
    pub(crate) instrument: NodeId,
    pub(crate) rack: EffectsRack,
    pub(crate) volume: NodeId,
}

impl Channel {
    pub(crate) fn new(
        name: &str,
        length: usize,
        max_patterns: usize,
        instrument: NodeId,
        volume: NodeId,
    ) -> Self {
        Self {
            name: clip_name(name),
            solo: false,
            sequence: vec![0; length],
            patterns: vec![Pattern::new(); max_patterns],
            fx_target: 0,
            instrument,
            rack: EffectsRack::new(),
            volume,
        }
    }

    /// FX bus this channel's fader feeds
    pub fn fx_target(&self) -> usize {
        self.fx_target
    }

    pub fn instrument(&self) -> NodeId {
        self.instrument
    }

    pub fn rack(&self) -> &EffectsRack {
        &self.rack
    }

    /// Node of the channel's [`crate::dsp::VolumeModule`]
    pub fn volume(&self) -> NodeId {
        self.volume
    }

    /// Index of the first pattern with no notes
    pub fn first_empty_pattern(&self) -> Option<usize> {
        self.patterns.iter().position(Pattern::is_empty)
    }

    /// Pattern scheduled in `bar`, if any
    pub fn pattern_at_bar(&self, bar: usize) -> Option<&Pattern> {
        let number = *self.sequence.get(bar)?;
        number.checked_sub(1).and_then(|i| self.patterns.get(i))
    }
}
