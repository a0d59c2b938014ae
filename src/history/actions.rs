//! Concrete song edits
//!
//! Value edits (tempo, faders, routing, sequence cells) carry their old and
//! new values. Structural edits snapshot whatever they destroy when they
//! run, so undo can rebuild it through the module registry.

use std::any::Any;

use crate::error::{Result, SongrackError};
use crate::history::action::{downcast, Action, ActionKind};
use crate::snapshot::ModuleData;
use crate::song::{Note, Pattern, RackTarget, Song};

/// Fills in the `kind` and `as_any` boilerplate of [`Action`].
macro_rules! impl_action_common {
    ($kind:expr) => {
        fn kind(&self) -> ActionKind {
            $kind
        }

        fn as_any(&self) -> &dyn Any {
            self
        }
    };
}

fn invalid(reason: impl Into<String>) -> SongrackError {
    SongrackError::InvalidAction {
        reason: reason.into(),
    }
}

/// Pattern scheduled at (`channel`, `bar`).
fn scheduled_pattern(song: &mut Song, channel: usize, bar: usize) -> Result<&mut Pattern> {
    let cell = song.sequence_cell(channel, bar)?;
    let index = cell
        .checked_sub(1)
        .ok_or_else(|| invalid(format!("no pattern in bar {bar} of channel {channel}")))?;
    let ch = song.channel_mut(channel)?;
    let len = ch.patterns.len();
    ch.patterns
        .get_mut(index)
        .ok_or_else(|| SongrackError::out_of_range("pattern", index, len))
}

// ============================================================================
// Song properties
// ============================================================================

/// Tempo change. Consecutive tempo edits merge.
#[derive(Debug, Clone)]
pub struct SongTempo {
    old: f32,
    new: f32,
}

impl SongTempo {
    pub fn new(old: f32, new: f32) -> Self {
        Self { old, new }
    }
}

impl Action for SongTempo {
    impl_action_common!(ActionKind::SongTempo);

    fn undo(&mut self, song: &mut Song) -> Result<()> {
        song.set_tempo(self.old);
        Ok(())
    }

    fn redo(&mut self, song: &mut Song) -> Result<()> {
        song.set_tempo(self.new);
        Ok(())
    }

    fn merge(&mut self, other: &dyn Action) -> bool {
        match downcast::<SongTempo>(other) {
            Some(next) => {
                self.new = next.new;
                true
            }
            None => false,
        }
    }

    fn describe(&self) -> String {
        format!("Change Tempo {} -> {}", self.old, self.new)
    }
}

/// Every channel's sequence, used to restore cells that a shrinking
/// pattern count cleared.
type SequenceSnapshot = Vec<Vec<usize>>;

fn capture_sequences(song: &Song) -> SequenceSnapshot {
    song.channels().iter().map(|c| c.sequence.clone()).collect()
}

fn apply_sequences(song: &mut Song, snapshot: &SequenceSnapshot) -> Result<()> {
    let max_patterns = song.max_patterns();
    for (index, cells) in snapshot.iter().enumerate().take(song.channels().len()) {
        let channel = song.channel_mut(index)?;
        for (cell, &value) in channel.sequence.iter_mut().zip(cells) {
            *cell = if value > max_patterns { 0 } else { value };
        }
    }
    Ok(())
}

/// Pattern count change. Keeps the sequence from before the edit so a
/// shrink can be undone without losing cells. Consecutive edits merge.
#[derive(Debug, Clone)]
pub struct SongMaxPatterns {
    old: usize,
    new: usize,
    before: SequenceSnapshot,
    after: Option<SequenceSnapshot>,
}

impl SongMaxPatterns {
    /// Capture the song as it is before changing the count to `new`.
    pub fn new(song: &Song, new: usize) -> Self {
        Self {
            old: song.max_patterns(),
            new,
            before: capture_sequences(song),
            after: None,
        }
    }
}

impl Action for SongMaxPatterns {
    impl_action_common!(ActionKind::SongMaxPatterns);

    fn undo(&mut self, song: &mut Song) -> Result<()> {
        self.after = Some(capture_sequences(song));
        song.set_max_patterns(self.old);
        apply_sequences(song, &self.before)
    }

    fn redo(&mut self, song: &mut Song) -> Result<()> {
        if let Some(after) = &self.after {
            apply_sequences(song, after)?;
        }
        song.set_max_patterns(self.new);
        Ok(())
    }

    fn merge(&mut self, other: &dyn Action) -> bool {
        match downcast::<SongMaxPatterns>(other) {
            Some(next) => {
                self.new = next.new;
                true
            }
            None => false,
        }
    }

    fn describe(&self) -> String {
        format!("Change Pattern Count {} -> {}", self.old, self.new)
    }
}

// ============================================================================
// Channel faders and routing
// ============================================================================

/// Fader level change. Consecutive edits on one channel merge.
#[derive(Debug, Clone)]
pub struct ChannelVolume {
    channel: usize,
    old: f32,
    new: f32,
}

impl ChannelVolume {
    pub fn new(channel: usize, old: f32, new: f32) -> Self {
        Self { channel, old, new }
    }
}

impl Action for ChannelVolume {
    impl_action_common!(ActionKind::ChannelVolume);

    fn undo(&mut self, song: &mut Song) -> Result<()> {
        song.set_channel_volume(self.channel, self.old)
    }

    fn redo(&mut self, song: &mut Song) -> Result<()> {
        song.set_channel_volume(self.channel, self.new)
    }

    fn merge(&mut self, other: &dyn Action) -> bool {
        match downcast::<ChannelVolume>(other) {
            Some(next) if next.channel == self.channel => {
                self.new = next.new;
                true
            }
            _ => false,
        }
    }
}

/// Pan change. Consecutive edits on one channel merge.
#[derive(Debug, Clone)]
pub struct ChannelPanning {
    channel: usize,
    old: f32,
    new: f32,
}

impl ChannelPanning {
    pub fn new(channel: usize, old: f32, new: f32) -> Self {
        Self { channel, old, new }
    }
}

impl Action for ChannelPanning {
    impl_action_common!(ActionKind::ChannelPanning);

    fn undo(&mut self, song: &mut Song) -> Result<()> {
        song.set_channel_panning(self.channel, self.old)
    }

    fn redo(&mut self, song: &mut Song) -> Result<()> {
        song.set_channel_panning(self.channel, self.new)
    }

    fn merge(&mut self, other: &dyn Action) -> bool {
        match downcast::<ChannelPanning>(other) {
            Some(next) if next.channel == self.channel => {
                self.new = next.new;
                true
            }
            _ => false,
        }
    }
}

/// Re-route a channel to another FX bus.
#[derive(Debug, Clone)]
pub struct ChannelOutput {
    channel: usize,
    old: usize,
    new: usize,
}

impl ChannelOutput {
    pub fn new(channel: usize, old: usize, new: usize) -> Self {
        Self { channel, old, new }
    }
}

impl Action for ChannelOutput {
    impl_action_common!(ActionKind::ChannelOutput);

    fn undo(&mut self, song: &mut Song) -> Result<()> {
        song.set_fx_target(self.channel, self.old)
    }

    fn redo(&mut self, song: &mut Song) -> Result<()> {
        song.set_fx_target(self.channel, self.new)
    }

    fn describe(&self) -> String {
        format!(
            "Route channel {} from bus {} to bus {}",
            self.channel, self.old, self.new
        )
    }
}

// ============================================================================
// Effects racks
// ============================================================================

/// Append a new effect to a rack.
#[derive(Debug, Clone)]
pub struct AddEffect {
    target: RackTarget,
    module_id: String,
}

impl AddEffect {
    pub fn new(target: RackTarget, module_id: &str) -> Self {
        Self {
            target,
            module_id: module_id.to_string(),
        }
    }
}

impl Action for AddEffect {
    impl_action_common!(ActionKind::AddEffect);

    fn undo(&mut self, song: &mut Song) -> Result<()> {
        let last = song
            .rack(self.target)?
            .len()
            .checked_sub(1)
            .ok_or_else(|| invalid(format!("rack on {} is empty", self.target)))?;
        song.remove_effect(self.target, last)?;
        Ok(())
    }

    fn redo(&mut self, song: &mut Song) -> Result<()> {
        let module = song.create_module(&self.module_id)?;
        let end = song.rack(self.target)?.len();
        song.insert_effect(self.target, end, module)?;
        Ok(())
    }

    fn describe(&self) -> String {
        format!("Add {} to {}", self.module_id, self.target)
    }
}

/// Take an effect out of a rack. Its state is captured when removed.
#[derive(Debug, Clone)]
pub struct RemoveEffect {
    target: RackTarget,
    index: usize,
    data: Option<ModuleData>,
}

impl RemoveEffect {
    pub fn new(target: RackTarget, index: usize) -> Self {
        Self {
            target,
            index,
            data: None,
        }
    }
}

impl Action for RemoveEffect {
    impl_action_common!(ActionKind::RemoveEffect);

    fn undo(&mut self, song: &mut Song) -> Result<()> {
        let data = self
            .data
            .as_ref()
            .ok_or_else(|| invalid("effect was never removed"))?;
        let module = song.restore_module(data)?;
        song.insert_effect(self.target, self.index, module)?;
        Ok(())
    }

    fn redo(&mut self, song: &mut Song) -> Result<()> {
        let node = song.effect_node(self.target, self.index)?;
        self.data = Some(song.capture_node(node)?);
        song.remove_effect(self.target, self.index)?;
        Ok(())
    }

    fn describe(&self) -> String {
        match &self.data {
            Some(data) => format!("Remove {} from {}", data.module_id, self.target),
            None => format!("Remove effect {} from {}", self.index, self.target),
        }
    }
}

/// Exchange two effects in a rack. Applying it twice restores the order,
/// so undo and redo are the same edit.
#[derive(Debug, Clone)]
pub struct SwapEffect {
    target: RackTarget,
    first: usize,
    second: usize,
}

impl SwapEffect {
    pub fn new(target: RackTarget, first: usize, second: usize) -> Self {
        Self {
            target,
            first,
            second,
        }
    }
}

impl Action for SwapEffect {
    impl_action_common!(ActionKind::SwapEffect);

    fn undo(&mut self, song: &mut Song) -> Result<()> {
        song.swap_effects(self.target, self.first, self.second)
    }

    fn redo(&mut self, song: &mut Song) -> Result<()> {
        song.swap_effects(self.target, self.first, self.second)
    }
}

// ============================================================================
// Notes
// ============================================================================

/// Add a note to the pattern in a bar. If the bar is empty a free pattern
/// is scheduled there first, growing the pattern count if necessary.
#[derive(Debug, Clone)]
pub struct NoteAdd {
    channel: usize,
    bar: usize,
    note: Note,
    from_empty_bar: bool,
    old_max_patterns: usize,
}

impl NoteAdd {
    pub fn new(channel: usize, bar: usize, time: f32, key: i32, length: f32) -> Self {
        Self {
            channel,
            bar,
            note: Note::new(time, key, length),
            from_empty_bar: false,
            old_max_patterns: 0,
        }
    }

    /// The note this action inserts, with its id
    pub fn note(&self) -> &Note {
        &self.note
    }
}

impl Action for NoteAdd {
    impl_action_common!(ActionKind::NoteAdd);

    fn undo(&mut self, song: &mut Song) -> Result<()> {
        let id = self.note.id();
        scheduled_pattern(song, self.channel, self.bar)?
            .remove(id)
            .ok_or_else(|| invalid(format!("note {id} not found")))?;
        if self.from_empty_bar {
            song.set_sequence_cell(self.channel, self.bar, 0)?;
            song.set_max_patterns(self.old_max_patterns);
        }
        Ok(())
    }

    fn redo(&mut self, song: &mut Song) -> Result<()> {
        self.from_empty_bar = song.sequence_cell(self.channel, self.bar)? == 0;
        if self.from_empty_bar {
            self.old_max_patterns = song.max_patterns();
            let pattern = song.new_pattern(self.channel)?;
            song.set_sequence_cell(self.channel, self.bar, pattern + 1)?;
        }
        scheduled_pattern(song, self.channel, self.bar)?
            .notes
            .push(self.note.clone());
        Ok(())
    }

    fn describe(&self) -> String {
        format!(
            "Add note {} at beat {} of bar {}",
            self.note.key, self.note.time, self.bar
        )
    }
}

/// Remove a note from the pattern in a bar.
#[derive(Debug, Clone)]
pub struct NoteRemove {
    channel: usize,
    bar: usize,
    note: Note,
}

impl NoteRemove {
    pub fn new(channel: usize, bar: usize, note: Note) -> Self {
        Self { channel, bar, note }
    }
}

impl Action for NoteRemove {
    impl_action_common!(ActionKind::NoteRemove);

    fn undo(&mut self, song: &mut Song) -> Result<()> {
        scheduled_pattern(song, self.channel, self.bar)?
            .notes
            .push(self.note.clone());
        Ok(())
    }

    fn redo(&mut self, song: &mut Song) -> Result<()> {
        let id = self.note.id();
        scheduled_pattern(song, self.channel, self.bar)?
            .remove(id)
            .ok_or_else(|| invalid(format!("note {id} not found")))?;
        Ok(())
    }
}

/// Move, resize or re-pitch a note. The note keeps its id.
#[derive(Debug, Clone)]
pub struct NoteChange {
    channel: usize,
    bar: usize,
    old: Note,
    new: Note,
}

impl NoteChange {
    pub fn new(channel: usize, bar: usize, old: Note, time: f32, key: i32, length: f32) -> Self {
        let new = old.with_values(time, key, length);
        Self {
            channel,
            bar,
            old,
            new,
        }
    }

    fn replace(&self, song: &mut Song, with: &Note) -> Result<()> {
        let id = with.id();
        let note = scheduled_pattern(song, self.channel, self.bar)?
            .find_mut(id)
            .ok_or_else(|| invalid(format!("note {id} not found")))?;
        *note = with.clone();
        Ok(())
    }
}

impl Action for NoteChange {
    impl_action_common!(ActionKind::NoteChange);

    fn undo(&mut self, song: &mut Song) -> Result<()> {
        self.replace(song, &self.old)
    }

    fn redo(&mut self, song: &mut Song) -> Result<()> {
        self.replace(song, &self.new)
    }
}

// ============================================================================
// Bars and sequence
// ============================================================================

/// Insert an empty bar.
#[derive(Debug, Clone)]
pub struct InsertBar {
    position: usize,
}

impl InsertBar {
    pub fn new(position: usize) -> Self {
        Self { position }
    }
}

impl Action for InsertBar {
    impl_action_common!(ActionKind::InsertBar);

    fn undo(&mut self, song: &mut Song) -> Result<()> {
        song.remove_bar(self.position)
    }

    fn redo(&mut self, song: &mut Song) -> Result<()> {
        song.insert_bar(self.position)
    }
}

/// Delete a bar. The cells it held are kept for undo.
#[derive(Debug, Clone)]
pub struct RemoveBar {
    position: usize,
    cells: Vec<usize>,
}

impl RemoveBar {
    pub fn new(position: usize) -> Self {
        Self {
            position,
            cells: Vec::new(),
        }
    }
}

impl Action for RemoveBar {
    impl_action_common!(ActionKind::RemoveBar);

    fn undo(&mut self, song: &mut Song) -> Result<()> {
        song.insert_bar(self.position)?;
        song.set_bar_patterns(self.position, &self.cells)
    }

    fn redo(&mut self, song: &mut Song) -> Result<()> {
        self.cells = song.bar_patterns(self.position)?;
        song.remove_bar(self.position)
    }
}

/// Change which pattern plays in a bar. Consecutive edits of one cell
/// merge.
#[derive(Debug, Clone)]
pub struct SequenceChange {
    channel: usize,
    bar: usize,
    old: usize,
    new: usize,
}

impl SequenceChange {
    pub fn new(channel: usize, bar: usize, old: usize, new: usize) -> Self {
        Self {
            channel,
            bar,
            old,
            new,
        }
    }
}

impl Action for SequenceChange {
    impl_action_common!(ActionKind::SequenceChange);

    fn undo(&mut self, song: &mut Song) -> Result<()> {
        song.set_sequence_cell(self.channel, self.bar, self.old)
    }

    fn redo(&mut self, song: &mut Song) -> Result<()> {
        song.set_sequence_cell(self.channel, self.bar, self.new)
    }

    fn merge(&mut self, other: &dyn Action) -> bool {
        match downcast::<SequenceChange>(other) {
            Some(next) if next.channel == self.channel && next.bar == self.bar => {
                self.new = next.new;
                true
            }
            _ => false,
        }
    }
}

// ============================================================================
// Channels
// ============================================================================

/// Create a channel.
#[derive(Debug, Clone)]
pub struct NewChannel {
    index: usize,
}

impl NewChannel {
    pub fn new(index: usize) -> Self {
        Self { index }
    }
}

impl Action for NewChannel {
    impl_action_common!(ActionKind::NewChannel);

    fn undo(&mut self, song: &mut Song) -> Result<()> {
        song.remove_channel(self.index)
    }

    fn redo(&mut self, song: &mut Song) -> Result<()> {
        song.insert_channel(self.index)?;
        Ok(())
    }
}

/// Everything needed to rebuild a deleted channel.
#[derive(Debug, Clone)]
struct SavedChannel {
    name: String,
    solo: bool,
    fx_target: usize,
    sequence: Vec<usize>,
    patterns: Vec<Pattern>,
    volume: Vec<u8>,
    instrument: ModuleData,
    effects: Vec<ModuleData>,
}

impl SavedChannel {
    fn capture(song: &Song, index: usize) -> Result<Self> {
        let channel = song.channel(index)?;
        let effects = channel
            .rack()
            .modules()
            .iter()
            .map(|&node| song.capture_node(node))
            .collect::<Result<Vec<_>>>()?;
        Ok(Self {
            name: channel.name.clone(),
            solo: channel.solo,
            fx_target: channel.fx_target(),
            sequence: channel.sequence.clone(),
            patterns: channel.patterns.clone(),
            volume: song.capture_node(channel.volume())?.blob,
            instrument: song.capture_node(channel.instrument())?,
            effects,
        })
    }

    /// Rebuild the channel at `index`. On failure the partly built channel
    /// is removed again, leaving the song as it was.
    fn restore(&self, song: &mut Song, index: usize) -> Result<()> {
        song.insert_channel(index)?;
        if let Err(err) = self.fill(song, index) {
            if let Err(cleanup) = song.remove_channel(index) {
                tracing::warn!(index, error = %cleanup, "failed to roll back channel restore");
            }
            return Err(err);
        }
        Ok(())
    }

    fn fill(&self, song: &mut Song, index: usize) -> Result<()> {
        song.set_fx_target(index, self.fx_target)?;

        let length = song.length();
        let max_patterns = song.max_patterns();
        let channel = song.channel_mut(index)?;
        channel.name = self.name.clone();
        channel.solo = self.solo;
        for (cell, &value) in channel.sequence.iter_mut().zip(&self.sequence) {
            *cell = if value > max_patterns { 0 } else { value };
        }
        channel.sequence.resize(length, 0);
        for (pattern, saved) in channel.patterns.iter_mut().zip(&self.patterns) {
            *pattern = saved.clone();
        }

        let volume = channel.volume();
        song.load_node_state(volume, &self.volume)?;
        let instrument = song.restore_module(&self.instrument)?;
        song.set_instrument(index, instrument)?;
        for (slot, data) in self.effects.iter().enumerate() {
            let module = song.restore_module(data)?;
            song.insert_effect(RackTarget::Channel(index), slot, module)?;
        }
        Ok(())
    }
}

/// Delete a channel with its instrument, effects and patterns.
#[derive(Debug, Clone)]
pub struct RemoveChannel {
    index: usize,
    saved: Option<SavedChannel>,
}

impl RemoveChannel {
    pub fn new(index: usize) -> Self {
        Self { index, saved: None }
    }
}

impl Action for RemoveChannel {
    impl_action_common!(ActionKind::RemoveChannel);

    fn undo(&mut self, song: &mut Song) -> Result<()> {
        let saved = self
            .saved
            .as_ref()
            .ok_or_else(|| invalid("channel was never removed"))?;
        saved.restore(song, self.index)
    }

    fn redo(&mut self, song: &mut Song) -> Result<()> {
        self.saved = Some(SavedChannel::capture(song, self.index)?);
        song.remove_channel(self.index)
    }

    fn describe(&self) -> String {
        match &self.saved {
            Some(saved) => format!("Remove Channel '{}'", saved.name),
            None => format!("Remove Channel {}", self.index),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::EngineConfig;
    use crate::dsp::delay::DelayModule;
    use crate::dsp::gain::GainModule;
    use crate::history::History;
    use crate::song::MASTER_BUS;
    use approx::assert_relative_eq;
    use pretty_assertions::assert_eq;

    fn song() -> Song {
        Song::new(&EngineConfig::default()).unwrap()
    }

    fn rack_ids(song: &Song, target: RackTarget) -> Vec<String> {
        song.rack(target)
            .unwrap()
            .modules()
            .iter()
            .map(|&n| song.graph().module(n).unwrap().module_id().to_string())
            .collect()
    }

    #[test]
    fn test_max_patterns_undo_restores_cleared_cells() {
        let mut song = song();
        let mut history = History::new(10);
        song.set_sequence_cell(0, 2, 4).unwrap();

        let action = SongMaxPatterns::new(&song, 2);
        history.perform(&mut song, Box::new(action)).unwrap();
        assert_eq!(song.channel(0).unwrap().sequence, vec![0, 0, 0, 0]);

        history.undo(&mut song).unwrap();
        assert_eq!(song.max_patterns(), 4);
        assert_eq!(song.channel(0).unwrap().sequence, vec![0, 0, 4, 0]);

        history.redo(&mut song).unwrap();
        assert_eq!(song.max_patterns(), 2);
        assert_eq!(song.channel(0).unwrap().sequence, vec![0, 0, 0, 0]);
    }

    #[test]
    fn test_panning_merges_per_channel() {
        let mut song = song();
        song.insert_channel(1).unwrap();
        let mut history = History::new(10);
        history
            .perform(&mut song, Box::new(ChannelPanning::new(0, 0.0, 0.2)))
            .unwrap();
        history
            .perform(&mut song, Box::new(ChannelPanning::new(1, 0.0, -0.5)))
            .unwrap();
        history
            .perform(&mut song, Box::new(ChannelPanning::new(1, -0.5, -0.7)))
            .unwrap();
        assert_eq!(history.undo_count(), 2);

        history.undo(&mut song).unwrap();
        assert_relative_eq!(song.channel_panning(1).unwrap(), 0.0);
        assert_relative_eq!(song.channel_panning(0).unwrap(), 0.2);
    }

    #[test]
    fn test_channel_output() {
        let mut song = song();
        let bus = song.add_bus("FX").unwrap();
        let mut history = History::new(10);
        history
            .perform(&mut song, Box::new(ChannelOutput::new(0, 0, bus)))
            .unwrap();
        assert_eq!(song.channel(0).unwrap().fx_target(), bus);
        history.undo(&mut song).unwrap();
        assert_eq!(song.channel(0).unwrap().fx_target(), 0);
    }

    #[test]
    fn test_add_effect_undo_redo() {
        let mut song = song();
        let target = RackTarget::Channel(0);
        let mut history = History::new(10);
        history
            .perform(&mut song, Box::new(AddEffect::new(target, "effect.delay")))
            .unwrap();
        history
            .perform(&mut song, Box::new(AddEffect::new(target, "effect.gain")))
            .unwrap();
        assert_eq!(rack_ids(&song, target), vec!["effect.delay", "effect.gain"]);

        history.undo(&mut song).unwrap();
        assert_eq!(rack_ids(&song, target), vec!["effect.delay"]);
        history.redo(&mut song).unwrap();
        assert_eq!(rack_ids(&song, target), vec!["effect.delay", "effect.gain"]);
        assert!(song.rack(target).unwrap().is_consistent(song.graph()));
    }

    #[test]
    fn test_add_unknown_effect_is_not_recorded() {
        let mut song = song();
        let mut history = History::new(10);
        let err = history
            .perform(
                &mut song,
                Box::new(AddEffect::new(RackTarget::Channel(0), "effect.nope")),
            )
            .unwrap_err();
        assert_eq!(err.error_code(), "UNKNOWN_MODULE");
        assert!(!history.can_undo());
    }

    #[test]
    fn test_remove_effect_restores_state() {
        let mut song = song();
        let target = RackTarget::Bus(0);
        song.insert_effect(target, 0, Box::new(GainModule::new(-6.0)))
            .unwrap();
        song.insert_effect(target, 1, Box::new(DelayModule::new(48_000)))
            .unwrap();

        let mut history = History::new(10);
        history
            .perform(&mut song, Box::new(RemoveEffect::new(target, 0)))
            .unwrap();
        assert_eq!(rack_ids(&song, target), vec!["effect.delay"]);

        history.undo(&mut song).unwrap();
        assert_eq!(rack_ids(&song, target), vec!["effect.gain", "effect.delay"]);
        let node = song.effect_node(target, 0).unwrap();
        assert_eq!(song.graph().get::<GainModule>(node).unwrap().gain_db(), -6.0);
        assert!(song.rack(target).unwrap().is_consistent(song.graph()));
    }

    #[test]
    fn test_swap_effect_is_its_own_inverse() {
        let mut song = song();
        let target = RackTarget::Channel(0);
        for id in ["effect.gain", "effect.delay", "effect.analyzer"] {
            let module = song.create_module(id).unwrap();
            let end = song.rack(target).unwrap().len();
            song.insert_effect(target, end, module).unwrap();
        }

        let mut history = History::new(10);
        history
            .perform(&mut song, Box::new(SwapEffect::new(target, 0, 2)))
            .unwrap();
        assert_eq!(
            rack_ids(&song, target),
            vec!["effect.analyzer", "effect.delay", "effect.gain"]
        );
        history.undo(&mut song).unwrap();
        assert_eq!(
            rack_ids(&song, target),
            vec!["effect.gain", "effect.delay", "effect.analyzer"]
        );
    }

    #[test]
    fn test_note_add_into_empty_bar() {
        let mut song = song();
        for pattern in &mut song.channel_mut(0).unwrap().patterns {
            pattern.add_note(0.0, 40, 1.0);
        }
        let mut history = History::new(10);
        history
            .perform(&mut song, Box::new(NoteAdd::new(0, 1, 0.5, 57, 1.0)))
            .unwrap();
        // Every pattern was in use, so a fifth one was made for bar 1
        assert_eq!(song.max_patterns(), 5);
        assert_eq!(song.sequence_cell(0, 1).unwrap(), 5);
        assert_eq!(song.channel(0).unwrap().patterns[4].notes.len(), 1);

        history.undo(&mut song).unwrap();
        assert_eq!(song.max_patterns(), 4);
        assert_eq!(song.sequence_cell(0, 1).unwrap(), 0);

        history.redo(&mut song).unwrap();
        assert_eq!(song.sequence_cell(0, 1).unwrap(), 5);
    }

    #[test]
    fn test_note_add_into_scheduled_pattern() {
        let mut song = song();
        song.set_sequence_cell(0, 0, 2).unwrap();
        let mut history = History::new(10);
        let action = NoteAdd::new(0, 0, 1.0, 60, 0.5);
        let id = action.note().id();
        history.perform(&mut song, Box::new(action)).unwrap();
        assert!(song.channel(0).unwrap().patterns[1].find(id).is_some());

        history.undo(&mut song).unwrap();
        assert!(song.channel(0).unwrap().patterns[1].is_empty());
        assert_eq!(song.sequence_cell(0, 0).unwrap(), 2);
    }

    #[test]
    fn test_note_remove_and_change() {
        let mut song = song();
        song.set_sequence_cell(0, 0, 1).unwrap();
        let note = song.channel_mut(0).unwrap().patterns[0].add_note(0.0, 60, 1.0);
        let mut history = History::new(10);

        history
            .perform(
                &mut song,
                Box::new(NoteChange::new(0, 0, note.clone(), 2.0, 64, 0.5)),
            )
            .unwrap();
        let moved = song.channel(0).unwrap().patterns[0].find(note.id()).cloned();
        assert_eq!(moved.map(|n| (n.time, n.key)), Some((2.0, 64)));

        history.undo(&mut song).unwrap();
        assert_eq!(
            song.channel(0).unwrap().patterns[0].find(note.id()),
            Some(&note)
        );

        history
            .perform(&mut song, Box::new(NoteRemove::new(0, 0, note.clone())))
            .unwrap();
        assert!(song.channel(0).unwrap().patterns[0].is_empty());
        history.undo(&mut song).unwrap();
        assert_eq!(song.channel(0).unwrap().patterns[0].notes, vec![note]);
    }

    #[test]
    fn test_remove_bar_restores_cells() {
        let mut song = song();
        song.insert_channel(1).unwrap();
        song.set_sequence_cell(0, 2, 1).unwrap();
        song.set_sequence_cell(1, 2, 3).unwrap();

        let mut history = History::new(10);
        history
            .perform(&mut song, Box::new(RemoveBar::new(2)))
            .unwrap();
        assert_eq!(song.length(), 3);

        history.undo(&mut song).unwrap();
        assert_eq!(song.length(), 4);
        assert_eq!(song.bar_patterns(2).unwrap(), vec![1, 3]);

        history
            .perform(&mut song, Box::new(InsertBar::new(0)))
            .unwrap();
        assert_eq!(song.bar_patterns(3).unwrap(), vec![1, 3]);
        history.undo(&mut song).unwrap();
        assert_eq!(song.bar_patterns(2).unwrap(), vec![1, 3]);
    }

    #[test]
    fn test_sequence_change_merges_on_same_cell() {
        let mut song = song();
        let mut history = History::new(10);
        history
            .perform(&mut song, Box::new(SequenceChange::new(0, 1, 0, 1)))
            .unwrap();
        history
            .perform(&mut song, Box::new(SequenceChange::new(0, 1, 1, 2)))
            .unwrap();
        history
            .perform(&mut song, Box::new(SequenceChange::new(0, 2, 0, 3)))
            .unwrap();
        assert_eq!(history.undo_count(), 2);

        history.undo(&mut song).unwrap();
        history.undo(&mut song).unwrap();
        assert_eq!(song.channel(0).unwrap().sequence, vec![0, 0, 0, 0]);
    }

    #[test]
    fn test_new_channel_undo() {
        let mut song = song();
        let mut history = History::new(10);
        history
            .perform(&mut song, Box::new(NewChannel::new(0)))
            .unwrap();
        assert_eq!(song.channels().len(), 2);
        history.undo(&mut song).unwrap();
        assert_eq!(song.channels().len(), 1);
        assert_eq!(song.graph().len(), 3);
    }

    #[test]
    fn test_remove_channel_round_trip() {
        let mut song = song();
        let bus = song.add_bus("Echo").unwrap();
        song.insert_channel(1).unwrap();
        {
            let channel = song.channel_mut(1).unwrap();
            channel.name = "Lead".to_string();
            channel.solo = true;
            channel.sequence[3] = 2;
            channel.patterns[1].add_note(0.0, 64, 2.0);
        }
        song.set_fx_target(1, bus).unwrap();
        song.set_channel_volume(1, 0.8).unwrap();
        song.insert_effect(RackTarget::Channel(1), 0, Box::new(GainModule::new(3.0)))
            .unwrap();
        let nodes_before = song.graph().len();

        let mut history = History::new(10);
        history
            .perform(&mut song, Box::new(RemoveChannel::new(1)))
            .unwrap();
        assert_eq!(song.channels().len(), 1);
        assert_eq!(song.graph().len(), nodes_before - 3);

        history.undo(&mut song).unwrap();
        assert_eq!(song.graph().len(), nodes_before);
        let channel = song.channel(1).unwrap();
        assert_eq!(channel.name, "Lead");
        assert!(channel.solo);
        assert_eq!(channel.sequence, vec![0, 0, 0, 2]);
        assert_eq!(channel.patterns[1].notes.len(), 1);
        assert_eq!(channel.fx_target(), bus);
        assert_relative_eq!(song.channel_volume(1).unwrap(), 0.8);
        assert_eq!(rack_ids(&song, RackTarget::Channel(1)), vec!["effect.gain"]);
        let node = song.effect_node(RackTarget::Channel(1), 0).unwrap();
        assert_eq!(song.graph().get::<GainModule>(node).unwrap().gain_db(), 3.0);
        assert!(song
            .rack(RackTarget::Channel(1))
            .unwrap()
            .is_consistent(song.graph()));

        history.redo(&mut song).unwrap();
        assert_eq!(song.channels().len(), 1);
    }

    #[test]
    fn test_failed_channel_restore_rolls_back() {
        let mut song = song();
        song.insert_channel(1).unwrap();
        song.insert_effect(RackTarget::Channel(1), 0, Box::new(GainModule::new(3.0)))
            .unwrap();
        song.insert_effect(RackTarget::Channel(1), 1, Box::new(GainModule::new(-3.0)))
            .unwrap();

        let mut action = RemoveChannel::new(1);
        action.redo(&mut song).unwrap();
        let nodes_after_remove = song.graph().len();

        let saved = action.saved.as_mut().unwrap();
        let good = std::mem::replace(&mut saved.effects[1].blob, vec![0, 0]);
        let err = action.undo(&mut song).unwrap_err();
        assert_eq!(err.error_code(), "CORRUPTED_STATE");
        assert_eq!(song.channels().len(), 1);
        assert_eq!(song.graph().len(), nodes_after_remove);
        assert!(song
            .rack(RackTarget::Bus(MASTER_BUS))
            .unwrap()
            .is_consistent(song.graph()));

        // Retrying after the blob is repaired does not leave a duplicate
        action.saved.as_mut().unwrap().effects[1].blob = good;
        action.undo(&mut song).unwrap();
        assert_eq!(song.channels().len(), 2);
        assert_eq!(
            rack_ids(&song, RackTarget::Channel(1)),
            vec!["effect.gain", "effect.gain"]
        );
    }
}
