//! Undo/redo stacks
//!
//! [`History`] keeps two [`Stack`]s of boxed actions. Recording a new edit
//! clears the redo stack and trims the oldest undo entries past
//! `max_levels`; undo and redo move actions between the stacks.

use crate::config::DEFAULT_MAX_UNDO_LEVELS;
use crate::error::{Result, SongrackError};
use crate::history::action::{Action, ActionKind};
use crate::song::{SharedSong, Song};

/// A stack of actions that folds mergeable edits into the top entry.
#[derive(Debug, Default)]
pub struct Stack {
    actions: Vec<Box<dyn Action>>,
}

impl Stack {
    pub fn new() -> Self {
        Self::default()
    }

    /// Merge `action` into the top entry if it accepts it, otherwise push.
    /// Returns true when merged.
    pub fn push(&mut self, action: Box<dyn Action>) -> bool {
        if let Some(top) = self.actions.last_mut() {
            if top.merge(action.as_ref()) {
                return true;
            }
        }
        self.actions.push(action);
        false
    }

    /// Push without trying to merge.
    pub fn push_unmerged(&mut self, action: Box<dyn Action>) {
        self.actions.push(action);
    }

    pub fn pop(&mut self) -> Option<Box<dyn Action>> {
        self.actions.pop()
    }

    pub fn peek(&self) -> Option<&dyn Action> {
        self.actions.last().map(|a| a.as_ref())
    }

    pub fn peek_kind(&self) -> Option<ActionKind> {
        self.peek().map(Action::kind)
    }

    /// Drop the oldest entries until at most `max` remain. Returns how many
    /// were dropped.
    pub fn trim_to(&mut self, max: usize) -> usize {
        let excess = self.actions.len().saturating_sub(max);
        self.actions.drain(..excess);
        excess
    }

    pub fn clear(&mut self) {
        self.actions.clear();
    }

    pub fn len(&self) -> usize {
        self.actions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.actions.is_empty()
    }
}

/// Undo and redo history for one song.
#[derive(Debug)]
pub struct History {
    undo_stack: Stack,
    redo_stack: Stack,
    max_levels: usize,
    /// Actions dropped from the bottom of the undo stack
    discarded: usize,
}

impl Default for History {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_UNDO_LEVELS)
    }
}

impl History {
    /// History keeping at most `max_levels` undo entries; 0 keeps all.
    pub fn new(max_levels: usize) -> Self {
        Self {
            undo_stack: Stack::new(),
            redo_stack: Stack::new(),
            max_levels,
            discarded: 0,
        }
    }

    /// Record an edit that has already been applied to the song.
    ///
    /// The redo stack is cleared since the history has diverged.
    pub fn push(&mut self, action: Box<dyn Action>) {
        self.redo_stack.clear();
        let kind = action.kind();
        if self.undo_stack.push(action) {
            tracing::trace!(%kind, "action merged");
        }
        self.trim_history();
    }

    /// Apply an edit to the song and record it.
    pub fn perform(&mut self, song: &mut Song, mut action: Box<dyn Action>) -> Result<()> {
        action.redo(song)?;
        tracing::debug!(action = %action.describe(), "performed");
        self.push(action);
        Ok(())
    }

    /// [`History::perform`] with the song lock held for the whole edit.
    pub fn perform_shared(&mut self, song: &SharedSong, action: Box<dyn Action>) -> Result<()> {
        let mut song = song.lock();
        self.perform(&mut song, action)
    }

    /// Reverse the most recent edit and return its kind.
    ///
    /// If the action fails to reverse it stays on the undo stack.
    pub fn undo(&mut self, song: &mut Song) -> Result<ActionKind> {
        let mut action = self.undo_stack.pop().ok_or(SongrackError::NothingToUndo)?;
        if let Err(err) = action.undo(song) {
            tracing::error!(action = %action.describe(), error = %err, "undo failed");
            self.undo_stack.push_unmerged(action);
            return Err(err);
        }
        tracing::debug!(action = %action.describe(), "undone");
        let kind = action.kind();
        self.redo_stack.push_unmerged(action);
        Ok(kind)
    }

    /// Re-apply the most recently undone edit and return its kind.
    pub fn redo(&mut self, song: &mut Song) -> Result<ActionKind> {
        let mut action = self.redo_stack.pop().ok_or(SongrackError::NothingToRedo)?;
        if let Err(err) = action.redo(song) {
            tracing::error!(action = %action.describe(), error = %err, "redo failed");
            self.redo_stack.push_unmerged(action);
            return Err(err);
        }
        tracing::debug!(action = %action.describe(), "redone");
        let kind = action.kind();
        self.undo_stack.push_unmerged(action);
        Ok(kind)
    }

    pub fn undo_shared(&mut self, song: &SharedSong) -> Result<ActionKind> {
        self.undo(&mut song.lock())
    }

    pub fn redo_shared(&mut self, song: &SharedSong) -> Result<ActionKind> {
        self.redo(&mut song.lock())
    }

    pub fn can_undo(&self) -> bool {
        !self.undo_stack.is_empty()
    }

    pub fn can_redo(&self) -> bool {
        !self.redo_stack.is_empty()
    }

    pub fn undo_count(&self) -> usize {
        self.undo_stack.len()
    }

    pub fn redo_count(&self) -> usize {
        self.redo_stack.len()
    }

    /// Most recent action that can be undone
    pub fn peek_undo(&self) -> Option<&dyn Action> {
        self.undo_stack.peek()
    }

    /// Most recent action that can be redone
    pub fn peek_redo(&self) -> Option<&dyn Action> {
        self.redo_stack.peek()
    }

    pub fn max_levels(&self) -> usize {
        self.max_levels
    }

    /// Change the level limit, trimming the undo stack if needed.
    pub fn set_max_levels(&mut self, max_levels: usize) {
        self.max_levels = max_levels;
        self.trim_history();
    }

    /// Number of actions dropped by trimming or clearing
    pub fn discarded(&self) -> usize {
        self.discarded
    }

    /// Forget all undo and redo history.
    pub fn clear(&mut self) {
        self.discarded += self.undo_stack.len() + self.redo_stack.len();
        self.undo_stack.clear();
        self.redo_stack.clear();
    }

    fn trim_history(&mut self) {
        if self.max_levels == 0 {
            return;
        }
        let dropped = self.undo_stack.trim_to(self.max_levels);
        if dropped > 0 {
            tracing::info!(dropped, max_levels = self.max_levels, "undo history trimmed");
            self.discarded += dropped;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::EngineConfig;
    use crate::history::actions::{ChannelVolume, SequenceChange, SongTempo};
    use approx::assert_relative_eq;

    fn song() -> Song {
        Song::new(&EngineConfig::default()).unwrap()
    }

    #[test]
    fn test_nothing_to_undo_or_redo() {
        let mut song = song();
        let mut history = History::new(10);
        assert!(!history.can_undo());
        assert_eq!(history.undo(&mut song).unwrap_err().error_code(), "NOTHING_TO_UNDO");
        assert_eq!(history.redo(&mut song).unwrap_err().error_code(), "NOTHING_TO_REDO");
    }

    #[test]
    fn test_perform_undo_redo() {
        let mut song = song();
        let mut history = History::new(10);
        let action = SongTempo::new(song.tempo(), 90.0);
        history.perform(&mut song, Box::new(action)).unwrap();
        assert_eq!(song.tempo(), 90.0);

        assert_eq!(history.undo(&mut song).unwrap(), ActionKind::SongTempo);
        assert_eq!(song.tempo(), 120.0);
        assert!(history.can_redo());

        history.redo(&mut song).unwrap();
        assert_eq!(song.tempo(), 90.0);
        assert_eq!(history.redo_count(), 0);
    }

    #[test]
    fn test_push_clears_redo() {
        let mut song = song();
        let mut history = History::new(10);
        history
            .perform(&mut song, Box::new(SongTempo::new(120.0, 100.0)))
            .unwrap();
        history.undo(&mut song).unwrap();
        assert_eq!(history.redo_count(), 1);

        history
            .perform(&mut song, Box::new(ChannelVolume::new(0, 0.5, 0.2)))
            .unwrap();
        assert_eq!(history.redo_count(), 0);
        assert_eq!(history.undo_count(), 1);
    }

    #[test]
    fn test_consecutive_edits_merge() {
        let mut song = song();
        let mut history = History::new(10);
        for (old, new) in [(0.5, 0.6), (0.6, 0.7), (0.7, 0.8)] {
            history
                .perform(&mut song, Box::new(ChannelVolume::new(0, old, new)))
                .unwrap();
        }
        assert_eq!(history.undo_count(), 1);

        history.undo(&mut song).unwrap();
        assert_relative_eq!(song.channel_volume(0).unwrap(), 0.5);
        history.redo(&mut song).unwrap();
        assert_relative_eq!(song.channel_volume(0).unwrap(), 0.8);
    }

    #[test]
    fn test_undo_all_then_redo_all() {
        let mut song = song();
        let mut history = History::new(10);
        history
            .perform(&mut song, Box::new(SongTempo::new(120.0, 130.0)))
            .unwrap();
        history
            .perform(&mut song, Box::new(ChannelVolume::new(0, 0.5, 0.4)))
            .unwrap();
        history
            .perform(&mut song, Box::new(SongTempo::new(130.0, 140.0)))
            .unwrap();
        assert_eq!(history.undo_count(), 3);

        for _ in 0..3 {
            history.undo(&mut song).unwrap();
        }
        assert_eq!(history.redo_count(), 3);
        assert_eq!(song.tempo(), 120.0);

        for _ in 0..3 {
            history.redo(&mut song).unwrap();
        }
        assert_eq!(history.undo_count(), 3);
        assert_eq!(song.tempo(), 140.0);
        assert_relative_eq!(song.channel_volume(0).unwrap(), 0.4);
    }

    #[test]
    fn test_stack_push_unmerged() {
        let mut stack = Stack::new();
        assert!(!stack.push(Box::new(SongTempo::new(120.0, 130.0))));
        assert!(stack.push(Box::new(SongTempo::new(130.0, 140.0))));
        assert_eq!(stack.len(), 1);
        stack.push_unmerged(Box::new(SongTempo::new(140.0, 150.0)));
        assert_eq!(stack.len(), 2);
        assert_eq!(stack.peek_kind(), Some(ActionKind::SongTempo));
    }

    #[test]
    fn test_trim_to_max_levels() {
        let mut song = song();
        let mut history = History::new(3);
        for ch_volume in [0.1, 0.2, 0.3, 0.4, 0.5] {
            let old = song.tempo();
            history
                .perform(&mut song, Box::new(SongTempo::new(old, 60.0)))
                .unwrap();
            history
                .perform(&mut song, Box::new(ChannelVolume::new(0, 0.0, ch_volume)))
                .unwrap();
        }
        assert_eq!(history.undo_count(), 3);
        assert_eq!(history.discarded(), 7);

        history.set_max_levels(1);
        assert_eq!(history.undo_count(), 1);
        assert_eq!(history.discarded(), 9);
    }

    #[test]
    fn test_zero_levels_is_unlimited() {
        let mut song = song();
        let mut history = History::new(0);
        for i in 0..20 {
            let action = SequenceChange::new(0, i % 2, 0, 1 + i % 3);
            history.perform(&mut song, Box::new(action)).unwrap();
        }
        assert_eq!(history.undo_count(), 20);
        assert_eq!(history.discarded(), 0);
    }

    #[test]
    fn test_clear() {
        let mut song = song();
        let mut history = History::default();
        history
            .perform(&mut song, Box::new(SongTempo::new(120.0, 80.0)))
            .unwrap();
        history.clear();
        assert!(!history.can_undo());
        assert!(!history.can_redo());
        assert!(history.peek_undo().is_none());
    }

    #[test]
    fn test_shared_song() {
        let shared = song().into_shared();
        let mut history = History::new(5);
        history
            .perform_shared(&shared, Box::new(SongTempo::new(120.0, 150.0)))
            .unwrap();
        assert_eq!(shared.lock().tempo(), 150.0);
        history.undo_shared(&shared).unwrap();
        assert_eq!(shared.lock().tempo(), 120.0);
        history.redo_shared(&shared).unwrap();
        assert_eq!(shared.lock().tempo(), 150.0);
    }
}
