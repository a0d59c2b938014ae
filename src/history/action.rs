//! Reversible edits
//!
//! Every edit the control surface makes is an [`Action`] that knows how to
//! apply itself (`redo`) and reverse itself (`undo`) against a [`Song`].
//! Consecutive edits of the same control can be folded into one entry with
//! [`Action::merge`].

use std::any::Any;
use std::fmt;

use serde::Serialize;

use crate::error::Result;
use crate::song::Song;

/// Discriminant of every action type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ActionKind {
    SongTempo,
    SongMaxPatterns,
    ChannelVolume,
    ChannelPanning,
    ChannelOutput,
    AddEffect,
    RemoveEffect,
    SwapEffect,
    NoteAdd,
    NoteRemove,
    NoteChange,
    InsertBar,
    RemoveBar,
    SequenceChange,
    NewChannel,
    RemoveChannel,
}

impl fmt::Display for ActionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ActionKind::SongTempo => "Change Tempo",
            ActionKind::SongMaxPatterns => "Change Pattern Count",
            ActionKind::ChannelVolume => "Change Channel Volume",
            ActionKind::ChannelPanning => "Change Channel Panning",
            ActionKind::ChannelOutput => "Change Channel Output",
            ActionKind::AddEffect => "Add Effect",
            ActionKind::RemoveEffect => "Remove Effect",
            ActionKind::SwapEffect => "Move Effect",
            ActionKind::NoteAdd => "Add Note",
            ActionKind::NoteRemove => "Remove Note",
            ActionKind::NoteChange => "Change Note",
            ActionKind::InsertBar => "Insert Bar",
            ActionKind::RemoveBar => "Remove Bar",
            ActionKind::SequenceChange => "Change Sequence",
            ActionKind::NewChannel => "New Channel",
            ActionKind::RemoveChannel => "Remove Channel",
        };
        write!(f, "{name}")
    }
}

/// A reversible edit.
///
/// `redo` applies the edit and `undo` reverses it; both run with the song
/// lock held. An action that snapshots state (a removed effect, a deleted
/// channel) takes the snapshot inside `redo`, right before it destroys
/// anything.
pub trait Action: Send + fmt::Debug + 'static {
    fn kind(&self) -> ActionKind;

    /// Reverse the edit.
    fn undo(&mut self, song: &mut Song) -> Result<()>;

    /// Apply the edit.
    fn redo(&mut self, song: &mut Song) -> Result<()>;

    /// Fold a newer action into this one. On success this action now spans
    /// both edits and `other` is dropped.
    fn merge(&mut self, _other: &dyn Action) -> bool {
        false
    }

    /// Short human-readable summary
    fn describe(&self) -> String {
        self.kind().to_string()
    }

    fn as_any(&self) -> &dyn Any;
}

/// Downcast a newer action to the concrete type of the one merging it.
pub fn downcast<T: Action>(action: &dyn Action) -> Option<&T> {
    action.as_any().downcast_ref::<T>()
}
