//! Undo/redo history
//!
//! Edits are [`Action`]s applied through a [`History`], which records them
//! so they can be undone and redone. See [`actions`] for the edits a song
//! supports.

pub mod action;
pub mod actions;
pub mod stack;

pub use action::{Action, ActionKind};
pub use actions::{
    AddEffect, ChannelOutput, ChannelPanning, ChannelVolume, InsertBar, NewChannel, NoteAdd,
    NoteChange, NoteRemove, RemoveBar, RemoveChannel, RemoveEffect, SequenceChange,
    SongMaxPatterns, SongTempo, SwapEffect,
};
pub use stack::{History, Stack};
