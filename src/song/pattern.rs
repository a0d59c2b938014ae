//! Patterns and notes

use std::sync::atomic::{AtomicU64, Ordering};

static NEXT_NOTE_ID: AtomicU64 = AtomicU64::new(1);

/// A note inside a pattern. Times and lengths are in beats from the start
/// of the bar.
///
/// Every note gets a process-unique id at creation, which the sequencer and
/// history use to tell notes apart; clones keep the id.
#[derive(Debug, Clone, PartialEq)]
pub struct Note {
    pub time: f32,
    pub key: i32,
    pub length: f32,
    id: u64,
}

impl Note {
    pub fn new(time: f32, key: i32, length: f32) -> Self {
        Self {
            time,
            key,
            length,
            id: NEXT_NOTE_ID.fetch_add(1, Ordering::Relaxed),
        }
    }

    pub fn id(&self) -> u64 {
        self.id
    }

    /// Same note identity with new timing and pitch
    pub fn with_values(&self, time: f32, key: i32, length: f32) -> Self {
        Self {
            time,
            key,
            length,
            id: self.id,
        }
    }

    /// True while `beat` lies strictly inside the note.
    pub fn is_sounding_at(&self, beat: f32) -> bool {
        beat > self.time && beat < self.time + self.length
    }
}

/// One bar's worth of notes for a channel.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Pattern {
    pub notes: Vec<Note>,
}

impl Pattern {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_empty(&self) -> bool {
        self.notes.is_empty()
    }

    /// Add a note and return a copy carrying its id.
    pub fn add_note(&mut self, time: f32, key: i32, length: f32) -> Note {
        let note = Note::new(time, key, length);
        self.notes.push(note.clone());
        note
    }

    pub fn find(&self, id: u64) -> Option<&Note> {
        self.notes.iter().find(|n| n.id == id)
    }

    pub fn find_mut(&mut self, id: u64) -> Option<&mut Note> {
        self.notes.iter_mut().find(|n| n.id == id)
    }

    /// Remove the note with `id`, if present.
    pub fn remove(&mut self, id: u64) -> Option<Note> {
        let pos = self.notes.iter().position(|n| n.id == id)?;
        Some(self.notes.remove(pos))
    }
}
