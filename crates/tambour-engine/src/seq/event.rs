//! Events flowing from sequencer inputs to sinks

use std::sync::Arc;

use tambour_core::Note;

/// What an event asks a sink to do.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventKind {
    NoteOn,
    NoteOff,
    /// Release every sounding voice (panic).
    AllOff,
}

/// One scheduled event, keyed by its frame offset from the start of the
/// current audio cycle.
///
/// Events with equal frames keep their insertion order; inputs run in
/// registration order, so ordering across inputs is deterministic.
#[derive(Debug, Clone)]
pub struct SeqEvent {
    /// Offset from the first frame of the current cycle. Events at or past
    /// `nframes` stay queued and are rebased by `consume`.
    pub frame: u32,
    pub kind: EventKind,
    /// Index into the song's instrument list, for per-track outputs.
    pub instrument_index: u32,
    /// The note payload; absent for `AllOff`.
    pub note: Option<Note>,
    pub quantize: bool,
}

impl SeqEvent {
    pub fn note_on(frame: u32, instrument_index: u32, note: Note) -> Self {
        Self {
            frame,
            kind: EventKind::NoteOn,
            instrument_index,
            note: Some(note),
            quantize: false,
        }
    }

    pub fn note_off(frame: u32, instrument_index: u32, note: Note) -> Self {
        Self {
            frame,
            kind: EventKind::NoteOff,
            instrument_index,
            note: Some(note),
            quantize: false,
        }
    }

    pub fn all_off(frame: u32) -> Self {
        Self {
            frame,
            kind: EventKind::AllOff,
            instrument_index: 0,
            note: None,
            quantize: false,
        }
    }

    /// The instrument this event references, if any.
    pub fn instrument(&self) -> Option<&Arc<tambour_core::Instrument>> {
        self.note.as_ref().map(Note::instrument)
    }

    /// Identity comparison for removal: same frame, kind, index and
    /// instrument.
    pub fn matches(&self, other: &SeqEvent) -> bool {
        self.frame == other.frame
            && self.kind == other.kind
            && self.instrument_index == other.instrument_index
            && match (self.instrument(), other.instrument()) {
                (Some(a), Some(b)) => Arc::ptr_eq(a, b),
                (None, None) => true,
                _ => false,
            }
    }
}
