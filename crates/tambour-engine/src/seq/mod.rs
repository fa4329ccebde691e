//! The sequencer event pipeline: inputs → queue → sinks

mod event;
mod gui_input;
mod input;
mod midi_input;
mod queue;
mod song_input;

pub use event::{EventKind, SeqEvent};
pub use gui_input::GuiInput;
pub use input::{SeqInput, SeqOutput};
pub use midi_input::{MidiInput, MidiMessage, MidiMessageKind, MidiNoteMap};
pub use queue::{EventIter, EventQueue, QueueFull};
pub use song_input::SongInput;
