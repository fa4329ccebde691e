//! tambour-core: Domain types for the tambour drum sequencer

mod adsr;
mod error;
mod instrument;
mod note;
mod pattern;
mod position;
mod sample;
mod song;

pub use adsr::{Adsr, AdsrState};
pub use error::{CoreError, Result};
pub use instrument::{
    AtomicF32, Instrument, InstrumentId, InstrumentLayer, InstrumentList, MAX_LAYERS,
};
pub use note::{Note, NoteKey, MAX_PAN};
pub use pattern::{Pattern, PatternId, DEFAULT_PATTERN_TICKS};
pub use position::{Granularity, TransportPosition, TransportState};
pub use sample::Sample;
pub use song::{Song, SongMode};
