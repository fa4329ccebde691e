//! tambour-engine: the realtime sequencer and sampler core
//!
//! One audio cycle flows through a fixed pipeline: the transport snapshots
//! the musical position, every registered input writes frame-stamped
//! events into the bounded [`seq::EventQueue`], the sampler renders the
//! cycle's events plus all live voices into its mix buffers, the played
//! prefix of the queue is consumed, and the transport advances. A single
//! realtime thread drives all of it; control flows in through lock-free
//! channels on the [`EngineHandle`].

pub mod backend;
pub mod beat_counter;
pub mod config;
pub mod engine;
pub mod error;
pub mod reaper;
pub mod rng;
pub mod sampler;
pub mod seq;
pub mod sequencer;
pub mod transport;

pub use backend::{AudioBackend, MidiBackend, MixBuffer, OfflineBackend, OutputBuffers};
pub use beat_counter::BeatCounter;
pub use config::EngineConfig;
pub use engine::{Engine, EngineHandle, MAX_BUFFER_FRAMES, PositionMirror};
pub use error::{EngineError, EngineStats, Result};
pub use reaper::InstrumentReaper;
pub use sampler::{Sampler, Voice};
pub use seq::{
    EventKind, EventQueue, GuiInput, MidiInput, MidiMessage, MidiMessageKind, MidiNoteMap,
    QueueFull, SeqEvent, SeqInput, SeqOutput, SongInput,
};
pub use sequencer::{InputStage, OutputStage, Sequencer};
pub use transport::{InternalMaster, Transport, TransportMaster};
