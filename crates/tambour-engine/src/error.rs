//! Engine errors and out-of-band RT counters

use std::sync::atomic::{AtomicU64, Ordering};

use thiserror::Error;

/// Errors returned synchronously by the control surface. Nothing in the
/// realtime path ever produces one of these; RT failures land in
/// [`EngineStats`] instead.
#[derive(Debug, Error)]
pub enum EngineError {
    #[error("Invalid tempo: {0} BPM")]
    InvalidBpm(f64),
    #[error("Locate target {0} past song end and looping is off")]
    LocatePastEnd(u64),
    #[error("Invalid bar:beat.tick target {bar}:{beat}.{tick}")]
    InvalidBbt { bar: u32, beat: u32, tick: u32 },
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),
    #[error("Control command queue full")]
    CommandQueueFull,
    #[error("No song loaded")]
    NoSong,
    #[error("No pattern at index {0}")]
    NoSuchPattern(usize),
}

pub type Result<T> = std::result::Result<T, EngineError>;

/// Atomic counters bumped from the audio thread and read from anywhere.
///
/// The RT cycle never fails; what would have been errors is tallied here
/// and surfaced to the UI out of band.
#[derive(Debug, Default)]
pub struct EngineStats {
    /// Events rejected because the queue was at capacity.
    pub events_dropped: AtomicU64,
    /// Note-ons discarded because no layer matched the velocity.
    pub missing_layers: AtomicU64,
    /// Audio-cycle deadline misses reported by the backend.
    pub xruns: AtomicU64,
    /// Voices evicted at the polyphony cap.
    pub voices_stolen: AtomicU64,
    /// Completed audio cycles.
    pub cycles: AtomicU64,
}

impl EngineStats {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_dropped_event(&self) {
        self.events_dropped.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_missing_layer(&self) {
        self.missing_layers.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_xrun(&self) {
        self.xruns.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_stolen_voice(&self) {
        self.voices_stolen.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_cycle(&self) {
        self.cycles.fetch_add(1, Ordering::Relaxed);
    }

    pub fn events_dropped(&self) -> u64 {
        self.events_dropped.load(Ordering::Relaxed)
    }

    pub fn missing_layers(&self) -> u64 {
        self.missing_layers.load(Ordering::Relaxed)
    }

    pub fn xruns(&self) -> u64 {
        self.xruns.load(Ordering::Relaxed)
    }

    pub fn voices_stolen(&self) -> u64 {
        self.voices_stolen.load(Ordering::Relaxed)
    }

    pub fn cycles(&self) -> u64 {
        self.cycles.load(Ordering::Relaxed)
    }
}
