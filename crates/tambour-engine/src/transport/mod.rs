//! Transport: musical position under a swappable clock master

mod internal;

pub use internal::InternalMaster;

use std::sync::Arc;

use tambour_core::{Song, TransportPosition, TransportState};

/// A clock master: the component actually in charge of bars, beats and
/// ticks. The built-in [`InternalMaster`] walks time itself; an external
/// master (a plugin host, a sync peer) can be swapped in instead.
pub trait TransportMaster: Send {
    /// Position of the first frame of the current cycle.
    fn position(&self) -> TransportPosition;
    /// Declare the cycle finished; the master moves to the next one.
    fn processed_frames(&mut self, nframes: u32);
    fn locate_frame(&mut self, frame: u64);
    fn locate_bbt(&mut self, bar: u32, beat: u32, tick: u32);
    fn start(&mut self);
    fn stop(&mut self);
    fn set_song(&mut self, song: Option<Arc<Song>>);
    fn set_frame_rate(&mut self, frame_rate: u32);
}

/// The transport the engine talks to. Delegates everything to the current
/// master.
pub struct Transport {
    master: Box<dyn TransportMaster>,
}

impl Transport {
    pub fn new(frame_rate: u32) -> Self {
        Self { master: Box::new(InternalMaster::new(frame_rate)) }
    }

    /// Replace the clock master. The new master should be located before
    /// rolling; the engine applies this only between cycles.
    pub fn set_master(&mut self, master: Box<dyn TransportMaster>) {
        self.master = master;
    }

    pub fn position(&self) -> TransportPosition {
        self.master.position()
    }

    pub fn state(&self) -> TransportState {
        self.master.position().state
    }

    pub fn processed_frames(&mut self, nframes: u32) {
        self.master.processed_frames(nframes);
    }

    pub fn locate_frame(&mut self, frame: u64) {
        self.master.locate_frame(frame);
    }

    pub fn locate_bbt(&mut self, bar: u32, beat: u32, tick: u32) {
        self.master.locate_bbt(bar, beat, tick);
    }

    pub fn start(&mut self) {
        self.master.start();
    }

    pub fn stop(&mut self) {
        self.master.stop();
    }

    pub fn set_song(&mut self, song: Option<Arc<Song>>) {
        self.master.set_song(song);
    }

    pub fn set_frame_rate(&mut self, frame_rate: u32) {
        self.master.set_frame_rate(frame_rate);
    }
}
