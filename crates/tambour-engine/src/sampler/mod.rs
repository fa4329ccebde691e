//! The sampler: polyphonic voice pool and mixdown

mod voice;

pub use voice::Voice;

use std::collections::VecDeque;
use std::sync::Arc;

use tracing::warn;

use tambour_core::{Instrument, TransportPosition};

use crate::backend::MixBuffer;
use crate::error::EngineStats;
use crate::seq::{EventKind, EventQueue, SeqEvent, SeqOutput};

/// Renders the cycle's events plus all live voices into stereo mix
/// buffers, with optional per-instrument track buffers.
///
/// The voice pool is bounded: at `max_notes` the oldest voice is evicted
/// to make room. Event handling honors mute groups (peers release at the
/// event frame), `stop_notes` instruments (own voices release first) and
/// zero-velocity note-ons (treated as note-offs).
pub struct Sampler {
    voices: VecDeque<Voice>,
    max_notes: usize,
    main: MixBuffer,
    tracks: Vec<MixBuffer>,
    stats: Arc<EngineStats>,
}

impl Sampler {
    /// `track_count` of zero disables per-track outputs.
    pub fn new(
        max_notes: usize,
        buffer_frames: usize,
        track_count: usize,
        stats: Arc<EngineStats>,
    ) -> Self {
        Self {
            voices: VecDeque::with_capacity(max_notes + 1),
            max_notes: max_notes.max(1),
            main: MixBuffer::new(buffer_frames),
            tracks: (0..track_count).map(|_| MixBuffer::new(buffer_frames)).collect(),
            stats,
        }
    }

    pub fn voice_count(&self) -> usize {
        self.voices.len()
    }

    pub fn max_notes(&self) -> usize {
        self.max_notes
    }

    pub fn set_max_notes(&mut self, max_notes: usize) {
        self.max_notes = max_notes.max(1);
    }

    pub fn main_out(&self) -> (&[f32], &[f32]) {
        (self.main.left(), self.main.right())
    }

    /// Per-instrument output, when track outputs are enabled.
    pub fn track_out(&self, index: usize) -> Option<(&[f32], &[f32])> {
        self.tracks.get(index).map(|t| (t.left(), t.right()))
    }

    pub fn track_count(&self) -> usize {
        self.tracks.len()
    }

    /// Voices of `instrument` release at `frame` this cycle.
    fn release_instrument(&mut self, instrument: &Arc<Instrument>, frame: u32) {
        for voice in &mut self.voices {
            if Arc::ptr_eq(voice.instrument(), instrument) {
                voice.schedule_release(frame);
            }
        }
    }

    fn evict_oldest(&mut self) {
        if let Some(voice) = self.voices.pop_front() {
            voice.instrument().dequeue();
            self.stats.record_stolen_voice();
        }
    }

    fn handle_event(&mut self, event: &SeqEvent) {
        match event.kind {
            EventKind::NoteOn => {
                let Some(note) = &event.note else {
                    return;
                };
                if note.velocity() == 0.0 {
                    // A zero-velocity note-on is a note-off.
                    let instrument = note.instrument().clone();
                    self.release_instrument(&instrument, event.frame);
                    return;
                }
                let instrument = note.instrument().clone();
                if instrument.layer_for_velocity(note.velocity()).is_none() {
                    self.stats.record_missing_layer();
                    warn!(
                        instrument = instrument.name(),
                        velocity = note.velocity(),
                        "no layer for velocity, note dropped"
                    );
                    return;
                }

                let group = instrument.mute_group();
                if group != -1 {
                    for voice in &mut self.voices {
                        let other = voice.instrument();
                        if !Arc::ptr_eq(other, &instrument) && other.mute_group() == group {
                            voice.schedule_release(event.frame);
                        }
                    }
                }
                if instrument.stops_notes() {
                    self.release_instrument(&instrument, event.frame);
                }

                if self.voices.len() >= self.max_notes {
                    self.evict_oldest();
                }

                let (layer_index, layer) = instrument
                    .layer_for_velocity(note.velocity())
                    .expect("layer checked above");
                let voice =
                    Voice::start(note.clone(), event.instrument_index, layer_index, layer, event.frame);
                instrument.enqueue();
                self.voices.push_back(voice);
            }
            EventKind::NoteOff => {
                if let Some(note) = &event.note {
                    let instrument = note.instrument().clone();
                    self.release_instrument(&instrument, event.frame);
                }
            }
            EventKind::AllOff => {
                for voice in &mut self.voices {
                    voice.schedule_release(event.frame);
                }
            }
        }
    }

    /// Drop every voice immediately (transport stop / song swap), releasing
    /// the instrument references.
    pub fn reset(&mut self) {
        for voice in self.voices.drain(..) {
            voice.instrument().dequeue();
        }
    }
}

impl SeqOutput for Sampler {
    fn process(&mut self, queue: &EventQueue, pos: &TransportPosition, nframes: u32) {
        let nframes = (nframes as usize).min(self.main.capacity()) as u32;
        self.main.clear(nframes as usize);
        for track in &mut self.tracks {
            track.clear(nframes as usize);
        }

        // The cap may have been lowered between cycles.
        while self.voices.len() > self.max_notes {
            self.evict_oldest();
        }

        for event in queue.events_before(nframes) {
            self.handle_event(event);
        }

        let frame_rate = pos.frame_rate;
        let Self { voices, main, tracks, .. } = self;
        voices.retain_mut(|voice| {
            let track = tracks.get_mut(voice.instrument_index() as usize);
            let finished = voice.render(nframes, frame_rate, main, track);
            if finished {
                voice.instrument().dequeue();
            }
            !finished
        });
    }
}
