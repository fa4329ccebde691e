//! GUI input: lock-free note injection from UI threads

use std::sync::Arc;

use crossbeam_channel::{Receiver, Sender, bounded};
use tracing::warn;

use tambour_core::{TransportPosition, TransportState};

use crate::error::EngineStats;

use super::event::SeqEvent;
use super::input::SeqInput;
use super::queue::EventQueue;

/// Bounded MPSC ingress for UI-originated events (pad hits, previews,
/// panic). Any number of UI threads hold the [`Sender`]; the audio thread
/// drains in `process`.
///
/// Events flagged `quantize` are pushed forward to the next boundary of
/// the user's quantization grid; the rest play at their given frame
/// (usually 0, meaning "now").
pub struct GuiInput {
    rx: Receiver<SeqEvent>,
    /// Quantization grid in ticks; 0 disables quantization.
    grid_ticks: u32,
    stats: Arc<EngineStats>,
}

impl GuiInput {
    pub fn new(depth: usize, stats: Arc<EngineStats>) -> (Sender<SeqEvent>, Self) {
        let (tx, rx) = bounded(depth);
        (tx, Self { rx, grid_ticks: 0, stats })
    }

    pub fn set_grid_ticks(&mut self, ticks: u32) {
        self.grid_ticks = ticks;
    }

    /// Frame of the next grid boundary at or after `frame`, relative to the
    /// cycle start. On a boundary already: unchanged.
    fn quantize_forward(&self, pos: &TransportPosition, frame: u32) -> u32 {
        if self.grid_ticks == 0 {
            return frame;
        }
        let fpt = pos.frames_per_tick();
        let grid_frames = self.grid_ticks as f64 * fpt;
        // Frames elapsed since the previous grid boundary, at cycle start.
        let ticks_into_grid = (pos.abs_tick() % self.grid_ticks as u64) as f64;
        let into = ticks_into_grid * fpt + pos.bbt_offset as f64;
        let mut next = (grid_frames - into) % grid_frames;
        while next < frame as f64 {
            next += grid_frames;
        }
        next as u32
    }
}

impl SeqInput for GuiInput {
    fn process(&mut self, queue: &mut EventQueue, pos: &TransportPosition, _nframes: u32) {
        while let Ok(mut event) = self.rx.try_recv() {
            if event.quantize && pos.state == TransportState::Rolling {
                event.frame = self.quantize_forward(pos, event.frame);
            }
            if queue.insert(event).is_err() {
                self.stats.record_dropped_event();
                warn!("event queue full, GUI event dropped");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::seq::event::EventKind;
    use tambour_core::{Adsr, Instrument, Note};

    fn note_event(frame: u32, quantize: bool) -> SeqEvent {
        let instr = Arc::new(Instrument::new(0, "pad", Adsr::default()));
        let mut ev = SeqEvent::note_on(frame, 0, Note::new(instr));
        ev.quantize = quantize;
        ev
    }

    fn rolling_at(frame: u64, tick: u32, bbt_offset: u32) -> TransportPosition {
        let mut pos = TransportPosition::default();
        pos.state = TransportState::Rolling;
        pos.frame = frame;
        pos.tick = tick;
        pos.bbt_offset = bbt_offset;
        pos
    }

    #[test]
    fn drains_all_pending_events() {
        let stats = Arc::new(EngineStats::new());
        let (tx, mut input) = GuiInput::new(16, stats);
        tx.send(note_event(0, false)).unwrap();
        tx.send(note_event(5, false)).unwrap();
        let mut queue = EventQueue::new(16);
        input.process(&mut queue, &TransportPosition::default(), 256);
        assert_eq!(queue.len(), 2);
    }

    #[test]
    fn quantize_pushes_to_next_grid_boundary() {
        let stats = Arc::new(EngineStats::new());
        let (tx, mut input) = GuiInput::new(16, stats);
        input.set_grid_ticks(12);
        // Position: tick 2 + 100 frames into the tick. Next 12-tick
        // boundary is (12 - 2) * 500 - 100 = 4900 frames away.
        tx.send(note_event(0, true)).unwrap();
        let mut queue = EventQueue::new(16);
        input.process(&mut queue, &rolling_at(1100, 2, 100), 256);
        assert_eq!(queue.iter().next().unwrap().frame, 4900);
    }

    #[test]
    fn on_boundary_event_is_not_delayed() {
        let stats = Arc::new(EngineStats::new());
        let (tx, mut input) = GuiInput::new(16, stats);
        input.set_grid_ticks(12);
        tx.send(note_event(0, true)).unwrap();
        let mut queue = EventQueue::new(16);
        input.process(&mut queue, &rolling_at(0, 0, 0), 256);
        assert_eq!(queue.iter().next().unwrap().frame, 0);
    }

    #[test]
    fn stopped_transport_skips_quantization() {
        let stats = Arc::new(EngineStats::new());
        let (tx, mut input) = GuiInput::new(16, stats);
        input.set_grid_ticks(12);
        tx.send(note_event(0, true)).unwrap();
        let mut queue = EventQueue::new(16);
        input.process(&mut queue, &TransportPosition::default(), 256);
        assert_eq!(queue.iter().next().unwrap().frame, 0);
    }

    #[test]
    fn overflow_counts_dropped_events() {
        let stats = Arc::new(EngineStats::new());
        let (tx, mut input) = GuiInput::new(16, stats.clone());
        for i in 0..6 {
            tx.send(note_event(i, false)).unwrap();
        }
        let mut queue = EventQueue::new(4);
        input.process(&mut queue, &TransportPosition::default(), 256);
        assert_eq!(queue.len(), 4);
        assert_eq!(stats.events_dropped(), 2);
        assert_eq!(queue.iter().next().unwrap().kind, EventKind::NoteOn);
    }
}
