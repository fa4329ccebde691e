//! MIDI input: backend messages → note events

use std::sync::Arc;

use crossbeam_channel::{Receiver, Sender};
use serde::{Deserialize, Serialize};
use tracing::warn;

use tambour_core::{Note, Song, TransportPosition};

use crate::error::EngineStats;

use super::event::SeqEvent;
use super::input::SeqInput;
use super::queue::EventQueue;

/// A raw MIDI message as delivered by a backend.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MidiMessage {
    pub kind: MidiMessageKind,
    pub channel: u8,
    pub data1: u8,
    pub data2: u8,
    /// Sysex payload, when `kind` is `Sysex`.
    pub sysex: Option<Vec<u8>>,
    /// Cycle-relative frame; `None` means "now" (frame 0).
    pub frame: Option<u32>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MidiMessageKind {
    NoteOn,
    NoteOff,
    PolyphonicKeyPressure,
    ControlChange,
    ProgramChange,
    ChannelPressure,
    PitchWheel,
    Sysex,
    Start,
    Continue,
    Stop,
    SongPosition,
    Unknown,
}

impl MidiMessage {
    pub fn note_on(channel: u8, note: u8, velocity: u8) -> Self {
        Self {
            kind: MidiMessageKind::NoteOn,
            channel,
            data1: note,
            data2: velocity,
            sysex: None,
            frame: None,
        }
    }

    pub fn note_off(channel: u8, note: u8) -> Self {
        Self {
            kind: MidiMessageKind::NoteOff,
            channel,
            data1: note,
            data2: 0,
            sysex: None,
            frame: None,
        }
    }

    pub fn at_frame(mut self, frame: u32) -> Self {
        self.frame = Some(frame);
        self
    }
}

/// Sparse MIDI-note → instrument-index map, 128 entries, user-configurable.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MidiNoteMap {
    entries: Vec<Option<u32>>,
}

impl Default for MidiNoteMap {
    /// The conventional drum mapping: note 36 (kick) onward maps to
    /// instrument 0 onward.
    fn default() -> Self {
        let mut map = Self::empty();
        for note in 36..128u8 {
            map.set(note, Some((note - 36) as u32));
        }
        map
    }
}

impl MidiNoteMap {
    pub fn empty() -> Self {
        Self { entries: vec![None; 128] }
    }

    pub fn set(&mut self, note: u8, instrument_index: Option<u32>) {
        if let Some(slot) = self.entries.get_mut(note as usize) {
            *slot = instrument_index;
        }
    }

    pub fn lookup(&self, note: u8) -> Option<u32> {
        self.entries.get(note as usize).copied().flatten()
    }
}

/// Drains backend MIDI messages into the event queue each cycle.
///
/// Note-ons with velocity zero are note-offs. Non-note messages are
/// forwarded to a side channel for non-RT consumers (program changes,
/// transport controls and the like are not the sampler's business).
pub struct MidiInput {
    rx: Receiver<MidiMessage>,
    side_tx: Option<Sender<MidiMessage>>,
    map: MidiNoteMap,
    song: Option<Arc<Song>>,
    /// Only note messages on this channel trigger; `None` accepts all.
    channel_filter: Option<u8>,
    stats: Arc<EngineStats>,
}

impl MidiInput {
    pub fn new(rx: Receiver<MidiMessage>, stats: Arc<EngineStats>) -> Self {
        Self {
            rx,
            side_tx: None,
            map: MidiNoteMap::default(),
            song: None,
            channel_filter: None,
            stats,
        }
    }

    pub fn set_song(&mut self, song: Option<Arc<Song>>) {
        self.song = song;
    }

    pub fn set_note_map(&mut self, map: MidiNoteMap) {
        self.map = map;
    }

    pub fn note_map(&self) -> &MidiNoteMap {
        &self.map
    }

    /// Route non-note messages to `tx` instead of discarding them.
    pub fn set_side_channel(&mut self, tx: Option<Sender<MidiMessage>>) {
        self.side_tx = tx;
    }

    pub fn set_channel_filter(&mut self, channel: Option<u8>) {
        self.channel_filter = channel;
    }

    fn note_event(&self, msg: &MidiMessage, on: bool, nframes: u32) -> Option<SeqEvent> {
        let song = self.song.as_ref()?;
        let index = self.map.lookup(msg.data1)?;
        let instrument = song.instruments().get(index as usize)?.clone();
        // A frame past the cycle end still enqueues; consume() rebases it
        // into the next cycle.
        let frame = msg.frame.unwrap_or(0).min(nframes.saturating_mul(2));
        let mut note = Note::new(instrument);
        if on {
            note.set_velocity(msg.data2 as f32 / 127.0);
            Some(SeqEvent::note_on(frame, index, note))
        } else {
            Some(SeqEvent::note_off(frame, index, note))
        }
    }
}

impl SeqInput for MidiInput {
    fn process(&mut self, queue: &mut EventQueue, _pos: &TransportPosition, nframes: u32) {
        while let Ok(msg) = self.rx.try_recv() {
            let event = match msg.kind {
                MidiMessageKind::NoteOn | MidiMessageKind::NoteOff
                    if self.channel_filter.is_some_and(|ch| ch != msg.channel) =>
                {
                    None
                }
                MidiMessageKind::NoteOn if msg.data2 > 0 => self.note_event(&msg, true, nframes),
                MidiMessageKind::NoteOn | MidiMessageKind::NoteOff => {
                    self.note_event(&msg, false, nframes)
                }
                _ => {
                    if let Some(tx) = &self.side_tx {
                        // A full side channel drops the message; control
                        // traffic must not stall the audio thread.
                        let _ = tx.try_send(msg);
                    }
                    None
                }
            };
            if let Some(event) = event {
                if queue.insert(event).is_err() {
                    self.stats.record_dropped_event();
                    warn!("event queue full, MIDI event dropped");
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::seq::event::EventKind;
    use crossbeam_channel::bounded;
    use tambour_core::{Adsr, Instrument, InstrumentLayer, Sample};

    fn song_with_instruments(count: u32) -> Arc<Song> {
        let mut song = Song::new("kit", 120.0, 48);
        for id in 0..count {
            let mut instr = Instrument::new(id, format!("drum{id}"), Adsr::default());
            instr
                .set_layer(0, InstrumentLayer::new(Sample::mono(vec![0.1; 8], 48_000)))
                .unwrap();
            song.instruments_mut().add(Arc::new(instr));
        }
        Arc::new(song)
    }

    fn input() -> (Sender<MidiMessage>, MidiInput) {
        let (tx, rx) = bounded(64);
        let mut input = MidiInput::new(rx, Arc::new(EngineStats::new()));
        input.set_song(Some(song_with_instruments(4)));
        (tx, input)
    }

    #[test]
    fn note_on_maps_to_instrument() {
        let (tx, mut input) = input();
        tx.send(MidiMessage::note_on(0, 37, 127).at_frame(10)).unwrap();
        let mut queue = EventQueue::new(16);
        input.process(&mut queue, &TransportPosition::default(), 256);

        let ev = queue.iter().next().unwrap();
        assert_eq!(ev.kind, EventKind::NoteOn);
        assert_eq!(ev.frame, 10);
        assert_eq!(ev.instrument_index, 1);
        assert_eq!(ev.note.as_ref().unwrap().velocity(), 1.0);
    }

    #[test]
    fn zero_velocity_note_on_is_note_off() {
        let (tx, mut input) = input();
        tx.send(MidiMessage::note_on(0, 36, 0)).unwrap();
        let mut queue = EventQueue::new(16);
        input.process(&mut queue, &TransportPosition::default(), 256);
        assert_eq!(queue.iter().next().unwrap().kind, EventKind::NoteOff);
    }

    #[test]
    fn unmapped_note_is_ignored() {
        let (tx, mut input) = input();
        let mut map = MidiNoteMap::empty();
        map.set(40, Some(2));
        input.set_note_map(map);
        tx.send(MidiMessage::note_on(0, 41, 100)).unwrap();
        tx.send(MidiMessage::note_on(0, 40, 100)).unwrap();
        let mut queue = EventQueue::new(16);
        input.process(&mut queue, &TransportPosition::default(), 256);
        assert_eq!(queue.len(), 1);
        assert_eq!(queue.iter().next().unwrap().instrument_index, 2);
    }

    #[test]
    fn non_note_messages_go_to_the_side_channel() {
        let (tx, mut input) = input();
        let (side_tx, side_rx) = bounded(8);
        input.set_side_channel(Some(side_tx));
        tx.send(MidiMessage {
            kind: MidiMessageKind::ControlChange,
            channel: 0,
            data1: 7,
            data2: 100,
            sysex: None,
            frame: None,
        })
        .unwrap();
        let mut queue = EventQueue::new(16);
        input.process(&mut queue, &TransportPosition::default(), 256);
        assert!(queue.is_empty());
        assert_eq!(side_rx.try_recv().unwrap().kind, MidiMessageKind::ControlChange);
    }

    #[test]
    fn channel_filter_drops_other_channels() {
        let (tx, mut input) = input();
        input.set_channel_filter(Some(9));
        tx.send(MidiMessage::note_on(3, 36, 100)).unwrap();
        tx.send(MidiMessage::note_on(9, 36, 100)).unwrap();
        let mut queue = EventQueue::new(16);
        input.process(&mut queue, &TransportPosition::default(), 256);
        assert_eq!(queue.len(), 1);
    }

    #[test]
    fn untimed_messages_land_at_frame_zero() {
        let (tx, mut input) = input();
        tx.send(MidiMessage::note_on(0, 36, 64)).unwrap();
        let mut queue = EventQueue::new(16);
        input.process(&mut queue, &TransportPosition::default(), 256);
        assert_eq!(queue.iter().next().unwrap().frame, 0);
    }
}
