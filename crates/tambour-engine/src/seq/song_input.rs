//! Song input: pattern data → note events

use std::sync::Arc;

use tracing::warn;

use tambour_core::{
    Granularity, Instrument, Note, Pattern, Song, SongMode, TransportPosition, TransportState,
};

use crate::error::EngineStats;
use crate::rng::RtRng;

use super::event::SeqEvent;
use super::input::SeqInput;
use super::queue::EventQueue;

/// Upper bound for the timing-humanize offset, in frames.
const MAX_HUMANIZE_FRAMES: f32 = 2000.0;
/// Lead/lag swings the note by up to this many ticks either way.
const LEAD_LAG_TICKS: f64 = 5.0;

/// Translates song/pattern data into note events for each cycle.
///
/// For every tick whose frame lands inside the cycle, emits the notes of
/// the active pattern(s) with swing, humanize, lead/lag and random-pitch
/// adjustments applied, plus the metronome when enabled.
pub struct SongInput {
    song: Option<Arc<Song>>,
    /// The single looped pattern in pattern mode.
    active_pattern: Option<Arc<Pattern>>,
    metronome: Option<Arc<Instrument>>,
    metronome_enabled: bool,
    metronome_volume: f32,
    rng: RtRng,
    stats: Arc<EngineStats>,
}

impl SongInput {
    pub fn new(stats: Arc<EngineStats>, seed: u64) -> Self {
        Self {
            song: None,
            active_pattern: None,
            metronome: None,
            metronome_enabled: false,
            metronome_volume: 0.8,
            rng: RtRng::with_seed(seed),
            stats,
        }
    }

    pub fn set_song(&mut self, song: Option<Arc<Song>>) {
        self.song = song;
        self.active_pattern = None;
    }

    pub fn song(&self) -> Option<&Arc<Song>> {
        self.song.as_ref()
    }

    /// Select the pattern to loop in pattern mode.
    pub fn set_active_pattern(&mut self, pattern: Option<Arc<Pattern>>) {
        self.active_pattern = pattern;
    }

    pub fn set_metronome(&mut self, instrument: Option<Arc<Instrument>>) {
        self.metronome = instrument;
    }

    pub fn set_metronome_enabled(&mut self, enabled: bool, volume: f32) {
        self.metronome_enabled = enabled;
        self.metronome_volume = volume.clamp(0.0, 1.0);
    }

    fn emit_note(
        &mut self,
        queue: &mut EventQueue,
        song: &Song,
        source: &Note,
        base_frame: i64,
        tick_in_bar: u32,
        fpt: f64,
    ) {
        let mut note = source.clone();
        let mut offset: i64 = 0;

        // Swing falls on the odd 12-tick subdivisions of each 24-tick group.
        let swing = song.swing_factor();
        if swing > 0.0 && tick_in_bar % 12 == 0 && tick_in_bar % 24 != 0 {
            offset += (6.0 * fpt * swing as f64) as i64;
        }

        let humanize_time = song.humanize_time();
        if humanize_time != 0.0 {
            offset += (self.rng.gaussian(0.3) * humanize_time * MAX_HUMANIZE_FRAMES) as i64;
        }

        offset += (note.lead_lag() as f64 * LEAD_LAG_TICKS * fpt) as i64;

        note.set_humanize_delay(offset.clamp(i32::MIN as i64, i32::MAX as i64) as i32);
        let frame = (base_frame + offset).max(0) as u32;

        let humanize_velocity = song.humanize_velocity();
        if humanize_velocity != 0.0 {
            let factor = 1.0 + humanize_velocity * self.rng.gaussian(0.2);
            note.set_velocity(note.velocity() * factor);
        }

        let random_pitch = note.instrument().random_pitch_factor();
        if random_pitch != 0.0 {
            note.set_pitch(note.pitch() + (2.0 * self.rng.gaussian(0.2) - 1.0) * random_pitch);
        }

        let instrument_index = song
            .instruments()
            .index_of(note.instrument().id())
            .unwrap_or(0) as u32;

        let length_frames = if note.length() < 0 {
            None
        } else {
            Some((note.length() as f64 * fpt) as u32)
        };

        let event = SeqEvent::note_on(frame, instrument_index, note);
        if queue.insert_note(event, length_frames).is_err() {
            self.stats.record_dropped_event();
            warn!("event queue full, note dropped");
        }
    }

    fn emit_metronome(
        &mut self,
        queue: &mut EventQueue,
        song: &Song,
        pos: &TransportPosition,
        frame: u32,
    ) {
        let Some(instrument) = self.metronome.clone() else {
            return;
        };
        instrument.set_volume(self.metronome_volume);
        // The metronome usually lives outside the song's instrument list;
        // an out-of-range index keeps it off the per-instrument track
        // buffers (the sampler ignores indices past the track vector).
        let instrument_index = song
            .instruments()
            .index_of(instrument.id())
            .map_or(u32::MAX, |i| i as u32);
        let bar_start = pos.tick_in_bar() == 0;
        let mut note = Note::new(instrument)
            .with_velocity(if bar_start { 1.0 } else { 0.8 })
            .with_pitch(if bar_start { 3.0 } else { 0.0 });
        note.set_length(-1);
        if queue.insert(SeqEvent::note_on(frame, instrument_index, note)).is_err() {
            self.stats.record_dropped_event();
        }
    }
}

impl SeqInput for SongInput {
    fn process(&mut self, queue: &mut EventQueue, pos: &TransportPosition, nframes: u32) {
        let Some(song) = self.song.clone() else {
            return;
        };
        if pos.state != TransportState::Rolling {
            return;
        }

        let end_frame = pos.frame + nframes as u64;
        let mut cur = *pos;
        cur.ceil(Granularity::Tick);

        while cur.frame < end_frame {
            let fpt = cur.frames_per_tick();
            let tick_in_bar = cur.tick_in_bar();
            let base_frame = (cur.frame - pos.frame) as i64;

            if self.metronome_enabled && tick_in_bar % cur.ticks_per_beat == 0 {
                self.emit_metronome(queue, &song, &cur, base_frame as u32);
            }

            match song.mode() {
                SongMode::Song => {
                    for pattern in song.patterns_in_bar(cur.bar) {
                        for note in pattern.notes_at(tick_in_bar) {
                            self.emit_note(queue, &song, note, base_frame, tick_in_bar, fpt);
                        }
                    }
                }
                SongMode::Pattern => {
                    if let Some(pattern) = self.active_pattern.clone() {
                        let tick = (cur.abs_tick() % pattern.length() as u64) as u32;
                        for note in pattern.notes_at(tick) {
                            self.emit_note(queue, &song, note, base_frame, tick, fpt);
                        }
                    }
                }
            }

            cur.increment();
            // Bars can differ in length and tempo; refresh the signature
            // when the walk crosses into a new one.
            if cur.tick_in_bar() == 0 {
                let beats = (song.ticks_in_bar(cur.bar) / cur.ticks_per_beat).max(1);
                cur.beats_per_bar = beats;
                cur.beats_per_minute = song.bpm_for_bar(cur.bar);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::seq::event::EventKind;
    use tambour_core::{Adsr, InstrumentLayer, Sample};

    fn kit_instrument(id: u32) -> Arc<Instrument> {
        let mut instr = Instrument::new(id, format!("drum{id}"), Adsr::default());
        instr
            .set_layer(0, InstrumentLayer::new(Sample::mono(vec![0.5; 64], 48_000)))
            .unwrap();
        Arc::new(instr)
    }

    fn one_bar_song(note_ticks: &[u32]) -> Arc<Song> {
        let mut song = Song::new("test", 120.0, 48);
        let instr = kit_instrument(0);
        song.instruments_mut().add(instr.clone());
        let mut pattern = Pattern::new(0, "beat", 192);
        for &tick in note_ticks {
            pattern.add_note(tick, Note::new(instr.clone()));
        }
        let idx = song.add_pattern(pattern);
        song.add_bar(vec![idx]);
        Arc::new(song)
    }

    fn rolling_position() -> TransportPosition {
        let mut pos = TransportPosition::default();
        pos.state = TransportState::Rolling;
        pos
    }

    fn input_with(song: &Arc<Song>) -> SongInput {
        let mut input = SongInput::new(Arc::new(EngineStats::new()), 7);
        input.set_song(Some(song.clone()));
        input
    }

    #[test]
    fn emits_notes_for_ticks_inside_the_cycle() {
        // fpt = 500: ticks 0 and 1 land inside a 1000-frame cycle.
        let song = one_bar_song(&[0, 1, 2]);
        let mut input = input_with(&song);
        let mut queue = EventQueue::new(64);
        input.process(&mut queue, &rolling_position(), 1000);

        let ons: Vec<u32> = queue
            .iter()
            .filter(|ev| ev.kind == EventKind::NoteOn)
            .map(|ev| ev.frame)
            .collect();
        assert_eq!(ons, vec![0, 500]);
    }

    #[test]
    fn stopped_transport_emits_nothing() {
        let song = one_bar_song(&[0]);
        let mut input = input_with(&song);
        let mut queue = EventQueue::new(64);
        input.process(&mut queue, &TransportPosition::default(), 1000);
        assert!(queue.is_empty());
    }

    #[test]
    fn note_length_becomes_a_paired_off() {
        let mut song = Song::new("test", 120.0, 48);
        let instr = kit_instrument(0);
        song.instruments_mut().add(instr.clone());
        let mut pattern = Pattern::new(0, "beat", 192);
        pattern.add_note(0, Note::new(instr.clone()).with_length(2));
        let idx = song.add_pattern(pattern);
        song.add_bar(vec![idx]);
        let song = Arc::new(song);

        let mut input = input_with(&song);
        let mut queue = EventQueue::new(64);
        input.process(&mut queue, &rolling_position(), 500);

        let events: Vec<(u32, EventKind)> = queue.iter().map(|ev| (ev.frame, ev.kind)).collect();
        // 2 ticks at 500 frames each.
        assert_eq!(events, vec![(0, EventKind::NoteOn), (1000, EventKind::NoteOff)]);
    }

    #[test]
    fn swing_delays_odd_subdivisions() {
        let song = one_bar_song(&[12]);
        song.set_swing_factor(0.5);
        let mut input = input_with(&song);
        let mut queue = EventQueue::new(64);
        // Cover the whole bar so tick 12 is reached: 192 ticks * 500.
        input.process(&mut queue, &rolling_position(), 192 * 500);

        let ev = queue.iter().next().unwrap();
        // 12 * 500 + 6 * 500 * 0.5
        assert_eq!(ev.frame, 6000 + 1500);
    }

    #[test]
    fn swing_skips_even_24_tick_marks() {
        let song = one_bar_song(&[24]);
        song.set_swing_factor(1.0);
        let mut input = input_with(&song);
        let mut queue = EventQueue::new(64);
        input.process(&mut queue, &rolling_position(), 192 * 500);
        assert_eq!(queue.iter().next().unwrap().frame, 24 * 500);
    }

    #[test]
    fn humanized_velocity_stays_in_range() {
        let song = one_bar_song(&[0, 12, 24, 36, 48, 60, 72, 84]);
        song.set_humanize_velocity(1.0);
        let mut input = input_with(&song);
        let mut queue = EventQueue::new(256);
        input.process(&mut queue, &rolling_position(), 192 * 500);
        assert!(!queue.is_empty());
        for ev in queue.iter() {
            let v = ev.note.as_ref().unwrap().velocity();
            assert!((0.0..=1.0).contains(&v));
        }
    }

    #[test]
    fn pattern_mode_loops_the_active_pattern() {
        let song = one_bar_song(&[]);
        song.set_mode(SongMode::Pattern);
        let mut input = input_with(&song);

        let instr = kit_instrument(1);
        let mut pattern = Pattern::new(9, "loop", 4);
        pattern.add_note(0, Note::new(instr));
        input.set_active_pattern(Some(Arc::new(pattern)));

        let mut queue = EventQueue::new(64);
        // 8 ticks: the 4-tick pattern wraps twice.
        input.process(&mut queue, &rolling_position(), 8 * 500);
        let ons: Vec<u32> = queue.iter().map(|ev| ev.frame).collect();
        assert_eq!(ons, vec![0, 2000]);
    }

    #[test]
    fn metronome_marks_beats() {
        let song = one_bar_song(&[]);
        let mut input = input_with(&song);
        input.set_metronome(Some(kit_instrument(99)));
        input.set_metronome_enabled(true, 0.5);

        let mut queue = EventQueue::new(64);
        // Two beats: 96 ticks.
        input.process(&mut queue, &rolling_position(), 96 * 500);
        let marks: Vec<(u32, f32)> = queue
            .iter()
            .map(|ev| (ev.frame, ev.note.as_ref().unwrap().pitch()))
            .collect();
        // Bar start gets the accented pitch.
        assert_eq!(marks, vec![(0, 3.0), (48 * 500, 0.0)]);
        // The metronome is not a song instrument; it must stay off the
        // per-instrument track buffers rather than bleed into track 0.
        assert!(queue.iter().all(|ev| ev.instrument_index == u32::MAX));
    }
}
