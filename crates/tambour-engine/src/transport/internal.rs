//! The built-in transport master

use std::sync::Arc;

use tambour_core::{DEFAULT_PATTERN_TICKS, Song, TransportPosition, TransportState};

use super::TransportMaster;

/// Default master: walks musical time against the loaded song.
///
/// Advancement consumes whole ticks against the exact fractional
/// frames-per-tick of the bar each tick falls in, carrying the remainder
/// in `offset_exact`. Integer `bbt_offset` snapshots therefore never
/// accumulate drift, and per-bar tempo points take effect exactly at their
/// bar boundary.
pub struct InternalMaster {
    pos: TransportPosition,
    /// Exact frames into the current tick; `pos.bbt_offset` is its floor.
    offset_exact: f64,
    song: Option<Arc<Song>>,
}

impl InternalMaster {
    pub fn new(frame_rate: u32) -> Self {
        let mut pos = TransportPosition::default();
        pos.frame_rate = frame_rate;
        Self { pos, offset_exact: 0.0, song: None }
    }

    fn refresh_tempo(&mut self) {
        if let Some(song) = &self.song {
            self.pos.ticks_per_beat = song.resolution().max(1);
            self.pos.beats_per_minute = song.bpm_for_bar(self.pos.bar);
        }
    }

    fn ticks_in_bar(&self, bar: u32) -> u32 {
        self.song
            .as_ref()
            .map_or(DEFAULT_PATTERN_TICKS, |s| s.ticks_in_bar(bar))
    }

    fn beats_in_bar(&self, bar: u32) -> u32 {
        (self.ticks_in_bar(bar) / self.pos.ticks_per_beat).max(1)
    }

    fn bpm_for_bar(&self, bar: u32) -> f64 {
        self.song
            .as_ref()
            .map_or(self.pos.beats_per_minute, |s| s.bpm_for_bar(bar))
    }

    fn fpt_for_bar(&self, bar: u32) -> f64 {
        self.pos.frame_rate as f64 * 60.0
            / (self.bpm_for_bar(bar) * self.pos.ticks_per_beat as f64)
    }

    /// One tick forward, handling beat/bar wrap and per-bar tempo.
    fn advance_one_tick(&mut self) {
        self.pos.tick += 1;
        if self.pos.tick < self.pos.ticks_per_beat {
            return;
        }
        self.pos.tick = 0;
        self.pos.beat += 1;
        if self.pos.beat <= self.pos.beats_per_bar {
            return;
        }
        self.pos.beat = 1;
        // Leaving the current bar: its length joins the prefix sum.
        self.pos.bar_start_tick += self.ticks_in_bar(self.pos.bar) as u64;
        self.pos.bar += 1;
        self.pos.beats_per_bar = self.beats_in_bar(self.pos.bar);
        self.pos.beats_per_minute = self.bpm_for_bar(self.pos.bar);
    }
}

impl TransportMaster for InternalMaster {
    fn position(&self) -> TransportPosition {
        self.pos
    }

    fn processed_frames(&mut self, nframes: u32) {
        if self.pos.state != TransportState::Rolling {
            self.pos.new_position = false;
            return;
        }
        self.refresh_tempo();
        self.pos.frame += nframes as u64;
        self.pos.new_position = false;

        self.offset_exact += nframes as f64;
        loop {
            let fpt = self.pos.frames_per_tick();
            if self.offset_exact < fpt {
                break;
            }
            self.offset_exact -= fpt;
            self.advance_one_tick();
        }
        self.pos.bbt_offset = self.offset_exact as u32;
    }

    fn locate_frame(&mut self, frame: u64) {
        self.refresh_tempo();
        let target = frame as f64;

        // Walk bars, each spanning its own tempo, until the target falls
        // inside one.
        let mut bar = 1u32;
        let mut bar_start_frame = 0.0f64;
        let mut bar_start_tick = 0u64;
        let fpt = loop {
            let fpt = self.fpt_for_bar(bar);
            let ticks = self.ticks_in_bar(bar);
            let span = ticks as f64 * fpt;
            if target < bar_start_frame + span {
                break fpt;
            }
            bar_start_frame += span;
            bar_start_tick += ticks as u64;
            bar += 1;
        };

        let rel = target - bar_start_frame;
        let tick_in_bar = (rel / fpt).floor() as u64;
        self.offset_exact = rel - tick_in_bar as f64 * fpt;

        let tpb = self.pos.ticks_per_beat as u64;
        self.pos.frame = frame;
        self.pos.bbt_offset = self.offset_exact as u32;
        self.pos.bar = bar;
        self.pos.beat = 1 + (tick_in_bar / tpb) as u32;
        self.pos.tick = (tick_in_bar % tpb) as u32;
        self.pos.bar_start_tick = bar_start_tick;
        self.pos.beats_per_bar = self.beats_in_bar(bar);
        self.pos.beats_per_minute = self.bpm_for_bar(bar);
        self.pos.new_position = true;
    }

    fn locate_bbt(&mut self, bar: u32, beat: u32, tick: u32) {
        self.refresh_tempo();

        let mut frame = 0.0f64;
        let mut bar_start_tick = 0u64;
        for b in 1..bar {
            frame += self.ticks_in_bar(b) as f64 * self.fpt_for_bar(b);
            bar_start_tick += self.ticks_in_bar(b) as u64;
        }
        let tick_in_bar = (beat - 1) * self.pos.ticks_per_beat + tick;
        frame += tick_in_bar as f64 * self.fpt_for_bar(bar);

        self.pos.frame = frame.round() as u64;
        self.offset_exact = 0.0;
        self.pos.bbt_offset = 0;
        self.pos.bar = bar;
        self.pos.beat = beat;
        self.pos.tick = tick;
        self.pos.bar_start_tick = bar_start_tick;
        self.pos.beats_per_bar = self.beats_in_bar(bar);
        self.pos.beats_per_minute = self.bpm_for_bar(bar);
        self.pos.new_position = true;
    }

    fn start(&mut self) {
        self.pos.state = TransportState::Rolling;
    }

    fn stop(&mut self) {
        self.pos.state = TransportState::Stopped;
    }

    fn set_song(&mut self, song: Option<Arc<Song>>) {
        self.song = song;
        let frame_rate = self.pos.frame_rate;
        self.pos = TransportPosition::default();
        self.pos.frame_rate = frame_rate;
        self.offset_exact = 0.0;
        self.refresh_tempo();
        self.pos.beats_per_bar = self.beats_in_bar(1);
        self.pos.new_position = true;
    }

    fn set_frame_rate(&mut self, frame_rate: u32) {
        self.pos.frame_rate = frame_rate.max(1);
    }
}
