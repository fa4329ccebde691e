//! Transport position: sample-accurate musical time

use serde::{Deserialize, Serialize};

/// Transport playback state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum TransportState {
    #[default]
    Stopped,
    Rolling,
}

/// Snap granularity for [`TransportPosition::floor`] and friends.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Granularity {
    Bar,
    Beat,
    Tick,
}

/// The musical location of the first frame of one audio cycle.
///
/// A fresh copy flows out of the transport into every component each cycle;
/// nothing mutates a shared instance. All fields are kept self-consistent
/// by every operation: `tick < ticks_per_beat`, `beat` in
/// `[1, beats_per_bar]`, `bar >= 1`, `bbt_offset < frames_per_tick`.
///
/// Tick arithmetic carries a fractional-frame accumulator so that walking
/// ticks one at a time stays within a frame of the exact real-valued
/// position no matter how many steps are taken, and so that `pos + n - n`
/// restores `pos` exactly.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TransportPosition {
    pub state: TransportState,
    /// True on the cycle immediately after a locate.
    pub new_position: bool,
    /// Frame of the first frame of the cycle.
    pub frame: u64,
    pub frame_rate: u32,
    /// Measure, starting at 1.
    pub bar: u32,
    /// Beat within the bar, starting at 1.
    pub beat: u32,
    /// Tick within the beat, starting at 0.
    pub tick: u32,
    /// Frames into the current tick.
    pub bbt_offset: u32,
    /// Ticks elapsed in the song at the start of this bar.
    pub bar_start_tick: u64,
    pub beats_per_bar: u32,
    pub beat_type: u32,
    pub ticks_per_beat: u32,
    pub beats_per_minute: f64,
    frame_frac: f64,
}

impl Default for TransportPosition {
    fn default() -> Self {
        Self {
            state: TransportState::Stopped,
            new_position: true,
            frame: 0,
            frame_rate: 48_000,
            bar: 1,
            beat: 1,
            tick: 0,
            bbt_offset: 0,
            bar_start_tick: 0,
            beats_per_bar: 4,
            beat_type: 4,
            ticks_per_beat: 48,
            beats_per_minute: 120.0,
            frame_frac: 0.0,
        }
    }
}

impl TransportPosition {
    /// Frames spanned by one tick at the current tempo. Fractional.
    pub fn frames_per_tick(&self) -> f64 {
        self.frame_rate as f64 * 60.0 / (self.beats_per_minute * self.ticks_per_beat as f64)
    }

    /// Tick within the current bar (0-based).
    pub fn tick_in_bar(&self) -> u32 {
        (self.beat - 1) * self.ticks_per_beat + self.tick
    }

    /// Ticks elapsed in the song at this position.
    pub fn abs_tick(&self) -> u64 {
        self.bar_start_tick + self.tick_in_bar() as u64
    }

    /// Ticks in a bar of this position's time signature.
    pub fn ticks_per_bar(&self) -> u32 {
        self.beats_per_bar * self.ticks_per_beat
    }

    /// Exact real-valued frame, accumulator included.
    fn exact_frame(&self) -> f64 {
        self.frame as f64 + self.frame_frac
    }

    fn set_exact_frame(&mut self, exact: f64) {
        let exact = exact.max(0.0);
        let whole = exact.floor();
        self.frame = whole as u64;
        self.frame_frac = exact - whole;
    }

    fn normalize_forward(&mut self) {
        while self.tick >= self.ticks_per_beat {
            self.tick -= self.ticks_per_beat;
            self.beat += 1;
        }
        while self.beat > self.beats_per_bar {
            self.beat -= self.beats_per_bar;
            self.bar += 1;
            self.bar_start_tick += self.ticks_per_bar() as u64;
        }
    }

    /// Advance by exactly one tick.
    pub fn increment(&mut self) {
        self.set_exact_frame(self.exact_frame() + self.frames_per_tick());
        self.tick += 1;
        self.normalize_forward();
    }

    /// Step back by exactly one tick, saturating at the song origin.
    pub fn decrement(&mut self) {
        self.set_exact_frame(self.exact_frame() - self.frames_per_tick());
        if self.tick > 0 {
            self.tick -= 1;
        } else {
            self.tick = self.ticks_per_beat - 1;
            if self.beat > 1 {
                self.beat -= 1;
            } else if self.bar > 1 {
                self.bar -= 1;
                self.beat = self.beats_per_bar;
                self.bar_start_tick = self
                    .bar_start_tick
                    .saturating_sub(self.ticks_per_bar() as u64);
            } else {
                // Already at 1:1.0; clamp.
                self.beat = 1;
                self.tick = 0;
                self.frame = 0;
                self.frame_frac = 0.0;
                self.bbt_offset = 0;
            }
        }
    }

    /// Move by `ticks` ticks, either direction.
    pub fn offset_ticks(&mut self, ticks: i64) {
        if ticks >= 0 {
            for _ in 0..ticks {
                self.increment();
            }
        } else {
            for _ in 0..(-ticks) {
                self.decrement();
            }
        }
    }

    /// Snap down to the nearest boundary. Identity when already exact.
    pub fn floor(&mut self, granularity: Granularity) {
        // Tick first; coarser snaps build on it.
        if self.bbt_offset > 0 {
            self.set_exact_frame(self.frame as f64 - self.bbt_offset as f64);
            self.frame_frac = 0.0;
            self.bbt_offset = 0;
        }
        match granularity {
            Granularity::Tick => {}
            Granularity::Beat => {
                if self.tick > 0 {
                    let back = self.tick as f64 * self.frames_per_tick();
                    self.set_exact_frame(self.exact_frame() - back);
                    self.tick = 0;
                }
            }
            Granularity::Bar => {
                self.floor(Granularity::Beat);
                if self.beat > 1 {
                    let back =
                        ((self.beat - 1) * self.ticks_per_beat) as f64 * self.frames_per_tick();
                    self.set_exact_frame(self.exact_frame() - back);
                    self.beat = 1;
                }
            }
        }
    }

    /// Snap up to the nearest boundary. Identity when already exact.
    pub fn ceil(&mut self, granularity: Granularity) {
        if self.bbt_offset > 0 {
            let forward = self.frames_per_tick() - self.bbt_offset as f64;
            self.set_exact_frame(self.frame as f64 + forward);
            self.bbt_offset = 0;
            self.tick += 1;
            self.normalize_forward();
        }
        match granularity {
            Granularity::Tick => {}
            Granularity::Beat => {
                if self.tick > 0 {
                    let ahead = (self.ticks_per_beat - self.tick) as f64 * self.frames_per_tick();
                    self.set_exact_frame(self.exact_frame() + ahead);
                    self.tick = 0;
                    self.beat += 1;
                    self.normalize_forward();
                }
            }
            Granularity::Bar => {
                self.ceil(Granularity::Beat);
                if self.beat > 1 {
                    let ahead = ((self.beats_per_bar - self.beat + 1) * self.ticks_per_beat) as f64
                        * self.frames_per_tick();
                    self.set_exact_frame(self.exact_frame() + ahead);
                    self.bar += 1;
                    self.beat = 1;
                    self.bar_start_tick += self.ticks_per_bar() as u64;
                }
            }
        }
    }

    /// Snap to the nearest boundary, halfway rounding up.
    pub fn round(&mut self, granularity: Granularity) {
        let fpt = self.frames_per_tick();
        let d_tick = self.tick as f64 + self.bbt_offset as f64 / fpt;
        match granularity {
            Granularity::Tick => {
                if (self.bbt_offset as f64) >= fpt / 2.0 {
                    self.ceil(Granularity::Tick);
                } else {
                    self.floor(Granularity::Tick);
                }
            }
            Granularity::Beat => {
                if d_tick >= self.ticks_per_beat as f64 / 2.0 {
                    self.ceil(Granularity::Beat);
                } else {
                    self.floor(Granularity::Beat);
                }
            }
            Granularity::Bar => {
                let d_beat = (self.beat - 1) as f64 + d_tick / self.ticks_per_beat as f64;
                if d_beat >= self.beats_per_bar as f64 / 2.0 {
                    self.ceil(Granularity::Bar);
                } else {
                    self.floor(Granularity::Bar);
                }
            }
        }
    }
}

impl std::ops::AddAssign<i64> for TransportPosition {
    fn add_assign(&mut self, ticks: i64) {
        self.offset_ticks(ticks);
    }
}

impl std::ops::SubAssign<i64> for TransportPosition {
    fn sub_assign(&mut self, ticks: i64) {
        self.offset_ticks(-ticks);
    }
}

impl std::ops::Add<i64> for TransportPosition {
    type Output = TransportPosition;

    fn add(mut self, ticks: i64) -> TransportPosition {
        self.offset_ticks(ticks);
        self
    }
}

impl std::ops::Sub<i64> for TransportPosition {
    type Output = TransportPosition;

    fn sub(mut self, ticks: i64) -> TransportPosition {
        self.offset_ticks(-ticks);
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn consistent(pos: &TransportPosition) -> bool {
        pos.bar >= 1
            && pos.beat >= 1
            && pos.beat <= pos.beats_per_bar
            && pos.tick < pos.ticks_per_beat
            && (pos.bbt_offset as f64) < pos.frames_per_tick().max(1.0)
    }

    #[test]
    fn default_frames_per_tick() {
        let pos = TransportPosition::default();
        // 48000 * 60 / (120 * 48)
        assert_eq!(pos.frames_per_tick(), 500.0);
    }

    #[test]
    fn increment_walks_ticks_beats_bars() {
        let mut pos = TransportPosition::default();
        for _ in 0..pos.ticks_per_bar() {
            pos.increment();
            assert!(consistent(&pos));
        }
        assert_eq!((pos.bar, pos.beat, pos.tick), (2, 1, 0));
        assert_eq!(pos.bar_start_tick, 192);
        assert_eq!(pos.frame, 192 * 500);
    }

    #[test]
    fn add_then_sub_restores_position() {
        let mut pos = TransportPosition::default();
        pos.beats_per_minute = 127.3; // fractional frames per tick
        let before = pos;
        pos += 1000;
        pos -= 1000;
        assert_eq!(pos.frame, before.frame);
        assert_eq!((pos.bar, pos.beat, pos.tick), (before.bar, before.beat, before.tick));
    }

    #[test]
    fn tick_walk_tracks_exact_position() {
        let mut pos = TransportPosition::default();
        pos.frame_rate = 44_100; // fpt = 459.375
        let fpt = pos.frames_per_tick();
        for _ in 0..10_000 {
            pos.increment();
        }
        let exact = fpt * 10_000.0;
        assert!((pos.frame as f64 - exact).abs() < 1.0);
    }

    #[test]
    fn ceil_tick_is_idempotent() {
        let mut pos = TransportPosition::default();
        pos.frame = 1234;
        pos.tick = 2;
        pos.bbt_offset = 234;
        pos.ceil(Granularity::Tick);
        assert_eq!((pos.tick, pos.bbt_offset), (3, 0));
        assert_eq!(pos.frame, 1500);
        let once = pos;
        pos.ceil(Granularity::Tick);
        assert_eq!(pos, once);
    }

    #[test]
    fn ceil_beat_and_bar() {
        let mut pos = TransportPosition::default();
        pos.frame = 700;
        pos.beat = 1;
        pos.tick = 1;
        pos.bbt_offset = 200;
        pos.ceil(Granularity::Beat);
        assert_eq!((pos.beat, pos.tick, pos.bbt_offset), (2, 0, 0));
        assert_eq!(pos.frame, 48 * 500);

        let mut pos = TransportPosition::default();
        pos.frame = 48 * 500;
        pos.beat = 2;
        pos.ceil(Granularity::Bar);
        assert_eq!((pos.bar, pos.beat, pos.tick), (2, 1, 0));
        assert_eq!(pos.frame, 192 * 500);
        assert_eq!(pos.bar_start_tick, 192);
        let once = pos;
        pos.ceil(Granularity::Bar);
        assert_eq!(pos, once);
    }

    #[test]
    fn floor_drops_back_to_boundaries() {
        let mut pos = TransportPosition::default();
        pos.frame = 192 * 500 + 2 * 48 * 500 + 3 * 500 + 250;
        pos.bar = 2;
        pos.beat = 3;
        pos.tick = 3;
        pos.bbt_offset = 250;
        pos.bar_start_tick = 192;

        let mut tick_floor = pos;
        tick_floor.floor(Granularity::Tick);
        assert_eq!(tick_floor.bbt_offset, 0);
        assert_eq!(tick_floor.frame, pos.frame as u64 - 250);

        let mut beat_floor = pos;
        beat_floor.floor(Granularity::Beat);
        assert_eq!((beat_floor.beat, beat_floor.tick), (3, 0));
        assert_eq!(beat_floor.frame, (192 + 2 * 48) as u64 * 500);

        let mut bar_floor = pos;
        bar_floor.floor(Granularity::Bar);
        assert_eq!((bar_floor.bar, bar_floor.beat, bar_floor.tick), (2, 1, 0));
        assert_eq!(bar_floor.frame, 192 * 500);
    }

    #[test]
    fn round_picks_nearest_tick() {
        let mut low = TransportPosition::default();
        low.frame = 100;
        low.bbt_offset = 100;
        low.round(Granularity::Tick);
        assert_eq!((low.tick, low.frame), (0, 0));

        let mut high = TransportPosition::default();
        high.frame = 400;
        high.bbt_offset = 400;
        high.round(Granularity::Tick);
        assert_eq!((high.tick, high.frame), (1, 500));
    }

    #[test]
    fn decrement_saturates_at_origin() {
        let mut pos = TransportPosition::default();
        pos.decrement();
        assert_eq!((pos.bar, pos.beat, pos.tick, pos.frame), (1, 1, 0, 0));
        pos.increment();
        pos.decrement();
        assert_eq!((pos.bar, pos.beat, pos.tick, pos.frame), (1, 1, 0, 0));
    }
}
