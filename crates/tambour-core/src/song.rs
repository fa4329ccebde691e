//! The song model queried by the sequencer

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU8, AtomicU64, Ordering};

use crate::instrument::{AtomicF32, InstrumentList};
use crate::pattern::{DEFAULT_PATTERN_TICKS, Pattern};

/// Where the sequencer takes its patterns from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SongMode {
    /// Follow the song's per-bar pattern groups.
    #[default]
    Song,
    /// Loop the single pattern selected by the user.
    Pattern,
}

/// A song: instruments, patterns, and the per-bar pattern arrangement.
///
/// Shared as `Arc<Song>` between the control plane and the audio thread.
/// Structure (patterns, groups, instruments) is fixed once shared; the
/// live-tweakable scalars (tempo, humanize, swing, mode, loop) sit in
/// atomic cells.
#[derive(Debug)]
pub struct Song {
    name: String,
    /// Ticks per beat.
    resolution: u32,
    bpm_bits: AtomicU64,
    mode: AtomicU8,
    loop_enabled: AtomicBool,

    humanize_time: AtomicF32,
    humanize_velocity: AtomicF32,
    swing_factor: AtomicF32,

    patterns: Vec<Arc<Pattern>>,
    /// One entry per bar; each entry lists indices into `patterns` that
    /// play together in that bar.
    pattern_groups: Vec<Vec<usize>>,
    /// Per-bar tempo points, sorted by bar; each takes effect at its bar
    /// and holds until the next.
    tempo_markers: Vec<(u32, f64)>,
    instruments: InstrumentList,
}

impl Song {
    pub fn new(name: impl Into<String>, bpm: f64, resolution: u32) -> Self {
        Self {
            name: name.into(),
            resolution: resolution.max(1),
            bpm_bits: AtomicU64::new(bpm.to_bits()),
            mode: AtomicU8::new(0),
            loop_enabled: AtomicBool::new(false),
            humanize_time: AtomicF32::new(0.0),
            humanize_velocity: AtomicF32::new(0.0),
            swing_factor: AtomicF32::new(0.0),
            patterns: Vec::new(),
            pattern_groups: Vec::new(),
            tempo_markers: Vec::new(),
            instruments: InstrumentList::new(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn resolution(&self) -> u32 {
        self.resolution
    }

    pub fn bpm(&self) -> f64 {
        f64::from_bits(self.bpm_bits.load(Ordering::Relaxed))
    }

    pub fn set_bpm(&self, bpm: f64) {
        self.bpm_bits.store(bpm.to_bits(), Ordering::Relaxed);
    }

    pub fn mode(&self) -> SongMode {
        if self.mode.load(Ordering::Relaxed) == 0 {
            SongMode::Song
        } else {
            SongMode::Pattern
        }
    }

    pub fn set_mode(&self, mode: SongMode) {
        let raw = match mode {
            SongMode::Song => 0,
            SongMode::Pattern => 1,
        };
        self.mode.store(raw, Ordering::Relaxed);
    }

    pub fn is_loop_enabled(&self) -> bool {
        self.loop_enabled.load(Ordering::Relaxed)
    }

    pub fn set_loop_enabled(&self, enabled: bool) {
        self.loop_enabled.store(enabled, Ordering::Relaxed);
    }

    /// Timing humanization amount in `[0, 1]`.
    pub fn humanize_time(&self) -> f32 {
        self.humanize_time.load()
    }

    pub fn set_humanize_time(&self, value: f32) {
        self.humanize_time.store(value.clamp(0.0, 1.0));
    }

    /// Velocity humanization amount in `[0, 1]`.
    pub fn humanize_velocity(&self) -> f32 {
        self.humanize_velocity.load()
    }

    pub fn set_humanize_velocity(&self, value: f32) {
        self.humanize_velocity.store(value.clamp(0.0, 1.0));
    }

    /// Swing amount in `[0, 1]`.
    pub fn swing_factor(&self) -> f32 {
        self.swing_factor.load()
    }

    pub fn set_swing_factor(&self, value: f32) {
        self.swing_factor.store(value.clamp(0.0, 1.0));
    }

    // ------------------------------------------------------------------
    // Assembly (before the song is shared)
    // ------------------------------------------------------------------

    pub fn add_pattern(&mut self, pattern: Pattern) -> usize {
        self.patterns.push(Arc::new(pattern));
        self.patterns.len() - 1
    }

    /// Append one bar playing the given pattern indices together.
    pub fn add_bar(&mut self, pattern_indices: Vec<usize>) {
        self.pattern_groups.push(pattern_indices);
    }

    /// Pin the tempo from the given 1-based bar onward. A marker on the
    /// same bar is replaced.
    pub fn add_tempo_marker(&mut self, bar: u32, bpm: f64) {
        match self.tempo_markers.binary_search_by_key(&bar, |(b, _)| *b) {
            Ok(i) => self.tempo_markers[i].1 = bpm,
            Err(i) => self.tempo_markers.insert(i, (bar, bpm)),
        }
    }

    pub fn tempo_markers(&self) -> &[(u32, f64)] {
        &self.tempo_markers
    }

    /// Tempo in effect in the given 1-based bar: the latest marker at or
    /// before it, else the song tempo.
    pub fn bpm_for_bar(&self, bar: u32) -> f64 {
        self.tempo_markers
            .iter()
            .rev()
            .find(|(b, _)| *b <= bar)
            .map_or_else(|| self.bpm(), |(_, bpm)| *bpm)
    }

    pub fn instruments(&self) -> &InstrumentList {
        &self.instruments
    }

    pub fn instruments_mut(&mut self) -> &mut InstrumentList {
        &mut self.instruments
    }

    pub fn pattern(&self, index: usize) -> Option<&Arc<Pattern>> {
        self.patterns.get(index)
    }

    pub fn pattern_count(&self) -> usize {
        self.patterns.len()
    }

    // ------------------------------------------------------------------
    // The song-model contract
    // ------------------------------------------------------------------

    /// Number of bars in the arrangement.
    pub fn bar_count(&self) -> u32 {
        self.pattern_groups.len() as u32
    }

    /// Ticks in the given 1-based bar. Bars without a pattern (or past the
    /// end) report the default 4/4 length.
    pub fn ticks_in_bar(&self, bar: u32) -> u32 {
        self.pattern_group_index_for_bar(bar)
            .and_then(|group| self.pattern_groups[group].first())
            .and_then(|&idx| self.patterns.get(idx))
            .map_or(DEFAULT_PATTERN_TICKS, |p| p.length())
    }

    /// Ticks elapsed before the given 1-based bar starts.
    pub fn bar_start_tick(&self, bar: u32) -> u64 {
        (1..bar).map(|b| self.ticks_in_bar(b) as u64).sum()
    }

    /// Total ticks in the whole arrangement.
    pub fn tick_count(&self) -> u64 {
        self.bar_start_tick(self.bar_count() + 1)
    }

    /// Pattern-group index for a 1-based bar. Wraps when looping; `None`
    /// past the end of a non-looping song or when there are no bars.
    pub fn pattern_group_index_for_bar(&self, bar: u32) -> Option<usize> {
        let bars = self.pattern_groups.len();
        if bars == 0 || bar == 0 {
            return None;
        }
        let index = (bar - 1) as usize;
        if index < bars {
            Some(index)
        } else if self.is_loop_enabled() {
            Some(index % bars)
        } else {
            None
        }
    }

    /// The patterns playing in the given 1-based bar.
    pub fn patterns_in_bar(&self, bar: u32) -> impl Iterator<Item = &Arc<Pattern>> {
        self.pattern_group_index_for_bar(bar)
            .into_iter()
            .flat_map(|group| self.pattern_groups[group].iter())
            .filter_map(|&idx| self.patterns.get(idx))
    }

    /// 1-based bar containing the given absolute tick, with extrapolation
    /// past the end of the arrangement.
    pub fn bar_for_tick(&self, abs_tick: u64) -> u32 {
        let mut bar = 1;
        let mut start = 0u64;
        loop {
            let len = self.ticks_in_bar(bar) as u64;
            if abs_tick < start + len {
                return bar;
            }
            start += len;
            bar += 1;
            // Fixed-length extrapolation past the arrangement keeps this
            // finite even for absurd tick values.
            if bar > self.bar_count() && !self.is_loop_enabled() {
                let remaining = abs_tick - start;
                return bar + (remaining / DEFAULT_PATTERN_TICKS as u64) as u32;
            }
        }
    }
}
