//! Tap tempo for the control plane

use std::time::{Duration, Instant};

/// How many intervals the running average covers.
const DEFAULT_WINDOW: usize = 4;
/// Taps further apart than this restart the measurement.
const TAP_TIMEOUT: Duration = Duration::from_secs(3);

const MIN_BPM: f64 = 30.0;
const MAX_BPM: f64 = 500.0;

/// Turns a row of taps into a tempo suggestion.
///
/// Strictly a control-plane helper: the UI calls [`tap`](Self::tap) on each
/// hit and feeds the returned BPM into the engine's `set_bpm`.
pub struct BeatCounter {
    window: usize,
    intervals: Vec<Duration>,
    last_tap: Option<Instant>,
}

impl Default for BeatCounter {
    fn default() -> Self {
        Self::with_window(DEFAULT_WINDOW)
    }
}

impl BeatCounter {
    pub fn with_window(window: usize) -> Self {
        Self {
            window: window.max(1),
            intervals: Vec::with_capacity(window.max(1)),
            last_tap: None,
        }
    }

    /// Register a tap at `now`. Returns the averaged BPM once at least two
    /// taps landed inside the timeout.
    pub fn tap_at(&mut self, now: Instant) -> Option<f64> {
        if let Some(last) = self.last_tap {
            let interval = now.duration_since(last);
            if interval > TAP_TIMEOUT {
                self.intervals.clear();
            } else {
                if self.intervals.len() == self.window {
                    self.intervals.remove(0);
                }
                self.intervals.push(interval);
            }
        }
        self.last_tap = Some(now);

        if self.intervals.is_empty() {
            return None;
        }
        let total: Duration = self.intervals.iter().sum();
        let avg = total.as_secs_f64() / self.intervals.len() as f64;
        Some((60.0 / avg).clamp(MIN_BPM, MAX_BPM))
    }

    pub fn tap(&mut self) -> Option<f64> {
        self.tap_at(Instant::now())
    }

    pub fn reset(&mut self) {
        self.intervals.clear();
        self.last_tap = None;
    }
}
