//! Note values scheduled by the sequencer

use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::instrument::Instrument;

/// Maximum value of one pan half; both halves at maximum is center.
pub const MAX_PAN: f32 = 0.5;

/// Musical key within an octave.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum NoteKey {
    #[default]
    C,
    Cs,
    D,
    Ef,
    E,
    F,
    Fs,
    G,
    Af,
    A,
    Bf,
    B,
}

impl NoteKey {
    /// Semitone offset from C.
    pub fn semitones(self) -> i32 {
        self as i32
    }
}

/// A note to be played: what to trigger and how.
///
/// Notes live in patterns and inside queued events. An event's note keeps a
/// shared reference to its instrument; the instrument stays alive (via its
/// `queued` counter) for as long as any event or voice still points at it.
#[derive(Debug, Clone)]
pub struct Note {
    instrument: Arc<Instrument>,
    velocity: f32,
    pan_l: f32,
    pan_r: f32,
    /// Length in ticks; negative means "play the sample to its end".
    length: i32,
    /// Pitch offset in semitones, fractional.
    pitch: f32,
    key: NoteKey,
    octave: i32,
    lead_lag: f32,
    /// Scheduling offset in frames, applied by the song input.
    humanize_delay: i32,
    /// Set on notes punched in live, so editors can highlight them.
    just_recorded: bool,
}

impl Note {
    pub fn new(instrument: Arc<Instrument>) -> Self {
        Self {
            instrument,
            velocity: 1.0,
            pan_l: MAX_PAN,
            pan_r: MAX_PAN,
            length: -1,
            pitch: 0.0,
            key: NoteKey::C,
            octave: 0,
            lead_lag: 0.0,
            humanize_delay: 0,
            just_recorded: false,
        }
    }

    pub fn instrument(&self) -> &Arc<Instrument> {
        &self.instrument
    }

    pub fn velocity(&self) -> f32 {
        self.velocity
    }

    pub fn set_velocity(&mut self, velocity: f32) {
        self.velocity = velocity.clamp(0.0, 1.0);
    }

    pub fn pan_l(&self) -> f32 {
        self.pan_l
    }

    pub fn pan_r(&self) -> f32 {
        self.pan_r
    }

    pub fn set_pan_l(&mut self, pan: f32) {
        self.pan_l = pan.clamp(0.0, MAX_PAN);
    }

    pub fn set_pan_r(&mut self, pan: f32) {
        self.pan_r = pan.clamp(0.0, MAX_PAN);
    }

    pub fn length(&self) -> i32 {
        self.length
    }

    pub fn set_length(&mut self, length: i32) {
        self.length = length;
    }

    pub fn pitch(&self) -> f32 {
        self.pitch
    }

    pub fn set_pitch(&mut self, pitch: f32) {
        self.pitch = pitch;
    }

    pub fn key(&self) -> NoteKey {
        self.key
    }

    pub fn octave(&self) -> i32 {
        self.octave
    }

    pub fn set_key_octave(&mut self, key: NoteKey, octave: i32) {
        self.key = key;
        self.octave = octave;
    }

    /// Total semitone offset: octave, key and fractional pitch combined.
    pub fn total_pitch(&self) -> f32 {
        (self.octave * 12 + self.key.semitones()) as f32 + self.pitch
    }

    pub fn lead_lag(&self) -> f32 {
        self.lead_lag
    }

    pub fn set_lead_lag(&mut self, lead_lag: f32) {
        self.lead_lag = lead_lag.clamp(-1.0, 1.0);
    }

    pub fn humanize_delay(&self) -> i32 {
        self.humanize_delay
    }

    pub fn set_humanize_delay(&mut self, frames: i32) {
        self.humanize_delay = frames;
    }

    pub fn just_recorded(&self) -> bool {
        self.just_recorded
    }

    pub fn set_just_recorded(&mut self, just_recorded: bool) {
        self.just_recorded = just_recorded;
    }

    // Builder-style conveniences for pattern assembly.

    pub fn with_velocity(mut self, velocity: f32) -> Self {
        self.set_velocity(velocity);
        self
    }

    pub fn with_pan(mut self, pan_l: f32, pan_r: f32) -> Self {
        self.set_pan_l(pan_l);
        self.set_pan_r(pan_r);
        self
    }

    pub fn with_length(mut self, length: i32) -> Self {
        self.length = length;
        self
    }

    pub fn with_pitch(mut self, pitch: f32) -> Self {
        self.pitch = pitch;
        self
    }

    pub fn with_lead_lag(mut self, lead_lag: f32) -> Self {
        self.set_lead_lag(lead_lag);
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adsr::Adsr;

    fn note() -> Note {
        Note::new(Arc::new(Instrument::new(0, "test", Adsr::default())))
    }

    #[test]
    fn velocity_and_pan_clamped() {
        let mut n = note();
        n.set_velocity(1.7);
        assert_eq!(n.velocity(), 1.0);
        n.set_velocity(-0.5);
        assert_eq!(n.velocity(), 0.0);
        n.set_pan_l(0.8);
        assert_eq!(n.pan_l(), MAX_PAN);
    }

    #[test]
    fn total_pitch_combines_key_octave_and_offset() {
        let mut n = note().with_pitch(0.5);
        n.set_key_octave(NoteKey::D, -1);
        assert_eq!(n.total_pitch(), -12.0 + 2.0 + 0.5);
    }
}
