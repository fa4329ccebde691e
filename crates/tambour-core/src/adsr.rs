//! Attack/Decay/Sustain/Release envelope

use serde::{Deserialize, Serialize};

/// Envelope stage. `Idle` is terminal until the envelope is reset.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum AdsrState {
    #[default]
    Attack,
    Decay,
    Sustain,
    Release,
    Idle,
}

/// Linear ADSR envelope.
///
/// Attack, decay and release lengths are in ticks; the caller decides what
/// a tick is (the sampler steps it once per output frame, scaled by the
/// resampling step). Sustain is a level in `[0, 1]`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Adsr {
    pub attack: f32,
    pub decay: f32,
    pub sustain: f32,
    pub release: f32,

    state: AdsrState,
    ticks: f32,
    value: f32,
    release_value: f32,
}

impl Default for Adsr {
    fn default() -> Self {
        Self::new(0.0, 0.0, 1.0, 1000.0)
    }
}

impl Adsr {
    pub fn new(attack: f32, decay: f32, sustain: f32, release: f32) -> Self {
        Self {
            attack: attack.max(0.0),
            decay: decay.max(0.0),
            sustain: sustain.clamp(0.0, 1.0),
            release: release.max(0.0),
            state: AdsrState::Attack,
            ticks: 0.0,
            value: 0.0,
            release_value: 0.0,
        }
    }

    pub fn state(&self) -> AdsrState {
        self.state
    }

    pub fn is_idle(&self) -> bool {
        self.state == AdsrState::Idle
    }

    /// Rewind to the start of the attack stage.
    pub fn reset(&mut self) {
        self.state = AdsrState::Attack;
        self.ticks = 0.0;
        self.value = 0.0;
        self.release_value = 0.0;
    }

    /// Advance the envelope by `dt` ticks and return the new value.
    ///
    /// Zero-length stages are skipped in the same call, so an envelope with
    /// `attack == 0 && decay == 0` reads the sustain level immediately. The
    /// returned value is never negative.
    pub fn step(&mut self, dt: f32) -> f32 {
        loop {
            match self.state {
                AdsrState::Attack => {
                    if self.ticks < self.attack {
                        self.value = self.ticks / self.attack;
                        self.ticks += dt;
                        break;
                    }
                    self.state = AdsrState::Decay;
                    self.ticks = 0.0;
                    self.value = 1.0;
                }
                AdsrState::Decay => {
                    if self.ticks < self.decay {
                        self.value = 1.0 - (1.0 - self.sustain) * (self.ticks / self.decay);
                        self.ticks += dt;
                        break;
                    }
                    self.state = AdsrState::Sustain;
                    self.value = self.sustain;
                }
                AdsrState::Sustain => {
                    self.value = self.sustain;
                    break;
                }
                AdsrState::Release => {
                    if self.ticks < self.release {
                        self.value = self.release_value * (1.0 - self.ticks / self.release);
                        self.ticks += dt;
                        break;
                    }
                    self.state = AdsrState::Idle;
                    self.value = 0.0;
                }
                AdsrState::Idle => {
                    self.value = 0.0;
                    break;
                }
            }
        }
        self.value = self.value.max(0.0);
        self.value
    }

    /// Enter the release stage.
    ///
    /// Returns 0 when already idle, the current value when already
    /// releasing, and otherwise records the value at the moment of release
    /// and returns it. Safe to call once per frame.
    pub fn release(&mut self) -> f32 {
        match self.state {
            AdsrState::Idle => 0.0,
            AdsrState::Release => self.value,
            _ => {
                self.state = AdsrState::Release;
                self.ticks = 0.0;
                self.release_value = self.value;
                self.value
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn zero_attack_decay_holds_sustain() {
        let mut adsr = Adsr::new(0.0, 0.0, 1.0, 100.0);
        for _ in 0..16 {
            assert_eq!(adsr.step(1.0), 1.0);
        }
        assert_eq!(adsr.state(), AdsrState::Sustain);
    }

    #[test]
    fn attack_ramps_to_one() {
        let mut adsr = Adsr::new(4.0, 0.0, 0.5, 100.0);
        assert_eq!(adsr.step(1.0), 0.0);
        assert_eq!(adsr.step(1.0), 0.25);
        assert_eq!(adsr.step(1.0), 0.5);
        assert_eq!(adsr.step(1.0), 0.75);
        // Attack elapsed; decay is zero so sustain shows through.
        assert_eq!(adsr.step(1.0), 0.5);
    }

    #[test]
    fn release_contract() {
        let mut adsr = Adsr::new(0.0, 0.0, 1.0, 2.0);
        adsr.step(1.0);
        let v = adsr.release();
        assert_eq!(v, 1.0);
        assert_eq!(adsr.state(), AdsrState::Release);
        // Releasing again reports the current value, does not restart.
        assert_eq!(adsr.release(), 1.0);
        adsr.step(1.0);
        adsr.step(1.0);
        adsr.step(1.0);
        assert!(adsr.is_idle());
        assert_eq!(adsr.release(), 0.0);
    }

    #[test]
    fn step_never_negative_and_idle_is_terminal() {
        let mut adsr = Adsr::new(2.0, 2.0, 0.3, 2.0);
        for _ in 0..8 {
            assert!(adsr.step(1.0) >= 0.0);
        }
        adsr.release();
        for _ in 0..8 {
            assert!(adsr.step(1.0) >= 0.0);
        }
        assert!(adsr.is_idle());
        for _ in 0..4 {
            assert_eq!(adsr.step(1.0), 0.0);
            assert!(adsr.is_idle());
        }
    }
}
