//! Engine configuration

use serde::{Deserialize, Serialize};

use crate::error::{EngineError, Result};

/// Static engine configuration, validated before anything reaches the
/// audio thread. All queue depths are fixed at construction; the realtime
/// path never allocates.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Frame rate used until the audio backend reports its own.
    pub frame_rate: u32,
    /// Capacity of the sequencer event queue.
    pub queue_capacity: usize,
    /// Polyphony cap; the oldest voice is evicted beyond this.
    pub max_notes: usize,
    /// Depth of the UI note-injection queue.
    pub gui_queue_depth: usize,
    /// Depth of the MIDI ingress queue.
    pub midi_queue_depth: usize,
    /// Depth of the control command queue.
    pub command_queue_depth: usize,
    /// Render per-instrument track buffers in addition to the main mix.
    pub track_outputs: bool,
    pub metronome_enabled: bool,
    pub metronome_volume: f32,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            frame_rate: 48_000,
            queue_capacity: 1024,
            max_notes: 256,
            gui_queue_depth: 256,
            midi_queue_depth: 512,
            command_queue_depth: 64,
            track_outputs: false,
            metronome_enabled: false,
            metronome_volume: 0.8,
        }
    }
}

impl EngineConfig {
    pub fn validate(&self) -> Result<()> {
        if self.frame_rate == 0 {
            return Err(EngineError::InvalidConfig("frame_rate must be nonzero".into()));
        }
        if self.queue_capacity == 0 {
            return Err(EngineError::InvalidConfig("queue_capacity must be nonzero".into()));
        }
        if self.max_notes == 0 {
            return Err(EngineError::InvalidConfig("max_notes must be nonzero".into()));
        }
        if !(0.0..=1.0).contains(&self.metronome_volume) {
            return Err(EngineError::InvalidConfig(format!(
                "metronome_volume {} outside [0, 1]",
                self.metronome_volume
            )));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_is_valid() {
        assert!(EngineConfig::default().validate().is_ok());
    }

    #[test]
    fn zero_capacity_rejected() {
        let config = EngineConfig { queue_capacity: 0, ..Default::default() };
        assert!(config.validate().is_err());
    }
}
