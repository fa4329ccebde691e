//! Sample data shared between voices

use std::sync::Arc;

/// Immutable audio sample data, planar stereo f32.
///
/// Sample data is loaded elsewhere; the core only reads it. A `Sample` is
/// shared via `Arc` and safe to read from any thread.
#[derive(Debug, Clone)]
pub struct Sample {
    data_l: Arc<[f32]>,
    data_r: Arc<[f32]>,
    sample_rate: u32,
}

impl Sample {
    /// Build from separate left/right channels. Panics if the channel
    /// lengths differ; that is a loader bug, not a runtime condition.
    pub fn stereo(data_l: Vec<f32>, data_r: Vec<f32>, sample_rate: u32) -> Self {
        assert_eq!(data_l.len(), data_r.len(), "channel length mismatch");
        Self {
            data_l: data_l.into(),
            data_r: data_r.into(),
            sample_rate,
        }
    }

    /// Build from mono data, duplicated to both channels.
    pub fn mono(data: Vec<f32>, sample_rate: u32) -> Self {
        let shared: Arc<[f32]> = data.into();
        Self {
            data_l: shared.clone(),
            data_r: shared,
            sample_rate,
        }
    }

    /// Number of frames.
    pub fn len(&self) -> usize {
        self.data_l.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data_l.is_empty()
    }

    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    pub fn data_l(&self) -> &[f32] {
        &self.data_l
    }

    pub fn data_r(&self) -> &[f32] {
        &self.data_r
    }
}
