//! Error types for tambour-core

use thiserror::Error;

#[derive(Debug, Error)]
pub enum CoreError {
    #[error("Invalid velocity range: {0}..{1}")]
    InvalidVelocityRange(f32, f32),
    #[error("Layer slot {0} out of range")]
    LayerOutOfRange(usize),
}

pub type Result<T> = std::result::Result<T, CoreError>;
