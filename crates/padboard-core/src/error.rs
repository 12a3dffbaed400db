//! Error types for Padboard.

use thiserror::Error;

/// Result type alias using Padboard's Error type.
pub type Result<T> = std::result::Result<T, Error>;

/// Main error type for Padboard.
#[derive(Error, Debug)]
pub enum Error {
    // Audio errors
    #[error("Audio decode error: {0}")]
    Decode(String),

    #[error("Unsupported audio format: {0}")]
    UnsupportedFormat(String),

    #[error("Audio output error: {0}")]
    AudioOutput(String),

    #[error("Resample failed: {0}")]
    Resample(String),

    // Editing errors
    #[error("Invalid region {start:.3}s..{end:.3}s for a source of {duration:.3}s")]
    InvalidRegion { start: f64, end: f64, duration: f64 },

    #[error("No source loaded")]
    NoSourceLoaded,

    #[error("Clip {0} has no encoded audio")]
    MissingAudio(String),

    // Persistence collaborator errors
    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Store error: {0}")]
    Store(String),

    // IO errors
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    // Serialization errors
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    // Generic errors
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),
}

impl Error {
    /// Returns true if the error came from malformed or unsupported audio bytes.
    pub const fn is_decode_error(&self) -> bool {
        matches!(self, Self::Decode(_) | Self::UnsupportedFormat(_))
    }

    /// Returns true if the error was caused by a caller action rather than
    /// by the audio data or the platform.
    pub const fn is_user_error(&self) -> bool {
        matches!(
            self,
            Self::InvalidRegion { .. }
                | Self::NoSourceLoaded
                | Self::MissingAudio(_)
                | Self::InvalidArgument(_)
        )
    }
}
