//! Error types for the mixing engine

use thiserror::Error;

/// Mixer errors
///
/// None of these escape the public engine surface for recoverable conditions:
/// decode failures are folded into [`crate::LoadOutcome`], a missing backend
/// selects the fallback, and out-of-range parameters are clamped.
#[derive(Debug, Error)]
pub enum MixerError {
    /// Audio source could not be decoded
    #[error("Failed to decode '{id}': {reason}")]
    DecodeFailure {
        /// Track whose source failed
        id: String,
        /// Decoder message
        reason: String,
    },

    /// Decoder error (no track context)
    #[error("Decode error: {0}")]
    Decode(String),

    /// The real-time graph backend cannot be constructed on this system
    #[error("Audio graph backend unavailable: {0}")]
    BackendUnavailable(String),

    /// Track id not present in the configured catalog
    #[error("Unknown track: {0}")]
    UnknownTrack(String),

    /// Background loader already holds as many requests as it queues
    #[error("Load queue full, dropping request for '{0}'")]
    LoadQueueFull(String),

    /// Engine has been disposed
    #[error("Engine disposed")]
    Disposed,

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type for mixer operations
pub type Result<T> = std::result::Result<T, MixerError>;
