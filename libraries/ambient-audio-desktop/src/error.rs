/// Desktop audio errors
use ambient_mixer::MixerError;
use thiserror::Error;

/// Result type for desktop audio operations
pub type Result<T> = std::result::Result<T, AudioError>;

/// Desktop audio errors
#[derive(Debug, Error)]
pub enum AudioError {
    /// No default output device
    #[error("Audio device not found")]
    DeviceNotFound,

    /// Failed to build output stream
    #[error("Failed to build output stream: {0}")]
    StreamBuildError(String),

    /// Failed to start stream
    #[error("Failed to play stream: {0}")]
    PlayError(String),

    /// Failed to pause stream
    #[error("Failed to pause stream: {0}")]
    PauseError(String),

    /// Unsupported sample format or container
    #[error("Unsupported audio format: {0}")]
    UnsupportedFormat(String),

    /// Audio data could not be decoded
    #[error("Decode error: {0}")]
    Decode(String),

    /// Sample rate conversion error
    #[error("Sample rate conversion error: {0}")]
    ResampleError(String),

    /// CPAL error
    #[error("CPAL error: {0}")]
    CpalError(String),

    /// The output thread is gone
    #[error("Audio thread stopped")]
    ThreadStopped,

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Mixing engine error
    #[error(transparent)]
    Mixer(#[from] MixerError),
}

impl From<cpal::BuildStreamError> for AudioError {
    fn from(err: cpal::BuildStreamError) -> Self {
        AudioError::StreamBuildError(err.to_string())
    }
}

impl From<cpal::PlayStreamError> for AudioError {
    fn from(err: cpal::PlayStreamError) -> Self {
        AudioError::PlayError(err.to_string())
    }
}

impl From<cpal::PauseStreamError> for AudioError {
    fn from(err: cpal::PauseStreamError) -> Self {
        AudioError::PauseError(err.to_string())
    }
}

impl From<cpal::DefaultStreamConfigError> for AudioError {
    fn from(err: cpal::DefaultStreamConfigError) -> Self {
        AudioError::CpalError(err.to_string())
    }
}

impl From<symphonia::core::errors::Error> for AudioError {
    fn from(err: symphonia::core::errors::Error) -> Self {
        match err {
            symphonia::core::errors::Error::Unsupported(what) => {
                AudioError::UnsupportedFormat(what.to_string())
            }
            other => AudioError::Decode(other.to_string()),
        }
    }
}

/// Folds desktop errors into the engine's error type
///
/// Device problems become [`MixerError::BackendUnavailable`] so the engine
/// selects the fallback; everything else is a decode problem.
impl From<AudioError> for MixerError {
    fn from(err: AudioError) -> Self {
        match err {
            AudioError::Mixer(inner) => inner,
            AudioError::Io(io) => MixerError::Io(io),
            AudioError::DeviceNotFound
            | AudioError::StreamBuildError(_)
            | AudioError::PlayError(_)
            | AudioError::PauseError(_)
            | AudioError::CpalError(_)
            | AudioError::ThreadStopped => MixerError::BackendUnavailable(err.to_string()),
            AudioError::UnsupportedFormat(_)
            | AudioError::Decode(_)
            | AudioError::ResampleError(_) => MixerError::Decode(err.to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_device_errors_map_to_backend_unavailable() {
        let mixer: MixerError = AudioError::DeviceNotFound.into();
        assert!(matches!(mixer, MixerError::BackendUnavailable(_)));
    }

    #[test]
    fn test_decode_errors_map_to_decode() {
        let mixer: MixerError = AudioError::UnsupportedFormat("xyz".into()).into();
        match mixer {
            MixerError::Decode(msg) => assert!(msg.contains("xyz")),
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn test_mixer_error_round_trips() {
        let mixer: MixerError = AudioError::Mixer(MixerError::Disposed).into();
        assert!(matches!(mixer, MixerError::Disposed));
    }
}
