//! Error types for ostinato-core.

use thiserror::Error;

/// Error type for engine operations.
///
/// Real-time phases never surface these; only engine construction, task
/// submission and configuration paths do.
#[derive(Error, Debug)]
pub enum Error {
    #[error("Invalid config: {0}")]
    InvalidConfig(String),

    #[error("Invalid buffer size: {0}. Must be a power of two between 16 and 8192")]
    InvalidBufferSize(usize),

    #[error("Invalid samplerate: {0}")]
    InvalidSamplerate(u32),

    #[error("Invalid device: {0}")]
    InvalidDevice(String),

    #[error("Port type mismatch on '{port}': expected {expected}")]
    PortTypeMismatch {
        port: String,
        expected: &'static str,
    },

    #[error("Task rejected: {0}")]
    TaskRejected(String),

    #[error("Engine is shut down")]
    ShutDown,

    #[cfg(feature = "cpal")]
    #[error("Audio device not available")]
    DeviceNotAvailable(#[from] cpal::DefaultStreamConfigError),

    #[cfg(feature = "cpal")]
    #[error("Failed to build audio stream")]
    BuildStream(#[from] cpal::BuildStreamError),

    #[cfg(feature = "cpal")]
    #[error("Failed to play audio stream")]
    PlayStream(#[from] cpal::PlayStreamError),

    #[cfg(feature = "cpal")]
    #[error("Failed to enumerate devices")]
    DevicesError(#[from] cpal::DevicesError),

    #[cfg(feature = "cpal")]
    #[error("Failed to get device name")]
    DeviceNameError(#[from] cpal::DeviceNameError),
}

/// Result type alias.
pub type Result<T> = core::result::Result<T, Error>;

/// Transient error reported by a soundcard transfer.
///
/// These are values, not panics: a soundcard thread logs them and keeps
/// ticking. A single bad cycle never stops the engine.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SoundcardError {
    #[error("Device underrun")]
    Underrun,

    #[error("Device overrun")]
    Overrun,

    #[error("Backend error: {0}")]
    Backend(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = Error::InvalidBufferSize(17);
        assert!(err.to_string().contains("17"));

        let err = Error::PortTypeMismatch {
            port: "volume".into(),
            expected: "float",
        };
        assert!(err.to_string().contains("volume"));
        assert!(err.to_string().contains("float"));
    }

    #[test]
    fn test_soundcard_error_display() {
        assert_eq!(SoundcardError::Underrun.to_string(), "Device underrun");
        assert!(SoundcardError::Backend("xrun storm".into())
            .to_string()
            .contains("xrun storm"));
    }
}
