//! Error types for xrp-player
//!
//! Defines module-specific error types using thiserror for clear error propagation.

use thiserror::Error;

/// Main error type for xrp-player
#[derive(Error, Debug)]
pub enum Error {
    /// Configuration file loading errors
    #[error("Configuration error: {0}")]
    Config(String),

    /// Audio decoding errors
    #[error("Audio decode error: {0}")]
    Decode(String),

    /// Audio output device errors
    #[error("Audio output error: {0}")]
    AudioOutput(String),

    /// Network source errors (streaming backend)
    #[error("Network error: {0}")]
    Network(String),

    /// Playback engine errors
    #[error("Playback error: {0}")]
    Playback(String),

    /// No backend can play this format
    #[error("Unsupported format: {0}")]
    UnsupportedFormat(String),

    /// File I/O errors
    #[error("File I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<xrp_common::Error> for Error {
    fn from(err: xrp_common::Error) -> Self {
        match err {
            xrp_common::Error::Io(e) => Error::Io(e),
            other => Error::Config(other.to_string()),
        }
    }
}

/// Convenience Result type using xrp-player Error
pub type Result<T> = std::result::Result<T, Error>;

/// Reason a backend could not create playback for a track
///
/// Carried by a failed `PlaybackReady`. The engine treats every variant the
/// same way (flag the track, ask the playlist for the next item); the variant
/// only matters for logs and the `PlaybackError` event.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum BackendError {
    /// The source could not be opened or read
    #[error("cannot open source: {0}")]
    Open(String),

    /// No decoder for the stream, or the stream is corrupt
    #[error("cannot decode: {0}")]
    Decode(String),

    /// The output device could not be opened
    #[error("output device unavailable: {0}")]
    Output(String),

    /// The backend went away without reporting a result
    #[error("backend terminated before reporting a result")]
    Abandoned,

    /// The backend was disposed
    #[error("backend disposed")]
    Disposed,
}

impl From<Error> for BackendError {
    fn from(err: Error) -> Self {
        match err {
            Error::Decode(msg) | Error::UnsupportedFormat(msg) => BackendError::Decode(msg),
            Error::AudioOutput(msg) => BackendError::Output(msg),
            Error::Io(e) => BackendError::Open(e.to_string()),
            other => BackendError::Open(other.to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_backend_error_conversion() {
        assert_eq!(
            BackendError::from(Error::Decode("bad frame".into())),
            BackendError::Decode("bad frame".into())
        );
        assert_eq!(
            BackendError::from(Error::AudioOutput("no device".into())),
            BackendError::Output("no device".into())
        );
        let io = std::io::Error::new(std::io::ErrorKind::NotFound, "gone");
        assert!(matches!(BackendError::from(Error::Io(io)), BackendError::Open(_)));
    }

    #[test]
    fn test_common_error_conversion() {
        let err: Error = xrp_common::Error::Config("bad value".into()).into();
        assert!(matches!(err, Error::Config(_)));
    }
}
