//! Error types for the vox assistant

use thiserror::Error;

/// Result type alias for vox operations
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur in the vox assistant
#[derive(Debug, Error)]
pub enum Error {
    /// Microphone permission was denied by the platform
    #[error("microphone permission denied")]
    PermissionDenied,

    /// No usable audio device
    #[error("audio device unavailable: {0}")]
    DeviceUnavailable(String),

    /// A second capture was requested while one is open
    #[error("a recording is already in progress")]
    AlreadyRecording,

    /// The capture produced zero audio frames
    #[error("recording captured no audio")]
    EmptyCapture,

    /// Transport-level failure talking to the backend
    #[error("network error: {0}")]
    Network(String),

    /// Backend answered with a non-success HTTP status
    #[error("backend returned status {0}")]
    BadStatus(u16),

    /// Backend response body could not be interpreted
    #[error("malformed backend response: {0}")]
    MalformedResponse(String),

    /// Backend reported an application-level error
    #[error("backend error: {0}")]
    Backend(String),

    /// Reply audio could not be fetched
    #[error("failed to fetch reply audio: {0}")]
    Fetch(String),

    /// Reply audio could not be decoded
    #[error("failed to decode reply audio: {0}")]
    Decode(String),

    /// A second reply was loaded while one is still active
    #[error("a reply is already playing")]
    AlreadyPlaying,

    /// Playback error from the output device
    #[error("audio error: {0}")]
    Audio(String),

    /// Configuration error
    #[error("configuration error: {0}")]
    Config(String),

    /// IO error
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// TOML parsing error
    #[error("toml error: {0}")]
    Toml(#[from] toml::de::Error),
}
