//! Voice processing module
//!
//! Microphone capture and reply playback, plus the artifact and handle
//! types that move between them and the transport layer.

mod capture;
mod playback;

pub use capture::{CaptureDevice, MicCapture, SAMPLE_RATE, samples_to_wav};
pub use playback::{ReplyPlayer, SpeakerPlayback};

use uuid::Uuid;

/// A captured or received audio payload
///
/// Produced by ending a recording, consumed by the transport; ownership
/// transfers on handoff.
#[derive(Debug)]
pub struct AudioArtifact {
    /// Encoded audio bytes
    pub bytes: Vec<u8>,
    /// MIME content type of `bytes`
    pub content_type: &'static str,
}

/// Opaque token for an open microphone capture
///
/// Minted by [`CaptureDevice::begin`] and consumed by exactly one of
/// [`CaptureDevice::end`] or [`CaptureDevice::discard`]. Deliberately not
/// `Clone`: the single owner is the session orchestrator.
#[derive(Debug, PartialEq, Eq)]
pub struct RecordingHandle {
    id: Uuid,
}

impl RecordingHandle {
    /// Mint a fresh handle; called by capture implementations only
    #[must_use]
    pub fn new() -> Self {
        Self { id: Uuid::new_v4() }
    }

    /// Identity of this handle
    #[must_use]
    pub fn id(&self) -> Uuid {
        self.id
    }
}

impl Default for RecordingHandle {
    fn default() -> Self {
        Self::new()
    }
}

/// Opaque token for a loaded, possibly-playing reply buffer
///
/// Minted by [`ReplyPlayer::load`] and consumed by exactly one
/// [`ReplyPlayer::unload`]. Not `Clone` for the same reason as
/// [`RecordingHandle`].
#[derive(Debug, PartialEq, Eq)]
pub struct PlaybackHandle {
    id: Uuid,
}

impl PlaybackHandle {
    /// Mint a fresh handle; called by playback implementations only
    #[must_use]
    pub fn new() -> Self {
        Self { id: Uuid::new_v4() }
    }

    /// Identity of this handle
    #[must_use]
    pub fn id(&self) -> Uuid {
        self.id
    }
}

impl Default for PlaybackHandle {
    fn default() -> Self {
        Self::new()
    }
}
