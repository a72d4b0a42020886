//! Vox - voice command assistant client
//!
//! Records a short voice command, ships it to an inference backend,
//! surfaces the textual answer in a transcript, and plays the synthesized
//! speech reply.
//!
//! # Architecture
//!
//! ```text
//! mic tap ──► Session orchestrator ──► Microphone capture (cpal)
//!                    │                        │ AudioArtifact
//!                    ├──────────────────────► Backend transport (reqwest)
//!                    │                        │ answer + audio locator
//!                    ├──────────────────────► Reply playback (cpal)
//!                    │
//!                    └──► Transcript (append-only, causal order)
//! ```
//!
//! The orchestrator is the sole owner of session state; capture,
//! transport, and playback expose operations, not mode, and every failure
//! is converted into one transcript entry and a return to idle.

pub mod config;
pub mod error;
pub mod session;
pub mod transcript;
pub mod transport;
pub mod voice;

pub use config::{BackendConfig, CaptureConfig, Config, WireEncoding};
pub use error::{Error, Result};
pub use session::{Session, SessionState};
pub use transcript::{Entry, Sender, Transcript};
pub use transport::{BackendClient, Reply, Transport};
pub use voice::{
    AudioArtifact, CaptureDevice, MicCapture, PlaybackHandle, RecordingHandle, ReplyPlayer,
    SpeakerPlayback,
};
