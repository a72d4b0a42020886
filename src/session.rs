//! Session orchestrator
//!
//! The single state machine that sequences capture, transport, and
//! playback per mic tap, enforces mutual exclusion between them, and
//! routes every failure into exactly one transcript entry before
//! returning to `Idle`. All session state lives here; the components are
//! stateless with respect to session progression.

use tokio::sync::{mpsc, watch};

use crate::transcript::{Sender, Transcript};
use crate::transport::{Reply, Transport};
use crate::voice::{CaptureDevice, RecordingHandle, ReplyPlayer};
use crate::Error;

/// What the session is currently doing
///
/// The mic control is actionable only in `Idle` and `Recording`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    /// Nothing in flight; a tap starts a recording
    Idle,
    /// Microphone open; a tap stops the recording and sends it
    Recording,
    /// Waiting on the backend exchange
    Sending,
    /// Reply audio is playing
    PlayingReply,
}

/// Transcript text for the user's side of an exchange
const SENT_NOTICE: &str = "Audio command sent";

/// Generic retry text for failures the user can do nothing about
const RETRY_NOTICE: &str =
    "Sorry, there was an error processing your command. Please try again.";

/// Map a component failure to its user-facing transcript text
fn user_facing_message(error: &Error) -> String {
    match error {
        Error::PermissionDenied => {
            "Microphone access was denied. Please allow it and try again.".to_string()
        }
        Error::DeviceUnavailable(_) | Error::AlreadyRecording => {
            "The microphone is unavailable. Please try again.".to_string()
        }
        Error::EmptyCapture => "I didn't hear anything. Please try again.".to_string(),
        Error::Backend(message) => message.clone(),
        Error::Fetch(_) | Error::Decode(_) | Error::AlreadyPlaying | Error::Audio(_) => {
            "Failed to play the audio response. Please try again.".to_string()
        }
        _ => RETRY_NOTICE.to_string(),
    }
}

/// Orchestrates one voice command session
///
/// Generic over the component contracts so tests can drive the machine
/// without hardware or a network.
pub struct Session<C, T, P>
where
    C: CaptureDevice,
    T: Transport,
    P: ReplyPlayer,
{
    capture: C,
    transport: T,
    playback: P,
    transcript: Transcript,
    state: watch::Sender<SessionState>,
    recording: Option<RecordingHandle>,
}

impl<C, T, P> Session<C, T, P>
where
    C: CaptureDevice,
    T: Transport,
    P: ReplyPlayer,
{
    /// Create a session in `Idle`
    pub fn new(capture: C, transport: T, playback: P) -> Self {
        let (state, _) = watch::channel(SessionState::Idle);
        Self {
            capture,
            transport,
            playback,
            transcript: Transcript::new(),
            state,
            recording: None,
        }
    }

    /// Current state
    #[must_use]
    pub fn state(&self) -> SessionState {
        *self.state.borrow()
    }

    /// Watch state transitions; the presentation layer uses this to
    /// enable/disable the mic control
    #[must_use]
    pub fn watch_state(&self) -> watch::Receiver<SessionState> {
        self.state.subscribe()
    }

    /// Handle to the transcript
    #[must_use]
    pub fn transcript(&self) -> Transcript {
        self.transcript.clone()
    }

    fn set_state(&self, next: SessionState) {
        tracing::debug!(from = ?*self.state.borrow(), to = ?next, "state transition");
        self.state.send_replace(next);
    }

    /// The single external event: the user tapped the mic control
    ///
    /// In `Idle` this starts a recording; in `Recording` it stops the
    /// recording and runs the exchange to completion; in any other state
    /// it is ignored.
    pub async fn mic_tapped(&mut self) {
        match self.state() {
            SessionState::Idle => self.start_recording(),
            SessionState::Recording => self.finish_and_exchange().await,
            SessionState::Sending | SessionState::PlayingReply => {
                tracing::debug!("mic tap ignored while busy");
            }
        }
    }

    fn start_recording(&mut self) {
        match self.capture.begin() {
            Ok(handle) => {
                self.recording = Some(handle);
                self.set_state(SessionState::Recording);
            }
            Err(e) => {
                tracing::warn!(error = %e, "failed to start recording");
                self.transcript.append(Sender::Assistant, user_facing_message(&e));
            }
        }
    }

    /// Stop the recording, send the artifact, and play any voiced reply
    async fn finish_and_exchange(&mut self) {
        let Some(handle) = self.recording.take() else {
            // State said Recording but no handle is open; recover.
            tracing::error!("no open recording handle in Recording state");
            self.set_state(SessionState::Idle);
            return;
        };

        self.set_state(SessionState::Sending);

        let artifact = match self.capture.end(handle) {
            Ok(artifact) => artifact,
            Err(e) => {
                tracing::warn!(error = %e, "failed to end recording");
                self.transcript.append(Sender::Assistant, user_facing_message(&e));
                self.set_state(SessionState::Idle);
                return;
            }
        };

        self.transcript.append(Sender::User, SENT_NOTICE);

        match self.transport.send(artifact).await {
            Ok(Reply::Voiced { answer, audio_url }) => {
                self.transcript.append(Sender::Assistant, answer);
                self.play_reply(&audio_url).await;
            }
            Ok(Reply::TextOnly { answer }) => {
                self.transcript.append(Sender::Assistant, answer);
            }
            Err(e) => {
                tracing::warn!(error = %e, "backend exchange failed");
                self.transcript.append(Sender::Assistant, user_facing_message(&e));
            }
        }

        self.set_state(SessionState::Idle);
    }

    /// Load and play a voiced reply; always back in `Idle` afterwards
    ///
    /// The loaded handle is unloaded exactly once on both the completion
    /// and the failure path.
    async fn play_reply(&mut self, audio_url: &url::Url) {
        let handle = match self.playback.load(audio_url).await {
            Ok(handle) => handle,
            Err(e) => {
                tracing::warn!(error = %e, "failed to load reply audio");
                self.transcript.append(Sender::Assistant, user_facing_message(&e));
                return;
            }
        };

        self.set_state(SessionState::PlayingReply);

        let played = self.playback.play_to_completion(&handle).await;
        self.playback.unload(handle).await;

        if let Err(e) = played {
            tracing::warn!(error = %e, "reply playback failed");
            self.transcript.append(Sender::Assistant, user_facing_message(&e));
        }
    }

    /// Release any held resource; the process is shutting down
    pub fn shutdown(&mut self) {
        if let Some(handle) = self.recording.take() {
            tracing::debug!("discarding open recording on shutdown");
            self.capture.discard(handle);
        }
        self.set_state(SessionState::Idle);
    }

    /// Drive the session from a stream of tap events
    ///
    /// Taps that arrive while an exchange is in flight are drained and
    /// dropped afterwards: the mic control is disabled outside `Idle` and
    /// `Recording`, so a queued tap is stale by the time the machine is
    /// back in `Idle`.
    pub async fn run(
        mut self,
        mut taps: mpsc::Receiver<()>,
        mut shutdown: mpsc::Receiver<()>,
    ) {
        loop {
            tokio::select! {
                _ = shutdown.recv() => break,
                tap = taps.recv() => {
                    let Some(()) = tap else { break };
                    let was_recording = self.state() == SessionState::Recording;
                    self.mic_tapped().await;
                    if was_recording {
                        while taps.try_recv().is_ok() {}
                    }
                }
            }
        }
        self.shutdown();
    }
}
