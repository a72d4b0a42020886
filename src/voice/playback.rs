//! Reply playback
//!
//! Fetches the reply audio referenced by a locator, decodes it, and plays
//! it to completion on the default output device. One reply is active at a
//! time; the completion notification is a one-shot fired from the output
//! callback, so it is delivered exactly once per play call.

use std::io::Cursor;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use cpal::SampleRate;
use tokio::sync::oneshot;
use url::Url;
use uuid::Uuid;

use super::PlaybackHandle;
use crate::{Error, Result};

/// Lifecycle of a single loaded reply
///
/// `?Send` because implementations hold a cpal output stream across the
/// play await; the session loop runs on the main thread.
#[async_trait(?Send)]
pub trait ReplyPlayer {
    /// Fetch and decode the audio payload at `locator`
    ///
    /// # Errors
    ///
    /// `Fetch` if the payload cannot be retrieved, `Decode` if it cannot
    /// be decoded, `AlreadyPlaying` if a handle is still active.
    async fn load(&mut self, locator: &Url) -> Result<PlaybackHandle>;

    /// Play the loaded buffer, returning when playback finishes
    ///
    /// # Errors
    ///
    /// Returns error if the output device refuses the stream.
    async fn play_to_completion(&mut self, handle: &PlaybackHandle) -> Result<()>;

    /// Release the decoded buffer
    async fn unload(&mut self, handle: PlaybackHandle);
}

/// A decoded reply waiting to be (or being) played
struct LoadedReply {
    id: Uuid,
    samples: Vec<f32>,
    sample_rate: u32,
}

/// Plays replies on the default output device
pub struct SpeakerPlayback {
    client: reqwest::Client,
    active: Option<LoadedReply>,
}

impl SpeakerPlayback {
    /// Create a playback component
    #[must_use]
    pub fn new() -> Self {
        Self {
            client: reqwest::Client::new(),
            active: None,
        }
    }

    /// Decode and stage raw audio bytes without a network fetch
    ///
    /// Used by the speaker test command; same single-handle rule as
    /// [`ReplyPlayer::load`].
    ///
    /// # Errors
    ///
    /// `Decode` if the bytes are neither MP3 nor WAV, `AlreadyPlaying` if
    /// a handle is still active.
    pub fn load_bytes(&mut self, bytes: &[u8]) -> Result<PlaybackHandle> {
        if self.active.is_some() {
            return Err(Error::AlreadyPlaying);
        }

        let (samples, sample_rate) = decode_audio(bytes)?;
        let handle = PlaybackHandle::new();
        self.active = Some(LoadedReply {
            id: handle.id(),
            samples,
            sample_rate,
        });

        tracing::debug!(reply = %handle.id(), sample_rate, "reply loaded");
        Ok(handle)
    }
}

impl Default for SpeakerPlayback {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait(?Send)]
impl ReplyPlayer for SpeakerPlayback {
    async fn load(&mut self, locator: &Url) -> Result<PlaybackHandle> {
        if self.active.is_some() {
            return Err(Error::AlreadyPlaying);
        }

        tracing::debug!(url = %locator, "fetching reply audio");

        let response = self
            .client
            .get(locator.clone())
            .send()
            .await
            .map_err(|e| Error::Fetch(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            return Err(Error::Fetch(format!("status {status}")));
        }

        let bytes = response
            .bytes()
            .await
            .map_err(|e| Error::Fetch(e.to_string()))?;

        self.load_bytes(&bytes)
    }

    async fn play_to_completion(&mut self, handle: &PlaybackHandle) -> Result<()> {
        let reply = self
            .active
            .as_ref()
            .filter(|r| r.id == handle.id())
            .ok_or_else(|| Error::Audio("unknown playback handle".to_string()))?;

        if reply.samples.is_empty() {
            return Ok(());
        }

        let host = cpal::default_host();
        let device = host
            .default_output_device()
            .ok_or_else(|| Error::Audio("no output device".to_string()))?;

        let rate = reply.sample_rate;
        let supported = device
            .supported_output_configs()
            .map_err(|e| Error::Audio(e.to_string()))?
            .find(|c| {
                c.channels() <= 2
                    && c.min_sample_rate() <= SampleRate(rate)
                    && c.max_sample_rate() >= SampleRate(rate)
            })
            .ok_or_else(|| Error::Audio("no suitable output config".to_string()))?;

        let config = supported.with_sample_rate(SampleRate(rate)).config();
        let channels = config.channels as usize;

        let samples = Arc::new(reply.samples.clone());
        let position = Arc::new(Mutex::new(0usize));
        let (done_tx, done_rx) = oneshot::channel::<()>();
        let done_tx = Arc::new(Mutex::new(Some(done_tx)));

        let cb_samples = Arc::clone(&samples);
        let cb_position = Arc::clone(&position);
        let cb_done = Arc::clone(&done_tx);

        let stream = device
            .build_output_stream(
                &config,
                move |data: &mut [f32], _: &cpal::OutputCallbackInfo| {
                    let Ok(mut pos) = cb_position.lock() else {
                        return;
                    };
                    for frame in data.chunks_mut(channels) {
                        let sample = if *pos < cb_samples.len() {
                            let s = cb_samples[*pos];
                            *pos += 1;
                            s
                        } else {
                            // Buffer exhausted: fire the completion signal
                            // once, then pad with silence.
                            if let Ok(mut tx) = cb_done.lock() {
                                if let Some(tx) = tx.take() {
                                    let _ = tx.send(());
                                }
                            }
                            0.0
                        };
                        for out in frame.iter_mut() {
                            *out = sample;
                        }
                    }
                },
                |err| {
                    tracing::error!(error = %err, "playback stream error");
                },
                None,
            )
            .map_err(|e| Error::Audio(e.to_string()))?;

        stream.play().map_err(|e| Error::Audio(e.to_string()))?;

        // Bound the wait by the buffer duration plus a margin, in case the
        // device stalls and the callback never drains the buffer.
        let duration_ms = (samples.len() as u64 * 1000) / u64::from(rate);
        let timeout = Duration::from_millis(duration_ms + 500);

        match tokio::time::timeout(timeout, done_rx).await {
            Ok(_) => {
                // Let the tail of the buffer leave the device.
                tokio::time::sleep(Duration::from_millis(100)).await;
            }
            Err(_) => {
                tracing::warn!(reply = %handle.id(), "playback timed out");
            }
        }

        drop(stream);
        tracing::debug!(reply = %handle.id(), samples = samples.len(), "playback complete");
        Ok(())
    }

    async fn unload(&mut self, handle: PlaybackHandle) {
        match self.active.take() {
            Some(reply) if reply.id == handle.id() => {
                tracing::debug!(reply = %handle.id(), "reply unloaded");
            }
            other => {
                self.active = other;
            }
        }
    }
}

/// Decode reply bytes into mono f32 samples
///
/// Tries MP3 first (the backend synthesizes MP3), then WAV.
fn decode_audio(bytes: &[u8]) -> Result<(Vec<f32>, u32)> {
    match decode_mp3(bytes) {
        Ok(decoded) => Ok(decoded),
        Err(mp3_err) => decode_wav(bytes).map_err(|wav_err| {
            Error::Decode(format!("not mp3 ({mp3_err}) nor wav ({wav_err})"))
        }),
    }
}

/// Decode MP3 bytes to mono f32 samples
fn decode_mp3(bytes: &[u8]) -> Result<(Vec<f32>, u32)> {
    let mut decoder = minimp3::Decoder::new(Cursor::new(bytes));
    let mut samples = Vec::new();
    let mut sample_rate = 0u32;

    loop {
        match decoder.next_frame() {
            Ok(frame) => {
                if sample_rate == 0 {
                    #[allow(clippy::cast_sign_loss)]
                    {
                        sample_rate = frame.sample_rate as u32;
                    }
                }

                if frame.channels == 2 {
                    // Stereo: average channels down to mono.
                    samples.extend(frame.data.chunks(2).map(|chunk| {
                        let left = f32::from(chunk[0]) / 32768.0;
                        let right = f32::from(chunk.get(1).copied().unwrap_or(chunk[0])) / 32768.0;
                        (left + right) / 2.0
                    }));
                } else {
                    samples.extend(frame.data.iter().map(|&s| f32::from(s) / 32768.0));
                }
            }
            Err(minimp3::Error::Eof) => break,
            Err(e) => return Err(Error::Decode(format!("mp3: {e}"))),
        }
    }

    if samples.is_empty() || sample_rate == 0 {
        return Err(Error::Decode("mp3: no frames".to_string()));
    }

    Ok((samples, sample_rate))
}

/// Decode WAV bytes to mono f32 samples
fn decode_wav(bytes: &[u8]) -> Result<(Vec<f32>, u32)> {
    let mut reader =
        hound::WavReader::new(Cursor::new(bytes)).map_err(|e| Error::Decode(format!("wav: {e}")))?;
    let spec = reader.spec();

    let interleaved: Vec<f32> = match spec.sample_format {
        hound::SampleFormat::Float => reader
            .samples::<f32>()
            .collect::<std::result::Result<_, _>>()
            .map_err(|e| Error::Decode(format!("wav: {e}")))?,
        hound::SampleFormat::Int => reader
            .samples::<i16>()
            .map(|s| s.map(|v| f32::from(v) / 32768.0))
            .collect::<std::result::Result<_, _>>()
            .map_err(|e| Error::Decode(format!("wav: {e}")))?,
    };

    let samples = if spec.channels == 2 {
        interleaved
            .chunks(2)
            .map(|chunk| (chunk[0] + chunk.get(1).copied().unwrap_or(chunk[0])) / 2.0)
            .collect()
    } else {
        interleaved
    };

    if samples.is_empty() {
        return Err(Error::Decode("wav: no frames".to_string()));
    }

    Ok((samples, spec.sample_rate))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::voice::samples_to_wav;

    #[test]
    fn wav_bytes_decode_to_mono_samples() {
        let original = vec![0.0_f32, 0.25, -0.25, 0.5];
        let bytes = samples_to_wav(&original, 16000).unwrap();

        let (samples, rate) = decode_audio(&bytes).unwrap();
        assert_eq!(rate, 16000);
        assert_eq!(samples.len(), 4);
        assert!((samples[1] - 0.25).abs() < 0.001);
    }

    #[test]
    fn garbage_bytes_are_a_decode_error() {
        let result = decode_audio(b"definitely not audio");
        assert!(matches!(result, Err(Error::Decode(_))));
    }

    #[test]
    fn load_bytes_enforces_a_single_active_handle() {
        let mut playback = SpeakerPlayback::new();
        let bytes = samples_to_wav(&[0.1_f32; 64], 16000).unwrap();

        let first = playback.load_bytes(&bytes).unwrap();
        assert!(matches!(
            playback.load_bytes(&bytes),
            Err(Error::AlreadyPlaying)
        ));

        tokio_test::block_on(playback.unload(first));
        assert!(playback.load_bytes(&bytes).is_ok());
    }
}
