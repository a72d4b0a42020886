//! Microphone capture
//!
//! One recording session at a time. A session is represented by a
//! [`RecordingHandle`] minted by [`CaptureDevice::begin`]; the hardware is
//! released on every path out of [`CaptureDevice::end`] and
//! [`CaptureDevice::discard`].

use std::sync::{Arc, Mutex};

use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use cpal::{SampleRate, Stream};
use uuid::Uuid;

use super::{AudioArtifact, RecordingHandle};
use crate::{Error, Result};

/// Sample rate for audio capture (16kHz for speech)
pub const SAMPLE_RATE: u32 = 16000;

/// Content type of captured artifacts
const CAPTURE_CONTENT_TYPE: &str = "audio/wav";

/// Lifecycle of a single microphone recording
pub trait CaptureDevice {
    /// Open the input stream and start capturing
    ///
    /// # Errors
    ///
    /// `AlreadyRecording` if a handle is open, `PermissionDenied` or
    /// `DeviceUnavailable` if the platform refuses the microphone.
    fn begin(&mut self) -> Result<RecordingHandle>;

    /// Stop capturing and return the captured audio
    ///
    /// Releases the hardware unconditionally, even on failure.
    ///
    /// # Errors
    ///
    /// `EmptyCapture` if zero frames were captured.
    fn end(&mut self, handle: RecordingHandle) -> Result<AudioArtifact>;

    /// Abort the recording without producing an artifact
    fn discard(&mut self, handle: RecordingHandle);
}

/// An open cpal input stream plus its sample sink
struct OpenRecording {
    id: Uuid,
    // Dropping the stream closes the device.
    _stream: Stream,
    buffer: Arc<Mutex<Vec<f32>>>,
}

/// Captures audio from the default input device
pub struct MicCapture {
    sample_rate: u32,
    open: Option<OpenRecording>,
}

impl MicCapture {
    /// Create a capture component at the given sample rate
    #[must_use]
    pub fn new(sample_rate: u32) -> Self {
        Self {
            sample_rate,
            open: None,
        }
    }

    fn open_stream(&self) -> Result<(Stream, Arc<Mutex<Vec<f32>>>)> {
        let host = cpal::default_host();

        let device = host
            .default_input_device()
            .ok_or_else(|| Error::DeviceUnavailable("no input device".to_string()))?;

        let supported = device
            .supported_input_configs()
            .map_err(|e| classify_device_error(&e.to_string()))?
            .find(|c| {
                c.channels() == 1
                    && c.min_sample_rate() <= SampleRate(self.sample_rate)
                    && c.max_sample_rate() >= SampleRate(self.sample_rate)
            })
            .ok_or_else(|| {
                Error::DeviceUnavailable("no mono input config at capture rate".to_string())
            })?;

        let config = supported.with_sample_rate(SampleRate(self.sample_rate)).config();

        tracing::debug!(
            device = device.name().unwrap_or_default(),
            sample_rate = self.sample_rate,
            "opening capture stream"
        );

        let buffer = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&buffer);

        let stream = device
            .build_input_stream(
                &config,
                move |data: &[f32], _: &cpal::InputCallbackInfo| {
                    if let Ok(mut buf) = sink.lock() {
                        buf.extend_from_slice(data);
                    }
                },
                |err| {
                    tracing::error!(error = %err, "capture stream error");
                },
                None,
            )
            .map_err(|e| classify_device_error(&e.to_string()))?;

        stream
            .play()
            .map_err(|e| classify_device_error(&e.to_string()))?;

        Ok((stream, buffer))
    }
}

impl CaptureDevice for MicCapture {
    fn begin(&mut self) -> Result<RecordingHandle> {
        if self.open.is_some() {
            return Err(Error::AlreadyRecording);
        }

        let (stream, buffer) = self.open_stream()?;
        let handle = RecordingHandle::new();
        self.open = Some(OpenRecording {
            id: handle.id(),
            _stream: stream,
            buffer,
        });

        tracing::debug!(recording = %handle.id(), "capture started");
        Ok(handle)
    }

    fn end(&mut self, handle: RecordingHandle) -> Result<AudioArtifact> {
        let Some(open) = self.open.take() else {
            return Err(Error::Audio("no recording in progress".to_string()));
        };
        if open.id != handle.id() {
            self.open = Some(open);
            return Err(Error::Audio("unknown recording handle".to_string()));
        }

        // Drop the stream first: the device is released even if the
        // capture turns out to be empty.
        let buffer = open.buffer;
        drop(open._stream);

        let samples = buffer
            .lock()
            .map(|mut buf| std::mem::take(&mut *buf))
            .unwrap_or_default();

        tracing::debug!(recording = %handle.id(), samples = samples.len(), "capture ended");

        if samples.is_empty() {
            return Err(Error::EmptyCapture);
        }

        let bytes = samples_to_wav(&samples, self.sample_rate)?;
        Ok(AudioArtifact {
            bytes,
            content_type: CAPTURE_CONTENT_TYPE,
        })
    }

    fn discard(&mut self, handle: RecordingHandle) {
        match self.open.take() {
            Some(open) if open.id == handle.id() => {
                tracing::debug!(recording = %handle.id(), "capture discarded");
            }
            other => {
                // Unknown handle: put any legitimate recording back.
                self.open = other;
            }
        }
    }
}

/// Map a cpal error message onto the capture error taxonomy
///
/// cpal surfaces platform permission refusals as backend-specific errors,
/// so the mapping is by message inspection.
fn classify_device_error(message: &str) -> Error {
    let lower = message.to_lowercase();
    if lower.contains("permission") || lower.contains("denied") || lower.contains("not allowed") {
        Error::PermissionDenied
    } else {
        Error::DeviceUnavailable(message.to_string())
    }
}

/// Encode f32 samples as 16-bit PCM WAV
///
/// # Errors
///
/// Returns error if WAV encoding fails
pub fn samples_to_wav(samples: &[f32], sample_rate: u32) -> Result<Vec<u8>> {
    let spec = hound::WavSpec {
        channels: 1,
        sample_rate,
        bits_per_sample: 16,
        sample_format: hound::SampleFormat::Int,
    };

    let mut cursor = std::io::Cursor::new(Vec::new());
    {
        let mut writer =
            hound::WavWriter::new(&mut cursor, spec).map_err(|e| Error::Audio(e.to_string()))?;

        for &sample in samples {
            #[allow(clippy::cast_possible_truncation)]
            let sample_i16 = (sample * 32767.0).clamp(-32768.0, 32767.0) as i16;
            writer
                .write_sample(sample_i16)
                .map_err(|e| Error::Audio(e.to_string()))?;
        }

        writer.finalize().map_err(|e| Error::Audio(e.to_string()))?;
    }

    Ok(cursor.into_inner())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn wav_encoding_produces_mono_pcm16() {
        let samples = vec![0.0_f32, 0.5, -0.5, 1.0, -1.0];
        let bytes = samples_to_wav(&samples, SAMPLE_RATE).unwrap();

        let reader = hound::WavReader::new(std::io::Cursor::new(bytes)).unwrap();
        let spec = reader.spec();
        assert_eq!(spec.channels, 1);
        assert_eq!(spec.sample_rate, SAMPLE_RATE);
        assert_eq!(spec.bits_per_sample, 16);
        assert_eq!(reader.len(), 5);
    }

    #[test]
    fn permission_errors_are_classified() {
        assert!(matches!(
            classify_device_error("Operation not permitted: permission denied by user"),
            Error::PermissionDenied
        ));
        assert!(matches!(
            classify_device_error("device disconnected"),
            Error::DeviceUnavailable(_)
        ));
    }
}
