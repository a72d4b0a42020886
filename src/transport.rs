//! Backend transport
//!
//! One request/response exchange per captured artifact. The endpoint and
//! wire encoding are configuration; the client keeps no state between
//! calls, so a given artifact and backend behavior always map to the same
//! outcome.

use async_trait::async_trait;
use base64::Engine as _;
use url::Url;

use crate::config::{BackendConfig, WireEncoding};
use crate::voice::AudioArtifact;
use crate::{Error, Result};

/// Outcome of a successful backend exchange
///
/// A failed exchange is the `Err` arm of [`Result`] with a
/// `Network`/`BadStatus`/`MalformedResponse`/`Backend` reason.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Reply {
    /// Textual answer plus a playable audio reply
    Voiced {
        /// Answer text for the transcript
        answer: String,
        /// Resolved locator of the audio payload
        audio_url: Url,
    },
    /// Textual answer only; the backend produced no playable audio
    TextOnly {
        /// Answer text for the transcript
        answer: String,
    },
}

/// Sends a captured artifact to the backend
#[async_trait]
pub trait Transport {
    /// Exchange `artifact` for a reply
    ///
    /// # Errors
    ///
    /// `Network` on transport failure, `BadStatus` on a non-success HTTP
    /// status, `Backend` when the backend reports an error, and
    /// `MalformedResponse` when the body cannot be interpreted.
    async fn send(&self, artifact: AudioArtifact) -> Result<Reply>;
}

/// Backend response body
///
/// Observed backend variants differ: some signal playable audio with an
/// `audio_response` flag, some by the presence of `audio_file_url`. Both
/// are accepted; see [`parse_reply`].
#[derive(Debug, serde::Deserialize)]
struct PredictResponse {
    answer: Option<String>,
    audio_file_url: Option<String>,
    #[serde(alias = "audioResponse")]
    audio_response: Option<bool>,
    error: Option<String>,
}

/// JSON request body for the base64 wire encoding
#[derive(serde::Serialize)]
struct PredictRequest {
    audio_data: String,
}

/// HTTP client for the configured inference backend
pub struct BackendClient {
    client: reqwest::Client,
    base_url: Url,
    endpoint: Url,
    encoding: WireEncoding,
}

impl BackendClient {
    /// Create a client for the configured backend
    ///
    /// # Errors
    ///
    /// Returns error if the endpoint URL cannot be formed.
    pub fn new(config: &BackendConfig) -> Result<Self> {
        let endpoint = config
            .base_url
            .join(&config.predict_path)
            .map_err(|e| Error::Config(format!("bad predict path: {e}")))?;

        Ok(Self {
            client: reqwest::Client::new(),
            base_url: config.base_url.clone(),
            endpoint,
            encoding: config.encoding,
        })
    }
}

#[async_trait]
impl Transport for BackendClient {
    async fn send(&self, artifact: AudioArtifact) -> Result<Reply> {
        tracing::debug!(
            endpoint = %self.endpoint,
            encoding = ?self.encoding,
            audio_bytes = artifact.bytes.len(),
            "sending audio command"
        );

        let request = match self.encoding {
            WireEncoding::Multipart => {
                let part = reqwest::multipart::Part::bytes(artifact.bytes)
                    .file_name("audio.wav")
                    .mime_str(artifact.content_type)
                    .map_err(|e| Error::Network(e.to_string()))?;
                let form = reqwest::multipart::Form::new().part("audio_file", part);
                self.client.post(self.endpoint.clone()).multipart(form)
            }
            WireEncoding::Base64Json => {
                let payload = base64::engine::general_purpose::STANDARD.encode(&artifact.bytes);
                let body = PredictRequest {
                    audio_data: format!("data:{};base64,{payload}", artifact.content_type),
                };
                self.client.post(self.endpoint.clone()).json(&body)
            }
        };

        let response = request.send().await.map_err(|e| {
            tracing::error!(error = %e, "backend request failed");
            Error::Network(e.to_string())
        })?;

        let status = response.status();
        tracing::debug!(status = %status, "received backend response");

        if !status.is_success() {
            return Err(Error::BadStatus(status.as_u16()));
        }

        let body: PredictResponse = response.json().await.map_err(|e| {
            tracing::error!(error = %e, "undecodable backend response");
            Error::MalformedResponse(e.to_string())
        })?;

        parse_reply(&self.base_url, body)
    }
}

/// Interpret a decoded backend response
///
/// The reply is voiced iff a non-empty `audio_file_url` is present and the
/// backend did not explicitly flag `audio_response: false`. Relative
/// locators are resolved against the backend base URL.
fn parse_reply(base_url: &Url, body: PredictResponse) -> Result<Reply> {
    if let Some(message) = body.error {
        return Err(Error::Backend(message));
    }

    let answer = body
        .answer
        .filter(|a| !a.is_empty())
        .ok_or_else(|| Error::MalformedResponse("missing answer".to_string()))?;

    let audio_url = body
        .audio_file_url
        .filter(|u| !u.is_empty())
        .filter(|_| body.audio_response != Some(false));

    match audio_url {
        Some(raw) => {
            let resolved = base_url
                .join(&raw)
                .map_err(|e| Error::MalformedResponse(format!("bad audio url {raw}: {e}")))?;
            tracing::info!(answer = %answer, audio = %resolved, "voiced reply");
            Ok(Reply::Voiced {
                answer,
                audio_url: resolved,
            })
        }
        None => {
            tracing::info!(answer = %answer, "text-only reply");
            Ok(Reply::TextOnly { answer })
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn base() -> Url {
        Url::parse("http://localhost:8000").unwrap()
    }

    fn response(json: &str) -> PredictResponse {
        serde_json::from_str(json).unwrap()
    }

    #[test]
    fn voiced_reply_resolves_relative_locator() {
        let reply = parse_reply(
            &base(),
            response(r#"{"answer": "It is sunny", "audio_file_url": "/files/reply1.mp3"}"#),
        )
        .unwrap();

        assert_eq!(
            reply,
            Reply::Voiced {
                answer: "It is sunny".to_string(),
                audio_url: Url::parse("http://localhost:8000/files/reply1.mp3").unwrap(),
            }
        );
    }

    #[test]
    fn absolute_locator_is_kept() {
        let reply = parse_reply(
            &base(),
            response(
                r#"{"answer": "ok", "audio_file_url": "http://cdn.example.com/reply.mp3"}"#,
            ),
        )
        .unwrap();

        let Reply::Voiced { audio_url, .. } = reply else {
            panic!("expected voiced reply");
        };
        assert_eq!(audio_url.as_str(), "http://cdn.example.com/reply.mp3");
    }

    #[test]
    fn missing_audio_url_is_text_only() {
        let reply = parse_reply(&base(), response(r#"{"answer": "just text"}"#)).unwrap();
        assert_eq!(
            reply,
            Reply::TextOnly {
                answer: "just text".to_string()
            }
        );
    }

    #[test]
    fn explicit_flag_false_overrides_url_presence() {
        let reply = parse_reply(
            &base(),
            response(
                r#"{"answer": "t", "audio_file_url": "/files/r.mp3", "audioResponse": false}"#,
            ),
        )
        .unwrap();
        assert!(matches!(reply, Reply::TextOnly { .. }));
    }

    #[test]
    fn flag_true_with_url_is_voiced() {
        let reply = parse_reply(
            &base(),
            response(
                r#"{"answer": "t", "audio_file_url": "/files/r.mp3", "audio_response": true}"#,
            ),
        )
        .unwrap();
        assert!(matches!(reply, Reply::Voiced { .. }));
    }

    #[test]
    fn backend_error_field_wins() {
        let result = parse_reply(
            &base(),
            response(r#"{"error": "Could not recognize the question from the audio"}"#),
        );
        assert!(
            matches!(result, Err(Error::Backend(msg)) if msg.contains("Could not recognize"))
        );
    }

    #[test]
    fn missing_answer_is_malformed() {
        let result = parse_reply(&base(), response(r#"{"audio_file_url": "/f.mp3"}"#));
        assert!(matches!(result, Err(Error::MalformedResponse(_))));
    }
}
