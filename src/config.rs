//! Configuration
//!
//! Resolution order: environment variables, then an optional TOML file,
//! then defaults. The backend endpoint is configuration only; nothing in
//! the decision logic knows the address.

use std::path::{Path, PathBuf};

use serde::Deserialize;
use url::Url;

use crate::{Error, Result};

/// Default backend base URL (the local dev backend)
const DEFAULT_BASE_URL: &str = "http://localhost:8000";

/// Default predict path on the backend
const DEFAULT_PREDICT_PATH: &str = "/predict";

/// How the captured artifact is put on the wire
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum WireEncoding {
    /// Multipart body with one binary `audio_file` field
    #[default]
    Multipart,
    /// JSON body with a base64 data-URI `audio_data` field
    Base64Json,
}

/// Backend endpoint configuration
#[derive(Debug, Clone)]
pub struct BackendConfig {
    /// Base URL of the inference backend
    pub base_url: Url,
    /// Path of the predict endpoint, joined onto `base_url`
    pub predict_path: String,
    /// Wire encoding for the audio payload
    pub encoding: WireEncoding,
}

/// Capture configuration
#[derive(Debug, Clone)]
pub struct CaptureConfig {
    /// Microphone sample rate in Hz
    pub sample_rate: u32,
}

/// Assistant configuration
#[derive(Debug, Clone)]
pub struct Config {
    /// Backend endpoint
    pub backend: BackendConfig,
    /// Microphone capture
    pub capture: CaptureConfig,
}

/// On-disk configuration file shape (all fields optional)
#[derive(Debug, Default, Deserialize)]
struct FileConfig {
    #[serde(default)]
    backend: FileBackend,
    #[serde(default)]
    capture: FileCapture,
}

#[derive(Debug, Default, Deserialize)]
struct FileBackend {
    base_url: Option<String>,
    predict_path: Option<String>,
    encoding: Option<WireEncoding>,
}

#[derive(Debug, Default, Deserialize)]
struct FileCapture {
    sample_rate: Option<u32>,
}

/// Default config file location (`~/.config/vox/config.toml` on Linux)
fn default_config_path() -> Option<PathBuf> {
    directories::ProjectDirs::from("dev", "vox", "vox")
        .map(|dirs| dirs.config_dir().join("config.toml"))
}

impl Config {
    /// Load configuration
    ///
    /// `config_path` overrides the default file location; `base_url`
    /// overrides everything (it is the CLI/env escape hatch).
    ///
    /// # Errors
    ///
    /// Returns error if the file exists but cannot be parsed, or a URL is
    /// invalid.
    pub fn load(config_path: Option<&Path>, base_url: Option<&str>) -> Result<Self> {
        let file = match config_path {
            Some(path) => Self::read_file(path)?,
            None => match default_config_path() {
                Some(path) if path.exists() => Self::read_file(&path)?,
                _ => FileConfig::default(),
            },
        };

        let raw_base = base_url
            .map(str::to_string)
            .or_else(|| std::env::var("VOX_BACKEND_URL").ok())
            .or(file.backend.base_url)
            .unwrap_or_else(|| DEFAULT_BASE_URL.to_string());

        let base_url = Url::parse(&raw_base)
            .map_err(|e| Error::Config(format!("invalid backend url {raw_base}: {e}")))?;

        let predict_path = std::env::var("VOX_PREDICT_PATH")
            .ok()
            .or(file.backend.predict_path)
            .unwrap_or_else(|| DEFAULT_PREDICT_PATH.to_string());

        let encoding = match std::env::var("VOX_WIRE_ENCODING").ok().as_deref() {
            Some("multipart") => WireEncoding::Multipart,
            Some("base64-json") => WireEncoding::Base64Json,
            Some(other) => {
                return Err(Error::Config(format!("unknown wire encoding: {other}")));
            }
            None => file.backend.encoding.unwrap_or_default(),
        };

        let sample_rate = file
            .capture
            .sample_rate
            .unwrap_or(crate::voice::SAMPLE_RATE);

        Ok(Self {
            backend: BackendConfig {
                base_url,
                predict_path,
                encoding,
            },
            capture: CaptureConfig { sample_rate },
        })
    }

    fn read_file(path: &Path) -> Result<FileConfig> {
        let text = std::fs::read_to_string(path)?;
        Ok(toml::from_str(&text)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cli_base_url_wins() {
        let config = Config::load(None, Some("http://backend.example.com:9000")).unwrap();
        assert_eq!(
            config.backend.base_url.as_str(),
            "http://backend.example.com:9000/"
        );
        assert_eq!(config.backend.predict_path, "/predict");
        assert_eq!(config.backend.encoding, WireEncoding::Multipart);
    }

    #[test]
    fn invalid_base_url_is_a_config_error() {
        let result = Config::load(None, Some("not a url"));
        assert!(matches!(result, Err(Error::Config(_))));
    }

    #[test]
    fn file_config_parses() {
        let file: FileConfig = toml::from_str(
            r#"
            [backend]
            base_url = "http://10.0.0.5:8000"
            encoding = "base64-json"

            [capture]
            sample_rate = 44100
            "#,
        )
        .unwrap();

        assert_eq!(file.backend.base_url.as_deref(), Some("http://10.0.0.5:8000"));
        assert_eq!(file.backend.encoding, Some(WireEncoding::Base64Json));
        assert_eq!(file.capture.sample_rate, Some(44100));
    }
}
