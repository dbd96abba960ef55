use crate::defaults;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

/// Root configuration structure
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
#[serde(default)]
pub struct Config {
    pub audio: AudioConfig,
    pub streaming: StreamingConfig,
    pub report: ReportConfig,
    pub storage: StorageConfig,
}

/// Audio capture configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct AudioConfig {
    pub device: Option<String>,
    pub sample_rate: u32,
    pub frame_duration_ms: u32,
}

/// Streaming recognition configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct StreamingConfig {
    /// WebSocket endpoint of the speech recognizer.
    pub endpoint: String,
    /// API key; usually provided via MEDSCRIBE_SPEECH_API_KEY instead.
    pub api_key: Option<String>,
    pub language: String,
    pub interim_results: bool,
    /// Provider hard cap on one streaming session, in seconds.
    pub max_session_secs: u64,
    /// Fraction of the session cap at which draining starts.
    pub drain_margin: f64,
    /// Audio tail replayed into a successor session, in milliseconds.
    pub overlap_ms: u64,
    pub max_retries: u32,
    pub retry_backoff_ms: u64,
    pub connect_timeout_secs: u64,
    pub receive_timeout_secs: u64,
    /// Frame buffer capacity in seconds of audio.
    pub buffer_secs: u64,
    pub overflow_policy: OverflowPolicyConfig,
}

/// Backpressure policy for the capture frame buffer
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "kebab-case")]
pub enum OverflowPolicyConfig {
    /// Block the capture thread until the network side catches up.
    Block,
    /// Evict the oldest buffered frame.
    DropOldest,
}

/// Report generation configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct ReportConfig {
    /// Base URL of the generative-language API.
    pub endpoint: String,
    pub model: String,
    /// API key; usually provided via MEDSCRIBE_REPORT_API_KEY instead.
    pub api_key: Option<String>,
    pub max_retries: u32,
    pub retry_backoff_ms: u64,
}

/// Persistence configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
#[serde(default)]
pub struct StorageConfig {
    /// Directory for transcripts and reports. Defaults to the platform data dir.
    pub data_dir: Option<PathBuf>,
}

impl Default for AudioConfig {
    fn default() -> Self {
        Self {
            device: None,
            sample_rate: defaults::SAMPLE_RATE,
            frame_duration_ms: defaults::FRAME_DURATION_MS,
        }
    }
}

impl Default for StreamingConfig {
    fn default() -> Self {
        Self {
            endpoint: "wss://speech.example.com/v1/streaming".to_string(),
            api_key: None,
            language: defaults::DEFAULT_LANGUAGE.to_string(),
            interim_results: true,
            max_session_secs: defaults::MAX_SESSION_SECS,
            drain_margin: defaults::DRAIN_MARGIN,
            overlap_ms: defaults::OVERLAP_MS,
            max_retries: defaults::MAX_RETRIES,
            retry_backoff_ms: defaults::RETRY_BACKOFF_MS,
            connect_timeout_secs: defaults::CONNECT_TIMEOUT_SECS,
            receive_timeout_secs: defaults::RECEIVE_TIMEOUT_SECS,
            buffer_secs: defaults::BUFFER_SECS,
            overflow_policy: OverflowPolicyConfig::Block,
        }
    }
}

impl Default for ReportConfig {
    fn default() -> Self {
        Self {
            endpoint: "https://generativelanguage.googleapis.com".to_string(),
            model: defaults::REPORT_MODEL.to_string(),
            api_key: None,
            max_retries: defaults::REPORT_MAX_RETRIES,
            retry_backoff_ms: defaults::RETRY_BACKOFF_MS,
        }
    }
}

impl Config {
    /// Load configuration from a TOML file
    ///
    /// Returns an error if the file contains invalid TOML.
    /// Missing fields will use default values.
    pub fn load(path: &Path) -> anyhow::Result<Self> {
        let contents = fs::read_to_string(path)?;
        let config: Config = toml::from_str(&contents)?;
        config.validate()?;
        Ok(config)
    }

    /// Load configuration from a file or return defaults if file doesn't exist
    ///
    /// Only returns defaults if the file is missing.
    /// Returns errors for invalid TOML.
    pub fn load_or_default(path: &Path) -> Self {
        match Self::load(path) {
            Ok(config) => config,
            Err(e) => {
                if e.downcast_ref::<std::io::Error>()
                    .map(|io_err| io_err.kind() == std::io::ErrorKind::NotFound)
                    .unwrap_or(false)
                {
                    Self::default()
                } else {
                    // Re-panic on invalid TOML or other errors
                    panic!("Failed to load config from {}: {}", path.display(), e);
                }
            }
        }
    }

    /// Reject values that would break session-rotation arithmetic.
    fn validate(&self) -> anyhow::Result<()> {
        if !(0.0..=1.0).contains(&self.streaming.drain_margin) {
            anyhow::bail!("streaming.drain_margin must be between 0 and 1");
        }
        if self.streaming.max_session_secs == 0 {
            anyhow::bail!("streaming.max_session_secs must be positive");
        }
        if self.audio.frame_duration_ms == 0 {
            anyhow::bail!("audio.frame_duration_ms must be positive");
        }
        Ok(())
    }

    /// Apply environment variable overrides
    ///
    /// Supported environment variables:
    /// - MEDSCRIBE_LANGUAGE → streaming.language
    /// - MEDSCRIBE_SPEECH_ENDPOINT → streaming.endpoint
    /// - MEDSCRIBE_SPEECH_API_KEY → streaming.api_key
    /// - MEDSCRIBE_REPORT_API_KEY → report.api_key
    /// - MEDSCRIBE_AUDIO_DEVICE → audio.device
    pub fn with_env_overrides(mut self) -> Self {
        if let Ok(language) = std::env::var("MEDSCRIBE_LANGUAGE")
            && !language.is_empty()
        {
            self.streaming.language = language;
        }

        if let Ok(endpoint) = std::env::var("MEDSCRIBE_SPEECH_ENDPOINT")
            && !endpoint.is_empty()
        {
            self.streaming.endpoint = endpoint;
        }

        if let Ok(key) = std::env::var("MEDSCRIBE_SPEECH_API_KEY")
            && !key.is_empty()
        {
            self.streaming.api_key = Some(key);
        }

        if let Ok(key) = std::env::var("MEDSCRIBE_REPORT_API_KEY")
            && !key.is_empty()
        {
            self.report.api_key = Some(key);
        }

        if let Ok(device) = std::env::var("MEDSCRIBE_AUDIO_DEVICE")
            && !device.is_empty()
        {
            self.audio.device = Some(device);
        }

        self
    }

    /// Get the default configuration file path
    ///
    /// Returns ~/.config/medscribe/config.toml on Linux
    pub fn default_path() -> PathBuf {
        dirs::config_dir()
            .expect("Could not determine config directory")
            .join("medscribe")
            .join("config.toml")
    }

    /// Resolve the data directory for persisted transcripts and reports.
    pub fn data_dir(&self) -> PathBuf {
        self.storage.data_dir.clone().unwrap_or_else(|| {
            dirs::data_dir()
                .expect("Could not determine data directory")
                .join("medscribe")
        })
    }
}
