//! Error types for medscribe.

use thiserror::Error;

#[derive(Error, Debug)]
pub enum MedscribeError {
    // Configuration errors
    #[error("Configuration file not found at {path}")]
    ConfigFileNotFound { path: String },

    #[error("Invalid configuration value for {key}: {message}")]
    ConfigInvalidValue { key: String, message: String },

    #[error("Configuration error: {0}")]
    Config(#[from] toml::de::Error),

    // Audio capture errors
    #[error("Audio device unavailable: {message}")]
    Device { message: String },

    #[error("Audio format mismatch: expected {expected}, got {actual}")]
    AudioFormatMismatch { expected: String, actual: String },

    // Streaming recognition errors
    #[error("Recognition session error: {message}")]
    Session { message: String },

    #[error("Streaming failed after {attempts} consecutive attempts: {message}")]
    FatalStreaming { attempts: u32, message: String },

    // Report generation errors
    #[error("Invalid input: {message}")]
    InvalidInput { message: String },

    #[error("Generative model call failed: {message}")]
    ModelCall { message: String, transient: bool },

    #[error("Report generation failed after {attempts} attempts: {message}")]
    Generation { attempts: u32, message: String },

    // Persistence errors
    #[error("Store error: {message}")]
    Store { message: String },

    #[error("Conversation not found: {id}")]
    ConversationNotFound { id: String },

    // General I/O errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    // Generic error for cases not covered above
    #[error("{0}")]
    Other(String),
}

impl MedscribeError {
    /// Whether this error may succeed on retry (rate limiting, timeouts,
    /// transient network failures).
    pub fn is_transient(&self) -> bool {
        match self {
            MedscribeError::ModelCall { transient, .. } => *transient,
            MedscribeError::Session { .. } => true,
            _ => false,
        }
    }
}

// Type alias for convenience
pub type Result<T> = std::result::Result<T, MedscribeError>;
