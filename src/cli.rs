//! Command-line interface for medscribe
//!
//! Provides argument parsing using clap derive macros.

use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::time::Duration;

/// Clinical voice transcription and medical reporting
#[derive(Parser, Debug)]
#[command(
    name = "medscribe",
    version,
    about = "Clinical voice transcription and medical reporting"
)]
pub struct Cli {
    /// Subcommand to execute
    #[command(subcommand)]
    pub command: Commands,

    /// Path to configuration file
    #[arg(long, global = true, value_name = "PATH")]
    pub config: Option<PathBuf>,

    /// Suppress the live transcript display (quiet mode)
    #[arg(short, long, global = true)]
    pub quiet: bool,
}

/// Parse a duration string into a Duration.
///
/// Supports any format accepted by `humantime`: bare numbers (seconds),
/// single-unit (`30s`, `5m`, `2h`), and compound (`1h30m`, `2m30s`).
fn parse_duration(s: &str) -> Result<Duration, String> {
    let s = s.trim();
    // Bare number → seconds
    if let Ok(secs) = s.parse::<u64>() {
        return Ok(Duration::from_secs(secs));
    }
    humantime::parse_duration(s).map_err(|e| e.to_string())
}

/// Available commands
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Record from the microphone with live transcription
    Record {
        /// Audio input device (e.g., pipewire)
        #[arg(long, value_name = "DEVICE")]
        device: Option<String>,

        /// Recognition language (BCP-47, e.g. en-US, en-IN, hi-IN)
        #[arg(long, value_name = "LANG")]
        language: Option<String>,

        /// Stop automatically after this long. Examples: 90s, 5m, 1h30m
        #[arg(long, value_name = "DURATION", value_parser = parse_duration)]
        max_duration: Option<Duration>,
    },

    /// Transcribe a recorded WAV file through the streaming pipeline
    Transcribe {
        /// Path to the WAV file
        file: PathBuf,

        /// Recognition language (BCP-47, e.g. en-US, en-IN, hi-IN)
        #[arg(long, value_name = "LANG")]
        language: Option<String>,
    },

    /// Generate a structured medical report for a stored conversation
    Report {
        /// Conversation id or number (e.g. 14 or #14)
        conversation: String,

        /// Generate the free-text AI assessment instead of the report
        #[arg(long)]
        assessment: bool,
    },

    /// List stored conversations
    Sessions {
        /// Maximum number of conversations to show
        #[arg(long, default_value = "10")]
        limit: usize,
    },

    /// List available audio input devices
    Devices,
}
