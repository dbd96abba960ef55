//! medscribe - Clinical voice transcription and medical reporting
//!
//! Streams microphone audio to a cloud recognizer through rotating
//! bounded-duration sessions, aggregates an ordered conversation
//! transcript, and generates structured medical reports from it.

#![warn(clippy::unwrap_used)]
#![warn(clippy::expect_used)]
#![warn(clippy::let_underscore_must_use)]

pub mod app;
pub mod audio;
pub mod cli;
pub mod config;
pub mod defaults;
pub mod error;
pub mod report;
pub mod store;
pub mod streaming;
pub mod transcript;

// Core traits (source → stream → transcript)
pub use audio::source::AudioSource;
pub use report::model::GenerativeModel;
pub use streaming::recognizer::SpeechRecognizer;

// Pipeline
pub use streaming::pipeline::{ConversationOutcome, ConversationPipeline, PipelineConfig, PipelineHandle};

// Error handling
pub use error::{MedscribeError, Result};

// Config
pub use config::Config;

// Transcript and reports
pub use report::{MedicalReport, ReportGenerator};
pub use transcript::{ConversationSession, Transcript, TranscriptAggregator};
