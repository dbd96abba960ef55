//! Report generation over a sealed transcript.
//!
//! Stateless request/response: validate the input, call the model with
//! bounded retries, and parse the response into the fixed section set.

use crate::config::ReportConfig;
use crate::defaults;
use crate::error::{MedscribeError, Result};
use crate::report::model::GenerativeModel;
use crate::report::{MedicalReport, parse_sections, prompt};
use chrono::Utc;
use std::time::Duration;
use tracing::{debug, warn};

/// Retry policy for model calls.
#[derive(Debug, Clone)]
pub struct ReportGeneratorConfig {
    /// Total attempts per report, including the first.
    pub max_attempts: u32,
    /// Base delay between attempts; doubles per retry.
    pub retry_backoff: Duration,
    pub max_backoff: Duration,
}

impl Default for ReportGeneratorConfig {
    fn default() -> Self {
        Self {
            max_attempts: defaults::REPORT_MAX_RETRIES,
            retry_backoff: Duration::from_millis(defaults::RETRY_BACKOFF_MS),
            max_backoff: Duration::from_millis(defaults::MAX_BACKOFF_MS),
        }
    }
}

impl From<&ReportConfig> for ReportGeneratorConfig {
    fn from(config: &ReportConfig) -> Self {
        Self {
            max_attempts: config.max_retries.max(1),
            retry_backoff: Duration::from_millis(config.retry_backoff_ms),
            ..Default::default()
        }
    }
}

/// Generates structured reports from finished transcripts.
pub struct ReportGenerator<M: GenerativeModel> {
    model: M,
    config: ReportGeneratorConfig,
}

impl<M: GenerativeModel> ReportGenerator<M> {
    pub fn new(model: M) -> Self {
        Self::with_config(model, ReportGeneratorConfig::default())
    }

    pub fn with_config(model: M, config: ReportGeneratorConfig) -> Self {
        Self { model, config }
    }

    /// Generates a structured medical report.
    ///
    /// Empty or whitespace-only transcripts are rejected with
    /// `InvalidInput` before any remote call. Transient provider errors are
    /// retried with backoff; persistent failure surfaces as `Generation`
    /// with the last underlying cause.
    pub async fn generate(&self, conversation_id: &str, transcript: &str) -> Result<MedicalReport> {
        validate_transcript(transcript)?;

        let prompt = prompt::medical_report_prompt(transcript);
        let raw_text = self.call_with_retries(&prompt).await?;
        debug!(
            conversation = conversation_id,
            chars = raw_text.len(),
            "report generated"
        );

        Ok(MedicalReport {
            conversation_id: conversation_id.to_string(),
            model: self.model.name().to_string(),
            generated_at: Utc::now(),
            sections: parse_sections(&raw_text),
            raw_text,
        })
    }

    /// Generates the free-text AI assessment variant.
    pub async fn generate_assessment(&self, transcript: &str) -> Result<String> {
        validate_transcript(transcript)?;
        let prompt = prompt::assessment_prompt(transcript);
        self.call_with_retries(&prompt).await
    }

    async fn call_with_retries(&self, prompt: &str) -> Result<String> {
        let mut attempt = 0u32;
        loop {
            attempt += 1;
            match self.model.generate(prompt).await {
                Ok(text) => return Ok(text),
                Err(e) if e.is_transient() && attempt < self.config.max_attempts => {
                    let exponent = attempt.saturating_sub(1).min(16);
                    let delay = self
                        .config
                        .retry_backoff
                        .saturating_mul(1 << exponent)
                        .min(self.config.max_backoff);
                    warn!(
                        attempt,
                        delay_ms = delay.as_millis() as u64,
                        error = %e,
                        "model call failed, retrying"
                    );
                    tokio::time::sleep(delay).await;
                }
                Err(e) => {
                    return Err(MedscribeError::Generation {
                        attempts: attempt,
                        message: e.to_string(),
                    });
                }
            }
        }
    }
}

fn validate_transcript(transcript: &str) -> Result<()> {
    if transcript.trim().is_empty() {
        return Err(MedscribeError::InvalidInput {
            message: "transcript is empty".to_string(),
        });
    }
    Ok(())
}
