//! Generative model clients.
//!
//! The trait is the seam between report generation and the remote API, so
//! tests run against a scripted mock instead of the network.

use crate::config::ReportConfig;
use crate::error::{MedscribeError, Result};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

/// Trait for text-generation backends.
#[async_trait]
pub trait GenerativeModel: Send + Sync {
    /// Generates text for the given prompt.
    async fn generate(&self, prompt: &str) -> Result<String>;

    /// Model name for logging and report metadata.
    fn name(&self) -> &str;
}

#[derive(Debug, Serialize)]
struct GenerateRequest<'a> {
    contents: Vec<RequestContent<'a>>,
}

#[derive(Debug, Serialize)]
struct RequestContent<'a> {
    role: &'static str,
    parts: Vec<RequestPart<'a>>,
}

#[derive(Debug, Serialize)]
struct RequestPart<'a> {
    text: &'a str,
}

#[derive(Debug, Deserialize)]
struct GenerateResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
}

#[derive(Debug, Deserialize)]
struct Candidate {
    #[serde(default)]
    content: Option<ResponseContent>,
}

#[derive(Debug, Deserialize)]
struct ResponseContent {
    #[serde(default)]
    parts: Vec<ResponsePart>,
}

#[derive(Debug, Deserialize)]
struct ResponsePart {
    #[serde(default)]
    text: String,
}

/// HTTP client for a `generateContent`-style generative-language API.
pub struct VertexModel {
    client: reqwest::Client,
    endpoint: String,
    model: String,
    api_key: String,
}

impl VertexModel {
    pub fn new(endpoint: &str, model: &str, api_key: &str) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(60))
            .connect_timeout(Duration::from_secs(10))
            .build()
            .map_err(|e| MedscribeError::Other(format!("failed to build HTTP client: {}", e)))?;
        Ok(Self {
            client,
            endpoint: endpoint.trim_end_matches('/').to_string(),
            model: model.to_string(),
            api_key: api_key.to_string(),
        })
    }

    /// Builds a client from the report section of the config.
    ///
    /// The API key must be present (usually via MEDSCRIBE_REPORT_API_KEY).
    pub fn from_config(config: &ReportConfig) -> Result<Self> {
        let api_key = config
            .api_key
            .as_deref()
            .ok_or_else(|| MedscribeError::ConfigInvalidValue {
                key: "report.api_key".to_string(),
                message: "an API key is required for report generation".to_string(),
            })?;
        Self::new(&config.endpoint, &config.model, api_key)
    }

    fn request_url(&self) -> String {
        format!(
            "{}/v1beta/models/{}:generateContent?key={}",
            self.endpoint, self.model, self.api_key
        )
    }
}

#[async_trait]
impl GenerativeModel for VertexModel {
    async fn generate(&self, prompt: &str) -> Result<String> {
        let request = GenerateRequest {
            contents: vec![RequestContent {
                role: "user",
                parts: vec![RequestPart { text: prompt }],
            }],
        };

        let response = self
            .client
            .post(self.request_url())
            .json(&request)
            .send()
            .await
            .map_err(|e| MedscribeError::ModelCall {
                message: format!("request failed: {}", e),
                // Connect errors and timeouts are worth retrying.
                transient: true,
            })?;

        let status = response.status();
        if !status.is_success() {
            let transient = status.as_u16() == 429 || status.is_server_error();
            let body = response.text().await.unwrap_or_default();
            return Err(MedscribeError::ModelCall {
                message: format!("HTTP {}: {}", status.as_u16(), truncate(&body, 200)),
                transient,
            });
        }

        let parsed: GenerateResponse =
            response.json().await.map_err(|e| MedscribeError::ModelCall {
                message: format!("unparseable response: {}", e),
                transient: false,
            })?;

        let text = parsed
            .candidates
            .into_iter()
            .next()
            .and_then(|c| c.content)
            .map(|content| {
                content
                    .parts
                    .into_iter()
                    .map(|p| p.text)
                    .collect::<Vec<_>>()
                    .join("")
            })
            .unwrap_or_default();

        if text.trim().is_empty() {
            return Err(MedscribeError::ModelCall {
                message: "model returned no candidates".to_string(),
                transient: false,
            });
        }
        Ok(text)
    }

    fn name(&self) -> &str {
        &self.model
    }
}

fn truncate(text: &str, max: usize) -> &str {
    match text.char_indices().nth(max) {
        Some((idx, _)) => &text[..idx],
        None => text,
    }
}

/// Scripted model for testing.
#[derive(Clone)]
pub struct MockGenerativeModel {
    response: String,
    /// Failures to inject before succeeding, with their transience.
    failures: Arc<std::sync::Mutex<Vec<(String, bool)>>>,
    calls: Arc<AtomicUsize>,
}

impl MockGenerativeModel {
    pub fn new(response: &str) -> Self {
        Self {
            response: response.to_string(),
            failures: Arc::new(std::sync::Mutex::new(Vec::new())),
            calls: Arc::new(AtomicUsize::new(0)),
        }
    }

    /// Queues `n` transient failures ahead of the scripted response.
    pub fn with_transient_failures(self, n: usize) -> Self {
        {
            let mut failures = self.failures.lock().unwrap_or_else(|e| e.into_inner());
            for _ in 0..n {
                failures.push(("HTTP 503: overloaded".to_string(), true));
            }
        }
        self
    }

    /// Queues one permanent failure.
    pub fn with_permanent_failure(self, message: &str) -> Self {
        self.failures
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push((message.to_string(), false));
        self
    }

    /// Number of `generate` calls made.
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl GenerativeModel for MockGenerativeModel {
    async fn generate(&self, _prompt: &str) -> Result<String> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let failure = self
            .failures
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .pop();
        if let Some((message, transient)) = failure {
            return Err(MedscribeError::ModelCall { message, transient });
        }
        Ok(self.response.clone())
    }

    fn name(&self) -> &str {
        "mock"
    }
}
