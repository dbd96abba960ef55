//! JSON persistence for conversations and reports.
//!
//! One file holds a running counter plus every conversation record keyed by
//! id; a second file holds generated reports. Reports are independent
//! artifacts: regenerating appends a new record and never touches the
//! conversation it came from.

use crate::error::{MedscribeError, Result};
use crate::report::MedicalReport;
use crate::transcript::ConversationSession;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::debug;

/// One finalized transcript segment as persisted.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoredSegment {
    pub text: String,
    pub start_secs: f64,
    pub end_secs: f64,
    pub confidence: f32,
}

/// One persisted conversation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConversationRecord {
    /// Human-friendly running number, assigned at save time.
    pub number: u64,
    pub id: String,
    pub timestamp: DateTime<Utc>,
    pub language: String,
    pub status: String,
    /// Full finalized text.
    pub transcript: String,
    pub word_count: usize,
    /// Ordered finalized segments with conversation offsets.
    pub segments: Vec<StoredSegment>,
}

#[derive(Debug, Default, Serialize, Deserialize)]
struct TranscriptFile {
    counter: u64,
    conversations: BTreeMap<String, ConversationRecord>,
    last_updated: Option<DateTime<Utc>>,
}

fn read_json<T: Default + for<'de> Deserialize<'de>>(path: &Path) -> Result<T> {
    match fs::read_to_string(path) {
        Ok(contents) => serde_json::from_str(&contents).map_err(|e| MedscribeError::Store {
            message: format!("corrupt store file {}: {}", path.display(), e),
        }),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(T::default()),
        Err(e) => Err(e.into()),
    }
}

fn write_json<T: Serialize>(path: &Path, value: &T) -> Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }
    let contents = serde_json::to_string_pretty(value).map_err(|e| MedscribeError::Store {
        message: format!("failed to encode store file: {}", e),
    })?;
    fs::write(path, contents)?;
    Ok(())
}

/// Store of finished conversations, one record per conversation.
pub struct TranscriptStore {
    path: PathBuf,
}

impl TranscriptStore {
    pub fn new(data_dir: &Path) -> Self {
        Self {
            path: data_dir.join("transcriptions.json"),
        }
    }

    /// Persists a sealed conversation and assigns its running number.
    pub fn save(&self, session: &ConversationSession) -> Result<ConversationRecord> {
        let mut file: TranscriptFile = read_json(&self.path)?;

        file.counter += 1;
        let transcript = session.transcript();
        let record = ConversationRecord {
            number: file.counter,
            id: session.id.clone(),
            timestamp: session.created_at,
            language: session.language.clone(),
            status: session.status().as_str().to_string(),
            transcript: transcript.full_text(),
            word_count: transcript.word_count(),
            segments: transcript
                .finals()
                .iter()
                .map(|r| StoredSegment {
                    text: r.text.clone(),
                    start_secs: r.start_offset.as_secs_f64(),
                    end_secs: r.end_offset.as_secs_f64(),
                    confidence: r.confidence,
                })
                .collect(),
        };

        file.conversations.insert(record.id.clone(), record.clone());
        file.last_updated = Some(Utc::now());
        write_json(&self.path, &file)?;
        debug!(number = record.number, id = %record.id, "conversation saved");
        Ok(record)
    }

    /// Loads a conversation by id or by running number (`"14"` or `"#14"`).
    pub fn load(&self, key: &str) -> Result<ConversationRecord> {
        let file: TranscriptFile = read_json(&self.path)?;

        if let Some(record) = file.conversations.get(key) {
            return Ok(record.clone());
        }
        if let Ok(number) = key.trim_start_matches('#').parse::<u64>()
            && let Some(record) = file.conversations.values().find(|r| r.number == number)
        {
            return Ok(record.clone());
        }
        Err(MedscribeError::ConversationNotFound {
            id: key.to_string(),
        })
    }

    /// All conversations, newest first.
    pub fn list(&self) -> Result<Vec<ConversationRecord>> {
        let file: TranscriptFile = read_json(&self.path)?;
        let mut records: Vec<ConversationRecord> = file.conversations.into_values().collect();
        records.sort_by(|a, b| b.number.cmp(&a.number));
        Ok(records)
    }
}

#[derive(Debug, Default, Serialize, Deserialize)]
struct ReportFile {
    reports: Vec<MedicalReport>,
}

/// Store of generated reports; one record per generation.
pub struct ReportStore {
    path: PathBuf,
}

impl ReportStore {
    pub fn new(data_dir: &Path) -> Self {
        Self {
            path: data_dir.join("reports.json"),
        }
    }

    /// Appends one generated report.
    pub fn save(&self, report: &MedicalReport) -> Result<()> {
        let mut file: ReportFile = read_json(&self.path)?;
        file.reports.push(report.clone());
        write_json(&self.path, &file)?;
        debug!(conversation = %report.conversation_id, "report saved");
        Ok(())
    }

    /// All reports generated for one conversation, oldest first.
    pub fn load_for(&self, conversation_id: &str) -> Result<Vec<MedicalReport>> {
        let file: ReportFile = read_json(&self.path)?;
        Ok(file
            .reports
            .into_iter()
            .filter(|r| r.conversation_id == conversation_id)
            .collect())
    }
}
