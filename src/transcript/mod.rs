//! Conversation transcripts and their lifecycle.
//!
//! A conversation accumulates finalized recognition results (plus at most
//! one trailing interim hypothesis) while recording, is sealed when the user
//! stops, and may then be consumed by report generation.

pub mod aggregator;

pub use aggregator::TranscriptAggregator;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use uuid::Uuid;

/// One unit of recognizer output, on the conversation-global timeline.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RecognitionResult {
    /// Transcribed text.
    pub text: String,
    /// Final results are immutable; interim results may still change.
    pub is_final: bool,
    /// Recognizer confidence (0.0 to 1.0).
    pub confidence: f32,
    /// Start of the covered audio, measured from the start of the recording.
    pub start_offset: Duration,
    /// End of the covered audio, measured from the start of the recording.
    pub end_offset: Duration,
}

/// Ordered transcript of one conversation.
///
/// Invariant: finalized results are monotonically non-decreasing in start
/// offset and are never mutated or reordered after being appended.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Transcript {
    finals: Vec<RecognitionResult>,
    interim: Option<RecognitionResult>,
}

impl Transcript {
    /// Appends a finalized result.
    ///
    /// Returns `false` without modifying the transcript when the result is a
    /// duplicate delivery (same start offset as an existing final) or would
    /// break the ordering invariant.
    pub fn push_final(&mut self, result: RecognitionResult) -> bool {
        debug_assert!(result.is_final);
        if let Some(last) = self.finals.last()
            && result.start_offset <= last.start_offset
        {
            return false;
        }
        self.finals.push(result);
        true
    }

    /// Replaces the single trailing interim slot.
    pub fn set_interim(&mut self, result: RecognitionResult) {
        debug_assert!(!result.is_final);
        self.interim = Some(result);
    }

    /// Clears the trailing interim slot.
    pub fn clear_interim(&mut self) {
        self.interim = None;
    }

    /// Finalized results, oldest first.
    pub fn finals(&self) -> &[RecognitionResult] {
        &self.finals
    }

    /// The current trailing interim hypothesis, if any.
    pub fn interim(&self) -> Option<&RecognitionResult> {
        self.interim.as_ref()
    }

    /// Number of finalized results.
    pub fn len(&self) -> usize {
        self.finals.len()
    }

    /// True if no result (final or interim) has been recorded.
    pub fn is_empty(&self) -> bool {
        self.finals.is_empty() && self.interim.is_none()
    }

    /// End offset of the last finalized result.
    pub fn covered_until(&self) -> Duration {
        self.finals
            .last()
            .map(|r| r.end_offset)
            .unwrap_or(Duration::ZERO)
    }

    /// Full finalized text, segments joined by single spaces.
    pub fn full_text(&self) -> String {
        self.finals
            .iter()
            .map(|r| r.text.trim())
            .filter(|t| !t.is_empty())
            .collect::<Vec<_>>()
            .join(" ")
    }

    /// Word count of the finalized text.
    pub fn word_count(&self) -> usize {
        self.full_text().split_whitespace().count()
    }
}

/// Lifecycle of a conversation record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConversationStatus {
    /// Results are still being appended.
    Recording,
    /// Sealed; the transcript is immutable.
    Stopped,
    /// At least one report has been generated from it.
    Reported,
}

impl ConversationStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ConversationStatus::Recording => "recording",
            ConversationStatus::Stopped => "stopped",
            ConversationStatus::Reported => "reported",
        }
    }
}

/// One recorded conversation: identity, transcript, lifecycle.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConversationSession {
    pub id: String,
    pub created_at: DateTime<Utc>,
    pub language: String,
    transcript: Transcript,
    status: ConversationStatus,
}

impl ConversationSession {
    /// Creates a new conversation in the `Recording` state.
    pub fn new(language: &str) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            created_at: Utc::now(),
            language: language.to_string(),
            transcript: Transcript::default(),
            status: ConversationStatus::Recording,
        }
    }

    pub fn transcript(&self) -> &Transcript {
        &self.transcript
    }

    pub fn status(&self) -> ConversationStatus {
        self.status
    }

    /// Mutable transcript access while recording; `None` once sealed.
    pub(crate) fn transcript_mut(&mut self) -> Option<&mut Transcript> {
        match self.status {
            ConversationStatus::Recording => Some(&mut self.transcript),
            _ => None,
        }
    }

    /// Seals the conversation: `Recording → Stopped`.
    ///
    /// The trailing interim hypothesis is discarded; only finalized results
    /// survive. Idempotent on an already-sealed conversation.
    pub fn stop(&mut self) {
        if self.status == ConversationStatus::Recording {
            self.transcript.clear_interim();
            self.status = ConversationStatus::Stopped;
        }
    }

    /// Marks the conversation as reported: `Stopped → Reported`.
    pub fn mark_reported(&mut self) -> crate::error::Result<()> {
        match self.status {
            ConversationStatus::Stopped | ConversationStatus::Reported => {
                self.status = ConversationStatus::Reported;
                Ok(())
            }
            ConversationStatus::Recording => Err(crate::error::MedscribeError::InvalidInput {
                message: "conversation is still recording".to_string(),
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn final_result(start_ms: u64, end_ms: u64, text: &str) -> RecognitionResult {
        RecognitionResult {
            text: text.to_string(),
            is_final: true,
            confidence: 0.9,
            start_offset: Duration::from_millis(start_ms),
            end_offset: Duration::from_millis(end_ms),
        }
    }

    fn interim_result(start_ms: u64, end_ms: u64, text: &str) -> RecognitionResult {
        RecognitionResult {
            is_final: false,
            ..final_result(start_ms, end_ms, text)
        }
    }

    #[test]
    fn push_final_appends_in_order() {
        let mut transcript = Transcript::default();
        assert!(transcript.push_final(final_result(0, 1000, "good morning")));
        assert!(transcript.push_final(final_result(1000, 2000, "mrs johnson")));

        assert_eq!(transcript.len(), 2);
        assert_eq!(transcript.full_text(), "good morning mrs johnson");
        assert_eq!(transcript.covered_until(), Duration::from_secs(2));
    }

    #[test]
    fn push_final_rejects_duplicate_offset() {
        let mut transcript = Transcript::default();
        assert!(transcript.push_final(final_result(0, 1000, "hello")));
        assert!(!transcript.push_final(final_result(0, 1000, "hello")));
        assert_eq!(transcript.len(), 1);
    }

    #[test]
    fn push_final_rejects_decreasing_offset() {
        let mut transcript = Transcript::default();
        assert!(transcript.push_final(final_result(2000, 3000, "later")));
        assert!(!transcript.push_final(final_result(1000, 2000, "earlier")));
        assert_eq!(transcript.finals()[0].text, "later");
    }

    #[test]
    fn interim_slot_is_replaced_not_appended() {
        let mut transcript = Transcript::default();
        transcript.set_interim(interim_result(0, 500, "goo"));
        transcript.set_interim(interim_result(0, 800, "good mor"));

        assert_eq!(transcript.interim().unwrap().text, "good mor");
        assert_eq!(transcript.len(), 0);
    }

    #[test]
    fn full_text_skips_empty_segments() {
        let mut transcript = Transcript::default();
        transcript.push_final(final_result(0, 1000, "hello"));
        transcript.push_final(final_result(1000, 2000, "   "));
        transcript.push_final(final_result(2000, 3000, "world"));

        assert_eq!(transcript.full_text(), "hello world");
        assert_eq!(transcript.word_count(), 2);
    }

    #[test]
    fn stop_seals_and_discards_interim() {
        let mut session = ConversationSession::new("en-US");
        session
            .transcript_mut()
            .unwrap()
            .push_final(final_result(0, 1000, "hello"));
        session
            .transcript_mut()
            .unwrap()
            .set_interim(interim_result(1000, 1500, "wor"));

        session.stop();

        assert_eq!(session.status(), ConversationStatus::Stopped);
        assert!(session.transcript().interim().is_none());
        assert_eq!(session.transcript().full_text(), "hello");
        assert!(session.transcript_mut().is_none());
    }

    #[test]
    fn stop_is_idempotent() {
        let mut session = ConversationSession::new("en-US");
        session.stop();
        session.stop();
        assert_eq!(session.status(), ConversationStatus::Stopped);
    }

    #[test]
    fn mark_reported_requires_sealed() {
        let mut session = ConversationSession::new("en-US");
        assert!(session.mark_reported().is_err());

        session.stop();
        assert!(session.mark_reported().is_ok());
        assert_eq!(session.status(), ConversationStatus::Reported);

        // Reporting again is allowed
        assert!(session.mark_reported().is_ok());
    }

    #[test]
    fn serde_round_trip() {
        let mut session = ConversationSession::new("en-US");
        session
            .transcript_mut()
            .unwrap()
            .push_final(final_result(0, 1500, "persistent cough"));
        session.stop();

        let json = serde_json::to_string(&session).unwrap();
        let restored: ConversationSession = serde_json::from_str(&json).unwrap();

        assert_eq!(restored.id, session.id);
        assert_eq!(restored.status(), ConversationStatus::Stopped);
        assert_eq!(restored.transcript().full_text(), "persistent cough");
    }
}
