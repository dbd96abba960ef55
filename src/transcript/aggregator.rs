//! Aggregator appending recognition results to a conversation.
//!
//! Single writer (the streaming controller), any number of concurrent
//! readers (live display). Readers always observe a consistent snapshot;
//! a result is never half-applied.

use crate::transcript::{ConversationSession, RecognitionResult, Transcript};
use std::sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard};
use tracing::warn;

/// Cloneable handle to one conversation's transcript.
#[derive(Clone)]
pub struct TranscriptAggregator {
    session: Arc<RwLock<ConversationSession>>,
}

impl TranscriptAggregator {
    /// Creates an aggregator for a fresh conversation.
    pub fn new(language: &str) -> Self {
        Self {
            session: Arc::new(RwLock::new(ConversationSession::new(language))),
        }
    }

    fn read(&self) -> RwLockReadGuard<'_, ConversationSession> {
        self.session.read().unwrap_or_else(|e| e.into_inner())
    }

    fn write(&self) -> RwLockWriteGuard<'_, ConversationSession> {
        self.session.write().unwrap_or_else(|e| e.into_inner())
    }

    /// Conversation id.
    pub fn conversation_id(&self) -> String {
        self.read().id.clone()
    }

    /// Applies one recognition result.
    ///
    /// Final results are appended (duplicate deliveries, keyed by
    /// conversation start offset, are dropped silently); interim results
    /// replace the trailing interim slot. Results arriving after the
    /// conversation has been sealed are discarded.
    pub fn on_result(&self, result: RecognitionResult) {
        let mut session = self.write();
        let id = session.id.clone();
        let Some(transcript) = session.transcript_mut() else {
            warn!(conversation = %id, "result dropped: conversation already sealed");
            return;
        };
        if result.is_final {
            transcript.push_final(result);
        } else {
            transcript.set_interim(result);
        }
    }

    /// Consistent read-only snapshot of the current transcript.
    pub fn snapshot(&self) -> Transcript {
        self.read().transcript().clone()
    }

    /// Seals the conversation and returns the final record.
    ///
    /// The trailing interim hypothesis is discarded. Further `on_result`
    /// calls become no-ops.
    pub fn finalize(&self) -> ConversationSession {
        let mut session = self.write();
        session.stop();
        session.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transcript::ConversationStatus;
    use std::time::Duration;

    fn result(start_ms: u64, end_ms: u64, text: &str, is_final: bool) -> RecognitionResult {
        RecognitionResult {
            text: text.to_string(),
            is_final,
            confidence: 0.9,
            start_offset: Duration::from_millis(start_ms),
            end_offset: Duration::from_millis(end_ms),
        }
    }

    #[test]
    fn finals_append_interims_replace() {
        let aggregator = TranscriptAggregator::new("en-US");

        aggregator.on_result(result(0, 500, "good", false));
        aggregator.on_result(result(0, 900, "good morning", false));
        aggregator.on_result(result(0, 1000, "good morning", true));
        aggregator.on_result(result(1000, 1400, "mrs", false));

        let snapshot = aggregator.snapshot();
        assert_eq!(snapshot.len(), 1);
        assert_eq!(snapshot.full_text(), "good morning");
        assert_eq!(snapshot.interim().unwrap().text, "mrs");
    }

    #[test]
    fn duplicate_final_delivery_is_idempotent() {
        let aggregator = TranscriptAggregator::new("en-US");

        let final_result = result(0, 1000, "hello", true);
        aggregator.on_result(final_result.clone());
        aggregator.on_result(final_result);

        assert_eq!(aggregator.snapshot().len(), 1);
    }

    #[test]
    fn finalize_seals_and_drops_interim() {
        let aggregator = TranscriptAggregator::new("en-US");
        aggregator.on_result(result(0, 1000, "hello", true));
        aggregator.on_result(result(1000, 1200, "wor", false));

        let session = aggregator.finalize();

        assert_eq!(session.status(), ConversationStatus::Stopped);
        assert!(session.transcript().interim().is_none());
        assert_eq!(session.transcript().full_text(), "hello");
    }

    #[test]
    fn results_after_finalize_are_dropped() {
        let aggregator = TranscriptAggregator::new("en-US");
        aggregator.on_result(result(0, 1000, "hello", true));
        aggregator.finalize();

        aggregator.on_result(result(1000, 2000, "world", true));

        assert_eq!(aggregator.snapshot().full_text(), "hello");
    }

    #[test]
    fn snapshot_is_detached_from_later_writes() {
        let aggregator = TranscriptAggregator::new("en-US");
        aggregator.on_result(result(0, 1000, "first", true));

        let snapshot = aggregator.snapshot();
        aggregator.on_result(result(1000, 2000, "second", true));

        assert_eq!(snapshot.len(), 1);
        assert_eq!(aggregator.snapshot().len(), 2);
    }

    #[test]
    fn concurrent_reads_during_writes() {
        let aggregator = TranscriptAggregator::new("en-US");
        let reader = aggregator.clone();

        let writer = std::thread::spawn(move || {
            for i in 0..100u64 {
                aggregator.on_result(result(i * 100, (i + 1) * 100, "seg", true));
            }
        });

        // Snapshots must always be internally consistent: offsets ascending.
        for _ in 0..50 {
            let snapshot = reader.snapshot();
            let mut prev = Duration::ZERO;
            for r in snapshot.finals() {
                assert!(r.start_offset >= prev);
                prev = r.start_offset;
            }
        }
        writer.join().unwrap();

        assert_eq!(reader.snapshot().len(), 100);
    }
}
