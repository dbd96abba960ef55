//! End-to-end streaming scenarios over the public API, using the mock
//! audio source and recognizer so no device or network is involved.

use medscribe::audio::source::MockAudioSource;
use medscribe::streaming::controller::ControllerConfig;
use medscribe::streaming::pipeline::{ConversationPipeline, PipelineConfig};
use medscribe::streaming::recognizer::MockRecognizer;
use medscribe::transcript::{ConversationStatus, Transcript};
use std::time::Duration;

const RATE: u32 = 16000;
const FRAME_SAMPLES: usize = 1600; // 100 ms

fn pipeline_config(max_session_secs: u64) -> PipelineConfig {
    PipelineConfig {
        controller: ControllerConfig {
            max_session_duration: Duration::from_secs(max_session_secs),
            drain_margin: 0.9,
            overlap: Duration::from_millis(1500),
            max_retries: 4,
            retry_backoff: Duration::from_millis(1),
            max_backoff: Duration::from_millis(4),
            batch_timeout: Duration::from_millis(5),
            ..ControllerConfig::default()
        },
        poll_interval: Duration::from_millis(1),
        ..PipelineConfig::default()
    }
}

fn source_with_audio(seconds: u64) -> MockAudioSource {
    MockAudioSource::new()
        .with_samples(vec![0i16; FRAME_SAMPLES])
        .with_total_duration(Duration::from_secs(seconds), RATE)
}

/// Coverage must be contiguous up to `total`, with gaps bounded by the
/// overlap window and offsets never moving backwards.
fn assert_coverage(transcript: &Transcript, total: Duration, overlap: Duration) {
    let finals = transcript.finals();
    assert!(!finals.is_empty(), "transcript has no finalized results");

    let mut prev_start = Duration::ZERO;
    let mut prev_end = Duration::ZERO;
    for (i, result) in finals.iter().enumerate() {
        assert!(
            result.start_offset >= prev_start,
            "finalized offsets decreased at index {}",
            i
        );
        let gap = result.start_offset.saturating_sub(prev_end);
        assert!(
            gap <= overlap,
            "gap of {:?} at index {} exceeds the overlap window",
            gap,
            i
        );
        prev_start = result.start_offset;
        prev_end = prev_end.max(result.end_offset);
    }
    assert_eq!(prev_end, total, "transcript does not cover the recording");
}

#[tokio::test]
async fn conversation_longer_than_session_limit_rotates_exactly_once() {
    // 320 s recording against a 300 s per-session limit: one rotation, no
    // gap in coverage, and stop() yields a transcript for the full 320 s.
    let recognizer = MockRecognizer::new().without_interim();
    let pipeline =
        ConversationPipeline::with_config(recognizer.clone(), pipeline_config(300));

    let handle = pipeline.start(source_with_audio(320)).unwrap();
    let outcome = handle.wait().await;

    assert!(outcome.error.is_none(), "unexpected error: {:?}", outcome.error);
    assert_eq!(recognizer.streams_opened(), 2, "expected exactly one rotation");
    assert_eq!(outcome.session.status(), ConversationStatus::Stopped);
    assert_coverage(
        outcome.session.transcript(),
        Duration::from_secs(320),
        Duration::from_millis(1500),
    );
}

#[tokio::test]
async fn transient_network_failure_recovers_transparently() {
    let recognizer = MockRecognizer::new()
        .without_interim()
        .with_failure_after(Duration::from_secs(5));
    let pipeline =
        ConversationPipeline::with_config(recognizer.clone(), pipeline_config(300));

    let handle = pipeline.start(source_with_audio(12)).unwrap();
    let outcome = handle.wait().await;

    assert!(outcome.error.is_none(), "unexpected error: {:?}", outcome.error);
    assert_eq!(recognizer.streams_opened(), 2);

    // No duplicated finalized segment.
    let transcript = outcome.session.transcript();
    let mut seen = std::collections::HashSet::new();
    for result in transcript.finals() {
        assert!(
            seen.insert((result.start_offset, result.end_offset)),
            "duplicate finalized segment at {:?}",
            result.start_offset
        );
    }
    assert_coverage(
        transcript,
        Duration::from_secs(12),
        Duration::from_millis(1500),
    );
}

#[tokio::test]
async fn provider_enforced_duration_cap_is_expected_not_fatal() {
    // The provider closes each stream at 6 s of audio on its own; the
    // conversation still comes out whole.
    let recognizer = MockRecognizer::new()
        .without_interim()
        .with_session_limit(Duration::from_secs(6));
    let pipeline =
        ConversationPipeline::with_config(recognizer.clone(), pipeline_config(3600));

    let handle = pipeline.start(source_with_audio(20)).unwrap();
    let outcome = handle.wait().await;

    assert!(outcome.error.is_none(), "unexpected error: {:?}", outcome.error);
    assert!(recognizer.streams_opened() >= 3);
    assert_coverage(
        outcome.session.transcript(),
        Duration::from_secs(20),
        Duration::from_millis(1500),
    );
}

#[tokio::test]
async fn interim_results_never_outlive_finalization() {
    let recognizer = MockRecognizer::new();
    let pipeline = ConversationPipeline::with_config(recognizer, pipeline_config(300));

    let handle = pipeline.start(source_with_audio(4)).unwrap();
    let outcome = handle.wait().await;

    assert!(outcome.error.is_none());
    // A sealed conversation never retains an interim hypothesis.
    assert!(outcome.session.transcript().interim().is_none());
}

#[tokio::test]
async fn fatal_streaming_error_preserves_partial_transcript() {
    let recognizer = MockRecognizer::new()
        .without_interim()
        .with_failure_after(Duration::from_secs(3))
        .with_reconnect_failures(100);
    let pipeline = ConversationPipeline::with_config(recognizer, pipeline_config(300));

    let handle = pipeline.start(source_with_audio(10)).unwrap();
    let outcome = handle.wait().await;

    assert!(matches!(
        outcome.error,
        Some(medscribe::MedscribeError::FatalStreaming { attempts: 4, .. })
    ));
    // The two windows finalized before the failure survive.
    let transcript = outcome.session.transcript();
    assert_eq!(transcript.covered_until(), Duration::from_secs(2));
    assert_eq!(outcome.session.status(), ConversationStatus::Stopped);
}
