//! Speech recognizer abstraction.
//!
//! The trait models the provider's bidirectional streaming contract: the
//! client opens a stream, sends audio, and receives a sequence of result
//! events until the stream closes. Implementations are swappable (cloud
//! WebSocket client vs deterministic mock).

use crate::error::{MedscribeError, Result};
use async_trait::async_trait;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;
use tokio::sync::mpsc;

/// Per-stream recognition parameters sent with the opening handshake.
#[derive(Debug, Clone)]
pub struct StreamConfig {
    /// BCP-47 language code.
    pub language: String,
    /// Sample rate of the PCM audio in Hz.
    pub sample_rate: u32,
    /// Whether the provider should emit interim hypotheses.
    pub interim_results: bool,
}

impl Default for StreamConfig {
    fn default() -> Self {
        Self {
            language: crate::defaults::DEFAULT_LANGUAGE.to_string(),
            sample_rate: crate::defaults::SAMPLE_RATE,
            interim_results: true,
        }
    }
}

/// One recognition result with offsets local to its stream.
///
/// The controller rebases these onto the conversation timeline.
#[derive(Debug, Clone, PartialEq)]
pub struct RawResult {
    pub text: String,
    pub is_final: bool,
    pub confidence: f32,
    /// Start of the covered audio, relative to the first sample of this stream.
    pub start_offset: Duration,
    /// End of the covered audio, relative to the first sample of this stream.
    pub end_offset: Duration,
}

/// Why the provider closed a stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CloseReason {
    /// Clean close after a half-close from our side.
    Finished,
    /// The provider's per-session duration cap was reached.
    ///
    /// Expected during long recordings; not an error.
    DurationLimit,
}

/// Events received from an open recognition stream.
#[derive(Debug, Clone, PartialEq)]
pub enum StreamEvent {
    Result(RawResult),
    Closed(CloseReason),
    Error(String),
}

/// Sending half of an open recognition stream.
#[async_trait]
pub trait AudioSink: Send {
    /// Forwards one block of PCM samples.
    async fn send(&mut self, samples: &[i16]) -> Result<()>;

    /// Half-closes the stream: no more audio will follow.
    ///
    /// The provider finalizes any trailing hypothesis and then closes.
    async fn finish(&mut self) -> Result<()>;
}

/// An open bidirectional recognition stream.
pub struct RecognizerStream {
    pub sink: Box<dyn AudioSink>,
    pub events: mpsc::Receiver<StreamEvent>,
}

/// Factory for recognition streams.
#[async_trait]
pub trait SpeechRecognizer: Send + Sync {
    /// Opens a new bounded-duration recognition stream.
    async fn open_stream(&self, config: &StreamConfig) -> Result<RecognizerStream>;
}

/// Implement SpeechRecognizer for Arc<T> to allow sharing across tasks.
#[async_trait]
impl<T: SpeechRecognizer> SpeechRecognizer for Arc<T> {
    async fn open_stream(&self, config: &StreamConfig) -> Result<RecognizerStream> {
        (**self).open_stream(config).await
    }
}

/// Deterministic scripted recognizer for testing.
///
/// Emits an interim and then a final result for every `result_window` of
/// audio received, with offsets derived from the audio position. Failure
/// modes (connect failures, mid-stream errors, provider duration caps) are
/// injectable through the builder.
#[derive(Clone)]
pub struct MockRecognizer {
    result_window: Duration,
    interim: bool,
    confidence: f32,
    /// Provider-side cap: the stream closes after this much audio.
    session_limit: Option<Duration>,
    /// Number of initial `open_stream` calls that fail.
    fail_opens: Arc<AtomicUsize>,
    /// Number of `open_stream` calls after the first success that fail.
    fail_reconnects: Arc<AtomicUsize>,
    /// At most one stream errors after receiving this much audio.
    fail_after: Arc<std::sync::Mutex<Option<Duration>>>,
    opens: Arc<AtomicUsize>,
}

impl MockRecognizer {
    /// Creates a mock emitting one final result per second of audio.
    pub fn new() -> Self {
        Self {
            result_window: Duration::from_secs(1),
            interim: true,
            confidence: 0.92,
            session_limit: None,
            fail_opens: Arc::new(AtomicUsize::new(0)),
            fail_reconnects: Arc::new(AtomicUsize::new(0)),
            fail_after: Arc::new(std::sync::Mutex::new(None)),
            opens: Arc::new(AtomicUsize::new(0)),
        }
    }

    /// Sets the audio window covered by each emitted final result.
    pub fn with_result_window(mut self, window: Duration) -> Self {
        self.result_window = window;
        self
    }

    /// Disables interim results.
    pub fn without_interim(mut self) -> Self {
        self.interim = false;
        self
    }

    /// Simulates the provider's hard per-session duration cap.
    pub fn with_session_limit(mut self, limit: Duration) -> Self {
        self.session_limit = Some(limit);
        self
    }

    /// Makes the first `n` calls to `open_stream` fail.
    pub fn with_open_failures(self, n: usize) -> Self {
        self.fail_opens.store(n, Ordering::SeqCst);
        self
    }

    /// Makes `n` `open_stream` calls fail after the first success.
    pub fn with_reconnect_failures(self, n: usize) -> Self {
        self.fail_reconnects.store(n, Ordering::SeqCst);
        self
    }

    /// Makes one stream fail after receiving the given amount of audio.
    pub fn with_failure_after(self, after: Duration) -> Self {
        *self
            .fail_after
            .lock()
            .unwrap_or_else(|e| e.into_inner()) = Some(after);
        self
    }

    /// Number of streams opened so far (successful opens only).
    pub fn streams_opened(&self) -> usize {
        self.opens.load(Ordering::SeqCst)
    }
}

impl Default for MockRecognizer {
    fn default() -> Self {
        Self::new()
    }
}

enum MockSinkMsg {
    Audio(usize),
    Finish,
}

struct MockSink {
    tx: mpsc::Sender<MockSinkMsg>,
}

#[async_trait]
impl AudioSink for MockSink {
    async fn send(&mut self, samples: &[i16]) -> Result<()> {
        self.tx
            .send(MockSinkMsg::Audio(samples.len()))
            .await
            .map_err(|_| MedscribeError::Session {
                message: "mock stream is closed".to_string(),
            })
    }

    async fn finish(&mut self) -> Result<()> {
        // The stream may already be gone (limit reached); that is fine.
        let _ = self.tx.send(MockSinkMsg::Finish).await;
        Ok(())
    }
}

struct MockDriver {
    sample_rate: u32,
    result_window: Duration,
    interim: bool,
    confidence: f32,
    session_limit: Option<Duration>,
    fail_after: Option<Duration>,
}

impl MockDriver {
    async fn run(self, mut rx: mpsc::Receiver<MockSinkMsg>, events: mpsc::Sender<StreamEvent>) {
        let mut received = Duration::ZERO;
        let mut emitted_until = Duration::ZERO;

        while let Some(msg) = rx.recv().await {
            match msg {
                MockSinkMsg::Audio(sample_count) => {
                    received += crate::streaming::frame::duration_of(sample_count, self.sample_rate);

                    if let Some(fail_at) = self.fail_after
                        && received >= fail_at
                    {
                        let _ = events
                            .send(StreamEvent::Error("injected stream failure".to_string()))
                            .await;
                        return;
                    }

                    while received >= emitted_until + self.result_window {
                        let start = emitted_until;
                        let end = emitted_until + self.result_window;
                        if self.interim {
                            let _ = events
                                .send(StreamEvent::Result(RawResult {
                                    text: format!("hypothesis {}", start.as_millis()),
                                    is_final: false,
                                    confidence: 0.0,
                                    start_offset: start,
                                    end_offset: end,
                                }))
                                .await;
                        }
                        let _ = events
                            .send(StreamEvent::Result(RawResult {
                                text: format!("segment {}", start.as_millis()),
                                is_final: true,
                                confidence: self.confidence,
                                start_offset: start,
                                end_offset: end,
                            }))
                            .await;
                        emitted_until = end;
                    }

                    if let Some(limit) = self.session_limit
                        && received >= limit
                    {
                        // Provider force-closes; the unfinalized tail is lost.
                        let _ = events.send(StreamEvent::Closed(CloseReason::DurationLimit)).await;
                        return;
                    }
                }
                MockSinkMsg::Finish => {
                    if received > emitted_until {
                        let _ = events
                            .send(StreamEvent::Result(RawResult {
                                text: format!("segment {}", emitted_until.as_millis()),
                                is_final: true,
                                confidence: self.confidence,
                                start_offset: emitted_until,
                                end_offset: received,
                            }))
                            .await;
                    }
                    let _ = events.send(StreamEvent::Closed(CloseReason::Finished)).await;
                    return;
                }
            }
        }

        // Sink dropped without a half-close: report a clean close anyway.
        let _ = events.send(StreamEvent::Closed(CloseReason::Finished)).await;
    }
}

#[async_trait]
impl SpeechRecognizer for MockRecognizer {
    async fn open_stream(&self, config: &StreamConfig) -> Result<RecognizerStream> {
        let remaining = self.fail_opens.load(Ordering::SeqCst);
        if remaining > 0 {
            self.fail_opens.store(remaining - 1, Ordering::SeqCst);
            return Err(MedscribeError::Session {
                message: "injected connect failure".to_string(),
            });
        }
        if self.opens.load(Ordering::SeqCst) > 0 {
            let remaining = self.fail_reconnects.load(Ordering::SeqCst);
            if remaining > 0 {
                self.fail_reconnects.store(remaining - 1, Ordering::SeqCst);
                return Err(MedscribeError::Session {
                    message: "injected reconnect failure".to_string(),
                });
            }
        }
        self.opens.fetch_add(1, Ordering::SeqCst);

        let fail_after = self
            .fail_after
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .take();

        let (sink_tx, sink_rx) = mpsc::channel(64);
        let (event_tx, event_rx) = mpsc::channel(64);

        let driver = MockDriver {
            sample_rate: config.sample_rate,
            result_window: self.result_window,
            interim: self.interim && config.interim_results,
            confidence: self.confidence,
            session_limit: self.session_limit,
            fail_after,
        };
        tokio::spawn(driver.run(sink_rx, event_tx));

        Ok(RecognizerStream {
            sink: Box::new(MockSink { tx: sink_tx }),
            events: event_rx,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const RATE: u32 = 16000;

    fn config() -> StreamConfig {
        StreamConfig::default()
    }

    async fn send_audio(stream: &mut RecognizerStream, seconds: f64) {
        let samples = vec![0i16; (seconds * RATE as f64) as usize];
        stream.sink.send(&samples).await.unwrap();
    }

    #[tokio::test]
    async fn mock_emits_interim_then_final_per_window() {
        let recognizer = MockRecognizer::new();
        let mut stream = recognizer.open_stream(&config()).await.unwrap();

        send_audio(&mut stream, 1.0).await;

        let interim = stream.events.recv().await.unwrap();
        match interim {
            StreamEvent::Result(r) => {
                assert!(!r.is_final);
                assert_eq!(r.start_offset, Duration::ZERO);
            }
            other => panic!("expected interim, got {:?}", other),
        }

        let final_event = stream.events.recv().await.unwrap();
        match final_event {
            StreamEvent::Result(r) => {
                assert!(r.is_final);
                assert_eq!(r.end_offset, Duration::from_secs(1));
            }
            other => panic!("expected final, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn mock_finish_flushes_tail_and_closes() {
        let recognizer = MockRecognizer::new().without_interim();
        let mut stream = recognizer.open_stream(&config()).await.unwrap();

        send_audio(&mut stream, 1.5).await;
        stream.sink.finish().await.unwrap();

        // Whole window
        let first = stream.events.recv().await.unwrap();
        match first {
            StreamEvent::Result(r) => assert_eq!(r.end_offset, Duration::from_secs(1)),
            other => panic!("unexpected {:?}", other),
        }

        // Tail finalized by the half-close
        let tail = stream.events.recv().await.unwrap();
        match tail {
            StreamEvent::Result(r) => {
                assert!(r.is_final);
                assert_eq!(r.start_offset, Duration::from_secs(1));
                assert_eq!(r.end_offset, Duration::from_millis(1500));
            }
            other => panic!("unexpected {:?}", other),
        }

        assert_eq!(
            stream.events.recv().await.unwrap(),
            StreamEvent::Closed(CloseReason::Finished)
        );
    }

    #[tokio::test]
    async fn mock_session_limit_closes_stream() {
        let recognizer = MockRecognizer::new()
            .without_interim()
            .with_session_limit(Duration::from_secs(2));
        let mut stream = recognizer.open_stream(&config()).await.unwrap();

        send_audio(&mut stream, 1.0).await;
        send_audio(&mut stream, 1.0).await;

        let mut saw_limit_close = false;
        while let Some(event) = stream.events.recv().await {
            if event == StreamEvent::Closed(CloseReason::DurationLimit) {
                saw_limit_close = true;
                break;
            }
        }
        assert!(saw_limit_close);

        // Further sends fail once the stream is gone
        let samples = vec![0i16; 160];
        assert!(stream.sink.send(&samples).await.is_err());
    }

    #[tokio::test]
    async fn mock_result_window_is_configurable() {
        let recognizer = MockRecognizer::new()
            .without_interim()
            .with_result_window(Duration::from_millis(500));
        let mut stream = recognizer.open_stream(&config()).await.unwrap();

        send_audio(&mut stream, 1.0).await;

        let first = stream.events.recv().await.unwrap();
        match first {
            StreamEvent::Result(r) => assert_eq!(r.end_offset, Duration::from_millis(500)),
            other => panic!("unexpected {:?}", other),
        }
        let second = stream.events.recv().await.unwrap();
        match second {
            StreamEvent::Result(r) => {
                assert_eq!(r.start_offset, Duration::from_millis(500));
                assert_eq!(r.end_offset, Duration::from_secs(1));
            }
            other => panic!("unexpected {:?}", other),
        }
    }

    #[tokio::test]
    async fn mock_open_failures_then_success() {
        let recognizer = MockRecognizer::new().with_open_failures(2);

        assert!(recognizer.open_stream(&config()).await.is_err());
        assert!(recognizer.open_stream(&config()).await.is_err());
        assert!(recognizer.open_stream(&config()).await.is_ok());
        assert_eq!(recognizer.streams_opened(), 1);
    }

    #[tokio::test]
    async fn mock_failure_after_fires_once() {
        let recognizer = MockRecognizer::new()
            .without_interim()
            .with_failure_after(Duration::from_secs(1));

        let mut stream = recognizer.open_stream(&config()).await.unwrap();
        send_audio(&mut stream, 1.0).await;

        let event = stream.events.recv().await.unwrap();
        assert!(matches!(event, StreamEvent::Error(_)));

        // The next stream is healthy
        let mut stream2 = recognizer.open_stream(&config()).await.unwrap();
        send_audio(&mut stream2, 1.0).await;
        let event = stream2.events.recv().await.unwrap();
        assert!(matches!(event, StreamEvent::Result(_)));
    }
}
