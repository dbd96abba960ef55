//! Conversation pipeline orchestrator.
//!
//! Wires the capture source, frame buffer, session controller, and
//! transcript aggregator into one running conversation:
//!
//! ```text
//! ┌─────────┐    ┌──────────────┐    ┌────────────────────┐    ┌────────────┐
//! │ Capture │───▶│ Frame Buffer │───▶│ Session Controller │───▶│ Aggregator │
//! │ (thread)│    │  (bounded)   │    │ (rotating streams) │    │ (snapshot) │
//! └─────────┘    └──────────────┘    └────────────────────┘    └────────────┘
//! ```
//!
//! The capture thread never blocks on network I/O; the controller never
//! blocks capture beyond the buffer's bounded capacity.

use crate::audio::source::AudioSource;
use crate::config::Config;
use crate::defaults;
use crate::error::{MedscribeError, Result};
use crate::streaming::buffer::{FrameBuffer, FrameBufferConfig};
use crate::streaming::controller::{ControllerConfig, SessionController};
use crate::streaming::frame::AudioFrame;
use crate::streaming::recognizer::{SpeechRecognizer, StreamConfig};
use crate::transcript::{ConversationSession, Transcript, TranscriptAggregator};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::Duration;
use tokio::sync::watch;
use tracing::{debug, error};

/// Configuration for a conversation pipeline.
#[derive(Debug, Clone)]
pub struct PipelineConfig {
    pub buffer: FrameBufferConfig,
    pub controller: ControllerConfig,
    pub stream: StreamConfig,
    /// Samples per capture frame.
    pub frame_samples: usize,
    /// Polling interval when the source has no samples ready.
    pub poll_interval: Duration,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            buffer: FrameBufferConfig::default(),
            controller: ControllerConfig::default(),
            stream: StreamConfig::default(),
            frame_samples: defaults::frame_samples(defaults::SAMPLE_RATE),
            poll_interval: Duration::from_millis(10),
        }
    }
}

impl PipelineConfig {
    /// Builds pipeline settings from the application config.
    pub fn from_config(config: &Config) -> Self {
        let frames_per_sec = (1000 / config.audio.frame_duration_ms.max(1)) as usize;
        Self {
            buffer: FrameBufferConfig {
                capacity: (config.streaming.buffer_secs as usize).max(1) * frames_per_sec.max(1),
                policy: config.streaming.overflow_policy,
            },
            controller: ControllerConfig::from(&config.streaming),
            stream: StreamConfig {
                language: config.streaming.language.clone(),
                sample_rate: config.audio.sample_rate,
                interim_results: config.streaming.interim_results,
            },
            frame_samples: (config.audio.sample_rate as usize
                * config.audio.frame_duration_ms as usize)
                / 1000,
            poll_interval: Duration::from_millis(10),
        }
    }
}

/// A conversation's result: the sealed record, plus the error that ended the
/// run early, if any. The partial transcript survives streaming failures.
#[derive(Debug)]
pub struct ConversationOutcome {
    pub session: ConversationSession,
    pub error: Option<MedscribeError>,
}

/// Pipeline factory bound to a recognizer.
pub struct ConversationPipeline<R: SpeechRecognizer + 'static> {
    recognizer: R,
    config: PipelineConfig,
}

impl<R: SpeechRecognizer + 'static> ConversationPipeline<R> {
    pub fn new(recognizer: R) -> Self {
        Self::with_config(recognizer, PipelineConfig::default())
    }

    pub fn with_config(recognizer: R, config: PipelineConfig) -> Self {
        Self { recognizer, config }
    }

    /// Starts capturing and transcribing.
    ///
    /// Fails fast with `MedscribeError::Device` if the source cannot start;
    /// everything after that is reported through the returned handle.
    pub fn start<A: AudioSource + 'static>(self, mut source: A) -> Result<PipelineHandle> {
        source.start()?;

        let aggregator = TranscriptAggregator::new(&self.config.stream.language);
        let buffer = Arc::new(FrameBuffer::with_config(self.config.buffer.clone()));
        let stop_flag = Arc::new(AtomicBool::new(false));
        let capture_error: Arc<Mutex<Option<MedscribeError>>> = Arc::new(Mutex::new(None));
        let (stop_tx, stop_rx) = watch::channel(false);

        let capture = {
            let buffer = buffer.clone();
            let stop_flag = stop_flag.clone();
            let capture_error = capture_error.clone();
            let frame_samples = self.config.frame_samples;
            let poll_interval = self.config.poll_interval;
            thread::spawn(move || {
                capture_loop(
                    source,
                    buffer,
                    frame_samples,
                    poll_interval,
                    stop_flag,
                    capture_error,
                );
            })
        };

        let controller = SessionController::new(
            self.recognizer,
            self.config.controller.clone(),
            self.config.stream.clone(),
        );
        let controller_task = tokio::spawn(controller.run(
            buffer.clone(),
            aggregator.clone(),
            stop_rx,
        ));

        Ok(PipelineHandle {
            stop_tx,
            stop_flag,
            buffer,
            capture: Some(capture),
            controller_task,
            capture_error,
            aggregator,
        })
    }
}

/// Pulls samples from the source, assembles fixed-size frames, and pushes
/// them into the buffer until stopped, exhausted, or errored.
fn capture_loop<A: AudioSource>(
    mut source: A,
    buffer: Arc<FrameBuffer>,
    frame_samples: usize,
    poll_interval: Duration,
    stop_flag: Arc<AtomicBool>,
    capture_error: Arc<Mutex<Option<MedscribeError>>>,
) {
    let mut residual: Vec<i16> = Vec::with_capacity(frame_samples * 2);
    let mut sequence: u64 = 0;

    'capture: while !stop_flag.load(Ordering::SeqCst) {
        match source.read_samples() {
            Ok(samples) if !samples.is_empty() => {
                residual.extend_from_slice(&samples);
                while residual.len() >= frame_samples {
                    let rest = residual.split_off(frame_samples);
                    let frame = AudioFrame::new(sequence, std::mem::replace(&mut residual, rest));
                    sequence += 1;
                    if !buffer.push(frame) {
                        break 'capture;
                    }
                }
            }
            Ok(_) => {
                if !source.is_active() {
                    debug!("audio source exhausted");
                    break;
                }
                thread::sleep(poll_interval);
            }
            Err(e) => {
                error!(error = %e, "audio capture failed");
                *capture_error.lock().unwrap_or_else(|e| e.into_inner()) = Some(e);
                break;
            }
        }
    }

    // Flush the trailing partial frame so the transcript covers everything.
    if !residual.is_empty() {
        buffer.push(AudioFrame::new(sequence, residual));
    }

    let _ = source.stop();
    buffer.close();
}

/// Handle to a running conversation.
pub struct PipelineHandle {
    stop_tx: watch::Sender<bool>,
    stop_flag: Arc<AtomicBool>,
    buffer: Arc<FrameBuffer>,
    capture: Option<thread::JoinHandle<()>>,
    controller_task: tokio::task::JoinHandle<Result<()>>,
    capture_error: Arc<Mutex<Option<MedscribeError>>>,
    aggregator: TranscriptAggregator,
}

impl PipelineHandle {
    /// Conversation id of this recording.
    pub fn conversation_id(&self) -> String {
        self.aggregator.conversation_id()
    }

    /// Consistent snapshot of the transcript so far, for live display.
    pub fn snapshot(&self) -> Transcript {
        self.aggregator.snapshot()
    }

    /// Whether the controller has finished (end of input or fatal error).
    pub fn is_finished(&self) -> bool {
        self.controller_task.is_finished()
    }

    /// Requests a stop: capture winds down, the current session drains, and
    /// no successor session is started.
    pub fn stop(&self) {
        self.stop_flag.store(true, Ordering::SeqCst);
        let _ = self.stop_tx.send(true);
    }

    /// Waits for the conversation to finish and seals it.
    ///
    /// A capture device failure takes precedence over a streaming failure;
    /// in both cases the partial transcript is preserved in the outcome.
    pub async fn wait(mut self) -> ConversationOutcome {
        let run_result = match (&mut self.controller_task).await {
            Ok(result) => result,
            Err(e) => Err(MedscribeError::Other(format!(
                "controller task panicked: {}",
                e
            ))),
        };

        // If the controller died early the capture thread may still be
        // blocked pushing; release it before joining.
        self.stop_flag.store(true, Ordering::SeqCst);
        self.buffer.close();
        if let Some(capture) = self.capture.take() {
            let _ = tokio::task::spawn_blocking(move || capture.join()).await;
        }

        let session = self.aggregator.finalize();
        let capture_error = self
            .capture_error
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .take();

        let error = match (capture_error, run_result) {
            (Some(device_error), _) => Some(device_error),
            (None, Err(e)) => Some(e),
            (None, Ok(())) => None,
        };

        ConversationOutcome { session, error }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audio::source::MockAudioSource;
    use crate::streaming::recognizer::MockRecognizer;

    fn fast_config() -> PipelineConfig {
        PipelineConfig {
            controller: ControllerConfig {
                retry_backoff: Duration::from_millis(1),
                max_backoff: Duration::from_millis(4),
                batch_timeout: Duration::from_millis(5),
                ..ControllerConfig::default()
            },
            poll_interval: Duration::from_millis(1),
            ..PipelineConfig::default()
        }
    }

    #[tokio::test]
    async fn finite_source_end_to_end() {
        let source = MockAudioSource::new()
            .with_samples(vec![0i16; 1600])
            .with_total_duration(Duration::from_secs(3), 16000);
        let recognizer = MockRecognizer::new().without_interim();

        let pipeline = ConversationPipeline::with_config(recognizer, fast_config());
        let handle = pipeline.start(source).unwrap();
        let outcome = handle.wait().await;

        assert!(outcome.error.is_none(), "unexpected error: {:?}", outcome.error);
        let transcript = outcome.session.transcript();
        assert_eq!(transcript.covered_until(), Duration::from_secs(3));
    }

    #[tokio::test]
    async fn device_start_failure_is_immediate() {
        let source = MockAudioSource::new().with_start_failure();
        let recognizer = MockRecognizer::new();

        let pipeline = ConversationPipeline::with_config(recognizer, fast_config());
        let result = pipeline.start(source);

        assert!(matches!(result, Err(MedscribeError::Device { .. })));
    }

    #[tokio::test]
    async fn device_failure_mid_capture_surfaces_with_partial_transcript() {
        // The source delivers audio, then the device dies.
        let source = MockAudioSource::new()
            .with_samples(vec![0i16; 1600])
            .with_total_duration(Duration::from_secs(2), 16000);
        // Exhaustion is replaced by a read failure on the final call.
        struct DyingSource {
            inner: MockAudioSource,
            reads: u32,
        }
        impl AudioSource for DyingSource {
            fn start(&mut self) -> Result<()> {
                self.inner.start()
            }
            fn stop(&mut self) -> Result<()> {
                self.inner.stop()
            }
            fn read_samples(&mut self) -> Result<Vec<i16>> {
                self.reads += 1;
                if self.reads > 20 {
                    return Err(MedscribeError::Device {
                        message: "microphone disconnected".to_string(),
                    });
                }
                self.inner.read_samples()
            }
        }

        let source = DyingSource {
            inner: source,
            reads: 0,
        };
        let recognizer = MockRecognizer::new().without_interim();
        let pipeline = ConversationPipeline::with_config(recognizer, fast_config());
        let handle = pipeline.start(source).unwrap();
        let outcome = handle.wait().await;

        assert!(matches!(
            outcome.error,
            Some(MedscribeError::Device { .. })
        ));
        // The two seconds delivered before the failure are transcribed.
        assert_eq!(
            outcome.session.transcript().covered_until(),
            Duration::from_secs(2)
        );
    }

    #[tokio::test]
    async fn stop_seals_conversation() {
        let source = MockAudioSource::new().with_samples(vec![0i16; 1600]);
        let recognizer = MockRecognizer::new().without_interim();

        let pipeline = ConversationPipeline::with_config(recognizer, fast_config());
        let handle = pipeline.start(source).unwrap();

        tokio::time::sleep(Duration::from_millis(100)).await;
        handle.stop();
        let outcome = handle.wait().await;

        assert!(outcome.error.is_none());
        assert_eq!(
            outcome.session.status(),
            crate::transcript::ConversationStatus::Stopped
        );
        assert!(!outcome.session.transcript().full_text().is_empty());
    }
}
