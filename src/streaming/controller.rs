//! Streaming session controller.
//!
//! Presents one continuous, ordered transcript stream while internally
//! cycling through bounded recognizer sessions. The controller:
//!
//! - forwards frames from the buffer to the current session
//! - drains each session before the provider's duration cap so trailing
//!   hypotheses finalize cleanly, then opens a successor
//! - replays a short overlap of already-sent audio into each successor so
//!   the words lost with the old session's interim can be re-derived
//! - rebases session-local result offsets onto the conversation timeline
//! - retries failed sessions with exponential backoff, up to a cap
//!
//! All session transitions happen on the controller's own task, so frame
//! dispatch and rotation are atomic: no frame is handed to two sessions and
//! no frame is skipped, apart from the deliberate overlap.

use crate::config::StreamingConfig;
use crate::defaults;
use crate::error::{MedscribeError, Result};
use crate::streaming::buffer::FrameBuffer;
use crate::streaming::frame::AudioFrame;
use crate::streaming::recognizer::{
    AudioSink, RawResult, RecognizerStream, SpeechRecognizer, StreamConfig, StreamEvent,
};
use crate::streaming::session::{SessionState, StreamingSession};
use crate::transcript::{RecognitionResult, TranscriptAggregator};
use std::collections::VecDeque;
use std::time::Duration;
use tokio::sync::{mpsc, watch};
use tokio::time::timeout;
use tracing::{debug, info, trace, warn};

/// Tuning parameters for session rotation and recovery.
#[derive(Debug, Clone)]
pub struct ControllerConfig {
    /// Provider hard cap on one streaming session.
    pub max_session_duration: Duration,
    /// Fraction of the cap at which draining starts.
    pub drain_margin: f64,
    /// Audio tail replayed into each successor session.
    pub overlap: Duration,
    /// Consecutive session failures tolerated before giving up.
    pub max_retries: u32,
    /// Base retry delay; doubles per consecutive failure.
    pub retry_backoff: Duration,
    /// Upper bound for the exponential backoff.
    pub max_backoff: Duration,
    /// Timeout for opening a recognition stream.
    pub connect_timeout: Duration,
    /// Per-call timeout for sends and drain receives.
    pub receive_timeout: Duration,
    /// Maximum frames forwarded per dispatch batch.
    pub batch_max_frames: usize,
    /// Wait bound for one frame batch.
    pub batch_timeout: Duration,
}

impl Default for ControllerConfig {
    fn default() -> Self {
        Self {
            max_session_duration: Duration::from_secs(defaults::MAX_SESSION_SECS),
            drain_margin: defaults::DRAIN_MARGIN,
            overlap: Duration::from_millis(defaults::OVERLAP_MS),
            max_retries: defaults::MAX_RETRIES,
            retry_backoff: Duration::from_millis(defaults::RETRY_BACKOFF_MS),
            max_backoff: Duration::from_millis(defaults::MAX_BACKOFF_MS),
            connect_timeout: Duration::from_secs(defaults::CONNECT_TIMEOUT_SECS),
            receive_timeout: Duration::from_secs(defaults::RECEIVE_TIMEOUT_SECS),
            batch_max_frames: defaults::BATCH_MAX_FRAMES,
            batch_timeout: Duration::from_millis(defaults::BATCH_TIMEOUT_MS),
        }
    }
}

impl From<&StreamingConfig> for ControllerConfig {
    fn from(config: &StreamingConfig) -> Self {
        Self {
            max_session_duration: Duration::from_secs(config.max_session_secs),
            drain_margin: config.drain_margin,
            overlap: Duration::from_millis(config.overlap_ms),
            max_retries: config.max_retries,
            retry_backoff: Duration::from_millis(config.retry_backoff_ms),
            connect_timeout: Duration::from_secs(config.connect_timeout_secs),
            receive_timeout: Duration::from_secs(config.receive_timeout_secs),
            ..Default::default()
        }
    }
}

/// Cross-session conversation state.
#[derive(Debug, Default)]
struct ConversationProgress {
    /// End offset of the last emitted final result.
    committed_end: Duration,
    /// Conversation offset assigned to the next fresh frame.
    next_offset: Duration,
    /// Most recent sent frames, retained for overlap replay.
    overlap_tail: VecDeque<AudioFrame>,
    tail_duration: Duration,
    /// Frames popped from the buffer but not delivered before a session
    /// ended; resent to the successor ahead of fresh frames.
    carryover: VecDeque<AudioFrame>,
}

impl ConversationProgress {
    /// Records a delivered fresh frame and trims the tail to the overlap
    /// window.
    fn record_delivered(
        &mut self,
        frame: AudioFrame,
        duration: Duration,
        overlap: Duration,
        sample_rate: u32,
    ) {
        self.next_offset += duration;
        self.tail_duration += duration;
        self.overlap_tail.push_back(frame);
        while let Some(front) = self.overlap_tail.front() {
            let front_duration =
                crate::streaming::frame::duration_of(front.len(), sample_rate);
            if self.tail_duration.saturating_sub(front_duration) < overlap {
                break;
            }
            self.tail_duration -= front_duration;
            self.overlap_tail.pop_front();
        }
    }
}

/// How a session ended, from the conversation's point of view.
enum SessionOutcome {
    /// Clean close; open a successor and keep going.
    Rotate,
    /// End of input (capture stopped); no successor.
    Stop,
    /// The session errored; the retry path decides what happens next.
    Failed(String),
}

/// Owns one conversation's recognition sessions.
pub struct SessionController<R: SpeechRecognizer> {
    recognizer: R,
    config: ControllerConfig,
    stream_config: StreamConfig,
}

impl<R: SpeechRecognizer> SessionController<R> {
    pub fn new(recognizer: R, config: ControllerConfig, stream_config: StreamConfig) -> Self {
        Self {
            recognizer,
            config,
            stream_config,
        }
    }

    /// Runs the conversation until the buffer reaches end-of-stream or the
    /// stop signal fires.
    ///
    /// Returns `Ok(())` when the final session drained cleanly, or
    /// `MedscribeError::FatalStreaming` after too many consecutive session
    /// failures. The transcript accumulated so far is preserved in the
    /// aggregator either way.
    pub async fn run(
        self,
        buffer: std::sync::Arc<FrameBuffer>,
        aggregator: TranscriptAggregator,
        mut stop_rx: watch::Receiver<bool>,
    ) -> Result<()> {
        let mut progress = ConversationProgress::default();
        let mut consecutive_failures: u32 = 0;
        let mut ordinal: u64 = 0;
        let mut stopping = false;

        loop {
            ordinal += 1;
            let base = progress.next_offset.saturating_sub(progress.tail_duration);
            let mut session = StreamingSession::new(ordinal, base);
            debug!(
                session = ordinal,
                base_ms = base.as_millis() as u64,
                "opening recognition stream"
            );

            let opened = timeout(
                self.config.connect_timeout,
                self.recognizer.open_stream(&self.stream_config),
            )
            .await;
            let stream = match opened {
                Ok(Ok(stream)) => stream,
                Ok(Err(e)) => {
                    session.fail();
                    if self
                        .handle_failure(ordinal, e.to_string(), 0, &mut consecutive_failures, &mut stop_rx)
                        .await?
                    {
                        continue;
                    }
                    return Ok(());
                }
                Err(_) => {
                    session.fail();
                    let message = format!(
                        "connect timed out after {:?}",
                        self.config.connect_timeout
                    );
                    if self
                        .handle_failure(ordinal, message, 0, &mut consecutive_failures, &mut stop_rx)
                        .await?
                    {
                        continue;
                    }
                    return Ok(());
                }
            };

            let RecognizerStream { mut sink, mut events } = stream;

            // Replay the overlap tail so the successor can re-derive the
            // words lost with the predecessor's interim hypothesis. These
            // frames are already accounted for in `next_offset`.
            let mut replay_error = None;
            for frame in progress.overlap_tail.iter() {
                let duration = frame.duration(self.stream_config.sample_rate);
                match timeout(self.config.receive_timeout, sink.send(&frame.samples)).await {
                    Ok(Ok(())) => session.record_sent(duration),
                    Ok(Err(e)) => {
                        replay_error = Some(e.to_string());
                        break;
                    }
                    Err(_) => {
                        replay_error = Some("send timed out during overlap replay".to_string());
                        break;
                    }
                }
            }
            if let Some(message) = replay_error {
                session.fail();
                if self
                    .handle_failure(ordinal, message, 0, &mut consecutive_failures, &mut stop_rx)
                    .await?
                {
                    continue;
                }
                return Ok(());
            }
            session.activate();

            let (outcome, finals_emitted) = self
                .drive_session(
                    &mut session,
                    &mut sink,
                    &mut events,
                    &buffer,
                    &aggregator,
                    &mut progress,
                    &mut stop_rx,
                    &mut stopping,
                )
                .await;

            match outcome {
                SessionOutcome::Rotate => {
                    consecutive_failures = 0;
                    info!(
                        session = ordinal,
                        sent_ms = session.sent.as_millis() as u64,
                        "session rotated"
                    );
                }
                SessionOutcome::Stop => {
                    info!(
                        sessions = ordinal,
                        covered_ms = progress.committed_end.as_millis() as u64,
                        "conversation complete"
                    );
                    return Ok(());
                }
                SessionOutcome::Failed(message) => {
                    session.fail();
                    if !self
                        .handle_failure(
                            ordinal,
                            message,
                            finals_emitted,
                            &mut consecutive_failures,
                            &mut stop_rx,
                        )
                        .await?
                    {
                        return Ok(());
                    }
                }
            }
        }
    }

    /// Retry bookkeeping for a failed session.
    ///
    /// A session that delivered finals made real progress, so it resets the
    /// consecutive-failure streak to one instead of extending it; only
    /// back-to-back fruitless failures escalate to fatal.
    ///
    /// Returns `Ok(true)` to retry, `Ok(false)` when stop was requested
    /// during backoff, or the fatal error once the cap is reached.
    async fn handle_failure(
        &self,
        ordinal: u64,
        message: String,
        finals_emitted: u64,
        consecutive_failures: &mut u32,
        stop_rx: &mut watch::Receiver<bool>,
    ) -> Result<bool> {
        *consecutive_failures = if finals_emitted > 0 {
            1
        } else {
            *consecutive_failures + 1
        };
        if *consecutive_failures >= self.config.max_retries {
            return Err(MedscribeError::FatalStreaming {
                attempts: *consecutive_failures,
                message,
            });
        }

        let exponent = consecutive_failures.saturating_sub(1).min(16);
        let delay = self
            .config
            .retry_backoff
            .saturating_mul(1 << exponent)
            .min(self.config.max_backoff);
        warn!(
            session = ordinal,
            attempt = *consecutive_failures,
            delay_ms = delay.as_millis() as u64,
            error = %message,
            "recognition session failed, retrying"
        );

        tokio::select! {
            _ = tokio::time::sleep(delay) => Ok(true),
            changed = stop_rx.changed() => match changed {
                Ok(()) => Ok(!*stop_rx.borrow()),
                Err(_) => Ok(false),
            },
        }
    }

    /// Runs one active session until it rotates, stops, or fails.
    #[allow(clippy::too_many_arguments)]
    async fn drive_session(
        &self,
        session: &mut StreamingSession,
        sink: &mut Box<dyn AudioSink>,
        events: &mut mpsc::Receiver<StreamEvent>,
        buffer: &FrameBuffer,
        aggregator: &TranscriptAggregator,
        progress: &mut ConversationProgress,
        stop_rx: &mut watch::Receiver<bool>,
        stopping: &mut bool,
    ) -> (SessionOutcome, u64) {
        let mut finals_emitted = 0u64;

        // Frames stranded by the predecessor go out first.
        while let Some(frame) = progress.carryover.pop_front() {
            if let Err(message) = self
                .forward_frame(session, sink, progress, frame, &mut None)
                .await
            {
                if let Some(outcome) =
                    self.settle_pending_events(session, events, progress, aggregator, &mut finals_emitted)
                {
                    return (outcome, finals_emitted);
                }
                return (SessionOutcome::Failed(message), finals_emitted);
            }
        }

        loop {
            if session.should_drain(self.config.max_session_duration, self.config.drain_margin) {
                debug!(
                    session = session.ordinal,
                    sent_ms = session.sent.as_millis() as u64,
                    "session approaching duration cap, draining"
                );
                let outcome = self
                    .drain(session, sink, events, progress, aggregator, &mut finals_emitted, false)
                    .await;
                return (outcome, finals_emitted);
            }

            // Events are drained ahead of new audio so a recognizer that is
            // ahead of us (file transcription runs faster than real time)
            // cannot back up its result channel.
            tokio::select! {
                biased;

                maybe_event = events.recv() => {
                    match maybe_event {
                        None => {
                            return (
                                SessionOutcome::Failed("result stream ended unexpectedly".to_string()),
                                finals_emitted,
                            );
                        }
                        Some(StreamEvent::Result(raw)) => {
                            if self.emit(raw, session.base_offset, progress, aggregator) {
                                finals_emitted += 1;
                            }
                        }
                        Some(StreamEvent::Closed(reason)) => {
                            // Expected when the provider enforces its own cap.
                            info!(session = session.ordinal, ?reason, "provider closed stream");
                            session.close();
                            return (SessionOutcome::Rotate, finals_emitted);
                        }
                        Some(StreamEvent::Error(message)) => {
                            return (SessionOutcome::Failed(message), finals_emitted);
                        }
                    }
                }

                changed = stop_rx.changed(), if !*stopping => {
                    if changed.is_err() || *stop_rx.borrow() {
                        // Capture is shutting down; keep consuming until the
                        // buffer reports end-of-stream so nothing already
                        // recorded is left untranscribed.
                        *stopping = true;
                    }
                }

                maybe_batch = buffer.pop_batch(self.config.batch_max_frames, self.config.batch_timeout) => {
                    match maybe_batch {
                        None => {
                            let outcome = self
                                .drain(session, sink, events, progress, aggregator, &mut finals_emitted, true)
                                .await;
                            return (outcome, finals_emitted);
                        }
                        Some(frames) => {
                            let mut frames = VecDeque::from(frames);
                            while let Some(frame) = frames.pop_front() {
                                let mut failed_frame = None;
                                if let Err(message) = self
                                    .forward_frame(session, sink, progress, frame, &mut failed_frame)
                                    .await
                                {
                                    // The undelivered frames belong to the successor.
                                    if let Some(frame) = failed_frame {
                                        progress.carryover.push_back(frame);
                                    }
                                    progress.carryover.extend(frames.drain(..));
                                    if let Some(outcome) = self.settle_pending_events(
                                        session, events, progress, aggregator, &mut finals_emitted,
                                    ) {
                                        return (outcome, finals_emitted);
                                    }
                                    return (SessionOutcome::Failed(message), finals_emitted);
                                }
                            }
                        }
                    }
                }
            }
        }
    }

    /// Delivers one fresh frame and updates conversation accounting.
    ///
    /// On failure the frame is handed back through `failed_frame` so it can
    /// be carried over to the successor session.
    async fn forward_frame(
        &self,
        session: &mut StreamingSession,
        sink: &mut Box<dyn AudioSink>,
        progress: &mut ConversationProgress,
        frame: AudioFrame,
        failed_frame: &mut Option<AudioFrame>,
    ) -> std::result::Result<(), String> {
        let duration = frame.duration(self.stream_config.sample_rate);
        match timeout(self.config.receive_timeout, sink.send(&frame.samples)).await {
            Ok(Ok(())) => {
                session.record_sent(duration);
                progress.record_delivered(
                    frame,
                    duration,
                    self.config.overlap,
                    self.stream_config.sample_rate,
                );
                Ok(())
            }
            Ok(Err(e)) => {
                *failed_frame = Some(frame);
                Err(e.to_string())
            }
            Err(_) => {
                *failed_frame = Some(frame);
                Err("send timed out".to_string())
            }
        }
    }

    /// Consumes already-queued events after a send failure.
    ///
    /// A send can fail because the provider closed the stream a moment
    /// earlier; in that case the close event is already waiting and the
    /// rotation is clean rather than a failure.
    fn settle_pending_events(
        &self,
        session: &mut StreamingSession,
        events: &mut mpsc::Receiver<StreamEvent>,
        progress: &mut ConversationProgress,
        aggregator: &TranscriptAggregator,
        finals_emitted: &mut u64,
    ) -> Option<SessionOutcome> {
        loop {
            match events.try_recv() {
                Ok(StreamEvent::Result(raw)) => {
                    if self.emit(raw, session.base_offset, progress, aggregator) {
                        *finals_emitted += 1;
                    }
                }
                Ok(StreamEvent::Closed(reason)) => {
                    info!(session = session.ordinal, ?reason, "provider closed stream");
                    session.close();
                    return Some(SessionOutcome::Rotate);
                }
                Ok(StreamEvent::Error(message)) => {
                    return Some(SessionOutcome::Failed(message));
                }
                Err(_) => return None,
            }
        }
    }

    /// Half-closes the session and flushes its remaining results.
    ///
    /// Used both for rotation ahead of the provider cap and for the final
    /// session when recording stops. Errors here are logged but not
    /// escalated: the audio was already delivered, and anything the provider
    /// fails to finalize is re-derived from the overlap replay.
    async fn drain(
        &self,
        session: &mut StreamingSession,
        sink: &mut Box<dyn AudioSink>,
        events: &mut mpsc::Receiver<StreamEvent>,
        progress: &mut ConversationProgress,
        aggregator: &TranscriptAggregator,
        finals_emitted: &mut u64,
        end_of_stream: bool,
    ) -> SessionOutcome {
        if session.state() == SessionState::Active {
            session.begin_drain();
        }

        if let Ok(Err(e)) = timeout(self.config.receive_timeout, sink.finish()).await {
            debug!(session = session.ordinal, error = %e, "half-close failed");
        }

        loop {
            match timeout(self.config.receive_timeout, events.recv()).await {
                Err(_) => {
                    warn!(
                        session = session.ordinal,
                        "timed out waiting for drain to complete"
                    );
                    break;
                }
                Ok(None) => break,
                Ok(Some(StreamEvent::Result(raw))) => {
                    if self.emit(raw, session.base_offset, progress, aggregator) {
                        *finals_emitted += 1;
                    }
                }
                Ok(Some(StreamEvent::Closed(reason))) => {
                    trace!(session = session.ordinal, ?reason, "stream closed");
                    break;
                }
                Ok(Some(StreamEvent::Error(message))) => {
                    warn!(session = session.ordinal, error = %message, "error during drain");
                    break;
                }
            }
        }

        session.close();
        if end_of_stream {
            SessionOutcome::Stop
        } else {
            SessionOutcome::Rotate
        }
    }

    /// Rebases a session-local result onto the conversation timeline and
    /// forwards it to the aggregator. Returns true if a final was emitted.
    ///
    /// Finals entirely inside the committed region are re-derivations of
    /// replayed overlap audio and are suppressed; a final straddling the
    /// boundary has its start clamped so finalized offsets never move
    /// backwards.
    fn emit(
        &self,
        raw: RawResult,
        base: Duration,
        progress: &mut ConversationProgress,
        aggregator: &TranscriptAggregator,
    ) -> bool {
        let start = base + raw.start_offset;
        let end = base + raw.end_offset;

        if end <= progress.committed_end {
            trace!(
                start_ms = start.as_millis() as u64,
                end_ms = end.as_millis() as u64,
                "suppressing result inside committed region"
            );
            return false;
        }
        let start = start.max(progress.committed_end);

        if raw.is_final {
            progress.committed_end = end;
            aggregator.on_result(RecognitionResult {
                text: raw.text,
                is_final: true,
                confidence: raw.confidence,
                start_offset: start,
                end_offset: end,
            });
            true
        } else {
            aggregator.on_result(RecognitionResult {
                text: raw.text,
                is_final: false,
                confidence: raw.confidence,
                start_offset: start,
                end_offset: end,
            });
            false
        }
    }
}
