//! Per-session state machine and bookkeeping.
//!
//! One `StreamingSession` tracks a single bounded-duration connection to the
//! recognizer. Sessions within a conversation are strictly sequential: a
//! successor is only created after its predecessor reaches a terminal state.

use std::time::{Duration, Instant};

/// Lifecycle of one recognition session.
///
/// `Starting → Active → Draining → Closed`, with `Failed` reachable from
/// `Starting` and `Active`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    /// Handshake sent; no results yet.
    Starting,
    /// Frames are being forwarded and results received.
    Active,
    /// Half-closed ahead of the provider's duration cap; flushing results.
    Draining,
    /// Finished normally; a successor may be created.
    Closed,
    /// Errored; the retry/resume path takes over.
    Failed,
}

impl SessionState {
    pub fn as_str(&self) -> &'static str {
        match self {
            SessionState::Starting => "starting",
            SessionState::Active => "active",
            SessionState::Draining => "draining",
            SessionState::Closed => "closed",
            SessionState::Failed => "failed",
        }
    }

    /// Terminal states cannot transition further.
    pub fn is_terminal(&self) -> bool {
        matches!(self, SessionState::Closed | SessionState::Failed)
    }
}

/// Bookkeeping for one recognition session.
#[derive(Debug)]
pub struct StreamingSession {
    /// Ordinal of this session within its conversation (1-based).
    pub ordinal: u64,
    /// Conversation-time position of the first sample sent to this session.
    ///
    /// Session-local result offsets are rebased by this amount.
    pub base_offset: Duration,
    /// Cumulative audio forwarded to this session.
    pub sent: Duration,
    state: SessionState,
    started_at: Instant,
}

impl StreamingSession {
    pub fn new(ordinal: u64, base_offset: Duration) -> Self {
        Self {
            ordinal,
            base_offset,
            sent: Duration::ZERO,
            state: SessionState::Starting,
            started_at: Instant::now(),
        }
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn elapsed(&self) -> Duration {
        self.started_at.elapsed()
    }

    /// Conversation-time position just past the last sample sent.
    pub fn end_offset(&self) -> Duration {
        self.base_offset + self.sent
    }

    /// Records `duration` of audio as forwarded.
    pub fn record_sent(&mut self, duration: Duration) {
        self.sent += duration;
    }

    /// Whether this session has carried enough audio to start draining.
    ///
    /// Draining begins at `margin` of the provider cap so the trailing
    /// hypothesis finalizes instead of being cut off.
    pub fn should_drain(&self, max_session_duration: Duration, margin: f64) -> bool {
        self.state == SessionState::Active
            && self.sent >= max_session_duration.mul_f64(margin)
    }

    /// `Starting → Active`: the handshake completed.
    pub fn activate(&mut self) {
        debug_assert_eq!(self.state, SessionState::Starting);
        self.state = SessionState::Active;
    }

    /// `Active → Draining`: half-close requested.
    pub fn begin_drain(&mut self) {
        debug_assert_eq!(self.state, SessionState::Active);
        self.state = SessionState::Draining;
    }

    /// `Active | Draining → Closed`: the stream ended cleanly.
    pub fn close(&mut self) {
        debug_assert!(matches!(
            self.state,
            SessionState::Active | SessionState::Draining
        ));
        self.state = SessionState::Closed;
    }

    /// `Starting | Active → Failed`: the stream errored.
    pub fn fail(&mut self) {
        debug_assert!(!self.state.is_terminal());
        self.state = SessionState::Failed;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn normal_lifecycle() {
        let mut session = StreamingSession::new(1, Duration::ZERO);
        assert_eq!(session.state(), SessionState::Starting);

        session.activate();
        assert_eq!(session.state(), SessionState::Active);

        session.begin_drain();
        assert_eq!(session.state(), SessionState::Draining);

        session.close();
        assert_eq!(session.state(), SessionState::Closed);
        assert!(session.state().is_terminal());
    }

    #[test]
    fn failure_from_starting() {
        let mut session = StreamingSession::new(1, Duration::ZERO);
        session.fail();
        assert_eq!(session.state(), SessionState::Failed);
        assert!(session.state().is_terminal());
    }

    #[test]
    fn sent_accumulates_and_rebases() {
        let mut session = StreamingSession::new(2, Duration::from_secs(100));
        session.record_sent(Duration::from_millis(500));
        session.record_sent(Duration::from_millis(1500));

        assert_eq!(session.sent, Duration::from_secs(2));
        assert_eq!(session.end_offset(), Duration::from_secs(102));
    }

    #[test]
    fn drain_threshold_uses_margin() {
        let mut session = StreamingSession::new(1, Duration::ZERO);
        session.activate();

        let cap = Duration::from_secs(100);
        session.record_sent(Duration::from_secs(89));
        assert!(!session.should_drain(cap, 0.9));

        session.record_sent(Duration::from_secs(1));
        assert!(session.should_drain(cap, 0.9));
    }

    #[test]
    fn starting_session_never_drains() {
        let mut session = StreamingSession::new(1, Duration::ZERO);
        session.record_sent(Duration::from_secs(1000));
        assert!(!session.should_drain(Duration::from_secs(10), 0.9));
    }

    #[test]
    fn state_names() {
        assert_eq!(SessionState::Starting.as_str(), "starting");
        assert_eq!(SessionState::Draining.as_str(), "draining");
        assert_eq!(SessionState::Failed.as_str(), "failed");
    }
}
