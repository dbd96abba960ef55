//! Default configuration constants for medscribe.
//!
//! This module provides shared constants used across different configuration types
//! to ensure consistency and eliminate duplication.

/// Default audio sample rate in Hz.
///
/// 16kHz is the standard for speech recognition and provides a good balance
/// between quality and network bandwidth for streamed voice audio.
pub const SAMPLE_RATE: u32 = 16000;

/// Default capture frame duration in milliseconds.
///
/// 100ms frames keep streaming latency low while staying well above the
/// per-message overhead of the recognizer socket.
pub const FRAME_DURATION_MS: u32 = 100;

/// Default frame buffer capacity in seconds of audio.
///
/// Bounds how far the network side may fall behind the microphone before
/// backpressure kicks in.
pub const BUFFER_SECS: u64 = 5;

/// Default maximum duration of a single recognition session in seconds.
///
/// Cloud streaming recognizers enforce a hard per-session cap (typically a
/// few minutes) after which they force-close the stream. Sessions are
/// rotated before this limit is reached.
pub const MAX_SESSION_SECS: u64 = 240;

/// Fraction of `MAX_SESSION_SECS` at which a session starts draining.
///
/// Draining early forces the trailing hypothesis to finalize cleanly instead
/// of being cut off mid-word by the provider.
pub const DRAIN_MARGIN: f64 = 0.9;

/// Default audio overlap re-sent to a successor session, in milliseconds.
///
/// Rotating sessions loses any interim hypothesis of the outgoing session.
/// The tail of already-sent audio is replayed into the new session so the
/// dropped words can be re-derived.
pub const OVERLAP_MS: u64 = 1500;

/// Default maximum number of consecutive session failures before giving up.
pub const MAX_RETRIES: u32 = 4;

/// Default base delay between session retries, in milliseconds.
///
/// Doubles per consecutive failure, capped at `MAX_BACKOFF_MS`.
pub const RETRY_BACKOFF_MS: u64 = 500;

/// Cap for the exponential retry backoff, in milliseconds.
pub const MAX_BACKOFF_MS: u64 = 8000;

/// Default recognizer connect timeout in seconds.
pub const CONNECT_TIMEOUT_SECS: u64 = 10;

/// Default per-receive timeout on the recognizer result stream, in seconds.
///
/// Exceeding it marks the session failed rather than hanging silently.
pub const RECEIVE_TIMEOUT_SECS: u64 = 30;

/// Default maximum number of frames forwarded per dispatch batch.
pub const BATCH_MAX_FRAMES: usize = 10;

/// Default timeout for one frame-batch wait, in milliseconds.
///
/// Keeps the controller responsive to recognizer events and stop signals
/// while the microphone is quiet.
pub const BATCH_TIMEOUT_MS: u64 = 100;

/// Default recognition language (BCP-47).
pub const DEFAULT_LANGUAGE: &str = "en-US";

/// Default generative model for report generation.
pub const REPORT_MODEL: &str = "gemini-2.0-flash";

/// Default maximum number of report-generation attempts.
pub const REPORT_MAX_RETRIES: u32 = 3;

/// Number of samples in one capture frame at the default rate.
pub const fn frame_samples(sample_rate: u32) -> usize {
    (sample_rate as usize * FRAME_DURATION_MS as usize) / 1000
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn frame_samples_at_default_rate() {
        assert_eq!(frame_samples(SAMPLE_RATE), 1600);
    }

    #[test]
    fn drain_margin_is_a_fraction() {
        assert!(DRAIN_MARGIN > 0.0 && DRAIN_MARGIN < 1.0);
    }
}
