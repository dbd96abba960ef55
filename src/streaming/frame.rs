//! Audio frame type flowing from capture into the streaming controller.

use std::time::{Duration, Instant};

/// Fixed-size block of PCM audio with metadata for ordering and timing.
#[derive(Debug, Clone)]
pub struct AudioFrame {
    /// Sequence number for ordering frames.
    pub sequence: u64,
    /// Timestamp when the audio was captured.
    pub captured_at: Instant,
    /// Audio samples as 16-bit PCM.
    pub samples: Vec<i16>,
}

impl AudioFrame {
    /// Creates a new audio frame stamped with the current time.
    pub fn new(sequence: u64, samples: Vec<i16>) -> Self {
        Self {
            sequence,
            captured_at: Instant::now(),
            samples,
        }
    }

    /// Returns the duration of audio in this frame.
    pub fn duration(&self, sample_rate: u32) -> Duration {
        duration_of(self.samples.len(), sample_rate)
    }

    /// Returns the number of samples in this frame.
    pub fn len(&self) -> usize {
        self.samples.len()
    }

    /// Returns true if the frame carries no samples.
    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }
}

/// Exact duration of `samples` PCM samples at `sample_rate`.
///
/// Integer nanosecond arithmetic, so offsets accumulated from frame counts
/// stay exact instead of drifting through float rounding.
pub fn duration_of(samples: usize, sample_rate: u32) -> Duration {
    Duration::from_nanos((samples as u64 * 1_000_000_000) / sample_rate as u64)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_audio_frame_creation() {
        let samples = vec![100i16, 200, 300];
        let frame = AudioFrame::new(42, samples.clone());

        assert_eq!(frame.sequence, 42);
        assert_eq!(frame.samples, samples);
    }

    #[test]
    fn test_audio_frame_duration() {
        let samples = vec![0i16; 16000]; // 1 second at 16kHz
        let frame = AudioFrame::new(0, samples);

        assert_eq!(frame.duration(16000), Duration::from_secs(1));
    }

    #[test]
    fn test_audio_frame_len() {
        let frame = AudioFrame::new(0, vec![0i16; 1600]);
        assert_eq!(frame.len(), 1600);
        assert!(!frame.is_empty());

        let empty = AudioFrame::new(1, Vec::new());
        assert!(empty.is_empty());
    }
}
