use crate::defaults;
use crate::error::{MedscribeError, Result};

/// Trait for audio source devices.
///
/// This trait allows swapping implementations (real audio device, WAV file,
/// or mock).
pub trait AudioSource: Send + Sync {
    /// Start capturing audio from the source.
    ///
    /// # Returns
    /// Ok(()) if the source started successfully, or an error
    fn start(&mut self) -> Result<()>;

    /// Stop capturing audio from the source.
    ///
    /// # Returns
    /// Ok(()) if the source stopped successfully, or an error
    fn stop(&mut self) -> Result<()>;

    /// Read audio samples from the source.
    ///
    /// # Returns
    /// Vector of 16-bit PCM audio samples, or an error. An empty vector
    /// means no samples are available right now.
    fn read_samples(&mut self) -> Result<Vec<i16>>;

    /// Whether the source can still produce samples.
    ///
    /// Live devices stay active until stopped; finite sources (WAV files)
    /// report `false` once exhausted.
    fn is_active(&self) -> bool {
        true
    }
}

/// Configuration for audio source initialization
#[derive(Debug, Clone)]
pub struct AudioSourceConfig {
    pub sample_rate: u32,
}

impl Default for AudioSourceConfig {
    fn default() -> Self {
        Self {
            sample_rate: defaults::SAMPLE_RATE,
        }
    }
}

/// Mock audio source for testing
#[derive(Debug, Clone)]
pub struct MockAudioSource {
    is_started: bool,
    samples: Vec<i16>,
    /// Remaining reads before the source reports exhaustion; None = endless.
    reads_remaining: Option<u64>,
    should_fail_start: bool,
    should_fail_read: bool,
    error_message: String,
}

impl MockAudioSource {
    /// Create a new mock audio source with default settings
    pub fn new() -> Self {
        Self {
            is_started: false,
            samples: vec![0i16; defaults::frame_samples(defaults::SAMPLE_RATE)],
            reads_remaining: None,
            should_fail_start: false,
            should_fail_read: false,
            error_message: "mock audio error".to_string(),
        }
    }

    /// Configure the mock to return specific samples per read
    pub fn with_samples(mut self, samples: Vec<i16>) -> Self {
        self.samples = samples;
        self
    }

    /// Configure the mock to exhaust after producing `duration` of audio.
    ///
    /// Uses the configured per-read sample count to convert duration into
    /// a read budget.
    pub fn with_total_duration(mut self, duration: std::time::Duration, sample_rate: u32) -> Self {
        let total_samples = (duration.as_secs_f64() * sample_rate as f64) as u64;
        let per_read = self.samples.len().max(1) as u64;
        self.reads_remaining = Some(total_samples.div_ceil(per_read));
        self
    }

    /// Configure the mock to fail on start
    pub fn with_start_failure(mut self) -> Self {
        self.should_fail_start = true;
        self
    }

    /// Configure the mock to fail on read
    pub fn with_read_failure(mut self) -> Self {
        self.should_fail_read = true;
        self
    }

    /// Configure the error message for failures
    pub fn with_error_message(mut self, message: &str) -> Self {
        self.error_message = message.to_string();
        self
    }

    /// Check if the audio source is started
    pub fn is_started(&self) -> bool {
        self.is_started
    }
}

impl Default for MockAudioSource {
    fn default() -> Self {
        Self::new()
    }
}

impl AudioSource for MockAudioSource {
    fn start(&mut self) -> Result<()> {
        if self.should_fail_start {
            Err(MedscribeError::Device {
                message: self.error_message.clone(),
            })
        } else {
            self.is_started = true;
            Ok(())
        }
    }

    fn stop(&mut self) -> Result<()> {
        self.is_started = false;
        Ok(())
    }

    fn read_samples(&mut self) -> Result<Vec<i16>> {
        if self.should_fail_read {
            return Err(MedscribeError::Device {
                message: self.error_message.clone(),
            });
        }
        match self.reads_remaining {
            Some(0) => Ok(Vec::new()),
            Some(ref mut remaining) => {
                *remaining -= 1;
                Ok(self.samples.clone())
            }
            None => Ok(self.samples.clone()),
        }
    }

    fn is_active(&self) -> bool {
        self.reads_remaining != Some(0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn test_mock_returns_configured_samples() {
        let test_samples = vec![100i16, 200, 300, 400, 500];
        let mut source = MockAudioSource::new().with_samples(test_samples.clone());

        let result = source.read_samples();

        assert!(result.is_ok());
        assert_eq!(result.unwrap(), test_samples);
    }

    #[test]
    fn test_mock_default_samples_are_one_frame() {
        let mut source = MockAudioSource::new();

        let samples = source.read_samples().unwrap();
        assert_eq!(samples.len(), 1600);
        assert!(samples.iter().all(|&s| s == 0));
    }

    #[test]
    fn test_mock_read_error_when_configured() {
        let mut source = MockAudioSource::new()
            .with_read_failure()
            .with_error_message("buffer overflow");

        let result = source.read_samples();

        match result {
            Err(MedscribeError::Device { message }) => {
                assert_eq!(message, "buffer overflow");
            }
            _ => panic!("Expected Device error"),
        }
    }

    #[test]
    fn test_mock_start_stop_state_management() {
        let mut source = MockAudioSource::new();

        assert!(!source.is_started());

        source.start().unwrap();
        assert!(source.is_started());

        source.stop().unwrap();
        assert!(!source.is_started());
    }

    #[test]
    fn test_mock_start_failure() {
        let mut source = MockAudioSource::new().with_start_failure();

        let result = source.start();

        assert!(result.is_err());
        assert!(!source.is_started());
        match result {
            Err(MedscribeError::Device { message }) => {
                assert_eq!(message, "mock audio error");
            }
            _ => panic!("Expected Device error"),
        }
    }

    #[test]
    fn test_mock_finite_duration_exhausts() {
        // 2 reads of 1600 samples at 16 kHz = 200 ms of audio
        let mut source = MockAudioSource::new()
            .with_samples(vec![1i16; 1600])
            .with_total_duration(Duration::from_millis(200), 16000);

        assert!(source.is_active());
        assert_eq!(source.read_samples().unwrap().len(), 1600);
        assert_eq!(source.read_samples().unwrap().len(), 1600);

        // Exhausted: empty reads, inactive
        assert_eq!(source.read_samples().unwrap().len(), 0);
        assert!(!source.is_active());
    }

    #[test]
    fn test_mock_endless_by_default() {
        let mut source = MockAudioSource::new().with_samples(vec![1i16, 2, 3]);

        for _ in 0..10 {
            assert_eq!(source.read_samples().unwrap(), vec![1i16, 2, 3]);
        }
        assert!(source.is_active());
    }

    #[test]
    fn test_audio_source_config_default() {
        let config = AudioSourceConfig::default();
        assert_eq!(config.sample_rate, 16000);
    }

    #[test]
    fn test_audio_source_trait_is_object_safe() {
        // Verify that we can use Box<dyn AudioSource>
        let source: Box<dyn AudioSource> =
            Box::new(MockAudioSource::new().with_samples(vec![1i16, 2, 3, 4, 5]));

        let mut boxed_source = source;
        assert!(boxed_source.start().is_ok());
        assert_eq!(boxed_source.read_samples().unwrap(), vec![1i16, 2, 3, 4, 5]);
        assert!(boxed_source.stop().is_ok());
    }

    #[test]
    fn test_mock_builder_pattern() {
        // Test that builder pattern methods can be chained
        let mut source = MockAudioSource::new()
            .with_samples(vec![10i16, 20, 30])
            .with_error_message("custom error")
            .with_samples(vec![40i16, 50, 60]);

        let result = source.read_samples().unwrap();
        assert_eq!(result, vec![40i16, 50, 60]);
    }
}
