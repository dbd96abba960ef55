//! Audio capture sources.

#[cfg(feature = "cpal-audio")]
pub mod capture;
pub mod source;
pub mod wav;

pub use source::{AudioSource, AudioSourceConfig, MockAudioSource};
pub use wav::WavAudioSource;
