//! Continuous streaming transcription.
//!
//! One conversation is transcribed through a sequence of bounded recognizer
//! sessions:
//!
//! ```text
//! ┌─────────┐    ┌──────────────┐    ┌────────────────────┐    ┌────────────┐
//! │ Capture │───▶│ Frame Buffer │───▶│ Session Controller │───▶│ Aggregator │
//! └─────────┘    └──────────────┘    │  session 1 ──┐     │    └────────────┘
//!                                    │  session 2 ◀─┘ ... │
//!                                    └────────────────────┘
//!                                      (overlap replayed
//!                                       across rotations)
//! ```

pub mod buffer;
pub mod cloud;
pub mod controller;
pub mod frame;
pub mod pipeline;
pub mod recognizer;
pub mod session;

pub use buffer::{FrameBuffer, FrameBufferConfig};
pub use cloud::CloudRecognizer;
pub use controller::{ControllerConfig, SessionController};
pub use frame::AudioFrame;
pub use pipeline::{ConversationOutcome, ConversationPipeline, PipelineConfig, PipelineHandle};
pub use recognizer::{
    AudioSink, CloseReason, MockRecognizer, RawResult, RecognizerStream, SpeechRecognizer,
    StreamConfig, StreamEvent,
};
pub use session::{SessionState, StreamingSession};
