//! Cloud streaming recognizer client.
//!
//! Speaks the provider's bidirectional WebSocket contract: a JSON config
//! message opens the stream, binary PCM chunks follow, and the server
//! answers with JSON result messages tagged interim/final. The server
//! force-closes the stream when its per-session duration cap is reached;
//! the controller treats that close as an expected rotation trigger.

use crate::config::StreamingConfig;
use crate::error::{MedscribeError, Result};
use crate::streaming::recognizer::{
    AudioSink, CloseReason, RawResult, RecognizerStream, SpeechRecognizer, StreamConfig,
    StreamEvent,
};
use async_trait::async_trait;
use futures_util::stream::SplitSink;
use futures_util::{SinkExt, StreamExt};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream, connect_async};
use tracing::{debug, trace, warn};

type WsWriter = SplitSink<WebSocketStream<MaybeTlsStream<TcpStream>>, Message>;

/// Recognition parameters sent as the opening handshake.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
struct WireRecognitionConfig {
    /// Encoding of the audio data.
    encoding: &'static str,
    /// Sample rate of the audio in Hertz.
    sample_rate_hertz: u32,
    /// BCP-47 language code (e.g. "en-US").
    language_code: String,
    /// Whether the provider should emit interim hypotheses.
    interim_results: bool,
}

/// First client message: `{"config": {...}}`.
#[derive(Debug, Serialize)]
struct ClientHello<'a> {
    config: &'a WireRecognitionConfig,
}

/// Half-close control message: `{"finish": true}`.
#[derive(Debug, Serialize)]
struct ClientFinish {
    finish: bool,
}

/// A single recognition result within a server message.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
struct WireResult {
    #[serde(default)]
    transcript: String,
    #[serde(default)]
    is_final: bool,
    /// Confidence score (0.0 to 1.0); absent on interim results.
    #[serde(default)]
    confidence: f32,
    /// Start of the covered audio in milliseconds, stream-local.
    #[serde(default)]
    start_time_ms: u64,
    /// End of the covered audio in milliseconds, stream-local.
    #[serde(default)]
    end_time_ms: u64,
}

/// Server-initiated close notice.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
struct WireClose {
    #[serde(default)]
    reason: String,
}

/// Server-reported error.
#[derive(Debug, Clone, Deserialize)]
struct WireError {
    #[serde(default)]
    message: String,
}

/// One message from the server; exactly one field is populated.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ServerMessage {
    #[serde(default)]
    result: Option<WireResult>,
    #[serde(default)]
    close: Option<WireClose>,
    #[serde(default)]
    error: Option<WireError>,
}

/// WebSocket client for the streaming speech provider.
pub struct CloudRecognizer {
    endpoint: String,
    api_key: Option<String>,
}

impl CloudRecognizer {
    pub fn new(endpoint: &str, api_key: Option<String>) -> Self {
        Self {
            endpoint: endpoint.to_string(),
            api_key,
        }
    }

    pub fn from_config(config: &StreamingConfig) -> Self {
        Self::new(&config.endpoint, config.api_key.clone())
    }

    fn url(&self) -> String {
        match &self.api_key {
            Some(key) => format!("{}?key={}", self.endpoint, key),
            None => self.endpoint.clone(),
        }
    }
}

#[async_trait]
impl SpeechRecognizer for CloudRecognizer {
    async fn open_stream(&self, config: &StreamConfig) -> Result<RecognizerStream> {
        let (socket, _response) =
            connect_async(self.url())
                .await
                .map_err(|e| MedscribeError::Session {
                    message: format!("failed to connect to recognizer: {}", e),
                })?;
        let (mut writer, reader) = socket.split();

        let wire_config = WireRecognitionConfig {
            encoding: "LINEAR16",
            sample_rate_hertz: config.sample_rate,
            language_code: config.language.clone(),
            interim_results: config.interim_results,
        };
        let hello = serde_json::to_string(&ClientHello {
            config: &wire_config,
        })
        .map_err(|e| MedscribeError::Session {
            message: format!("failed to encode stream config: {}", e),
        })?;
        writer
            .send(Message::Text(hello.into()))
            .await
            .map_err(|e| MedscribeError::Session {
                message: format!("failed to send stream config: {}", e),
            })?;
        debug!(endpoint = %self.endpoint, "recognition stream opened");

        let (event_tx, event_rx) = mpsc::channel(64);
        tokio::spawn(receive_loop(reader, event_tx));

        Ok(RecognizerStream {
            sink: Box::new(CloudSink { writer }),
            events: event_rx,
        })
    }
}

/// Translates incoming WebSocket messages into stream events.
async fn receive_loop(
    mut reader: futures_util::stream::SplitStream<WebSocketStream<MaybeTlsStream<TcpStream>>>,
    events: mpsc::Sender<StreamEvent>,
) {
    while let Some(message) = reader.next().await {
        match message {
            Ok(Message::Text(text)) => {
                let parsed: ServerMessage = match serde_json::from_str(text.as_str()) {
                    Ok(parsed) => parsed,
                    Err(e) => {
                        warn!(error = %e, "unparseable message from recognizer");
                        continue;
                    }
                };
                if let Some(result) = parsed.result {
                    let event = StreamEvent::Result(RawResult {
                        text: result.transcript,
                        is_final: result.is_final,
                        confidence: result.confidence,
                        start_offset: Duration::from_millis(result.start_time_ms),
                        end_offset: Duration::from_millis(result.end_time_ms),
                    });
                    if events.send(event).await.is_err() {
                        return;
                    }
                }
                if let Some(close) = parsed.close {
                    let reason = match close.reason.as_str() {
                        "durationLimit" => CloseReason::DurationLimit,
                        _ => CloseReason::Finished,
                    };
                    let _ = events.send(StreamEvent::Closed(reason)).await;
                    return;
                }
                if let Some(error) = parsed.error {
                    let _ = events.send(StreamEvent::Error(error.message)).await;
                    return;
                }
            }
            Ok(Message::Close(frame)) => {
                trace!(?frame, "websocket closed by server");
                let _ = events.send(StreamEvent::Closed(CloseReason::Finished)).await;
                return;
            }
            // Ping/pong and binary frames carry no results.
            Ok(_) => {}
            Err(e) => {
                let _ = events.send(StreamEvent::Error(e.to_string())).await;
                return;
            }
        }
    }
    // Reader ended without an explicit close message.
    let _ = events.send(StreamEvent::Closed(CloseReason::Finished)).await;
}

struct CloudSink {
    writer: WsWriter,
}

#[async_trait]
impl AudioSink for CloudSink {
    async fn send(&mut self, samples: &[i16]) -> Result<()> {
        let mut bytes = Vec::with_capacity(samples.len() * 2);
        for sample in samples {
            bytes.extend_from_slice(&sample.to_le_bytes());
        }
        self.writer
            .send(Message::Binary(bytes.into()))
            .await
            .map_err(|e| MedscribeError::Session {
                message: format!("failed to send audio: {}", e),
            })
    }

    async fn finish(&mut self) -> Result<()> {
        let finish = serde_json::to_string(&ClientFinish { finish: true }).map_err(|e| {
            MedscribeError::Session {
                message: format!("failed to encode finish message: {}", e),
            }
        })?;
        self.writer
            .send(Message::Text(finish.into()))
            .await
            .map_err(|e| MedscribeError::Session {
                message: format!("failed to half-close stream: {}", e),
            })
    }
}
