//! Gemini Live conversational session.
//!
//! Opens a BidiGenerateContent websocket, sends the setup frame with the
//! persona/memory instructions, and then runs a receive loop that turns
//! streamed transcriptions into [`TranscriptFragment`]s for the registered
//! observer. The session carries text turns only: model audio frames are
//! dropped and no microphone audio is forwarded.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use futures::SinkExt;
use futures::stream::{SplitSink, StreamExt};
use tokio::net::TcpStream;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tokio_tungstenite::tungstenite::Message as WsMessage;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream};
use tracing::{debug, info, warn};

use studymate_traits::{
    ConversationConfig, ConversationService, ConversationSession, TranscriptObserver,
};

use super::protocol::{self, ServerMessage, TranscriptAccumulator};
use crate::error::{AiError, Result};

const DEFAULT_ENDPOINT: &str = concat!(
    "wss://generativelanguage.googleapis.com/ws/",
    "google.ai.generativelanguage.v1beta.GenerativeService.BidiGenerateContent"
);
const DEFAULT_MODEL: &str = "gemini-2.0-flash-exp";

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;
type WsWriter = SplitSink<WsStream, WsMessage>;

#[derive(Debug, Clone)]
pub struct GeminiLiveConfig {
    pub api_key: String,
    pub model: String,
    pub endpoint: String,
    /// How long to wait for `setupComplete` before giving up.
    pub setup_timeout: Duration,
}

impl GeminiLiveConfig {
    pub fn new(api_key: impl Into<String>) -> Self {
        Self {
            api_key: api_key.into(),
            model: DEFAULT_MODEL.to_string(),
            endpoint: DEFAULT_ENDPOINT.to_string(),
            setup_timeout: Duration::from_secs(10),
        }
    }

    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = model.into();
        self
    }

    pub fn with_endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.endpoint = endpoint.into();
        self
    }

    pub fn with_setup_timeout(mut self, timeout: Duration) -> Self {
        self.setup_timeout = timeout;
        self
    }
}

pub struct GeminiLiveService {
    config: GeminiLiveConfig,
}

impl GeminiLiveService {
    pub fn new(config: GeminiLiveConfig) -> Self {
        Self { config }
    }

    pub async fn connect(
        &self,
        session_config: &ConversationConfig,
        observer: Arc<dyn TranscriptObserver>,
    ) -> Result<GeminiLiveSession> {
        let url = format!("{}?key={}", self.config.endpoint, self.config.api_key);
        let (stream, _) = tokio_tungstenite::connect_async(url.as_str()).await?;
        let (mut writer, mut reader) = stream.split();

        let setup = protocol::setup_message(&self.config.model, session_config);
        writer.send(WsMessage::Text(setup.to_string().into())).await?;

        let handshake = async {
            while let Some(frame) = reader.next().await {
                let frame = frame?;
                if let WsMessage::Close(close) = &frame {
                    return Err(AiError::Realtime(format!(
                        "server closed during setup: {:?}",
                        close
                    )));
                }
                if let Some(message) = parse_frame(&frame)
                    && message.setup_complete.is_some()
                {
                    return Ok(());
                }
            }
            Err(AiError::Realtime(
                "connection ended before setup completed".to_string(),
            ))
        };
        tokio::time::timeout(self.config.setup_timeout, handshake)
            .await
            .map_err(|_| AiError::Realtime("timed out waiting for setupComplete".to_string()))??;

        info!(
            room = %session_config.room_name,
            model = %self.config.model,
            language = %session_config.language,
            "Gemini Live session ready"
        );

        let closed = Arc::new(AtomicBool::new(false));
        let reader_task = {
            let closed = closed.clone();
            tokio::spawn(async move {
                let mut accumulator = TranscriptAccumulator::default();
                while let Some(frame) = reader.next().await {
                    let frame = match frame {
                        Ok(frame) => frame,
                        Err(err) => {
                            warn!(error = %err, "Gemini Live receive failed");
                            break;
                        }
                    };
                    if matches!(frame, WsMessage::Close(_)) {
                        debug!("Gemini Live server closed the session");
                        break;
                    }
                    let Some(message) = parse_frame(&frame) else {
                        continue;
                    };
                    if message.go_away.is_some() {
                        warn!("Gemini Live server requested disconnect");
                    }
                    let Some(content) = message.server_content else {
                        continue;
                    };
                    for fragment in accumulator.absorb(&content) {
                        observer.on_fragment(fragment);
                    }
                }
                for fragment in accumulator.flush() {
                    observer.on_fragment(fragment);
                }
                closed.store(true, Ordering::SeqCst);
            })
        };

        Ok(GeminiLiveSession {
            writer: Arc::new(Mutex::new(writer)),
            reader_task: std::sync::Mutex::new(Some(reader_task)),
            closed,
        })
    }
}

#[async_trait]
impl ConversationService for GeminiLiveService {
    async fn start(
        &self,
        config: ConversationConfig,
        observer: Arc<dyn TranscriptObserver>,
    ) -> studymate_traits::Result<Arc<dyn ConversationSession>> {
        let session = self.connect(&config, observer).await?;
        Ok(Arc::new(session))
    }
}

fn parse_frame(frame: &WsMessage) -> Option<ServerMessage> {
    let parsed = match frame {
        WsMessage::Text(text) => serde_json::from_str::<ServerMessage>(text.as_str()),
        WsMessage::Binary(bytes) => serde_json::from_slice::<ServerMessage>(&bytes[..]),
        _ => return None,
    };
    match parsed {
        Ok(message) => Some(message),
        Err(err) => {
            debug!(error = %err, "Ignoring unrecognised Gemini Live frame");
            None
        }
    }
}

/// A live conversational session.
pub struct GeminiLiveSession {
    writer: Arc<Mutex<WsWriter>>,
    reader_task: std::sync::Mutex<Option<JoinHandle<()>>>,
    closed: Arc<AtomicBool>,
}

impl GeminiLiveSession {
    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    async fn send_json(&self, value: serde_json::Value) -> Result<()> {
        if self.is_closed() {
            return Err(AiError::Realtime("session already closed".to_string()));
        }
        let mut writer = self.writer.lock().await;
        writer.send(WsMessage::Text(value.to_string().into())).await?;
        Ok(())
    }
}

#[async_trait]
impl ConversationSession for GeminiLiveSession {
    async fn generate_reply(&self, instructions: &str) -> studymate_traits::Result<()> {
        Ok(self.send_json(protocol::text_turn(instructions)).await?)
    }

    async fn say(&self, text: &str) -> studymate_traits::Result<()> {
        let prompt =
            format!("Say exactly the following, word for word, and nothing else: {text}");
        Ok(self.send_json(protocol::text_turn(&prompt)).await?)
    }

    async fn close(&self) -> studymate_traits::Result<()> {
        if self.closed.swap(true, Ordering::SeqCst) {
            return Ok(());
        }
        {
            let mut writer = self.writer.lock().await;
            if let Err(err) = writer.send(WsMessage::Close(None)).await {
                debug!(error = %err, "Close frame not delivered");
            }
        }
        if let Ok(mut slot) = self.reader_task.lock()
            && let Some(handle) = slot.take()
        {
            handle.abort();
        }
        Ok(())
    }
}
