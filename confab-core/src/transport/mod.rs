//! Persistent bidirectional connection to the remote voice service.
//!
//! One WebSocket per session. After the TLS handshake the setup message goes
//! out, then two tasks run until the session ends:
//!
//! - **writer**: drains an ordered queue of outbound audio chunks into text
//!   frames — one writer per socket, so frames can never be reordered.
//! - **reader**: parses server frames into [`ServerEvent`]s for the session
//!   driver. A frame that fails to parse is logged and skipped; close and
//!   socket errors become terminal events.

pub mod messages;

use futures_util::{SinkExt, StreamExt};
use tokio::sync::mpsc;
use tokio_tungstenite::{connect_async, tungstenite::Message};
use tracing::{debug, info, warn};

use crate::error::{ConfabError, Result};
use self::messages::{RealtimeInputMessage, ServerMessage, SetupMessage};

/// Default service endpoint for the bidirectional generate-content API.
pub const DEFAULT_ENDPOINT: &str =
    "wss://generativelanguage.googleapis.com/ws/google.ai.generativelanguage.v1beta.GenerativeService.BidiGenerateContent";

/// Parameters sent in the session setup message.
#[derive(Debug, Clone)]
pub struct LiveSessionParams {
    pub model: String,
    pub voice_name: String,
    pub system_instruction: String,
    pub temperature: Option<f32>,
    /// BCP-47 speech language code, e.g. `en-US`.
    pub language: Option<String>,
}

/// Inbound events, in arrival order.
#[derive(Debug, Clone, PartialEq)]
pub enum ServerEvent {
    /// The service confirmed the session setup.
    Opened,
    /// One base64 PCM fragment of synthesized audio.
    Audio(String),
    /// Barge-in: flush any scheduled playback immediately.
    Interrupted,
    /// Pass-through transcription of synthesized speech.
    Transcript(String),
    /// The service closed the connection cleanly.
    Closed,
    /// The connection failed.
    Error(String),
}

pub(crate) enum Outbound {
    Audio(String),
    Close,
}

/// Sending half of an open session.
pub struct LiveHandle {
    outbound: mpsc::Sender<Outbound>,
}

impl LiveHandle {
    pub(crate) fn new(outbound: mpsc::Sender<Outbound>) -> Self {
        Self { outbound }
    }

    /// Queue one base64 PCM chunk. Frames are transmitted in call order.
    ///
    /// # Errors
    /// `ConfabError::Transport` when the writer has shut down (connection
    /// lost or already closed).
    pub async fn send_audio(&self, payload: String) -> Result<()> {
        self.outbound
            .send(Outbound::Audio(payload))
            .await
            .map_err(|_| ConfabError::Transport("connection writer closed".into()))
    }

    /// Best-effort close frame; ignored if the writer is already gone.
    pub async fn close(&self) {
        let _ = self.outbound.send(Outbound::Close).await;
    }
}

/// Open a session: connect, send setup, spawn the writer and reader tasks.
///
/// Returns the sending handle and the ordered inbound event stream. The
/// `Opened` event arrives on the stream once the service confirms setup.
pub async fn connect(
    params: &LiveSessionParams,
    endpoint: &str,
    api_key: &str,
) -> Result<(LiveHandle, mpsc::Receiver<ServerEvent>)> {
    let url = format!("{endpoint}?key={api_key}");
    let (socket, _response) = connect_async(url.as_str())
        .await
        .map_err(|e| ConfabError::Transport(e.to_string()))?;
    info!(endpoint, model = %params.model, "transport connected, sending setup");

    let (mut sink, mut stream) = socket.split();

    let setup = serde_json::to_string(&SetupMessage::for_session(params))
        .map_err(|e| ConfabError::Transport(format!("encode setup: {e}")))?;
    sink.send(Message::Text(setup))
        .await
        .map_err(|e| ConfabError::Transport(e.to_string()))?;

    let (out_tx, mut out_rx) = mpsc::channel::<Outbound>(64);
    let (event_tx, event_rx) = mpsc::channel::<ServerEvent>(64);

    tokio::spawn(async move {
        while let Some(item) = out_rx.recv().await {
            match item {
                Outbound::Audio(data) => {
                    let message = RealtimeInputMessage::audio_chunk(data);
                    let json = match serde_json::to_string(&message) {
                        Ok(json) => json,
                        Err(e) => {
                            warn!("failed to encode audio chunk, dropping it: {e}");
                            continue;
                        }
                    };
                    if let Err(e) = sink.send(Message::Text(json)).await {
                        warn!("outbound send failed: {e}");
                        break;
                    }
                }
                Outbound::Close => {
                    let _ = sink.send(Message::Close(None)).await;
                    break;
                }
            }
        }
        debug!("transport writer stopped");
    });

    tokio::spawn(async move {
        let terminal = loop {
            let Some(frame) = stream.next().await else {
                break ServerEvent::Closed;
            };
            let payload = match frame {
                Ok(Message::Text(text)) => text.into_bytes(),
                Ok(Message::Binary(bytes)) => bytes,
                Ok(Message::Close(frame)) => {
                    info!(?frame, "service closed the connection");
                    break ServerEvent::Closed;
                }
                Ok(_) => continue, // ping/pong handled by the library
                Err(e) => break ServerEvent::Error(e.to_string()),
            };
            for event in parse_events(&payload) {
                if event_tx.send(event).await.is_err() {
                    // Session driver gone — stop reading.
                    debug!("transport reader stopping, event receiver dropped");
                    return;
                }
            }
        };
        let _ = event_tx.send(terminal).await;
        debug!("transport reader stopped");
    });

    Ok((LiveHandle::new(out_tx), event_rx))
}

/// Translate one server frame into events, preserving in-frame order:
/// audio and transcripts first, then the interruption flag — matching how
/// the service bundles a final truncated fragment with the barge-in signal.
fn parse_events(payload: &[u8]) -> Vec<ServerEvent> {
    let message: ServerMessage = match serde_json::from_slice(payload) {
        Ok(message) => message,
        Err(e) => {
            warn!("skipping unparseable server frame: {e}");
            return Vec::new();
        }
    };

    let mut events = Vec::new();
    if message.setup_complete.is_some() {
        events.push(ServerEvent::Opened);
    }
    if let Some(content) = message.server_content {
        if let Some(turn) = content.model_turn {
            for part in turn.parts {
                if let Some(inline) = part.inline_data {
                    events.push(ServerEvent::Audio(inline.data));
                }
                if let Some(text) = part.text {
                    if !text.is_empty() {
                        events.push(ServerEvent::Transcript(text));
                    }
                }
            }
        }
        if let Some(transcription) = content.output_transcription {
            if !transcription.text.is_empty() {
                events.push(ServerEvent::Transcript(transcription.text));
            }
        }
        if content.interrupted.unwrap_or(false) {
            events.push(ServerEvent::Interrupted);
        }
    }
    events
}
