//! Client for a cloud-hosted realtime transcription backend.
//!
//! Streams PCM over a persistent duplex WebSocket connection and decodes the
//! server's event protocol, replacing the local buffer + engine path
//! wholesale. Send and receive loops suspend independently; protocol
//! failures surface as a metrics event rather than an error; retry policy
//! belongs to the caller.

pub mod protocol;

pub use protocol::{classify_server_message, encode_pcm16le, ServerMessage};

use crate::error::StartError;
use crate::events::TranscriptionEvent;
use crate::settings::RemoteRealtimeSettings;
use crate::speech_engine::FrameSource;
use crate::streaming::StreamingSession;
use futures_util::stream::{SplitSink, SplitStream};
use futures_util::{SinkExt, StreamExt};
use log::{debug, info, warn};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tokio_tungstenite::tungstenite::client::IntoClientRequest;
use tokio_tungstenite::tungstenite::http::HeaderValue;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};

type WsSink = SplitSink<WebSocketStream<MaybeTlsStream<TcpStream>>, Message>;
type WsStream = SplitStream<WebSocketStream<MaybeTlsStream<TcpStream>>>;

/// How long to wait for trailing events after the final commit.
const TRAILING_WAIT: Duration = Duration::from_millis(500);
const TRAILING_EXTENSION: Duration = Duration::from_millis(600);
const TRAILING_MAX: Duration = Duration::from_secs(3);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ClientState {
    Connected,
    Streaming,
    Closed,
    Error,
}

/// Alternative ingestion path: frames go to a cloud ASR service instead of
/// the local speech engine.
pub struct RemoteRealtimeClient {
    settings: RemoteRealtimeSettings,
}

impl RemoteRealtimeClient {
    pub fn new(settings: RemoteRealtimeSettings) -> Self {
        Self { settings }
    }

    /// Open the connection, configure the session, and start streaming.
    ///
    /// Credential and connection problems fail here, typed, before any
    /// event. After this returns, failures surface on the event stream.
    pub async fn start(
        &self,
        mut source: Box<dyn FrameSource>,
    ) -> Result<StreamingSession, StartError> {
        self.settings.validate()?;

        let mut request = self
            .settings
            .endpoint
            .clone()
            .into_client_request()
            .map_err(|e| StartError::InvalidConfig(format!("bad endpoint URL: {}", e)))?;

        let bearer = format!("Bearer {}", self.settings.api_key);
        request.headers_mut().insert(
            "Authorization",
            HeaderValue::from_str(&bearer)
                .map_err(|e| StartError::MissingCredential(format!("bad API key: {}", e)))?,
        );
        request.headers_mut().insert(
            protocol::PROTOCOL_VERSION_HEADER,
            HeaderValue::from_static(protocol::PROTOCOL_VERSION),
        );

        let (ws, _) = connect_async(request)
            .await
            .map_err(|e| StartError::Connect(e.to_string()))?;
        info!("Connected to realtime endpoint {}", self.settings.endpoint);

        let frames = source
            .start()
            .map_err(|e| StartError::Capture(e.to_string()))?;

        let (events_tx, events_rx) = mpsc::unbounded_channel();
        let stop_requested = Arc::new(AtomicBool::new(false));

        let task = tokio::spawn(run_session(
            ws,
            frames,
            events_tx,
            self.settings.clone(),
            stop_requested.clone(),
        ));

        Ok(StreamingSession::new(events_rx, source, stop_requested, task))
    }
}

async fn run_session(
    ws: WebSocketStream<MaybeTlsStream<TcpStream>>,
    mut frames: mpsc::UnboundedReceiver<Vec<f32>>,
    events: mpsc::UnboundedSender<TranscriptionEvent>,
    settings: RemoteRealtimeSettings,
    stop_requested: Arc<AtomicBool>,
) {
    let mut state = ClientState::Connected;
    debug!("Remote session state: {:?}", state);
    let (mut sink, mut stream) = ws.split();

    // Session config is fixed for the connection lifetime.
    if let Err(e) = send_json(&mut sink, protocol::session_update(&settings)).await {
        emit_protocol_error(&events, format!("failed to configure session: {}", e));
        return;
    }
    state = ClientState::Streaming;
    debug!("Remote session state: {:?}", state);

    // Current server-VAD turn, accumulated from deltas.
    let mut turn_text = String::new();
    let mut failure: Option<String> = None;
    let mut source_done = false;

    while failure.is_none() && !source_done {
        tokio::select! {
            maybe_frame = frames.recv() => {
                match maybe_frame {
                    Some(frame) => {
                        // A dropped event receiver is a cancelled consumer:
                        // wind the session down like a stop request.
                        if stop_requested.load(Ordering::SeqCst) || events.is_closed() {
                            source_done = true;
                        } else if let Err(e) =
                            send_json(&mut sink, protocol::append_message(&frame)).await
                        {
                            failure = Some(format!("failed to send audio: {}", e));
                        }
                    }
                    None => source_done = true,
                }
            }
            message = stream.next() => {
                match incoming_text(message) {
                    Incoming::Text(text) => {
                        if let Err(description) = dispatch(&text, &events, &mut turn_text) {
                            failure = Some(description);
                        }
                    }
                    Incoming::Other => {}
                    Incoming::Closed(reason) => failure = Some(reason),
                }
            }
        }
    }

    if let Some(description) = failure {
        state = ClientState::Error;
        emit_protocol_error(&events, description);
    } else {
        // Graceful end: commit the buffered audio and wait briefly for the
        // trailing transcription events.
        if let Err(e) = send_json(&mut sink, protocol::commit_message()).await {
            warn!("Failed to send final commit: {}", e);
        } else {
            drain_trailing(&mut stream, &events, &mut turn_text).await;
        }
        state = ClientState::Closed;
    }

    let _ = sink.close().await;
    info!("Remote session ended ({:?})", state);
}

enum Incoming {
    Text(String),
    Other,
    Closed(String),
}

fn incoming_text(
    message: Option<Result<Message, tokio_tungstenite::tungstenite::Error>>,
) -> Incoming {
    match message {
        Some(Ok(Message::Text(text))) => Incoming::Text(text.to_string()),
        // Some backends deliver JSON as binary frames.
        Some(Ok(Message::Binary(data))) => match String::from_utf8(data.to_vec()) {
            Ok(text) => Incoming::Text(text),
            Err(_) => Incoming::Other,
        },
        Some(Ok(Message::Close(frame))) => Incoming::Closed(match frame {
            Some(frame) => format!("connection closed: {}", frame.reason),
            None => "connection closed".to_string(),
        }),
        Some(Ok(_)) => Incoming::Other,
        Some(Err(e)) => Incoming::Closed(format!("connection error: {}", e)),
        None => Incoming::Closed("connection closed".to_string()),
    }
}

/// Route one classified server message onto the event stream. Returns the
/// error description when the server declared one.
fn dispatch(
    text: &str,
    events: &mpsc::UnboundedSender<TranscriptionEvent>,
    turn_text: &mut String,
) -> Result<(), String> {
    match classify_server_message(text) {
        ServerMessage::Partial(delta) => {
            turn_text.push_str(&delta);
            let _ = events.send(TranscriptionEvent::partial(turn_text.clone()));
            Ok(())
        }
        ServerMessage::Final(transcript) => {
            let _ = events.send(TranscriptionEvent::committed(transcript));
            turn_text.clear();
            Ok(())
        }
        ServerMessage::Error(description) => Err(description),
        ServerMessage::Ignored => Ok(()),
    }
}

async fn send_json(sink: &mut WsSink, value: serde_json::Value) -> anyhow::Result<()> {
    sink.send(Message::Text(value.to_string().into())).await?;
    Ok(())
}

fn emit_protocol_error(events: &mpsc::UnboundedSender<TranscriptionEvent>, description: String) {
    warn!("Realtime protocol failure: {}", description);
    let _ = events.send(TranscriptionEvent::metrics(serde_json::json!({
        "error": description,
        "source": "realtime_api",
    })));
}

/// Adaptive wait after the final commit: start short, extend while
/// transcription events keep arriving, hard cap regardless.
async fn drain_trailing(
    stream: &mut WsStream,
    events: &mpsc::UnboundedSender<TranscriptionEvent>,
    turn_text: &mut String,
) {
    let started = Instant::now();
    let mut conclude_at = started + TRAILING_WAIT;
    let hard_stop = started + TRAILING_MAX;

    loop {
        let deadline = conclude_at.min(hard_stop);
        let remaining = deadline.saturating_duration_since(Instant::now());
        if remaining.is_zero() {
            break;
        }

        match tokio::time::timeout(remaining, stream.next()).await {
            Ok(message) => match incoming_text(message) {
                Incoming::Text(text) => {
                    let had_transcript = matches!(
                        classify_server_message(&text),
                        ServerMessage::Partial(_) | ServerMessage::Final(_)
                    );
                    if let Err(description) = dispatch(&text, events, turn_text) {
                        emit_protocol_error(events, description);
                        return;
                    }
                    if had_transcript {
                        conclude_at = Instant::now() + TRAILING_EXTENSION;
                    }
                }
                Incoming::Other => {}
                Incoming::Closed(_) => break,
            },
            Err(_) => break,
        }
    }
    debug!("Trailing drain finished after {:?}", started.elapsed());
}
