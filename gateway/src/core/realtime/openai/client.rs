//! OpenAI Realtime API client implementation.
//!
//! This module provides the OpenAI adapter that implements the
//! `UpstreamSession` trait over OpenAI's WebSocket-based Realtime API.
//!
//! # API Reference
//!
//! - Endpoint: `wss://api.openai.com/v1/realtime?model=<model>`
//! - Protocol: WebSocket with JSON events
//! - Audio: PCM 16-bit, 24kHz, mono, little-endian, base64 encoded
//!
//! # Event Surface
//!
//! Every JSON frame from OpenAI is re-emitted untouched as a `Message` event.
//! Audio deltas are additionally decoded into `Audio` events, and `error`
//! events additionally surface their `error` object as an `Error` event.
//! Frames that are not JSON or carry no `type` become an `Error` event
//! holding the raw text.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use base64::prelude::*;
use bytes::Bytes;
use futures_util::{Sink, SinkExt, Stream, StreamExt};
use http::{HeaderValue, header::AUTHORIZATION};
use parking_lot::{Mutex, RwLock};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_tungstenite::tungstenite::{self, Message, client::IntoClientRequest};
use tokio_util::sync::CancellationToken;

use super::config::build_realtime_url;
use super::messages::{ClientEvent, ServerEventEnvelope};
use crate::core::realtime::base::{
    ConnectionState, ConnectionStatus, ControlEvent, EventFilter, RawServerEvent, RealtimeConfig,
    RealtimeError, RealtimeResult, UpstreamEvent, UpstreamFactory, UpstreamSession,
};
use crate::core::realtime::registry::{Disposer, EventCallback, EventRegistry};

// =============================================================================
// OpenAI Realtime Client
// =============================================================================

/// OpenAI Realtime API adapter.
///
/// # Thread Safety
///
/// All state is behind `Arc`/locks shared with the spawned connection task,
/// so every trait method takes `&self` and the adapter can be closed from a
/// different task than the one awaiting `connect`.
pub struct OpenAIRealtime {
    config: RealtimeConfig,
    registry: EventRegistry,
    state: Arc<RwLock<ConnectionState>>,
    /// Set once by `close`; never cleared
    closed: AtomicBool,
    /// Cancelled by `close` or drop to stop the connection task
    shutdown: CancellationToken,
    /// Outgoing frames for the connection task
    ws_sender: Mutex<Option<mpsc::UnboundedSender<Message>>>,
    connection_handle: Mutex<Option<JoinHandle<()>>>,
}

impl OpenAIRealtime {
    pub fn new(config: RealtimeConfig) -> Self {
        Self {
            config,
            registry: EventRegistry::new(),
            state: Arc::new(RwLock::new(ConnectionState::Idle)),
            closed: AtomicBool::new(false),
            shutdown: CancellationToken::new(),
            ws_sender: Mutex::new(None),
            connection_handle: Mutex::new(None),
        }
    }

    /// Perform the handshake and start the connection task.
    async fn open(&self, credential: &str, model: &str) -> RealtimeResult<()> {
        let url = build_realtime_url(&self.config.url, model)
            .map_err(|e| RealtimeError::ConnectFailed(e.to_string()))?;

        let mut request = url
            .as_str()
            .into_client_request()
            .map_err(|e| RealtimeError::ConnectFailed(e.to_string()))?;
        let bearer = HeaderValue::from_str(&format!("Bearer {credential}")).map_err(|_| {
            RealtimeError::ConnectFailed("credential is not a valid header value".to_string())
        })?;
        request.headers_mut().insert(AUTHORIZATION, bearer);

        let (ws_stream, response) = tokio::time::timeout(
            self.config.connect_timeout,
            tokio_tungstenite::connect_async(request),
        )
        .await
        .map_err(|_| {
            RealtimeError::ConnectFailed(format!(
                "handshake timed out after {}ms",
                self.config.connect_timeout.as_millis()
            ))
        })?
        .map_err(|e| RealtimeError::ConnectFailed(e.to_string()))?;

        tracing::debug!(status = %response.status(), "OpenAI Realtime handshake completed");

        let session_update = serde_json::to_string(&ClientEvent::session_update(
            &self.config.instructions,
        ))
        .map_err(|e| RealtimeError::Serialization(e.to_string()))?;

        let (ws_sink, ws_stream) = ws_stream.split();
        let (tx, rx) = mpsc::unbounded_channel::<Message>();
        // First frame on the wire; the receiver is alive so this cannot fail
        let _ = tx.send(Message::Text(session_update.into()));

        {
            // `close` flips `closed` before taking this lock, so either we see
            // the flag here or `close` sees the sender we install.
            let mut sender = self.ws_sender.lock();
            if self.closed.load(Ordering::SeqCst) {
                return Err(RealtimeError::ConnectFailed(
                    "session closed during handshake".to_string(),
                ));
            }
            *sender = Some(tx);
            *self.state.write() = ConnectionState::Connected;
        }

        tracing::info!(model, agent = %self.config.agent_name, "Connected to OpenAI Realtime API");
        // Must precede every event the connection task can produce
        self.registry
            .dispatch(&UpstreamEvent::ConnectionChange(ConnectionStatus::Connected));

        // A `close` since the check above has already cancelled the token;
        // the task then sends a close frame and exits without emitting.
        let handle = tokio::spawn(run_connection(
            ws_sink,
            ws_stream,
            rx,
            self.registry.clone(),
            self.state.clone(),
            self.shutdown.clone(),
        ));
        *self.connection_handle.lock() = Some(handle);
        Ok(())
    }

    /// Hand a text frame to the connection task.
    fn queue_text(&self, text: String) -> RealtimeResult<()> {
        let sender = self.ws_sender.lock();
        let Some(tx) = sender.as_ref() else {
            return Err(RealtimeError::NotConnected);
        };
        tx.send(Message::Text(text.into())).map_err(|_| {
            RealtimeError::ForwardFailed("upstream connection has ended".to_string())
        })
    }
}

#[async_trait]
impl UpstreamSession for OpenAIRealtime {
    async fn connect(&self, credential: &str, model: &str) -> RealtimeResult<()> {
        if self.closed.load(Ordering::SeqCst) {
            return Err(RealtimeError::ConnectFailed(
                "session already closed".to_string(),
            ));
        }

        {
            let mut state = self.state.write();
            if *state != ConnectionState::Idle {
                return Err(RealtimeError::ConnectFailed(format!(
                    "connect called while {}",
                    *state
                )));
            }
            *state = ConnectionState::Connecting;
        }
        self.registry
            .dispatch(&UpstreamEvent::ConnectionChange(ConnectionStatus::Connecting));

        let result = self.open(credential, model).await;
        if let Err(ref e) = result {
            tracing::warn!(model, "OpenAI Realtime connect failed: {}", e);
            *self.state.write() = ConnectionState::Closed;
        }
        result
    }

    fn subscribe(&self, filter: EventFilter, callback: EventCallback) -> Disposer {
        self.registry.subscribe(filter, callback)
    }

    fn send_audio(&self, audio: Bytes) -> RealtimeResult<()> {
        let event = ClientEvent::audio_append(&audio);
        let json = serde_json::to_string(&event)
            .map_err(|e| RealtimeError::Serialization(e.to_string()))?;
        self.queue_text(json)
    }

    fn send_event(&self, event: &ControlEvent) -> RealtimeResult<()> {
        if self.closed.load(Ordering::SeqCst) {
            return Err(RealtimeError::ForwardFailed(
                "upstream session is closing".to_string(),
            ));
        }

        match self.queue_text(event.as_str().to_string()) {
            Err(RealtimeError::NotConnected) => Err(RealtimeError::ForwardFailed(
                "upstream session is not connected".to_string(),
            )),
            other => other,
        }
    }

    fn close(&self) {
        if self.closed.swap(true, Ordering::SeqCst) {
            return;
        }

        self.shutdown.cancel();
        let was_connected = self.ws_sender.lock().take().is_some();
        self.registry.clear();
        *self.state.write() = ConnectionState::Closed;
        // The task sends a close frame and exits on its own once cancelled
        drop(self.connection_handle.lock().take());

        if was_connected {
            tracing::info!("Disconnected from OpenAI Realtime API");
        }
    }

    fn connection_state(&self) -> ConnectionState {
        *self.state.read()
    }
}

impl Drop for OpenAIRealtime {
    fn drop(&mut self) {
        self.shutdown.cancel();
    }
}

// =============================================================================
// Connection Task
// =============================================================================

async fn run_connection<S, R>(
    mut ws_sink: S,
    mut ws_stream: R,
    mut outgoing: mpsc::UnboundedReceiver<Message>,
    registry: EventRegistry,
    state: Arc<RwLock<ConnectionState>>,
    shutdown: CancellationToken,
) where
    S: Sink<Message, Error = tungstenite::Error> + Unpin,
    R: Stream<Item = Result<Message, tungstenite::Error>> + Unpin,
{
    loop {
        tokio::select! {
            biased;

            _ = shutdown.cancelled() => {
                if let Err(e) = ws_sink.send(Message::Close(None)).await {
                    tracing::debug!("Failed to send close frame to OpenAI: {}", e);
                }
                break;
            }

            Some(msg) = outgoing.recv() => {
                if let Err(e) = ws_sink.send(msg).await {
                    tracing::error!("Failed to send WebSocket message: {}", e);
                    registry.dispatch(&transport_error(&e));
                    break;
                }
            }

            incoming = ws_stream.next() => match incoming {
                Some(Ok(Message::Text(text))) => handle_server_text(&registry, text.as_str()),
                Some(Ok(Message::Ping(data))) => {
                    if let Err(e) = ws_sink.send(Message::Pong(data)).await {
                        tracing::error!("Failed to send pong: {}", e);
                    }
                }
                Some(Ok(Message::Close(frame))) => {
                    tracing::info!(?frame, "WebSocket closed by OpenAI");
                    break;
                }
                Some(Ok(Message::Binary(data))) => {
                    tracing::debug!("Ignoring {} byte binary frame from OpenAI", data.len());
                }
                Some(Ok(_)) => {}
                Some(Err(e)) => {
                    tracing::error!("OpenAI WebSocket error: {}", e);
                    registry.dispatch(&transport_error(&e));
                    break;
                }
                None => break,
            }
        }
    }

    if shutdown.is_cancelled() {
        return;
    }

    *state.write() = ConnectionState::Disconnected;
    registry.dispatch(&UpstreamEvent::ConnectionChange(
        ConnectionStatus::Disconnected,
    ));
}

fn transport_error(e: &tungstenite::Error) -> UpstreamEvent {
    UpstreamEvent::Error(serde_json::json!({
        "type": "transport_error",
        "message": e.to_string(),
    }))
}

/// Turn one upstream text frame into events.
pub(crate) fn handle_server_text(registry: &EventRegistry, text: &str) {
    let envelope: ServerEventEnvelope = match serde_json::from_str(text) {
        Ok(envelope) => envelope,
        Err(e) => {
            tracing::warn!("Failed to parse server event: {} - {}", e, text);
            registry.dispatch(&UpstreamEvent::Error(serde_json::json!({
                "type": "invalid_server_event",
                "message": e.to_string(),
                "raw": text,
            })));
            return;
        }
    };

    tracing::trace!(event_type = %envelope.event_type, "OpenAI server event");

    registry.dispatch(&UpstreamEvent::Message(RawServerEvent {
        event_type: envelope.event_type.clone(),
        text: text.to_string(),
    }));

    if let Some(delta) = envelope.audio_delta() {
        if delta.is_empty() {
            return;
        }
        match BASE64_STANDARD.decode(delta) {
            Ok(audio) => registry.dispatch(&UpstreamEvent::Audio(Bytes::from(audio))),
            Err(e) => tracing::error!("Failed to decode audio delta: {}", e),
        }
    } else if envelope.is_error() {
        let detail = envelope.error.unwrap_or(serde_json::Value::Null);
        tracing::warn!(error = %detail, "OpenAI Realtime error event");
        registry.dispatch(&UpstreamEvent::Error(detail));
    }
}

// =============================================================================
// Factory
// =============================================================================

/// Creates one [`OpenAIRealtime`] per relay session.
#[derive(Debug, Clone)]
pub struct OpenAIRealtimeFactory {
    config: RealtimeConfig,
}

impl OpenAIRealtimeFactory {
    pub fn new(config: RealtimeConfig) -> Self {
        Self { config }
    }
}

impl UpstreamFactory for OpenAIRealtimeFactory {
    fn create(&self) -> Arc<dyn UpstreamSession> {
        Arc::new(OpenAIRealtime::new(self.config.clone()))
    }
}
