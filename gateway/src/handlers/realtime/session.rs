//! Relay session
//!
//! One [`RelaySession`] bridges one client socket to one upstream session.
//! It moves through `Connecting -> Active -> Closed`; every exit path goes
//! through [`RelaySession::cleanup`], which runs its teardown exactly once.

use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use axum::extract::ws::{CloseFrame, Message, close_code};
use futures::{Sink, SinkExt, Stream, StreamExt};
use parking_lot::Mutex;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{Instrument, debug, error, info, info_span, trace, warn};
use uuid::Uuid;
use zeroize::Zeroizing;

use super::classifier::{ClientMessage, FrameError, InboundFrame, classify};
use super::messages::{
    CONNECT_FAILED_MESSAGE, FORWARD_FAILED_MESSAGE, NOT_READY_MESSAGE, RealtimeMessageRoute,
    RealtimeOutgoingMessage, UPSTREAM_ERROR_MESSAGE,
};
use crate::config::ServerConfig;
use crate::core::realtime::{
    ConnectionStatus, Disposer, EventFilter, EventKind, UpstreamEvent, UpstreamSession,
};

/// Close reason when the upstream handshake fails.
pub const CONNECT_FAILED_REASON: &str = "Failed to connect to OpenAI";

/// Close reason when the upstream connection drops mid-session.
pub const UPSTREAM_CLOSED_REASON: &str = "Upstream session closed";

/// How long a final close frame may take to flush before the writer is aborted.
const WRITER_DRAIN_TIMEOUT: Duration = Duration::from_secs(2);

/// Lifecycle of a relay session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Connecting,
    Active,
    Closing,
    Closed,
}

/// Per-session values taken from the process configuration.
#[derive(Clone)]
pub struct SessionSettings {
    pub credential: Zeroizing<String>,
    pub model: String,
    pub agent_name: String,
}

impl SessionSettings {
    pub fn from_config(config: &ServerConfig) -> Self {
        Self {
            credential: Zeroizing::new(config.openai_api_key.clone()),
            model: config.realtime_model.clone(),
            agent_name: config.agent_name.clone(),
        }
    }
}

impl fmt::Debug for SessionSettings {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SessionSettings")
            .field("credential", &"<redacted>")
            .field("model", &self.model)
            .field("agent_name", &self.agent_name)
            .finish()
    }
}

/// Signals from upstream callbacks to the session loop.
#[derive(Debug)]
enum RelaySignal {
    UpstreamClosed,
}

/// Why the active loop ended.
#[derive(Debug)]
enum ExitReason {
    ClientClosed,
    UpstreamClosed,
}

/// Handle to the outbound queue of one client socket.
///
/// Once marked closed, everything sent through it is dropped.
#[derive(Clone)]
struct ClientSender {
    tx: mpsc::UnboundedSender<RealtimeMessageRoute>,
    open: Arc<AtomicBool>,
}

impl ClientSender {
    fn new(tx: mpsc::UnboundedSender<RealtimeMessageRoute>) -> Self {
        Self {
            tx,
            open: Arc::new(AtomicBool::new(true)),
        }
    }

    fn send(&self, route: RealtimeMessageRoute) {
        if !self.open.load(Ordering::Acquire) {
            trace!("Client socket closed, dropping outbound message");
            return;
        }
        // Receiver gone means the writer already stopped
        let _ = self.tx.send(route);
    }

    fn send_message(&self, message: RealtimeOutgoingMessage) {
        self.send(RealtimeMessageRoute::Outgoing(message));
    }

    fn mark_closed(&self) {
        self.open.store(false, Ordering::Release);
    }
}

struct SessionInner {
    id: Uuid,
    upstream: Arc<dyn UpstreamSession>,
    settings: SessionSettings,
    state: Mutex<SessionState>,
    cleaned_up: AtomicBool,
    subscriptions: Mutex<Vec<Disposer>>,
}

/// Bridges one client socket to one upstream session.
///
/// Cloning yields another handle to the same session.
#[derive(Clone)]
pub struct RelaySession {
    inner: Arc<SessionInner>,
}

impl RelaySession {
    pub fn new(upstream: Arc<dyn UpstreamSession>, settings: SessionSettings) -> Self {
        Self {
            inner: Arc::new(SessionInner {
                id: Uuid::new_v4(),
                upstream,
                settings,
                state: Mutex::new(SessionState::Connecting),
                cleaned_up: AtomicBool::new(false),
                subscriptions: Mutex::new(Vec::new()),
            }),
        }
    }

    pub fn id(&self) -> Uuid {
        self.inner.id
    }

    pub fn state(&self) -> SessionState {
        *self.inner.state.lock()
    }

    fn is_cleaned_up(&self) -> bool {
        self.inner.cleaned_up.load(Ordering::Acquire)
    }

    fn set_state(&self, next: SessionState) {
        let mut state = self.inner.state.lock();
        let prev = *state;
        debug!(from = ?prev, to = ?next, "Relay session state change");
        *state = next;
    }

    /// Dispose every upstream subscription and close the upstream.
    ///
    /// Only the first call does anything; later or concurrent calls return
    /// immediately.
    pub fn cleanup(&self) {
        if self.inner.cleaned_up.swap(true, Ordering::AcqRel) {
            return;
        }
        self.set_state(SessionState::Closing);

        let subscriptions = std::mem::take(&mut *self.inner.subscriptions.lock());
        let disposed = subscriptions.iter().filter(|d| d.dispose()).count();
        self.inner.upstream.close();

        self.set_state(SessionState::Closed);
        debug!(disposed, "Relay session cleaned up");
    }

    /// Drive the session until either side goes away.
    pub async fn run<W, R, E>(self, ws_sender: W, ws_receiver: R)
    where
        W: Sink<Message> + Unpin + Send + 'static,
        W::Error: fmt::Display + Send,
        R: Stream<Item = Result<Message, E>> + Unpin,
        E: fmt::Display,
    {
        let span = info_span!("relay_session", session_id = %self.inner.id);
        self.run_inner(ws_sender, ws_receiver).instrument(span).await
    }

    async fn run_inner<W, R, E>(&self, ws_sender: W, mut ws_receiver: R)
    where
        W: Sink<Message> + Unpin + Send + 'static,
        W::Error: fmt::Display + Send,
        R: Stream<Item = Result<Message, E>> + Unpin,
        E: fmt::Display,
    {
        // Unbounded: a client that stops reading grows this queue until it closes
        let (route_tx, route_rx) = mpsc::unbounded_channel::<RealtimeMessageRoute>();
        let client = ClientSender::new(route_tx);
        let writer = tokio::spawn(write_outbound(ws_sender, route_rx, client.clone()));

        let (signal_tx, mut signal_rx) = mpsc::unbounded_channel::<RelaySignal>();
        self.subscribe_upstream(&client, signal_tx);

        // Connecting: the client may leave before the handshake settles
        let connect_result = {
            let settings = &self.inner.settings;
            let connect = self
                .inner
                .upstream
                .connect(settings.credential.as_str(), &settings.model);
            tokio::pin!(connect);

            loop {
                tokio::select! {
                    result = &mut connect => break Some(result),
                    frame = ws_receiver.next() => {
                        if !self.on_client_frame(frame, &client) {
                            break None;
                        }
                    }
                }
            }
        };

        let Some(connect_result) = connect_result else {
            info!("Client left before the upstream session was ready");
            client.mark_closed();
            self.cleanup();
            writer.abort();
            return;
        };

        if let Err(e) = connect_result {
            error!("Failed to connect to OpenAI Realtime API: {}", e);
            client.send_message(RealtimeOutgoingMessage::realtime_error(
                CONNECT_FAILED_MESSAGE,
                Some(serde_json::Value::String(e.to_string())),
            ));
            self.cleanup();
            client.send(RealtimeMessageRoute::Close {
                code: close_code::ERROR,
                reason: CONNECT_FAILED_REASON.to_string(),
            });
            client.mark_closed();
            drain_writer(writer).await;
            return;
        }

        if self.is_cleaned_up() {
            client.mark_closed();
            writer.abort();
            return;
        }

        self.set_state(SessionState::Active);
        client.send_message(RealtimeOutgoingMessage::connected(
            &self.inner.settings.agent_name,
        ));
        info!(
            model = %self.inner.settings.model,
            agent = %self.inner.settings.agent_name,
            "Relay session active"
        );

        let reason = loop {
            tokio::select! {
                frame = ws_receiver.next() => {
                    if !self.on_client_frame(frame, &client) {
                        break ExitReason::ClientClosed;
                    }
                }
                Some(signal) = signal_rx.recv() => match signal {
                    RelaySignal::UpstreamClosed => break ExitReason::UpstreamClosed,
                },
            }
        };

        match reason {
            ExitReason::ClientClosed => {
                client.mark_closed();
                self.cleanup();
                writer.abort();
            }
            ExitReason::UpstreamClosed => {
                warn!("Upstream session ended, closing client socket");
                self.cleanup();
                client.send(RealtimeMessageRoute::Close {
                    code: close_code::ERROR,
                    reason: UPSTREAM_CLOSED_REASON.to_string(),
                });
                client.mark_closed();
                drain_writer(writer).await;
            }
        }

        info!("Realtime WebSocket connection terminated");
    }

    /// Register the four upstream subscriptions that feed the client.
    fn subscribe_upstream(&self, client: &ClientSender, signals: mpsc::UnboundedSender<RelaySignal>) {
        let upstream = &self.inner.upstream;
        let mut subscriptions = Vec::with_capacity(4);

        let c = client.clone();
        subscriptions.push(upstream.subscribe(
            EventFilter::All,
            Arc::new(move |event: &UpstreamEvent| {
                if let UpstreamEvent::Message(raw) = event {
                    c.send(RealtimeMessageRoute::Passthrough(raw.text.clone()));
                }
            }),
        ));

        let c = client.clone();
        subscriptions.push(upstream.subscribe(
            EventFilter::Only(EventKind::ConnectionChange),
            Arc::new(move |event: &UpstreamEvent| {
                if let UpstreamEvent::ConnectionChange(status) = event {
                    c.send_message(RealtimeOutgoingMessage::ConnectionChange { status: *status });
                    if *status == ConnectionStatus::Disconnected {
                        let _ = signals.send(RelaySignal::UpstreamClosed);
                    }
                }
            }),
        ));

        let c = client.clone();
        subscriptions.push(upstream.subscribe(
            EventFilter::Only(EventKind::Error),
            Arc::new(move |event: &UpstreamEvent| {
                if let UpstreamEvent::Error(detail) = event {
                    c.send_message(RealtimeOutgoingMessage::realtime_error(
                        UPSTREAM_ERROR_MESSAGE,
                        Some(detail.clone()),
                    ));
                }
            }),
        ));

        let c = client.clone();
        subscriptions.push(upstream.subscribe(
            EventFilter::Only(EventKind::Audio),
            Arc::new(move |event: &UpstreamEvent| {
                if let UpstreamEvent::Audio(data) = event {
                    c.send(RealtimeMessageRoute::Audio(data.clone()));
                }
            }),
        ));

        self.inner.subscriptions.lock().extend(subscriptions);

        // Lost a race with cleanup: nothing will dispose these later
        if self.is_cleaned_up() {
            for disposer in std::mem::take(&mut *self.inner.subscriptions.lock()) {
                disposer.dispose();
            }
        }
    }

    /// Handle one item from the client stream. Returns `false` when the
    /// client is gone.
    fn on_client_frame<E: fmt::Display>(
        &self,
        frame: Option<Result<Message, E>>,
        client: &ClientSender,
    ) -> bool {
        match frame {
            Some(Ok(msg)) => self.process_client_message(msg, client),
            Some(Err(e)) => {
                warn!("Realtime WebSocket error: {}", e);
                false
            }
            None => {
                info!("Realtime WebSocket connection closed by client");
                false
            }
        }
    }

    fn process_client_message(&self, msg: Message, client: &ClientSender) -> bool {
        let classified = match msg {
            Message::Text(text) => {
                trace!("Received text message: {} bytes", text.len());
                classify(InboundFrame::Text(text.as_str()))
            }
            Message::Binary(data) => {
                trace!("Received binary audio: {} bytes", data.len());
                classify(InboundFrame::Binary(data))
            }
            Message::Ping(_) | Message::Pong(_) => return true,
            Message::Close(frame) => {
                info!(?frame, "Realtime WebSocket close received");
                return false;
            }
        };

        let active = self.state() == SessionState::Active;

        match classified {
            Ok(None) => {}
            Ok(Some(ClientMessage::Audio(data))) => {
                if !active {
                    debug!("Session not ready, dropping {} bytes of audio", data.len());
                } else if let Err(e) = self.inner.upstream.send_audio(data) {
                    debug!("Failed to forward audio: {}", e);
                }
            }
            Ok(Some(ClientMessage::Control(event))) => {
                if !active {
                    debug!(
                        event_type = event.event_type(),
                        "Session not ready, rejecting control event"
                    );
                    client.send_message(RealtimeOutgoingMessage::client_error(NOT_READY_MESSAGE));
                } else if let Err(e) = self.inner.upstream.send_event(&event) {
                    warn!(
                        event_type = event.event_type(),
                        "Failed to forward client event: {}", e
                    );
                    client.send_message(RealtimeOutgoingMessage::realtime_error(
                        FORWARD_FAILED_MESSAGE,
                        Some(serde_json::Value::String(e.to_string())),
                    ));
                }
            }
            Err(e) => {
                if let FrameError::MalformedPayload { reason } = &e {
                    debug!("Rejected client frame: {}", reason);
                } else {
                    debug!("Rejected client frame: {}", e);
                }
                client.send_message(RealtimeOutgoingMessage::client_error(e.to_string()));
            }
        }
        true
    }
}

/// Writer task: drains the outbound queue into the socket.
async fn write_outbound<W>(
    mut ws_sender: W,
    mut routes: mpsc::UnboundedReceiver<RealtimeMessageRoute>,
    client: ClientSender,
) where
    W: Sink<Message> + Unpin,
    W::Error: fmt::Display,
{
    while let Some(route) = routes.recv().await {
        let should_close = matches!(route, RealtimeMessageRoute::Close { .. });

        let result = match route {
            RealtimeMessageRoute::Outgoing(message) => match serde_json::to_string(&message) {
                Ok(json) => ws_sender.send(Message::Text(json.into())).await,
                Err(e) => {
                    error!("Failed to serialize outgoing message: {}", e);
                    continue;
                }
            },
            RealtimeMessageRoute::Passthrough(text) => {
                ws_sender.send(Message::Text(text.into())).await
            }
            RealtimeMessageRoute::Audio(data) => ws_sender.send(Message::Binary(data)).await,
            RealtimeMessageRoute::Close { code, reason } => {
                info!(code, reason = %reason, "Closing realtime WebSocket connection");
                ws_sender
                    .send(Message::Close(Some(CloseFrame {
                        code,
                        reason: reason.into(),
                    })))
                    .await
            }
        };

        if let Err(e) = result {
            debug!("Failed to send WebSocket message: {}", e);
            client.mark_closed();
            break;
        }

        if should_close {
            break;
        }
    }
}

async fn drain_writer(mut writer: JoinHandle<()>) {
    if tokio::time::timeout(WRITER_DRAIN_TIMEOUT, &mut writer)
        .await
        .is_err()
    {
        debug!("Writer did not finish in time, aborting");
        writer.abort();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::realtime::{
        ConnectionState, ControlEvent, EventCallback, EventRegistry, RawServerEvent,
        RealtimeError, RealtimeResult,
    };
    use async_trait::async_trait;
    use bytes::Bytes;
    use futures::channel::mpsc as client_mpsc;
    use std::sync::atomic::AtomicUsize;
    use tokio::sync::Notify;

    #[derive(Debug)]
    enum MockCall {
        Connect { credential: String, model: String },
        Audio(Bytes),
        Event(String),
    }

    struct MockUpstream {
        registry: EventRegistry,
        connect_result: Mutex<Option<RealtimeResult<()>>>,
        connect_gate: Option<Arc<Notify>>,
        fail_forward: AtomicBool,
        close_calls: AtomicUsize,
        calls: mpsc::UnboundedSender<MockCall>,
    }

    impl MockUpstream {
        fn emit(&self, event: UpstreamEvent) {
            self.registry.dispatch(&event);
        }
    }

    #[async_trait]
    impl UpstreamSession for MockUpstream {
        async fn connect(&self, credential: &str, model: &str) -> RealtimeResult<()> {
            let _ = self.calls.send(MockCall::Connect {
                credential: credential.to_string(),
                model: model.to_string(),
            });
            if let Some(gate) = &self.connect_gate {
                gate.notified().await;
            }
            self.connect_result.lock().take().unwrap_or(Ok(()))
        }

        fn subscribe(&self, filter: EventFilter, callback: EventCallback) -> Disposer {
            self.registry.subscribe(filter, callback)
        }

        fn send_audio(&self, audio: Bytes) -> RealtimeResult<()> {
            let _ = self.calls.send(MockCall::Audio(audio));
            Ok(())
        }

        fn send_event(&self, event: &ControlEvent) -> RealtimeResult<()> {
            if self.fail_forward.load(Ordering::SeqCst) {
                return Err(RealtimeError::ForwardFailed(
                    "upstream session is closing".to_string(),
                ));
            }
            let _ = self.calls.send(MockCall::Event(event.as_str().to_string()));
            Ok(())
        }

        fn close(&self) {
            self.close_calls.fetch_add(1, Ordering::SeqCst);
            self.registry.clear();
        }

        fn connection_state(&self) -> ConnectionState {
            ConnectionState::Connected
        }
    }

    struct Harness {
        session: RelaySession,
        upstream: Arc<MockUpstream>,
        calls: mpsc::UnboundedReceiver<MockCall>,
        client_tx: client_mpsc::UnboundedSender<Result<Message, axum::Error>>,
        client_rx: client_mpsc::UnboundedReceiver<Message>,
        task: JoinHandle<()>,
    }

    fn settings() -> SessionSettings {
        SessionSettings {
            credential: Zeroizing::new("test-key".to_string()),
            model: "gpt-realtime".to_string(),
            agent_name: "Assistant".to_string(),
        }
    }

    fn start_with(
        connect_result: Option<RealtimeResult<()>>,
        connect_gate: Option<Arc<Notify>>,
    ) -> Harness {
        let (calls_tx, calls) = mpsc::unbounded_channel();
        let upstream = Arc::new(MockUpstream {
            registry: EventRegistry::new(),
            connect_result: Mutex::new(connect_result),
            connect_gate,
            fail_forward: AtomicBool::new(false),
            close_calls: AtomicUsize::new(0),
            calls: calls_tx,
        });

        let session = RelaySession::new(upstream.clone(), settings());
        let (sink_tx, client_rx) = client_mpsc::unbounded::<Message>();
        let (client_tx, stream_rx) = client_mpsc::unbounded::<Result<Message, axum::Error>>();
        let task = tokio::spawn(session.clone().run(sink_tx, stream_rx));

        Harness {
            session,
            upstream,
            calls,
            client_tx,
            client_rx,
            task,
        }
    }

    fn start() -> Harness {
        start_with(None, None)
    }

    impl Harness {
        fn send_text(&self, text: &str) {
            self.client_tx
                .unbounded_send(Ok(Message::Text(text.to_string().into())))
                .unwrap();
        }

        fn send_binary(&self, data: &'static [u8]) {
            self.client_tx
                .unbounded_send(Ok(Message::Binary(Bytes::from_static(data))))
                .unwrap();
        }

        async fn next_frame(&mut self) -> Message {
            tokio::time::timeout(Duration::from_secs(2), self.client_rx.next())
                .await
                .expect("timed out waiting for client frame")
                .expect("client sink closed")
        }

        async fn next_json(&mut self) -> serde_json::Value {
            match self.next_frame().await {
                Message::Text(text) => serde_json::from_str(text.as_str()).unwrap(),
                other => panic!("expected text frame, got {other:?}"),
            }
        }

        async fn next_call(&mut self) -> MockCall {
            tokio::time::timeout(Duration::from_secs(2), self.calls.recv())
                .await
                .expect("timed out waiting for upstream call")
                .expect("upstream call channel closed")
        }

        /// Wait for the connect call and the `realtime.connected` message.
        async fn connected(mut self) -> Self {
            assert!(matches!(self.next_call().await, MockCall::Connect { .. }));
            let json = self.next_json().await;
            assert_eq!(json["type"], "realtime.connected");
            self
        }

        async fn finished(&mut self) {
            tokio::time::timeout(Duration::from_secs(2), &mut self.task)
                .await
                .expect("session did not finish")
                .unwrap();
        }

        /// The client sink saw no frames and has been dropped.
        async fn assert_client_stream_ended(&mut self) {
            let next = tokio::time::timeout(Duration::from_secs(2), self.client_rx.next())
                .await
                .expect("client sink was not dropped");
            assert!(next.is_none(), "unexpected frame: {next:?}");
        }
    }

    #[tokio::test]
    async fn test_connect_success_sends_connected() {
        let mut h = start();

        match h.next_call().await {
            MockCall::Connect { credential, model } => {
                assert_eq!(credential, "test-key");
                assert_eq!(model, "gpt-realtime");
            }
            other => panic!("expected connect, got {other:?}"),
        }

        let json = h.next_json().await;
        assert_eq!(json["type"], "realtime.connected");
        assert_eq!(json["message"], "Connected to OpenAI Realtime API");
        assert_eq!(json["agent"], "Assistant");
        assert_eq!(h.session.state(), SessionState::Active);
        assert_eq!(h.upstream.registry.len(), 4);
    }

    #[tokio::test]
    async fn test_binary_frames_forwarded_byte_identical() {
        let mut h = start().connected().await;
        let pcm: &'static [u8] = &[0x00, 0x01, 0xfe, 0xff, 0x10, 0x80];

        h.send_binary(pcm);

        match h.next_call().await {
            MockCall::Audio(bytes) => assert_eq!(bytes.as_ref(), pcm),
            other => panic!("expected audio, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_control_event_forwarded_verbatim() {
        let mut h = start().connected().await;
        let text = r#"{"type":"response.create","response":{"instructions":"Say hi"}}"#;

        h.send_text(&format!("  {text}  "));

        match h.next_call().await {
            MockCall::Event(sent) => assert_eq!(sent, text),
            other => panic!("expected event, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_mixed_frames_forwarded_in_arrival_order() {
        let mut h = start().connected().await;

        h.send_binary(b"a");
        h.send_text(r#"{"type":"x"}"#);
        h.send_binary(b"b");

        match h.next_call().await {
            MockCall::Audio(bytes) => assert_eq!(bytes.as_ref(), b"a"),
            other => panic!("expected first audio, got {other:?}"),
        }
        match h.next_call().await {
            MockCall::Event(sent) => assert_eq!(sent, r#"{"type":"x"}"#),
            other => panic!("expected event, got {other:?}"),
        }
        match h.next_call().await {
            MockCall::Audio(bytes) => assert_eq!(bytes.as_ref(), b"b"),
            other => panic!("expected second audio, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_missing_type_yields_one_client_error() {
        let mut h = start().connected().await;

        h.send_text(r#"{"event":"response.create"}"#);
        let json = h.next_json().await;
        assert_eq!(json["type"], "client.error");
        assert_eq!(json["message"], "Invalid realtime client event payload");

        // Still active: the next valid event goes through
        h.send_text(r#"{"type":"input_audio_buffer.commit"}"#);
        assert!(matches!(h.next_call().await, MockCall::Event(_)));
        assert_eq!(h.session.state(), SessionState::Active);
        assert!(h.client_rx.try_next().is_err(), "unexpected extra frame");
    }

    #[tokio::test]
    async fn test_not_json_yields_client_error() {
        let mut h = start().connected().await;

        h.send_text("not json");
        let json = h.next_json().await;
        assert_eq!(json["type"], "client.error");
        assert_eq!(json["message"], "Unable to parse websocket payload as JSON");
        assert_eq!(h.session.state(), SessionState::Active);
    }

    #[tokio::test]
    async fn test_blank_text_is_ignored() {
        let mut h = start().connected().await;

        h.send_text("   \n");
        h.send_text(r#"{"type":"response.cancel"}"#);

        match h.next_call().await {
            MockCall::Event(sent) => assert_eq!(sent, r#"{"type":"response.cancel"}"#),
            other => panic!("expected event, got {other:?}"),
        }
        assert!(h.client_rx.try_next().is_err(), "unexpected frame");
    }

    #[tokio::test]
    async fn test_upstream_event_forwarded_verbatim() {
        let mut h = start().connected().await;
        let text = r#"{"type":"response.audio.delta","item_id":"i1","delta":"AAE="}"#;

        h.upstream.emit(UpstreamEvent::Message(RawServerEvent {
            event_type: "response.audio.delta".to_string(),
            text: text.to_string(),
        }));

        match h.next_frame().await {
            Message::Text(sent) => assert_eq!(sent.as_str(), text),
            other => panic!("expected text frame, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_upstream_audio_forwarded_as_binary() {
        let mut h = start().connected().await;
        let audio = Bytes::from_static(&[9, 8, 7, 6, 5]);

        h.upstream.emit(UpstreamEvent::Audio(audio.clone()));

        match h.next_frame().await {
            Message::Binary(sent) => assert_eq!(sent, audio),
            other => panic!("expected binary frame, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_upstream_error_forwarded() {
        let mut h = start().connected().await;

        h.upstream.emit(UpstreamEvent::Error(serde_json::json!({
            "type": "invalid_request_error",
            "message": "Unknown event"
        })));

        let json = h.next_json().await;
        assert_eq!(json["type"], "realtime.error");
        assert_eq!(json["error"]["message"], "Unknown event");
        assert_eq!(h.session.state(), SessionState::Active);
    }

    #[tokio::test]
    async fn test_backlog_for_idle_client_is_delivered_intact() {
        let mut h = start().connected().await;

        for i in 0..2000 {
            h.upstream.emit(UpstreamEvent::Message(RawServerEvent {
                event_type: "response.text.delta".to_string(),
                text: format!(r#"{{"type":"response.text.delta","seq":{i}}}"#),
            }));
        }

        for i in 0..2000 {
            let json = h.next_json().await;
            assert_eq!(json["seq"], i);
        }
        assert_eq!(h.session.state(), SessionState::Active);
    }

    #[tokio::test]
    async fn test_connection_change_forwarded() {
        let mut h = start().connected().await;

        h.upstream
            .emit(UpstreamEvent::ConnectionChange(ConnectionStatus::Connected));

        let json = h.next_json().await;
        assert_eq!(
            json,
            serde_json::json!({"type": "connection.change", "status": "connected"})
        );
    }

    #[tokio::test]
    async fn test_connect_failure_sends_one_error_then_closes() {
        let mut h = start_with(
            Some(Err(RealtimeError::ConnectFailed("HTTP error: 401".to_string()))),
            None,
        );

        let json = h.next_json().await;
        assert_eq!(json["type"], "realtime.error");
        assert_eq!(json["message"], "Failed to connect to OpenAI Realtime API");
        assert!(json["error"].as_str().unwrap().contains("401"));

        match h.next_frame().await {
            Message::Close(Some(frame)) => {
                assert_eq!(frame.code, 1011);
                assert_eq!(frame.reason.as_str(), "Failed to connect to OpenAI");
            }
            other => panic!("expected close frame, got {other:?}"),
        }

        h.finished().await;
        h.assert_client_stream_ended().await;
        assert_eq!(h.upstream.close_calls.load(Ordering::SeqCst), 1);
        assert!(h.upstream.registry.is_empty());
        assert_eq!(h.session.state(), SessionState::Closed);
    }

    #[tokio::test]
    async fn test_client_leaves_while_connect_pending() {
        let gate = Arc::new(Notify::new());
        let mut h = start_with(None, Some(gate.clone()));
        assert!(matches!(h.next_call().await, MockCall::Connect { .. }));

        h.client_tx.close_channel();
        h.finished().await;

        assert_eq!(h.upstream.close_calls.load(Ordering::SeqCst), 1);
        assert_eq!(h.session.state(), SessionState::Closed);
        h.assert_client_stream_ended().await;

        // Settling the handshake afterwards changes nothing
        gate.notify_one();
        assert_eq!(h.upstream.close_calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_frames_before_ready_are_not_forwarded() {
        let gate = Arc::new(Notify::new());
        let mut h = start_with(None, Some(gate.clone()));
        assert!(matches!(h.next_call().await, MockCall::Connect { .. }));

        h.send_text(r#"{"type":"response.create"}"#);
        h.send_binary(b"early audio");

        let json = h.next_json().await;
        assert_eq!(json["type"], "client.error");
        assert_eq!(json["message"], "Realtime session is not ready");

        gate.notify_one();
        let json = h.next_json().await;
        assert_eq!(json["type"], "realtime.connected");

        h.send_text(r#"{"type":"input_audio_buffer.clear"}"#);
        match h.next_call().await {
            MockCall::Event(sent) => assert_eq!(sent, r#"{"type":"input_audio_buffer.clear"}"#),
            other => panic!("early frame leaked upstream: {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_forward_failure_reports_realtime_error() {
        let mut h = start().connected().await;
        h.upstream.fail_forward.store(true, Ordering::SeqCst);

        h.send_text(r#"{"type":"response.create"}"#);

        let json = h.next_json().await;
        assert_eq!(json["type"], "realtime.error");
        assert_eq!(json["message"], "Failed to forward client event to OpenAI");
        assert!(json["error"].as_str().unwrap().contains("closing"));
        assert_eq!(h.session.state(), SessionState::Active);
    }

    #[tokio::test]
    async fn test_upstream_disconnect_closes_client() {
        let mut h = start().connected().await;

        h.upstream.emit(UpstreamEvent::ConnectionChange(
            ConnectionStatus::Disconnected,
        ));

        let json = h.next_json().await;
        assert_eq!(json["type"], "connection.change");
        assert_eq!(json["status"], "disconnected");

        match h.next_frame().await {
            Message::Close(Some(frame)) => {
                assert_eq!(frame.code, 1011);
                assert_eq!(frame.reason.as_str(), "Upstream session closed");
            }
            other => panic!("expected close frame, got {other:?}"),
        }

        h.finished().await;
        assert_eq!(h.upstream.close_calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_cleanup_is_idempotent() {
        let mut h = start().connected().await;
        assert_eq!(h.upstream.registry.len(), 4);

        let racers: Vec<_> = (0..4)
            .map(|_| {
                let session = h.session.clone();
                tokio::spawn(async move { session.cleanup() })
            })
            .collect();
        for racer in racers {
            racer.await.unwrap();
        }
        h.session.cleanup();

        assert_eq!(h.upstream.close_calls.load(Ordering::SeqCst), 1);
        assert!(h.upstream.registry.is_empty());
        assert_eq!(h.session.state(), SessionState::Closed);

        // The client leaving afterwards takes the same path again
        h.client_tx.close_channel();
        h.finished().await;
        assert_eq!(h.upstream.close_calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_client_close_frame_runs_cleanup() {
        let mut h = start().connected().await;

        h.client_tx.unbounded_send(Ok(Message::Close(None))).unwrap();
        h.finished().await;

        assert_eq!(h.upstream.close_calls.load(Ordering::SeqCst), 1);
        assert!(h.upstream.registry.is_empty());
    }

    #[tokio::test]
    async fn test_client_socket_error_runs_cleanup() {
        let mut h = start().connected().await;

        h.client_tx
            .unbounded_send(Err(axum::Error::new(std::io::Error::other(
                "connection reset",
            ))))
            .unwrap();
        h.finished().await;

        assert_eq!(h.upstream.close_calls.load(Ordering::SeqCst), 1);
        assert_eq!(h.session.state(), SessionState::Closed);
    }

    #[tokio::test]
    async fn test_events_after_client_close_are_dropped() {
        let mut h = start().connected().await;
        let upstream = h.upstream.clone();

        h.client_tx.close_channel();
        h.finished().await;

        // Subscriptions are gone, so nothing reaches the client
        upstream.emit(UpstreamEvent::Audio(Bytes::from_static(b"late")));
        h.assert_client_stream_ended().await;
    }
}
