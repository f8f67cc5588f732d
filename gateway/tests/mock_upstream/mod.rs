//! Mock OpenAI Realtime server
//!
//! Accepts WebSocket connections on an ephemeral port, records the handshake
//! and every text frame it receives, and lets the test push events to the
//! connected bridge.

#![allow(dead_code)]

use futures_util::{SinkExt, StreamExt};
use std::net::SocketAddr;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::mpsc;
use tokio_tungstenite::accept_hdr_async;
use tokio_tungstenite::tungstenite::handshake::server::{ErrorResponse, Request, Response};
use tokio_tungstenite::tungstenite::http::StatusCode;
use tokio_tungstenite::tungstenite::protocol::CloseFrame;
use tokio_tungstenite::tungstenite::protocol::frame::coding::CloseCode;
use tokio_tungstenite::tungstenite::Message;

const WAIT: Duration = Duration::from_secs(5);

/// What the bridge sent in its upgrade request.
#[derive(Debug, Clone)]
pub struct HandshakeRequest {
    pub path: String,
    pub query: Option<String>,
    pub authorization: Option<String>,
}

pub struct MockUpstream {
    pub addr: SocketAddr,
    handshakes: mpsc::UnboundedReceiver<HandshakeRequest>,
    frames: mpsc::UnboundedReceiver<String>,
    closed: mpsc::UnboundedReceiver<()>,
    outbound: Arc<Mutex<Option<mpsc::UnboundedSender<Message>>>>,
}

impl MockUpstream {
    /// Start a server that accepts every handshake.
    pub async fn start() -> Self {
        Self::spawn(false).await
    }

    /// Start a server that answers every handshake with 401.
    pub async fn start_rejecting() -> Self {
        Self::spawn(true).await
    }

    async fn spawn(reject: bool) -> Self {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();

        let (handshake_tx, handshakes) = mpsc::unbounded_channel();
        let (frame_tx, frames) = mpsc::unbounded_channel();
        let (closed_tx, closed) = mpsc::unbounded_channel();
        let outbound = Arc::new(Mutex::new(None));

        let slot = outbound.clone();
        tokio::spawn(async move {
            while let Ok((stream, _)) = listener.accept().await {
                tokio::spawn(handle_connection(
                    stream,
                    reject,
                    handshake_tx.clone(),
                    frame_tx.clone(),
                    closed_tx.clone(),
                    slot.clone(),
                ));
            }
        });

        Self {
            addr,
            handshakes,
            frames,
            closed,
            outbound,
        }
    }

    /// Base URL to configure the bridge with.
    pub fn url(&self) -> String {
        format!("ws://{}/v1/realtime", self.addr)
    }

    pub async fn next_handshake(&mut self) -> HandshakeRequest {
        tokio::time::timeout(WAIT, self.handshakes.recv())
            .await
            .expect("timed out waiting for upstream handshake")
            .expect("mock server stopped")
    }

    /// Next text frame exactly as received.
    pub async fn next_frame(&mut self) -> String {
        tokio::time::timeout(WAIT, self.frames.recv())
            .await
            .expect("timed out waiting for upstream frame")
            .expect("mock server stopped")
    }

    pub async fn next_json(&mut self) -> serde_json::Value {
        serde_json::from_str(&self.next_frame().await).unwrap()
    }

    /// Assert no text frame arrives within `window`.
    pub async fn expect_no_frame(&mut self, window: Duration) {
        if let Ok(Some(frame)) = tokio::time::timeout(window, self.frames.recv()).await {
            panic!("unexpected upstream frame: {frame}");
        }
    }

    /// Wait until the bridge's connection goes away.
    pub async fn wait_closed(&mut self) {
        tokio::time::timeout(WAIT, self.closed.recv())
            .await
            .expect("upstream connection was not closed")
            .expect("mock server stopped");
    }

    /// Push a server event to the connected bridge.
    pub fn send(&self, event: serde_json::Value) {
        self.push(Message::Text(event.to_string().into()));
    }

    /// Close the current connection from the server side.
    pub fn close_connection(&self) {
        self.push(Message::Close(Some(CloseFrame {
            code: CloseCode::Away,
            reason: "server going away".into(),
        })));
    }

    fn push(&self, message: Message) {
        let guard = self.outbound.lock().unwrap();
        guard
            .as_ref()
            .expect("no bridge connected")
            .send(message)
            .unwrap();
    }
}

async fn handle_connection(
    stream: TcpStream,
    reject: bool,
    handshake_tx: mpsc::UnboundedSender<HandshakeRequest>,
    frame_tx: mpsc::UnboundedSender<String>,
    closed_tx: mpsc::UnboundedSender<()>,
    outbound: Arc<Mutex<Option<mpsc::UnboundedSender<Message>>>>,
) {
    let callback = move |req: &Request, resp: Response| -> Result<Response, ErrorResponse> {
        let _ = handshake_tx.send(HandshakeRequest {
            path: req.uri().path().to_string(),
            query: req.uri().query().map(str::to_string),
            authorization: req
                .headers()
                .get("authorization")
                .and_then(|v| v.to_str().ok())
                .map(str::to_string),
        });

        if reject {
            let mut error = ErrorResponse::new(Some("invalid api key".to_string()));
            *error.status_mut() = StatusCode::UNAUTHORIZED;
            return Err(error);
        }
        Ok(resp)
    };

    let ws_stream = match accept_hdr_async(stream, callback).await {
        Ok(ws) => ws,
        Err(_) => return,
    };
    let (mut write, mut read) = ws_stream.split();

    let (tx, mut rx) = mpsc::unbounded_channel::<Message>();
    *outbound.lock().unwrap() = Some(tx);

    let writer = tokio::spawn(async move {
        while let Some(message) = rx.recv().await {
            let is_close = matches!(message, Message::Close(_));
            if write.send(message).await.is_err() || is_close {
                break;
            }
        }
    });

    while let Some(msg) = read.next().await {
        match msg {
            Ok(Message::Text(text)) => {
                let _ = frame_tx.send(text.to_string());
            }
            Ok(Message::Close(_)) | Err(_) => break,
            _ => {}
        }
    }

    writer.abort();
    let _ = closed_tx.send(());
}
