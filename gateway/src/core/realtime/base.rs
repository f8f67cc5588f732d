//! Base traits and types for upstream realtime sessions.
//!
//! An upstream session is one connection to a third-party realtime voice API
//! that streams audio and JSON events in both directions. The relay layer only
//! talks to [`UpstreamSession`]; concrete providers live in their own modules.
//!
//! # Event Model
//!
//! Everything the upstream produces is surfaced as an [`UpstreamEvent`]:
//!
//! - `Message`: a raw server event, kept as the original JSON text
//! - `ConnectionChange`: transport status transitions
//! - `Error`: error detail reported by the upstream or the transport
//! - `Audio`: decoded audio bytes

use async_trait::async_trait;
use bytes::Bytes;
use serde::Serialize;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;

use super::registry::{Disposer, EventCallback};

// =============================================================================
// Error Types
// =============================================================================

/// Errors that can occur during upstream realtime operations.
#[derive(Debug, Error)]
pub enum RealtimeError {
    /// Handshake with the upstream was rejected, failed or timed out
    #[error("Connection failed: {0}")]
    ConnectFailed(String),

    /// A client event could not be handed to the upstream transport
    #[error("Failed to forward event: {0}")]
    ForwardFailed(String),

    /// Operation requires an open connection
    #[error("Not connected")]
    NotConnected,

    /// Invalid configuration
    #[error("Invalid configuration: {0}")]
    InvalidConfiguration(String),

    /// Serialization error
    #[error("Serialization error: {0}")]
    Serialization(String),
}

/// Result type for realtime operations.
pub type RealtimeResult<T> = Result<T, RealtimeError>;

// =============================================================================
// Configuration Types
// =============================================================================

/// Static settings shared by every upstream session created by a factory.
///
/// The credential and model are not part of this struct; they are passed to
/// [`UpstreamSession::connect`] per session.
#[derive(Debug, Clone)]
pub struct RealtimeConfig {
    /// Base WebSocket endpoint of the realtime API
    pub url: String,
    /// Display name of the agent, reported to clients and logs
    pub agent_name: String,
    /// System instructions sent with the initial session update
    pub instructions: String,
    /// Upper bound for the upstream handshake
    pub connect_timeout: Duration,
}

// =============================================================================
// Connection State
// =============================================================================

/// Lifecycle state of an upstream adapter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ConnectionState {
    /// Created, `connect` not called yet
    #[default]
    Idle,
    /// Handshake in progress
    Connecting,
    /// Handshake completed, events flowing
    Connected,
    /// Transport ended without `close` being called
    Disconnected,
    /// `close` was called or the handshake failed; the adapter is spent
    Closed,
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConnectionState::Idle => write!(f, "idle"),
            ConnectionState::Connecting => write!(f, "connecting"),
            ConnectionState::Connected => write!(f, "connected"),
            ConnectionState::Disconnected => write!(f, "disconnected"),
            ConnectionState::Closed => write!(f, "closed"),
        }
    }
}

/// Transport status carried by connection-change events.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ConnectionStatus {
    Connecting,
    Connected,
    Disconnected,
}

impl ConnectionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ConnectionStatus::Connecting => "connecting",
            ConnectionStatus::Connected => "connected",
            ConnectionStatus::Disconnected => "disconnected",
        }
    }
}

impl fmt::Display for ConnectionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// =============================================================================
// Events
// =============================================================================

/// A server event exactly as the upstream sent it.
#[derive(Debug, Clone, PartialEq)]
pub struct RawServerEvent {
    /// Value of the event's `type` field
    pub event_type: String,
    /// Original JSON text of the frame
    pub text: String,
}

/// Event surfaced by an upstream session to its subscribers.
#[derive(Debug, Clone)]
pub enum UpstreamEvent {
    Message(RawServerEvent),
    ConnectionChange(ConnectionStatus),
    Error(serde_json::Value),
    Audio(Bytes),
}

impl UpstreamEvent {
    pub fn kind(&self) -> EventKind {
        match self {
            UpstreamEvent::Message(_) => EventKind::Message,
            UpstreamEvent::ConnectionChange(_) => EventKind::ConnectionChange,
            UpstreamEvent::Error(_) => EventKind::Error,
            UpstreamEvent::Audio(_) => EventKind::Audio,
        }
    }
}

/// Discriminant of [`UpstreamEvent`], used to select subscriptions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventKind {
    Message,
    ConnectionChange,
    Error,
    Audio,
}

impl fmt::Display for EventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EventKind::Message => write!(f, "message"),
            EventKind::ConnectionChange => write!(f, "connection_change"),
            EventKind::Error => write!(f, "error"),
            EventKind::Audio => write!(f, "audio"),
        }
    }
}

/// Which events a subscription receives.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventFilter {
    /// Every event, regardless of kind
    All,
    /// Only events of one kind
    Only(EventKind),
}

impl EventFilter {
    #[inline]
    pub fn matches(&self, kind: EventKind) -> bool {
        match self {
            EventFilter::All => true,
            EventFilter::Only(k) => *k == kind,
        }
    }
}

/// A validated client control event.
///
/// Holds the `type` for routing and logging, and the client's JSON text so it
/// reaches the upstream unchanged.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ControlEvent {
    event_type: String,
    text: String,
}

impl ControlEvent {
    pub fn new(event_type: impl Into<String>, text: impl Into<String>) -> Self {
        Self {
            event_type: event_type.into(),
            text: text.into(),
        }
    }

    pub fn event_type(&self) -> &str {
        &self.event_type
    }

    pub fn as_str(&self) -> &str {
        &self.text
    }
}

// =============================================================================
// Upstream Session Trait
// =============================================================================

/// One connection to an upstream realtime API.
///
/// All methods take `&self` so a session can be shared between the task that
/// awaits `connect` and the teardown path, which may run concurrently.
///
/// # Contract
///
/// - `connect` may be called once. On failure the adapter is spent and only
///   `close` remains meaningful.
/// - Callbacks run in the order events arrive from the transport. They must
///   not block.
/// - `close` is idempotent, callable from any state (including while
///   `connect` is pending) and invalidates every outstanding subscription.
#[async_trait]
pub trait UpstreamSession: Send + Sync {
    /// Open the upstream connection.
    async fn connect(&self, credential: &str, model: &str) -> RealtimeResult<()>;

    /// Register a callback. The returned disposer removes exactly this entry.
    fn subscribe(&self, filter: EventFilter, callback: EventCallback) -> Disposer;

    /// Queue raw audio for the upstream. Never waits for the transport.
    fn send_audio(&self, audio: Bytes) -> RealtimeResult<()>;

    /// Queue a client control event for the upstream, unchanged.
    fn send_event(&self, event: &ControlEvent) -> RealtimeResult<()>;

    /// Terminate the connection and drop all subscriptions.
    fn close(&self);

    /// Current lifecycle state.
    fn connection_state(&self) -> ConnectionState;
}

/// Creates a fresh upstream session for every relay session.
pub trait UpstreamFactory: Send + Sync {
    fn create(&self) -> Arc<dyn UpstreamSession>;
}
