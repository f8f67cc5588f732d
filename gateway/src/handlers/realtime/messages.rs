//! Realtime WebSocket message types
//!
//! Messages the bridge itself sends to clients. Upstream events are not
//! modelled here; they travel as raw JSON text in
//! [`RealtimeMessageRoute::Passthrough`].

use bytes::Bytes;
use serde::Serialize;

use crate::core::realtime::ConnectionStatus;

/// Text of `realtime.connected`.
pub const CONNECTED_MESSAGE: &str = "Connected to OpenAI Realtime API";
/// Text of `realtime.error` when the upstream handshake fails.
pub const CONNECT_FAILED_MESSAGE: &str = "Failed to connect to OpenAI Realtime API";
/// Text of `realtime.error` when a client event cannot be forwarded.
pub const FORWARD_FAILED_MESSAGE: &str = "Failed to forward client event to OpenAI";
/// Text of `realtime.error` for errors reported by the upstream.
pub const UPSTREAM_ERROR_MESSAGE: &str = "OpenAI Realtime API reported an error";
/// Text of `client.error` for control events sent before the session is ready.
pub const NOT_READY_MESSAGE: &str = "Realtime session is not ready";

/// Messages generated by the bridge.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type")]
pub enum RealtimeOutgoingMessage {
    /// Upstream session is open
    #[serde(rename = "realtime.connected")]
    Connected {
        message: String,
        #[serde(skip_serializing_if = "Option::is_none")]
        agent: Option<String>,
    },

    /// Upstream failure: connect, forward, or an upstream error event
    #[serde(rename = "realtime.error")]
    RealtimeError {
        message: String,
        #[serde(skip_serializing_if = "Option::is_none")]
        error: Option<serde_json::Value>,
    },

    /// The client's frame was rejected
    #[serde(rename = "client.error")]
    ClientError { message: String },

    /// Upstream transport status changed
    #[serde(rename = "connection.change")]
    ConnectionChange { status: ConnectionStatus },
}

impl RealtimeOutgoingMessage {
    pub fn connected(agent_name: &str) -> Self {
        RealtimeOutgoingMessage::Connected {
            message: CONNECTED_MESSAGE.to_string(),
            agent: (!agent_name.is_empty()).then(|| agent_name.to_string()),
        }
    }

    pub fn realtime_error(message: &str, error: Option<serde_json::Value>) -> Self {
        RealtimeOutgoingMessage::RealtimeError {
            message: message.to_string(),
            error,
        }
    }

    pub fn client_error(message: impl Into<String>) -> Self {
        RealtimeOutgoingMessage::ClientError {
            message: message.into(),
        }
    }
}

/// Outbound queue entry for the socket writer task.
#[derive(Debug)]
pub enum RealtimeMessageRoute {
    /// Bridge message, serialized to a text frame
    Outgoing(RealtimeOutgoingMessage),
    /// Upstream event JSON, sent as-is in a text frame
    Passthrough(String),
    /// Audio bytes, sent as a binary frame
    Audio(Bytes),
    /// Close the socket with this status
    Close { code: u16, reason: String },
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_connected_serialization() {
        let json = serde_json::to_value(RealtimeOutgoingMessage::connected("Assistant")).unwrap();
        assert_eq!(
            json,
            json!({
                "type": "realtime.connected",
                "message": "Connected to OpenAI Realtime API",
                "agent": "Assistant"
            })
        );
    }

    #[test]
    fn test_realtime_error_serialization() {
        let msg = RealtimeOutgoingMessage::realtime_error(
            CONNECT_FAILED_MESSAGE,
            Some(json!("Connection failed: refused")),
        );
        let json = serde_json::to_value(msg).unwrap();
        assert_eq!(json["type"], "realtime.error");
        assert_eq!(json["message"], "Failed to connect to OpenAI Realtime API");
        assert_eq!(json["error"], "Connection failed: refused");

        let json =
            serde_json::to_value(RealtimeOutgoingMessage::realtime_error("x", None)).unwrap();
        assert!(json.get("error").is_none());
    }

    #[test]
    fn test_client_error_serialization() {
        let json =
            serde_json::to_value(RealtimeOutgoingMessage::client_error(NOT_READY_MESSAGE)).unwrap();
        assert_eq!(
            json,
            json!({"type": "client.error", "message": "Realtime session is not ready"})
        );
    }

    #[test]
    fn test_connection_change_serialization() {
        let msg = RealtimeOutgoingMessage::ConnectionChange {
            status: ConnectionStatus::Disconnected,
        };
        let json = serde_json::to_value(msg).unwrap();
        assert_eq!(
            json,
            json!({"type": "connection.change", "status": "disconnected"})
        );
    }
}
