//! OpenAI Realtime API message types.
//!
//! Only the events the adapter itself produces or inspects are typed here.
//! Everything else passes through as raw JSON text.

use base64::prelude::*;
use serde::{Deserialize, Serialize};

use super::config::AUDIO_DELTA_EVENTS;

// =============================================================================
// Client Events (sent by the adapter)
// =============================================================================

/// Session settings sent once after the handshake.
#[derive(Debug, Clone, Serialize)]
pub struct SessionConfig {
    /// Session kind, always `realtime` for speech-to-speech sessions
    #[serde(rename = "type")]
    pub session_type: &'static str,
    /// System instructions for the agent
    #[serde(skip_serializing_if = "Option::is_none")]
    pub instructions: Option<String>,
}

/// Events generated by the adapter rather than forwarded from the client.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type")]
pub enum ClientEvent {
    /// Update session configuration
    #[serde(rename = "session.update")]
    SessionUpdate { session: SessionConfig },

    /// Append audio to input buffer
    #[serde(rename = "input_audio_buffer.append")]
    InputAudioBufferAppend {
        /// Base64-encoded audio data
        audio: String,
    },
}

impl ClientEvent {
    /// Create a session update carrying the agent instructions.
    pub fn session_update(instructions: &str) -> Self {
        let instructions = (!instructions.trim().is_empty()).then(|| instructions.to_string());
        ClientEvent::SessionUpdate {
            session: SessionConfig {
                session_type: "realtime",
                instructions,
            },
        }
    }

    /// Create an audio append event from raw bytes.
    pub fn audio_append(data: &[u8]) -> Self {
        ClientEvent::InputAudioBufferAppend {
            audio: BASE64_STANDARD.encode(data),
        }
    }
}

// =============================================================================
// Server Events (inspected by the adapter)
// =============================================================================

/// The fields of a server event the adapter needs for routing.
#[derive(Debug, Clone, Deserialize)]
pub struct ServerEventEnvelope {
    #[serde(rename = "type")]
    pub event_type: String,
    /// Base64 audio on audio delta events; other events may carry any shape
    #[serde(default)]
    pub delta: Option<serde_json::Value>,
    /// Error object on `error` events
    #[serde(default)]
    pub error: Option<serde_json::Value>,
}

impl ServerEventEnvelope {
    pub fn is_audio_delta(&self) -> bool {
        AUDIO_DELTA_EVENTS.contains(&self.event_type.as_str())
    }

    /// Base64 payload of an audio delta event.
    pub fn audio_delta(&self) -> Option<&str> {
        if !self.is_audio_delta() {
            return None;
        }
        self.delta.as_ref().and_then(|d| d.as_str())
    }

    pub fn is_error(&self) -> bool {
        self.event_type == "error"
    }
}
