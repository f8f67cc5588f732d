//! Inbound frame classification.
//!
//! Binary frames are audio. Text frames must be a JSON object with a string
//! `type`; anything else is rejected with a [`FrameError`] whose `Display`
//! text is what the client receives in `client.error`.

use bytes::Bytes;
use thiserror::Error;

use crate::core::realtime::ControlEvent;

/// One frame as received from the client socket.
#[derive(Debug, Clone)]
pub enum InboundFrame<'a> {
    Text(&'a str),
    Binary(Bytes),
}

/// A classified client frame.
#[derive(Debug, Clone, PartialEq)]
pub enum ClientMessage {
    /// Raw audio, forwarded byte-for-byte
    Audio(Bytes),
    /// JSON control event, forwarded verbatim
    Control(ControlEvent),
}

/// Why a text frame was rejected.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum FrameError {
    #[error("Unable to parse websocket payload as JSON")]
    MalformedPayload { reason: String },

    #[error("Invalid realtime client event payload")]
    InvalidShape,
}

/// Classify a client frame.
///
/// Returns `Ok(None)` for frames that are silently ignored (blank text).
pub fn classify(frame: InboundFrame<'_>) -> Result<Option<ClientMessage>, FrameError> {
    let text = match frame {
        InboundFrame::Binary(data) => return Ok(Some(ClientMessage::Audio(data))),
        InboundFrame::Text(text) => text.trim(),
    };

    if text.is_empty() {
        return Ok(None);
    }

    let value: serde_json::Value =
        serde_json::from_str(text).map_err(|e| FrameError::MalformedPayload {
            reason: e.to_string(),
        })?;

    let event_type = value
        .as_object()
        .and_then(|obj| obj.get("type"))
        .and_then(|t| t.as_str())
        .ok_or(FrameError::InvalidShape)?;

    Ok(Some(ClientMessage::Control(ControlEvent::new(
        event_type, text,
    ))))
}
