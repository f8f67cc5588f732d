//! OpenAI Realtime API module.
//!
//! WebSocket adapter for OpenAI's Realtime API.
//!
//! # Protocol Notes
//!
//! - Authentication: `Authorization: Bearer <key>` on the upgrade request.
//!   Ephemeral client keys work the same way as standard API keys.
//! - The model is selected with the `model` query parameter.
//! - After the handshake the adapter sends a `session.update` with the agent
//!   instructions; everything after that is driven by the client.
//!
//! # Audio Format
//!
//! Input and output audio is PCM 16-bit signed little-endian at 24kHz,
//! base64 encoded inside JSON events on the wire and raw bytes on the
//! adapter's surface.

mod client;
mod config;
mod messages;

pub use client::{OpenAIRealtime, OpenAIRealtimeFactory};
pub use config::{
    AUDIO_DELTA_EVENTS, DEFAULT_REALTIME_MODEL, OPENAI_REALTIME_URL, build_realtime_url,
};
pub use messages::{ClientEvent, ServerEventEnvelope, SessionConfig};
