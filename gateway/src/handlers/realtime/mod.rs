//! Realtime relay WebSocket handlers
//!
//! Each client socket on `/realtime` is bridged to its own OpenAI Realtime
//! session.
//!
//! # Protocol
//!
//! ## Client → Server
//!
//! - **Binary frames**: raw audio (PCM 16-bit, 24kHz, mono), forwarded
//!   byte-for-byte as `input_audio_buffer.append`
//! - **Text frames**: a JSON object with a string `type`, forwarded verbatim
//!   as an upstream control event (`response.create`, `session.update`, ...)
//!
//! ## Server → Client
//!
//! - **Upstream events**: every upstream JSON event, text unchanged
//! - **Binary frames**: decoded audio from audio delta events
//! - **realtime.connected**: upstream session is ready
//! - **realtime.error**: connect failure, forward failure, or upstream error
//! - **client.error**: a client frame was rejected
//! - **connection.change**: upstream connection status changed

mod classifier;
mod handler;
pub mod messages;
mod session;

pub use classifier::{ClientMessage, FrameError, InboundFrame, classify};
pub use handler::realtime_handler;
pub use session::{
    CONNECT_FAILED_REASON, RelaySession, SessionSettings, SessionState, UPSTREAM_CLOSED_REASON,
};
