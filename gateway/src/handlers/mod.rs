//! HTTP and WebSocket request handlers
//!
//! - `api` - Health check endpoint
//! - `realtime` - Realtime relay WebSocket (OpenAI Realtime API)

pub mod api;
pub mod realtime;

pub use realtime::realtime_handler;
