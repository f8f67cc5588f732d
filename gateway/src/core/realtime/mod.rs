//! Upstream realtime session module.
//!
//! This module provides the abstraction the relay uses to talk to a remote
//! realtime voice API, and the OpenAI implementation of it.
//!
//! # Architecture
//!
//! - `UpstreamSession` trait for the connection lifecycle
//! - `EventRegistry` for (filter, callback) subscriptions with disposers
//! - `UpstreamFactory` to create one session per client connection
//!
//! # Example
//!
//! ```rust,ignore
//! use realtime_bridge::core::realtime::{EventFilter, EventKind, UpstreamEvent, UpstreamSession};
//! use std::sync::Arc;
//!
//! let session = factory.create();
//! let audio = session.subscribe(
//!     EventFilter::Only(EventKind::Audio),
//!     Arc::new(|event| {
//!         if let UpstreamEvent::Audio(bytes) = event {
//!             println!("{} bytes of audio", bytes.len());
//!         }
//!     }),
//! );
//! session.connect(&credential, "gpt-realtime").await?;
//! session.send_audio(pcm_bytes)?;
//!
//! audio.dispose();
//! session.close();
//! ```

mod base;
pub mod openai;
mod registry;

pub use base::{
    ConnectionState, ConnectionStatus, ControlEvent, EventFilter, EventKind, RawServerEvent,
    RealtimeConfig, RealtimeError, RealtimeResult, UpstreamEvent, UpstreamFactory,
    UpstreamSession,
};
pub use openai::{
    DEFAULT_REALTIME_MODEL, OPENAI_REALTIME_URL, OpenAIRealtime, OpenAIRealtimeFactory,
};
pub use registry::{Disposer, EventCallback, EventRegistry};
