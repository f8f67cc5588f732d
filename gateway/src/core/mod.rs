pub mod realtime;

// Re-export commonly used types for convenience
pub use realtime::{
    ConnectionState, ConnectionStatus, ControlEvent, Disposer, EventCallback, EventFilter,
    EventKind, EventRegistry, OpenAIRealtime, OpenAIRealtimeFactory, RawServerEvent,
    RealtimeConfig, RealtimeError, RealtimeResult, UpstreamEvent, UpstreamFactory,
    UpstreamSession,
};
