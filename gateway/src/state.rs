//! Shared application state.

use std::sync::Arc;

use crate::config::ServerConfig;
use crate::core::realtime::{OpenAIRealtimeFactory, UpstreamFactory};

/// State shared by every request handler.
pub struct AppState {
    pub config: ServerConfig,
    /// Creates one upstream session per client connection
    pub upstream: Arc<dyn UpstreamFactory>,
}

impl AppState {
    /// Build state backed by the OpenAI Realtime adapter.
    pub fn new(config: ServerConfig) -> Arc<Self> {
        let factory = OpenAIRealtimeFactory::new(config.realtime_config());
        Self::with_upstream(config, Arc::new(factory))
    }

    /// Build state with a custom upstream factory.
    pub fn with_upstream(config: ServerConfig, upstream: Arc<dyn UpstreamFactory>) -> Arc<Self> {
        Arc::new(Self { config, upstream })
    }
}
