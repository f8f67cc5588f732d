//! OpenAI Realtime API configuration.
//!
//! Endpoint constants and URL construction for the WebSocket transport.

use url::Url;

use crate::core::realtime::base::{RealtimeError, RealtimeResult};

/// OpenAI Realtime API WebSocket endpoint.
pub const OPENAI_REALTIME_URL: &str = "wss://api.openai.com/v1/realtime";

/// Model used when none is configured.
pub const DEFAULT_REALTIME_MODEL: &str = "gpt-realtime";

/// Server event types that carry a base64 audio `delta`.
///
/// The beta protocol uses `response.audio.delta`, the GA protocol
/// `response.output_audio.delta`.
pub const AUDIO_DELTA_EVENTS: [&str; 2] = ["response.audio.delta", "response.output_audio.delta"];

/// Build the connection URL `<base>?model=<model>`.
///
/// Existing query parameters on `base` are kept; the scheme must be `ws` or
/// `wss`.
pub fn build_realtime_url(base: &str, model: &str) -> RealtimeResult<Url> {
    let mut url = Url::parse(base)
        .map_err(|e| RealtimeError::InvalidConfiguration(format!("invalid URL {base}: {e}")))?;

    match url.scheme() {
        "ws" | "wss" => {}
        other => {
            return Err(RealtimeError::InvalidConfiguration(format!(
                "unsupported URL scheme '{other}', expected ws or wss"
            )));
        }
    }

    if model.trim().is_empty() {
        return Err(RealtimeError::InvalidConfiguration(
            "model must not be empty".to_string(),
        ));
    }

    url.query_pairs_mut().append_pair("model", model);
    Ok(url)
}
