//! Merge YAML values over environment values over defaults.

use super::ServerConfig;
use super::env::{env_var, parse_env_var};
use super::validation;
use super::yaml::YamlConfig;
use crate::core::realtime::{DEFAULT_REALTIME_MODEL, OPENAI_REALTIME_URL};

pub(super) const DEFAULT_HOST: &str = "0.0.0.0";
pub(super) const DEFAULT_PORT: u16 = 3000;
pub(super) const DEFAULT_AGENT_NAME: &str = "Assistant";
pub(super) const DEFAULT_AGENT_INSTRUCTIONS: &str = "You are a helpful assistant.";
pub(super) const DEFAULT_CONNECT_TIMEOUT_SECONDS: u64 = 15;

/// Build a [`ServerConfig`] from optional YAML plus the process environment.
///
/// Only field-level parsing happens here; cross-field checks live in
/// [`ServerConfig::validate`].
pub(super) fn merge_config(
    yaml: Option<YamlConfig>,
) -> Result<ServerConfig, Box<dyn std::error::Error>> {
    let yaml = yaml.unwrap_or_default();
    let server = yaml.server.unwrap_or_default();
    let tls = server.tls.unwrap_or_default();
    let realtime = yaml.realtime.unwrap_or_default();
    let agent = yaml.agent.unwrap_or_default();
    let security = yaml.security.unwrap_or_default();

    let host = server
        .host
        .or_else(|| env_var("HOST"))
        .unwrap_or_else(|| DEFAULT_HOST.to_string());

    let port = match server.port {
        Some(port) => port,
        None => parse_env_var::<u16>("PORT")?.unwrap_or(DEFAULT_PORT),
    };

    let tls = validation::validate_tls(
        tls.cert_path.or_else(|| env_var("TLS_CERT_PATH")),
        tls.key_path.or_else(|| env_var("TLS_KEY_PATH")),
    )?;

    let connect_timeout_seconds = match realtime.connect_timeout_seconds {
        Some(seconds) => seconds,
        None => parse_env_var::<u64>("REALTIME_CONNECT_TIMEOUT_SECONDS")?
            .unwrap_or(DEFAULT_CONNECT_TIMEOUT_SECONDS),
    };

    Ok(ServerConfig {
        host,
        port,
        tls,
        openai_api_key: realtime
            .api_key
            .or_else(|| env_var("OPENAI_EPHEMERAL_KEY"))
            .unwrap_or_default(),
        realtime_model: realtime
            .model
            .or_else(|| env_var("OPENAI_REALTIME_MODEL"))
            .unwrap_or_else(|| DEFAULT_REALTIME_MODEL.to_string()),
        realtime_url: realtime
            .url
            .or_else(|| env_var("OPENAI_REALTIME_URL"))
            .unwrap_or_else(|| OPENAI_REALTIME_URL.to_string()),
        agent_name: agent
            .name
            .or_else(|| env_var("OPENAI_AGENT_NAME"))
            .unwrap_or_else(|| DEFAULT_AGENT_NAME.to_string()),
        agent_instructions: agent
            .instructions
            .or_else(|| env_var("OPENAI_AGENT_INSTRUCTIONS"))
            .unwrap_or_else(|| DEFAULT_AGENT_INSTRUCTIONS.to_string()),
        connect_timeout_seconds,
        cors_allowed_origins: security
            .cors_allowed_origins
            .or_else(|| env_var("CORS_ALLOWED_ORIGINS")),
    })
}
