//! Configuration validation.

use std::path::PathBuf;

use super::TlsConfig;

/// The upstream credential must be present and non-blank.
pub fn validate_credential(credential: &str) -> Result<(), Box<dyn std::error::Error>> {
    if credential.trim().is_empty() {
        return Err("Missing OpenAI credential: set OPENAI_EPHEMERAL_KEY or realtime.api_key".into());
    }
    Ok(())
}

/// Certificate and key must be configured together.
pub fn validate_tls(
    cert_path: Option<String>,
    key_path: Option<String>,
) -> Result<Option<TlsConfig>, Box<dyn std::error::Error>> {
    match (cert_path, key_path) {
        (Some(cert), Some(key)) => Ok(Some(TlsConfig {
            cert_path: PathBuf::from(cert),
            key_path: PathBuf::from(key),
        })),
        (None, None) => Ok(None),
        (Some(_), None) => Err("TLS_CERT_PATH is set but TLS_KEY_PATH is missing".into()),
        (None, Some(_)) => Err("TLS_KEY_PATH is set but TLS_CERT_PATH is missing".into()),
    }
}

/// The upstream URL must parse and use `ws` or `wss`.
pub fn validate_realtime_url(url: &str) -> Result<(), Box<dyn std::error::Error>> {
    let parsed = url::Url::parse(url).map_err(|e| format!("Invalid realtime URL '{url}': {e}"))?;
    match parsed.scheme() {
        "ws" | "wss" => Ok(()),
        other => Err(format!("Realtime URL must use ws or wss, got '{other}'").into()),
    }
}

pub fn validate_connect_timeout(seconds: u64) -> Result<(), Box<dyn std::error::Error>> {
    if seconds == 0 {
        return Err("REALTIME_CONNECT_TIMEOUT_SECONDS must be greater than 0".into());
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validate_credential() {
        assert!(validate_credential("ek_123").is_ok());
        assert!(validate_credential("").is_err());
        assert!(validate_credential("   ").is_err());
    }

    #[test]
    fn test_validate_tls_pairs() {
        assert!(validate_tls(None, None).unwrap().is_none());

        let tls = validate_tls(Some("/c.pem".into()), Some("/k.pem".into()))
            .unwrap()
            .unwrap();
        assert_eq!(tls.cert_path, PathBuf::from("/c.pem"));
        assert_eq!(tls.key_path, PathBuf::from("/k.pem"));

        let err = validate_tls(Some("/c.pem".into()), None).unwrap_err();
        assert!(err.to_string().contains("TLS_KEY_PATH"));
        let err = validate_tls(None, Some("/k.pem".into())).unwrap_err();
        assert!(err.to_string().contains("TLS_CERT_PATH"));
    }

    #[test]
    fn test_validate_realtime_url() {
        assert!(validate_realtime_url("wss://api.openai.com/v1/realtime").is_ok());
        assert!(validate_realtime_url("ws://127.0.0.1:9000/v1/realtime").is_ok());

        let err = validate_realtime_url("https://api.openai.com/v1/realtime").unwrap_err();
        assert!(err.to_string().contains("ws or wss"));
        assert!(validate_realtime_url("not a url").is_err());
    }

    #[test]
    fn test_validate_connect_timeout() {
        assert!(validate_connect_timeout(1).is_ok());
        assert!(validate_connect_timeout(0).is_err());
    }
}
