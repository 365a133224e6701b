// ── Runtime client configuration ──
//
// Describes *where* the client talks to and how patiently. Carries no
// credentials and never touches disk: the CLI (or any other shell)
// builds a `ClientConfig` from its profile and hands it in.

use std::time::Duration;

use andromeda_api::transport::{TlsMode, TransportConfig};
use url::Url;

use crate::error::CoreError;

/// Delay before the notifications channel reconnects after a close.
pub const DEFAULT_RECONNECT_DELAY: Duration = Duration::from_secs(5);

/// Buffered events per subscription stream before slow subscribers lag.
pub const DEFAULT_EVENT_CAPACITY: usize = 256;

/// TLS verification strategy.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum TlsVerification {
    /// System CA store (strict).
    #[default]
    SystemDefaults,
    /// Custom CA certificate file.
    CustomCa(std::path::PathBuf),
    /// Skip verification (self-signed development servers).
    DangerAcceptInvalid,
}

/// Connection settings for one Andromeda deployment.
#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// REST API root, e.g. `http://localhost/api/`.
    pub api_url: Url,
    /// WebSocket root, e.g. `ws://localhost/ws/`.
    pub ws_url: Url,
    pub tls: TlsVerification,
    /// Per-request timeout.
    pub timeout: Duration,
    pub reconnect_delay: Duration,
    pub event_capacity: usize,
}

impl ClientConfig {
    pub fn new(api_url: Url, ws_url: Url) -> Self {
        Self {
            api_url,
            ws_url,
            tls: TlsVerification::default(),
            timeout: Duration::from_secs(30),
            reconnect_delay: DEFAULT_RECONNECT_DELAY,
            event_capacity: DEFAULT_EVENT_CAPACITY,
        }
    }

    /// Derive both roots from a server origin: `{server}/api/` and
    /// `ws(s)://{host}/ws/`.
    pub fn from_server(server: &Url) -> Result<Self, CoreError> {
        let api_url = server.join("api/").map_err(invalid_url)?;

        let mut ws_url = server.join("ws/").map_err(invalid_url)?;
        let scheme = match server.scheme() {
            "https" | "wss" => "wss",
            "http" | "ws" => "ws",
            other => {
                return Err(CoreError::Config {
                    message: format!("unsupported server scheme `{other}`"),
                });
            }
        };
        ws_url.set_scheme(scheme).map_err(|()| CoreError::Config {
            message: format!("cannot derive a WebSocket URL from {server}"),
        })?;

        Ok(Self::new(api_url, ws_url))
    }

    /// HTTP transport settings derived from this configuration.
    pub fn transport(&self) -> TransportConfig {
        TransportConfig {
            tls: tls_to_transport(&self.tls),
            timeout: self.timeout,
        }
    }
}

fn tls_to_transport(tls: &TlsVerification) -> TlsMode {
    match tls {
        TlsVerification::SystemDefaults => TlsMode::System,
        TlsVerification::CustomCa(path) => TlsMode::CustomCa(path.clone()),
        TlsVerification::DangerAcceptInvalid => TlsMode::DangerAcceptInvalid,
    }
}

fn invalid_url(err: url::ParseError) -> CoreError {
    CoreError::Config {
        message: format!("Invalid URL: {err}"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn derives_roots_from_https_server() {
        let server = Url::parse("https://social.example.com").expect("valid url");
        let config = ClientConfig::from_server(&server).expect("derives");
        assert_eq!(config.api_url.as_str(), "https://social.example.com/api/");
        assert_eq!(config.ws_url.as_str(), "wss://social.example.com/ws/");
        assert_eq!(config.reconnect_delay, Duration::from_secs(5));
    }

    #[test]
    fn derives_roots_from_plain_http_with_port() {
        let server = Url::parse("http://localhost:8000/").expect("valid url");
        let config = ClientConfig::from_server(&server).expect("derives");
        assert_eq!(config.api_url.as_str(), "http://localhost:8000/api/");
        assert_eq!(config.ws_url.as_str(), "ws://localhost:8000/ws/");
    }

    #[test]
    fn rejects_unknown_scheme() {
        let server = Url::parse("ftp://example.com").expect("valid url");
        assert!(matches!(
            ClientConfig::from_server(&server),
            Err(CoreError::Config { .. })
        ));
    }

    #[test]
    fn transport_carries_tls_and_timeout() {
        let mut config = ClientConfig::new(
            Url::parse("http://localhost/api/").expect("valid url"),
            Url::parse("ws://localhost/ws/").expect("valid url"),
        );
        config.tls = TlsVerification::DangerAcceptInvalid;
        config.timeout = Duration::from_secs(3);

        let transport = config.transport();
        assert!(matches!(transport.tls, TlsMode::DangerAcceptInvalid));
        assert_eq!(transport.timeout, Duration::from_secs(3));
    }
}
