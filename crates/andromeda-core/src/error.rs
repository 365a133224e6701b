// ── Core error types ──
//
// Errors surfaced by the session store, the auth interceptor and the
// realtime layer. Raw API failures are translated here so callers deal
// in session terms ("refresh failed") rather than HTTP status codes.

use andromeda_api::Error as ApiError;
use thiserror::Error;

use crate::realtime::ChannelKind;
use crate::session::StorageError;

/// Failures of the session/token lifecycle.
#[derive(Debug, Error)]
pub enum AuthError {
    #[error("Invalid credentials: {message}")]
    InvalidCredentials { message: String },

    /// The refresh token is missing, expired or revoked, or the refresh
    /// request itself failed.
    #[error("Token refresh failed: {reason}")]
    RefreshFailed { reason: String },

    #[error("Not authenticated")]
    NotAuthenticated,

    #[error("Session storage error: {0}")]
    Storage(#[from] StorageError),

    #[error("Request failed: {0}")]
    Request(#[source] ApiError),
}

impl From<ApiError> for AuthError {
    fn from(err: ApiError) -> Self {
        match err {
            ApiError::InvalidCredentials { message } => Self::InvalidCredentials { message },
            other => Self::Request(other),
        }
    }
}

/// Realtime channel failures.
///
/// These are logged by the channel task and turned into state
/// transitions; subscribers never receive them.
#[derive(Debug, Error)]
pub enum TransportError {
    #[error("{channel} channel failed to connect: {reason}")]
    ConnectFailed { channel: ChannelKind, reason: String },

    #[error("{channel} channel closed: {reason}")]
    Closed { channel: ChannelKind, reason: String },

    #[error("{channel} channel dropped a malformed frame: {message}")]
    MalformedFrame { channel: ChannelKind, message: String },
}

/// Unified error type for the core crate.
#[derive(Debug, Error)]
pub enum CoreError {
    #[error(transparent)]
    Auth(#[from] AuthError),

    #[error(transparent)]
    Transport(#[from] TransportError),

    #[error("Cannot reach server at {url}: {reason}")]
    ConnectionFailed { url: String, reason: String },

    #[error("Request timed out")]
    Timeout,

    #[error("API error: {message}")]
    Api {
        message: String,
        /// HTTP status code (if applicable).
        status: Option<u16>,
    },

    #[error("Configuration error: {message}")]
    Config { message: String },

    #[error("Internal error: {0}")]
    Internal(String),
}

impl CoreError {
    /// Whether the user has to log in (again) to recover.
    pub fn requires_login(&self) -> bool {
        match self {
            Self::Auth(AuthError::NotAuthenticated | AuthError::RefreshFailed { .. }) => true,
            Self::Auth(AuthError::Request(e)) => e.is_unauthorized(),
            Self::Api { status, .. } => *status == Some(401),
            _ => false,
        }
    }
}

// ── Conversion from transport-layer errors ───────────────────────────

impl From<ApiError> for CoreError {
    fn from(err: ApiError) -> Self {
        match err {
            ApiError::InvalidCredentials { message } => {
                Self::Auth(AuthError::InvalidCredentials { message })
            }
            ApiError::Unauthorized { path } => Self::Api {
                message: format!("Unauthorized for {path}"),
                status: Some(401),
            },
            ApiError::Transport(ref e) => {
                if e.is_timeout() {
                    Self::Timeout
                } else if e.is_connect() {
                    Self::ConnectionFailed {
                        url: e
                            .url()
                            .map_or_else(|| "<unknown>".into(), ToString::to_string),
                        reason: e.to_string(),
                    }
                } else {
                    Self::Api {
                        message: e.to_string(),
                        status: e.status().map(|s| s.as_u16()),
                    }
                }
            }
            ApiError::InvalidUrl(e) => Self::Config {
                message: format!("Invalid URL: {e}"),
            },
            ApiError::Tls(msg) => Self::ConnectionFailed {
                url: String::new(),
                reason: format!("TLS error: {msg}"),
            },
            ApiError::Api { status, message } => Self::Api {
                message,
                status: Some(status),
            },
            ApiError::WebSocketConnect(reason) => Self::ConnectionFailed {
                url: String::new(),
                reason: format!("WebSocket connection failed: {reason}"),
            },
            ApiError::WebSocketClosed { code, reason } => Self::ConnectionFailed {
                url: String::new(),
                reason: format!("WebSocket closed (code {code}): {reason}"),
            },
            ApiError::Deserialization { message, body: _ } => {
                Self::Internal(format!("Deserialization error: {message}"))
            }
            ApiError::MalformedFrame { message } => {
                Self::Internal(format!("Malformed frame: {message}"))
            }
        }
    }
}
