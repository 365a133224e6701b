//! CLI error types with miette diagnostics.
//!
//! Maps `CoreError` variants into user-facing errors with actionable help text.

use miette::Diagnostic;
use thiserror::Error;

use andromeda_config::ConfigError;
use andromeda_core::{AuthError, CoreError};

/// Process exit codes.
pub mod exit_code {
    pub const GENERAL: i32 = 1;
    pub const USAGE: i32 = 2;
    pub const AUTH: i32 = 3;
    pub const NOT_FOUND: i32 = 4;
    pub const CONNECTION: i32 = 7;
    pub const TIMEOUT: i32 = 8;
}

#[derive(Debug, Error, Diagnostic)]
pub enum CliError {
    // ── Connection ───────────────────────────────────────────────────

    #[error("Could not connect to server at {url}")]
    #[diagnostic(
        code(andromeda::connection_failed),
        help(
            "Check that the server is running and accessible.\n\
             URL: {url}\n\
             Self-signed certificate? Try --insecure (-k)."
        )
    )]
    ConnectionFailed {
        url: String,
        #[source]
        source: Box<dyn std::error::Error + Send + Sync>,
    },

    #[error("Realtime channel closed: {reason}")]
    #[diagnostic(code(andromeda::channel_closed))]
    ChannelClosed { reason: String },

    // ── Authentication ───────────────────────────────────────────────

    #[error("Authentication failed: {message}")]
    #[diagnostic(
        code(andromeda::auth_failed),
        help("Check the username and password, or store a new one with: andromeda config set-password")
    )]
    AuthFailed { message: String },

    #[error("Not logged in")]
    #[diagnostic(
        code(andromeda::login_required),
        help("The session is missing or has expired. Run: andromeda login")
    )]
    LoginRequired,

    #[error("No username configured for profile '{profile}'")]
    #[diagnostic(
        code(andromeda::no_credentials),
        help("Pass --username, set ANDROMEDA_USERNAME, or run: andromeda config init")
    )]
    NoCredentials { profile: String },

    // ── API ──────────────────────────────────────────────────────────

    #[error("API error ({code}): {message}")]
    #[diagnostic(code(andromeda::api_error))]
    ApiError { code: String, message: String },

    // ── Validation ───────────────────────────────────────────────────

    #[error("Invalid value for {field}: {reason}")]
    #[diagnostic(code(andromeda::validation))]
    Validation { field: String, reason: String },

    // ── Configuration ────────────────────────────────────────────────

    #[error("Profile '{name}' not found in configuration")]
    #[diagnostic(
        code(andromeda::profile_not_found),
        help(
            "Available profiles: {available}\n\
             Create one with: andromeda config init"
        )
    )]
    ProfileNotFound { name: String, available: String },

    #[error("No server configured")]
    #[diagnostic(
        code(andromeda::no_config),
        help(
            "Create a config with: andromeda config init\n\
             Or pass --server. Expected config at: {path}"
        )
    )]
    NoConfig { path: String },

    #[error(transparent)]
    #[diagnostic(code(andromeda::config))]
    Config(#[from] ConfigError),

    #[error("Session storage failed: {message}")]
    #[diagnostic(code(andromeda::storage))]
    Storage { message: String },

    // ── Timeout ──────────────────────────────────────────────────────

    #[error("Request timed out")]
    #[diagnostic(
        code(andromeda::timeout),
        help("Increase timeout with --timeout or check server responsiveness.")
    )]
    Timeout,

    // ── IO / Serialization ────────────────────────────────────────────

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    #[diagnostic(code(andromeda::json))]
    Json(#[from] serde_json::Error),
}

impl CliError {
    /// Map this error to an exit code for process termination.
    pub fn exit_code(&self) -> i32 {
        match self {
            Self::ConnectionFailed { .. } | Self::ChannelClosed { .. } => exit_code::CONNECTION,
            Self::AuthFailed { .. } | Self::LoginRequired | Self::NoCredentials { .. } => {
                exit_code::AUTH
            }
            Self::ProfileNotFound { .. } => exit_code::NOT_FOUND,
            Self::Timeout => exit_code::TIMEOUT,
            Self::Validation { .. } | Self::NoConfig { .. } => exit_code::USAGE,
            _ => exit_code::GENERAL,
        }
    }
}

// ── CoreError → CliError mapping ─────────────────────────────────────

impl From<AuthError> for CliError {
    fn from(err: AuthError) -> Self {
        CoreError::from(err).into()
    }
}

impl From<CoreError> for CliError {
    fn from(err: CoreError) -> Self {
        if err.requires_login() {
            return CliError::LoginRequired;
        }

        match err {
            CoreError::Auth(auth) => match auth {
                AuthError::InvalidCredentials { message } => CliError::AuthFailed { message },
                AuthError::Storage(e) => CliError::Storage {
                    message: e.to_string(),
                },
                AuthError::Request(e) => CoreError::from(e).into(),
                AuthError::NotAuthenticated | AuthError::RefreshFailed { .. } => {
                    CliError::LoginRequired
                }
            },

            CoreError::Transport(e) => CliError::ChannelClosed {
                reason: e.to_string(),
            },

            CoreError::ConnectionFailed { url, reason } => CliError::ConnectionFailed {
                url,
                source: reason.into(),
            },

            CoreError::Timeout => CliError::Timeout,

            CoreError::Api { message, status } => CliError::ApiError {
                code: status.map_or_else(|| "-".into(), |s| s.to_string()),
                message,
            },

            CoreError::Config { message } => CliError::Validation {
                field: "config".into(),
                reason: message,
            },

            CoreError::Internal(message) => CliError::ApiError {
                code: "internal".into(),
                message,
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unauthorized_maps_to_login_required() {
        let err = CliError::from(CoreError::Api {
            message: "Unauthorized for auth/me/".into(),
            status: Some(401),
        });
        assert!(matches!(err, CliError::LoginRequired));
        assert_eq!(err.exit_code(), exit_code::AUTH);
    }

    #[test]
    fn rejected_credentials_map_to_auth_failed() {
        let err = CliError::from(CoreError::Auth(AuthError::InvalidCredentials {
            message: "No active account found".into(),
        }));
        assert!(matches!(err, CliError::AuthFailed { ref message } if message.contains("active")));
        assert_eq!(err.exit_code(), exit_code::AUTH);
    }

    #[test]
    fn server_errors_keep_their_status() {
        let err = CliError::from(CoreError::Api {
            message: "Service unavailable".into(),
            status: Some(503),
        });
        assert!(matches!(err, CliError::ApiError { ref code, .. } if code == "503"));
        assert_eq!(err.exit_code(), exit_code::GENERAL);
    }

    #[test]
    fn connection_failures_use_connection_exit_code() {
        let err = CliError::from(CoreError::ConnectionFailed {
            url: "http://127.0.0.1:9/api/".into(),
            reason: "connection refused".into(),
        });
        assert_eq!(err.exit_code(), exit_code::CONNECTION);
    }
}
