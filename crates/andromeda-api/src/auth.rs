use secrecy::{ExposeSecret, SecretString};
use serde::Deserialize;

use crate::models::User;

/// Path fragment shared by every token-refresh URL. Requests whose path
/// contains it are never retried by the auth interceptor.
pub const TOKEN_REFRESH_MARKER: &str = "token/refresh";

/// REST endpoints used by the authentication flows.
///
/// Paths are relative to the API base URL (e.g. `http://host/api/`).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthEndpoint {
    /// `POST auth/login/` -- credentials for a token pair.
    Login,
    /// `POST auth/register/` -- new account, returns user + tokens.
    Register,
    /// `POST auth/token/refresh/` -- refresh token for a new access token.
    TokenRefresh,
    /// `POST auth/token/blacklist/` -- invalidate a refresh token.
    TokenBlacklist,
    /// `GET auth/me/` -- the authenticated user's profile.
    Me,
}

impl AuthEndpoint {
    pub fn path(self) -> &'static str {
        match self {
            Self::Login => "auth/login/",
            Self::Register => "auth/register/",
            Self::TokenRefresh => "auth/token/refresh/",
            Self::TokenBlacklist => "auth/token/blacklist/",
            Self::Me => "auth/me/",
        }
    }
}

/// Username/password pair for `POST auth/login/`.
#[derive(Debug, Clone)]
pub struct Credentials {
    pub username: String,
    pub password: SecretString,
}

impl Credentials {
    pub fn new(username: impl Into<String>, password: SecretString) -> Self {
        Self {
            username: username.into(),
            password,
        }
    }

    pub(crate) fn to_body(&self) -> serde_json::Value {
        serde_json::json!({
            "username": self.username,
            "password": self.password.expose_secret(),
        })
    }
}

/// Payload for `POST auth/register/`.
#[derive(Debug, Clone)]
pub struct RegisterRequest {
    pub username: String,
    pub email: String,
    pub first_name: String,
    pub last_name: String,
    pub password: SecretString,
}

impl RegisterRequest {
    pub(crate) fn to_body(&self) -> serde_json::Value {
        let password = self.password.expose_secret();
        serde_json::json!({
            "username": self.username,
            "email": self.email,
            "first_name": self.first_name,
            "last_name": self.last_name,
            "password": password,
            "password2": password,
        })
    }
}

/// Access + refresh token pair.
#[derive(Debug, Clone)]
pub struct TokenPair {
    pub access: SecretString,
    pub refresh: SecretString,
}

/// Result of a successful registration.
#[derive(Debug, Clone)]
pub struct Registration {
    pub user: User,
    pub tokens: TokenPair,
}

// ── Wire shapes ─────────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
pub(crate) struct TokenPairWire {
    pub access: String,
    pub refresh: String,
}

impl From<TokenPairWire> for TokenPair {
    fn from(wire: TokenPairWire) -> Self {
        Self {
            access: SecretString::from(wire.access),
            refresh: SecretString::from(wire.refresh),
        }
    }
}

#[derive(Debug, Deserialize)]
pub(crate) struct RegistrationWire {
    pub user: User,
    pub tokens: TokenPairWire,
}

#[derive(Debug, Deserialize)]
pub(crate) struct AccessTokenWire {
    pub access: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn refresh_endpoint_carries_marker() {
        assert!(AuthEndpoint::TokenRefresh.path().contains(TOKEN_REFRESH_MARKER));
        assert!(!AuthEndpoint::TokenBlacklist.path().contains(TOKEN_REFRESH_MARKER));
        assert!(!AuthEndpoint::Login.path().contains(TOKEN_REFRESH_MARKER));
    }

    #[test]
    fn register_body_repeats_password() {
        let req = RegisterRequest {
            username: "ada".into(),
            email: "ada@example.com".into(),
            first_name: "Ada".into(),
            last_name: "Lovelace".into(),
            password: SecretString::from("engine".to_string()),
        };
        let body = req.to_body();
        assert_eq!(body["password"], "engine");
        assert_eq!(body["password2"], "engine");
        assert_eq!(body["username"], "ada");
    }
}
