// REST API HTTP client
//
// Wraps `reqwest::Client` with base-URL resolution, bearer-token
// attachment, and status-code mapping. Endpoint groups (auth,
// notifications) are implemented as inherent methods in sibling files to
// keep this module focused on transport mechanics.

use reqwest::{Method, StatusCode};
use secrecy::{ExposeSecret, SecretString};
use serde::de::DeserializeOwned;
use serde_json::Value;
use tracing::{debug, trace};
use url::Url;

use crate::auth::TOKEN_REFRESH_MARKER;
use crate::error::Error;
use crate::transport::TransportConfig;

/// Longest body excerpt carried in an error message.
const ERROR_BODY_PREVIEW: usize = 200;

// ── ApiRequest ──────────────────────────────────────────────────────

/// A replayable description of one REST call.
///
/// Requests are plain data so an interceptor can re-send the same
/// request with a different bearer token.
#[derive(Debug, Clone, PartialEq)]
pub struct ApiRequest {
    method: Method,
    path: String,
    query: Vec<(String, String)>,
    body: Option<Value>,
}

impl ApiRequest {
    pub fn new(method: Method, path: impl Into<String>) -> Self {
        Self {
            method,
            path: path.into(),
            query: Vec::new(),
            body: None,
        }
    }

    pub fn get(path: impl Into<String>) -> Self {
        Self::new(Method::GET, path)
    }

    pub fn post(path: impl Into<String>, body: Value) -> Self {
        Self::new(Method::POST, path).with_body(body)
    }

    pub fn patch(path: impl Into<String>, body: Value) -> Self {
        Self::new(Method::PATCH, path).with_body(body)
    }

    pub fn delete(path: impl Into<String>) -> Self {
        Self::new(Method::DELETE, path)
    }

    pub fn with_body(mut self, body: Value) -> Self {
        self.body = Some(body);
        self
    }

    pub fn with_query(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.query.push((key.into(), value.into()));
        self
    }

    pub fn method(&self) -> &Method {
        &self.method
    }

    /// Path relative to the API base URL.
    pub fn path(&self) -> &str {
        &self.path
    }

    pub fn body(&self) -> Option<&Value> {
        self.body.as_ref()
    }

    /// Whether this request hits the token-refresh endpoint.
    pub fn targets_token_refresh(&self) -> bool {
        self.path.contains(TOKEN_REFRESH_MARKER)
    }
}

// ── ApiResponse ─────────────────────────────────────────────────────

/// A successful (2xx) response with its body already read.
#[derive(Debug, Clone)]
pub struct ApiResponse {
    status: StatusCode,
    body: String,
}

impl ApiResponse {
    pub fn status(&self) -> StatusCode {
        self.status
    }

    pub fn text(&self) -> &str {
        &self.body
    }

    /// Decode the body as JSON.
    pub fn json<T: DeserializeOwned>(&self) -> Result<T, Error> {
        serde_json::from_str(&self.body).map_err(|e| Error::Deserialization {
            message: format!("{e} (body preview: {:?})", preview(&self.body)),
            body: self.body.clone(),
        })
    }
}

// ── ApiClient ───────────────────────────────────────────────────────

/// Raw HTTP client for the Andromeda REST API.
///
/// Knows nothing about sessions: callers pass the bearer token per call.
/// Token lifecycle and retry-on-401 live in `andromeda-core`.
#[derive(Debug, Clone)]
pub struct ApiClient {
    http: reqwest::Client,
    base_url: Url,
}

impl ApiClient {
    /// Create a client from a `TransportConfig`.
    ///
    /// `base_url` is the API root, e.g. `http://localhost/api`.
    pub fn new(base_url: Url, transport: &TransportConfig) -> Result<Self, Error> {
        let http = transport.build_client()?;
        Ok(Self::with_client(http, base_url))
    }

    /// Create a client around a pre-built `reqwest::Client`.
    pub fn with_client(http: reqwest::Client, base_url: Url) -> Self {
        Self {
            http,
            base_url: with_trailing_slash(base_url),
        }
    }

    /// The underlying HTTP client.
    pub fn http(&self) -> &reqwest::Client {
        &self.http
    }

    /// The API base URL (always ends with `/`).
    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    /// Resolve a relative API path against the base URL.
    pub fn url(&self, path: &str) -> Result<Url, Error> {
        Ok(self.base_url.join(path.trim_start_matches('/'))?)
    }

    /// Send a request, attaching `bearer` as an `Authorization` header
    /// when given.
    ///
    /// HTTP 401 maps to [`Error::Unauthorized`]; every other non-2xx
    /// status maps to [`Error::Api`].
    pub async fn execute(
        &self,
        request: &ApiRequest,
        bearer: Option<&SecretString>,
    ) -> Result<ApiResponse, Error> {
        let url = self.url(&request.path)?;
        debug!(method = %request.method, %url, authenticated = bearer.is_some(), "sending request");

        let mut builder = self.http.request(request.method.clone(), url);
        if !request.query.is_empty() {
            builder = builder.query(&request.query);
        }
        if let Some(ref body) = request.body {
            builder = builder.json(body);
        }
        if let Some(token) = bearer {
            builder = builder.bearer_auth(token.expose_secret());
        }

        let resp = builder.send().await?;
        let status = resp.status();
        trace!(%status, path = %request.path, "response received");

        if status == StatusCode::UNAUTHORIZED {
            return Err(Error::Unauthorized {
                path: request.path.clone(),
            });
        }

        let body = resp.text().await?;

        if !status.is_success() {
            return Err(Error::Api {
                status: status.as_u16(),
                message: api_error_message(status, &body),
            });
        }

        Ok(ApiResponse { status, body })
    }

    /// Send a request and decode the JSON body.
    pub async fn execute_json<T: DeserializeOwned>(
        &self,
        request: &ApiRequest,
        bearer: Option<&SecretString>,
    ) -> Result<T, Error> {
        self.execute(request, bearer).await?.json()
    }
}

fn with_trailing_slash(mut url: Url) -> Url {
    if !url.path().ends_with('/') {
        let path = format!("{}/", url.path());
        url.set_path(&path);
    }
    url
}

/// Extract a human-readable message from an error body.
///
/// The server uses DRF conventions: `{"detail": "..."}` for most errors,
/// field maps for validation failures.
fn api_error_message(status: StatusCode, body: &str) -> String {
    if let Ok(Value::Object(map)) = serde_json::from_str::<Value>(body) {
        if let Some(Value::String(detail)) = map.get("detail") {
            return detail.clone();
        }
    }
    if body.trim().is_empty() {
        return status.to_string();
    }
    preview(body)
}

fn preview(body: &str) -> String {
    body.chars().take(ERROR_BODY_PREVIEW).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn client(base: &str) -> ApiClient {
        ApiClient::with_client(
            reqwest::Client::new(),
            Url::parse(base).expect("valid base"),
        )
    }

    #[test]
    fn base_url_gains_trailing_slash() {
        let api = client("http://localhost/api");
        assert_eq!(api.base_url().as_str(), "http://localhost/api/");
        assert_eq!(
            api.url("/auth/me/").expect("joins").as_str(),
            "http://localhost/api/auth/me/"
        );
        assert_eq!(
            api.url("notifications/unread-count/").expect("joins").as_str(),
            "http://localhost/api/notifications/unread-count/"
        );
    }

    #[test]
    fn refresh_requests_are_recognised() {
        assert!(ApiRequest::post("auth/token/refresh/", Value::Null).targets_token_refresh());
        assert!(!ApiRequest::get("auth/me/").targets_token_refresh());
    }

    #[test]
    fn error_message_prefers_detail() {
        let msg = api_error_message(
            StatusCode::FORBIDDEN,
            r#"{"detail":"You do not have permission."}"#,
        );
        assert_eq!(msg, "You do not have permission.");

        let msg = api_error_message(StatusCode::BAD_GATEWAY, "");
        assert_eq!(msg, "502 Bad Gateway");

        let long = "x".repeat(500);
        assert_eq!(api_error_message(StatusCode::BAD_REQUEST, &long).len(), ERROR_BODY_PREVIEW);
    }
}
