// Authentication endpoints
//
// JWT token-pair login, registration, refresh, and blacklisting.
// None of these attach a bearer token: they either mint tokens or
// consume the refresh token in the request body.

use secrecy::{ExposeSecret, SecretString};
use serde_json::json;
use tracing::debug;

use crate::auth::{
    AccessTokenWire, AuthEndpoint, Credentials, RegisterRequest, Registration,
    RegistrationWire, TokenPair, TokenPairWire,
};
use crate::error::Error;
use crate::models::User;
use crate::rest::client::{ApiClient, ApiRequest};

impl ApiClient {
    /// Exchange a username/password for an access + refresh token pair.
    ///
    /// HTTP 400 and 401 both mean the credentials were rejected and map to
    /// [`Error::InvalidCredentials`].
    pub async fn login(&self, credentials: &Credentials) -> Result<TokenPair, Error> {
        debug!(username = %credentials.username, "logging in");

        let request = ApiRequest::post(AuthEndpoint::Login.path(), credentials.to_body());
        let wire: TokenPairWire = self
            .execute_json(&request, None)
            .await
            .map_err(rejected_as_invalid_credentials)?;

        debug!("login successful");
        Ok(wire.into())
    }

    /// Create an account. The server logs the new user in immediately and
    /// returns both the profile and a token pair.
    pub async fn register(&self, registration: &RegisterRequest) -> Result<Registration, Error> {
        debug!(username = %registration.username, "registering");

        let request = ApiRequest::post(AuthEndpoint::Register.path(), registration.to_body());
        let wire: RegistrationWire = self
            .execute_json(&request, None)
            .await
            .map_err(rejected_as_invalid_credentials)?;

        Ok(Registration {
            user: wire.user,
            tokens: wire.tokens.into(),
        })
    }

    /// Exchange a refresh token for a fresh access token.
    pub async fn refresh_access_token(&self, refresh: &SecretString) -> Result<SecretString, Error> {
        debug!("refreshing access token");

        let body = json!({ "refresh": refresh.expose_secret() });
        let request = ApiRequest::post(AuthEndpoint::TokenRefresh.path(), body);
        let wire: AccessTokenWire = self.execute_json(&request, None).await?;

        Ok(SecretString::from(wire.access))
    }

    /// Invalidate a refresh token server-side.
    pub async fn blacklist_refresh_token(&self, refresh: &SecretString) -> Result<(), Error> {
        debug!("blacklisting refresh token");

        let body = json!({ "refresh": refresh.expose_secret() });
        let request = ApiRequest::post(AuthEndpoint::TokenBlacklist.path(), body);
        self.execute(&request, None).await?;
        Ok(())
    }

    /// Fetch the profile of the user owning `access`.
    pub async fn current_user(&self, access: &SecretString) -> Result<User, Error> {
        let request = ApiRequest::get(AuthEndpoint::Me.path());
        self.execute_json(&request, Some(access)).await
    }
}

fn rejected_as_invalid_credentials(err: Error) -> Error {
    match err {
        Error::Unauthorized { .. } => Error::InvalidCredentials {
            message: "username or password rejected".into(),
        },
        Error::Api {
            status: 400,
            message,
        } => Error::InvalidCredentials { message },
        other => other,
    }
}
