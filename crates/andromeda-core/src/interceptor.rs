// ── Auth request interceptor ──
//
// Every authenticated REST call goes through `AuthInterceptor::send`: it
// attaches the current access token and, on HTTP 401, refreshes the token
// once and replays the request. When the refresh fails the session is
// ended and a `LoginRequired` event is published for the UI shell.

use andromeda_api::rest::notifications;
use andromeda_api::{ApiRequest, ApiResponse, Error, UnreadCount, User};
use serde::de::DeserializeOwned;
use tokio::sync::broadcast;
use tracing::{debug, warn};

use crate::session::SessionStore;

const AUTH_EVENT_CHANNEL_SIZE: usize = 16;

/// Side effects the interceptor asks the application shell to perform.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthEvent {
    /// The session could not be recovered; navigate to the login screen.
    LoginRequired,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Attempt {
    Initial,
    Retry,
}

/// Bearer-token attachment with a single refresh-and-retry on 401.
#[derive(Debug, Clone)]
pub struct AuthInterceptor {
    session: SessionStore,
    events: broadcast::Sender<AuthEvent>,
}

impl AuthInterceptor {
    pub fn new(session: SessionStore) -> Self {
        let (events, _) = broadcast::channel(AUTH_EVENT_CHANNEL_SIZE);
        Self { session, events }
    }

    pub fn session(&self) -> &SessionStore {
        &self.session
    }

    /// Subscribe to navigation side effects.
    pub fn events(&self) -> broadcast::Receiver<AuthEvent> {
        self.events.subscribe()
    }

    /// Send `request`, authenticating it with the current session.
    ///
    /// Requests to the token-refresh endpoint pass through untouched. On a
    /// 401 the access token is refreshed and the request is sent exactly
    /// once more; if the refresh fails the caller gets the original 401.
    pub async fn send(&self, request: &ApiRequest) -> Result<ApiResponse, Error> {
        let api = self.session.api();

        if request.targets_token_refresh() {
            return api.execute(request, None).await;
        }

        let mut attempt = Attempt::Initial;
        let mut bearer = self.session.access_token();

        loop {
            match api.execute(request, bearer.as_ref()).await {
                Err(err) if err.is_unauthorized() && attempt == Attempt::Initial => {
                    attempt = Attempt::Retry;
                    debug!(path = %request.path(), "request unauthorized, refreshing token");

                    match self.session.refresh().await {
                        Ok(token) => bearer = Some(token),
                        Err(refresh_err) => {
                            warn!(error = %refresh_err, "token refresh failed, ending session");
                            self.session.logout();
                            let _ = self.events.send(AuthEvent::LoginRequired);
                            return Err(err);
                        }
                    }
                }
                result => return result,
            }
        }
    }

    /// [`send`](Self::send) and decode the JSON body.
    pub async fn send_json<T: DeserializeOwned>(&self, request: &ApiRequest) -> Result<T, Error> {
        self.send(request).await?.json()
    }

    // ── Typed helpers ────────────────────────────────────────────────

    /// `GET auth/me/`; the profile is written back to the session store.
    pub async fn current_user(&self) -> Result<User, Error> {
        let request = ApiRequest::get(andromeda_api::AuthEndpoint::Me.path());
        let user: User = self.send_json(&request).await?;
        if let Err(e) = self.session.update_user(user.clone()) {
            warn!(error = %e, "failed to store refreshed profile");
        }
        Ok(user)
    }

    /// Server-side count of unread notifications.
    pub async fn unread_count(&self) -> Result<u64, Error> {
        let count: UnreadCount = self.send_json(&notifications::unread_count()).await?;
        Ok(count.unread_count)
    }

    pub async fn mark_all_notifications_read(&self) -> Result<(), Error> {
        self.send(&notifications::mark_all_read()).await?;
        Ok(())
    }
}
