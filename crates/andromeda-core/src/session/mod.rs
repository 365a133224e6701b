// ── Session/token store ──
//
// Single source of truth for the authenticated identity. The store keeps
// an in-memory mirror of the persisted state in a `watch` channel so
// reads are synchronous and observers see every login, refresh, profile
// update and logout.

mod storage;

use std::sync::Arc;

use andromeda_api::{ApiClient, Credentials, RegisterRequest, TokenPair, User};
use secrecy::{ExposeSecret, SecretString};
use tokio::sync::{Mutex, watch};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::error::AuthError;

pub use storage::{MemoryStorage, SessionStorage, StorageError, StorageKey};

/// The authenticated identity.
#[derive(Debug, Clone)]
pub struct Session {
    pub access_token: SecretString,
    pub refresh_token: Option<SecretString>,
    pub user: Option<User>,
}

/// Owns the session: tokens, current user, and their persistence.
///
/// Cheaply cloneable; clones share state.
#[derive(Clone)]
pub struct SessionStore {
    inner: Arc<StoreInner>,
}

struct StoreInner {
    api: ApiClient,
    storage: Arc<dyn SessionStorage>,
    session: watch::Sender<Option<Arc<Session>>>,
    refresh_lock: Mutex<()>,
}

impl std::fmt::Debug for SessionStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionStore")
            .field("authenticated", &self.is_authenticated())
            .finish_non_exhaustive()
    }
}

impl SessionStore {
    /// Create a store, restoring any session persisted in `storage`.
    pub fn new(api: ApiClient, storage: Arc<dyn SessionStorage>) -> Self {
        let restored = restore(storage.as_ref()).map(Arc::new);
        if restored.is_some() {
            debug!("restored persisted session");
        }
        let (session, _) = watch::channel(restored);

        Self {
            inner: Arc::new(StoreInner {
                api,
                storage,
                session,
                refresh_lock: Mutex::new(()),
            }),
        }
    }

    /// The raw API client the store authenticates against.
    pub fn api(&self) -> &ApiClient {
        &self.inner.api
    }

    // ── Reads ────────────────────────────────────────────────────────

    /// `true` iff an access token is present.
    pub fn is_authenticated(&self) -> bool {
        self.inner.session.borrow().is_some()
    }

    pub fn current_session(&self) -> Option<Arc<Session>> {
        self.inner.session.borrow().clone()
    }

    /// Subscribe to session changes. `None` means logged out.
    pub fn observe_session(&self) -> watch::Receiver<Option<Arc<Session>>> {
        self.inner.session.subscribe()
    }

    pub fn access_token(&self) -> Option<SecretString> {
        self.inner
            .session
            .borrow()
            .as_ref()
            .map(|s| s.access_token.clone())
    }

    pub fn refresh_token(&self) -> Option<SecretString> {
        self.inner
            .session
            .borrow()
            .as_ref()
            .and_then(|s| s.refresh_token.clone())
    }

    pub fn current_user(&self) -> Option<User> {
        self.inner
            .session
            .borrow()
            .as_ref()
            .and_then(|s| s.user.clone())
    }

    // ── Lifecycle ────────────────────────────────────────────────────

    /// Exchange credentials for a token pair, then fetch the profile.
    ///
    /// A failed profile fetch does not fail the login; the session simply
    /// starts without a user.
    pub async fn login(&self, credentials: &Credentials) -> Result<Arc<Session>, AuthError> {
        let tokens = self.inner.api.login(credentials).await?;

        let user = match self.inner.api.current_user(&tokens.access).await {
            Ok(user) => Some(user),
            Err(e) => {
                warn!(error = %e, "failed to fetch profile after login");
                None
            }
        };

        let session = self.establish(tokens, user)?;
        info!(username = %credentials.username, "logged in");
        Ok(session)
    }

    /// Create an account; the server logs the new user in immediately.
    pub async fn register(&self, request: &RegisterRequest) -> Result<Arc<Session>, AuthError> {
        let registration = self.inner.api.register(request).await?;
        let session = self.establish(registration.tokens, Some(registration.user))?;
        info!(username = %request.username, "registered");
        Ok(session)
    }

    /// Re-fetch the current user's profile with the stored access token.
    pub async fn fetch_profile(&self) -> Result<User, AuthError> {
        let token = self.access_token().ok_or(AuthError::NotAuthenticated)?;
        let user = self.inner.api.current_user(&token).await?;
        self.update_user(user.clone())?;
        Ok(user)
    }

    /// Replace the stored profile of the logged-in user.
    pub fn update_user(&self, user: User) -> Result<(), AuthError> {
        if !self.is_authenticated() {
            return Err(AuthError::NotAuthenticated);
        }
        let json = serde_json::to_string(&user).map_err(StorageError::from)?;
        self.inner.storage.store(StorageKey::User, &json)?;

        self.inner.session.send_modify(|current| {
            if let Some(session) = current {
                Arc::make_mut(session).user = Some(user);
            }
        });
        Ok(())
    }

    /// Exchange the refresh token for a new access token.
    ///
    /// Concurrent calls are serialized; a caller that waited while another
    /// refresh succeeded gets that token instead of refreshing again. The
    /// refresh token itself is never rotated here, and a failure leaves the
    /// session in place.
    pub async fn refresh(&self) -> Result<SecretString, AuthError> {
        let before = self.access_token();
        let _guard = self.inner.refresh_lock.lock().await;

        if let (Some(before), Some(current)) = (&before, self.access_token()) {
            if before.expose_secret() != current.expose_secret() {
                debug!("access token already refreshed by a concurrent caller");
                return Ok(current);
            }
        }

        let refresh = self.refresh_token().ok_or_else(|| AuthError::RefreshFailed {
            reason: "no refresh token".into(),
        })?;

        debug!("refreshing access token");
        let access = self
            .inner
            .api
            .refresh_access_token(&refresh)
            .await
            .map_err(|e| AuthError::RefreshFailed {
                reason: e.to_string(),
            })?;

        // A logout may have raced the request.
        if !self.is_authenticated() {
            return Err(AuthError::RefreshFailed {
                reason: "session ended during refresh".into(),
            });
        }

        self.inner
            .storage
            .store(StorageKey::AccessToken, access.expose_secret())?;
        self.inner.session.send_modify(|current| {
            if let Some(session) = current {
                Arc::make_mut(session).access_token = access.clone();
            }
        });

        debug!("access token refreshed");
        Ok(access)
    }

    /// End the session.
    ///
    /// The refresh token is blacklisted server-side in the background
    /// (failures ignored); persisted state is cleared and observers see
    /// `None` before this returns. Never fails.
    ///
    /// Returns the blacklist task, if one was started, for callers that
    /// must not exit before it finishes.
    pub fn logout(&self) -> Option<JoinHandle<()>> {
        let blacklist = self.refresh_token().and_then(|refresh| {
            match tokio::runtime::Handle::try_current() {
                Ok(handle) => {
                    let api = self.inner.api.clone();
                    Some(handle.spawn(async move {
                        if let Err(e) = api.blacklist_refresh_token(&refresh).await {
                            debug!(error = %e, "token blacklist failed (ignored)");
                        }
                    }))
                }
                Err(_) => {
                    debug!("no runtime, skipping token blacklist");
                    None
                }
            }
        });

        if let Err(e) = self.inner.storage.clear() {
            warn!(error = %e, "failed to clear persisted session");
        }

        let was_authenticated = self.inner.session.send_replace(None).is_some();
        if was_authenticated {
            info!("logged out");
        }
        blacklist
    }

    // ── Helpers ──────────────────────────────────────────────────────

    fn establish(&self, tokens: TokenPair, user: Option<User>) -> Result<Arc<Session>, AuthError> {
        let storage = &self.inner.storage;
        storage.store(StorageKey::AccessToken, tokens.access.expose_secret())?;
        storage.store(StorageKey::RefreshToken, tokens.refresh.expose_secret())?;
        match &user {
            Some(user) => {
                let json = serde_json::to_string(user).map_err(StorageError::from)?;
                storage.store(StorageKey::User, &json)?;
            }
            None => storage.remove(StorageKey::User)?,
        }

        let session = Arc::new(Session {
            access_token: tokens.access,
            refresh_token: Some(tokens.refresh),
            user,
        });
        self.inner.session.send_replace(Some(Arc::clone(&session)));
        Ok(session)
    }
}

/// Rebuild a session from persisted state. No access token means no
/// session; an unreadable profile is dropped rather than failing.
fn restore(storage: &dyn SessionStorage) -> Option<Session> {
    let access = match storage.load(StorageKey::AccessToken) {
        Ok(Some(token)) => SecretString::from(token),
        Ok(None) => return None,
        Err(e) => {
            warn!(error = %e, "failed to read persisted access token");
            return None;
        }
    };

    let refresh = storage
        .load(StorageKey::RefreshToken)
        .inspect_err(|e| warn!(error = %e, "failed to read persisted refresh token"))
        .ok()
        .flatten()
        .map(SecretString::from);

    let user = match storage.load(StorageKey::User) {
        Ok(Some(json)) => serde_json::from_str(&json)
            .inspect_err(|e| warn!(error = %e, "discarding unreadable persisted user"))
            .ok(),
        Ok(None) => None,
        Err(e) => {
            warn!(error = %e, "failed to read persisted user");
            None
        }
    };

    Some(Session {
        access_token: access,
        refresh_token: refresh,
        user,
    })
}
