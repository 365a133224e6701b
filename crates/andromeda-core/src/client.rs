// ── Client facade ──
//
// Wires the session store, the auth interceptor and the realtime manager
// together the way an application shell does: notifications connect once
// a session exists, the unread counter starts from the server's count,
// and every realtime channel is torn down when the session ends (by an
// explicit logout or a failed token refresh).

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use andromeda_api::{ApiClient, Connector, Credentials, RegisterRequest, User, WsConnector};
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::config::ClientConfig;
use crate::error::CoreError;
use crate::interceptor::AuthInterceptor;
use crate::realtime::{RealtimeConfig, RealtimeManager};
use crate::session::{Session, SessionStorage, SessionStore};

/// The main entry point for consumers.
///
/// Cheaply cloneable; clones share the same session and channels.
#[derive(Debug)]
pub struct Client<C: Connector = WsConnector> {
    config: ClientConfig,
    session: SessionStore,
    interceptor: AuthInterceptor,
    realtime: RealtimeManager<C>,
    cancel: CancellationToken,
    watching: Arc<AtomicBool>,
}

impl<C: Connector> Clone for Client<C> {
    fn clone(&self) -> Self {
        Self {
            config: self.config.clone(),
            session: self.session.clone(),
            interceptor: self.interceptor.clone(),
            realtime: self.realtime.clone(),
            cancel: self.cancel.clone(),
            watching: Arc::clone(&self.watching),
        }
    }
}

impl Client<WsConnector> {
    /// Create a client that talks to a real server. Does NOT connect:
    /// call [`start()`](Self::start).
    pub fn new(config: ClientConfig, storage: Arc<dyn SessionStorage>) -> Result<Self, CoreError> {
        Self::with_connector(config, storage, WsConnector)
    }
}

impl<C: Connector> Client<C> {
    /// Create a client whose realtime channels open through `connector`.
    pub fn with_connector(
        config: ClientConfig,
        storage: Arc<dyn SessionStorage>,
        connector: C,
    ) -> Result<Self, CoreError> {
        let api = ApiClient::new(config.api_url.clone(), &config.transport())?;
        let session = SessionStore::new(api, storage);
        let interceptor = AuthInterceptor::new(session.clone());
        let realtime =
            RealtimeManager::with_connector(session.clone(), RealtimeConfig::from(&config), connector);

        Ok(Self {
            config,
            session,
            interceptor,
            realtime,
            cancel: CancellationToken::new(),
            watching: Arc::new(AtomicBool::new(false)),
        })
    }

    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    pub fn session(&self) -> &SessionStore {
        &self.session
    }

    /// Send authenticated REST calls through this.
    ///
    /// A failed refresh ends the session; realtime channels only follow
    /// that logout once [`start()`](Self::start) has run.
    pub fn interceptor(&self) -> &AuthInterceptor {
        &self.interceptor
    }

    pub fn realtime(&self) -> &RealtimeManager<C> {
        &self.realtime
    }

    // ── Lifecycle ────────────────────────────────────────────────

    /// Start background work.
    ///
    /// Spawns the session watcher that closes realtime channels on logout.
    /// With a restored session, also opens the notifications channel and
    /// seeds the unread counter (a failed count fetch is logged). The
    /// watcher is spawned once per client, however often this is called.
    pub async fn start(&self) {
        if !self.watching.swap(true, Ordering::AcqRel) {
            tokio::spawn(session_watch_task(
                self.realtime.clone(),
                self.session.observe_session(),
                self.cancel.clone(),
            ));
        }

        if self.session.is_authenticated() {
            self.realtime.connect_notifications();
            self.seed_unread_count().await;
        }
    }

    /// Log in, then open the notifications channel.
    ///
    /// Logging in over an existing session closes every channel opened
    /// with the previous token before reconnecting.
    pub async fn login(&self, credentials: &Credentials) -> Result<Arc<Session>, CoreError> {
        let replacing = self.session.is_authenticated();
        let session = self.session.login(credentials).await?;
        self.open_session_channels(replacing).await;
        Ok(session)
    }

    /// Register, then open the notifications channel. Closes channels of
    /// a previous session like [`login()`](Self::login).
    pub async fn register(&self, request: &RegisterRequest) -> Result<Arc<Session>, CoreError> {
        let replacing = self.session.is_authenticated();
        let session = self.session.register(request).await?;
        self.open_session_channels(replacing).await;
        Ok(session)
    }

    /// Close every channel and end the session. See
    /// [`SessionStore::logout`] for the returned handle.
    pub fn logout(&self) -> Option<JoinHandle<()>> {
        self.realtime.disconnect_all();
        self.session.logout()
    }

    /// Stop background work and complete every subscription stream.
    pub fn shutdown(&self) {
        self.cancel.cancel();
        self.realtime.shutdown();
    }

    // ── Convenience ──────────────────────────────────────────────

    /// The current user, re-fetched from the server.
    pub async fn current_user(&self) -> Result<User, CoreError> {
        Ok(self.interceptor.current_user().await?)
    }

    /// Fetch the server's unread count and make it the counter's value.
    pub async fn sync_unread_count(&self) -> Result<u64, CoreError> {
        let count = self.interceptor.unread_count().await?;
        self.realtime.reset_unread(count);
        Ok(count)
    }

    /// Mark every notification read on the server and zero the counter.
    pub async fn mark_all_notifications_read(&self) -> Result<(), CoreError> {
        self.interceptor.mark_all_notifications_read().await?;
        self.realtime.reset_unread(0);
        Ok(())
    }

    /// The user opened the notifications view.
    pub fn notifications_viewed(&self) {
        self.realtime.reset_unread(0);
    }

    async fn open_session_channels(&self, replacing: bool) {
        if replacing {
            debug!("session replaced, closing channels opened with the old token");
            self.realtime.disconnect_all();
        }
        self.realtime.connect_notifications();
        self.seed_unread_count().await;
    }

    async fn seed_unread_count(&self) {
        match self.sync_unread_count().await {
            Ok(count) => debug!(count, "unread count synced"),
            Err(e) => warn!(error = %e, "failed to fetch unread count"),
        }
    }
}

// ── Background tasks ─────────────────────────────────────────────

/// Close realtime channels whenever the session ends.
async fn session_watch_task<C: Connector>(
    realtime: RealtimeManager<C>,
    mut session: watch::Receiver<Option<Arc<Session>>>,
    cancel: CancellationToken,
) {
    loop {
        tokio::select! {
            biased;
            () = cancel.cancelled() => break,
            changed = session.changed() => {
                if changed.is_err() {
                    break;
                }
                let logged_out = session.borrow_and_update().is_none();
                if logged_out {
                    debug!("session ended, closing realtime channels");
                    realtime.disconnect_all();
                }
            }
        }
    }
}
