#![allow(clippy::unwrap_used, dead_code)]
// Shared fixtures: an in-memory WebSocket connector and session builders.

use std::sync::{Arc, Mutex};

use andromeda_api::{ApiClient, ChannelSocket, Connector, Error};
use andromeda_core::{MemoryStorage, SessionStorage, SessionStore, StorageKey};
use futures_util::sink;
use tokio::sync::mpsc;
use tokio_stream::wrappers::UnboundedReceiverStream;
use url::Url;

// ── In-memory connector ─────────────────────────────────────────────

/// Server side of one accepted in-memory connection.
pub struct ServerEnd {
    pub url: Url,
    /// Frames pushed to the client. Drop it to close the connection.
    pub to_client: mpsc::UnboundedSender<Result<String, Error>>,
    /// Frames the client sent. Yields `None` once the client hung up.
    pub from_client: mpsc::UnboundedReceiver<String>,
}

impl ServerEnd {
    pub fn push(&self, frame: &str) {
        self.to_client.send(Ok(frame.to_owned())).unwrap();
    }
}

#[derive(Default)]
struct ConnectorState {
    attempts: Vec<Url>,
    refuse: usize,
}

/// [`Connector`] that hands out channel pairs instead of sockets.
#[derive(Clone)]
pub struct MemoryConnector {
    state: Arc<Mutex<ConnectorState>>,
    accepted_tx: mpsc::UnboundedSender<ServerEnd>,
    accepted_rx: Arc<tokio::sync::Mutex<mpsc::UnboundedReceiver<ServerEnd>>>,
}

impl MemoryConnector {
    pub fn new() -> Self {
        let (accepted_tx, accepted_rx) = mpsc::unbounded_channel();
        Self {
            state: Arc::default(),
            accepted_tx,
            accepted_rx: Arc::new(tokio::sync::Mutex::new(accepted_rx)),
        }
    }

    /// Fail the next `count` connection attempts.
    pub fn refuse_next(&self, count: usize) {
        self.state.lock().unwrap().refuse = count;
    }

    /// URLs of every connection attempt so far, refused ones included.
    pub fn attempts(&self) -> Vec<Url> {
        self.state.lock().unwrap().attempts.clone()
    }

    /// Wait for the next successful connection.
    pub async fn accept(&self) -> ServerEnd {
        self.accepted_rx.lock().await.recv().await.unwrap()
    }
}

impl Connector for MemoryConnector {
    async fn connect(&self, url: Url) -> Result<ChannelSocket, Error> {
        {
            let mut state = self.state.lock().unwrap();
            state.attempts.push(url.clone());
            if state.refuse > 0 {
                state.refuse -= 1;
                return Err(Error::WebSocketConnect("connection refused".into()));
            }
        }

        let (to_client, client_rx) = mpsc::unbounded_channel();
        let (client_tx, from_client) = mpsc::unbounded_channel::<String>();

        let sink = sink::unfold(client_tx, |tx, text: String| async move {
            tx.send(text).map_err(|_| Error::WebSocketClosed {
                code: 1006,
                reason: "server gone".into(),
            })?;
            Ok::<_, Error>(tx)
        });
        let stream = UnboundedReceiverStream::new(client_rx);

        let _ = self.accepted_tx.send(ServerEnd {
            url,
            to_client,
            from_client,
        });
        Ok(ChannelSocket::new(Box::pin(sink), Box::pin(stream)))
    }
}

// ── Sessions ────────────────────────────────────────────────────────

/// API client pointing at a closed port; realtime tests never hit REST.
pub fn offline_api() -> ApiClient {
    ApiClient::with_client(
        reqwest::Client::new(),
        Url::parse("http://127.0.0.1:9/api/").unwrap(),
    )
}

/// A store that is already logged in with access token `token` and no
/// refresh token.
pub fn logged_in_store(token: &str) -> SessionStore {
    let storage = Arc::new(MemoryStorage::new());
    storage.store(StorageKey::AccessToken, token).unwrap();
    SessionStore::new(offline_api(), storage as Arc<dyn SessionStorage>)
}

pub fn logged_out_store() -> SessionStore {
    SessionStore::new(offline_api(), Arc::new(MemoryStorage::new()))
}
