//! WebSocket channel plumbing.
//!
//! A realtime channel is a JSON-text WebSocket authenticated by an access
//! token in the query string (browsers cannot set headers on the upgrade
//! request, so the server only accepts `?token=`). This module builds the
//! channel URLs and opens sockets as a boxed sink/stream pair of text
//! frames, behind the [`Connector`] trait so higher layers can run against
//! an in-memory transport in tests.
//!
//! # Example
//!
//! ```rust,ignore
//! use andromeda_api::websocket::{ChannelTarget, Connector, WsConnector};
//! use futures_util::{SinkExt, StreamExt};
//!
//! let url = ChannelTarget::Chat(7).url(&ws_base, &access_token)?;
//! let mut socket = WsConnector.connect(url).await?;
//!
//! socket.sink.send(r#"{"type":"typing","is_typing":true}"#.into()).await?;
//! while let Some(Ok(text)) = socket.stream.next().await {
//!     println!("{text}");
//! }
//! ```

use std::future::Future;
use std::pin::Pin;

use futures_util::{Sink, SinkExt, Stream, StreamExt, future};
use secrecy::{ExposeSecret, SecretString};
use tokio_tungstenite::tungstenite::Message;
use tracing::{info, trace};
use url::Url;

use crate::error::Error;
use crate::models::RoomId;

/// Outbound half of a channel: accepts JSON text frames.
pub type FrameSink = Pin<Box<dyn Sink<String, Error = Error> + Send>>;

/// Inbound half of a channel: yields JSON text frames until the socket
/// closes. A transport error is yielded once, then the stream ends.
pub type FrameStream = Pin<Box<dyn Stream<Item = Result<String, Error>> + Send>>;

/// An open channel connection.
pub struct ChannelSocket {
    pub sink: FrameSink,
    pub stream: FrameStream,
}

impl ChannelSocket {
    pub fn new(sink: FrameSink, stream: FrameStream) -> Self {
        Self { sink, stream }
    }
}

impl std::fmt::Debug for ChannelSocket {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ChannelSocket").finish_non_exhaustive()
    }
}

// ── Channel addressing ──────────────────────────────────────────────

/// Which realtime endpoint a channel talks to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ChannelTarget {
    /// `{ws-base}/notifications/`
    Notifications,
    /// `{ws-base}/chat/{room}/`
    Chat(RoomId),
}

impl ChannelTarget {
    fn path(self) -> String {
        match self {
            Self::Notifications => "notifications/".to_owned(),
            Self::Chat(room) => format!("chat/{room}/"),
        }
    }

    /// Build the connection URL, embedding `token` as the `token` query
    /// parameter.
    pub fn url(self, ws_base: &Url, token: &SecretString) -> Result<Url, Error> {
        let mut base = ws_base.clone();
        if !base.path().ends_with('/') {
            let path = format!("{}/", base.path());
            base.set_path(&path);
        }
        let mut url = base.join(&self.path())?;
        url.query_pairs_mut()
            .clear()
            .append_pair("token", token.expose_secret());
        Ok(url)
    }
}

// ── Connector ───────────────────────────────────────────────────────

/// Opens channel sockets.
pub trait Connector: Send + Sync + 'static {
    /// Perform the WebSocket handshake for `url`.
    fn connect(&self, url: Url) -> impl Future<Output = Result<ChannelSocket, Error>> + Send;
}

/// [`Connector`] backed by `tokio-tungstenite` (`ws://` and `wss://`
/// with the bundled webpki roots).
#[derive(Debug, Clone, Copy, Default)]
pub struct WsConnector;

impl Connector for WsConnector {
    async fn connect(&self, url: Url) -> Result<ChannelSocket, Error> {
        info!(path = %url.path(), "Connecting to WebSocket");

        let (ws_stream, _response) = tokio_tungstenite::connect_async(url.as_str())
            .await
            .map_err(|e| Error::WebSocketConnect(e.to_string()))?;

        info!(path = %url.path(), "WebSocket connected");

        let (write, read) = ws_stream.split();

        let sink = write
            .sink_map_err(|e| Error::WebSocketConnect(e.to_string()))
            .with(|text: String| future::ready(Ok::<_, Error>(Message::text(text))));

        let stream = async_stream::stream! {
            let mut read = read;
            while let Some(frame) = read.next().await {
                match frame {
                    Ok(Message::Text(text)) => yield Ok(text.as_str().to_owned()),
                    Ok(Message::Close(frame)) => {
                        if let Some(ref cf) = frame {
                            info!(code = %cf.code, reason = %cf.reason, "WebSocket close frame received");
                        } else {
                            info!("WebSocket close frame received (no payload)");
                        }
                        break;
                    }
                    Ok(Message::Ping(_)) => {
                        // tungstenite queues the pong reply itself
                        trace!("WebSocket ping");
                    }
                    Ok(_) => {
                        // Binary, Pong, raw Frame -- not part of the protocol
                    }
                    Err(e) => {
                        yield Err(Error::WebSocketConnect(e.to_string()));
                        break;
                    }
                }
            }
        };

        Ok(ChannelSocket::new(Box::pin(sink), Box::pin(stream)))
    }
}
