// ── Realtime transport manager ──
//
// Owns the notifications channel and at most one chat channel. Each live
// connection is driven by its own task; manager methods only take short
// locks and spawn or cancel tasks, so their effect is immediate from the
// caller's point of view. Inbound frames fan out to typed broadcast
// streams. The notifications channel reconnects after a fixed delay while
// the session stays authenticated; chat never reconnects.
//
// Methods that open connections spawn onto the current Tokio runtime.

mod channel;
mod stream;

use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use andromeda_api::frame::{FrameKind, InboundEvent, OutboundFrame, RawFrame};
use andromeda_api::{
    ChannelSocket, ChannelTarget, ChatMessage, Connector, MessageId, Notification, PresenceStatus,
    ReadReceipt, RoomId, TypingIndicator, WsConnector,
};
use futures_util::{SinkExt, StreamExt};
use tokio::sync::{broadcast, watch};
use tokio_stream::wrappers::WatchStream;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, trace, warn};
use url::Url;

use crate::config::{ClientConfig, DEFAULT_EVENT_CAPACITY, DEFAULT_RECONNECT_DELAY};
use crate::error::TransportError;
use crate::session::SessionStore;

use self::channel::{ChannelSlot, ConnectionLease};

pub use channel::{ChannelKind, ChannelState};
pub use stream::{EventStream, RoomEvent};

/// Tunables for [`RealtimeManager`].
#[derive(Debug, Clone)]
pub struct RealtimeConfig {
    /// WebSocket root, e.g. `ws://localhost/ws/`.
    pub ws_url: Url,
    pub reconnect_delay: Duration,
    pub event_capacity: usize,
}

impl RealtimeConfig {
    pub fn new(ws_url: Url) -> Self {
        Self {
            ws_url,
            reconnect_delay: DEFAULT_RECONNECT_DELAY,
            event_capacity: DEFAULT_EVENT_CAPACITY,
        }
    }
}

impl From<&ClientConfig> for RealtimeConfig {
    fn from(config: &ClientConfig) -> Self {
        Self {
            ws_url: config.ws_url.clone(),
            reconnect_delay: config.reconnect_delay,
            event_capacity: config.event_capacity,
        }
    }
}

// ── RealtimeManager ──────────────────────────────────────────────

/// Realtime notifications and chat over WebSocket.
///
/// Cheaply cloneable; clones share the same channels and streams.
pub struct RealtimeManager<C: Connector = WsConnector> {
    inner: Arc<ManagerInner<C>>,
}

impl<C: Connector> Clone for RealtimeManager<C> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<C: Connector> std::fmt::Debug for RealtimeManager<C> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RealtimeManager")
            .field("notifications", &self.notification_state())
            .field("chat", &self.chat_state())
            .field("chat_room", &self.chat_room())
            .field("unread", &self.unread_count())
            .finish_non_exhaustive()
    }
}

struct ManagerInner<C> {
    connector: C,
    session: SessionStore,
    config: RealtimeConfig,
    notifications: ChannelSlot,
    chat: ChannelSlot,
    /// Pending notifications reconnect, if any.
    reconnect: Mutex<Option<CancellationToken>>,
    unread: watch::Sender<u64>,
    notification_tx: broadcast::Sender<Arc<Notification>>,
    message_tx: broadcast::Sender<RoomEvent<ChatMessage>>,
    typing_tx: broadcast::Sender<RoomEvent<TypingIndicator>>,
    read_tx: broadcast::Sender<RoomEvent<ReadReceipt>>,
    status_tx: broadcast::Sender<RoomEvent<PresenceStatus>>,
    shutdown: CancellationToken,
}

impl RealtimeManager<WsConnector> {
    /// Create a manager that opens real WebSocket connections.
    pub fn new(session: SessionStore, config: RealtimeConfig) -> Self {
        Self::with_connector(session, config, WsConnector)
    }
}

impl<C: Connector> RealtimeManager<C> {
    /// Create a manager around a custom [`Connector`].
    pub fn with_connector(session: SessionStore, config: RealtimeConfig, connector: C) -> Self {
        let capacity = config.event_capacity.max(1);
        let (unread, _) = watch::channel(0);

        Self {
            inner: Arc::new(ManagerInner {
                connector,
                session,
                config,
                notifications: ChannelSlot::new(),
                chat: ChannelSlot::new(),
                reconnect: Mutex::new(None),
                unread,
                notification_tx: broadcast::channel(capacity).0,
                message_tx: broadcast::channel(capacity).0,
                typing_tx: broadcast::channel(capacity).0,
                read_tx: broadcast::channel(capacity).0,
                status_tx: broadcast::channel(capacity).0,
                shutdown: CancellationToken::new(),
            }),
        }
    }

    // ── Notifications channel ────────────────────────────────────

    /// Open the notifications channel.
    ///
    /// No-op while the channel is connecting or open, when the session is
    /// not authenticated, or after [`shutdown`](Self::shutdown).
    pub fn connect_notifications(&self) {
        let inner = &self.inner;
        if inner.shutdown.is_cancelled() {
            return;
        }
        let Some(url) = self.channel_url(ChannelTarget::Notifications) else {
            return;
        };
        let Some(lease) = inner
            .notifications
            .begin_if_idle(ChannelTarget::Notifications, &inner.shutdown)
        else {
            trace!("notifications channel already active");
            return;
        };
        self.spawn_connection(ChannelKind::Notifications, lease, url);
    }

    /// Close the notifications channel without scheduling a reconnect.
    pub fn disconnect_notifications(&self) {
        self.cancel_reconnect();
        self.inner.notifications.close();
    }

    pub fn notification_state(&self) -> ChannelState {
        self.inner.notifications.state()
    }

    pub fn watch_notification_state(&self) -> watch::Receiver<ChannelState> {
        self.inner.notifications.subscribe_state()
    }

    // ── Chat channel ─────────────────────────────────────────────

    /// Open the chat channel for `room_id`, closing any current room
    /// first. Chat connections are never re-established automatically.
    pub fn connect_chat(&self, room_id: RoomId) {
        let inner = &self.inner;
        if inner.shutdown.is_cancelled() {
            return;
        }
        let target = ChannelTarget::Chat(room_id);
        let Some(url) = self.channel_url(target) else {
            inner.chat.close();
            return;
        };
        let lease = inner.chat.replace(target, &inner.shutdown);
        self.spawn_connection(ChannelKind::Chat, lease, url);
    }

    /// Close the chat channel. Idempotent.
    pub fn disconnect_chat(&self) {
        self.inner.chat.close();
    }

    pub fn chat_state(&self) -> ChannelState {
        self.inner.chat.state()
    }

    pub fn watch_chat_state(&self) -> watch::Receiver<ChannelState> {
        self.inner.chat.subscribe_state()
    }

    /// Room of the current (connecting or open) chat channel.
    pub fn chat_room(&self) -> Option<RoomId> {
        match self.inner.chat.target() {
            Some(ChannelTarget::Chat(room)) => Some(room),
            _ => None,
        }
    }

    /// Send a chat message. Returns `false` (and sends nothing) unless the
    /// chat channel is open.
    pub fn send_chat_message(
        &self,
        content: impl Into<String>,
        reply_to: Option<MessageId>,
    ) -> bool {
        self.send_chat_frame(&OutboundFrame::Message {
            content: content.into(),
            reply_to,
        })
    }

    pub fn send_typing(&self, is_typing: bool) -> bool {
        self.send_chat_frame(&OutboundFrame::Typing { is_typing })
    }

    pub fn mark_message_read(&self, message_id: MessageId) -> bool {
        self.send_chat_frame(&OutboundFrame::Read { message_id })
    }

    // ── Lifecycle ────────────────────────────────────────────────

    /// Close both channels and cancel any pending reconnect.
    pub fn disconnect_all(&self) {
        self.cancel_reconnect();
        self.inner.notifications.close();
        self.inner.chat.close();
        debug!("realtime channels closed");
    }

    /// Disconnect everything and complete all subscription streams. The
    /// manager cannot be reconnected afterwards.
    pub fn shutdown(&self) {
        self.disconnect_all();
        self.inner.shutdown.cancel();
    }

    pub fn is_shut_down(&self) -> bool {
        self.inner.shutdown.is_cancelled()
    }

    // ── Unread counter ───────────────────────────────────────────

    pub fn unread_count(&self) -> u64 {
        *self.inner.unread.borrow()
    }

    /// Subscribe to unread counter changes.
    pub fn subscribe_unread(&self) -> watch::Receiver<u64> {
        self.inner.unread.subscribe()
    }

    /// The counter as a `Stream`: the current value first, then every
    /// change.
    pub fn unread_stream(&self) -> WatchStream<u64> {
        WatchStream::new(self.inner.unread.subscribe())
    }

    /// Overwrite the counter (server count on startup, zero when the
    /// notifications view is opened).
    pub fn reset_unread(&self, count: u64) {
        self.inner.unread.send_replace(count);
    }

    // ── Subscriptions ────────────────────────────────────────────

    pub fn notifications(&self) -> EventStream<Arc<Notification>> {
        self.subscribe(&self.inner.notification_tx)
    }

    pub fn messages(&self) -> EventStream<RoomEvent<ChatMessage>> {
        self.subscribe(&self.inner.message_tx)
    }

    pub fn typing(&self) -> EventStream<RoomEvent<TypingIndicator>> {
        self.subscribe(&self.inner.typing_tx)
    }

    pub fn read_receipts(&self) -> EventStream<RoomEvent<ReadReceipt>> {
        self.subscribe(&self.inner.read_tx)
    }

    pub fn presence(&self) -> EventStream<RoomEvent<PresenceStatus>> {
        self.subscribe(&self.inner.status_tx)
    }

    // ── Internals ────────────────────────────────────────────────

    fn subscribe<T: Clone + Send + 'static>(&self, tx: &broadcast::Sender<T>) -> EventStream<T> {
        EventStream::new(tx.subscribe(), self.inner.shutdown.clone())
    }

    fn channel_url(&self, target: ChannelTarget) -> Option<Url> {
        let Some(token) = self.inner.session.access_token() else {
            debug!(?target, "not authenticated, channel not opened");
            return None;
        };
        match target.url(&self.inner.config.ws_url, &token) {
            Ok(url) => Some(url),
            Err(e) => {
                warn!(error = %e, ?target, "cannot build channel URL");
                None
            }
        }
    }

    fn send_chat_frame(&self, frame: &OutboundFrame) -> bool {
        let text = match frame.encode() {
            Ok(text) => text,
            Err(e) => {
                warn!(error = %e, "failed to encode chat frame");
                return false;
            }
        };
        let sent = self.inner.chat.send(text);
        if !sent {
            trace!("chat channel not open, frame dropped");
        }
        sent
    }

    fn spawn_connection(&self, kind: ChannelKind, lease: ConnectionLease, url: Url) {
        let manager = self.clone();
        tokio::spawn(async move {
            let generation = lease.generation;
            let ended = manager.run_connection(kind, lease, url).await;
            if ended == Ended::Unexpectedly {
                manager.on_closed(kind, generation);
            }
        });
    }

    /// Drive one connection until it is cancelled or the socket ends.
    async fn run_connection(&self, kind: ChannelKind, lease: ConnectionLease, url: Url) -> Ended {
        let ConnectionLease {
            generation,
            target,
            cancel,
            mut outbound,
        } = lease;
        let slot = self.slot(kind);

        info!(channel = %kind, ?target, "connecting");
        let connected = tokio::select! {
            biased;
            () = cancel.cancelled() => return Ended::Cancelled,
            result = self.inner.connector.connect(url) => result,
        };

        let ChannelSocket {
            mut sink,
            mut stream,
        } = match connected {
            Ok(socket) => socket,
            Err(e) => {
                let err = TransportError::ConnectFailed {
                    channel: kind,
                    reason: e.to_string(),
                };
                warn!(error = %err, "realtime connection failed");
                return Ended::Unexpectedly;
            }
        };

        if !slot.mark_open(generation) {
            let _ = sink.close().await;
            return Ended::Cancelled;
        }
        info!(channel = %kind, ?target, "channel open");

        loop {
            tokio::select! {
                biased;
                () = cancel.cancelled() => {
                    let _ = sink.close().await;
                    debug!(channel = %kind, "channel closed on request");
                    return Ended::Cancelled;
                }
                Some(text) = outbound.recv() => {
                    if let Err(e) = sink.send(text).await {
                        warn!(channel = %kind, error = %e, "failed to send frame");
                    }
                }
                frame = stream.next() => match frame {
                    Some(Ok(text)) => self.dispatch(kind, target, &text),
                    Some(Err(e)) => {
                        let err = TransportError::Closed {
                            channel: kind,
                            reason: e.to_string(),
                        };
                        warn!(error = %err, "realtime channel error");
                    }
                    None => break,
                },
            }
        }

        info!(channel = %kind, "channel closed by server");
        Ended::Unexpectedly
    }

    fn on_closed(&self, kind: ChannelKind, generation: u64) {
        if !self.slot(kind).finish(generation) {
            return;
        }
        if kind == ChannelKind::Notifications && self.inner.session.is_authenticated() {
            self.schedule_reconnect();
        }
    }

    /// Arrange one notifications reconnect after the configured delay.
    /// Idempotent while a reconnect is pending.
    fn schedule_reconnect(&self) {
        let inner = &self.inner;
        let mut pending = inner.reconnect.lock().unwrap_or_else(PoisonError::into_inner);
        if pending.is_some() || inner.shutdown.is_cancelled() {
            return;
        }
        let timer = inner.shutdown.child_token();
        *pending = Some(timer.clone());
        drop(pending);

        let delay = inner.config.reconnect_delay;
        debug!(?delay, "notifications reconnect scheduled");

        let manager = self.clone();
        tokio::spawn(async move {
            tokio::select! {
                biased;
                () = timer.cancelled() => return,
                () = tokio::time::sleep(delay) => {}
            }

            {
                let mut pending = manager
                    .inner
                    .reconnect
                    .lock()
                    .unwrap_or_else(PoisonError::into_inner);
                if timer.is_cancelled() {
                    return;
                }
                pending.take();
            }

            if manager.inner.session.is_authenticated() {
                info!("reconnecting notifications channel");
                manager.connect_notifications();
            } else {
                debug!("session ended, notifications reconnect skipped");
            }
        });
    }

    fn cancel_reconnect(&self) {
        let mut pending = self
            .inner
            .reconnect
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        if let Some(timer) = pending.take() {
            timer.cancel();
        }
    }

    fn slot(&self, kind: ChannelKind) -> &ChannelSlot {
        match kind {
            ChannelKind::Notifications => &self.inner.notifications,
            ChannelKind::Chat => &self.inner.chat,
        }
    }

    // ── Inbound dispatch ─────────────────────────────────────────

    fn dispatch(&self, kind: ChannelKind, target: ChannelTarget, text: &str) {
        let raw = match RawFrame::parse(text) {
            Ok(raw) => raw,
            Err(e) => {
                let err = TransportError::MalformedFrame {
                    channel: kind,
                    message: e.to_string(),
                };
                warn!(error = %err, "dropping frame");
                return;
            }
        };

        match (kind, target) {
            (ChannelKind::Notifications, _) => self.dispatch_notification(raw),
            (ChannelKind::Chat, ChannelTarget::Chat(room_id)) => self.dispatch_chat(room_id, raw),
            (ChannelKind::Chat, ChannelTarget::Notifications) => {}
        }
    }

    fn dispatch_notification(&self, raw: RawFrame) {
        if raw.kind() != FrameKind::Notification {
            trace!(kind = %raw.kind(), "ignoring non-notification frame");
            return;
        }

        // Counted before decoding: a notification with an unreadable
        // body is still an unread notification.
        self.inner.unread.send_modify(|count| *count += 1);

        match raw.decode() {
            Ok(InboundEvent::Notification(notification)) => {
                let _ = self.inner.notification_tx.send(Arc::new(notification));
            }
            Ok(_) => {}
            Err(e) => {
                let err = TransportError::MalformedFrame {
                    channel: ChannelKind::Notifications,
                    message: e.to_string(),
                };
                warn!(error = %err, "notification body dropped");
            }
        }
    }

    fn dispatch_chat(&self, room_id: RoomId, raw: RawFrame) {
        let kind = raw.kind();
        if kind == FrameKind::Notification {
            trace!(room_id, "ignoring notification frame on chat channel");
            return;
        }

        let event = match raw.decode() {
            Ok(event) => event,
            Err(e) => {
                let err = TransportError::MalformedFrame {
                    channel: ChannelKind::Chat,
                    message: e.to_string(),
                };
                warn!(error = %err, room_id, "dropping chat frame");
                return;
            }
        };

        let inner = &self.inner;
        match event {
            InboundEvent::Message(event) => {
                let _ = inner.message_tx.send(RoomEvent { room_id, event });
            }
            InboundEvent::Typing(event) => {
                let _ = inner.typing_tx.send(RoomEvent { room_id, event });
            }
            InboundEvent::Read(event) => {
                let _ = inner.read_tx.send(RoomEvent { room_id, event });
            }
            InboundEvent::Status(event) => {
                let _ = inner.status_tx.send(RoomEvent { room_id, event });
            }
            InboundEvent::Notification(_) => {}
        }
    }
}

/// How a connection task ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Ended {
    /// Superseded, closed on request, or shut down.
    Cancelled,
    /// The socket failed to open or was closed by the other side.
    Unexpectedly,
}
