//! Client core for the Andromeda social network.
//!
//! This crate sits between the raw `andromeda-api` transport and a UI
//! shell (the `andromeda` CLI, or any other front end):
//!
//! - **[`SessionStore`]**: access/refresh tokens and the current user,
//!   persisted through a pluggable [`SessionStorage`] and observable
//!   through a `watch` channel.
//!
//! - **[`AuthInterceptor`]**: sends REST requests with the current bearer
//!   token and performs one silent refresh-and-retry on HTTP 401. When
//!   the session cannot be recovered it logs out and publishes
//!   [`AuthEvent::LoginRequired`].
//!
//! - **[`RealtimeManager`]**: the notifications channel (auto-reconnects
//!   while authenticated) and one chat channel (never reconnects), with
//!   typed [`EventStream`]s and the unread notification counter.
//!
//! - **[`Client`]**: facade that wires the three together.

pub mod client;
pub mod config;
pub mod error;
pub mod interceptor;
pub mod realtime;
pub mod session;

// ── Primary re-exports ──────────────────────────────────────────────
pub use client::Client;
pub use config::{ClientConfig, TlsVerification};
pub use error::{AuthError, CoreError, TransportError};
pub use interceptor::{AuthEvent, AuthInterceptor};
pub use realtime::{
    ChannelKind, ChannelState, EventStream, RealtimeConfig, RealtimeManager, RoomEvent,
};
pub use session::{MemoryStorage, Session, SessionStorage, SessionStore, StorageError, StorageKey};

// Wire types consumers handle directly.
pub use andromeda_api::{
    ChatMessage, Credentials, MessageId, Notification, PresenceStatus, ReadReceipt,
    RegisterRequest, RoomId, TypingIndicator, User,
};
