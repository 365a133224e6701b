// andromeda-api: Async Rust client for the Andromeda REST and realtime APIs

pub mod auth;
pub mod error;
pub mod frame;
pub mod models;
pub mod rest;
pub mod transport;
pub mod websocket;

pub use auth::{AuthEndpoint, Credentials, RegisterRequest, Registration, TokenPair};
pub use error::Error;
pub use frame::{FrameError, FrameKind, InboundEvent, OutboundFrame, RawFrame};
pub use models::{
    ChatMessage, MessageId, Notification, PresenceStatus, ReadReceipt, RoomId, TypingIndicator,
    UnreadCount, User,
};
pub use rest::{ApiClient, ApiRequest, ApiResponse};
pub use transport::{TlsMode, TransportConfig};
pub use websocket::{ChannelSocket, ChannelTarget, Connector, WsConnector};
