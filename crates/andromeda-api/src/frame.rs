//! JSON text frame codec for the realtime channels.
//!
//! Every inbound frame is a JSON object whose `type` field selects the body
//! shape. Decoding is two-step: [`RawFrame::parse`] validates the envelope
//! and the discriminator, [`RawFrame::decode`] turns the body into a typed
//! [`InboundEvent`]. The split lets callers act on the frame kind even when
//! the body is malformed (the unread counter does exactly that).

use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::{Map, Value};
use strum::{Display, EnumString, IntoStaticStr};
use thiserror::Error;

use crate::error::Error;
use crate::models::{
    ChatMessage, MessageId, Notification, PresenceStatus, ReadReceipt, TypingIndicator,
};

/// Value of the `type` discriminator on inbound frames.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display, EnumString, IntoStaticStr)]
#[strum(serialize_all = "lowercase")]
pub enum FrameKind {
    Message,
    Typing,
    Read,
    Notification,
    Status,
}

/// A fully decoded inbound frame.
#[derive(Debug, Clone, PartialEq)]
pub enum InboundEvent {
    Message(ChatMessage),
    Typing(TypingIndicator),
    Read(ReadReceipt),
    Notification(Notification),
    Status(PresenceStatus),
}

impl InboundEvent {
    pub fn kind(&self) -> FrameKind {
        match self {
            Self::Message(_) => FrameKind::Message,
            Self::Typing(_) => FrameKind::Typing,
            Self::Read(_) => FrameKind::Read,
            Self::Notification(_) => FrameKind::Notification,
            Self::Status(_) => FrameKind::Status,
        }
    }
}

/// Why a frame could not be decoded.
#[derive(Debug, Error)]
pub enum FrameError {
    #[error("frame is not valid JSON: {0}")]
    NotJson(#[source] serde_json::Error),

    #[error("frame is not a JSON object")]
    NotAnObject,

    #[error("frame has no string `type` field")]
    MissingType,

    #[error("unknown frame type `{0}`")]
    UnknownType(String),

    #[error("invalid `{kind}` body: {source}")]
    Body {
        kind: FrameKind,
        #[source]
        source: serde_json::Error,
    },
}

impl From<FrameError> for Error {
    fn from(err: FrameError) -> Self {
        Error::MalformedFrame {
            message: err.to_string(),
        }
    }
}

/// An inbound frame whose envelope and discriminator are valid but whose
/// body has not been decoded yet.
#[derive(Debug, Clone)]
pub struct RawFrame {
    kind: FrameKind,
    body: Map<String, Value>,
}

impl RawFrame {
    /// Parse a text frame up to its `type` discriminator.
    pub fn parse(text: &str) -> Result<Self, FrameError> {
        let value: Value = serde_json::from_str(text).map_err(FrameError::NotJson)?;
        let Value::Object(mut body) = value else {
            return Err(FrameError::NotAnObject);
        };

        let tag = match body.remove("type") {
            Some(Value::String(tag)) => tag,
            _ => return Err(FrameError::MissingType),
        };
        let kind = tag
            .parse::<FrameKind>()
            .map_err(|_| FrameError::UnknownType(tag))?;

        Ok(Self { kind, body })
    }

    pub fn kind(&self) -> FrameKind {
        self.kind
    }

    /// Decode the body into the typed event selected by the discriminator.
    pub fn decode(self) -> Result<InboundEvent, FrameError> {
        let kind = self.kind;
        let body = Value::Object(self.body);
        let event = match kind {
            FrameKind::Message => InboundEvent::Message(body_as(kind, body)?),
            FrameKind::Typing => InboundEvent::Typing(body_as(kind, body)?),
            FrameKind::Read => InboundEvent::Read(body_as(kind, body)?),
            FrameKind::Notification => InboundEvent::Notification(body_as(kind, body)?),
            FrameKind::Status => InboundEvent::Status(body_as(kind, body)?),
        };
        Ok(event)
    }
}

fn body_as<T: DeserializeOwned>(kind: FrameKind, body: Value) -> Result<T, FrameError> {
    serde_json::from_value(body).map_err(|source| FrameError::Body { kind, source })
}

/// Parse and decode a text frame in one step.
pub fn decode_frame(text: &str) -> Result<InboundEvent, FrameError> {
    RawFrame::parse(text)?.decode()
}

// ── Outbound ────────────────────────────────────────────────────────

/// Frames the client sends on a chat channel.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum OutboundFrame {
    Message {
        content: String,
        #[serde(skip_serializing_if = "Option::is_none")]
        reply_to: Option<MessageId>,
    },
    Typing {
        is_typing: bool,
    },
    Read {
        message_id: MessageId,
    },
}

impl OutboundFrame {
    /// Serialize to the JSON text sent over the socket.
    pub fn encode(&self) -> Result<String, Error> {
        serde_json::to_string(self).map_err(|e| Error::Deserialization {
            message: format!("failed to encode outbound frame: {e}"),
            body: String::new(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn decode_chat_message() {
        let text = r#"{
            "type": "message",
            "message_id": 11,
            "content": "hello",
            "message_type": "text",
            "sender_id": 2,
            "sender_username": "bob",
            "reply_to": null,
            "created_at": "2026-03-01T10:00:00+00:00"
        }"#;

        let InboundEvent::Message(msg) = decode_frame(text).expect("decodes") else {
            panic!("expected a message event");
        };
        assert_eq!(msg.message_id, 11);
        assert_eq!(msg.content, "hello");
        assert_eq!(msg.sender_username, "bob");
        assert_eq!(msg.reply_to, None);
        assert!(!msg.extra.contains_key("type"));
    }

    #[test]
    fn decode_typing_read_and_status() {
        let typing = decode_frame(r#"{"type":"typing","user_id":4,"username":"eve","is_typing":true}"#)
            .expect("typing decodes");
        assert_eq!(
            typing,
            InboundEvent::Typing(TypingIndicator {
                user_id: 4,
                username: "eve".into(),
                is_typing: true,
            })
        );

        let read = decode_frame(r#"{"type":"read","message_id":9,"user_id":4}"#).expect("read decodes");
        assert_eq!(read.kind(), FrameKind::Read);

        let status = decode_frame(r#"{"type":"status","user_id":4,"username":"eve","status":"offline"}"#)
            .expect("status decodes");
        let InboundEvent::Status(status) = status else {
            panic!("expected a status event");
        };
        assert!(!status.is_online());
    }

    #[test]
    fn kind_survives_bad_body() {
        let raw = RawFrame::parse(r#"{"type":"notification","id":"not-a-number"}"#)
            .expect("envelope is valid");
        assert_eq!(raw.kind(), FrameKind::Notification);
        assert!(matches!(
            raw.decode(),
            Err(FrameError::Body {
                kind: FrameKind::Notification,
                ..
            })
        ));
    }

    #[test]
    fn envelope_errors() {
        assert!(matches!(RawFrame::parse("not json"), Err(FrameError::NotJson(_))));
        assert!(matches!(RawFrame::parse("[1,2]"), Err(FrameError::NotAnObject)));
        assert!(matches!(RawFrame::parse(r#"{"id":1}"#), Err(FrameError::MissingType)));
        assert!(matches!(RawFrame::parse(r#"{"type":7}"#), Err(FrameError::MissingType)));
        assert!(matches!(
            RawFrame::parse(r#"{"type":"mark_read"}"#),
            Err(FrameError::UnknownType(ref t)) if t == "mark_read"
        ));
    }

    #[test]
    fn frame_error_becomes_malformed_frame() {
        let err: Error = FrameError::MissingType.into();
        assert!(matches!(err, Error::MalformedFrame { .. }));
    }

    #[test]
    fn outbound_message_frame() {
        let frame = OutboundFrame::Message {
            content: "hi".into(),
            reply_to: Some(4),
        };
        insta::assert_json_snapshot!(frame, @r#"
        {
          "type": "message",
          "content": "hi",
          "reply_to": 4
        }
        "#);
    }

    #[test]
    fn outbound_frames_encode() {
        let plain = OutboundFrame::Message {
            content: "hi".into(),
            reply_to: None,
        };
        assert_eq!(plain.encode().expect("encodes"), r#"{"type":"message","content":"hi"}"#);

        let typing = OutboundFrame::Typing { is_typing: false };
        assert_eq!(typing.encode().expect("encodes"), r#"{"type":"typing","is_typing":false}"#);

        let read = OutboundFrame::Read { message_id: 12 };
        assert_eq!(read.encode().expect("encodes"), r#"{"type":"read","message_id":12}"#);
    }
}
