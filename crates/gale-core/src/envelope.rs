//! Wire envelope shared by both planes.
//!
//! One envelope travels in one WebSocket text frame:
//!
//! ```json
//! {"id":"0190…","route":"/echo","type":0,"data":"{\"x\":1}","success":false}
//! ```
//!
//! `data` holds the codec-encoded payload as text; `success` is only
//! meaningful on acknowledgements.

use std::fmt;

use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::ids::MessageId;

/// Kind of an envelope, encoded as an integer on the wire.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum MessageKind {
    /// Expects a `RequestAck` carrying the handler result.
    Request,
    /// Fire-and-forget; the receiver still answers with a `PushAck`.
    Push,
    /// Reply to a `Request`.
    RequestAck,
    /// Reply to a `Push`; discarded by the receiver.
    PushAck,
}

impl MessageKind {
    /// Wire value.
    pub fn as_u8(self) -> u8 {
        match self {
            Self::Request => 0,
            Self::Push => 1,
            Self::RequestAck => 2,
            Self::PushAck => 3,
        }
    }

    /// Parse a wire value.
    pub fn from_u8(value: u8) -> Option<Self> {
        match value {
            0 => Some(Self::Request),
            1 => Some(Self::Push),
            2 => Some(Self::RequestAck),
            3 => Some(Self::PushAck),
            _ => None,
        }
    }

    /// The acknowledgement kind answering this kind, if any.
    pub fn ack(self) -> Option<Self> {
        match self {
            Self::Request => Some(Self::RequestAck),
            Self::Push => Some(Self::PushAck),
            Self::RequestAck | Self::PushAck => None,
        }
    }

    /// Whether this kind is an acknowledgement.
    pub fn is_ack(self) -> bool {
        matches!(self, Self::RequestAck | Self::PushAck)
    }
}

impl Serialize for MessageKind {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_u8(self.as_u8())
    }
}

impl<'de> Deserialize<'de> for MessageKind {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = u8::deserialize(deserializer)?;
        Self::from_u8(raw)
            .ok_or_else(|| serde::de::Error::custom(format!("unknown message type {raw}")))
    }
}

/// Logical message stream. Each plane runs over its own connection.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Plane {
    /// Application traffic.
    User,
    /// Control and cluster traffic.
    System,
}

impl Plane {
    /// HTTP path the plane is served under.
    pub fn path(self) -> &'static str {
        match self {
            Self::User => "/user",
            Self::System => "/system",
        }
    }

    /// Short name used in logs.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::User => "user",
            Self::System => "system",
        }
    }
}

impl fmt::Display for Plane {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The wire message.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Envelope {
    /// Correlation token.
    pub id: MessageId,
    /// Target route; empty on acknowledgements.
    #[serde(default)]
    pub route: String,
    /// Envelope kind.
    #[serde(rename = "type")]
    pub kind: MessageKind,
    /// Codec-encoded payload.
    #[serde(rename = "data", default)]
    pub payload: String,
    /// Outcome flag for acknowledgements.
    #[serde(default)]
    pub success: bool,
}

impl Envelope {
    /// A new request with a fresh id.
    pub fn request(route: impl Into<String>, payload: impl Into<String>) -> Self {
        Self {
            id: MessageId::new(),
            route: route.into(),
            kind: MessageKind::Request,
            payload: payload.into(),
            success: false,
        }
    }

    /// A new push with a fresh id.
    pub fn push(route: impl Into<String>, payload: impl Into<String>) -> Self {
        Self {
            id: MessageId::new(),
            route: route.into(),
            kind: MessageKind::Push,
            payload: payload.into(),
            success: false,
        }
    }

    /// Build the acknowledgement of `self` with the given outcome.
    ///
    /// Returns `None` when `self` is already an acknowledgement.
    pub fn reply(&self, success: bool, payload: impl Into<String>) -> Option<Self> {
        let kind = self.kind.ack()?;
        Some(Self {
            id: self.id.clone(),
            route: String::new(),
            kind,
            payload: payload.into(),
            success,
        })
    }
}
