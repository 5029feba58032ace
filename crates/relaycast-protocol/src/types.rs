//! Core protocol types for Relaycast's wire format.
//!
//! Every frame on the wire carries one [`Envelope`]. The envelope is a
//! small, fixed-shape wrapper: a [`PacketType`] tag plus an opaque byte
//! payload. The payload holds a type-specific message ([`ChatMessage`],
//! [`SystemMessage`]) encoded with the same codec as the envelope.
//!
//! Keeping the payload opaque at the envelope level means a receiver can
//! always decode the envelope, even for packet types it has never heard
//! of, and decide what to do based on the tag alone.

use std::fmt;

use serde::{de::DeserializeOwned, Deserialize, Serialize};

// ---------------------------------------------------------------------------
// Identity types
// ---------------------------------------------------------------------------

/// Server-assigned identifier of one live client connection.
///
/// Assigned by the session table when a connection is accepted. Ids are
/// strictly increasing and never reused while the process runs.
///
/// `#[serde(transparent)]` makes `SessionId(7)` serialize as plain `7`,
/// which is what the wire format's `int32` sender field expects.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SessionId(pub i32);

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "S-{}", self.0)
    }
}

// ---------------------------------------------------------------------------
// PacketType — the envelope tag
// ---------------------------------------------------------------------------

/// The tag that selects which schema an envelope's payload uses.
///
/// On the wire this is a plain unsigned integer. Tags we don't know are
/// kept as [`PacketType::Unknown`] instead of failing the whole envelope:
/// an unknown tag is a per-packet problem (drop it), not a broken stream.
///
/// `#[serde(from = "u32", into = "u32")]` routes serialization through the
/// `From` impls below, so the enum is always written as its numeric tag.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "u32", into = "u32")]
pub enum PacketType {
    /// A user chat line. Payload: [`ChatMessage`].
    Chat,
    /// A server-originated notice. Payload: [`SystemMessage`].
    System,
    /// Any tag without a known schema. Carries the raw tag value.
    Unknown(u32),
}

impl PacketType {
    /// Every packet type that has a body schema.
    pub const KNOWN: [PacketType; 2] = [PacketType::Chat, PacketType::System];

    /// Returns the numeric wire tag.
    pub fn tag(self) -> u32 {
        match self {
            Self::Chat => 1,
            Self::System => 2,
            Self::Unknown(tag) => tag,
        }
    }

    /// Returns `true` if a body schema exists for this type.
    pub fn is_known(self) -> bool {
        !matches!(self, Self::Unknown(_))
    }
}

impl From<u32> for PacketType {
    fn from(tag: u32) -> Self {
        match tag {
            1 => Self::Chat,
            2 => Self::System,
            other => Self::Unknown(other),
        }
    }
}

impl From<PacketType> for u32 {
    fn from(packet_type: PacketType) -> Self {
        packet_type.tag()
    }
}

impl fmt::Display for PacketType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Chat => f.write_str("Chat"),
            Self::System => f.write_str("System"),
            Self::Unknown(tag) => write!(f, "Unknown({tag})"),
        }
    }
}

// ---------------------------------------------------------------------------
// Message bodies
// ---------------------------------------------------------------------------

/// A chat line.
///
/// `sender_id` is never trusted from the client: the server overwrites it
/// with the id of the session the message arrived on before relaying it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub sender_id: SessionId,
    pub content: String,
}

/// A notice generated by the server (greetings, shutdown warnings).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SystemMessage {
    pub text: String,
}

/// A message body that travels inside an envelope.
///
/// Each body type knows its own tag, which is how the dispatcher pairs a
/// handler with the right decoder at registration time.
pub trait PacketBody: Serialize + DeserializeOwned + Send + 'static {
    /// The envelope tag used for this body.
    const PACKET_TYPE: PacketType;
}

impl PacketBody for ChatMessage {
    const PACKET_TYPE: PacketType = PacketType::Chat;
}

impl PacketBody for SystemMessage {
    const PACKET_TYPE: PacketType = PacketType::System;
}

/// A decoded payload of any known type.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Message {
    Chat(ChatMessage),
    System(SystemMessage),
}

impl Message {
    /// The tag this message is sent under.
    pub fn packet_type(&self) -> PacketType {
        match self {
            Self::Chat(_) => PacketType::Chat,
            Self::System(_) => PacketType::System,
        }
    }
}

// ---------------------------------------------------------------------------
// Envelope — the top-level wire format
// ---------------------------------------------------------------------------

/// The typed wrapper carried inside every frame.
///
/// ```text
/// ┌──────────────────────────────┐
/// │ type: 1 (Chat)               │  ← selects the payload schema
/// │ ┌──────────────────────────┐ │
/// │ │ payload: [..bytes..]     │ │  ← encoded ChatMessage
/// │ └──────────────────────────┘ │
/// └──────────────────────────────┘
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Envelope {
    #[serde(rename = "type")]
    pub packet_type: PacketType,
    pub payload: Vec<u8>,
}

// =========================================================================
// Tests
// =========================================================================
