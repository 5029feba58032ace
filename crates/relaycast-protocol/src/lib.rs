//! Wire protocol for Relaycast.
//!
//! This crate defines the "language" that clients and servers speak:
//!
//! - **Frames** ([`encode_frame`], [`read_frame`]) — a 4-byte little-endian
//!   length prefix followed by exactly that many bytes.
//! - **Types** ([`Envelope`], [`PacketType`], [`ChatMessage`],
//!   [`SystemMessage`]) — what travels inside a frame.
//! - **Codec** ([`Codec`] trait, [`JsonCodec`]) — how envelopes and bodies
//!   are converted to/from bytes.
//! - **Errors** ([`ProtocolError`]) — what can go wrong, split into
//!   connection-fatal and packet-fatal failures.
//!
//! # Architecture
//!
//! ```text
//! Transport (byte stream) → Frame (bytes) → Envelope (tag + payload) → Message
//! ```
//!
//! The protocol layer doesn't know about connections, sessions, or the
//! relay. It only knows how to cut a byte stream into frames and how to
//! turn frames into typed messages.

mod codec;
mod error;
mod frame;
mod types;

pub use codec::Codec;
#[cfg(feature = "json")]
pub use codec::JsonCodec;
pub use error::ProtocolError;
pub use frame::{encode_frame, read_frame, write_frame, DEFAULT_MAX_FRAME_LEN, HEADER_LEN};
pub use types::{
    ChatMessage, Envelope, Message, PacketBody, PacketType, SessionId, SystemMessage,
};
