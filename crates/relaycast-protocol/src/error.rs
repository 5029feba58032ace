//! Error types for the protocol layer.
//!
//! Each crate in Relaycast defines its own error enum. A `ProtocolError`
//! always means something went wrong while turning bytes into frames,
//! envelopes, or typed messages (or back).

/// Errors that can occur in the protocol layer.
///
/// The variants fall into two groups, and callers treat them differently:
///
/// - **Fatal to the connection** ([`ConnectionClosed`](Self::ConnectionClosed),
///   [`FrameTooLarge`](Self::FrameTooLarge), [`Io`](Self::Io)): the byte
///   stream can no longer be trusted to sit on a frame boundary, so the
///   connection must be closed.
/// - **Fatal to one packet** ([`MalformedPayload`](Self::MalformedPayload),
///   [`UnknownType`](Self::UnknownType)): the frame was read completely, so
///   the packet is dropped and the connection keeps going.
///
/// See [`ProtocolError::is_fatal`].
#[derive(Debug, thiserror::Error)]
pub enum ProtocolError {
    /// The peer closed the stream (or the transport failed) before a whole
    /// frame arrived. `received` of `expected` bytes of the current part
    /// (header or body) were read.
    #[error("connection closed after {received} of {expected} bytes")]
    ConnectionClosed { received: usize, expected: usize },

    /// The length prefix announced more bytes than the receiver accepts.
    #[error("frame of {len} bytes exceeds the {max} byte limit")]
    FrameTooLarge { len: usize, max: usize },

    /// The bytes don't conform to the schema expected for them: either the
    /// envelope itself, or the body schema selected by the envelope's type.
    #[error("malformed payload: {0}")]
    MalformedPayload(String),

    /// No body schema is known for this packet-type tag.
    #[error("unknown packet type {0}")]
    UnknownType(u32),

    /// Serialization failed (turning a Rust value into bytes).
    #[error("encode failed: {0}")]
    Encode(String),

    /// Any other I/O failure while reading or writing a frame.
    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),
}

impl ProtocolError {
    /// Returns `true` if the connection this error came from must be closed.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            Self::ConnectionClosed { .. } | Self::FrameTooLarge { .. } | Self::Io(_)
        )
    }
}
