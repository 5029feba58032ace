//! Packet registry and dispatcher.
//!
//! Handlers are registered per body type before the server starts. At
//! runtime the dispatcher looks up the envelope's tag, decodes the payload
//! with the schema the handler was registered for, and calls the handler.
//!
//! Dispatch is synchronous. A handler that needs to do I/O (publishing to
//! the relay, for instance) should hand the message to a task through a
//! channel rather than block the connection's receive loop.

use std::collections::HashMap;
use std::net::SocketAddr;

use relaycast_protocol::{Codec, Envelope, PacketBody, PacketType, ProtocolError, SessionId};

/// Who sent the packet being dispatched.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PacketContext {
    pub session_id: SessionId,
    pub peer: SocketAddr,
}

/// Why a packet was dropped instead of handled.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DropReason {
    /// No handler is registered for the tag.
    UnknownType(PacketType),
    /// The payload doesn't match the schema for its tag.
    MalformedPayload,
}

/// The result of dispatching one envelope.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DispatchOutcome {
    Handled,
    Dropped(DropReason),
}

type ErasedHandler<C> =
    Box<dyn Fn(&C, &PacketContext, &[u8]) -> Result<(), ProtocolError> + Send + Sync>;

/// Maps packet types to handlers.
///
/// ```rust
/// use relaycast::dispatch::{DispatchOutcome, Dispatcher, PacketContext};
/// use relaycast_protocol::{ChatMessage, Codec, JsonCodec, SessionId};
///
/// let mut dispatcher = Dispatcher::new(JsonCodec);
/// dispatcher.register(|ctx: &PacketContext, msg: ChatMessage| {
///     println!("{} says {}", ctx.session_id, msg.content);
/// });
///
/// let envelope = JsonCodec
///     .wrap(&ChatMessage { sender_id: SessionId(0), content: "hi".into() })
///     .unwrap();
/// let ctx = PacketContext { session_id: SessionId(1), peer: "127.0.0.1:9".parse().unwrap() };
/// assert_eq!(dispatcher.dispatch(&ctx, &envelope), DispatchOutcome::Handled);
/// ```
pub struct Dispatcher<C: Codec> {
    codec: C,
    handlers: HashMap<PacketType, ErasedHandler<C>>,
}

impl<C: Codec> Dispatcher<C> {
    /// Creates a dispatcher with no handlers.
    pub fn new(codec: C) -> Self {
        Self {
            codec,
            handlers: HashMap::new(),
        }
    }

    /// The codec used to decode payloads.
    pub fn codec(&self) -> &C {
        &self.codec
    }

    /// Registers `handler` for body type `M`, replacing any previous one.
    pub fn register<M, F>(&mut self, handler: F) -> &mut Self
    where
        M: PacketBody,
        F: Fn(&PacketContext, M) + Send + Sync + 'static,
    {
        let erased: ErasedHandler<C> =
            Box::new(move |codec: &C, ctx: &PacketContext, data: &[u8]| {
                let body: M = codec.decode(data)?;
                handler(ctx, body);
                Ok(())
            });
        if self.handlers.insert(M::PACKET_TYPE, erased).is_some() {
            tracing::debug!(packet_type = %M::PACKET_TYPE, "replaced packet handler");
        }
        self
    }

    /// Returns `true` if a handler is registered for `packet_type`.
    pub fn is_registered(&self, packet_type: PacketType) -> bool {
        self.handlers.contains_key(&packet_type)
    }

    /// Known packet types that have no handler.
    pub fn missing_handlers(&self) -> Vec<PacketType> {
        PacketType::KNOWN
            .into_iter()
            .filter(|t| !self.is_registered(*t))
            .collect()
    }

    /// Decodes the envelope's payload and runs its handler.
    ///
    /// Never fails: unknown and malformed packets are logged and dropped.
    pub fn dispatch(&self, ctx: &PacketContext, envelope: &Envelope) -> DispatchOutcome {
        let packet_type = envelope.packet_type;
        let Some(handler) = self.handlers.get(&packet_type) else {
            tracing::debug!(
                session_id = %ctx.session_id,
                %packet_type,
                "no handler for packet type, dropping"
            );
            return DispatchOutcome::Dropped(DropReason::UnknownType(packet_type));
        };

        match handler(&self.codec, ctx, &envelope.payload) {
            Ok(()) => DispatchOutcome::Handled,
            Err(e) => {
                tracing::debug!(
                    session_id = %ctx.session_id,
                    %packet_type,
                    error = %e,
                    "malformed payload, dropping"
                );
                DispatchOutcome::Dropped(DropReason::MalformedPayload)
            }
        }
    }
}
