//! A minimal chat client speaking the Relaycast wire format.
//!
//! Used by the load-testing demo and by the integration tests.

use relaycast_protocol::{
    ChatMessage, Codec, DEFAULT_MAX_FRAME_LEN, Envelope, JsonCodec, Message, SessionId,
    encode_frame, read_frame, write_frame,
};
use relaycast_transport::{Connection, TcpConnection};
use tokio::io::AsyncWriteExt;
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};

use crate::RelaycastError;

/// A connected chat client.
///
/// [`into_split`](Self::into_split) separates the sending and receiving
/// halves so that both can run at the same time.
pub struct ChatClient<C: Codec = JsonCodec> {
    receiver: ChatReceiver<C>,
    sender: ChatSender<C>,
}

/// The receiving half of a [`ChatClient`].
pub struct ChatReceiver<C: Codec = JsonCodec> {
    reader: OwnedReadHalf,
    codec: C,
    max_frame_len: usize,
}

/// The sending half of a [`ChatClient`].
pub struct ChatSender<C: Codec = JsonCodec> {
    writer: OwnedWriteHalf,
    codec: C,
}

impl ChatClient {
    /// Connects to a server at `addr` (`host:port`).
    pub async fn connect(addr: &str) -> Result<Self, RelaycastError> {
        let conn = TcpConnection::connect(addr).await?;
        tracing::debug!(peer = %conn.peer_addr(), "chat client connected");
        let (reader, writer) = conn.into_split();
        Ok(Self {
            receiver: ChatReceiver {
                reader,
                codec: JsonCodec,
                max_frame_len: DEFAULT_MAX_FRAME_LEN,
            },
            sender: ChatSender {
                writer,
                codec: JsonCodec,
            },
        })
    }
}

impl<C: Codec> ChatClient<C> {
    /// Splits the client into halves that can be used from separate tasks.
    pub fn into_split(self) -> (ChatReceiver<C>, ChatSender<C>) {
        (self.receiver, self.sender)
    }

    /// Sends a chat line. The server fills in the sender id.
    pub async fn send_chat(&mut self, content: &str) -> Result<(), RelaycastError> {
        self.sender.send_chat(content).await
    }

    /// Frames and sends an arbitrary envelope.
    pub async fn send_envelope(&mut self, envelope: &Envelope) -> Result<(), RelaycastError> {
        self.sender.send_envelope(envelope).await
    }

    /// Writes bytes as they are, without framing.
    pub async fn send_raw(&mut self, bytes: &[u8]) -> Result<(), RelaycastError> {
        self.sender.send_raw(bytes).await
    }

    /// Waits for the next envelope. `None` when the server closed the
    /// connection.
    pub async fn recv(&mut self) -> Result<Option<Envelope>, RelaycastError> {
        self.receiver.recv().await
    }

    /// Waits for the next envelope and decodes its body.
    pub async fn recv_message(&mut self) -> Result<Option<Message>, RelaycastError> {
        self.receiver.recv_message().await
    }

    /// Closes the sending side; the server sees a clean end of stream.
    pub async fn shutdown(&mut self) -> Result<(), RelaycastError> {
        self.sender.shutdown().await
    }
}

impl<C: Codec> ChatSender<C> {
    /// Sends a chat line. The server fills in the sender id.
    pub async fn send_chat(&mut self, content: &str) -> Result<(), RelaycastError> {
        let msg = ChatMessage {
            sender_id: SessionId::default(),
            content: content.to_string(),
        };
        let envelope = self.codec.wrap(&msg)?;
        self.send_envelope(&envelope).await
    }

    /// Frames and sends an arbitrary envelope.
    pub async fn send_envelope(&mut self, envelope: &Envelope) -> Result<(), RelaycastError> {
        let frame = encode_frame(&self.codec, envelope)?;
        self.send_raw(&frame).await
    }

    /// Writes bytes as they are, without framing.
    pub async fn send_raw(&mut self, bytes: &[u8]) -> Result<(), RelaycastError> {
        write_frame(&mut self.writer, bytes)
            .await
            .map_err(relaycast_protocol::ProtocolError::from)?;
        Ok(())
    }

    /// Closes the sending side.
    pub async fn shutdown(&mut self) -> Result<(), RelaycastError> {
        self.writer
            .shutdown()
            .await
            .map_err(relaycast_protocol::ProtocolError::from)?;
        Ok(())
    }
}

impl<C: Codec> ChatReceiver<C> {
    /// Waits for the next envelope. `None` when the server closed the
    /// connection.
    pub async fn recv(&mut self) -> Result<Option<Envelope>, RelaycastError> {
        let Some(data) = read_frame(&mut self.reader, self.max_frame_len).await? else {
            return Ok(None);
        };
        Ok(Some(self.codec.decode_envelope(&data)?))
    }

    /// Waits for the next envelope and decodes its body.
    pub async fn recv_message(&mut self) -> Result<Option<Message>, RelaycastError> {
        let Some(envelope) = self.recv().await? else {
            return Ok(None);
        };
        Ok(Some(
            self.codec
                .decode_body(envelope.packet_type, &envelope.payload)?,
        ))
    }
}
