//! Session types: the server's record of one live client connection.
//!
//! A session owns the *write* half of its connection. The read half lives
//! in the connection's receive loop, so reading and writing never contend.
//! Writes, however, can come from more than one place (the broadcast
//! fan-out, direct replies such as a greeting), and a byte stream is not
//! safe for concurrent writers: two frames written at once could interleave
//! mid-frame. Every write therefore goes through the session's send guard.

use std::net::SocketAddr;
use std::time::Duration;

use relaycast_protocol::SessionId;
use tokio::io::{AsyncWrite, AsyncWriteExt};
use tokio::sync::{watch, Mutex, MutexGuard};

use crate::SessionError;

/// The boxed write half stored in every session.
///
/// Boxing erases the concrete stream type, so the table can hold TCP
/// sockets in production and in-memory pipes in tests.
pub type BoxedWriter = Box<dyn AsyncWrite + Send + Unpin>;

// ---------------------------------------------------------------------------
// SessionConfig
// ---------------------------------------------------------------------------

/// Configuration for session behavior.
#[derive(Debug, Clone)]
pub struct SessionConfig {
    /// Upper bound for writing one frame to one session.
    ///
    /// A peer that stops reading eventually fills its socket buffer, and
    /// writes to it block. The timeout caps how long one such peer can hold
    /// up a broadcast. `None` waits forever.
    ///
    /// Default: 5 seconds.
    pub write_timeout: Option<Duration>,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            write_timeout: Some(Duration::from_secs(5)),
        }
    }
}

// ---------------------------------------------------------------------------
// Session
// ---------------------------------------------------------------------------

/// A single client's session on the server.
///
/// Created by [`SessionTable::add`](crate::SessionTable::add) when a
/// connection is accepted and shared as `Arc<Session>` between the table,
/// the connection's receive loop, and any in-flight broadcast.
pub struct Session {
    id: SessionId,
    peer: SocketAddr,
    writer: Mutex<BoxedWriter>,
    write_timeout: Option<Duration>,
    closed: watch::Sender<bool>,
}

impl Session {
    pub(crate) fn new(
        id: SessionId,
        peer: SocketAddr,
        writer: BoxedWriter,
        write_timeout: Option<Duration>,
    ) -> Self {
        Self {
            id,
            peer,
            writer: Mutex::new(writer),
            write_timeout,
            closed: watch::Sender::new(false),
        }
    }

    /// The session's unique id.
    pub fn id(&self) -> SessionId {
        self.id
    }

    /// The remote address of the session's connection.
    pub fn peer(&self) -> SocketAddr {
        self.peer
    }

    /// Returns `true` once [`close`](Self::close) has run.
    pub fn is_closed(&self) -> bool {
        *self.closed.borrow()
    }

    /// Resolves once the session has been closed, by whoever closed it.
    ///
    /// The connection's receive loop waits on this so that a session
    /// dropped by the fan-out stops reading too.
    pub async fn closed(&self) {
        let mut rx = self.closed.subscribe();
        let _ = rx.wait_for(|closed| *closed).await;
    }

    /// Acquires exclusive write access to this session's connection.
    ///
    /// Waits while another writer holds the guard. The guard is released
    /// when it is dropped, whether or not the writes through it succeeded.
    pub async fn send_guard(&self) -> SendGuard<'_> {
        SendGuard {
            id: self.id,
            writer: self.writer.lock().await,
            write_timeout: self.write_timeout,
            closed: &self.closed,
        }
    }

    /// Writes one complete, already-encoded frame.
    ///
    /// Shorthand for taking the send guard, writing, and releasing it.
    pub async fn send(&self, frame: &[u8]) -> Result<(), SessionError> {
        self.send_guard().await.write_frame(frame).await
    }

    /// Shuts down the write half, signalling end-of-stream to the peer.
    ///
    /// Waits for any in-progress write to finish first. Errors are ignored:
    /// the connection is being torn down either way. Closing twice is a
    /// no-op, and later sends fail with [`SessionError::Closed`].
    pub async fn close(&self) {
        let mut writer = self.writer.lock().await;
        if self.closed.send_replace(true) {
            return;
        }
        if let Err(e) = writer.shutdown().await {
            tracing::trace!(session_id = %self.id, error = %e, "shutdown after close failed");
        }
    }
}

impl std::fmt::Debug for Session {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Session")
            .field("id", &self.id)
            .field("peer", &self.peer)
            .finish_non_exhaustive()
    }
}

/// Exclusive write access to one session, obtained from [`Session::send_guard`].
pub struct SendGuard<'a> {
    id: SessionId,
    writer: MutexGuard<'a, BoxedWriter>,
    write_timeout: Option<Duration>,
    closed: &'a watch::Sender<bool>,
}

impl SendGuard<'_> {
    /// Writes and flushes one frame, bounded by the session's write timeout.
    ///
    /// # Errors
    /// - [`SessionError::SendFailed`] if the write or flush fails.
    /// - [`SessionError::Timeout`] if it doesn't finish in time. Part of the
    ///   frame may already be on the wire, so the session must be dropped.
    /// - [`SessionError::Closed`] if the session was closed.
    pub async fn write_frame(&mut self, frame: &[u8]) -> Result<(), SessionError> {
        let id = self.id;
        if *self.closed.borrow() {
            return Err(SessionError::Closed(id));
        }
        let writer = &mut *self.writer;
        let write = relaycast_protocol::write_frame(writer, frame);

        let result = match self.write_timeout {
            Some(limit) => tokio::time::timeout(limit, write)
                .await
                .map_err(|_| SessionError::Timeout(id))?,
            None => write.await,
        };
        result.map_err(|source| SessionError::SendFailed { id, source })
    }
}
