//! Per-connection handler: register the session, then read and dispatch
//! frames until the connection ends.
//!
//! Each accepted connection gets its own Tokio task running this handler.
//! The loop ends on EOF, a broken or oversized frame, the idle timeout, the
//! session being closed by someone else (a failed broadcast), or server
//! shutdown. Whatever the reason, the session guard removes the session
//! from the table and closes its write half.

use std::sync::Arc;
use std::time::Duration;

use relaycast_protocol::{Codec, ProtocolError, SystemMessage, read_frame};
use relaycast_session::{Session, SessionTable};
use relaycast_transport::Connection;
use tokio::io::AsyncRead;

use crate::dispatch::PacketContext;
use crate::server::ServerState;

/// Removes and closes the session when the handler exits, panics included.
///
/// `Drop` can't await, so the cleanup runs on a spawned task.
struct SessionGuard {
    session: Arc<Session>,
    sessions: Arc<SessionTable>,
}

impl Drop for SessionGuard {
    fn drop(&mut self) {
        let session = Arc::clone(&self.session);
        let sessions = Arc::clone(&self.sessions);
        tokio::spawn(async move {
            sessions.remove(session.id()).await;
            session.close().await;
        });
    }
}

/// Why the receive loop stopped.
#[derive(Debug)]
enum ReadEvent {
    Frame(Vec<u8>),
    Eof,
    Failed(ProtocolError),
    Idle,
}

/// Handles a single connection from accept to close.
pub(crate) async fn handle_connection<T, C>(conn: T, state: Arc<ServerState<C>>)
where
    T: Connection,
    C: Codec,
{
    let peer = conn.peer_addr();
    let (mut reader, writer) = conn.into_split();

    let session = match state.sessions.add(peer, writer).await {
        Ok(session) => session,
        Err(e) => {
            tracing::error!(%peer, error = %e, "refusing connection");
            return;
        }
    };
    let session_id = session.id();
    let _guard = SessionGuard {
        session: Arc::clone(&session),
        sessions: Arc::clone(&state.sessions),
    };
    tracing::info!(%session_id, %peer, "client connected");

    if let Some(text) = &state.settings.greeting {
        let greeting = SystemMessage { text: text.clone() };
        let sent = match state.dispatcher.codec().wrap(&greeting) {
            Ok(envelope) => state.broadcaster.send_to(&session, &envelope).await,
            Err(e) => Err(e.into()),
        };
        if let Err(e) = sent {
            tracing::debug!(%session_id, error = %e, "failed to send greeting");
            return;
        }
    }

    let ctx = PacketContext { session_id, peer };
    let mut shutdown = state.shutdown.clone();

    loop {
        let event = tokio::select! {
            _ = shutdown.changed() => {
                tracing::debug!(%session_id, "server shutting down, closing connection");
                break;
            }
            _ = session.closed() => {
                tracing::debug!(%session_id, "session closed by server");
                break;
            }
            event = next_frame(&mut reader, state.settings.max_frame_len, state.settings.idle_timeout) => event,
        };

        let data = match event {
            ReadEvent::Frame(data) => data,
            ReadEvent::Eof => {
                tracing::info!(%session_id, "client disconnected");
                break;
            }
            ReadEvent::Failed(e) => {
                tracing::debug!(%session_id, error = %e, "read failed, closing connection");
                break;
            }
            ReadEvent::Idle => {
                tracing::info!(%session_id, "connection idle, closing");
                break;
            }
        };

        let envelope = match state.dispatcher.codec().decode_envelope(&data) {
            Ok(envelope) => envelope,
            Err(e) => {
                tracing::debug!(%session_id, error = %e, "failed to decode envelope");
                continue;
            }
        };

        state.dispatcher.dispatch(&ctx, &envelope);
    }
}

/// Reads one frame, bounded by the idle timeout if there is one.
async fn next_frame<R>(reader: &mut R, max_len: usize, idle_timeout: Option<Duration>) -> ReadEvent
where
    R: AsyncRead + Unpin,
{
    let read = read_frame(reader, max_len);
    let result = match idle_timeout {
        Some(limit) => match tokio::time::timeout(limit, read).await {
            Ok(result) => result,
            Err(_) => return ReadEvent::Idle,
        },
        None => read.await,
    };

    match result {
        Ok(Some(data)) => ReadEvent::Frame(data),
        Ok(None) => ReadEvent::Eof,
        Err(e) => ReadEvent::Failed(e),
    }
}
