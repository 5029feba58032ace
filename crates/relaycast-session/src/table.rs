//! The session table: every live connection, keyed by session id.
//!
//! # Concurrency
//!
//! The table is shared by every connection task (insert on accept, remove
//! on disconnect) and by the broadcast fan-out (iterate). It sits behind a
//! `tokio::sync::RwLock` that is only ever held for the map operation
//! itself, never across a network write. Broadcasts iterate over a
//! snapshot of `Arc<Session>` handles, so a slow write to one session never
//! blocks accepts, disconnects, or other broadcasts from reading the table.

use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicI32, Ordering};
use std::sync::Arc;

use relaycast_protocol::SessionId;
use tokio::io::AsyncWrite;
use tokio::sync::RwLock;

use crate::{Session, SessionConfig, SessionError};

/// Tracks all live sessions.
///
/// ## Lifecycle
///
/// ```text
/// accept ──→ add() ──→ [live] ──(read/write failure, close)──→ remove()
/// ```
pub struct SessionTable {
    sessions: RwLock<HashMap<SessionId, Arc<Session>>>,

    /// Next id to hand out. Starts at 1 so that 0 can mean "not assigned"
    /// in client-sent messages.
    next_id: AtomicI32,

    config: SessionConfig,
}

impl SessionTable {
    /// Creates a new, empty table.
    pub fn new(config: SessionConfig) -> Self {
        Self {
            sessions: RwLock::new(HashMap::new()),
            next_id: AtomicI32::new(1),
            config,
        }
    }

    /// Registers a new connection and returns its session.
    ///
    /// The id is taken from an atomic counter, so concurrent calls from
    /// simultaneously accepted connections always get distinct, increasing
    /// ids. Ids are never reused.
    ///
    /// # Errors
    /// [`SessionError::IdsExhausted`] once the counter reaches `i32::MAX`.
    pub async fn add<W>(&self, peer: SocketAddr, writer: W) -> Result<Arc<Session>, SessionError>
    where
        W: AsyncWrite + Send + Unpin + 'static,
    {
        let id = self
            .next_id
            .fetch_update(Ordering::Relaxed, Ordering::Relaxed, |id| id.checked_add(1))
            .map(SessionId)
            .map_err(|_| SessionError::IdsExhausted)?;
        let session = Arc::new(Session::new(
            id,
            peer,
            Box::new(writer),
            self.config.write_timeout,
        ));

        self.sessions.write().await.insert(id, Arc::clone(&session));
        tracing::debug!(session_id = %id, %peer, "session added");
        Ok(session)
    }

    /// Removes a session. Removing an id that isn't present is a no-op.
    ///
    /// Returns the removed session so the caller can close it.
    pub async fn remove(&self, id: SessionId) -> Option<Arc<Session>> {
        let removed = self.sessions.write().await.remove(&id);
        if removed.is_some() {
            tracing::debug!(session_id = %id, "session removed");
        }
        removed
    }

    /// Looks up a session by id.
    pub async fn get(&self, id: SessionId) -> Option<Arc<Session>> {
        self.sessions.read().await.get(&id).cloned()
    }

    /// Returns the sessions registered right now, ordered by id.
    ///
    /// Sessions added or removed after the snapshot is taken are not
    /// reflected in it.
    pub async fn snapshot(&self) -> Vec<Arc<Session>> {
        let mut sessions: Vec<_> = self.sessions.read().await.values().cloned().collect();
        sessions.sort_by_key(|s| s.id());
        sessions
    }

    /// Calls `f` for each session in a snapshot of the table.
    pub async fn for_each<F>(&self, mut f: F)
    where
        F: FnMut(&Arc<Session>),
    {
        for session in self.snapshot().await {
            f(&session);
        }
    }

    /// Returns the number of live sessions.
    pub async fn len(&self) -> usize {
        self.sessions.read().await.len()
    }

    /// Returns `true` if no sessions are live.
    pub async fn is_empty(&self) -> bool {
        self.sessions.read().await.is_empty()
    }
}

impl Default for SessionTable {
    fn default() -> Self {
        Self::new(SessionConfig::default())
    }
}

// =========================================================================
// Tests
// =========================================================================

#[cfg(test)]
mod tests {
    //! Unit tests for `SessionTable`, using `tokio::io::duplex` pipes as
    //! stand-ins for sockets.

    use std::collections::HashSet;
    use std::time::Duration;

    use tokio::io::{AsyncReadExt, DuplexStream};

    use super::*;
    use crate::SessionError;

    fn peer() -> SocketAddr {
        "127.0.0.1:4000".parse().unwrap()
    }

    /// Adds a session whose writes land in the returned pipe end.
    async fn add_piped(table: &SessionTable) -> (Arc<Session>, DuplexStream) {
        let (writer, reader) = tokio::io::duplex(1024);
        (table.add(peer(), writer).await.unwrap(), reader)
    }

    // =====================================================================
    // add()
    // =====================================================================

    #[tokio::test]
    async fn test_add_assigns_increasing_ids_from_one() {
        let table = SessionTable::default();

        let (a, _ra) = add_piped(&table).await;
        let (b, _rb) = add_piped(&table).await;
        let (c, _rc) = add_piped(&table).await;

        assert_eq!(a.id(), SessionId(1));
        assert_eq!(b.id(), SessionId(2));
        assert_eq!(c.id(), SessionId(3));
        assert_eq!(table.len().await, 3);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_add_concurrent_calls_get_unique_ids() {
        let table = Arc::new(SessionTable::default());

        let mut tasks = Vec::new();
        for _ in 0..64 {
            let table = Arc::clone(&table);
            tasks.push(tokio::spawn(async move {
                let (writer, _reader) = tokio::io::duplex(16);
                table.add(peer(), writer).await.unwrap().id()
            }));
        }

        let mut ids = HashSet::new();
        for task in tasks {
            assert!(ids.insert(task.await.unwrap()), "duplicate session id");
        }
        assert_eq!(ids.len(), 64);
        assert_eq!(table.len().await, 64);
    }

    #[tokio::test]
    async fn test_add_refuses_once_ids_run_out() {
        let table = SessionTable::default();
        table.next_id.store(i32::MAX - 1, Ordering::Relaxed);

        let (last, _r) = add_piped(&table).await;
        let (writer, _reader) = tokio::io::duplex(16);
        let refused = table.add(peer(), writer).await;

        assert_eq!(last.id(), SessionId(i32::MAX - 1));
        assert!(matches!(refused, Err(SessionError::IdsExhausted)));
        let (writer, _reader) = tokio::io::duplex(16);
        assert!(table.add(peer(), writer).await.is_err());
        assert_eq!(table.len().await, 1);
    }

    #[tokio::test]
    async fn test_add_records_peer() {
        let table = SessionTable::default();
        let (session, _r) = add_piped(&table).await;
        assert_eq!(session.peer(), peer());
    }

    // =====================================================================
    // remove()
    // =====================================================================

    #[tokio::test]
    async fn test_remove_returns_session_once() {
        let table = SessionTable::default();
        let (session, _r) = add_piped(&table).await;

        let first = table.remove(session.id()).await;
        let second = table.remove(session.id()).await;

        assert!(first.is_some());
        assert!(second.is_none(), "second remove is a no-op");
        assert!(table.is_empty().await);
    }

    #[tokio::test]
    async fn test_remove_unknown_id_is_noop() {
        let table = SessionTable::default();
        let (_s, _r) = add_piped(&table).await;

        assert!(table.remove(SessionId(99)).await.is_none());
        assert_eq!(table.len().await, 1);
    }

    #[tokio::test]
    async fn test_ids_are_not_reused_after_remove() {
        let table = SessionTable::default();
        let (a, _ra) = add_piped(&table).await;
        table.remove(a.id()).await;

        let (b, _rb) = add_piped(&table).await;

        assert!(b.id() > a.id());
    }

    // =====================================================================
    // snapshot() / for_each() / get()
    // =====================================================================

    #[tokio::test]
    async fn test_snapshot_is_stable_while_table_changes() {
        let table = SessionTable::default();
        let (a, _ra) = add_piped(&table).await;
        let (b, _rb) = add_piped(&table).await;

        let snapshot = table.snapshot().await;
        table.remove(a.id()).await;
        let (_c, _rc) = add_piped(&table).await;

        let ids: Vec<_> = snapshot.iter().map(|s| s.id()).collect();
        assert_eq!(ids, vec![a.id(), b.id()]);
    }

    #[tokio::test]
    async fn test_for_each_visits_every_session() {
        let table = SessionTable::default();
        let (_a, _ra) = add_piped(&table).await;
        let (_b, _rb) = add_piped(&table).await;

        let mut seen = Vec::new();
        table.for_each(|s| seen.push(s.id())).await;

        assert_eq!(seen, vec![SessionId(1), SessionId(2)]);
    }

    #[tokio::test]
    async fn test_get_returns_none_for_unknown_id() {
        let table = SessionTable::default();
        assert!(table.get(SessionId(5)).await.is_none());
    }

    // =====================================================================
    // Session writes
    // =====================================================================

    #[tokio::test]
    async fn test_send_writes_frame_bytes() {
        let table = SessionTable::default();
        let (session, mut reader) = add_piped(&table).await;

        session.send(b"\x02\x00\x00\x00hi").await.unwrap();

        let mut buf = [0u8; 6];
        reader.read_exact(&mut buf).await.unwrap();
        assert_eq!(&buf, b"\x02\x00\x00\x00hi");
    }

    #[tokio::test]
    async fn test_send_to_closed_peer_returns_send_failed() {
        let table = SessionTable::default();
        let (session, reader) = add_piped(&table).await;
        drop(reader);

        let result = session.send(b"data").await;

        assert!(
            matches!(result, Err(SessionError::SendFailed { id, .. }) if id == session.id()),
            "got {result:?}"
        );
    }

    #[tokio::test]
    async fn test_send_guard_is_released_after_failure() {
        let table = SessionTable::default();
        let (session, reader) = add_piped(&table).await;
        drop(reader);

        assert!(session.send(b"x").await.is_err());

        // If the failed write had leaked the guard this would hang.
        let guard = tokio::time::timeout(Duration::from_secs(1), session.send_guard()).await;
        assert!(guard.is_ok(), "send guard should be free again");
    }

    #[tokio::test(start_paused = true)]
    async fn test_send_to_stalled_peer_times_out() {
        let table = SessionTable::new(SessionConfig {
            write_timeout: Some(Duration::from_millis(100)),
        });
        // A 4-byte pipe that nobody reads from fills up immediately.
        let (writer, _reader) = tokio::io::duplex(4);
        let session = table.add(peer(), writer).await.unwrap();

        let result = session.send(&[0u8; 64]).await;

        assert!(matches!(result, Err(SessionError::Timeout(id)) if id == session.id()));
    }

    #[tokio::test]
    async fn test_concurrent_sends_never_interleave() {
        let table = Arc::new(SessionTable::default());
        let (writer, mut reader) = tokio::io::duplex(8);
        let session = table.add(peer(), writer).await.unwrap();

        let frame_a = vec![b'a'; 256];
        let frame_b = vec![b'b'; 256];
        let s1 = Arc::clone(&session);
        let s2 = Arc::clone(&session);
        let fa = frame_a.clone();
        let fb = frame_b.clone();
        let t1 = tokio::spawn(async move { s1.send(&fa).await.unwrap() });
        let t2 = tokio::spawn(async move { s2.send(&fb).await.unwrap() });

        let mut received = vec![0u8; 512];
        reader.read_exact(&mut received).await.unwrap();
        t1.await.unwrap();
        t2.await.unwrap();

        // Each 256-byte frame must arrive contiguously.
        let (first, second) = received.split_at(256);
        assert!(first.iter().all(|&b| b == first[0]));
        assert!(second.iter().all(|&b| b == second[0]));
        assert_ne!(first[0], second[0]);
    }

    #[tokio::test]
    async fn test_close_signals_end_of_stream() {
        let table = SessionTable::default();
        let (session, mut reader) = add_piped(&table).await;

        session.close().await;

        let mut buf = Vec::new();
        let n = reader.read_to_end(&mut buf).await.unwrap();
        assert_eq!(n, 0);
        assert!(session.is_closed());
    }

    #[tokio::test]
    async fn test_closed_resolves_after_close() {
        let table = SessionTable::default();
        let (session, _reader) = add_piped(&table).await;

        let waiter = {
            let session = Arc::clone(&session);
            tokio::spawn(async move { session.closed().await })
        };
        tokio::task::yield_now().await;
        assert!(!waiter.is_finished());

        session.close().await;

        tokio::time::timeout(Duration::from_secs(1), waiter)
            .await
            .expect("closed() should resolve")
            .unwrap();
        // Already closed: resolves immediately.
        session.closed().await;
    }

    #[tokio::test]
    async fn test_send_after_close_returns_closed() {
        let table = SessionTable::default();
        let (session, _reader) = add_piped(&table).await;

        session.close().await;
        session.close().await;
        let result = session.send(b"late").await;

        assert!(matches!(result, Err(SessionError::Closed(id)) if id == session.id()));
    }
}
