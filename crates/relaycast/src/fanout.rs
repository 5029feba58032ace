//! Broadcast fan-out: one envelope, every live session.

use std::sync::Arc;

use relaycast_protocol::{Codec, Envelope, ProtocolError, SessionId, encode_frame};
use relaycast_session::{Session, SessionError, SessionTable};

/// What happened during one broadcast.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BroadcastReport {
    /// Sessions that received the frame.
    pub delivered: usize,
    /// Sessions whose write failed; they were removed and closed.
    pub failed: Vec<SessionId>,
}

/// Writes frames to every session in a [`SessionTable`].
///
/// The envelope is encoded once and the same bytes go to every session
/// present when the broadcast starts. Sessions are written one after the
/// other, each under its own send guard and write timeout. A session whose
/// write fails is removed from the table and closed; the rest still get
/// the frame.
pub struct Broadcaster<C: Codec> {
    sessions: Arc<SessionTable>,
    codec: C,
}

impl<C: Codec + Clone> Clone for Broadcaster<C> {
    fn clone(&self) -> Self {
        Self {
            sessions: Arc::clone(&self.sessions),
            codec: self.codec.clone(),
        }
    }
}

impl<C: Codec> Broadcaster<C> {
    pub fn new(sessions: Arc<SessionTable>, codec: C) -> Self {
        Self { sessions, codec }
    }

    /// The table this broadcaster writes to.
    pub fn sessions(&self) -> &Arc<SessionTable> {
        &self.sessions
    }

    /// Encodes `envelope` once and writes it to every live session.
    ///
    /// # Errors
    /// Only encoding can fail. Per-session write failures are reported in
    /// the returned [`BroadcastReport`].
    pub async fn broadcast(&self, envelope: &Envelope) -> Result<BroadcastReport, ProtocolError> {
        if self.sessions.is_empty().await {
            return Ok(BroadcastReport::default());
        }
        let frame = encode_frame(&self.codec, envelope)?;
        Ok(self.broadcast_frame(&frame).await)
    }

    /// Writes an already-encoded frame to every live session.
    pub async fn broadcast_frame(&self, frame: &[u8]) -> BroadcastReport {
        let mut report = BroadcastReport::default();
        for session in self.sessions.snapshot().await {
            match session.send(frame).await {
                Ok(()) => report.delivered += 1,
                Err(e) => {
                    report.failed.push(session.id());
                    self.drop_session(&session, &e).await;
                }
            }
        }

        if !report.failed.is_empty() {
            tracing::debug!(
                delivered = report.delivered,
                failed = report.failed.len(),
                "broadcast finished with failures"
            );
        }
        report
    }

    /// Encodes `envelope` and writes it to one session.
    ///
    /// Unlike a broadcast, a failed write is returned to the caller and
    /// the session is left in the table.
    pub async fn send_to(&self, session: &Session, envelope: &Envelope) -> Result<(), crate::RelaycastError> {
        let frame = encode_frame(&self.codec, envelope)?;
        session.send(&frame).await?;
        Ok(())
    }

    async fn drop_session(&self, session: &Arc<Session>, error: &SessionError) {
        // A closed session is being torn down by its own connection task.
        if !matches!(error, SessionError::Closed(_)) {
            tracing::warn!(
                session_id = %session.id(),
                peer = %session.peer(),
                error = %error,
                "broadcast write failed, dropping session"
            );
        }
        if let Some(removed) = self.sessions.remove(session.id()).await {
            removed.close().await;
        }
    }
}
