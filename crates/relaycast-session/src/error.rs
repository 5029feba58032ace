//! Error types for the session layer.

use relaycast_protocol::SessionId;

/// Errors raised by sessions and the session table.
///
/// Any write error means the session's connection is no longer usable;
/// the caller should remove the session from the table.
#[derive(Debug, thiserror::Error)]
pub enum SessionError {
    /// Writing or flushing the frame failed.
    #[error("send to session {id} failed: {source}")]
    SendFailed {
        id: SessionId,
        #[source]
        source: std::io::Error,
    },

    /// The write did not complete within the session's write timeout.
    /// The peer has most likely stopped reading.
    #[error("send to session {0} timed out")]
    Timeout(SessionId),

    /// The session was already closed.
    #[error("session {0} is closed")]
    Closed(SessionId),

    /// Every positive session id has been handed out.
    #[error("session ids exhausted")]
    IdsExhausted,
}

impl SessionError {
    /// The session the failed write was addressed to, if any.
    pub fn session_id(&self) -> Option<SessionId> {
        match self {
            Self::SendFailed { id, .. } => Some(*id),
            Self::Timeout(id) | Self::Closed(id) => Some(*id),
            Self::IdsExhausted => None,
        }
    }
}
