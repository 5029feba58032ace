//! Error types for the relay layer.

/// Errors that can occur while talking to the publish/subscribe relay.
#[derive(Debug, thiserror::Error)]
pub enum RelayError {
    /// The relay could not be reached (connect refused, connection lost,
    /// or the relay is marked offline).
    #[error("relay unavailable: {0}")]
    Unavailable(String),

    /// The relay answered with something we can't interpret, or reported
    /// an error for our command.
    #[error("relay protocol error: {0}")]
    Protocol(String),
}

impl From<redis::RedisError> for RelayError {
    fn from(e: redis::RedisError) -> Self {
        if e.is_io_error() || e.is_connection_refusal() || e.is_connection_dropped() || e.is_timeout() {
            Self::Unavailable(e.to_string())
        } else {
            Self::Protocol(e.to_string())
        }
    }
}
