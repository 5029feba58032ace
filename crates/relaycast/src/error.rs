//! Unified error type for the Relaycast server.

use std::path::PathBuf;

use relaycast_protocol::ProtocolError;
use relaycast_relay::RelayError;
use relaycast_session::SessionError;
use relaycast_transport::TransportError;

/// Errors raised while loading a configuration file.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// The file couldn't be read.
    #[error("failed to read config file {}: {source}", path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The file isn't valid JSON for [`ServerConfig`](crate::config::ServerConfig).
    #[error("failed to parse config file {}: {source}", path.display())]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
}

/// Top-level error that wraps all crate-specific errors.
///
/// The `#[from]` attribute on each variant auto-generates `From` impls,
/// so the `?` operator converts sub-crate errors automatically.
#[derive(Debug, thiserror::Error)]
pub enum RelaycastError {
    /// A transport-level error (bind, accept).
    #[error(transparent)]
    Transport(#[from] TransportError),

    /// A protocol-level error (framing, encode, decode).
    #[error(transparent)]
    Protocol(#[from] ProtocolError),

    /// A session-level error (write failed or timed out).
    #[error(transparent)]
    Session(#[from] SessionError),

    /// The relay couldn't be reached or misbehaved.
    #[error(transparent)]
    Relay(#[from] RelayError),

    /// The configuration couldn't be loaded.
    #[error(transparent)]
    Config(#[from] ConfigError),
}
