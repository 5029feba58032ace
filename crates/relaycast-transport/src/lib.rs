//! Transport abstraction layer for Relaycast.
//!
//! Provides the [`Transport`] and [`Connection`] traits that separate the
//! server's accept loop from the concrete socket type, and [`TcpTransport`],
//! the plain TCP implementation the server uses.
//!
//! A connection is split into independent read and write halves as soon as
//! it is accepted: the read half goes to the connection's receive loop, the
//! write half goes into the session table behind a per-session lock. Reads
//! and writes on one socket therefore never wait for each other.

mod error;
mod tcp;

pub use error::TransportError;
pub use tcp::{TcpConnection, TcpTransport};

use std::future::Future;
use std::net::SocketAddr;

use tokio::io::{AsyncRead, AsyncWrite};

/// Accepts new incoming connections.
pub trait Transport: Send + Sync + 'static {
    /// The connection type produced by this transport.
    type Connection: Connection;
    /// The error type for transport operations.
    type Error: std::error::Error + Send + Sync;

    /// Waits for and accepts the next incoming connection.
    fn accept(
        &mut self,
    ) -> impl Future<Output = Result<Self::Connection, Self::Error>> + Send;

    /// Returns the address the transport is listening on.
    fn local_addr(&self) -> Result<SocketAddr, Self::Error>;
}

/// A single accepted connection, not yet split.
pub trait Connection: Send + 'static {
    /// The receiving half of the byte stream.
    type Reader: AsyncRead + Unpin + Send + 'static;
    /// The sending half of the byte stream.
    type Writer: AsyncWrite + Unpin + Send + 'static;

    /// Returns the remote peer's address.
    fn peer_addr(&self) -> SocketAddr;

    /// Splits the connection into owned read and write halves.
    fn into_split(self) -> (Self::Reader, Self::Writer);
}
