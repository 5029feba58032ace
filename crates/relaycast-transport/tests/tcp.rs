//! Integration tests for the TCP transport.
//!
//! These spin up a real listener on an OS-assigned port and connect a
//! plain `TcpStream` client to it.

use relaycast_transport::{Connection, TcpConnection, TcpTransport, Transport, TransportError};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;

#[tokio::test]
async fn test_tcp_accept_and_exchange_bytes() {
    let mut transport = TcpTransport::bind("127.0.0.1:0")
        .await
        .expect("should bind");
    let addr = transport.local_addr().expect("should have local addr");

    let server = tokio::spawn(async move { transport.accept().await.expect("should accept") });
    let mut client = TcpStream::connect(addr).await.expect("client should connect");
    let conn = server.await.expect("task should complete");

    assert_eq!(conn.peer_addr(), client.local_addr().unwrap());

    let (mut reader, mut writer) = conn.into_split();

    // Server → client.
    writer.write_all(b"hello from server").await.unwrap();
    let mut buf = [0u8; 17];
    client.read_exact(&mut buf).await.unwrap();
    assert_eq!(&buf, b"hello from server");

    // Client → server.
    client.write_all(b"hello from client").await.unwrap();
    let mut buf = [0u8; 17];
    reader.read_exact(&mut buf).await.unwrap();
    assert_eq!(&buf, b"hello from client");
}

#[tokio::test]
async fn test_tcp_halves_work_independently() {
    let mut transport = TcpTransport::bind("127.0.0.1:0").await.unwrap();
    let addr = transport.local_addr().unwrap();

    let server = tokio::spawn(async move { transport.accept().await.unwrap() });
    let mut client = TcpStream::connect(addr).await.unwrap();
    let (mut reader, mut writer) = server.await.unwrap().into_split();

    // A pending read on one half must not block writes on the other.
    let read_task = tokio::spawn(async move {
        let mut buf = [0u8; 4];
        reader.read_exact(&mut buf).await.unwrap();
        buf
    });
    writer.write_all(b"ping").await.unwrap();

    let mut buf = [0u8; 4];
    client.read_exact(&mut buf).await.unwrap();
    assert_eq!(&buf, b"ping");

    client.write_all(b"pong").await.unwrap();
    assert_eq!(&read_task.await.unwrap(), b"pong");
}

#[tokio::test]
async fn test_tcp_bind_in_use_returns_bind_failed() {
    let first = TcpTransport::bind("127.0.0.1:0").await.unwrap();
    let addr = first.local_addr().unwrap().to_string();

    let second = TcpTransport::bind(&addr).await;

    assert!(matches!(second, Err(TransportError::BindFailed { .. })));
}

#[tokio::test]
async fn test_tcp_connect_reaches_listener() {
    let mut transport = TcpTransport::bind("127.0.0.1:0").await.unwrap();
    let addr = transport.local_addr().unwrap();

    let server = tokio::spawn(async move { transport.accept().await.unwrap() });
    let client = TcpConnection::connect(&addr.to_string()).await.unwrap();
    let accepted = server.await.unwrap();

    assert_eq!(client.peer_addr(), addr);
    assert_eq!(accepted.peer_addr(), client.local_addr().unwrap());

    let (_client_reader, mut client_writer) = client.into_split();
    let (mut server_reader, _server_writer) = accepted.into_split();
    client_writer.write_all(b"hi").await.unwrap();
    let mut buf = [0u8; 2];
    server_reader.read_exact(&mut buf).await.unwrap();
    assert_eq!(&buf, b"hi");
}

#[tokio::test]
async fn test_tcp_connect_refused_returns_connect_failed() {
    // Grab a free port, then close the listener so nothing is there.
    let addr = {
        let transport = TcpTransport::bind("127.0.0.1:0").await.unwrap();
        transport.local_addr().unwrap().to_string()
    };

    let result = TcpConnection::connect(&addr).await;

    assert!(matches!(result, Err(TransportError::ConnectFailed { .. })));
}
