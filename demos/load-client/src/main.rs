//! Load-testing client for a Relaycast server.
//!
//! ```text
//! load-client --addr 127.0.0.1:3000 --clients 10 --messages 10 --interval-ms 1000
//! ```
//!
//! Connects `clients` chat clients, has each of them send `messages` chat
//! lines `interval-ms` apart while reading broadcasts the whole time.
//! Against a single server every client should see every line.

use std::time::{Duration, Instant};

use clap::Parser;
use futures_util::future::join_all;
use relaycast::prelude::*;

/// How long to keep reading after the last line was sent.
const RECEIVE_GRACE: Duration = Duration::from_secs(5);

#[derive(Parser, Debug, Clone)]
#[command(author, version, about, long_about = None)]
struct LoadConfig {
    /// Address of the server to load.
    #[arg(long, default_value = "127.0.0.1:3000")]
    addr: String,

    /// Number of concurrent clients.
    #[arg(long, default_value_t = 10)]
    clients: usize,

    /// Chat lines each client sends.
    #[arg(long, default_value_t = 10)]
    messages: usize,

    /// Pause between two lines from the same client, in milliseconds.
    #[arg(long, default_value_t = 1000)]
    interval_ms: u64,
}

impl LoadConfig {
    fn interval(&self) -> Duration {
        Duration::from_millis(self.interval_ms)
    }

    /// How long a client may spend sending and then draining broadcasts.
    fn run_time(&self) -> Duration {
        let lines = u32::try_from(self.messages).unwrap_or(u32::MAX);
        self.interval().saturating_mul(lines) + RECEIVE_GRACE
    }
}

#[derive(Debug, Default)]
struct ClientReport {
    sent: usize,
    received: usize,
}

async fn send_lines(
    index: usize,
    sender: &mut ChatSender,
    config: &LoadConfig,
) -> Result<usize, RelaycastError> {
    let mut sent = 0;
    for seq in 0..config.messages {
        sender
            .send_chat(&format!("hello from client {index} #{seq}"))
            .await?;
        sent += 1;
        tokio::time::sleep(config.interval()).await;
    }
    Ok(sent)
}

async fn receive_lines(
    index: usize,
    receiver: &mut ChatReceiver,
    expected: usize,
    run_time: Duration,
) -> Result<usize, RelaycastError> {
    let mut received = 0;
    let deadline = tokio::time::sleep(run_time);
    tokio::pin!(deadline);
    while received < expected {
        tokio::select! {
            _ = &mut deadline => break,
            msg = receiver.recv_message() => match msg? {
                Some(Message::Chat(chat)) => {
                    received += 1;
                    tracing::debug!(client = index, sender = %chat.sender_id, content = %chat.content, "received");
                }
                Some(Message::System(notice)) => {
                    tracing::info!(client = index, text = %notice.text, "server notice");
                }
                None => {
                    tracing::warn!(client = index, "server closed the connection");
                    break;
                }
            },
        }
    }
    Ok(received)
}

async fn run_client(index: usize, config: LoadConfig) -> Result<ClientReport, RelaycastError> {
    let (mut receiver, mut sender) = ChatClient::connect(&config.addr).await?.into_split();
    let expected = config.clients * config.messages;

    let (sent, received) = tokio::join!(
        send_lines(index, &mut sender, &config),
        receive_lines(index, &mut receiver, expected, config.run_time()),
    );

    sender.shutdown().await?;
    Ok(ClientReport {
        sent: sent?,
        received: received?,
    })
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    relaycast::init_tracing();

    let config = LoadConfig::parse();
    tracing::info!(
        addr = %config.addr,
        clients = config.clients,
        messages = config.messages,
        interval_ms = config.interval_ms,
        "starting load test"
    );

    let started = Instant::now();
    let results = join_all(
        (0..config.clients).map(|index| tokio::spawn(run_client(index, config.clone()))),
    )
    .await;

    let mut sent = 0;
    let mut received = 0;
    let mut failed = 0;
    for (index, result) in results.into_iter().enumerate() {
        match result {
            Ok(Ok(report)) => {
                sent += report.sent;
                received += report.received;
            }
            Ok(Err(e)) => {
                failed += 1;
                tracing::warn!(client = index, error = %e, "client failed");
            }
            Err(e) => {
                failed += 1;
                tracing::error!(client = index, error = %e, "client task panicked");
            }
        }
    }

    tracing::info!(
        sent,
        received,
        failed,
        elapsed_ms = started.elapsed().as_millis() as u64,
        "load test finished"
    );
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = LoadConfig::parse_from(["load-client"]);
        assert_eq!(config.addr, "127.0.0.1:3000");
        assert_eq!(config.clients, 10);
        assert_eq!(config.messages, 10);
        assert_eq!(config.interval(), Duration::from_secs(1));
    }

    #[test]
    fn test_flags_override_defaults() {
        let config = LoadConfig::parse_from([
            "load-client",
            "--addr",
            "10.0.0.5:4000",
            "--clients",
            "3",
            "--messages",
            "2",
            "--interval-ms",
            "50",
        ]);
        assert_eq!(config.addr, "10.0.0.5:4000");
        assert_eq!(config.clients, 3);
        assert_eq!(config.run_time(), Duration::from_millis(100) + RECEIVE_GRACE);
    }

    #[test]
    fn test_bad_count_is_rejected() {
        assert!(LoadConfig::try_parse_from(["load-client", "--clients", "many"]).is_err());
    }
}
