use relaycast::prelude::*;

#[tokio::main]
async fn main() -> Result<(), RelaycastError> {
    relaycast::init_tracing();

    let config = ServerConfig::from_env();
    let builder = RelaycastServerBuilder::from_config(&config);

    if config.uses_memory_relay() {
        tracing::info!("using in-process relay");
        return serve(builder, MemoryRelay::new()).await;
    }

    let relay = RedisRelay::open(&config.relay_url)?;
    match relay.ping().await {
        Ok(()) => tracing::info!(url = relay.url(), "relay reachable"),
        Err(e) => tracing::warn!(
            url = relay.url(),
            error = %e,
            "relay unreachable, will keep retrying"
        ),
    }
    serve(builder, relay).await
}

async fn serve<R: Relay>(builder: RelaycastServerBuilder, relay: R) -> Result<(), RelaycastError> {
    let server = builder.build(relay).await?;
    server
        .run_until(async {
            if let Err(e) = tokio::signal::ctrl_c().await {
                tracing::error!(error = %e, "failed to listen for ctrl-c");
                std::future::pending::<()>().await;
            }
        })
        .await
}
