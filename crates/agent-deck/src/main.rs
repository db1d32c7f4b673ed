use std::sync::Arc;

use agent_deck::DeckHost;
use agent_deck_core::{paths, DeckConfig};
use agent_deck_pipeline::event_channel;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let config = DeckConfig::from_file(paths::config_path())?;
    tracing::info!("agent-deck starting");

    // The GUI shell consumes this channel; headless runs just drain it so
    // pipelines never block on a full sink.
    let (events, mut event_rx) = event_channel();
    let drain = tokio::spawn(async move { while event_rx.recv().await.is_some() {} });

    let host = Arc::new(DeckHost::new(config, events, None));
    DeckHost::startup(&host).await?;

    tracing::info!("agent-deck running");
    tokio::signal::ctrl_c().await?;

    tracing::info!("agent-deck shutting down");
    host.shutdown().await;
    drain.abort();

    Ok(())
}
