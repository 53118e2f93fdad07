use anyhow::Result;
use meenoe_ai::config::AppConfig;
use meenoe_ai::proxy::{ProxyServer, ProxyState};
use meenoe_ai::storage::SessionStore;

#[tokio::main]
async fn main() -> Result<()> {
    // Console + daily rolling file
    let log_dir = dirs::config_dir()
        .unwrap_or_else(|| std::path::PathBuf::from("."))
        .join("meenoe")
        .join("logs");
    let _ = std::fs::create_dir_all(&log_dir);

    let file_appender = tracing_appender::rolling::daily(&log_dir, "meenoe-ai.log");
    let (non_blocking, _guard) = tracing_appender::non_blocking(file_appender);

    use tracing_subscriber::prelude::*;
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::fmt::layer()
                .with_ansi(true)
                .with_target(false),
        )
        .with(
            tracing_subscriber::fmt::layer()
                .with_ansi(false)
                .with_target(true)
                .with_writer(non_blocking),
        )
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    tracing::info!("Meenoe AI proxy starting... Log file: {:?}", log_dir.join("meenoe-ai.log"));

    let config = AppConfig::load()?;
    if config.ai.api_key.is_empty() {
        tracing::warn!("No default API key set (AI_API_KEY); sessions must configure their own key");
    }
    tracing::info!(
        "Default provider: {} ({}) model {}",
        config.ai.provider,
        config.ai.base_url,
        config.ai.model
    );

    let addr = config.bind_addr().await?;
    let state = ProxyState::new(SessionStore::new(config.ai)).await;
    let mut server = ProxyServer::new(state);
    let bound = server.start(addr).await?;
    tracing::info!("Listening on http://{}", bound);

    tokio::signal::ctrl_c().await?;
    tracing::info!("Ctrl-C received, stopping");
    server.stop().await?;

    Ok(())
}
