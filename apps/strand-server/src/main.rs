#![forbid(unsafe_code)]

use std::net::SocketAddr;
use std::time::Duration;

use strand_server::{build_service, init_tracing, AppConfig};
use tokio::net::TcpListener;

fn env_usize(name: &str, fallback: usize) -> anyhow::Result<usize> {
    std::env::var(name).map_or_else(
        |_| Ok(fallback),
        |value| {
            value
                .parse::<usize>()
                .map_err(|e| anyhow::anyhow!("invalid {name} value {value:?}: {e}"))
        },
    )
}

fn env_secs(name: &str, fallback: Duration) -> anyhow::Result<Duration> {
    std::env::var(name).map_or_else(
        |_| Ok(fallback),
        |value| {
            value
                .parse::<u64>()
                .map(Duration::from_secs)
                .map_err(|e| anyhow::anyhow!("invalid {name} value {value:?}: {e}"))
        },
    )
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %e, "failed to install shutdown handler");
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    init_tracing();

    let defaults = AppConfig::default();
    let app_config = AppConfig {
        max_body_bytes: env_usize("STRAND_MAX_BODY_BYTES", defaults.max_body_bytes)?,
        request_timeout: env_secs("STRAND_REQUEST_TIMEOUT_SECS", defaults.request_timeout)?,
        publish_timeout: env_secs("STRAND_PUBLISH_TIMEOUT_SECS", defaults.publish_timeout)?,
        queue_brokers: std::env::var("STRAND_KAFKA_BROKERS").ok(),
        queue_topic: std::env::var("STRAND_KAFKA_TOPIC").unwrap_or(defaults.queue_topic),
        database_url: std::env::var("STRAND_DATABASE_URL").ok(),
    };
    let (app, publisher) = build_service(&app_config)?;

    let addr = std::env::var("STRAND_BIND_ADDR")
        .unwrap_or_else(|_| String::from("0.0.0.0:4000"))
        .parse::<SocketAddr>()
        .map_err(|e| anyhow::anyhow!("invalid STRAND_BIND_ADDR: {e}"))?;
    let listener = TcpListener::bind(addr).await?;
    tracing::info!(%addr, "strand-server listening");

    // Flush even when serve fails, so buffered events survive an
    // unclean exit.
    let served = axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await;
    publisher.flush(Duration::from_secs(5))?;
    served?;
    Ok(())
}
