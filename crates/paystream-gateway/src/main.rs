use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use clap::Parser;
use paystream_broadcast::{HubConfig, HubHandle};
use paystream_core::config::{ensure_parent_dir, BroadcastConfig, PaystreamConfig};
use paystream_payments::{PaymentEvent, Store};
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

mod app;
mod http;

/// Payment service with a live SSE feed of created and updated payments.
#[derive(Debug, Parser)]
#[command(name = "paystream-gateway", version)]
struct Cli {
    /// Path to paystream.toml (overrides PAYSTREAM_CONFIG).
    #[arg(long)]
    config: Option<String>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
                "paystream_gateway=info,paystream_broadcast=info,tower_http=debug".into()
            }),
        )
        .init();

    // load config: --config > PAYSTREAM_CONFIG env > ~/.paystream/paystream.toml
    let cli = Cli::parse();
    let config_path = cli.config.or_else(|| std::env::var("PAYSTREAM_CONFIG").ok());
    let config = PaystreamConfig::load(config_path.as_deref()).unwrap_or_else(|e| {
        warn!(code = e.code(), "Config load failed ({}), using defaults", e);
        PaystreamConfig::default()
    });

    let db_path = &config.database.path;
    ensure_parent_dir(db_path)?;
    info!(path = %db_path, "opening SQLite database");

    let db = rusqlite::Connection::open(db_path)?;
    db.execute_batch("PRAGMA journal_mode=WAL;")?;
    let store = Store::new(db)?;
    info!("database migrations complete");

    let hub = HubHandle::<PaymentEvent>::spawn(HubConfig {
        input_capacity: config.broadcast.input_capacity,
        send_timeout: config.broadcast.send_timeout(),
    });
    let shutdown = CancellationToken::new();
    let drain_limit = shutdown_drain_limit(&config.broadcast);

    let addr: SocketAddr = format!("{}:{}", config.gateway.bind, config.gateway.port).parse()?;
    let state = Arc::new(app::AppState::new(config, store, hub.clone(), shutdown.clone()));
    let router = app::build_router(state);

    info!("Paystream gateway listening on {}", addr);
    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, router)
        .with_graceful_shutdown(shutdown_signal(hub.clone(), shutdown, drain_limit))
        .await?;

    info!("Paystream gateway stopped");
    Ok(())
}

/// Resolve on Ctrl-C: close the hub and let it drain into the open streams,
/// then end every stream so axum can finish its in-flight requests.
async fn shutdown_signal(
    hub: HubHandle<PaymentEvent>,
    shutdown: CancellationToken,
    drain_limit: Duration,
) {
    if let Err(e) = tokio::signal::ctrl_c().await {
        warn!(error = %e, "failed to listen for Ctrl-C");
        // Without a signal handler there is no way to stop gracefully; serve forever.
        std::future::pending::<()>().await;
    }
    info!("shutdown requested");
    if let Err(e) = hub.close() {
        warn!(error = %e, "hub close failed");
    }
    // Sessions flush what is already queued before reporting cancellation.
    if tokio::time::timeout(drain_limit, hub.closed()).await.is_err() {
        warn!(
            limit_ms = drain_limit.as_millis() as u64,
            "hub did not drain in time, closing streams anyway"
        );
    }
    shutdown.cancel();
}

/// Upper bound on waiting for the hub to drain at shutdown. A full input
/// queue can take one send timeout per message; without a timeout, fall back
/// to two keep-alive intervals.
fn shutdown_drain_limit(broadcast: &BroadcastConfig) -> Duration {
    match broadcast.send_timeout() {
        Some(per_send) => per_send * (broadcast.input_capacity.max(1) as u32 + 1),
        None => broadcast.keepalive() * 2,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn drain_limit_covers_a_full_queue() {
        let broadcast = BroadcastConfig {
            input_capacity: 4,
            send_timeout_ms: 100,
            ..BroadcastConfig::default()
        };
        assert_eq!(shutdown_drain_limit(&broadcast), Duration::from_millis(500));

        let unbounded = BroadcastConfig {
            send_timeout_ms: 0,
            keepalive_secs: 3,
            ..BroadcastConfig::default()
        };
        assert_eq!(shutdown_drain_limit(&unbounded), Duration::from_secs(6));
    }
}
