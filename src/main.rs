//! Flower-auction settlement worker.
//!
//! Wires the collaborators together and runs the periodic settlement sweep
//! until `SIGTERM`/`Ctrl-C`. The bidding engine shares these collaborators
//! and is driven by whatever transport layer (HTTP, gRPC, sockets) fronts
//! the service in production; the worker itself stays protocol-agnostic.

use std::sync::Arc;

use tokio::signal;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use auction_service::{
    config, BroadcastChannel, InMemoryBidLedger, InMemoryCatalogStore, InMemoryWalletService,
    LotLocks, Settler,
};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::fmt::layer()
                .with_target(false)
                .with_timer(tracing_subscriber::fmt::time::ChronoUtc::rfc_3339()),
        )
        .with(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let cfg = config::init(std::env::args().nth(1))?;
    info!(?cfg, "configuration loaded");

    let catalog = Arc::new(InMemoryCatalogStore::new());
    let ledger = Arc::new(InMemoryBidLedger::new());
    let wallet = Arc::new(InMemoryWalletService::new());
    let channel = Arc::new(BroadcastChannel::new(cfg.events.capacity));
    let policy = Arc::new(cfg.bid_policy());
    let locks = Arc::new(LotLocks::new());

    let settler = Settler::new(
        catalog,
        ledger,
        wallet,
        channel.clone(),
        policy,
        locks,
        cfg.settler_config(),
    );
    let sweep = settler.spawn_sweep_loop(cfg.sweep_interval());
    info!(interval = %cfg.sweep.interval, "settlement sweep running");

    // Log the event stream so operators can follow the auction floor.
    let mut events = channel.subscribe();
    let event_log = tokio::spawn(async move {
        while let Ok(event) = events.recv().await {
            info!(?event, "auction event");
        }
    });

    shutdown_signal().await;
    sweep.abort();
    event_log.abort();
    Ok(())
}

/// Blocks until the process receives `SIGTERM` / `Ctrl-C`.
async fn shutdown_signal() {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("failed to install Ctrl-C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        use tokio::signal::unix::{signal, SignalKind};
        signal(SignalKind::terminate())
            .expect("failed to install signal handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    info!("signal received, shutting down");
}
