// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

use std::net::SocketAddr;
use std::sync::Arc;

use tokio_util::sync::CancellationToken;
use tracing::info;
use tracing_subscriber::EnvFilter;

use escrow_wallet_server::api;
use escrow_wallet_server::chain::HttpChainProvider;
use escrow_wallet_server::config::{Config, MASTER_KEY_ENV};
use escrow_wallet_server::state::AppState;
use escrow_wallet_server::storage::LedgerDb;
use escrow_wallet_server::tasks::{DepositPoller, EscrowSweeper};
use escrow_wallet_server::vault::KeyVault;
use escrow_wallet_server::withdraw::GatewayFeeOracle;

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("info,tower_http=debug"));
    let format = std::env::var("LOG_FORMAT").unwrap_or_else(|_| "pretty".to_string());
    if format == "json" {
        tracing_subscriber::fmt()
            .json()
            .with_env_filter(filter)
            .init();
    } else {
        tracing_subscriber::fmt().with_env_filter(filter).init();
    }
}

#[tokio::main]
async fn main() {
    init_tracing();

    let config = Config::from_env();

    let master_key =
        std::env::var(MASTER_KEY_ENV).unwrap_or_else(|_| panic!("{MASTER_KEY_ENV} must be set"));
    let vault = Arc::new(KeyVault::from_base64(&master_key).expect("Failed to load master key"));

    let db = Arc::new(
        LedgerDb::open(&config.data_dir.join("ledger.redb"))
            .expect("Failed to open ledger database"),
    );
    let provider = Arc::new(
        HttpChainProvider::new(config.provider_url.clone())
            .expect("Failed to build provider client"),
    );
    let oracle = Arc::new(GatewayFeeOracle::new(provider.clone()));

    let addr: SocketAddr = format!("{}:{}", config.host, config.port)
        .parse()
        .expect("Failed to parse bind address");
    let deposit_poll_interval = config.deposit_poll_interval;
    let escrow_sweep_interval = config.escrow_sweep_interval;

    let state = AppState::new(config, db, vault, provider, oracle);

    let shutdown = CancellationToken::new();
    let poller = DepositPoller::new(state.ledger.clone(), state.chain.clone(), deposit_poll_interval);
    let sweeper = EscrowSweeper::new(state.escrow.clone(), escrow_sweep_interval);
    let poller_handle = tokio::spawn(poller.run(shutdown.clone()));
    let sweeper_handle = tokio::spawn(sweeper.run(shutdown.clone()));

    let app = api::router(state);
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .expect("Failed to bind listener");
    info!(%addr, "Escrow wallet server listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .expect("HTTP server failed");

    shutdown.cancel();
    let _ = poller_handle.await;
    let _ = sweeper_handle.await;
    info!("Shutdown complete");
}

async fn shutdown_signal() {
    let ctrl_c = async {
        let _ = tokio::signal::ctrl_c().await;
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(_) => std::future::pending().await,
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
    info!("Shutdown signal received");
}
