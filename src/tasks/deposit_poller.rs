// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! # Deposit Poller
//!
//! Background task that periodically runs a deposit sync pass over every
//! wallet, so deposits are detected and promoted even when no user is
//! actively hitting the sync endpoint.
//!
//! ## Shutdown
//!
//! Uses `tokio_util::sync::CancellationToken` for graceful shutdown, same
//! pattern as the escrow sweeper.

use std::sync::Arc;
use std::time::Duration;

use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::chain::ChainSync;
use crate::ledger::BalanceLedger;

/// Background poller driving deposit sync across all wallets.
pub struct DepositPoller {
    ledger: Arc<BalanceLedger>,
    chain: Arc<ChainSync>,
    poll_interval: Duration,
}

impl DepositPoller {
    pub fn new(ledger: Arc<BalanceLedger>, chain: Arc<ChainSync>, poll_interval: Duration) -> Self {
        Self {
            ledger,
            chain,
            poll_interval,
        }
    }

    /// Run the poller loop until the cancellation token is triggered.
    ///
    /// Should be spawned as a background task:
    /// ```rust,ignore
    /// tokio::spawn(poller.run(shutdown.clone()));
    /// ```
    pub async fn run(self, shutdown: CancellationToken) {
        info!(
            interval_secs = self.poll_interval.as_secs(),
            "Deposit poller starting"
        );

        loop {
            if shutdown.is_cancelled() {
                info!("Deposit poller shutting down");
                return;
            }

            self.poll_step().await;

            tokio::select! {
                _ = tokio::time::sleep(self.poll_interval) => {},
                _ = shutdown.cancelled() => {
                    info!("Deposit poller shutting down");
                    return;
                }
            }
        }
    }

    /// One pass over every wallet. A failure on one wallet never blocks
    /// the others; the provider may be flaky per chain.
    async fn poll_step(&self) {
        let wallets = match self.ledger.db().list_all_wallets() {
            Ok(wallets) => wallets,
            Err(e) => {
                warn!(error = %e, "Deposit poller could not list wallets");
                return;
            }
        };

        let mut detected = 0;
        let mut promoted = 0;
        for wallet in wallets {
            match self.chain.sync_deposits(&wallet.user_id, &wallet.currency).await {
                Ok(report) => {
                    detected += report.detected;
                    promoted += report.promoted;
                }
                Err(e) => {
                    warn!(
                        user_id = %wallet.user_id,
                        currency = %wallet.currency,
                        error = %e,
                        "Deposit sync failed for wallet"
                    );
                }
            }
        }

        if detected > 0 || promoted > 0 {
            info!(detected, promoted, "Deposit poller sweep complete");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chain::provider::mock::MockProvider;
    use crate::chain::ProviderDeposit;
    use crate::storage::LedgerDb;
    use crate::vault::KeyVault;
    use rust_decimal_macros::dec;

    #[tokio::test]
    async fn poller_syncs_and_stops_on_cancel() {
        let dir = tempfile::tempdir().unwrap();
        let db = Arc::new(LedgerDb::open(&dir.path().join("ledger.redb")).unwrap());
        let ledger = Arc::new(BalanceLedger::new(db));
        let vault = Arc::new(
            KeyVault::from_base64(&KeyVault::generate_master_key().unwrap()).unwrap(),
        );
        let provider = Arc::new(MockProvider::new());
        let chain = Arc::new(ChainSync::new(ledger.clone(), vault, provider.clone(), 1));

        let wallet = chain.generate_wallet("u1", "BTC").await.unwrap();
        provider.push_deposit(
            &wallet.address,
            ProviderDeposit {
                tx_hash: "0xaaa".to_string(),
                amount: dec!(0.5),
                confirmations: 2,
                block_height: 10,
            },
        );

        let poller = DepositPoller::new(ledger.clone(), chain, Duration::from_millis(10));
        let shutdown = CancellationToken::new();
        let handle = tokio::spawn(poller.run(shutdown.clone()));

        tokio::time::sleep(Duration::from_millis(50)).await;
        shutdown.cancel();
        handle.await.unwrap();

        let wallet = ledger.wallet("u1", "BTC").unwrap().unwrap();
        assert_eq!(wallet.available, dec!(0.5));
    }
}
