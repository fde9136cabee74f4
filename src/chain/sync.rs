// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Deposit synchronization and withdrawal broadcast.
//!
//! Sync is crash-safe by construction: the ledger credit, the dedup record,
//! and the cursor advance land in one storage transaction, so a crash
//! between provider fetch and commit re-presents the same deposits on the
//! next pass and the dedup table swallows them.

use std::sync::Arc;

use dashmap::DashMap;
use rust_decimal::Decimal;
use tokio::sync::Mutex;
use tracing::{info, warn};

use crate::ledger::{Actor, BalanceLedger, EntryReason, LedgerEntry, Partition};
use crate::ledger::types::balance_key;
use crate::storage::{BalanceOp, LedgerCommit, SeenDeposit, StoreError, WithdrawalRecord};
use crate::vault::KeyVault;

use super::keys;
use super::provider::ChainProvider;
use super::ChainError;

const BROADCAST_ATTEMPTS: u32 = 3;
const BROADCAST_BACKOFF_MS: u64 = 100;

/// What one sync pass did, for logs and the sync endpoint response.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, serde::Serialize)]
pub struct SyncReport {
    /// New deposits credited to `pending` (or straight through).
    pub detected: usize,
    /// Previously pending deposits promoted to `available`.
    pub promoted: usize,
}

pub struct ChainSync {
    ledger: Arc<BalanceLedger>,
    vault: Arc<KeyVault>,
    provider: Arc<dyn ChainProvider>,
    confirmation_threshold: u32,
    /// Serializes sync passes per wallet so the poller and the manual sync
    /// endpoint cannot race on the seen-deposit check.
    sync_locks: DashMap<String, Arc<Mutex<()>>>,
}

impl ChainSync {
    pub fn new(
        ledger: Arc<BalanceLedger>,
        vault: Arc<KeyVault>,
        provider: Arc<dyn ChainProvider>,
        confirmation_threshold: u32,
    ) -> Self {
        Self {
            ledger,
            vault,
            provider,
            confirmation_threshold,
            sync_locks: DashMap::new(),
        }
    }

    fn sync_lock(&self, wallet_key: &str) -> Arc<Mutex<()>> {
        self.sync_locks
            .entry(wallet_key.to_string())
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone()
    }

    // =========================================================================
    // Wallet Generation
    // =========================================================================

    /// Generate a deposit address for (user, currency): fresh keypair,
    /// private key sealed by the vault, plaintext wiped on drop.
    pub async fn generate_wallet(
        &self,
        user_id: &str,
        currency: &str,
    ) -> Result<crate::ledger::WalletRecord, ChainError> {
        let keypair = keys::generate_keypair()?;
        let sealed = self.vault.seal(&keypair.private_key)?;

        let wallet = crate::ledger::WalletRecord::new(user_id, currency, keypair.address);
        self.ledger.db().create_wallet(&wallet, Some(&sealed))?;
        info!(user_id, currency = %wallet.currency, address = %wallet.address, "wallet generated");
        Ok(wallet)
    }

    // =========================================================================
    // Deposit Sync
    // =========================================================================

    /// One sync pass for a wallet: promote matured pending deposits, then
    /// ingest new ones from the provider.
    pub async fn sync_deposits(
        &self,
        user_id: &str,
        currency: &str,
    ) -> Result<SyncReport, ChainError> {
        let wallet = self
            .ledger
            .wallet(user_id, currency)?
            .ok_or_else(|| StoreError::UnknownWallet {
                user_id: user_id.to_string(),
                currency: currency.to_string(),
            })?;
        let wallet_key = balance_key(user_id, &wallet.currency);
        let _sync_guard = self.sync_lock(&wallet_key).lock_owned().await;

        let mut report = SyncReport::default();
        report.promoted = self.promote_pending(&wallet).await?;

        let mut cursor = self.ledger.db().get_cursor(&wallet_key)?;
        let deposits = self
            .provider
            .deposits_since(&wallet.currency, &wallet.address, cursor)
            .await?;

        for deposit in deposits {
            if self
                .ledger
                .db()
                .get_seen_deposit(user_id, &wallet.currency, &deposit.tx_hash)?
                .is_some()
            {
                continue;
            }
            if deposit.amount <= Decimal::ZERO {
                warn!(tx_hash = %deposit.tx_hash, amount = %deposit.amount, "ignoring non-positive deposit");
                continue;
            }

            let mut seen = SeenDeposit::new(
                user_id,
                &wallet.currency,
                &deposit.tx_hash,
                deposit.amount,
                deposit.block_height,
            );
            let mut commit = LedgerCommit::new()
                .op(BalanceOp::credit(user_id, &wallet.currency, Partition::Pending, deposit.amount))
                .entry(
                    LedgerEntry::new(user_id, &wallet.currency, EntryReason::DepositDetected, Actor::System)
                        .with_delta(Partition::Pending, deposit.amount),
                );

            // Already past the threshold at first sight: promote in the
            // same transaction, still leaving both audit entries.
            if deposit.confirmations >= self.confirmation_threshold {
                seen.confirmed = true;
                seen.confirmed_at = Some(chrono::Utc::now());
                commit = commit
                    .op(BalanceOp::shift(
                        user_id,
                        &wallet.currency,
                        Partition::Pending,
                        Partition::Available,
                        deposit.amount,
                    ))
                    .entry(
                        LedgerEntry::new(user_id, &wallet.currency, EntryReason::DepositConfirmed, Actor::System)
                            .with_delta(Partition::Pending, -deposit.amount)
                            .with_delta(Partition::Available, deposit.amount),
                    );
                report.promoted += 1;
            }

            // Running max: the provider may return heights out of order,
            // and the cursor must never move backwards.
            cursor = cursor.max(deposit.block_height);
            commit = commit.seen_deposit(seen).cursor(wallet_key.clone(), cursor);

            self.ledger.apply(commit).await?;
            report.detected += 1;
            info!(
                user_id,
                currency = %wallet.currency,
                tx_hash = %deposit.tx_hash,
                amount = %deposit.amount,
                confirmations = deposit.confirmations,
                "deposit credited"
            );
        }

        Ok(report)
    }

    /// Re-check confirmations for unconfirmed deposits and promote those
    /// that reached the threshold.
    async fn promote_pending(
        &self,
        wallet: &crate::ledger::WalletRecord,
    ) -> Result<usize, ChainError> {
        let pending = self
            .ledger
            .db()
            .unconfirmed_deposits(&wallet.user_id, &wallet.currency)?;

        let mut promoted = 0;
        for mut seen in pending {
            let confirmations = self
                .provider
                .deposit_confirmations(&wallet.currency, &seen.tx_hash)
                .await?
                .unwrap_or(0);
            if confirmations < self.confirmation_threshold {
                continue;
            }

            seen.confirmed = true;
            seen.confirmed_at = Some(chrono::Utc::now());
            self.ledger
                .apply(
                    LedgerCommit::new()
                        .op(BalanceOp::shift(
                            &wallet.user_id,
                            &wallet.currency,
                            Partition::Pending,
                            Partition::Available,
                            seen.amount,
                        ))
                        .entry(
                            LedgerEntry::new(
                                &wallet.user_id,
                                &wallet.currency,
                                EntryReason::DepositConfirmed,
                                Actor::System,
                            )
                            .with_delta(Partition::Pending, -seen.amount)
                            .with_delta(Partition::Available, seen.amount),
                        )
                        .seen_deposit(seen.clone()),
                )
                .await?;
            promoted += 1;
            info!(
                user_id = %wallet.user_id,
                currency = %wallet.currency,
                tx_hash = %seen.tx_hash,
                "deposit confirmed"
            );
        }
        Ok(promoted)
    }

    // =========================================================================
    // Withdrawal Broadcast
    // =========================================================================

    /// Sign and broadcast a withdrawal. The withdrawal id doubles as the
    /// gateway idempotency key, so after the final failed attempt we ask
    /// the gateway whether an earlier send actually landed before reporting
    /// failure.
    pub async fn broadcast_withdrawal(
        &self,
        record: &WithdrawalRecord,
        from_address: &str,
    ) -> Result<String, ChainError> {
        let sealed = self
            .ledger
            .db()
            .get_sealed_key(&record.currency, from_address)?
            .ok_or_else(|| {
                StoreError::NotFound(format!("signing key for {from_address}"))
            })?;

        let signed_tx = {
            // Plaintext key lives only inside this block; wiped on drop.
            let private_key = self.vault.open(&sealed)?;
            let payload = format!(
                "{}:{}:{}:{}",
                record.currency, record.amount, record.to_address, record.withdrawal_id
            );
            keys::sign_payload(&private_key, payload.as_bytes())?
        };

        let mut last_error = None;
        for attempt in 1..=BROADCAST_ATTEMPTS {
            match self
                .provider
                .broadcast(&record.currency, &record.withdrawal_id, &signed_tx)
                .await
            {
                Ok(tx_id) => return Ok(tx_id),
                Err(e) => {
                    warn!(
                        withdrawal_id = %record.withdrawal_id,
                        attempt,
                        error = %e,
                        "broadcast attempt failed"
                    );
                    last_error = Some(e);
                    if attempt < BROADCAST_ATTEMPTS {
                        tokio::time::sleep(std::time::Duration::from_millis(
                            BROADCAST_BACKOFF_MS * u64::from(attempt),
                        ))
                        .await;
                    }
                }
            }
        }

        // The send may have reached the network even though the ack did
        // not reach us.
        match self
            .provider
            .broadcast_status(&record.currency, &record.withdrawal_id)
            .await
        {
            Ok(Some(tx_id)) => {
                info!(withdrawal_id = %record.withdrawal_id, tx_id, "broadcast confirmed via status lookup");
                Ok(tx_id)
            }
            _ => Err(last_error
                .unwrap_or_else(|| ChainError::ProviderUnavailable("broadcast failed".to_string()))),
        }
    }
}
