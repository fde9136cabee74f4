// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Serialized access to wallet state.
//!
//! Every balance mutation flows through [`BalanceLedger::apply`], which
//! takes the per-wallet locks for all wallets named by the commit (in
//! sorted key order, so two multi-wallet commits can never deadlock) and
//! then hands the batch to the database for a single atomic transaction.

use std::sync::Arc;

use dashmap::DashMap;
use rust_decimal::Decimal;
use tokio::sync::{Mutex, OwnedMutexGuard};

use crate::storage::{BalanceOp, LedgerCommit, LedgerDb, StoreError, StoreResult};

use super::entry::{Actor, EntryReason, LedgerEntry};
use super::types::{Partition, WalletRecord};

pub struct BalanceLedger {
    db: Arc<LedgerDb>,
    locks: DashMap<String, Arc<Mutex<()>>>,
}

impl BalanceLedger {
    pub fn new(db: Arc<LedgerDb>) -> Self {
        Self {
            db,
            locks: DashMap::new(),
        }
    }

    pub fn db(&self) -> &Arc<LedgerDb> {
        &self.db
    }

    fn lock_for(&self, wallet_key: &str) -> Arc<Mutex<()>> {
        self.locks
            .entry(wallet_key.to_string())
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone()
    }

    /// Acquire the per-wallet locks for a set of keys in sorted order.
    async fn acquire(&self, wallet_keys: &[String]) -> Vec<OwnedMutexGuard<()>> {
        let mut guards = Vec::with_capacity(wallet_keys.len());
        for key in wallet_keys {
            guards.push(self.lock_for(key).lock_owned().await);
        }
        guards
    }

    /// Apply a commit under the locks of every wallet it touches.
    pub async fn apply(&self, commit: LedgerCommit) -> StoreResult<()> {
        let keys = commit.wallet_keys();
        let _guards = self.acquire(&keys).await;
        self.db.commit(&commit)
    }

    /// Credit one partition with a single audit entry.
    pub async fn credit(
        &self,
        user_id: &str,
        currency: &str,
        partition: Partition,
        amount: Decimal,
        reason: EntryReason,
        actor: Actor,
    ) -> StoreResult<LedgerEntry> {
        if amount <= Decimal::ZERO {
            return Err(StoreError::InvalidAmount(amount));
        }
        let entry = LedgerEntry::new(user_id, currency, reason, actor)
            .with_delta(partition, amount);
        self.apply(
            LedgerCommit::new()
                .op(BalanceOp::credit(user_id, currency, partition, amount))
                .entry(entry.clone()),
        )
        .await?;
        Ok(entry)
    }

    /// Debit one partition with a single audit entry.
    pub async fn debit(
        &self,
        user_id: &str,
        currency: &str,
        partition: Partition,
        amount: Decimal,
        reason: EntryReason,
        actor: Actor,
    ) -> StoreResult<LedgerEntry> {
        if amount <= Decimal::ZERO {
            return Err(StoreError::InvalidAmount(amount));
        }
        let entry = LedgerEntry::new(user_id, currency, reason, actor)
            .with_delta(partition, -amount);
        self.apply(
            LedgerCommit::new()
                .op(BalanceOp::debit(user_id, currency, partition, amount))
                .entry(entry.clone()),
        )
        .await?;
        Ok(entry)
    }

    /// Move funds between two partitions of the same wallet.
    pub async fn shift(
        &self,
        user_id: &str,
        currency: &str,
        from: Partition,
        to: Partition,
        amount: Decimal,
        reason: EntryReason,
        actor: Actor,
    ) -> StoreResult<LedgerEntry> {
        if amount <= Decimal::ZERO {
            return Err(StoreError::InvalidAmount(amount));
        }
        let entry = LedgerEntry::new(user_id, currency, reason, actor)
            .with_delta(from, -amount)
            .with_delta(to, amount);
        self.apply(
            LedgerCommit::new()
                .op(BalanceOp::shift(user_id, currency, from, to, amount))
                .entry(entry.clone()),
        )
        .await?;
        Ok(entry)
    }

    /// Move funds from one user's partition to another user's, as a single
    /// commit with one entry on each side.
    #[allow(clippy::too_many_arguments)]
    pub async fn transfer(
        &self,
        from_user: &str,
        to_user: &str,
        currency: &str,
        from_partition: Partition,
        to_partition: Partition,
        amount: Decimal,
        reason: EntryReason,
        actor: Actor,
    ) -> StoreResult<()> {
        if amount <= Decimal::ZERO {
            return Err(StoreError::InvalidAmount(amount));
        }
        self.apply(
            LedgerCommit::new()
                .op(BalanceOp::debit(from_user, currency, from_partition, amount))
                .op(BalanceOp::credit(to_user, currency, to_partition, amount))
                .entry(
                    LedgerEntry::new(from_user, currency, reason, actor.clone())
                        .with_delta(from_partition, -amount),
                )
                .entry(
                    LedgerEntry::new(to_user, currency, reason, actor)
                        .with_delta(to_partition, amount),
                ),
        )
        .await
    }

    /// Create a wallet row if none exists; returns the current row.
    pub async fn ensure_wallet(
        &self,
        user_id: &str,
        currency: &str,
        address: &str,
    ) -> StoreResult<WalletRecord> {
        let key = crate::ledger::types::balance_key(user_id, currency);
        let _guard = self.lock_for(&key).lock_owned().await;
        if let Some(existing) = self.db.get_wallet(user_id, currency)? {
            return Ok(existing);
        }
        let wallet = WalletRecord::new(user_id, currency, address);
        self.db.create_wallet(&wallet, None)?;
        Ok(wallet)
    }

    pub fn wallet(&self, user_id: &str, currency: &str) -> StoreResult<Option<WalletRecord>> {
        self.db.get_wallet(user_id, currency)
    }

    pub fn wallets(&self, user_id: &str) -> StoreResult<Vec<WalletRecord>> {
        self.db.list_wallets(user_id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn ledger() -> (Arc<BalanceLedger>, tempfile::TempDir) {
        let dir = tempfile::tempdir().unwrap();
        let db = Arc::new(LedgerDb::open(&dir.path().join("ledger.redb")).unwrap());
        (Arc::new(BalanceLedger::new(db)), dir)
    }

    #[tokio::test]
    async fn credit_debit_round_trip() {
        let (ledger, _dir) = ledger();
        ledger.ensure_wallet("u1", "BTC", "addr").await.unwrap();

        ledger
            .credit("u1", "BTC", Partition::Available, dec!(2.0), EntryReason::AdminAdjust, Actor::System)
            .await
            .unwrap();
        ledger
            .debit("u1", "BTC", Partition::Available, dec!(0.5), EntryReason::Withdrawal, Actor::User("u1".into()))
            .await
            .unwrap();

        let wallet = ledger.wallet("u1", "BTC").unwrap().unwrap();
        assert_eq!(wallet.available, dec!(1.5));
        assert_eq!(ledger.db().entries_for_wallet("u1", "BTC", 10).unwrap().len(), 2);
    }

    #[tokio::test]
    async fn shift_conserves_total() {
        let (ledger, _dir) = ledger();
        ledger.ensure_wallet("u1", "ETH", "addr").await.unwrap();
        ledger
            .credit("u1", "ETH", Partition::Available, dec!(1.0), EntryReason::AdminAdjust, Actor::System)
            .await
            .unwrap();

        ledger
            .shift(
                "u1",
                "ETH",
                Partition::Available,
                Partition::Locked,
                dec!(0.4),
                EntryReason::EscrowLock,
                Actor::User("u1".into()),
            )
            .await
            .unwrap();

        let wallet = ledger.wallet("u1", "ETH").unwrap().unwrap();
        assert_eq!(wallet.available, dec!(0.6));
        assert_eq!(wallet.locked, dec!(0.4));
        assert_eq!(wallet.total(), dec!(1.0));
    }

    #[tokio::test]
    async fn transfer_moves_funds_between_users() {
        let (ledger, _dir) = ledger();
        ledger.ensure_wallet("a", "BTC", "addr-a").await.unwrap();
        ledger.ensure_wallet("b", "BTC", "addr-b").await.unwrap();
        ledger
            .credit("a", "BTC", Partition::Available, dec!(1.0), EntryReason::AdminAdjust, Actor::System)
            .await
            .unwrap();

        ledger
            .transfer(
                "a",
                "b",
                "BTC",
                Partition::Available,
                Partition::Available,
                dec!(0.3),
                EntryReason::EscrowRelease,
                Actor::System,
            )
            .await
            .unwrap();

        assert_eq!(ledger.wallet("a", "BTC").unwrap().unwrap().available, dec!(0.7));
        assert_eq!(ledger.wallet("b", "BTC").unwrap().unwrap().available, dec!(0.3));
        // One entry on each side of the transfer.
        assert_eq!(ledger.db().entries_for_wallet("b", "BTC", 10).unwrap().len(), 1);
    }

    #[tokio::test]
    async fn zero_and_negative_amounts_rejected() {
        let (ledger, _dir) = ledger();
        ledger.ensure_wallet("u1", "BTC", "addr").await.unwrap();

        for amount in [Decimal::ZERO, dec!(-1)] {
            let result = ledger
                .credit("u1", "BTC", Partition::Available, amount, EntryReason::AdminAdjust, Actor::System)
                .await;
            assert!(matches!(result, Err(StoreError::InvalidAmount(_))));
        }
    }

    #[tokio::test]
    async fn ensure_wallet_is_idempotent() {
        let (ledger, _dir) = ledger();
        let first = ledger.ensure_wallet("u1", "BTC", "addr-1").await.unwrap();
        let second = ledger.ensure_wallet("u1", "BTC", "addr-other").await.unwrap();
        assert_eq!(first.address, second.address);
    }

    #[tokio::test]
    async fn concurrent_debits_never_overdraw() {
        let (ledger, _dir) = ledger();
        ledger.ensure_wallet("u1", "BTC", "addr").await.unwrap();
        ledger
            .credit("u1", "BTC", Partition::Available, dec!(1.0), EntryReason::AdminAdjust, Actor::System)
            .await
            .unwrap();

        // 10 tasks each try to take 0.2; only 5 can succeed.
        let mut handles = Vec::new();
        for _ in 0..10 {
            let ledger = ledger.clone();
            handles.push(tokio::spawn(async move {
                ledger
                    .debit("u1", "BTC", Partition::Available, dec!(0.2), EntryReason::Withdrawal, Actor::System)
                    .await
                    .is_ok()
            }));
        }

        let mut successes = 0;
        for handle in handles {
            if handle.await.unwrap() {
                successes += 1;
            }
        }
        assert_eq!(successes, 5);
        let wallet = ledger.wallet("u1", "BTC").unwrap().unwrap();
        assert_eq!(wallet.available, Decimal::ZERO);
    }

    #[tokio::test]
    async fn opposing_transfers_do_not_deadlock() {
        let (ledger, _dir) = ledger();
        for user in ["a", "b"] {
            ledger.ensure_wallet(user, "BTC", "addr").await.unwrap();
            ledger
                .credit(user, "BTC", Partition::Available, dec!(10), EntryReason::AdminAdjust, Actor::System)
                .await
                .unwrap();
        }

        let transfer = |from: &str, to: &str| {
            LedgerCommit::new()
                .op(BalanceOp::debit(from, "BTC", Partition::Available, dec!(1)))
                .op(BalanceOp::credit(to, "BTC", Partition::Available, dec!(1)))
                .entry(
                    LedgerEntry::new(from, "BTC", EntryReason::EscrowRelease, Actor::System)
                        .with_delta(Partition::Available, dec!(-1)),
                )
                .entry(
                    LedgerEntry::new(to, "BTC", EntryReason::EscrowRelease, Actor::System)
                        .with_delta(Partition::Available, dec!(1)),
                )
        };

        let mut handles = Vec::new();
        for i in 0..20 {
            let ledger = ledger.clone();
            let commit = if i % 2 == 0 {
                transfer("a", "b")
            } else {
                transfer("b", "a")
            };
            handles.push(tokio::spawn(async move { ledger.apply(commit).await }));
        }
        for handle in handles {
            handle.await.unwrap().unwrap();
        }

        let (available, _, _) = ledger.db().currency_totals("BTC").unwrap();
        assert_eq!(available, dec!(20));
    }
}
