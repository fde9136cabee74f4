// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Embedded ledger database backed by redb (pure Rust, ACID).
//!
//! ## Table Layout
//!
//! - `wallets`: `user|CURRENCY` → serialized WalletRecord
//! - `ledger_entries`: composite key (`user|CURRENCY|!timestamp|entry_id`) → LedgerEntry
//! - `ticket_entries`: `ticket_id|entry_id` → LedgerEntry (evidence lookup)
//! - `tickets`: ticket_id → EscrowTicket
//! - `sync_cursors`: `user|CURRENCY` → u64 big-endian block height
//! - `seen_deposits`: `user|CURRENCY|tx_hash` → SeenDeposit (dedup)
//! - `encrypted_keys`: `CURRENCY|address` → EncryptedKey
//! - `withdrawals`: withdrawal_id → WithdrawalRecord
//! - `user_withdrawals`: composite key (`user|!timestamp|id`) → withdrawal_id
//!
//! ## Atomicity
//!
//! [`LedgerDb::commit`] applies balance mutations, their audit entries, and
//! any related ticket/cursor/dedup state in a single write transaction.
//! Validation failures abort the transaction, leaving every table in its
//! pre-call state.

use std::path::Path;

use redb::{Database, ReadableDatabase, ReadableTable, TableDefinition};
use rust_decimal::Decimal;
use tracing::warn;

use crate::escrow::ticket::{EscrowTicket, TicketStatus};
use crate::ledger::entry::LedgerEntry;
use crate::ledger::types::{balance_key, normalize_currency, Partition, WalletRecord};
use crate::vault::EncryptedKey;

use super::records::{SeenDeposit, WithdrawalRecord};

// =============================================================================
// Table Definitions
// =============================================================================

const WALLETS: TableDefinition<&str, &[u8]> = TableDefinition::new("wallets");
const LEDGER_ENTRIES: TableDefinition<&[u8], &[u8]> = TableDefinition::new("ledger_entries");
const TICKET_ENTRIES: TableDefinition<&str, &[u8]> = TableDefinition::new("ticket_entries");
const TICKETS: TableDefinition<&str, &[u8]> = TableDefinition::new("tickets");
const SYNC_CURSORS: TableDefinition<&str, &[u8]> = TableDefinition::new("sync_cursors");
const SEEN_DEPOSITS: TableDefinition<&str, &[u8]> = TableDefinition::new("seen_deposits");
const ENCRYPTED_KEYS: TableDefinition<&str, &[u8]> = TableDefinition::new("encrypted_keys");
const WITHDRAWALS: TableDefinition<&str, &[u8]> = TableDefinition::new("withdrawals");
const USER_WITHDRAWALS: TableDefinition<&[u8], &str> = TableDefinition::new("user_withdrawals");

// =============================================================================
// Error Type
// =============================================================================

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("redb error: {0}")]
    Redb(#[from] redb::Error),

    #[error("redb database error: {0}")]
    RedbDatabase(#[from] redb::DatabaseError),

    #[error("redb transaction error: {0}")]
    RedbTransaction(#[from] redb::TransactionError),

    #[error("redb table error: {0}")]
    RedbTable(#[from] redb::TableError),

    #[error("redb storage error: {0}")]
    RedbStorage(#[from] redb::StorageError),

    #[error("redb commit error: {0}")]
    RedbCommit(#[from] redb::CommitError),

    #[error("serialization error: {0}")]
    Serde(#[from] serde_json::Error),

    #[error("no wallet for user {user_id} in {currency}")]
    UnknownWallet { user_id: String, currency: String },

    #[error("wallet already exists for user {user_id} in {currency}")]
    WalletExists { user_id: String, currency: String },

    #[error(
        "insufficient {partition} balance for user {user_id} in {currency}: \
         requested {requested}, held {held}"
    )]
    InsufficientBalance {
        user_id: String,
        currency: String,
        partition: Partition,
        requested: Decimal,
        held: Decimal,
    },

    #[error("amount must be positive, got {0}")]
    InvalidAmount(Decimal),

    #[error("not found: {0}")]
    NotFound(String),
}

pub type StoreResult<T> = Result<T, StoreError>;

// =============================================================================
// Balance Operations
// =============================================================================

/// One signed mutation of a wallet row, applied atomically with its peers.
#[derive(Debug, Clone, PartialEq)]
pub struct BalanceOp {
    pub user_id: String,
    pub currency: String,
    pub available_delta: Decimal,
    pub locked_delta: Decimal,
    pub pending_delta: Decimal,
}

impl BalanceOp {
    fn zero(user_id: &str, currency: &str) -> Self {
        Self {
            user_id: user_id.to_string(),
            currency: normalize_currency(currency),
            available_delta: Decimal::ZERO,
            locked_delta: Decimal::ZERO,
            pending_delta: Decimal::ZERO,
        }
    }

    /// Add `amount` to one partition.
    pub fn credit(user_id: &str, currency: &str, partition: Partition, amount: Decimal) -> Self {
        Self::zero(user_id, currency).with_delta(partition, amount)
    }

    /// Remove `amount` from one partition.
    pub fn debit(user_id: &str, currency: &str, partition: Partition, amount: Decimal) -> Self {
        Self::zero(user_id, currency).with_delta(partition, -amount)
    }

    /// Move `amount` between two partitions of the same wallet.
    pub fn shift(
        user_id: &str,
        currency: &str,
        from: Partition,
        to: Partition,
        amount: Decimal,
    ) -> Self {
        Self::zero(user_id, currency)
            .with_delta(from, -amount)
            .with_delta(to, amount)
    }

    pub fn with_delta(mut self, partition: Partition, delta: Decimal) -> Self {
        match partition {
            Partition::Available => self.available_delta += delta,
            Partition::Locked => self.locked_delta += delta,
            Partition::Pending => self.pending_delta += delta,
        }
        self
    }

    pub fn wallet_key(&self) -> String {
        balance_key(&self.user_id, &self.currency)
    }
}

/// A unit of durable work: balance mutations plus everything that must
/// land in the same transaction as them.
#[derive(Debug, Default, Clone)]
pub struct LedgerCommit {
    pub ops: Vec<BalanceOp>,
    pub entries: Vec<LedgerEntry>,
    pub ticket: Option<EscrowTicket>,
    pub seen_deposits: Vec<SeenDeposit>,
    /// `(user|CURRENCY, block_height)`; only advanced alongside the commit.
    pub cursor: Option<(String, u64)>,
    pub withdrawal: Option<WithdrawalRecord>,
}

impl LedgerCommit {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn op(mut self, op: BalanceOp) -> Self {
        self.ops.push(op);
        self
    }

    pub fn entry(mut self, entry: LedgerEntry) -> Self {
        self.entries.push(entry);
        self
    }

    pub fn ticket(mut self, ticket: EscrowTicket) -> Self {
        self.ticket = Some(ticket);
        self
    }

    pub fn seen_deposit(mut self, seen: SeenDeposit) -> Self {
        self.seen_deposits.push(seen);
        self
    }

    pub fn cursor(mut self, wallet_key: impl Into<String>, block_height: u64) -> Self {
        self.cursor = Some((wallet_key.into(), block_height));
        self
    }

    pub fn withdrawal(mut self, record: WithdrawalRecord) -> Self {
        self.withdrawal = Some(record);
        self
    }

    /// Wallet keys touched by this commit, for per-key locking.
    pub fn wallet_keys(&self) -> Vec<String> {
        let mut keys: Vec<String> = self.ops.iter().map(|op| op.wallet_key()).collect();
        keys.sort();
        keys.dedup();
        keys
    }
}

// =============================================================================
// Index Key Helpers
// =============================================================================

/// Composite entry key: `wallet_key | inverted_timestamp_be | entry_id`.
/// The inverted timestamp gives newest-first ordering on forward scans.
fn entry_index_key(wallet_key: &str, timestamp_millis: i64, entry_id: &str) -> Vec<u8> {
    let mut key = Vec::with_capacity(wallet_key.len() + 1 + 8 + 1 + entry_id.len());
    key.extend_from_slice(wallet_key.as_bytes());
    key.push(b'|');
    key.extend_from_slice(&(!timestamp_millis as u64).to_be_bytes());
    key.push(b'|');
    key.extend_from_slice(entry_id.as_bytes());
    key
}

fn prefix_start(prefix: &str) -> Vec<u8> {
    let mut start = prefix.as_bytes().to_vec();
    start.push(b'|');
    start
}

fn prefix_end(prefix: &str) -> Vec<u8> {
    let mut end = prefix_start(prefix);
    end.extend_from_slice(&[0xFF; 20]);
    end
}

// =============================================================================
// LedgerDb
// =============================================================================

/// Embedded ACID ledger database.
pub struct LedgerDb {
    db: Database,
}

impl LedgerDb {
    /// Open (or create) the database at the given path.
    pub fn open(path: &Path) -> StoreResult<Self> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).ok();
        }
        let db = Database::create(path)?;

        // Pre-create all tables so later read transactions don't fail
        let write_txn = db.begin_write()?;
        {
            let _ = write_txn.open_table(WALLETS)?;
            let _ = write_txn.open_table(LEDGER_ENTRIES)?;
            let _ = write_txn.open_table(TICKET_ENTRIES)?;
            let _ = write_txn.open_table(TICKETS)?;
            let _ = write_txn.open_table(SYNC_CURSORS)?;
            let _ = write_txn.open_table(SEEN_DEPOSITS)?;
            let _ = write_txn.open_table(ENCRYPTED_KEYS)?;
            let _ = write_txn.open_table(WITHDRAWALS)?;
            let _ = write_txn.open_table(USER_WITHDRAWALS)?;
        }
        write_txn.commit()?;

        Ok(Self { db })
    }

    // =========================================================================
    // Atomic Commit
    // =========================================================================

    /// Apply a [`LedgerCommit`] as one write transaction.
    ///
    /// Every balance op is validated against the current row; any partition
    /// that would go negative fails the whole commit with
    /// `InsufficientBalance` and no table is touched.
    pub fn commit(&self, commit: &LedgerCommit) -> StoreResult<()> {
        let write_txn = self.db.begin_write()?;
        {
            let mut wallets = write_txn.open_table(WALLETS)?;
            for op in &commit.ops {
                let key = op.wallet_key();
                let raw = {
                    let existing = wallets.get(key.as_str())?.ok_or_else(|| {
                        StoreError::UnknownWallet {
                            user_id: op.user_id.clone(),
                            currency: op.currency.clone(),
                        }
                    })?;
                    existing.value().to_vec()
                };
                let mut wallet: WalletRecord = serde_json::from_slice(&raw)?;

                wallet.available += op.available_delta;
                wallet.locked += op.locked_delta;
                wallet.pending += op.pending_delta;
                wallet.updated_at = chrono::Utc::now();

                for partition in [Partition::Available, Partition::Locked, Partition::Pending] {
                    let held = wallet.partition(partition);
                    if held < Decimal::ZERO {
                        let delta = match partition {
                            Partition::Available => op.available_delta,
                            Partition::Locked => op.locked_delta,
                            Partition::Pending => op.pending_delta,
                        };
                        return Err(StoreError::InsufficientBalance {
                            user_id: op.user_id.clone(),
                            currency: op.currency.clone(),
                            partition,
                            requested: -delta,
                            held: held - delta,
                        });
                    }
                }

                let json = serde_json::to_vec(&wallet)?;
                wallets.insert(key.as_str(), json.as_slice())?;
            }

            let mut entries = write_txn.open_table(LEDGER_ENTRIES)?;
            let mut ticket_entries = write_txn.open_table(TICKET_ENTRIES)?;
            for entry in &commit.entries {
                let wallet_key = balance_key(&entry.user_id, &entry.currency);
                let key = entry_index_key(
                    &wallet_key,
                    entry.timestamp.timestamp_millis(),
                    &entry.entry_id,
                );
                let json = serde_json::to_vec(entry)?;
                entries.insert(key.as_slice(), json.as_slice())?;

                if let Some(ticket_id) = &entry.ticket_id {
                    let tkey = format!("{ticket_id}|{}", entry.entry_id);
                    ticket_entries.insert(tkey.as_str(), json.as_slice())?;
                }
            }

            if let Some(ticket) = &commit.ticket {
                let mut tickets = write_txn.open_table(TICKETS)?;
                let json = serde_json::to_vec(ticket)?;
                tickets.insert(ticket.ticket_id.as_str(), json.as_slice())?;
            }

            if !commit.seen_deposits.is_empty() {
                let mut seen = write_txn.open_table(SEEN_DEPOSITS)?;
                for deposit in &commit.seen_deposits {
                    let json = serde_json::to_vec(deposit)?;
                    seen.insert(deposit.key().as_str(), json.as_slice())?;
                }
            }

            if let Some((wallet_key, height)) = &commit.cursor {
                let mut cursors = write_txn.open_table(SYNC_CURSORS)?;
                cursors.insert(wallet_key.as_str(), height.to_be_bytes().as_slice())?;
            }

            if let Some(record) = &commit.withdrawal {
                let mut withdrawals = write_txn.open_table(WITHDRAWALS)?;
                let json = serde_json::to_vec(record)?;
                withdrawals.insert(record.withdrawal_id.as_str(), json.as_slice())?;

                let mut index = write_txn.open_table(USER_WITHDRAWALS)?;
                let key = entry_index_key(
                    &record.user_id,
                    record.created_at.timestamp_millis(),
                    &record.withdrawal_id,
                );
                index.insert(key.as_slice(), record.withdrawal_id.as_str())?;
            }
        }
        write_txn.commit()?;
        Ok(())
    }

    // =========================================================================
    // Wallets
    // =========================================================================

    /// Create a wallet row (zero balances) and, for externally funded
    /// wallets, its sealed signing key.
    pub fn create_wallet(
        &self,
        wallet: &WalletRecord,
        sealed_key: Option<&EncryptedKey>,
    ) -> StoreResult<()> {
        let key = wallet.key();
        let write_txn = self.db.begin_write()?;
        {
            let mut wallets = write_txn.open_table(WALLETS)?;
            if wallets.get(key.as_str())?.is_some() {
                return Err(StoreError::WalletExists {
                    user_id: wallet.user_id.clone(),
                    currency: wallet.currency.clone(),
                });
            }
            let json = serde_json::to_vec(wallet)?;
            wallets.insert(key.as_str(), json.as_slice())?;

            if let Some(sealed) = sealed_key {
                let mut keys = write_txn.open_table(ENCRYPTED_KEYS)?;
                let kkey = format!("{}|{}", wallet.currency, wallet.address);
                let json = serde_json::to_vec(sealed)?;
                keys.insert(kkey.as_str(), json.as_slice())?;
            }
        }
        write_txn.commit()?;
        Ok(())
    }

    pub fn get_wallet(&self, user_id: &str, currency: &str) -> StoreResult<Option<WalletRecord>> {
        let key = balance_key(user_id, currency);
        let read_txn = self.db.begin_read()?;
        let table = read_txn.open_table(WALLETS)?;
        match table.get(key.as_str())? {
            Some(value) => Ok(Some(serde_json::from_slice(value.value())?)),
            None => Ok(None),
        }
    }

    /// All wallets of one user, every currency.
    pub fn list_wallets(&self, user_id: &str) -> StoreResult<Vec<WalletRecord>> {
        let start = format!("{user_id}|");
        let end = format!("{user_id}|\u{ffff}");
        let read_txn = self.db.begin_read()?;
        let table = read_txn.open_table(WALLETS)?;

        let mut wallets = Vec::new();
        for item in table.range(start.as_str()..end.as_str())? {
            let (_, value) = item?;
            wallets.push(serde_json::from_slice(value.value())?);
        }
        Ok(wallets)
    }

    /// Every wallet row in the database (pollers, conservation checks).
    pub fn list_all_wallets(&self) -> StoreResult<Vec<WalletRecord>> {
        let read_txn = self.db.begin_read()?;
        let table = read_txn.open_table(WALLETS)?;
        let mut wallets = Vec::new();
        for item in table.iter()? {
            let (_, value) = item?;
            wallets.push(serde_json::from_slice(value.value())?);
        }
        Ok(wallets)
    }

    /// Sum of all partitions across users for one currency. The global
    /// conservation invariant compares this against net confirmed flow.
    pub fn currency_totals(&self, currency: &str) -> StoreResult<(Decimal, Decimal, Decimal)> {
        let currency = normalize_currency(currency);
        let mut totals = (Decimal::ZERO, Decimal::ZERO, Decimal::ZERO);
        for wallet in self.list_all_wallets()? {
            if wallet.currency == currency {
                totals.0 += wallet.available;
                totals.1 += wallet.locked;
                totals.2 += wallet.pending;
            }
        }
        Ok(totals)
    }

    // =========================================================================
    // Ledger Entries
    // =========================================================================

    /// Newest-first entries for one wallet.
    pub fn entries_for_wallet(
        &self,
        user_id: &str,
        currency: &str,
        limit: usize,
    ) -> StoreResult<Vec<LedgerEntry>> {
        let wallet_key = balance_key(user_id, currency);
        let start = prefix_start(&wallet_key);
        let end = prefix_end(&wallet_key);

        let read_txn = self.db.begin_read()?;
        let table = read_txn.open_table(LEDGER_ENTRIES)?;

        let mut entries = Vec::new();
        for item in table.range(start.as_slice()..end.as_slice())? {
            let (_, value) = item?;
            entries.push(serde_json::from_slice(value.value())?);
            if entries.len() >= limit {
                break;
            }
        }
        Ok(entries)
    }

    /// All entries recorded against one ticket (dispute evidence).
    pub fn entries_for_ticket(&self, ticket_id: &str) -> StoreResult<Vec<LedgerEntry>> {
        let start = format!("{ticket_id}|");
        let end = format!("{ticket_id}|\u{ffff}");
        let read_txn = self.db.begin_read()?;
        let table = read_txn.open_table(TICKET_ENTRIES)?;

        let mut entries = Vec::new();
        for item in table.range(start.as_str()..end.as_str())? {
            let (_, value) = item?;
            entries.push(serde_json::from_slice(value.value())?);
        }
        Ok(entries)
    }

    // =========================================================================
    // Tickets
    // =========================================================================

    pub fn get_ticket(&self, ticket_id: &str) -> StoreResult<Option<EscrowTicket>> {
        let read_txn = self.db.begin_read()?;
        let table = read_txn.open_table(TICKETS)?;
        match table.get(ticket_id)? {
            Some(value) => Ok(Some(serde_json::from_slice(value.value())?)),
            None => Ok(None),
        }
    }

    /// Persist a ticket outside a balance commit (open/cancel paths where
    /// no funds move).
    pub fn put_ticket(&self, ticket: &EscrowTicket) -> StoreResult<()> {
        let write_txn = self.db.begin_write()?;
        {
            let mut table = write_txn.open_table(TICKETS)?;
            let json = serde_json::to_vec(ticket)?;
            table.insert(ticket.ticket_id.as_str(), json.as_slice())?;
        }
        write_txn.commit()?;
        Ok(())
    }

    /// Tickets not yet in a terminal state (timeout sweeper input).
    ///
    /// Rows that fail to deserialize are skipped with a warning rather than
    /// failing the scan: one damaged row must not stall the sweeper for
    /// every other ticket.
    pub fn list_active_tickets(&self) -> StoreResult<Vec<EscrowTicket>> {
        let read_txn = self.db.begin_read()?;
        let table = read_txn.open_table(TICKETS)?;
        let mut tickets = Vec::new();
        for item in table.iter()? {
            let (key, value) = item?;
            let ticket: EscrowTicket = match serde_json::from_slice(value.value()) {
                Ok(ticket) => ticket,
                Err(e) => {
                    warn!(ticket_id = key.value(), error = %e, "skipping undecodable ticket row");
                    continue;
                }
            };
            if !ticket.status.is_terminal() {
                tickets.push(ticket);
            }
        }
        Ok(tickets)
    }

    /// Write raw bytes into the ticket table, bypassing serialization. Lets
    /// tests stage damaged rows.
    #[cfg(test)]
    pub fn put_raw_ticket(&self, ticket_id: &str, bytes: &[u8]) -> StoreResult<()> {
        let write_txn = self.db.begin_write()?;
        {
            let mut table = write_txn.open_table(TICKETS)?;
            table.insert(ticket_id, bytes)?;
        }
        write_txn.commit()?;
        Ok(())
    }

    /// Tickets in a given state, for admin views.
    pub fn list_tickets_by_status(&self, status: TicketStatus) -> StoreResult<Vec<EscrowTicket>> {
        let read_txn = self.db.begin_read()?;
        let table = read_txn.open_table(TICKETS)?;
        let mut tickets = Vec::new();
        for item in table.iter()? {
            let (_, value) = item?;
            let ticket: EscrowTicket = serde_json::from_slice(value.value())?;
            if ticket.status == status {
                tickets.push(ticket);
            }
        }
        Ok(tickets)
    }

    // =========================================================================
    // Deposit Sync State
    // =========================================================================

    /// Last fully committed block height for a wallet, 0 when never synced.
    pub fn get_cursor(&self, wallet_key: &str) -> StoreResult<u64> {
        let read_txn = self.db.begin_read()?;
        let table = read_txn.open_table(SYNC_CURSORS)?;
        match table.get(wallet_key)? {
            Some(value) => {
                let bytes = value.value();
                match bytes.get(..8).and_then(|b| <[u8; 8]>::try_from(b).ok()) {
                    Some(raw) => Ok(u64::from_be_bytes(raw)),
                    None => Ok(0),
                }
            }
            None => Ok(0),
        }
    }

    pub fn get_seen_deposit(
        &self,
        user_id: &str,
        currency: &str,
        tx_hash: &str,
    ) -> StoreResult<Option<SeenDeposit>> {
        let key = super::records::deposit_key(user_id, currency, tx_hash);
        let read_txn = self.db.begin_read()?;
        let table = read_txn.open_table(SEEN_DEPOSITS)?;
        match table.get(key.as_str())? {
            Some(value) => Ok(Some(serde_json::from_slice(value.value())?)),
            None => Ok(None),
        }
    }

    /// Deposits credited to `pending` but not yet promoted.
    pub fn unconfirmed_deposits(
        &self,
        user_id: &str,
        currency: &str,
    ) -> StoreResult<Vec<SeenDeposit>> {
        let prefix = balance_key(user_id, currency);
        let start = format!("{prefix}|");
        let end = format!("{prefix}|\u{ffff}");
        let read_txn = self.db.begin_read()?;
        let table = read_txn.open_table(SEEN_DEPOSITS)?;

        let mut deposits = Vec::new();
        for item in table.range(start.as_str()..end.as_str())? {
            let (_, value) = item?;
            let seen: SeenDeposit = serde_json::from_slice(value.value())?;
            if !seen.confirmed {
                deposits.push(seen);
            }
        }
        Ok(deposits)
    }

    // =========================================================================
    // Encrypted Keys
    // =========================================================================

    pub fn get_sealed_key(
        &self,
        currency: &str,
        address: &str,
    ) -> StoreResult<Option<EncryptedKey>> {
        let key = format!("{}|{address}", normalize_currency(currency));
        let read_txn = self.db.begin_read()?;
        let table = read_txn.open_table(ENCRYPTED_KEYS)?;
        match table.get(key.as_str())? {
            Some(value) => Ok(Some(serde_json::from_slice(value.value())?)),
            None => Ok(None),
        }
    }

    // =========================================================================
    // Withdrawals
    // =========================================================================

    pub fn get_withdrawal(&self, withdrawal_id: &str) -> StoreResult<Option<WithdrawalRecord>> {
        let read_txn = self.db.begin_read()?;
        let table = read_txn.open_table(WITHDRAWALS)?;
        match table.get(withdrawal_id)? {
            Some(value) => Ok(Some(serde_json::from_slice(value.value())?)),
            None => Ok(None),
        }
    }

    /// Update a withdrawal record outside a balance commit (status flips
    /// after the ledger effect already landed).
    pub fn put_withdrawal(&self, record: &WithdrawalRecord) -> StoreResult<()> {
        let write_txn = self.db.begin_write()?;
        {
            let mut table = write_txn.open_table(WITHDRAWALS)?;
            let json = serde_json::to_vec(record)?;
            table.insert(record.withdrawal_id.as_str(), json.as_slice())?;

            let mut index = write_txn.open_table(USER_WITHDRAWALS)?;
            let key = entry_index_key(
                &record.user_id,
                record.created_at.timestamp_millis(),
                &record.withdrawal_id,
            );
            index.insert(key.as_slice(), record.withdrawal_id.as_str())?;
        }
        write_txn.commit()?;
        Ok(())
    }

    /// Newest-first withdrawal history for a user.
    pub fn withdrawals_for_user(
        &self,
        user_id: &str,
        limit: usize,
    ) -> StoreResult<Vec<WithdrawalRecord>> {
        let start = prefix_start(user_id);
        let end = prefix_end(user_id);

        let read_txn = self.db.begin_read()?;
        let index = read_txn.open_table(USER_WITHDRAWALS)?;
        let table = read_txn.open_table(WITHDRAWALS)?;

        let mut records = Vec::new();
        for item in index.range(start.as_slice()..end.as_slice())? {
            let (_, id) = item?;
            if let Some(value) = table.get(id.value())? {
                records.push(serde_json::from_slice(value.value())?);
            }
            if records.len() >= limit {
                break;
            }
        }
        Ok(records)
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ledger::entry::{Actor, EntryReason};
    use rust_decimal_macros::dec;

    fn temp_db() -> (LedgerDb, tempfile::TempDir) {
        let dir = tempfile::tempdir().unwrap();
        let db = LedgerDb::open(&dir.path().join("ledger.redb")).unwrap();
        (db, dir)
    }

    fn seeded_wallet(db: &LedgerDb, user: &str, currency: &str, available: Decimal) {
        db.create_wallet(&WalletRecord::new(user, currency, format!("addr-{user}")), None)
            .unwrap();
        db.commit(
            &LedgerCommit::new()
                .op(BalanceOp::credit(user, currency, Partition::Available, available))
                .entry(
                    LedgerEntry::new(user, currency, EntryReason::AdminAdjust, Actor::System)
                        .with_delta(Partition::Available, available),
                ),
        )
        .unwrap();
    }

    #[test]
    fn create_and_get_wallet() {
        let (db, _dir) = temp_db();
        let wallet = WalletRecord::new("u1", "BTC", "addr-1");
        db.create_wallet(&wallet, None).unwrap();

        let loaded = db.get_wallet("u1", "btc").unwrap().unwrap();
        assert_eq!(loaded.address, "addr-1");
        assert_eq!(loaded.available, Decimal::ZERO);

        assert!(matches!(
            db.create_wallet(&wallet, None),
            Err(StoreError::WalletExists { .. })
        ));
    }

    #[test]
    fn commit_applies_ops_and_entries_atomically() {
        let (db, _dir) = temp_db();
        seeded_wallet(&db, "u1", "BTC", dec!(1.0));

        let wallet = db.get_wallet("u1", "BTC").unwrap().unwrap();
        assert_eq!(wallet.available, dec!(1.0));

        let entries = db.entries_for_wallet("u1", "BTC", 10).unwrap();
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].available_delta, dec!(1.0));
    }

    #[test]
    fn negative_partition_aborts_whole_commit() {
        let (db, _dir) = temp_db();
        seeded_wallet(&db, "u1", "BTC", dec!(1.0));
        seeded_wallet(&db, "u2", "BTC", dec!(1.0));

        // u2 gets credited first in the batch; u1's overdraft must roll
        // everything back.
        let result = db.commit(
            &LedgerCommit::new()
                .op(BalanceOp::credit("u2", "BTC", Partition::Available, dec!(2.0)))
                .op(BalanceOp::debit("u1", "BTC", Partition::Available, dec!(2.0)))
                .entry(
                    LedgerEntry::new("u2", "BTC", EntryReason::EscrowRelease, Actor::System)
                        .with_delta(Partition::Available, dec!(2.0)),
                ),
        );

        assert!(matches!(
            result,
            Err(StoreError::InsufficientBalance {
                partition: Partition::Available,
                ..
            })
        ));
        assert_eq!(db.get_wallet("u2", "BTC").unwrap().unwrap().available, dec!(1.0));
        assert_eq!(db.get_wallet("u1", "BTC").unwrap().unwrap().available, dec!(1.0));
        assert_eq!(db.entries_for_wallet("u2", "BTC", 10).unwrap().len(), 1);
    }

    #[test]
    fn unknown_wallet_rejected() {
        let (db, _dir) = temp_db();
        let result = db.commit(
            &LedgerCommit::new().op(BalanceOp::credit("ghost", "BTC", Partition::Pending, dec!(1))),
        );
        assert!(matches!(result, Err(StoreError::UnknownWallet { .. })));
    }

    #[test]
    fn entries_for_wallet_newest_first() {
        let (db, _dir) = temp_db();
        seeded_wallet(&db, "u1", "BTC", dec!(5));

        for i in 1..=3u32 {
            let mut entry =
                LedgerEntry::new("u1", "BTC", EntryReason::DepositDetected, Actor::System)
                    .with_delta(Partition::Pending, Decimal::from(i));
            entry.timestamp = chrono::Utc::now() + chrono::Duration::seconds(i as i64);
            db.commit(
                &LedgerCommit::new()
                    .op(BalanceOp::credit("u1", "BTC", Partition::Pending, Decimal::from(i)))
                    .entry(entry),
            )
            .unwrap();
        }

        let entries = db.entries_for_wallet("u1", "BTC", 2).unwrap();
        assert_eq!(entries.len(), 2);
        assert_eq!(entries[0].pending_delta, dec!(3));
        assert_eq!(entries[1].pending_delta, dec!(2));
    }

    #[test]
    fn ticket_entries_indexed_by_ticket() {
        let (db, _dir) = temp_db();
        seeded_wallet(&db, "u1", "ETH", dec!(2.0));

        db.commit(
            &LedgerCommit::new()
                .op(BalanceOp::shift(
                    "u1",
                    "ETH",
                    Partition::Available,
                    Partition::Locked,
                    dec!(0.5),
                ))
                .entry(
                    LedgerEntry::new("u1", "ETH", EntryReason::EscrowLock, Actor::User("u1".into()))
                        .with_ticket("t-9")
                        .with_delta(Partition::Available, dec!(-0.5))
                        .with_delta(Partition::Locked, dec!(0.5)),
                ),
        )
        .unwrap();

        let evidence = db.entries_for_ticket("t-9").unwrap();
        assert_eq!(evidence.len(), 1);
        assert_eq!(evidence[0].reason, EntryReason::EscrowLock);
        assert!(db.entries_for_ticket("t-other").unwrap().is_empty());
    }

    #[test]
    fn cursor_and_seen_deposit_commit_together() {
        let (db, _dir) = temp_db();
        seeded_wallet(&db, "u1", "BTC", dec!(0));
        let wallet_key = balance_key("u1", "BTC");

        assert_eq!(db.get_cursor(&wallet_key).unwrap(), 0);

        let seen = SeenDeposit::new("u1", "BTC", "0xabc", dec!(0.3), 120);
        db.commit(
            &LedgerCommit::new()
                .op(BalanceOp::credit("u1", "BTC", Partition::Pending, dec!(0.3)))
                .entry(
                    LedgerEntry::new("u1", "BTC", EntryReason::DepositDetected, Actor::System)
                        .with_delta(Partition::Pending, dec!(0.3)),
                )
                .seen_deposit(seen)
                .cursor(wallet_key.clone(), 120),
        )
        .unwrap();

        assert_eq!(db.get_cursor(&wallet_key).unwrap(), 120);
        let seen = db.get_seen_deposit("u1", "BTC", "0xabc").unwrap().unwrap();
        assert!(!seen.confirmed);
        assert_eq!(db.unconfirmed_deposits("u1", "BTC").unwrap().len(), 1);
    }

    #[test]
    fn withdrawal_history_newest_first() {
        let (db, _dir) = temp_db();
        for i in 1..=3u32 {
            let mut record = WithdrawalRecord::new(
                format!("w-{i}"),
                "u1",
                "BTC",
                Decimal::from(i),
                dec!(0.0001),
                dec!(0.0002),
                "dest",
            );
            record.created_at = chrono::Utc::now() + chrono::Duration::seconds(i as i64);
            db.put_withdrawal(&record).unwrap();
        }

        let history = db.withdrawals_for_user("u1", 2).unwrap();
        assert_eq!(history.len(), 2);
        assert_eq!(history[0].withdrawal_id, "w-3");
        assert_eq!(history[1].withdrawal_id, "w-2");
    }

    #[test]
    fn active_tickets_excludes_terminal() {
        use crate::escrow::ticket::{TicketType, TicketStatus};

        let (db, _dir) = temp_db();
        let mut open = crate::escrow::ticket::EscrowTicket::new(
            TicketType::P2p,
            "b",
            "s",
            None,
            "BTC",
            dec!(1),
        );
        db.put_ticket(&open).unwrap();

        open.ticket_id = "t-done".to_string();
        open.status = TicketStatus::Completed;
        db.put_ticket(&open).unwrap();

        let active = db.list_active_tickets().unwrap();
        assert_eq!(active.len(), 1);
        assert_eq!(active[0].status, TicketStatus::Created);
    }

    #[test]
    fn currency_totals_sum_partitions() {
        let (db, _dir) = temp_db();
        seeded_wallet(&db, "u1", "BTC", dec!(1.0));
        seeded_wallet(&db, "u2", "BTC", dec!(0.5));
        seeded_wallet(&db, "u3", "ETH", dec!(9.0));

        let (available, locked, pending) = db.currency_totals("BTC").unwrap();
        assert_eq!(available, dec!(1.5));
        assert_eq!(locked, Decimal::ZERO);
        assert_eq!(pending, Decimal::ZERO);
    }
}
