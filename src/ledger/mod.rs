// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Wallet balances, partitions, and the append-only audit log.

pub mod entry;
#[allow(clippy::module_inception)]
pub mod ledger;
pub mod types;

pub use entry::{Actor, EntryReason, LedgerEntry};
pub use ledger::BalanceLedger;
pub use types::{balance_key, normalize_currency, Partition, WalletRecord};
