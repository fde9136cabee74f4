// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Durable state: the embedded redb ledger database and its record types.

pub mod db;
pub mod records;

pub use db::{BalanceOp, LedgerCommit, LedgerDb, StoreError, StoreResult};
pub use records::{deposit_key, SeenDeposit, WithdrawalRecord, WithdrawalStatus};
