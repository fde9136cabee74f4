// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Append-only audit records for every balance-affecting operation.
//!
//! One [`LedgerEntry`] is committed in the same storage transaction as the
//! balance change it describes; the entry and the mutation succeed or fail
//! as a unit. Entries are never mutated or deleted.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use super::types::{normalize_currency, Partition};

/// Why a balance changed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntryReason {
    /// Unconfirmed deposit credited to `pending`.
    DepositDetected,
    /// Deposit reached the confirmation threshold; `pending` -> `available`.
    DepositConfirmed,
    /// Withdrawal debit (amount plus fees).
    Withdrawal,
    /// Compensating credit after a failed broadcast.
    WithdrawalFailed,
    /// Escrow funding; `available` -> `locked`.
    EscrowLock,
    /// Escrow release to the counterparty.
    EscrowRelease,
    /// Platform fee taken from a released escrow.
    EscrowFee,
    /// Admin adjudication returned locked funds to the depositor.
    AdminRefund,
    /// Privileged forfeiture; funds retained by the platform.
    AdminSeizure,
    /// Manual admin balance correction.
    AdminAdjust,
}

/// Who initiated a balance-affecting operation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "role", content = "id")]
pub enum Actor {
    User(String),
    Admin(String),
    System,
}

/// Immutable audit log record. `delta` fields are signed per partition.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct LedgerEntry {
    pub entry_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ticket_id: Option<String>,
    pub user_id: String,
    pub currency: String,
    pub available_delta: Decimal,
    pub locked_delta: Decimal,
    pub pending_delta: Decimal,
    pub reason: EntryReason,
    pub actor: Actor,
    pub timestamp: DateTime<Utc>,
}

impl LedgerEntry {
    pub fn new(
        user_id: impl Into<String>,
        currency: &str,
        reason: EntryReason,
        actor: Actor,
    ) -> Self {
        Self {
            entry_id: uuid::Uuid::new_v4().to_string(),
            ticket_id: None,
            user_id: user_id.into(),
            currency: normalize_currency(currency),
            available_delta: Decimal::ZERO,
            locked_delta: Decimal::ZERO,
            pending_delta: Decimal::ZERO,
            reason,
            actor,
            timestamp: Utc::now(),
        }
    }

    pub fn with_ticket(mut self, ticket_id: impl Into<String>) -> Self {
        self.ticket_id = Some(ticket_id.into());
        self
    }

    /// Add a signed delta to one partition.
    pub fn with_delta(mut self, partition: Partition, delta: Decimal) -> Self {
        match partition {
            Partition::Available => self.available_delta += delta,
            Partition::Locked => self.locked_delta += delta,
            Partition::Pending => self.pending_delta += delta,
        }
        self
    }

    /// Net effect on the wallet total (conservation checks sum this).
    pub fn net_delta(&self) -> Decimal {
        self.available_delta + self.locked_delta + self.pending_delta
    }
}
