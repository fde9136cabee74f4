// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Durable records owned by the chain-sync and withdrawal flows.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::ledger::types::{balance_key, normalize_currency};

/// Dedup record for an observed on-chain deposit, keyed by
/// `user|CURRENCY|tx_hash`. Written in the same transaction as the ledger
/// credit so a crash can never leave a credited-but-unrecorded deposit.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SeenDeposit {
    pub user_id: String,
    pub currency: String,
    pub tx_hash: String,
    pub amount: Decimal,
    /// True once the deposit was promoted `pending` -> `available`.
    pub confirmed: bool,
    pub block_height: u64,
    pub first_seen: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub confirmed_at: Option<DateTime<Utc>>,
}

impl SeenDeposit {
    pub fn new(
        user_id: impl Into<String>,
        currency: &str,
        tx_hash: impl Into<String>,
        amount: Decimal,
        block_height: u64,
    ) -> Self {
        Self {
            user_id: user_id.into(),
            currency: normalize_currency(currency),
            tx_hash: tx_hash.into(),
            amount,
            confirmed: false,
            block_height,
            first_seen: Utc::now(),
            confirmed_at: None,
        }
    }

    /// Storage key: `user|CURRENCY|tx_hash`.
    pub fn key(&self) -> String {
        deposit_key(&self.user_id, &self.currency, &self.tx_hash)
    }
}

pub fn deposit_key(user_id: &str, currency: &str, tx_hash: &str) -> String {
    format!("{}|{tx_hash}", balance_key(user_id, currency))
}

/// Lifecycle of a withdrawal record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WithdrawalStatus {
    /// Ledger debited, broadcast in flight.
    Broadcasting,
    /// Provider acknowledged the broadcast.
    Broadcast,
    /// Broadcast failed; compensating credit has been recorded.
    Failed,
}

/// Durable withdrawal history row (fee breakdown preserved for audits).
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct WithdrawalRecord {
    pub withdrawal_id: String,
    pub user_id: String,
    pub currency: String,
    pub amount: Decimal,
    pub network_fee: Decimal,
    pub server_fee: Decimal,
    pub total_deducted: Decimal,
    pub to_address: String,
    pub status: WithdrawalStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub provider_tx_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl WithdrawalRecord {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        withdrawal_id: impl Into<String>,
        user_id: impl Into<String>,
        currency: &str,
        amount: Decimal,
        network_fee: Decimal,
        server_fee: Decimal,
        to_address: impl Into<String>,
    ) -> Self {
        let now = Utc::now();
        Self {
            withdrawal_id: withdrawal_id.into(),
            user_id: user_id.into(),
            currency: normalize_currency(currency),
            amount,
            network_fee,
            server_fee,
            total_deducted: amount + network_fee + server_fee,
            to_address: to_address.into(),
            status: WithdrawalStatus::Broadcasting,
            provider_tx_id: None,
            error: None,
            created_at: now,
            updated_at: now,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn deposit_key_is_scoped_to_wallet() {
        let seen = SeenDeposit::new("u1", "btc", "0xabc", dec!(1), 100);
        assert_eq!(seen.key(), "u1|BTC|0xabc");
        assert!(!seen.confirmed);
    }

    #[test]
    fn withdrawal_total_includes_fees() {
        let record = WithdrawalRecord::new(
            "w-1",
            "u1",
            "BTC",
            dec!(1.0),
            dec!(0.0001),
            dec!(0.0002),
            "dest",
        );
        assert_eq!(record.total_deducted, dec!(1.0003));
        assert_eq!(record.status, WithdrawalStatus::Broadcasting);
    }
}
