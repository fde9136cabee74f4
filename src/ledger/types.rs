// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Core balance types: partitions and the per-(account, currency) wallet row.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// Sub-balance of a wallet.
///
/// `available` is spendable, `locked` is held by an active escrow ticket,
/// `pending` is an unconfirmed deposit. The stored row never carries a
/// `total`; it is always recomputed from the three partitions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Partition {
    Available,
    Locked,
    Pending,
}

impl Partition {
    pub fn as_str(&self) -> &'static str {
        match self {
            Partition::Available => "available",
            Partition::Locked => "locked",
            Partition::Pending => "pending",
        }
    }
}

impl std::fmt::Display for Partition {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One wallet row per (account, currency).
///
/// Created on first wallet generation for a currency, mutated only through
/// the ledger's atomic primitives, never deleted (only zeroed).
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct WalletRecord {
    pub user_id: String,
    /// Uppercase currency code (`BTC`, `ETH`, `USDT-ETH`, ...).
    pub currency: String,
    /// On-chain deposit address.
    pub address: String,
    pub available: Decimal,
    pub locked: Decimal,
    pub pending: Decimal,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl WalletRecord {
    pub fn new(user_id: impl Into<String>, currency: &str, address: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            user_id: user_id.into(),
            currency: normalize_currency(currency),
            address: address.into(),
            available: Decimal::ZERO,
            locked: Decimal::ZERO,
            pending: Decimal::ZERO,
            created_at: now,
            updated_at: now,
        }
    }

    /// Derived total; never stored.
    pub fn total(&self) -> Decimal {
        self.available + self.locked + self.pending
    }

    pub fn partition(&self, partition: Partition) -> Decimal {
        match partition {
            Partition::Available => self.available,
            Partition::Locked => self.locked,
            Partition::Pending => self.pending,
        }
    }

    /// Storage key for this wallet row.
    pub fn key(&self) -> String {
        balance_key(&self.user_id, &self.currency)
    }
}

/// Composite key for all per-(account, currency) state: `user|CURRENCY`.
pub fn balance_key(user_id: &str, currency: &str) -> String {
    format!("{user_id}|{}", normalize_currency(currency))
}

/// Currency codes are compared case-insensitively; storage holds uppercase.
pub fn normalize_currency(currency: &str) -> String {
    currency.trim().to_uppercase()
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn total_is_sum_of_partitions() {
        let mut wallet = WalletRecord::new("u1", "btc", "addr");
        wallet.available = dec!(1.5);
        wallet.locked = dec!(0.25);
        wallet.pending = dec!(0.1);
        assert_eq!(wallet.total(), dec!(1.85));
    }

    #[test]
    fn currency_is_normalized() {
        let wallet = WalletRecord::new("u1", " btc ", "addr");
        assert_eq!(wallet.currency, "BTC");
        assert_eq!(wallet.key(), "u1|BTC");
        assert_eq!(balance_key("u1", "Btc"), "u1|BTC");
    }
}
