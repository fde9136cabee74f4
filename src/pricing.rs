// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Display-only USD valuation of wallet balances.
//!
//! Prices never feed the ledger; they exist so the wallet view can show an
//! approximate fiat value next to each balance.

use std::collections::HashMap;
use std::sync::RwLock;

use rust_decimal::Decimal;
use rust_decimal_macros::dec;

pub struct PriceBook {
    prices: RwLock<HashMap<String, Decimal>>,
}

impl PriceBook {
    pub fn new() -> Self {
        let mut prices = HashMap::new();
        prices.insert("BTC".to_string(), dec!(60000));
        prices.insert("ETH".to_string(), dec!(3000));
        prices.insert("XMR".to_string(), dec!(160));
        prices.insert("LTC".to_string(), dec!(80));
        Self {
            prices: RwLock::new(prices),
        }
    }

    pub fn price(&self, currency: &str) -> Option<Decimal> {
        self.prices
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .get(&crate::ledger::normalize_currency(currency))
            .copied()
    }

    pub fn set_price(&self, currency: &str, price: Decimal) {
        self.prices
            .write()
            .unwrap_or_else(|e| e.into_inner())
            .insert(crate::ledger::normalize_currency(currency), price);
    }

    /// USD value of an amount, `None` when the currency is unpriced.
    pub fn usd_value(&self, currency: &str, amount: Decimal) -> Option<Decimal> {
        self.price(currency)
            .map(|p| (amount * p).round_dp(2))
    }
}

impl Default for PriceBook {
    fn default() -> Self {
        Self::new()
    }
}
