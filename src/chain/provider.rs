// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Abstraction over the external blockchain gateway.
//!
//! All chain I/O goes through [`ChainProvider`] so the sync and withdrawal
//! paths can be tested against an in-memory implementation. The production
//! [`HttpChainProvider`] talks JSON to the gateway configured by
//! `PROVIDER_URL`.

use async_trait::async_trait;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use super::ChainError;

/// One on-chain deposit as reported by the gateway.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ProviderDeposit {
    pub tx_hash: String,
    pub amount: Decimal,
    pub confirmations: u32,
    pub block_height: u64,
}

#[async_trait]
pub trait ChainProvider: Send + Sync {
    /// Deposits to `address` strictly after `cursor` (a block height).
    async fn deposits_since(
        &self,
        currency: &str,
        address: &str,
        cursor: u64,
    ) -> Result<Vec<ProviderDeposit>, ChainError>;

    /// Current confirmation count for a transaction, `None` if unknown.
    async fn deposit_confirmations(
        &self,
        currency: &str,
        tx_hash: &str,
    ) -> Result<Option<u32>, ChainError>;

    /// Broadcast a signed transaction. `idempotency_key` lets the gateway
    /// dedupe retries of the same withdrawal. Returns the provider tx id.
    async fn broadcast(
        &self,
        currency: &str,
        idempotency_key: &str,
        signed_tx: &str,
    ) -> Result<String, ChainError>;

    /// Look up a previously attempted broadcast by idempotency key.
    /// `Some(tx_id)` means the transaction did reach the network.
    async fn broadcast_status(
        &self,
        currency: &str,
        idempotency_key: &str,
    ) -> Result<Option<String>, ChainError>;

    /// Network fee estimate for moving `amount` of `currency`.
    async fn estimate_fee(&self, currency: &str, amount: Decimal) -> Result<Decimal, ChainError>;
}

// =============================================================================
// HTTP Implementation
// =============================================================================

pub struct HttpChainProvider {
    client: reqwest::Client,
    base_url: String,
}

#[derive(Deserialize)]
struct DepositsResponse {
    deposits: Vec<ProviderDeposit>,
}

#[derive(Deserialize)]
struct ConfirmationsResponse {
    confirmations: Option<u32>,
}

#[derive(Serialize)]
struct BroadcastRequest<'a> {
    currency: &'a str,
    idempotency_key: &'a str,
    signed_tx: &'a str,
}

#[derive(Deserialize)]
struct BroadcastResponse {
    tx_id: String,
}

#[derive(Deserialize)]
struct BroadcastStatusResponse {
    tx_id: Option<String>,
}

#[derive(Deserialize)]
struct FeeResponse {
    fee: Decimal,
}

impl HttpChainProvider {
    pub fn new(base_url: impl Into<String>) -> Result<Self, ChainError> {
        let client = reqwest::Client::builder()
            .timeout(std::time::Duration::from_secs(30))
            .build()
            .map_err(|e| ChainError::ProviderUnavailable(e.to_string()))?;
        Ok(Self {
            client,
            base_url: base_url.into(),
        })
    }

    async fn get_json<T: serde::de::DeserializeOwned>(&self, path: &str) -> Result<T, ChainError> {
        let response = self
            .client
            .get(format!("{}{path}", self.base_url))
            .send()
            .await
            .map_err(|e| ChainError::ProviderUnavailable(e.to_string()))?;
        if !response.status().is_success() {
            return Err(ChainError::ProviderUnavailable(format!(
                "gateway returned {}",
                response.status()
            )));
        }
        response
            .json()
            .await
            .map_err(|e| ChainError::InvalidResponse(e.to_string()))
    }
}

#[async_trait]
impl ChainProvider for HttpChainProvider {
    async fn deposits_since(
        &self,
        currency: &str,
        address: &str,
        cursor: u64,
    ) -> Result<Vec<ProviderDeposit>, ChainError> {
        let response: DepositsResponse = self
            .get_json(&format!(
                "/v1/chains/{currency}/addresses/{address}/deposits?after_height={cursor}"
            ))
            .await?;
        Ok(response.deposits)
    }

    async fn deposit_confirmations(
        &self,
        currency: &str,
        tx_hash: &str,
    ) -> Result<Option<u32>, ChainError> {
        let response: ConfirmationsResponse = self
            .get_json(&format!("/v1/chains/{currency}/txs/{tx_hash}/confirmations"))
            .await?;
        Ok(response.confirmations)
    }

    async fn broadcast(
        &self,
        currency: &str,
        idempotency_key: &str,
        signed_tx: &str,
    ) -> Result<String, ChainError> {
        let response = self
            .client
            .post(format!("{}/v1/broadcasts", self.base_url))
            .json(&BroadcastRequest {
                currency,
                idempotency_key,
                signed_tx,
            })
            .send()
            .await
            .map_err(|e| ChainError::ProviderUnavailable(e.to_string()))?;
        if !response.status().is_success() {
            return Err(ChainError::ProviderUnavailable(format!(
                "broadcast rejected with {}",
                response.status()
            )));
        }
        let body: BroadcastResponse = response
            .json()
            .await
            .map_err(|e| ChainError::InvalidResponse(e.to_string()))?;
        Ok(body.tx_id)
    }

    async fn broadcast_status(
        &self,
        currency: &str,
        idempotency_key: &str,
    ) -> Result<Option<String>, ChainError> {
        let response: BroadcastStatusResponse = self
            .get_json(&format!("/v1/broadcasts/{currency}/{idempotency_key}"))
            .await?;
        Ok(response.tx_id)
    }

    async fn estimate_fee(&self, currency: &str, amount: Decimal) -> Result<Decimal, ChainError> {
        let response: FeeResponse = self
            .get_json(&format!("/v1/chains/{currency}/fee?amount={amount}"))
            .await?;
        Ok(response.fee)
    }
}

// =============================================================================
// Test Double
// =============================================================================

#[cfg(test)]
pub mod mock {
    use std::collections::HashMap;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Mutex;

    use super::*;

    /// In-memory provider with scriptable deposits and broadcast failures.
    #[derive(Default)]
    pub struct MockProvider {
        /// `address` -> deposits to report.
        pub deposits: Mutex<HashMap<String, Vec<ProviderDeposit>>>,
        /// `tx_hash` -> confirmation count.
        pub confirmations: Mutex<HashMap<String, u32>>,
        /// Broadcasts that landed, by idempotency key.
        pub broadcasts: Mutex<HashMap<String, String>>,
        /// Number of broadcast calls that fail before one succeeds.
        pub broadcast_failures: AtomicU32,
        /// When set, failed broadcasts still reach the network (the
        /// ack was lost, not the transaction).
        pub fail_after_send: Mutex<bool>,
        pub fee: Mutex<Decimal>,
    }

    impl MockProvider {
        pub fn new() -> Self {
            Self {
                fee: Mutex::new(Decimal::new(1, 4)), // 0.0001
                ..Self::default()
            }
        }

        pub fn push_deposit(&self, address: &str, deposit: ProviderDeposit) {
            self.confirmations
                .lock()
                .unwrap()
                .insert(deposit.tx_hash.clone(), deposit.confirmations);
            self.deposits
                .lock()
                .unwrap()
                .entry(address.to_string())
                .or_default()
                .push(deposit);
        }

        pub fn set_confirmations(&self, tx_hash: &str, confirmations: u32) {
            self.confirmations
                .lock()
                .unwrap()
                .insert(tx_hash.to_string(), confirmations);
        }
    }

    #[async_trait]
    impl ChainProvider for MockProvider {
        async fn deposits_since(
            &self,
            _currency: &str,
            address: &str,
            cursor: u64,
        ) -> Result<Vec<ProviderDeposit>, ChainError> {
            Ok(self
                .deposits
                .lock()
                .unwrap()
                .get(address)
                .map(|deposits| {
                    deposits
                        .iter()
                        .filter(|d| d.block_height > cursor)
                        .cloned()
                        .collect()
                })
                .unwrap_or_default())
        }

        async fn deposit_confirmations(
            &self,
            _currency: &str,
            tx_hash: &str,
        ) -> Result<Option<u32>, ChainError> {
            Ok(self.confirmations.lock().unwrap().get(tx_hash).copied())
        }

        async fn broadcast(
            &self,
            _currency: &str,
            idempotency_key: &str,
            signed_tx: &str,
        ) -> Result<String, ChainError> {
            let remaining = self.broadcast_failures.load(Ordering::SeqCst);
            if remaining > 0 {
                self.broadcast_failures.fetch_sub(1, Ordering::SeqCst);
                if *self.fail_after_send.lock().unwrap() {
                    self.broadcasts
                        .lock()
                        .unwrap()
                        .insert(idempotency_key.to_string(), format!("tx-{idempotency_key}"));
                }
                return Err(ChainError::ProviderUnavailable("gateway timeout".to_string()));
            }
            let _ = signed_tx;
            let tx_id = format!("tx-{idempotency_key}");
            self.broadcasts
                .lock()
                .unwrap()
                .insert(idempotency_key.to_string(), tx_id.clone());
            Ok(tx_id)
        }

        async fn broadcast_status(
            &self,
            _currency: &str,
            idempotency_key: &str,
        ) -> Result<Option<String>, ChainError> {
            Ok(self.broadcasts.lock().unwrap().get(idempotency_key).cloned())
        }

        async fn estimate_fee(
            &self,
            _currency: &str,
            _amount: Decimal,
        ) -> Result<Decimal, ChainError> {
            Ok(*self.fee.lock().unwrap())
        }
    }
}
