// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Two-phase withdrawals: stateless fee preview, then atomic execute.
//!
//! Nothing is reserved between preview and execute. Execute re-derives the
//! fees from scratch and compares them with what the client accepted; a
//! drift beyond the configured tolerance rejects the request instead of
//! silently charging more.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rust_decimal::{Decimal, RoundingStrategy};
use serde::{Deserialize, Serialize};
use tracing::{error, info, warn};

use crate::chain::{ChainError, ChainSync};
use crate::ledger::{Actor, BalanceLedger, EntryReason, LedgerEntry, Partition};
use crate::storage::{
    BalanceOp, LedgerCommit, StoreError, WithdrawalRecord, WithdrawalStatus,
};

const AMOUNT_SCALE: u32 = 8;
const CREDIT_RETRY_BACKOFF_MS: u64 = 100;

#[derive(Debug, thiserror::Error)]
pub enum WithdrawError {
    #[error("fee quote is stale: accepted total {accepted}, current total {current}")]
    StaleFeeQuote { accepted: Decimal, current: Decimal },

    #[error("invalid withdrawal amount: {0}")]
    InvalidAmount(Decimal),

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error(transparent)]
    Chain(#[from] ChainError),
}

/// Requested size of a withdrawal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WithdrawalAmount {
    /// A fixed amount the destination should receive.
    Amount(Decimal),
    /// Everything: the largest amount such that amount + fees fits in the
    /// available balance.
    Max,
}

/// Fee breakdown returned by preview and re-derived by execute.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FeeQuote {
    pub currency: String,
    pub amount: Decimal,
    pub network_fee: Decimal,
    pub server_fee: Decimal,
    pub total_deducted: Decimal,
    pub valid_until: DateTime<Utc>,
}

/// The fee terms a client accepted when calling execute.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct AcceptedFees {
    pub network_fee: Decimal,
    pub server_fee: Decimal,
}

impl AcceptedFees {
    pub fn total(&self, amount: Decimal) -> Decimal {
        amount + self.network_fee + self.server_fee
    }
}

// =============================================================================
// Fee Oracle
// =============================================================================

#[async_trait]
pub trait FeeOracle: Send + Sync {
    async fn network_fee(&self, currency: &str, amount: Decimal) -> Result<Decimal, WithdrawError>;
}

/// Production oracle: asks the chain gateway for an estimate.
pub struct GatewayFeeOracle {
    provider: Arc<dyn crate::chain::ChainProvider>,
}

impl GatewayFeeOracle {
    pub fn new(provider: Arc<dyn crate::chain::ChainProvider>) -> Self {
        Self { provider }
    }
}

#[async_trait]
impl FeeOracle for GatewayFeeOracle {
    async fn network_fee(&self, currency: &str, amount: Decimal) -> Result<Decimal, WithdrawError> {
        Ok(self.provider.estimate_fee(currency, amount).await?)
    }
}

/// Flat per-currency fee table, for test setups and offline operation.
pub struct FixedFeeOracle {
    fees: std::sync::Mutex<HashMap<String, Decimal>>,
    default_fee: Decimal,
}

impl FixedFeeOracle {
    pub fn new() -> Self {
        let mut fees = HashMap::new();
        fees.insert("BTC".to_string(), Decimal::new(1, 4)); // 0.0001
        fees.insert("ETH".to_string(), Decimal::new(5, 4)); // 0.0005
        Self {
            fees: std::sync::Mutex::new(fees),
            default_fee: Decimal::new(1, 3), // 0.001
        }
    }

    pub fn set_fee(&self, currency: &str, fee: Decimal) {
        self.fees
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .insert(crate::ledger::normalize_currency(currency), fee);
    }
}

impl Default for FixedFeeOracle {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl FeeOracle for FixedFeeOracle {
    async fn network_fee(&self, currency: &str, _amount: Decimal) -> Result<Decimal, WithdrawError> {
        let fees = self.fees.lock().unwrap_or_else(|e| e.into_inner());
        Ok(fees
            .get(&crate::ledger::normalize_currency(currency))
            .copied()
            .unwrap_or(self.default_fee))
    }
}

// =============================================================================
// Protocol
// =============================================================================

pub struct WithdrawalProtocol {
    ledger: Arc<BalanceLedger>,
    chain: Arc<ChainSync>,
    oracle: Arc<dyn FeeOracle>,
    server_fee_rate: Decimal,
    /// Allowed upward drift of the total between preview and execute,
    /// as a fraction (0.01 = 1%).
    fee_tolerance: Decimal,
    quote_validity: std::time::Duration,
}

impl WithdrawalProtocol {
    pub fn new(
        ledger: Arc<BalanceLedger>,
        chain: Arc<ChainSync>,
        oracle: Arc<dyn FeeOracle>,
        server_fee_rate: Decimal,
        fee_tolerance: Decimal,
        quote_validity: std::time::Duration,
    ) -> Self {
        Self {
            ledger,
            chain,
            oracle,
            server_fee_rate,
            fee_tolerance,
            quote_validity,
        }
    }

    fn server_fee(&self, amount: Decimal) -> Decimal {
        // normalize() drops trailing zeros so serialized fees read cleanly
        (amount * self.server_fee_rate)
            .round_dp_with_strategy(AMOUNT_SCALE, RoundingStrategy::MidpointAwayFromZero)
            .normalize()
    }

    /// Stateless fee preview. Reserves nothing.
    pub async fn preview(
        &self,
        user_id: &str,
        currency: &str,
        requested: WithdrawalAmount,
    ) -> Result<FeeQuote, WithdrawError> {
        let wallet = self
            .ledger
            .wallet(user_id, currency)?
            .ok_or_else(|| StoreError::UnknownWallet {
                user_id: user_id.to_string(),
                currency: currency.to_string(),
            })?;

        let probe_amount = match requested {
            WithdrawalAmount::Amount(a) => a,
            WithdrawalAmount::Max => wallet.available,
        };
        let network_fee = self.oracle.network_fee(&wallet.currency, probe_amount).await?;

        let amount = match requested {
            WithdrawalAmount::Amount(a) => {
                if a <= Decimal::ZERO {
                    return Err(WithdrawError::InvalidAmount(a));
                }
                a
            }
            // Solve amount * (1 + rate) + network_fee = available, rounding
            // down so the total never exceeds the balance.
            WithdrawalAmount::Max => {
                let amount = ((wallet.available - network_fee)
                    / (Decimal::ONE + self.server_fee_rate))
                    .round_dp_with_strategy(AMOUNT_SCALE, RoundingStrategy::ToZero);
                if amount <= Decimal::ZERO {
                    return Err(WithdrawError::InvalidAmount(amount));
                }
                amount
            }
        };

        let server_fee = self.server_fee(amount);
        let total_deducted = amount + network_fee + server_fee;
        if total_deducted > wallet.available {
            return Err(StoreError::InsufficientBalance {
                user_id: user_id.to_string(),
                currency: wallet.currency.clone(),
                partition: Partition::Available,
                requested: total_deducted,
                held: wallet.available,
            }
            .into());
        }

        Ok(FeeQuote {
            currency: wallet.currency,
            amount,
            network_fee,
            server_fee,
            total_deducted,
            valid_until: Utc::now() + self.quote_validity,
        })
    }

    /// Execute a withdrawal against fees the client accepted.
    ///
    /// The debit, its audit entry, and the withdrawal record land in one
    /// transaction before any network I/O; a failed broadcast is undone by
    /// a compensating credit that is retried until it commits. The returned
    /// record's status tells the caller which way it went.
    pub async fn execute(
        &self,
        user_id: &str,
        currency: &str,
        amount: Decimal,
        accepted: AcceptedFees,
        to_address: &str,
    ) -> Result<WithdrawalRecord, WithdrawError> {
        if amount <= Decimal::ZERO {
            return Err(WithdrawError::InvalidAmount(amount));
        }
        let wallet = self
            .ledger
            .wallet(user_id, currency)?
            .ok_or_else(|| StoreError::UnknownWallet {
                user_id: user_id.to_string(),
                currency: currency.to_string(),
            })?;

        // Re-derive both fees; the quote is advisory, never trusted.
        let network_fee = self.oracle.network_fee(&wallet.currency, amount).await?;
        let server_fee = self.server_fee(amount);
        let current_total = amount + network_fee + server_fee;
        let accepted_total = accepted.total(amount);
        if current_total > accepted_total * (Decimal::ONE + self.fee_tolerance) {
            return Err(WithdrawError::StaleFeeQuote {
                accepted: accepted_total,
                current: current_total,
            });
        }

        let record = WithdrawalRecord::new(
            uuid::Uuid::new_v4().to_string(),
            user_id,
            &wallet.currency,
            amount,
            network_fee,
            server_fee,
            to_address,
        );

        self.ledger
            .apply(
                LedgerCommit::new()
                    .op(BalanceOp::debit(
                        user_id,
                        &wallet.currency,
                        Partition::Available,
                        record.total_deducted,
                    ))
                    .entry(
                        LedgerEntry::new(
                            user_id,
                            &wallet.currency,
                            EntryReason::Withdrawal,
                            Actor::User(user_id.to_string()),
                        )
                        .with_delta(Partition::Available, -record.total_deducted),
                    )
                    .withdrawal(record.clone()),
            )
            .await?;

        match self.chain.broadcast_withdrawal(&record, &wallet.address).await {
            Ok(tx_id) => {
                let mut record = record;
                record.status = WithdrawalStatus::Broadcast;
                record.provider_tx_id = Some(tx_id.clone());
                record.updated_at = Utc::now();
                self.ledger.db().put_withdrawal(&record)?;
                info!(
                    withdrawal_id = %record.withdrawal_id,
                    user_id,
                    currency = %record.currency,
                    total = %record.total_deducted,
                    tx_id,
                    "withdrawal broadcast"
                );
                Ok(record)
            }
            Err(e) => {
                warn!(
                    withdrawal_id = %record.withdrawal_id,
                    error = %e,
                    "broadcast failed, crediting funds back"
                );
                let mut record = record;
                record.status = WithdrawalStatus::Failed;
                record.error = Some(e.to_string());
                record.updated_at = Utc::now();
                self.compensate(&record).await;
                Ok(record)
            }
        }
    }

    /// Credit the debited total back after a failed broadcast. Must not be
    /// lost, so storage errors are retried until the commit lands.
    async fn compensate(&self, record: &WithdrawalRecord) {
        let commit = LedgerCommit::new()
            .op(BalanceOp::credit(
                &record.user_id,
                &record.currency,
                Partition::Available,
                record.total_deducted,
            ))
            .entry(
                LedgerEntry::new(
                    &record.user_id,
                    &record.currency,
                    EntryReason::WithdrawalFailed,
                    Actor::System,
                )
                .with_delta(Partition::Available, record.total_deducted),
            )
            .withdrawal(record.clone());

        let mut attempt = 0u64;
        loop {
            match self.ledger.apply(commit.clone()).await {
                Ok(()) => return,
                Err(e) => {
                    attempt += 1;
                    error!(
                        withdrawal_id = %record.withdrawal_id,
                        attempt,
                        error = %e,
                        "compensating credit failed, retrying"
                    );
                    tokio::time::sleep(std::time::Duration::from_millis(
                        CREDIT_RETRY_BACKOFF_MS * attempt.min(50),
                    ))
                    .await;
                }
            }
        }
    }

    /// Newest-first withdrawal history.
    pub fn history(&self, user_id: &str, limit: usize) -> Result<Vec<WithdrawalRecord>, WithdrawError> {
        Ok(self.ledger.db().withdrawals_for_user(user_id, limit)?)
    }
}
