// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Shared application state handed to every handler.

use std::sync::Arc;

use crate::chain::{ChainProvider, ChainSync};
use crate::config::Config;
use crate::escrow::EscrowEngine;
use crate::ledger::BalanceLedger;
use crate::pricing::PriceBook;
use crate::storage::LedgerDb;
use crate::vault::KeyVault;
use crate::withdraw::{FeeOracle, WithdrawalProtocol};

#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,
    pub ledger: Arc<BalanceLedger>,
    pub chain: Arc<ChainSync>,
    pub escrow: Arc<EscrowEngine>,
    pub withdrawals: Arc<WithdrawalProtocol>,
    pub prices: Arc<PriceBook>,
}

impl AppState {
    /// Wire the full service graph from its leaves.
    pub fn new(
        config: Config,
        db: Arc<LedgerDb>,
        vault: Arc<KeyVault>,
        provider: Arc<dyn ChainProvider>,
        oracle: Arc<dyn FeeOracle>,
    ) -> Self {
        let ledger = Arc::new(BalanceLedger::new(db));
        let chain = Arc::new(ChainSync::new(
            ledger.clone(),
            vault,
            provider,
            config.confirmation_threshold,
        ));
        let escrow = Arc::new(EscrowEngine::new(
            ledger.clone(),
            config.escrow_fee_rate,
            config.treasury_account.clone(),
        ));
        let withdrawals = Arc::new(WithdrawalProtocol::new(
            ledger.clone(),
            chain.clone(),
            oracle,
            config.server_fee_rate,
            config.fee_quote_tolerance,
            config.fee_quote_validity,
        ));

        Self {
            config: Arc::new(config),
            ledger,
            chain,
            escrow,
            withdrawals,
            prices: Arc::new(PriceBook::new()),
        }
    }
}
