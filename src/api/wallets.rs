// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Wallet views, wallet generation, and manual deposit sync.

use axum::extract::State;
use axum::Json;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::auth::Auth;
use crate::chain::SyncReport;
use crate::error::ApiError;
use crate::ledger::WalletRecord;
use crate::state::AppState;

#[derive(Debug, Serialize)]
pub struct WalletView {
    pub currency: String,
    pub address: String,
    pub available: Decimal,
    pub locked: Decimal,
    pub pending: Decimal,
    pub total: Decimal,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub usd_value: Option<Decimal>,
}

impl WalletView {
    fn from_record(record: WalletRecord, state: &AppState) -> Self {
        let total = record.total();
        Self {
            usd_value: state.prices.usd_value(&record.currency, total),
            currency: record.currency,
            address: record.address,
            available: record.available,
            locked: record.locked,
            pending: record.pending,
            total,
        }
    }
}

/// `GET /v1/wallet` - every wallet of the calling user.
pub async fn list_wallets(
    State(state): State<AppState>,
    Auth(principal): Auth,
) -> Result<Json<Vec<WalletView>>, ApiError> {
    let wallets = state
        .ledger
        .wallets(&principal.id)?
        .into_iter()
        .map(|w| WalletView::from_record(w, &state))
        .collect();
    Ok(Json(wallets))
}

#[derive(Debug, Deserialize)]
pub struct CreateWalletRequest {
    pub currency: String,
}

/// `POST /v1/wallet` - generate a deposit address for a currency.
pub async fn create_wallet(
    State(state): State<AppState>,
    Auth(principal): Auth,
    Json(request): Json<CreateWalletRequest>,
) -> Result<Json<WalletView>, ApiError> {
    let wallet = state
        .chain
        .generate_wallet(&principal.id, &request.currency)
        .await?;
    Ok(Json(WalletView::from_record(wallet, &state)))
}

#[derive(Debug, Deserialize)]
pub struct SyncRequest {
    /// Sync only this currency; omitted means every wallet the user has.
    #[serde(default)]
    pub currency: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct SyncResponse {
    pub currency: String,
    #[serde(flatten)]
    pub report: SyncReport,
}

/// `POST /v1/wallet/sync` - run a deposit sync pass on demand.
pub async fn sync_wallets(
    State(state): State<AppState>,
    Auth(principal): Auth,
    Json(request): Json<SyncRequest>,
) -> Result<Json<Vec<SyncResponse>>, ApiError> {
    let currencies: Vec<String> = match request.currency {
        Some(currency) => vec![currency],
        None => state
            .ledger
            .wallets(&principal.id)?
            .into_iter()
            .map(|w| w.currency)
            .collect(),
    };

    let mut results = Vec::with_capacity(currencies.len());
    for currency in currencies {
        let report = state.chain.sync_deposits(&principal.id, &currency).await?;
        results.push(SyncResponse {
            currency: crate::ledger::normalize_currency(&currency),
            report,
        });
    }
    Ok(Json(results))
}
