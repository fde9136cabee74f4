// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Two-phase withdrawal endpoints: fee preview, execute, history.

use axum::extract::{Query, State};
use axum::Json;
use rust_decimal::Decimal;
use serde::Deserialize;

use crate::auth::Auth;
use crate::error::ApiError;
use crate::state::AppState;
use crate::storage::WithdrawalRecord;
use crate::withdraw::{AcceptedFees, FeeQuote, WithdrawalAmount};

const DEFAULT_HISTORY_LIMIT: usize = 50;

#[derive(Debug, Deserialize)]
pub struct PreviewRequest {
    pub currency: String,
    /// A decimal amount, or the literal string `"max"` to sweep the
    /// available balance.
    pub amount: String,
}

fn parse_amount(raw: &str) -> Result<WithdrawalAmount, ApiError> {
    if raw.trim().eq_ignore_ascii_case("max") {
        return Ok(WithdrawalAmount::Max);
    }
    raw.trim()
        .parse::<Decimal>()
        .map(WithdrawalAmount::Amount)
        .map_err(|_| ApiError::bad_request(format!("unparseable amount: {raw}")))
}

/// `POST /v1/withdrawals/preview` - stateless fee quote.
pub async fn preview(
    State(state): State<AppState>,
    Auth(principal): Auth,
    Json(request): Json<PreviewRequest>,
) -> Result<Json<FeeQuote>, ApiError> {
    let amount = parse_amount(&request.amount)?;
    let quote = state
        .withdrawals
        .preview(&principal.id, &request.currency, amount)
        .await?;
    Ok(Json(quote))
}

#[derive(Debug, Deserialize)]
pub struct ExecuteRequest {
    pub currency: String,
    pub amount: Decimal,
    /// The fees from the quote the client is accepting.
    pub network_fee: Decimal,
    pub server_fee: Decimal,
    pub to_address: String,
}

/// `POST /v1/withdrawals` - debit, sign, and broadcast.
///
/// Responds with the withdrawal record either way; a failed broadcast
/// comes back with `status: "failed"` and the balance already restored.
pub async fn execute(
    State(state): State<AppState>,
    Auth(principal): Auth,
    Json(request): Json<ExecuteRequest>,
) -> Result<Json<WithdrawalRecord>, ApiError> {
    if request.to_address.trim().is_empty() {
        return Err(ApiError::bad_request("destination address is required"));
    }
    let record = state
        .withdrawals
        .execute(
            &principal.id,
            &request.currency,
            request.amount,
            AcceptedFees {
                network_fee: request.network_fee,
                server_fee: request.server_fee,
            },
            request.to_address.trim(),
        )
        .await?;
    Ok(Json(record))
}

#[derive(Debug, Deserialize)]
pub struct HistoryQuery {
    #[serde(default)]
    pub limit: Option<usize>,
}

/// `GET /v1/withdrawals` - newest-first withdrawal history.
pub async fn history(
    State(state): State<AppState>,
    Auth(principal): Auth,
    Query(query): Query<HistoryQuery>,
) -> Result<Json<Vec<WithdrawalRecord>>, ApiError> {
    let limit = query.limit.unwrap_or(DEFAULT_HISTORY_LIMIT).min(500);
    Ok(Json(state.withdrawals.history(&principal.id, limit)?))
}
