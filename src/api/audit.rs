// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Read-only audit log views.

use axum::extract::{Path, Query, State};
use axum::Json;
use serde::Deserialize;

use crate::auth::Auth;
use crate::error::ApiError;
use crate::ledger::LedgerEntry;
use crate::state::AppState;

const DEFAULT_AUDIT_LIMIT: usize = 100;

#[derive(Debug, Deserialize)]
pub struct AuditQuery {
    pub currency: String,
    #[serde(default)]
    pub limit: Option<usize>,
}

/// `GET /v1/audit` - newest-first ledger entries for the caller's wallet.
pub async fn wallet_audit(
    State(state): State<AppState>,
    Auth(principal): Auth,
    Query(query): Query<AuditQuery>,
) -> Result<Json<Vec<LedgerEntry>>, ApiError> {
    let limit = query.limit.unwrap_or(DEFAULT_AUDIT_LIMIT).min(1000);
    let entries = state
        .ledger
        .db()
        .entries_for_wallet(&principal.id, &query.currency, limit)?;
    Ok(Json(entries))
}

/// `GET /v1/audit/tickets/{ticket_id}` - every entry recorded against a
/// ticket, the evidence bundle for dispute adjudication.
pub async fn ticket_audit(
    State(state): State<AppState>,
    Auth(principal): Auth,
    Path(ticket_id): Path<String>,
) -> Result<Json<Vec<LedgerEntry>>, ApiError> {
    let ticket = state.escrow.ticket(&ticket_id)?;
    let is_party = principal.id == ticket.buyer_id
        || principal.id == ticket.seller_id
        || ticket.exchanger_id.as_deref() == Some(principal.id.as_str());
    if !principal.is_admin() && !is_party {
        return Err(ApiError::forbidden("not a party to this ticket"));
    }
    Ok(Json(state.ledger.db().entries_for_ticket(&ticket_id)?))
}
