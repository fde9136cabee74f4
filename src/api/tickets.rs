// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Escrow ticket endpoints.
//!
//! Party checks live here; the engine itself only enforces lifecycle
//! legality. A buyer funds and releases, the fulfilling side asserts
//! delivery, any party can dispute, and only admins adjudicate.

use axum::extract::{Path, Query, State};
use axum::Json;
use rust_decimal::Decimal;
use serde::Deserialize;

use crate::auth::{Auth, Principal};
use crate::error::ApiError;
use crate::escrow::{AdminOutcome, EscrowTicket, SwapProviderStatus, TicketStatus, TicketType};
use crate::state::AppState;

fn require_party(ticket: &EscrowTicket, principal: &Principal) -> Result<(), ApiError> {
    let is_party = principal.id == ticket.buyer_id
        || principal.id == ticket.seller_id
        || ticket.exchanger_id.as_deref() == Some(principal.id.as_str());
    if principal.is_admin() || is_party {
        Ok(())
    } else {
        Err(ApiError::forbidden("not a party to this ticket"))
    }
}

#[derive(Debug, Deserialize)]
pub struct CreateTicketRequest {
    pub ticket_type: TicketType,
    pub seller_id: String,
    #[serde(default)]
    pub exchanger_id: Option<String>,
    pub currency: String,
    pub amount: Decimal,
}

/// `POST /v1/tickets` - open a ticket with the caller as the depositor.
pub async fn create(
    State(state): State<AppState>,
    Auth(principal): Auth,
    Json(request): Json<CreateTicketRequest>,
) -> Result<Json<EscrowTicket>, ApiError> {
    let ticket = state
        .escrow
        .open(
            request.ticket_type,
            &principal.id,
            &request.seller_id,
            request.exchanger_id,
            &request.currency,
            request.amount,
        )
        .await?;
    Ok(Json(ticket))
}

#[derive(Debug, Deserialize)]
pub struct ListQuery {
    #[serde(default)]
    pub status: Option<TicketStatus>,
}

/// `GET /v1/tickets` - admin view of tickets, optionally filtered by state
/// (the dispute queue is `?status=disputed`).
pub async fn list(
    State(state): State<AppState>,
    Auth(principal): Auth,
    Query(query): Query<ListQuery>,
) -> Result<Json<Vec<EscrowTicket>>, ApiError> {
    principal.require_admin()?;
    let tickets = match query.status {
        Some(status) => state.ledger.db().list_tickets_by_status(status)?,
        None => state.ledger.db().list_active_tickets()?,
    };
    Ok(Json(tickets))
}

/// `GET /v1/tickets/{ticket_id}` - ticket detail, parties and admins only.
pub async fn get(
    State(state): State<AppState>,
    Auth(principal): Auth,
    Path(ticket_id): Path<String>,
) -> Result<Json<EscrowTicket>, ApiError> {
    let ticket = state.escrow.ticket(&ticket_id)?;
    require_party(&ticket, &principal)?;
    Ok(Json(ticket))
}

/// `POST /v1/tickets/{ticket_id}/cancel` - depositor backs out pre-funding.
pub async fn cancel(
    State(state): State<AppState>,
    Auth(principal): Auth,
    Path(ticket_id): Path<String>,
) -> Result<Json<EscrowTicket>, ApiError> {
    let ticket = state.escrow.ticket(&ticket_id)?;
    principal.authorize_user(&ticket.buyer_id)?;
    Ok(Json(state.escrow.cancel(&ticket_id).await?))
}

/// `POST /v1/tickets/{ticket_id}/fund` - lock the depositor's funds.
pub async fn fund(
    State(state): State<AppState>,
    Auth(principal): Auth,
    Path(ticket_id): Path<String>,
) -> Result<Json<EscrowTicket>, ApiError> {
    let ticket = state.escrow.ticket(&ticket_id)?;
    principal.authorize_user(&ticket.buyer_id)?;
    Ok(Json(state.escrow.fund(&ticket_id).await?))
}

/// `POST /v1/tickets/{ticket_id}/fulfill` - counterparty claims delivery.
pub async fn fulfill(
    State(state): State<AppState>,
    Auth(principal): Auth,
    Path(ticket_id): Path<String>,
) -> Result<Json<EscrowTicket>, ApiError> {
    let ticket = state.escrow.ticket(&ticket_id)?;
    let is_fulfiller = principal.id == ticket.seller_id
        || ticket.exchanger_id.as_deref() == Some(principal.id.as_str());
    if !principal.is_admin() && !is_fulfiller {
        return Err(ApiError::forbidden("only the fulfilling party can assert delivery"));
    }
    Ok(Json(state.escrow.assert_fulfillment(&ticket_id).await?))
}

/// `POST /v1/tickets/{ticket_id}/release` - depositor confirms and pays out.
pub async fn release(
    State(state): State<AppState>,
    Auth(principal): Auth,
    Path(ticket_id): Path<String>,
) -> Result<Json<EscrowTicket>, ApiError> {
    let ticket = state.escrow.ticket(&ticket_id)?;
    principal.authorize_user(&ticket.buyer_id)?;
    Ok(Json(
        state
            .escrow
            .confirm_release(&ticket_id, principal.actor())
            .await?,
    ))
}

/// `POST /v1/tickets/{ticket_id}/dispute` - any party freezes the ticket.
pub async fn dispute(
    State(state): State<AppState>,
    Auth(principal): Auth,
    Path(ticket_id): Path<String>,
) -> Result<Json<EscrowTicket>, ApiError> {
    let ticket = state.escrow.ticket(&ticket_id)?;
    require_party(&ticket, &principal)?;
    Ok(Json(state.escrow.dispute(&ticket_id).await?))
}

#[derive(Debug, Deserialize)]
pub struct ResolveRequest {
    pub outcome: AdminOutcome,
}

/// `POST /v1/tickets/{ticket_id}/resolve` - admin adjudication.
pub async fn resolve(
    State(state): State<AppState>,
    Auth(principal): Auth,
    Path(ticket_id): Path<String>,
    Json(request): Json<ResolveRequest>,
) -> Result<Json<EscrowTicket>, ApiError> {
    principal.require_admin()?;
    Ok(Json(
        state
            .escrow
            .resolve(&ticket_id, request.outcome, &principal.id)
            .await?,
    ))
}

#[derive(Debug, Deserialize)]
pub struct SwapStatusRequest {
    pub status: SwapProviderStatus,
}

/// `POST /v1/tickets/{ticket_id}/swap-status` - ingest a swap provider
/// status report (trusted callers only).
pub async fn swap_status(
    State(state): State<AppState>,
    Auth(principal): Auth,
    Path(ticket_id): Path<String>,
    Json(request): Json<SwapStatusRequest>,
) -> Result<Json<EscrowTicket>, ApiError> {
    principal.require_admin()?;
    Ok(Json(
        state
            .escrow
            .apply_swap_status(&ticket_id, request.status)
            .await?,
    ))
}
