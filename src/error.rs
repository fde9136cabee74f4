// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;

use crate::chain::ChainError;
use crate::escrow::EscrowError;
use crate::storage::StoreError;
use crate::vault::VaultError;
use crate::withdraw::WithdrawError;

#[derive(Debug)]
pub struct ApiError {
    pub status: StatusCode,
    pub message: String,
}

#[derive(Serialize)]
struct ErrorBody {
    error: String,
}

impl ApiError {
    pub fn new(status: StatusCode, message: impl Into<String>) -> Self {
        Self {
            status,
            message: message.into(),
        }
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        Self::new(StatusCode::NOT_FOUND, message)
    }

    pub fn bad_request(message: impl Into<String>) -> Self {
        Self::new(StatusCode::BAD_REQUEST, message)
    }

    pub fn unprocessable(message: impl Into<String>) -> Self {
        Self::new(StatusCode::UNPROCESSABLE_ENTITY, message)
    }

    pub fn conflict(message: impl Into<String>) -> Self {
        Self::new(StatusCode::CONFLICT, message)
    }

    pub fn forbidden(message: impl Into<String>) -> Self {
        Self::new(StatusCode::FORBIDDEN, message)
    }

    pub fn internal(message: impl Into<String>) -> Self {
        Self::new(StatusCode::INTERNAL_SERVER_ERROR, message)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let body = Json(ErrorBody {
            error: self.message,
        });
        (self.status, body).into_response()
    }
}

impl From<StoreError> for ApiError {
    fn from(e: StoreError) -> Self {
        match &e {
            StoreError::UnknownWallet { .. } | StoreError::NotFound(_) => {
                ApiError::not_found(e.to_string())
            }
            StoreError::InsufficientBalance { .. } => ApiError::unprocessable(e.to_string()),
            StoreError::WalletExists { .. } => ApiError::conflict(e.to_string()),
            StoreError::InvalidAmount(_) => ApiError::bad_request(e.to_string()),
            _ => ApiError::internal(e.to_string()),
        }
    }
}

impl From<EscrowError> for ApiError {
    fn from(e: EscrowError) -> Self {
        match &e {
            EscrowError::NotFound(_) => ApiError::not_found(e.to_string()),
            // The message carries the current state so the caller can
            // refresh instead of blindly retrying.
            EscrowError::InvalidTransition { .. } => ApiError::conflict(e.to_string()),
            EscrowError::InvalidAmount(_) => ApiError::bad_request(e.to_string()),
            EscrowError::Store(inner) => {
                // Preserve the store mapping (422 for insufficient funds).
                match inner {
                    StoreError::InsufficientBalance { .. } => ApiError::unprocessable(e.to_string()),
                    StoreError::UnknownWallet { .. } | StoreError::NotFound(_) => {
                        ApiError::not_found(e.to_string())
                    }
                    _ => ApiError::internal(e.to_string()),
                }
            }
        }
    }
}

impl From<WithdrawError> for ApiError {
    fn from(e: WithdrawError) -> Self {
        match &e {
            WithdrawError::StaleFeeQuote { .. } => ApiError::conflict(e.to_string()),
            WithdrawError::InvalidAmount(_) => ApiError::bad_request(e.to_string()),
            WithdrawError::Store(inner) => match inner {
                StoreError::InsufficientBalance { .. } => ApiError::unprocessable(e.to_string()),
                StoreError::UnknownWallet { .. } | StoreError::NotFound(_) => {
                    ApiError::not_found(e.to_string())
                }
                _ => ApiError::internal(e.to_string()),
            },
            WithdrawError::Chain(inner) => chain_api_error(inner),
        }
    }
}

impl From<ChainError> for ApiError {
    fn from(e: ChainError) -> Self {
        chain_api_error(&e)
    }
}

fn chain_api_error(e: &ChainError) -> ApiError {
    match e {
        ChainError::ProviderUnavailable(_) => {
            ApiError::new(StatusCode::SERVICE_UNAVAILABLE, e.to_string())
        }
        ChainError::Store(StoreError::UnknownWallet { .. })
        | ChainError::Store(StoreError::NotFound(_)) => ApiError::not_found(e.to_string()),
        _ => ApiError::internal(e.to_string()),
    }
}

impl From<VaultError> for ApiError {
    fn from(e: VaultError) -> Self {
        ApiError::internal(e.to_string())
    }
}
