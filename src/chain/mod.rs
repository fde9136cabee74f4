// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! On-chain side of the ledger: wallet generation, deposit sync, and
//! withdrawal broadcast.

pub mod keys;
pub mod provider;
pub mod sync;

pub use provider::{ChainProvider, HttpChainProvider, ProviderDeposit};
pub use sync::{ChainSync, SyncReport};

use crate::storage::StoreError;
use crate::vault::VaultError;

#[derive(Debug, thiserror::Error)]
pub enum ChainError {
    #[error("chain provider unavailable: {0}")]
    ProviderUnavailable(String),

    #[error("invalid provider response: {0}")]
    InvalidResponse(String),

    #[error("signing error: {0}")]
    Signing(String),

    #[error(transparent)]
    Vault(#[from] VaultError),

    #[error(transparent)]
    Store(#[from] StoreError),
}
