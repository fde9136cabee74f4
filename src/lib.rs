// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Escrow Wallet Server - custodial multi-currency ledger with escrow.
//!
//! Users hold per-currency balances split into `available`, `locked`, and
//! `pending` partitions. Deposits flow in from chain providers, withdrawals
//! flow out through a two-phase fee-quote protocol, and funds moving between
//! users pass through escrow tickets (P2P, AutoMM, Swap) driven by a single
//! state machine. Every balance change commits atomically with an immutable
//! audit entry.
//!
//! ## Modules
//!
//! - `api` - HTTP API handlers (Axum)
//! - `auth` - Request identity and role checks
//! - `ledger` - Balance partitions and the append-only audit log
//! - `escrow` - Ticket state machine and engine
//! - `chain` - Deposit sync, key material, withdrawal broadcast
//! - `withdraw` - Two-phase withdrawal protocol
//! - `vault` - AES-256-GCM sealing of custodial signing keys
//! - `storage` - Embedded redb database
//! - `tasks` - Background deposit poller and escrow sweeper

pub mod api;
pub mod auth;
pub mod chain;
pub mod config;
pub mod error;
pub mod escrow;
pub mod ledger;
pub mod pricing;
pub mod state;
pub mod storage;
pub mod tasks;
pub mod vault;
pub mod withdraw;
