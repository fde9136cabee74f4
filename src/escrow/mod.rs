// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Escrow tickets: the unified P2P / AutoMM / Swap state machine and the
//! engine that drives it against the ledger.

pub mod engine;
pub mod ticket;

pub use engine::{EscrowEngine, EscrowError};
pub use ticket::{
    AdminOutcome, EscrowTicket, Resolution, SwapProviderStatus, TicketEvent, TicketStatus,
    TicketType,
};
