// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Background tasks: deposit polling and escrow timeout sweeping.

pub mod deposit_poller;
pub mod escrow_sweeper;

pub use deposit_poller::DepositPoller;
pub use escrow_sweeper::EscrowSweeper;
