// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Escrow ticket data model and the pure transition table.
//!
//! One state machine serves all three ticket types; type-specific behavior
//! (timeouts, auto-confirm source) lives in a small [`TicketPolicy`] table
//! rather than separate hierarchies.

use std::time::Duration;

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::ledger::types::normalize_currency;

/// Kind of mediated exchange.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TicketType {
    P2p,
    Automm,
    Swap,
}

/// Per-type lifecycle policy.
#[derive(Debug, Clone, Copy)]
pub struct TicketPolicy {
    /// How long a ticket may sit in `pending_release` before it escalates
    /// to `disputed`. `None` means it waits for manual action (P2P).
    pub pending_release_timeout: Option<Duration>,
    /// Whether release confirmation comes from an automated source
    /// (provider callback or timer) rather than a counterparty click.
    pub auto_confirm: bool,
}

impl TicketType {
    pub fn policy(&self) -> TicketPolicy {
        match self {
            TicketType::P2p => TicketPolicy {
                pending_release_timeout: None,
                auto_confirm: false,
            },
            TicketType::Automm => TicketPolicy {
                pending_release_timeout: Some(Duration::from_secs(30 * 60)),
                auto_confirm: true,
            },
            TicketType::Swap => TicketPolicy {
                pending_release_timeout: Some(Duration::from_secs(2 * 60 * 60)),
                auto_confirm: true,
            },
        }
    }
}

/// Ticket lifecycle states.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TicketStatus {
    Created,
    Funded,
    PendingRelease,
    Disputed,
    Completed,
    Refunded,
    Forfeited,
    Cancelled,
}

impl TicketStatus {
    /// Terminal states admit no further transitions.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            TicketStatus::Completed
                | TicketStatus::Refunded
                | TicketStatus::Forfeited
                | TicketStatus::Cancelled
        )
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            TicketStatus::Created => "created",
            TicketStatus::Funded => "funded",
            TicketStatus::PendingRelease => "pending_release",
            TicketStatus::Disputed => "disputed",
            TicketStatus::Completed => "completed",
            TicketStatus::Refunded => "refunded",
            TicketStatus::Forfeited => "forfeited",
            TicketStatus::Cancelled => "cancelled",
        }
    }
}

impl std::fmt::Display for TicketStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Outcome recorded on a resolved ticket.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Resolution {
    Released,
    Refunded,
    Forfeited,
    Disputed,
}

/// Admin adjudication outcomes for a disputed ticket.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AdminOutcome {
    /// Funds to the counterparty (the dispute winner).
    Complete,
    /// Funds back to the depositor.
    Refund,
    /// Funds retained by the platform.
    Forfeit,
}

/// Events that drive the state machine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TicketEvent {
    Cancel,
    Fund,
    AssertFulfillment,
    ConfirmRelease,
    RaiseDispute,
    AdminResolve(AdminOutcome),
    Timeout,
}

impl TicketEvent {
    pub fn name(&self) -> &'static str {
        match self {
            TicketEvent::Cancel => "cancel",
            TicketEvent::Fund => "fund",
            TicketEvent::AssertFulfillment => "assert_fulfillment",
            TicketEvent::ConfirmRelease => "confirm_release",
            TicketEvent::RaiseDispute => "raise_dispute",
            TicketEvent::AdminResolve(_) => "admin_resolve",
            TicketEvent::Timeout => "timeout",
        }
    }
}

/// The complete transition table. Returns `None` for anything not listed,
/// which callers surface as `InvalidTransition` without touching state.
pub fn next_status(current: TicketStatus, event: TicketEvent) -> Option<TicketStatus> {
    use TicketStatus::*;
    match (current, event) {
        // Cancellation is only permitted before funds are locked.
        (Created, TicketEvent::Cancel) => Some(Cancelled),
        (Created, TicketEvent::Fund) => Some(Funded),
        (Funded, TicketEvent::AssertFulfillment) => Some(PendingRelease),
        (Funded, TicketEvent::RaiseDispute) => Some(Disputed),
        (PendingRelease, TicketEvent::ConfirmRelease) => Some(Completed),
        (PendingRelease, TicketEvent::RaiseDispute) => Some(Disputed),
        (PendingRelease, TicketEvent::Timeout) => Some(Disputed),
        (Disputed, TicketEvent::AdminResolve(AdminOutcome::Complete)) => Some(Completed),
        (Disputed, TicketEvent::AdminResolve(AdminOutcome::Refund)) => Some(Refunded),
        (Disputed, TicketEvent::AdminResolve(AdminOutcome::Forfeit)) => Some(Forfeited),
        _ => None,
    }
}

/// Status enum reported by the opaque swap provider.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SwapProviderStatus {
    Waiting,
    Confirming,
    Exchanging,
    Sending,
    Finished,
    Failed,
    Expired,
}

impl SwapProviderStatus {
    /// Map a provider status onto the event that moves the ticket toward
    /// the corresponding lifecycle state. `None` means no transition is
    /// implied (the ticket is already where the provider says it is).
    pub fn implied_event(&self, current: TicketStatus) -> Option<TicketEvent> {
        match self {
            // Provider still waiting on or confirming the deposit; the
            // ticket reaches `funded` through the deposit path, not here.
            SwapProviderStatus::Waiting | SwapProviderStatus::Confirming => None,
            SwapProviderStatus::Exchanging | SwapProviderStatus::Sending => {
                (current == TicketStatus::Funded).then_some(TicketEvent::AssertFulfillment)
            }
            SwapProviderStatus::Finished => match current {
                TicketStatus::Funded => Some(TicketEvent::AssertFulfillment),
                TicketStatus::PendingRelease => Some(TicketEvent::ConfirmRelease),
                _ => None,
            },
            SwapProviderStatus::Failed | SwapProviderStatus::Expired => {
                matches!(current, TicketStatus::Funded | TicketStatus::PendingRelease)
                    .then_some(TicketEvent::RaiseDispute)
            }
        }
    }
}

/// One P2P, AutoMM, or Swap transaction. Owned exclusively by the escrow
/// engine; the ledger references tickets only through entry `ticket_id`s.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct EscrowTicket {
    pub ticket_id: String,
    pub ticket_type: TicketType,
    /// The depositing party whose funds are locked.
    pub buyer_id: String,
    /// The counterparty receiving funds on release.
    pub seller_id: String,
    /// Optional assigned exchanger (P2P middleman).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub exchanger_id: Option<String>,
    pub currency: String,
    pub amount: Decimal,
    pub status: TicketStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub resolution: Option<Resolution>,
    /// Ledger entry ids recorded for this ticket, for dispute evidence.
    pub evidence_refs: Vec<String>,
    pub created_at: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub funded_at: Option<DateTime<Utc>>,
    /// Set when the ticket enters `pending_release`; drives timeouts.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pending_since: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub resolved_at: Option<DateTime<Utc>>,
}

impl EscrowTicket {
    pub fn new(
        ticket_type: TicketType,
        buyer_id: impl Into<String>,
        seller_id: impl Into<String>,
        exchanger_id: Option<String>,
        currency: &str,
        amount: Decimal,
    ) -> Self {
        Self {
            ticket_id: uuid::Uuid::new_v4().to_string(),
            ticket_type,
            buyer_id: buyer_id.into(),
            seller_id: seller_id.into(),
            exchanger_id,
            currency: normalize_currency(currency),
            amount,
            status: TicketStatus::Created,
            resolution: None,
            evidence_refs: Vec::new(),
            created_at: Utc::now(),
            funded_at: None,
            pending_since: None,
            resolved_at: None,
        }
    }

    /// Whether the per-type pending-release timeout has elapsed.
    pub fn release_timed_out(&self, now: DateTime<Utc>) -> bool {
        if self.status != TicketStatus::PendingRelease {
            return false;
        }
        let Some(timeout) = self.ticket_type.policy().pending_release_timeout else {
            return false;
        };
        let Some(since) = self.pending_since else {
            return false;
        };
        now.signed_duration_since(since).to_std().map_or(false, |elapsed| elapsed >= timeout)
    }
}
