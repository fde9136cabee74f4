// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Escrow lifecycle orchestration.
//!
//! The engine is the only writer of ticket state. Every transition happens
//! under that ticket's lock with a fresh read of the stored row, so a
//! dispute that lands first always wins against a release racing it. Fund
//! movements commit in the same storage transaction as the ticket update.

use std::sync::Arc;

use chrono::Utc;
use dashmap::DashMap;
use rust_decimal::{Decimal, RoundingStrategy};
use tokio::sync::Mutex;
use tracing::{info, warn};

use crate::ledger::{Actor, BalanceLedger, EntryReason, LedgerEntry, Partition};
use crate::storage::{BalanceOp, LedgerCommit, StoreError};

use super::ticket::{
    next_status, AdminOutcome, EscrowTicket, Resolution, SwapProviderStatus, TicketEvent,
    TicketStatus, TicketType,
};

const FEE_SCALE: u32 = 8;

#[derive(Debug, thiserror::Error)]
pub enum EscrowError {
    #[error("ticket {0} not found")]
    NotFound(String),

    #[error("ticket {ticket_id} cannot {event} while {current}")]
    InvalidTransition {
        ticket_id: String,
        current: TicketStatus,
        event: &'static str,
    },

    #[error("invalid escrow amount: {0}")]
    InvalidAmount(Decimal),

    #[error(transparent)]
    Store(#[from] StoreError),
}

pub struct EscrowEngine {
    ledger: Arc<BalanceLedger>,
    /// Platform fee taken from the released amount, as a fraction.
    escrow_fee_rate: Decimal,
    /// Internal account collecting fees and forfeitures.
    treasury_account: String,
    ticket_locks: DashMap<String, Arc<Mutex<()>>>,
}

impl EscrowEngine {
    pub fn new(
        ledger: Arc<BalanceLedger>,
        escrow_fee_rate: Decimal,
        treasury_account: impl Into<String>,
    ) -> Self {
        Self {
            ledger,
            escrow_fee_rate,
            treasury_account: treasury_account.into(),
            ticket_locks: DashMap::new(),
        }
    }

    fn lock_for(&self, ticket_id: &str) -> Arc<Mutex<()>> {
        self.ticket_locks
            .entry(ticket_id.to_string())
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone()
    }

    fn load(&self, ticket_id: &str) -> Result<EscrowTicket, EscrowError> {
        self.ledger
            .db()
            .get_ticket(ticket_id)?
            .ok_or_else(|| EscrowError::NotFound(ticket_id.to_string()))
    }

    fn require_transition(
        ticket: &EscrowTicket,
        event: TicketEvent,
    ) -> Result<TicketStatus, EscrowError> {
        next_status(ticket.status, event).ok_or_else(|| EscrowError::InvalidTransition {
            ticket_id: ticket.ticket_id.clone(),
            current: ticket.status,
            event: event.name(),
        })
    }

    fn fee_for(&self, amount: Decimal) -> Decimal {
        (amount * self.escrow_fee_rate)
            .round_dp_with_strategy(FEE_SCALE, RoundingStrategy::MidpointAwayFromZero)
            .normalize()
    }

    // =========================================================================
    // Public API
    // =========================================================================

    /// Create a ticket in `created`. No funds move.
    pub async fn open(
        &self,
        ticket_type: TicketType,
        buyer_id: &str,
        seller_id: &str,
        exchanger_id: Option<String>,
        currency: &str,
        amount: Decimal,
    ) -> Result<EscrowTicket, EscrowError> {
        if amount <= Decimal::ZERO {
            return Err(EscrowError::InvalidAmount(amount));
        }
        let ticket = EscrowTicket::new(ticket_type, buyer_id, seller_id, exchanger_id, currency, amount);
        self.ledger.db().put_ticket(&ticket)?;
        info!(ticket_id = %ticket.ticket_id, ?ticket_type, currency = %ticket.currency, amount = %amount, "ticket opened");
        Ok(ticket)
    }

    /// Cancel before funding. Permitted only from `created`.
    pub async fn cancel(&self, ticket_id: &str) -> Result<EscrowTicket, EscrowError> {
        let _guard = self.lock_for(ticket_id).lock_owned().await;
        let mut ticket = self.load(ticket_id)?;
        ticket.status = Self::require_transition(&ticket, TicketEvent::Cancel)?;
        ticket.resolved_at = Some(Utc::now());
        self.ledger.db().put_ticket(&ticket)?;
        Ok(ticket)
    }

    /// Lock the buyer's funds into the ticket.
    pub async fn fund(&self, ticket_id: &str) -> Result<EscrowTicket, EscrowError> {
        let _guard = self.lock_for(ticket_id).lock_owned().await;
        let mut ticket = self.load(ticket_id)?;
        ticket.status = Self::require_transition(&ticket, TicketEvent::Fund)?;
        ticket.funded_at = Some(Utc::now());

        let entry = LedgerEntry::new(
            &ticket.buyer_id,
            &ticket.currency,
            EntryReason::EscrowLock,
            Actor::User(ticket.buyer_id.clone()),
        )
        .with_ticket(ticket_id)
        .with_delta(Partition::Available, -ticket.amount)
        .with_delta(Partition::Locked, ticket.amount);
        ticket.evidence_refs.push(entry.entry_id.clone());

        self.ledger
            .apply(
                LedgerCommit::new()
                    .op(BalanceOp::shift(
                        &ticket.buyer_id,
                        &ticket.currency,
                        Partition::Available,
                        Partition::Locked,
                        ticket.amount,
                    ))
                    .entry(entry)
                    .ticket(ticket.clone()),
            )
            .await?;
        info!(ticket_id, amount = %ticket.amount, "ticket funded");
        Ok(ticket)
    }

    /// The fulfilling party claims delivery; starts the release window.
    pub async fn assert_fulfillment(&self, ticket_id: &str) -> Result<EscrowTicket, EscrowError> {
        let _guard = self.lock_for(ticket_id).lock_owned().await;
        let ticket = self.load(ticket_id)?;
        self.assert_fulfillment_locked(ticket).await
    }

    /// Release the locked funds to the counterparty, minus the platform fee.
    ///
    /// The stored status is re-read under the ticket lock, so a dispute that
    /// committed first turns this into `InvalidTransition` instead of a
    /// payout.
    pub async fn confirm_release(
        &self,
        ticket_id: &str,
        actor: Actor,
    ) -> Result<EscrowTicket, EscrowError> {
        let _guard = self.lock_for(ticket_id).lock_owned().await;
        let ticket = self.load(ticket_id)?;
        self.confirm_release_locked(ticket, actor).await
    }

    /// Freeze the ticket for admin adjudication.
    pub async fn dispute(&self, ticket_id: &str) -> Result<EscrowTicket, EscrowError> {
        let _guard = self.lock_for(ticket_id).lock_owned().await;
        let ticket = self.load(ticket_id)?;
        self.dispute_locked(ticket).await
    }

    /// Admin adjudication of a disputed ticket.
    pub async fn resolve(
        &self,
        ticket_id: &str,
        outcome: AdminOutcome,
        admin_id: &str,
    ) -> Result<EscrowTicket, EscrowError> {
        let _guard = self.lock_for(ticket_id).lock_owned().await;
        let mut ticket = self.load(ticket_id)?;
        let next = Self::require_transition(&ticket, TicketEvent::AdminResolve(outcome))?;
        let admin = Actor::Admin(admin_id.to_string());

        match outcome {
            AdminOutcome::Complete => {
                return self.payout_locked(ticket, next, Resolution::Released, admin).await;
            }
            AdminOutcome::Refund => {
                let entry = LedgerEntry::new(
                    &ticket.buyer_id,
                    &ticket.currency,
                    EntryReason::AdminRefund,
                    admin,
                )
                .with_ticket(ticket_id)
                .with_delta(Partition::Locked, -ticket.amount)
                .with_delta(Partition::Available, ticket.amount);
                ticket.evidence_refs.push(entry.entry_id.clone());
                ticket.status = next;
                ticket.resolution = Some(Resolution::Refunded);
                ticket.resolved_at = Some(Utc::now());

                self.ledger
                    .apply(
                        LedgerCommit::new()
                            .op(BalanceOp::shift(
                                &ticket.buyer_id,
                                &ticket.currency,
                                Partition::Locked,
                                Partition::Available,
                                ticket.amount,
                            ))
                            .entry(entry)
                            .ticket(ticket.clone()),
                    )
                    .await?;
            }
            AdminOutcome::Forfeit => {
                self.ledger
                    .ensure_wallet(&self.treasury_account, &ticket.currency, "internal")
                    .await?;
                let seized = LedgerEntry::new(
                    &ticket.buyer_id,
                    &ticket.currency,
                    EntryReason::AdminSeizure,
                    admin.clone(),
                )
                .with_ticket(ticket_id)
                .with_delta(Partition::Locked, -ticket.amount);
                let retained = LedgerEntry::new(
                    &self.treasury_account,
                    &ticket.currency,
                    EntryReason::AdminSeizure,
                    admin,
                )
                .with_ticket(ticket_id)
                .with_delta(Partition::Available, ticket.amount);
                ticket.evidence_refs.push(seized.entry_id.clone());
                ticket.evidence_refs.push(retained.entry_id.clone());
                ticket.status = next;
                ticket.resolution = Some(Resolution::Forfeited);
                ticket.resolved_at = Some(Utc::now());

                self.ledger
                    .apply(
                        LedgerCommit::new()
                            .op(BalanceOp::debit(
                                &ticket.buyer_id,
                                &ticket.currency,
                                Partition::Locked,
                                ticket.amount,
                            ))
                            .op(BalanceOp::credit(
                                &self.treasury_account,
                                &ticket.currency,
                                Partition::Available,
                                ticket.amount,
                            ))
                            .entry(seized)
                            .entry(retained)
                            .ticket(ticket.clone()),
                    )
                    .await?;
            }
        }
        info!(ticket_id, ?outcome, "disputed ticket resolved");
        Ok(ticket)
    }

    /// Drive a swap ticket from an opaque provider status. Statuses can
    /// imply several steps at once (a `finished` report against a `funded`
    /// ticket both asserts fulfillment and releases).
    pub async fn apply_swap_status(
        &self,
        ticket_id: &str,
        status: SwapProviderStatus,
    ) -> Result<EscrowTicket, EscrowError> {
        let _guard = self.lock_for(ticket_id).lock_owned().await;
        let mut ticket = self.load(ticket_id)?;

        while let Some(event) = status.implied_event(ticket.status) {
            ticket = match event {
                TicketEvent::AssertFulfillment => self.assert_fulfillment_locked(ticket).await?,
                TicketEvent::ConfirmRelease => {
                    self.confirm_release_locked(ticket, Actor::System).await?
                }
                TicketEvent::RaiseDispute => self.dispute_locked(ticket).await?,
                _ => break,
            };
        }
        Ok(ticket)
    }

    /// Escalate tickets that sat in `pending_release` past their per-type
    /// timeout. Returns how many were escalated.
    ///
    /// Failures are per-ticket: a row that cannot be escalated is logged
    /// and skipped so the rest of the sweep still runs.
    pub async fn sweep_timeouts(&self) -> Result<usize, EscrowError> {
        let now = Utc::now();
        let mut escalated = 0;
        for ticket in self.ledger.db().list_active_tickets()? {
            if !ticket.release_timed_out(now) {
                continue;
            }
            let _guard = self.lock_for(&ticket.ticket_id).lock_owned().await;
            match self.escalate_timed_out(&ticket.ticket_id, now) {
                Ok(true) => escalated += 1,
                Ok(false) => {}
                Err(e) => {
                    warn!(ticket_id = %ticket.ticket_id, error = %e, "timeout escalation failed, skipping ticket");
                }
            }
        }
        Ok(escalated)
    }

    /// Re-read a ticket under its lock and escalate it if still timed out.
    /// A release or dispute may have landed since the sweep's scan.
    fn escalate_timed_out(
        &self,
        ticket_id: &str,
        now: chrono::DateTime<Utc>,
    ) -> Result<bool, EscrowError> {
        let mut ticket = self.load(ticket_id)?;
        if !ticket.release_timed_out(now) {
            return Ok(false);
        }
        ticket.status = Self::require_transition(&ticket, TicketEvent::Timeout)?;
        self.ledger.db().put_ticket(&ticket)?;
        info!(ticket_id, "pending release timed out, escalated to dispute");
        Ok(true)
    }

    pub fn ticket(&self, ticket_id: &str) -> Result<EscrowTicket, EscrowError> {
        self.load(ticket_id)
    }

    // =========================================================================
    // Locked Helpers
    // =========================================================================

    async fn assert_fulfillment_locked(
        &self,
        mut ticket: EscrowTicket,
    ) -> Result<EscrowTicket, EscrowError> {
        ticket.status = Self::require_transition(&ticket, TicketEvent::AssertFulfillment)?;
        ticket.pending_since = Some(Utc::now());
        self.ledger.db().put_ticket(&ticket)?;
        Ok(ticket)
    }

    async fn dispute_locked(&self, mut ticket: EscrowTicket) -> Result<EscrowTicket, EscrowError> {
        ticket.status = Self::require_transition(&ticket, TicketEvent::RaiseDispute)?;
        ticket.resolution = Some(Resolution::Disputed);
        self.ledger.db().put_ticket(&ticket)?;
        info!(ticket_id = %ticket.ticket_id, "ticket disputed");
        Ok(ticket)
    }

    async fn confirm_release_locked(
        &self,
        ticket: EscrowTicket,
        actor: Actor,
    ) -> Result<EscrowTicket, EscrowError> {
        let next = Self::require_transition(&ticket, TicketEvent::ConfirmRelease)?;
        self.payout_locked(ticket, next, Resolution::Released, actor).await
    }

    /// Move the locked amount to the counterparty (minus the platform fee)
    /// and finalize the ticket, all in one commit.
    async fn payout_locked(
        &self,
        mut ticket: EscrowTicket,
        next: TicketStatus,
        resolution: Resolution,
        actor: Actor,
    ) -> Result<EscrowTicket, EscrowError> {
        let fee = self.fee_for(ticket.amount);
        let net = ticket.amount - fee;

        self.ledger
            .ensure_wallet(&ticket.seller_id, &ticket.currency, "internal")
            .await?;

        let released = LedgerEntry::new(
            &ticket.buyer_id,
            &ticket.currency,
            EntryReason::EscrowRelease,
            actor.clone(),
        )
        .with_ticket(&ticket.ticket_id)
        .with_delta(Partition::Locked, -ticket.amount);
        let received = LedgerEntry::new(
            &ticket.seller_id,
            &ticket.currency,
            EntryReason::EscrowRelease,
            actor.clone(),
        )
        .with_ticket(&ticket.ticket_id)
        .with_delta(Partition::Available, net);

        let mut commit = LedgerCommit::new()
            .op(BalanceOp::debit(
                &ticket.buyer_id,
                &ticket.currency,
                Partition::Locked,
                ticket.amount,
            ))
            .op(BalanceOp::credit(
                &ticket.seller_id,
                &ticket.currency,
                Partition::Available,
                net,
            ));
        ticket.evidence_refs.push(released.entry_id.clone());
        ticket.evidence_refs.push(received.entry_id.clone());
        commit = commit.entry(released).entry(received);

        if fee > Decimal::ZERO {
            self.ledger
                .ensure_wallet(&self.treasury_account, &ticket.currency, "internal")
                .await?;
            let fee_entry = LedgerEntry::new(
                &self.treasury_account,
                &ticket.currency,
                EntryReason::EscrowFee,
                actor,
            )
            .with_ticket(&ticket.ticket_id)
            .with_delta(Partition::Available, fee);
            ticket.evidence_refs.push(fee_entry.entry_id.clone());
            commit = commit
                .op(BalanceOp::credit(
                    &self.treasury_account,
                    &ticket.currency,
                    Partition::Available,
                    fee,
                ))
                .entry(fee_entry);
        }

        ticket.status = next;
        ticket.resolution = Some(resolution);
        ticket.resolved_at = Some(Utc::now());
        commit = commit.ticket(ticket.clone());

        self.ledger.apply(commit).await?;
        info!(
            ticket_id = %ticket.ticket_id,
            seller = %ticket.seller_id,
            net = %net,
            fee = %fee,
            "escrow released"
        );
        Ok(ticket)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::LedgerDb;
    use rust_decimal_macros::dec;

    struct Fixture {
        engine: EscrowEngine,
        ledger: Arc<BalanceLedger>,
        _dir: tempfile::TempDir,
    }

    async fn fixture() -> Fixture {
        let dir = tempfile::tempdir().unwrap();
        let db = Arc::new(LedgerDb::open(&dir.path().join("ledger.redb")).unwrap());
        let ledger = Arc::new(BalanceLedger::new(db));
        let engine = EscrowEngine::new(ledger.clone(), dec!(0.01), "treasury");
        Fixture { engine, ledger, _dir: dir }
    }

    async fn seed(f: &Fixture, user: &str, currency: &str, amount: Decimal) {
        f.ledger.ensure_wallet(user, currency, "addr").await.unwrap();
        f.ledger
            .credit(user, currency, Partition::Available, amount, EntryReason::AdminAdjust, Actor::System)
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn p2p_full_release_flow() {
        let f = fixture().await;
        seed(&f, "buyer", "ETH", dec!(1.0)).await;

        let ticket = f
            .engine
            .open(TicketType::P2p, "buyer", "seller", None, "ETH", dec!(0.5))
            .await
            .unwrap();
        f.engine.fund(&ticket.ticket_id).await.unwrap();

        let buyer = f.ledger.wallet("buyer", "ETH").unwrap().unwrap();
        assert_eq!(buyer.available, dec!(0.5));
        assert_eq!(buyer.locked, dec!(0.5));

        f.engine.assert_fulfillment(&ticket.ticket_id).await.unwrap();
        let ticket = f
            .engine
            .confirm_release(&ticket.ticket_id, Actor::User("buyer".into()))
            .await
            .unwrap();

        assert_eq!(ticket.status, TicketStatus::Completed);
        assert_eq!(ticket.resolution, Some(Resolution::Released));

        let buyer = f.ledger.wallet("buyer", "ETH").unwrap().unwrap();
        let seller = f.ledger.wallet("seller", "ETH").unwrap().unwrap();
        let treasury = f.ledger.wallet("treasury", "ETH").unwrap().unwrap();
        assert_eq!(buyer.locked, Decimal::ZERO);
        assert_eq!(seller.available, dec!(0.495));
        assert_eq!(treasury.available, dec!(0.005));

        // Conservation: nothing left the system.
        let (available, locked, pending) = f.ledger.db().currency_totals("ETH").unwrap();
        assert_eq!(available + locked + pending, dec!(1.0));

        // Every movement is on the ticket's evidence trail.
        let evidence = f.ledger.db().entries_for_ticket(&ticket.ticket_id).unwrap();
        assert_eq!(evidence.len(), ticket.evidence_refs.len());
        assert_eq!(evidence.len(), 4); // lock, release, receive, fee
    }

    #[tokio::test]
    async fn funding_requires_available_balance() {
        let f = fixture().await;
        seed(&f, "buyer", "ETH", dec!(0.1)).await;

        let ticket = f
            .engine
            .open(TicketType::P2p, "buyer", "seller", None, "ETH", dec!(0.5))
            .await
            .unwrap();
        let result = f.engine.fund(&ticket.ticket_id).await;
        assert!(matches!(
            result,
            Err(EscrowError::Store(StoreError::InsufficientBalance { .. }))
        ));

        // Failed funding leaves the ticket fundable.
        let ticket = f.engine.ticket(&ticket.ticket_id).unwrap();
        assert_eq!(ticket.status, TicketStatus::Created);
        assert!(ticket.evidence_refs.is_empty());
    }

    #[tokio::test]
    async fn cancel_only_before_funding() {
        let f = fixture().await;
        seed(&f, "buyer", "BTC", dec!(1.0)).await;

        let ticket = f
            .engine
            .open(TicketType::P2p, "buyer", "seller", None, "BTC", dec!(0.2))
            .await
            .unwrap();
        f.engine.fund(&ticket.ticket_id).await.unwrap();

        let result = f.engine.cancel(&ticket.ticket_id).await;
        assert!(matches!(result, Err(EscrowError::InvalidTransition { .. })));
    }

    #[tokio::test]
    async fn dispute_blocks_release() {
        let f = fixture().await;
        seed(&f, "buyer", "BTC", dec!(1.0)).await;

        let ticket = f
            .engine
            .open(TicketType::Automm, "buyer", "seller", None, "BTC", dec!(0.4))
            .await
            .unwrap();
        f.engine.fund(&ticket.ticket_id).await.unwrap();
        f.engine.assert_fulfillment(&ticket.ticket_id).await.unwrap();
        f.engine.dispute(&ticket.ticket_id).await.unwrap();

        let result = f
            .engine
            .confirm_release(&ticket.ticket_id, Actor::User("buyer".into()))
            .await;
        assert!(matches!(
            result,
            Err(EscrowError::InvalidTransition {
                current: TicketStatus::Disputed,
                ..
            })
        ));

        // Funds stay locked until an admin adjudicates.
        let buyer = f.ledger.wallet("buyer", "BTC").unwrap().unwrap();
        assert_eq!(buyer.locked, dec!(0.4));
    }

    #[tokio::test]
    async fn admin_refund_returns_locked_funds() {
        let f = fixture().await;
        seed(&f, "buyer", "BTC", dec!(1.0)).await;

        let ticket = f
            .engine
            .open(TicketType::Automm, "buyer", "seller", None, "BTC", dec!(0.4))
            .await
            .unwrap();
        f.engine.fund(&ticket.ticket_id).await.unwrap();
        f.engine.dispute(&ticket.ticket_id).await.unwrap();

        let ticket = f
            .engine
            .resolve(&ticket.ticket_id, AdminOutcome::Refund, "admin-1")
            .await
            .unwrap();
        assert_eq!(ticket.status, TicketStatus::Refunded);
        assert_eq!(ticket.resolution, Some(Resolution::Refunded));

        let buyer = f.ledger.wallet("buyer", "BTC").unwrap().unwrap();
        assert_eq!(buyer.available, dec!(1.0));
        assert_eq!(buyer.locked, Decimal::ZERO);
    }

    #[tokio::test]
    async fn admin_forfeit_seizes_to_treasury() {
        let f = fixture().await;
        seed(&f, "buyer", "BTC", dec!(1.0)).await;

        let ticket = f
            .engine
            .open(TicketType::P2p, "buyer", "seller", None, "BTC", dec!(0.3))
            .await
            .unwrap();
        f.engine.fund(&ticket.ticket_id).await.unwrap();
        f.engine.dispute(&ticket.ticket_id).await.unwrap();

        let ticket = f
            .engine
            .resolve(&ticket.ticket_id, AdminOutcome::Forfeit, "admin-1")
            .await
            .unwrap();
        assert_eq!(ticket.status, TicketStatus::Forfeited);

        let buyer = f.ledger.wallet("buyer", "BTC").unwrap().unwrap();
        let treasury = f.ledger.wallet("treasury", "BTC").unwrap().unwrap();
        assert_eq!(buyer.locked, Decimal::ZERO);
        assert_eq!(treasury.available, dec!(0.3));
    }

    #[tokio::test]
    async fn admin_complete_pays_the_counterparty() {
        let f = fixture().await;
        seed(&f, "buyer", "BTC", dec!(1.0)).await;

        let ticket = f
            .engine
            .open(TicketType::P2p, "buyer", "seller", None, "BTC", dec!(0.2))
            .await
            .unwrap();
        f.engine.fund(&ticket.ticket_id).await.unwrap();
        f.engine.dispute(&ticket.ticket_id).await.unwrap();

        let ticket = f
            .engine
            .resolve(&ticket.ticket_id, AdminOutcome::Complete, "admin-1")
            .await
            .unwrap();
        assert_eq!(ticket.status, TicketStatus::Completed);

        let seller = f.ledger.wallet("seller", "BTC").unwrap().unwrap();
        assert_eq!(seller.available, dec!(0.198));
    }

    #[tokio::test]
    async fn swap_finished_from_funded_releases_in_one_call() {
        let f = fixture().await;
        seed(&f, "buyer", "BTC", dec!(1.0)).await;

        let ticket = f
            .engine
            .open(TicketType::Swap, "buyer", "swap-desk", None, "BTC", dec!(0.6))
            .await
            .unwrap();
        f.engine.fund(&ticket.ticket_id).await.unwrap();

        let ticket = f
            .engine
            .apply_swap_status(&ticket.ticket_id, SwapProviderStatus::Finished)
            .await
            .unwrap();
        assert_eq!(ticket.status, TicketStatus::Completed);

        let desk = f.ledger.wallet("swap-desk", "BTC").unwrap().unwrap();
        assert_eq!(desk.available, dec!(0.594));
    }

    #[tokio::test]
    async fn swap_failure_freezes_the_ticket() {
        let f = fixture().await;
        seed(&f, "buyer", "BTC", dec!(1.0)).await;

        let ticket = f
            .engine
            .open(TicketType::Swap, "buyer", "swap-desk", None, "BTC", dec!(0.6))
            .await
            .unwrap();
        f.engine.fund(&ticket.ticket_id).await.unwrap();

        // Waiting/confirming are no-ops.
        let ticket = f
            .engine
            .apply_swap_status(&ticket.ticket_id, SwapProviderStatus::Confirming)
            .await
            .unwrap();
        assert_eq!(ticket.status, TicketStatus::Funded);

        let ticket = f
            .engine
            .apply_swap_status(&ticket.ticket_id, SwapProviderStatus::Failed)
            .await
            .unwrap();
        assert_eq!(ticket.status, TicketStatus::Disputed);

        let buyer = f.ledger.wallet("buyer", "BTC").unwrap().unwrap();
        assert_eq!(buyer.locked, dec!(0.6));
    }

    #[tokio::test]
    async fn sweep_escalates_only_timed_out_tickets() {
        let f = fixture().await;
        seed(&f, "buyer", "BTC", dec!(2.0)).await;

        let stale = f
            .engine
            .open(TicketType::Automm, "buyer", "seller", None, "BTC", dec!(0.1))
            .await
            .unwrap();
        f.engine.fund(&stale.ticket_id).await.unwrap();
        f.engine.assert_fulfillment(&stale.ticket_id).await.unwrap();

        let fresh = f
            .engine
            .open(TicketType::Automm, "buyer", "seller", None, "BTC", dec!(0.1))
            .await
            .unwrap();
        f.engine.fund(&fresh.ticket_id).await.unwrap();
        f.engine.assert_fulfillment(&fresh.ticket_id).await.unwrap();

        // Backdate one ticket past the AutoMM window.
        let mut backdated = f.engine.ticket(&stale.ticket_id).unwrap();
        backdated.pending_since = Some(Utc::now() - chrono::Duration::hours(1));
        f.ledger.db().put_ticket(&backdated).unwrap();

        let escalated = f.engine.sweep_timeouts().await.unwrap();
        assert_eq!(escalated, 1);
        assert_eq!(f.engine.ticket(&stale.ticket_id).unwrap().status, TicketStatus::Disputed);
        assert_eq!(f.engine.ticket(&fresh.ticket_id).unwrap().status, TicketStatus::PendingRelease);
    }

    #[tokio::test]
    async fn sweep_survives_a_damaged_ticket_row() {
        let f = fixture().await;
        seed(&f, "buyer", "BTC", dec!(1.0)).await;

        let ticket = f
            .engine
            .open(TicketType::Automm, "buyer", "seller", None, "BTC", dec!(0.1))
            .await
            .unwrap();
        f.engine.fund(&ticket.ticket_id).await.unwrap();
        f.engine.assert_fulfillment(&ticket.ticket_id).await.unwrap();

        let mut backdated = f.engine.ticket(&ticket.ticket_id).unwrap();
        backdated.pending_since = Some(Utc::now() - chrono::Duration::hours(1));
        f.ledger.db().put_ticket(&backdated).unwrap();

        // A row that no longer parses must not stall the sweep.
        f.ledger.db().put_raw_ticket("broken", b"not json").unwrap();

        let escalated = f.engine.sweep_timeouts().await.unwrap();
        assert_eq!(escalated, 1);
        assert_eq!(
            f.engine.ticket(&ticket.ticket_id).unwrap().status,
            TicketStatus::Disputed
        );
    }

    #[tokio::test]
    async fn automm_timeout_then_refund_scenario() {
        let f = fixture().await;
        seed(&f, "buyer", "BTC", dec!(1.0)).await;

        let ticket = f
            .engine
            .open(TicketType::Automm, "buyer", "vendor", None, "BTC", dec!(0.25))
            .await
            .unwrap();
        f.engine.fund(&ticket.ticket_id).await.unwrap();
        f.engine.assert_fulfillment(&ticket.ticket_id).await.unwrap();

        let mut backdated = f.engine.ticket(&ticket.ticket_id).unwrap();
        backdated.pending_since = Some(Utc::now() - chrono::Duration::hours(2));
        f.ledger.db().put_ticket(&backdated).unwrap();

        assert_eq!(f.engine.sweep_timeouts().await.unwrap(), 1);
        f.engine
            .resolve(&ticket.ticket_id, AdminOutcome::Refund, "admin-1")
            .await
            .unwrap();

        let buyer = f.ledger.wallet("buyer", "BTC").unwrap().unwrap();
        assert_eq!(buyer.available, dec!(1.0));
        assert_eq!(buyer.locked, Decimal::ZERO);

        // The adjudication itself left exactly one refund entry on the
        // ticket's evidence trail.
        let evidence = f.ledger.db().entries_for_ticket(&ticket.ticket_id).unwrap();
        let refunds = evidence
            .iter()
            .filter(|e| e.reason == EntryReason::AdminRefund)
            .count();
        assert_eq!(refunds, 1);
    }

    #[tokio::test]
    async fn open_rejects_non_positive_amount() {
        let f = fixture().await;
        let result = f
            .engine
            .open(TicketType::P2p, "buyer", "seller", None, "BTC", Decimal::ZERO)
            .await;
        assert!(matches!(result, Err(EscrowError::InvalidAmount(_))));
    }
}
