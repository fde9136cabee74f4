// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! # Escrow Sweeper
//!
//! Background task escalating tickets stuck in `pending_release` past their
//! per-type timeout to `disputed`, where an admin adjudicates them. P2P
//! tickets have no timeout and are never touched.

use std::sync::Arc;
use std::time::Duration;

use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::escrow::EscrowEngine;

pub struct EscrowSweeper {
    engine: Arc<EscrowEngine>,
    sweep_interval: Duration,
}

impl EscrowSweeper {
    pub fn new(engine: Arc<EscrowEngine>, sweep_interval: Duration) -> Self {
        Self {
            engine,
            sweep_interval,
        }
    }

    /// Run the sweep loop until the cancellation token is triggered.
    pub async fn run(self, shutdown: CancellationToken) {
        info!(
            interval_secs = self.sweep_interval.as_secs(),
            "Escrow sweeper starting"
        );

        loop {
            if shutdown.is_cancelled() {
                info!("Escrow sweeper shutting down");
                return;
            }

            match self.engine.sweep_timeouts().await {
                Ok(0) => {}
                Ok(escalated) => info!(escalated, "Escrow sweep escalated timed-out tickets"),
                Err(e) => warn!(error = %e, "Escrow sweep failed"),
            }

            tokio::select! {
                _ = tokio::time::sleep(self.sweep_interval) => {},
                _ = shutdown.cancelled() => {
                    info!("Escrow sweeper shutting down");
                    return;
                }
            }
        }
    }
}
