// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

use axum::{
    routing::{get, post},
    Router,
};
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

use crate::state::AppState;

pub mod audit;
pub mod health;
pub mod tickets;
pub mod wallets;
pub mod withdrawals;

pub fn router(state: AppState) -> Router {
    let v1_routes = Router::new()
        .route("/health", get(health::health))
        .route(
            "/wallet",
            get(wallets::list_wallets).post(wallets::create_wallet),
        )
        .route("/wallet/sync", post(wallets::sync_wallets))
        .route("/withdrawals", get(withdrawals::history).post(withdrawals::execute))
        .route("/withdrawals/preview", post(withdrawals::preview))
        .route("/tickets", get(tickets::list).post(tickets::create))
        .route("/tickets/{ticket_id}", get(tickets::get))
        .route("/tickets/{ticket_id}/cancel", post(tickets::cancel))
        .route("/tickets/{ticket_id}/fund", post(tickets::fund))
        .route("/tickets/{ticket_id}/fulfill", post(tickets::fulfill))
        .route("/tickets/{ticket_id}/release", post(tickets::release))
        .route("/tickets/{ticket_id}/dispute", post(tickets::dispute))
        .route("/tickets/{ticket_id}/resolve", post(tickets::resolve))
        .route("/tickets/{ticket_id}/swap-status", post(tickets::swap_status))
        .route("/audit", get(audit::wallet_audit))
        .route("/audit/tickets/{ticket_id}", get(audit::ticket_audit))
        .with_state(state);

    Router::new()
        .nest("/v1", v1_routes)
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::chain::provider::mock::MockProvider;
    use crate::config::Config;
    use crate::storage::LedgerDb;
    use crate::vault::KeyVault;
    use crate::withdraw::FixedFeeOracle;

    use axum::body::{to_bytes, Body};
    use axum::http::{Request, StatusCode};
    use rust_decimal_macros::dec;
    use tower::ServiceExt;

    fn test_state() -> (AppState, tempfile::TempDir) {
        let dir = tempfile::tempdir().unwrap();
        let db = Arc::new(LedgerDb::open(&dir.path().join("ledger.redb")).unwrap());
        let vault = Arc::new(
            KeyVault::from_base64(&KeyVault::generate_master_key().unwrap()).unwrap(),
        );
        let state = AppState::new(
            Config::default(),
            db,
            vault,
            Arc::new(MockProvider::new()),
            Arc::new(FixedFeeOracle::new()),
        );
        (state, dir)
    }

    fn as_user(user: &str) -> Request<Body> {
        Request::builder()
            .uri("/v1/wallet")
            .header("X-Actor-Id", user)
            .body(Body::empty())
            .unwrap()
    }

    #[tokio::test]
    async fn health_endpoint_responds() {
        let (state, _dir) = test_state();
        let app = router(state);
        let response = app
            .oneshot(
                Request::builder()
                    .uri("/v1/health")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn wallet_routes_require_identity() {
        let (state, _dir) = test_state();
        let app = router(state);
        let response = app
            .oneshot(
                Request::builder()
                    .uri("/v1/wallet")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn wallet_create_and_list_round_trip() {
        let (state, _dir) = test_state();
        let app = router(state);

        let response = app
            .clone()
            .oneshot(
                Request::builder()
                    .method("POST")
                    .uri("/v1/wallet")
                    .header("X-Actor-Id", "u1")
                    .header("content-type", "application/json")
                    .body(Body::from(r#"{"currency":"btc"}"#))
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        let response = app.oneshot(as_user("u1")).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let body = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let wallets: serde_json::Value = serde_json::from_slice(&body).unwrap();
        assert_eq!(wallets.as_array().unwrap().len(), 1);
        assert_eq!(wallets[0]["currency"], "BTC");
        assert_eq!(wallets[0]["available"], "0");
    }

    #[tokio::test]
    async fn withdrawal_preview_returns_fee_breakdown() {
        let (state, _dir) = test_state();

        // Seed a funded wallet directly through the service graph.
        state.chain.generate_wallet("u1", "BTC").await.unwrap();
        state
            .ledger
            .credit(
                "u1",
                "BTC",
                crate::ledger::Partition::Available,
                dec!(2),
                crate::ledger::EntryReason::AdminAdjust,
                crate::ledger::Actor::System,
            )
            .await
            .unwrap();

        let app = router(state);
        let response = app
            .oneshot(
                Request::builder()
                    .method("POST")
                    .uri("/v1/withdrawals/preview")
                    .header("X-Actor-Id", "u1")
                    .header("content-type", "application/json")
                    .body(Body::from(r#"{"currency":"BTC","amount":"1.0"}"#))
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let body = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let quote: serde_json::Value = serde_json::from_slice(&body).unwrap();
        assert_eq!(quote["network_fee"], "0.0001");
        assert_eq!(quote["server_fee"], "0.0002");
        assert_eq!(quote["total_deducted"], "1.0003");
    }

    #[tokio::test]
    async fn ticket_resolution_is_admin_only() {
        let (state, _dir) = test_state();

        state.chain.generate_wallet("buyer", "BTC").await.unwrap();
        state
            .ledger
            .credit(
                "buyer",
                "BTC",
                crate::ledger::Partition::Available,
                dec!(1),
                crate::ledger::EntryReason::AdminAdjust,
                crate::ledger::Actor::System,
            )
            .await
            .unwrap();
        let ticket = state
            .escrow
            .open(
                crate::escrow::TicketType::P2p,
                "buyer",
                "seller",
                None,
                "BTC",
                dec!(0.5),
            )
            .await
            .unwrap();
        state.escrow.fund(&ticket.ticket_id).await.unwrap();
        state.escrow.dispute(&ticket.ticket_id).await.unwrap();

        let app = router(state);
        let resolve = |actor: &str, role: &str| {
            Request::builder()
                .method("POST")
                .uri(format!("/v1/tickets/{}/resolve", ticket.ticket_id))
                .header("X-Actor-Id", actor)
                .header("X-Actor-Role", role)
                .header("content-type", "application/json")
                .body(Body::from(r#"{"outcome":"refund"}"#))
                .unwrap()
        };

        let response = app.clone().oneshot(resolve("buyer", "user")).await.unwrap();
        assert_eq!(response.status(), StatusCode::FORBIDDEN);

        let response = app.oneshot(resolve("admin-1", "admin")).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
    }
}
