// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Request identity.
//!
//! The server sits behind a fronting proxy that authenticates the session
//! and forwards the caller's identity in `X-Actor-Id` / `X-Actor-Role`
//! headers. The [`Auth`] extractor turns those into a [`Principal`];
//! requests without an identity are rejected with 401 before any handler
//! logic runs.

use axum::extract::FromRequestParts;
use axum::http::request::Parts;
use serde::Serialize;

use crate::error::ApiError;
use crate::ledger::Actor;

pub const ACTOR_ID_HEADER: &str = "x-actor-id";
pub const ACTOR_ROLE_HEADER: &str = "x-actor-role";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    User,
    Admin,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Principal {
    pub id: String,
    pub role: Role,
}

impl Principal {
    pub fn is_admin(&self) -> bool {
        self.role == Role::Admin
    }

    /// The audit-log actor for operations this principal initiates.
    pub fn actor(&self) -> Actor {
        match self.role {
            Role::User => Actor::User(self.id.clone()),
            Role::Admin => Actor::Admin(self.id.clone()),
        }
    }

    /// 403 unless the principal is this user or an admin.
    pub fn authorize_user(&self, user_id: &str) -> Result<(), ApiError> {
        if self.is_admin() || self.id == user_id {
            Ok(())
        } else {
            Err(ApiError::forbidden("not permitted for this account"))
        }
    }

    /// 403 unless the principal is an admin.
    pub fn require_admin(&self) -> Result<(), ApiError> {
        if self.is_admin() {
            Ok(())
        } else {
            Err(ApiError::forbidden("admin role required"))
        }
    }
}

/// Extractor wrapper so handlers can take `Auth(principal): Auth`.
#[derive(Debug, Clone)]
pub struct Auth(pub Principal);

impl<S> FromRequestParts<S> for Auth
where
    S: Send + Sync,
{
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let id = parts
            .headers
            .get(ACTOR_ID_HEADER)
            .and_then(|v| v.to_str().ok())
            .map(str::trim)
            .filter(|v| !v.is_empty())
            .ok_or_else(|| {
                ApiError::new(
                    axum::http::StatusCode::UNAUTHORIZED,
                    "missing actor identity",
                )
            })?
            .to_string();

        let role = match parts
            .headers
            .get(ACTOR_ROLE_HEADER)
            .and_then(|v| v.to_str().ok())
            .map(|v| v.trim().to_ascii_lowercase())
            .as_deref()
        {
            Some("admin") => Role::Admin,
            _ => Role::User,
        };

        Ok(Auth(Principal { id, role }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::Request;

    async fn extract(request: Request<()>) -> Result<Auth, ApiError> {
        let (mut parts, _) = request.into_parts();
        Auth::from_request_parts(&mut parts, &()).await
    }

    #[tokio::test]
    async fn missing_identity_is_unauthorized() {
        let result = extract(Request::builder().body(()).unwrap()).await;
        assert_eq!(
            result.unwrap_err().status,
            axum::http::StatusCode::UNAUTHORIZED
        );
    }

    #[tokio::test]
    async fn user_identity_extracted() {
        let request = Request::builder()
            .header("X-Actor-Id", "u1")
            .body(())
            .unwrap();
        let Auth(principal) = extract(request).await.unwrap();
        assert_eq!(principal.id, "u1");
        assert_eq!(principal.role, Role::User);
        assert_eq!(principal.actor(), Actor::User("u1".to_string()));
    }

    #[tokio::test]
    async fn admin_role_recognized() {
        let request = Request::builder()
            .header("X-Actor-Id", "a-1")
            .header("X-Actor-Role", "Admin")
            .body(())
            .unwrap();
        let Auth(principal) = extract(request).await.unwrap();
        assert!(principal.is_admin());
        assert!(principal.require_admin().is_ok());
        assert!(principal.authorize_user("someone-else").is_ok());
    }

    #[tokio::test]
    async fn user_cannot_act_for_others() {
        let request = Request::builder()
            .header("X-Actor-Id", "u1")
            .body(())
            .unwrap();
        let Auth(principal) = extract(request).await.unwrap();
        assert!(principal.authorize_user("u1").is_ok());
        assert_eq!(
            principal.authorize_user("u2").unwrap_err().status,
            axum::http::StatusCode::FORBIDDEN
        );
    }
}
