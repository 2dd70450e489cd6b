// SPDX-FileCopyrightText: 2026 Palaver Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Admin authentication.
//!
//! Admin endpoints and admin WebSocket peers present the configured bearer
//! token, either as `Authorization: Bearer <token>` or, for browsers that
//! cannot set headers on a WebSocket upgrade, as `?token=<token>`.
//!
//! When no token is configured, every admin request is rejected (fail-closed).

use std::sync::Arc;

use axum::{
    Json,
    extract::{Request, State},
    http::StatusCode,
    middleware::Next,
    response::{IntoResponse, Response},
};
use axum_extra::{
    TypedHeader,
    headers::{Authorization, authorization::Bearer},
};

use palaver_core::protocol::ErrorResponse;

/// The admin credential, if one is configured.
#[derive(Clone, Default)]
pub struct AdminAuth {
    token: Option<Arc<str>>,
}

impl std::fmt::Debug for AdminAuth {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AdminAuth")
            .field("token", &self.token.as_ref().map(|_| "[redacted]"))
            .finish()
    }
}

impl AdminAuth {
    /// Blank tokens count as unset.
    pub fn new(token: Option<&str>) -> Self {
        Self {
            token: token
                .map(str::trim)
                .filter(|t| !t.is_empty())
                .map(Arc::from),
        }
    }

    /// Whether admin access is possible at all.
    pub fn is_configured(&self) -> bool {
        self.token.is_some()
    }

    /// Whether `presented` matches the configured token.
    pub fn verify(&self, presented: &str) -> bool {
        self.token
            .as_deref()
            .is_some_and(|expected| expected.as_bytes() == presented.as_bytes())
    }

    /// Checks the header credential first, then the query credential.
    pub fn is_admin(&self, bearer: Option<&str>, query_token: Option<&str>) -> bool {
        bearer.is_some_and(|t| self.verify(t)) || query_token.is_some_and(|t| self.verify(t))
    }
}

/// Route layer guarding the admin endpoints.
pub async fn require_admin(
    State(auth): State<AdminAuth>,
    bearer: Option<TypedHeader<Authorization<Bearer>>>,
    request: Request,
    next: Next,
) -> Response {
    if !auth.is_configured() {
        tracing::error!("no admin token configured -- rejecting admin request");
        return unauthorized();
    }

    let presented = bearer.as_ref().map(|TypedHeader(header)| header.token());
    if auth.is_admin(presented, None) {
        next.run(request).await
    } else {
        tracing::debug!(path = %request.uri().path(), "admin request rejected");
        unauthorized()
    }
}

fn unauthorized() -> Response {
    (
        StatusCode::UNAUTHORIZED,
        Json(ErrorResponse {
            error: "Authentication required".to_string(),
        }),
    )
        .into_response()
}
