// SPDX-FileCopyrightText: 2026 Parlo Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Bearer-token authentication middleware.
//!
//! Two layers share one bearer scheme (`Authorization: Bearer <token>`):
//! the admin layer guards `/bot/*` with the configured admin token, and
//! the operator layer resolves the token against operator records and
//! hands the matched [`Operator`] to the handler via request extensions.
//! A gateway with no admin token configured rejects every admin request
//! (fail-closed).

use std::sync::Arc;

use axum::extract::{Request, State};
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};
use parlo_core::error::ParloError;
use parlo_core::traits::store::ConversationStore;

use crate::envelope::ApiError;

/// State shared by both auth layers.
#[derive(Clone)]
pub struct AuthState {
    pub admin_token: Option<String>,
    pub store: Arc<dyn ConversationStore>,
}

impl std::fmt::Debug for AuthState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AuthState")
            .field("admin_token", &self.admin_token.as_ref().map(|_| "[redacted]"))
            .finish()
    }
}

fn bearer_token(request: &Request) -> Option<&str> {
    request
        .headers()
        .get("authorization")
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "))
}

fn unauthorized(message: &str) -> Response {
    ApiError(ParloError::Unauthorized(message.to_string())).into_response()
}

/// Admin guard for the `/bot/*` surface.
pub async fn admin_auth(State(auth): State<AuthState>, request: Request, next: Next) -> Response {
    let Some(expected) = auth.admin_token.as_deref() else {
        tracing::warn!("admin request rejected: no admin token configured");
        return unauthorized("admin surface is disabled");
    };
    match bearer_token(&request) {
        Some(token) if token == expected => next.run(request).await,
        _ => unauthorized("admin token required"),
    }
}

/// Operator guard. On success the matched [`Operator`] record is attached
/// to the request extensions.
///
/// The admin token is also accepted, but carries no operator identity, so
/// endpoints that act *as* an operator still require an operator token.
///
/// [`Operator`]: parlo_core::types::Operator
pub async fn operator_auth(
    State(auth): State<AuthState>,
    mut request: Request,
    next: Next,
) -> Response {
    let Some(token) = bearer_token(&request) else {
        return unauthorized("operator token required");
    };
    match auth.store.find_operator_by_token(token).await {
        Ok(Some(operator)) => {
            request.extensions_mut().insert(operator);
            next.run(request).await
        }
        Ok(None) => unauthorized("unknown operator token"),
        Err(e) => ApiError(e).into_response(),
    }
}
