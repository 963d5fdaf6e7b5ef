// SPDX-FileCopyrightText: 2026 Parlo Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! The uniform response envelope of the HTTP surface.
//!
//! Success: `{"success": true, "message": <payload>}`.
//! Error: `{"success": false, "code": <u16>, "message": <string>}` where
//! the code comes from [`ParloError::code`] and is part of the external
//! contract. Internal errors are logged with full detail but cross the
//! boundary as a generic message; no stack traces leak outward.

use axum::Json;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use parlo_core::error::ParloError;
use serde_json::json;

/// Wrap a payload in the success envelope.
pub fn ok(message: serde_json::Value) -> Json<serde_json::Value> {
    Json(json!({"success": true, "message": message}))
}

/// A [`ParloError`] crossing the HTTP boundary.
pub struct ApiError(pub ParloError);

impl From<ParloError> for ApiError {
    fn from(e: ParloError) -> Self {
        Self(e)
    }
}

/// HTTP status for a stable error code.
pub fn status_for(code: u16) -> StatusCode {
    match code {
        1400 => StatusCode::BAD_REQUEST,
        1401 => StatusCode::UNAUTHORIZED,
        1404 => StatusCode::NOT_FOUND,
        1409 => StatusCode::CONFLICT,
        _ => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

/// The error envelope body for a code and message.
pub fn error_body(code: u16, message: &str) -> serde_json::Value {
    json!({"success": false, "code": code, "message": message})
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let code = self.0.code();
        let message = if code == 1500 {
            tracing::error!(error = %self.0, "request failed");
            "internal error".to_string()
        } else {
            if self.0.is_conflict() {
                tracing::info!(error = %self.0, "request conflicted");
            }
            self.0.to_string()
        };
        (status_for(code), Json(error_body(code, &message))).into_response()
    }
}

#[cfg(test)]
mod tests {
    use parlo_core::error::ConflictKind;

    use super::*;

    #[test]
    fn status_mapping_follows_the_stable_codes() {
        assert_eq!(status_for(1400), StatusCode::BAD_REQUEST);
        assert_eq!(status_for(1401), StatusCode::UNAUTHORIZED);
        assert_eq!(status_for(1404), StatusCode::NOT_FOUND);
        assert_eq!(status_for(1409), StatusCode::CONFLICT);
        assert_eq!(status_for(1500), StatusCode::INTERNAL_SERVER_ERROR);
    }

    #[test]
    fn success_envelope_shape() {
        let Json(body) = ok(json!({"id": "abc"}));
        assert_eq!(body["success"], true);
        assert_eq!(body["message"]["id"], "abc");
    }

    #[test]
    fn error_envelope_shape() {
        let body = error_body(1409, "conflict: session is already busy");
        assert_eq!(body["success"], false);
        assert_eq!(body["code"], 1409);
        assert!(body["message"].as_str().unwrap().contains("busy"));
    }

    #[test]
    fn internal_errors_do_not_leak_detail() {
        let response =
            ApiError(ParloError::Internal("sqlite disk io at /var/db".into())).into_response();
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    }

    #[test]
    fn conflicts_map_to_409() {
        let response =
            ApiError(ParloError::Conflict(ConflictKind::RatingAlreadySet)).into_response();
        assert_eq!(response.status(), StatusCode::CONFLICT);
    }
}
