//! Response shapes and error-to-status mapping.
//!
//! # Responsibilities
//! - Verdict bodies for URL and file validation
//! - Map rejections, rate-limit denials, reorder conflicts and store
//!   failures to status codes
//!
//! # Design Decisions
//! - Validation rejections → 400, security rejections → 422
//! - Security messages are generic unless `security.expose_rejection_details`;
//!   the stable `code` is always present
//! - Internal failures are logged in full and answered with a fixed message

use axum::{
    http::{header, HeaderValue, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use serde_json::json;
use thiserror::Error;

use crate::ordering::{ReorderError, StoreError};
use crate::security::{CombinedDecision, FileRecord, Rejection};

pub const GENERIC_SECURITY_MESSAGE: &str = "Rejected by security policy";

pub fn rejection_status(rejection: &Rejection) -> StatusCode {
    if rejection.kind.is_security() {
        StatusCode::UNPROCESSABLE_ENTITY
    } else {
        StatusCode::BAD_REQUEST
    }
}

/// Message safe to return to the client.
pub fn public_message(rejection: &Rejection, expose_details: bool) -> String {
    if rejection.kind.is_security() && !expose_details {
        GENERIC_SECURITY_MESSAGE.to_string()
    } else {
        rejection.message.clone()
    }
}

#[derive(Debug, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UrlVerdict {
    pub valid: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub code: Option<&'static str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sanitized_url: Option<String>,
}

#[derive(Debug, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FileVerdict {
    pub valid: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub code: Option<&'static str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sanitized_filename: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sha256_hash: Option<String>,
}

impl From<&FileRecord> for FileVerdict {
    fn from(record: &FileRecord) -> Self {
        Self {
            valid: true,
            sanitized_filename: Some(record.sanitized_filename.clone()),
            sha256_hash: Some(record.sha256_hex()),
            ..Self::default()
        }
    }
}

/// Answer for a rejected URL or file.
pub fn rejected(rejection: &Rejection, expose_details: bool) -> Response {
    let body = json!({
        "valid": false,
        "error": public_message(rejection, expose_details),
        "code": rejection.code(),
    });
    (rejection_status(rejection), Json(body)).into_response()
}

/// 429 with a Retry-After hint derived from the window reset.
pub fn rate_limited(decision: &CombinedDecision) -> Response {
    let retry_after = decision.retry_after_secs();
    let body = json!({
        "error": "Too many requests",
        "reason": decision.reason,
        "retryAfterSecs": retry_after,
        "resetInMs": decision.reset_in_ms,
    });
    let mut response = (StatusCode::TOO_MANY_REQUESTS, Json(body)).into_response();
    let headers = response.headers_mut();
    headers.insert(header::RETRY_AFTER, HeaderValue::from(retry_after));
    headers.insert("x-ratelimit-remaining", HeaderValue::from(0u32));
    headers.insert("x-ratelimit-reset-ms", HeaderValue::from(decision.reset_in_ms));
    response
}

#[derive(Debug, Error)]
pub enum ApiError {
    #[error("Missing owner identity")]
    MissingOwner,

    #[error(transparent)]
    Reorder(#[from] ReorderError),

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error("{0}")]
    Internal(String),
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        match self {
            ApiError::MissingOwner => (
                StatusCode::UNAUTHORIZED,
                Json(json!({ "error": "Missing owner identity" })),
            )
                .into_response(),
            ApiError::Reorder(ReorderError::Validation(message)) => {
                (StatusCode::BAD_REQUEST, Json(json!({ "error": message }))).into_response()
            }
            ApiError::Reorder(ReorderError::Conflict { id, applied }) => (
                StatusCode::CONFLICT,
                Json(json!({
                    "error": "Items changed since they were read",
                    "conflict": true,
                    "refetch": true,
                    "id": id,
                    "applied": applied,
                })),
            )
                .into_response(),
            ApiError::Reorder(ReorderError::Store(e)) | ApiError::Store(e) => {
                tracing::error!(error = %e, "Order store failure");
                internal_error()
            }
            ApiError::Internal(message) => {
                tracing::error!(error = %message, "Internal error");
                internal_error()
            }
        }
    }
}

fn internal_error() -> Response {
    (
        StatusCode::INTERNAL_SERVER_ERROR,
        Json(json!({ "error": "Internal error" })),
    )
        .into_response()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::security::{ErrorKind, LimitScope};

    #[test]
    fn test_rejection_status_by_category() {
        let validation = Rejection::new(ErrorKind::TooLong, "URL is too long");
        let security = Rejection::new(ErrorKind::PrivateAddress, "Private or local address");
        assert_eq!(rejection_status(&validation), StatusCode::BAD_REQUEST);
        assert_eq!(rejection_status(&security), StatusCode::UNPROCESSABLE_ENTITY);
    }

    #[test]
    fn test_security_messages_are_masked() {
        let security = Rejection::new(ErrorKind::SignatureMismatch, "File content does not match PDF");
        assert_eq!(public_message(&security, false), GENERIC_SECURITY_MESSAGE);
        assert_eq!(public_message(&security, true), "File content does not match PDF");

        let validation = Rejection::new(ErrorKind::Empty, "URL is empty");
        assert_eq!(public_message(&validation, false), "URL is empty");
    }

    #[test]
    fn test_rate_limited_sets_retry_after() {
        let decision = CombinedDecision {
            allowed: false,
            reason: Some(LimitScope::User),
            remaining: 0,
            reset_in_ms: 1500,
        };
        let response = rate_limited(&decision);
        assert_eq!(response.status(), StatusCode::TOO_MANY_REQUESTS);
        assert_eq!(response.headers()[header::RETRY_AFTER], "2");
    }

    #[test]
    fn test_conflict_maps_to_409() {
        let response = ApiError::from(ReorderError::Conflict { id: 4, applied: 1 }).into_response();
        assert_eq!(response.status(), StatusCode::CONFLICT);

        let response = ApiError::from(ReorderError::Validation("bad".into())).into_response();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);

        let response = ApiError::from(StoreError::Unavailable("down".into())).into_response();
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    }
}
