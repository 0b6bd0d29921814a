//! API error types and responses.
//!
//! Handlers return `ApiError`; the `IntoResponse` impl renders the coded
//! JSON envelope the application backend switches on. `insufficient_tokens`
//! is the one code the UI treats specially: it carries the balance and the
//! required amount so the frontend can render a topup/upgrade prompt.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Serialize;

use adsmith_store::StoreError;

/// API error type.
#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    /// Unauthorized - missing or invalid credentials.
    #[error("unauthorized")]
    Unauthorized,

    /// Resource not found.
    #[error("not found: {0}")]
    NotFound(String),

    /// Bad request - invalid input.
    #[error("bad request: {0}")]
    BadRequest(String),

    /// Conflict - invalid state transition.
    #[error("conflict: {0}")]
    Conflict(String),

    /// Insufficient tokens for the requested work.
    #[error("insufficient tokens: balance={balance}, required={required}")]
    InsufficientTokens {
        /// Current token balance.
        balance: i64,
        /// Required token amount.
        required: i64,
    },

    /// Internal server error.
    #[error("internal error: {0}")]
    Internal(String),
}

impl ApiError {
    const fn status(&self) -> StatusCode {
        match self {
            Self::Unauthorized => StatusCode::UNAUTHORIZED,
            Self::NotFound(_) => StatusCode::NOT_FOUND,
            Self::BadRequest(_) => StatusCode::BAD_REQUEST,
            Self::Conflict(_) => StatusCode::CONFLICT,
            Self::InsufficientTokens { .. } => StatusCode::PAYMENT_REQUIRED,
            Self::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    const fn code(&self) -> &'static str {
        match self {
            Self::Unauthorized => "unauthorized",
            Self::NotFound(_) => "not_found",
            Self::BadRequest(_) => "bad_request",
            Self::Conflict(_) => "conflict",
            Self::InsufficientTokens { .. } => "insufficient_tokens",
            Self::Internal(_) => "internal_error",
        }
    }
}

/// JSON envelope for error responses:
/// `{ "error": { "code", "message", "details"? } }`.
#[derive(Debug, Serialize)]
struct ErrorEnvelope {
    error: ErrorDetail,
}

#[derive(Debug, Serialize)]
struct ErrorDetail {
    code: &'static str,
    message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    details: Option<serde_json::Value>,
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        // Internal details stay in the logs; the caller sees a generic body.
        let message = if let Self::Internal(msg) = &self {
            tracing::error!(error = %msg, "internal error serving request");
            "An internal error occurred".to_string()
        } else {
            self.to_string()
        };

        let details = match &self {
            Self::InsufficientTokens { balance, required } => Some(serde_json::json!({
                "balance": balance,
                "required": required,
            })),
            _ => None,
        };

        let body = ErrorEnvelope {
            error: ErrorDetail {
                code: self.code(),
                message,
                details,
            },
        };

        (self.status(), Json(body)).into_response()
    }
}

impl From<StoreError> for ApiError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::NotFound { entity, id } => Self::NotFound(format!("{entity} not found: {id}")),
            StoreError::InsufficientTokens { balance, required } => {
                Self::InsufficientTokens { balance, required }
            }
            StoreError::InvalidTransition { from, to } => {
                Self::Conflict(format!("invalid job transition: {from:?} -> {to:?}"))
            }
            StoreError::InvalidAmount(msg) => Self::BadRequest(msg),
            StoreError::Database(msg) | StoreError::Serialization(msg) => Self::Internal(msg),
        }
    }
}
