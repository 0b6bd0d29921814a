//! Authentication extractors.
//!
//! Two API-key extractors guard the HTTP surface:
//! - `ServiceAuth` for the application backend and workflow callbacks
//! - `AdminAuth` for operator-only endpoints (manual adjustments)
//!
//! The service is called by the trusted application backend, never by
//! browsers; end-user session handling lives upstream. Keys are compared
//! in constant time.

use std::sync::Arc;

use axum::extract::FromRequestParts;
use axum::http::request::Parts;

use crate::crypto::constant_time_eq;
use crate::error::ApiError;
use crate::state::AppState;

fn header_str<'p>(parts: &'p Parts, name: &str) -> Option<&'p str> {
    parts.headers.get(name).and_then(|v| v.to_str().ok())
}

/// Check a presented key against the configured one.
///
/// An unconfigured key rejects everything rather than letting requests
/// through unauthenticated.
fn require_key(presented: Option<&str>, configured: Option<&String>) -> Result<(), ApiError> {
    match (presented, configured) {
        (Some(presented), Some(expected)) if constant_time_eq(presented, expected) => Ok(()),
        _ => Err(ApiError::Unauthorized),
    }
}

/// Service authentication via the `X-API-Key` header.
#[derive(Debug, Clone)]
pub struct ServiceAuth {
    /// The calling service's self-reported name, for audit logging.
    pub service_name: String,
}

impl FromRequestParts<Arc<AppState>> for ServiceAuth {
    type Rejection = ApiError;

    fn from_request_parts<'life0, 'life1, 'async_trait>(
        parts: &'life0 mut Parts,
        state: &'life1 Arc<AppState>,
    ) -> ::core::pin::Pin<
        Box<
            dyn ::core::future::Future<Output = Result<Self, Self::Rejection>>
                + ::core::marker::Send
                + 'async_trait,
        >,
    >
    where
        'life0: 'async_trait,
        'life1: 'async_trait,
        Self: 'async_trait,
    {
        Box::pin(async move {
            require_key(
                header_str(parts, "x-api-key"),
                state.config.service_api_key.as_ref(),
            )?;

            let service_name = header_str(parts, "x-service-name")
                .unwrap_or("unknown")
                .to_string();

            Ok(ServiceAuth { service_name })
        })
    }
}

/// Operator authentication via the `X-Admin-Key` header.
///
/// The admin key is distinct from the service key; handlers that move
/// tokens outside the normal ledger operations require it.
#[derive(Debug, Clone)]
pub struct AdminAuth {
    /// Operator identifier, for audit logging.
    pub admin_id: String,
}

impl FromRequestParts<Arc<AppState>> for AdminAuth {
    type Rejection = ApiError;

    fn from_request_parts<'life0, 'life1, 'async_trait>(
        parts: &'life0 mut Parts,
        state: &'life1 Arc<AppState>,
    ) -> ::core::pin::Pin<
        Box<
            dyn ::core::future::Future<Output = Result<Self, Self::Rejection>>
                + ::core::marker::Send
                + 'async_trait,
        >,
    >
    where
        'life0: 'async_trait,
        'life1: 'async_trait,
        Self: 'async_trait,
    {
        Box::pin(async move {
            require_key(
                header_str(parts, "x-admin-key"),
                state.config.admin_api_key.as_ref(),
            )?;

            let admin_id = header_str(parts, "x-admin-id").unwrap_or("admin").to_string();

            Ok(AdminAuth { admin_id })
        })
    }
}
