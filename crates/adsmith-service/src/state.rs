//! Application state.

use std::sync::Arc;

use adsmith_store::RocksStore;

use crate::config::ServiceConfig;

/// Application state shared across handlers.
#[derive(Clone)]
pub struct AppState {
    /// The storage backend.
    pub store: Arc<RocksStore>,

    /// Service configuration.
    pub config: ServiceConfig,
}

impl AppState {
    /// Create a new application state.
    #[must_use]
    pub fn new(store: Arc<RocksStore>, config: ServiceConfig) -> Self {
        if config.service_api_key.is_none() {
            tracing::warn!("SERVICE_API_KEY not configured - /v1 routes will reject all requests");
        }
        if config.stripe_webhook_secret.is_none() {
            tracing::warn!(
                "Stripe webhook_secret not configured - webhook signatures will not be verified"
            );
        }

        Self { store, config }
    }
}
