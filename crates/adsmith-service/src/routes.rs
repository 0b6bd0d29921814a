//! Router configuration.
//!
//! One public health route, the `/v1` API behind the service key, and the
//! Stripe webhook surface behind signature verification. Concurrency
//! limits, CORS, body-size, timeout, and tracing layers wrap the lot.

use std::sync::Arc;
use std::time::Duration;

use axum::routing::{get, post};
use axum::Router;
use tower::limit::ConcurrencyLimitLayer;
use tower_http::cors::{Any, CorsLayer};
use tower_http::limit::RequestBodyLimitLayer;
use tower_http::timeout::TimeoutLayer;
use tower_http::trace::TraceLayer;

use crate::handlers::{accounts, health, jobs, tokens, webhooks};
use crate::state::AppState;

/// Concurrency cap for the job endpoints, the high-volume paths (every
/// generation request and workflow callback lands here).
const JOB_ROUTE_CONCURRENCY: usize = 100;

/// Concurrency cap for the rest of the `/v1` API.
const API_ROUTE_CONCURRENCY: usize = 50;

/// Create the service router with all routes and middleware.
///
/// # Routes
///
/// ## Public
/// - `GET /health` - Health check
///
/// ## Accounts and tokens (service API key auth)
/// - `POST /v1/accounts` - Provision an account
/// - `GET /v1/accounts/:user_id` - Account and balance
/// - `GET /v1/tokens/:user_id/balance` - Balance, optional sufficiency check
/// - `GET /v1/tokens/:user_id/ledger` - Ledger history
/// - `GET /v1/tokens/:user_id/verify` - Ledger replay audit
/// - `POST /v1/tokens/adjust` - Operator adjustment (admin key)
///
/// ## Jobs (service API key auth, higher concurrency limit)
/// - `POST /v1/jobs` - Reserve tokens and create a job
/// - `GET /v1/jobs` - List a user's jobs
/// - `GET /v1/jobs/:job_id` - Get a job
/// - `POST /v1/jobs/:job_id/status` - Workflow status callback
///
/// ## Webhooks (signature verification)
/// - `POST /webhooks/stripe` - Stripe webhooks
pub fn create_router(state: AppState) -> Router {
    let cors = cors_layer(&state.config.cors_origins);
    let body_limit = RequestBodyLimitLayer::new(state.config.max_body_bytes);
    let timeout = TimeoutLayer::new(Duration::from_secs(state.config.request_timeout_seconds));

    let job_routes = Router::new()
        .route("/", post(jobs::create_job).get(jobs::list_jobs))
        .route("/:job_id", get(jobs::get_job))
        .route("/:job_id/status", post(jobs::transition_job))
        .layer(ConcurrencyLimitLayer::new(JOB_ROUTE_CONCURRENCY));

    let api_routes = Router::new()
        .route("/accounts", post(accounts::create_account))
        .route("/accounts/:user_id", get(accounts::get_account))
        .route("/tokens/:user_id/balance", get(tokens::get_balance))
        .route("/tokens/:user_id/ledger", get(tokens::list_ledger))
        .route("/tokens/:user_id/verify", get(tokens::verify_ledger))
        .route("/tokens/adjust", post(tokens::adjust))
        .nest("/jobs", job_routes)
        .layer(ConcurrencyLimitLayer::new(API_ROUTE_CONCURRENCY));

    Router::new()
        .route("/health", get(health::health))
        .nest("/v1", api_routes)
        // Webhook volume is governed by Stripe, not by this service.
        .route("/webhooks/stripe", post(webhooks::stripe_webhook))
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .layer(body_limit)
        .layer(timeout)
        .with_state(Arc::new(state))
}

/// Build the CORS layer from configured origins; `*` means any.
fn cors_layer(origins: &[String]) -> CorsLayer {
    let layer = CorsLayer::new().allow_methods(Any).allow_headers(Any);

    if origins.iter().any(|origin| origin == "*") {
        layer.allow_origin(Any)
    } else {
        let parsed: Vec<_> = origins.iter().filter_map(|origin| origin.parse().ok()).collect();
        layer.allow_origin(parsed)
    }
}
