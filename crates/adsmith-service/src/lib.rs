//! HTTP API service for adsmith token accounting.
//!
//! This crate exposes the ledger and job operations over an Axum HTTP
//! API for the surrounding application backend, plus the Stripe webhook
//! surface that drives topups, activations, and refills.

#![forbid(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]

pub mod auth;
pub mod config;
pub mod crypto;
pub mod error;
pub mod handlers;
pub mod routes;
pub mod state;

pub use config::ServiceConfig;
pub use error::ApiError;
pub use routes::create_router;
pub use state::AppState;
