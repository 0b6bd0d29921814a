//! HTTP request handlers.

pub mod accounts;
pub mod health;
pub mod jobs;
pub mod tokens;
pub mod webhooks;
