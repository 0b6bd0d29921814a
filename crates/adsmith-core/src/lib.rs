//! Core types for the adsmith token accounting service.
//!
//! This crate provides the foundational types used throughout adsmith:
//!
//! - **Identifiers**: `UserId`, `JobId`, `LedgerEntryId`
//! - **Accounts**: `TokenAccount`, `Plan`, `SubscriptionStatus`
//! - **Ledger**: `LedgerEntry`, `LedgerReason`
//! - **Jobs**: `GenerationJob`, `JobStatus`, `JobTransition`
//!
//! # Tokens
//!
//! One token funds a fixed slice of ad-generation work. Balances are stored
//! as `i64` and are never negative; every change is recorded as a ledger
//! entry, so `sum(delta)` over a user's entries always equals the balance.

#![forbid(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]

pub mod account;
pub mod ids;
pub mod job;
pub mod ledger;

pub use account::{
    BillingPeriod, Plan, SubscriptionActivation, SubscriptionStatus, TokenAccount,
    AGENCY_PLAN_TOKENS, INITIAL_GRANT_TOKENS, PRO_PLAN_TOKENS, STARTER_PLAN_TOKENS,
};
pub use ids::{IdError, JobId, LedgerEntryId, UserId};
pub use job::{GenerationJob, JobStatus, JobTransition};
pub use ledger::{LedgerEntry, LedgerReason};
