//! `RocksDB` storage layer and ledger operations for adsmith.
//!
//! This crate persists token accounts, the append-only ledger, and
//! generation jobs, and it implements the five ledger operations that are
//! the only legal way to mutate a balance: `reserve`, `refund`, `topup`,
//! `refill`, and `activate` (plus the operator-only `adjust`).
//!
//! # Architecture
//!
//! Storage uses the following column families:
//!
//! - `accounts`: token account records, keyed by `user_id`
//! - `ledger`: ledger entries, keyed by `entry_id` (ULID)
//! - `ledger_by_user`: index for listing a user's entries in time order
//! - `idempotency`: markers keyed by `(reason_tag, reference_id)`
//! - `jobs` / `jobs_by_user`: generation jobs and their per-user index
//!
//! Every mutating operation runs under a per-user lock and commits as a
//! single `WriteBatch`, so a ledger entry, its idempotency marker, the
//! account record, and (for job operations) the job row persist together
//! or not at all.
//!
//! # Example
//!
//! ```no_run
//! use adsmith_store::{RocksStore, Store};
//! use adsmith_core::{JobId, UserId};
//!
//! let store = RocksStore::open("/tmp/adsmith-db").unwrap();
//!
//! let user_id = UserId::generate();
//! store.create_account(&user_id).unwrap();
//!
//! let creation = store.create_job(&user_id, &JobId::generate(), 10).unwrap();
//! assert_eq!(creation.balance, 15);
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]

pub mod error;
pub mod keys;
pub mod rocks;
pub mod schema;

pub use error::{Result, StoreError};
pub use rocks::RocksStore;

use chrono::{DateTime, Utc};

use adsmith_core::{
    GenerationJob, JobId, JobTransition, LedgerEntry, LedgerEntryId, SubscriptionActivation,
    TokenAccount, UserId,
};

/// The effect of a balance-changing operation.
///
/// Duplicate detection is not an error: replaying an already-processed
/// external event resolves to the original effect.
#[derive(Debug, Clone)]
pub enum LedgerOutcome {
    /// The operation was applied and wrote a new ledger entry.
    Applied {
        /// The ledger entry that was written.
        entry: LedgerEntry,
        /// The balance after the operation.
        balance: i64,
    },

    /// The operation had already been processed; nothing changed.
    AlreadyApplied {
        /// The ledger entry written by the original call.
        entry: LedgerEntry,
        /// The current balance.
        balance: i64,
    },
}

impl LedgerOutcome {
    /// The balance after the operation.
    #[must_use]
    pub const fn balance(&self) -> i64 {
        match self {
            Self::Applied { balance, .. } | Self::AlreadyApplied { balance, .. } => *balance,
        }
    }

    /// The ledger entry backing this outcome.
    #[must_use]
    pub const fn entry(&self) -> &LedgerEntry {
        match self {
            Self::Applied { entry, .. } | Self::AlreadyApplied { entry, .. } => entry,
        }
    }

    /// Check if this outcome was an idempotency replay.
    #[must_use]
    pub const fn is_replay(&self) -> bool {
        matches!(self, Self::AlreadyApplied { .. })
    }
}

/// The result of provisioning an account.
#[derive(Debug, Clone)]
pub struct AccountCreation {
    /// The account as stored.
    pub account: TokenAccount,

    /// The initial grant entry, when this call provisioned the account.
    pub granted: Option<LedgerEntry>,

    /// Whether this call created the account.
    pub created: bool,
}

/// The result of a subscription refill.
///
/// A refill tops the balance up to the plan allotment; when the balance
/// already meets it, no entry is written but the schedule still advances.
#[derive(Debug, Clone)]
pub struct RefillOutcome {
    /// The refill entry, when tokens moved.
    pub entry: Option<LedgerEntry>,

    /// The balance after the refill.
    pub balance: i64,

    /// When the next refill is due.
    pub next_refill_at: DateTime<Utc>,

    /// Whether this refill date had already been processed.
    pub replayed: bool,
}

/// The result of a subscription activation.
#[derive(Debug, Clone)]
pub struct ActivationOutcome {
    /// The activation grant entry, when tokens moved.
    pub entry: Option<LedgerEntry>,

    /// The balance after activation.
    pub balance: i64,
}

/// The result of creating a generation job.
#[derive(Debug, Clone)]
pub struct JobCreation {
    /// The job as stored.
    pub job: GenerationJob,

    /// The balance after the reservation.
    pub balance: i64,

    /// Whether this job id had already been created (replayed request).
    pub replayed: bool,
}

/// One row of a ledger audit report.
#[derive(Debug, Clone, serde::Serialize)]
pub struct LedgerAudit {
    /// How many entries were replayed.
    pub entries: usize,

    /// The balance reconstructed from the ledger.
    pub expected_balance: i64,

    /// The balance stored on the account.
    pub actual_balance: i64,

    /// The first entry whose `balance_after` diverged from the running
    /// sum, if any.
    pub first_mismatch: Option<LedgerEntryId>,

    /// Whether the ledger and account agree.
    pub consistent: bool,
}

/// The storage trait defining all database and ledger operations.
///
/// This trait abstracts the storage layer, allowing for different
/// implementations. The balance column may be mutated **only** through the
/// operations here; there is no ad-hoc update path.
pub trait Store: Send + Sync {
    // =========================================================================
    // Account Operations
    // =========================================================================

    /// Provision an account, granting the starter balance.
    ///
    /// Idempotent per user: calling again returns the existing account and
    /// grants nothing.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    fn create_account(&self, user_id: &UserId) -> Result<AccountCreation>;

    /// Get an account by user id.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    fn get_account(&self, user_id: &UserId) -> Result<Option<TokenAccount>>;

    // =========================================================================
    // Ledger Reads
    // =========================================================================

    /// Get a ledger entry by id.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    fn get_ledger_entry(&self, entry_id: &LedgerEntryId) -> Result<Option<LedgerEntry>>;

    /// List ledger entries for a user, newest first.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    fn list_ledger_by_user(
        &self,
        user_id: &UserId,
        limit: usize,
        offset: usize,
    ) -> Result<Vec<LedgerEntry>>;

    /// Replay a user's ledger oldest-first and check that every
    /// `balance_after` matches the running sum and that the final sum
    /// matches the account balance.
    ///
    /// # Errors
    ///
    /// Returns `StoreError::NotFound` if the account doesn't exist.
    fn verify_ledger(&self, user_id: &UserId) -> Result<LedgerAudit>;

    // =========================================================================
    // Ledger Operations
    // =========================================================================

    /// Reserve tokens to fund a generation job.
    ///
    /// Idempotent per job id.
    ///
    /// # Errors
    ///
    /// - `StoreError::NotFound` if the account doesn't exist.
    /// - `StoreError::InsufficientTokens` if the balance is too low.
    fn reserve(&self, user_id: &UserId, tokens_cost: i64, job_id: &JobId)
        -> Result<LedgerOutcome>;

    /// Credit a job's reservation back after failure or cancellation.
    ///
    /// Idempotent per job id; a replay returns the original refund.
    ///
    /// # Errors
    ///
    /// Returns `StoreError::NotFound` if the account doesn't exist.
    fn refund(&self, user_id: &UserId, tokens_cost: i64, job_id: &JobId) -> Result<LedgerOutcome>;

    /// Credit a purchased token pack.
    ///
    /// Idempotent per checkout session id (not per SKU: buying the same
    /// pack twice yields two distinct session ids). Provisions the account
    /// if it does not exist yet.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    fn topup(
        &self,
        user_id: &UserId,
        tokens_amount: i64,
        checkout_session_id: &str,
        sku: &str,
    ) -> Result<LedgerOutcome>;

    /// Apply a periodic subscription refill.
    ///
    /// Tops the balance up to `tokens_per_period`; never decreases it. The
    /// refill schedule advances one calendar month even when no tokens
    /// move. Idempotent per refill date.
    ///
    /// # Errors
    ///
    /// Returns `StoreError::NotFound` if the account doesn't exist.
    fn refill(
        &self,
        user_id: &UserId,
        tokens_per_period: i64,
        refill_date: &str,
    ) -> Result<RefillOutcome>;

    /// Activate a subscription.
    ///
    /// Updates payment-provider metadata and the plan unconditionally, then
    /// ensures the balance meets the plan allotment (free tier excluded;
    /// downgrades never claw back tokens). The grant is idempotent per
    /// subscription id. Provisions the account if it does not exist yet.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    fn activate(
        &self,
        user_id: &UserId,
        activation: &SubscriptionActivation,
    ) -> Result<ActivationOutcome>;

    /// Record a subscription cancellation.
    ///
    /// Metadata only; the remaining balance is retained.
    ///
    /// # Errors
    ///
    /// Returns `StoreError::NotFound` if the account doesn't exist.
    fn mark_subscription_canceled(
        &self,
        user_id: &UserId,
        canceled_at: DateTime<Utc>,
    ) -> Result<TokenAccount>;

    /// Apply an operator adjustment.
    ///
    /// The delta may be negative but may not drive the balance below zero.
    /// Idempotent when a reference id is supplied.
    ///
    /// # Errors
    ///
    /// - `StoreError::NotFound` if the account doesn't exist.
    /// - `StoreError::InsufficientTokens` if a negative delta would
    ///   overdraw the account.
    fn adjust(
        &self,
        user_id: &UserId,
        delta: i64,
        reference_id: Option<String>,
    ) -> Result<LedgerOutcome>;

    // =========================================================================
    // Job Operations
    // =========================================================================

    /// Create a generation job together with its funding reservation.
    ///
    /// The reservation entry and the job row commit atomically: a job with
    /// no funding, or consumed funds with no job, cannot exist. Replaying
    /// the same job id returns the existing job without a second charge.
    ///
    /// # Errors
    ///
    /// - `StoreError::NotFound` if the account doesn't exist.
    /// - `StoreError::InsufficientTokens` if the balance is too low.
    fn create_job(&self, user_id: &UserId, job_id: &JobId, tokens_cost: i64)
        -> Result<JobCreation>;

    /// Drive a job through a state transition.
    ///
    /// A `Failed` or `Canceled` transition writes the refund in the same
    /// atomic batch as the status update; the refund stays idempotent per
    /// job id, so an out-of-order standalone refund cannot double-credit.
    ///
    /// # Errors
    ///
    /// - `StoreError::NotFound` if the job doesn't exist.
    /// - `StoreError::InvalidTransition` if the state machine forbids the
    ///   edge (terminal states accept nothing).
    fn transition_job(&self, job_id: &JobId, transition: &JobTransition) -> Result<GenerationJob>;

    /// Get a job by id.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    fn get_job(&self, job_id: &JobId) -> Result<Option<GenerationJob>>;

    /// List jobs for a user, newest first.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    fn list_jobs_by_user(
        &self,
        user_id: &UserId,
        limit: usize,
        offset: usize,
    ) -> Result<Vec<GenerationJob>>;
}
