//! Error types for adsmith storage.

use adsmith_core::JobStatus;

/// Result type for storage operations.
pub type Result<T> = std::result::Result<T, StoreError>;

/// Errors that can occur in storage and ledger operations.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// Database operation failed.
    #[error("database error: {0}")]
    Database(String),

    /// Serialization/deserialization failed.
    #[error("serialization error: {0}")]
    Serialization(String),

    /// Record not found.
    #[error("{entity} not found: {id}")]
    NotFound {
        /// The entity kind (account, job, ledger entry).
        entity: &'static str,
        /// The identifier that was not found.
        id: String,
    },

    /// Insufficient tokens for a reservation.
    #[error("insufficient tokens: balance={balance}, required={required}")]
    InsufficientTokens {
        /// Current token balance.
        balance: i64,
        /// Required token amount.
        required: i64,
    },

    /// A job state transition that the state machine forbids.
    #[error("invalid job transition: {from:?} -> {to:?}")]
    InvalidTransition {
        /// The job's current status.
        from: JobStatus,
        /// The requested status.
        to: JobStatus,
    },

    /// An operation was invoked with a non-positive or out-of-range amount.
    #[error("invalid amount: {0}")]
    InvalidAmount(String),
}
