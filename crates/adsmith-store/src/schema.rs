//! Database schema definitions and column families.
//!
//! This module defines the column families used in `RocksDB` storage.

/// Column family names for the `RocksDB` database.
pub mod cf {
    /// Primary token account records, keyed by `user_id`.
    pub const ACCOUNTS: &str = "accounts";

    /// Ledger entries, keyed by `entry_id` (ULID).
    pub const LEDGER: &str = "ledger";

    /// Index: ledger entries by user, keyed by `user_id || entry_id`.
    /// Value is empty (index only).
    pub const LEDGER_BY_USER: &str = "ledger_by_user";

    /// Idempotency markers, keyed by
    /// `user_id || reason_tag || 0x00 || reference_id`.
    /// Value is the funding entry id, or empty when the replayed operation
    /// moved no tokens.
    pub const IDEMPOTENCY: &str = "idempotency";

    /// Generation jobs, keyed by `job_id` (ULID).
    pub const JOBS: &str = "jobs";

    /// Index: jobs by user, keyed by `user_id || job_id`.
    /// Value is empty (index only).
    pub const JOBS_BY_USER: &str = "jobs_by_user";
}

/// Returns all column family names for database initialization.
#[must_use]
pub fn all_column_families() -> Vec<&'static str> {
    vec![
        cf::ACCOUNTS,
        cf::LEDGER,
        cf::LEDGER_BY_USER,
        cf::IDEMPOTENCY,
        cf::JOBS,
        cf::JOBS_BY_USER,
    ]
}
