//! Key encoding utilities for `RocksDB`.
//!
//! This module provides functions for encoding and decoding keys used in
//! column families. Composite index keys place the user id first so a
//! prefix scan yields one user's rows, and the ULID component second so
//! the scan is time-ordered.

use adsmith_core::{IdError, JobId, LedgerEntryId, UserId};

/// Create an account key from a user id.
#[must_use]
pub fn account_key(user_id: &UserId) -> Vec<u8> {
    user_id.as_bytes().to_vec()
}

/// Create a ledger entry key from an entry id.
#[must_use]
pub fn ledger_key(entry_id: &LedgerEntryId) -> Vec<u8> {
    entry_id.to_bytes().to_vec()
}

/// Create a user-ledger index key.
///
/// Format: `user_id (16 bytes) || entry_id (16 bytes)`
#[must_use]
pub fn user_ledger_key(user_id: &UserId, entry_id: &LedgerEntryId) -> Vec<u8> {
    let mut key = Vec::with_capacity(32);
    key.extend_from_slice(user_id.as_bytes());
    key.extend_from_slice(&entry_id.to_bytes());
    key
}

/// Create a prefix for iterating all ledger entries for a user.
#[must_use]
pub fn user_ledger_prefix(user_id: &UserId) -> Vec<u8> {
    user_id.as_bytes().to_vec()
}

/// Extract the entry id from a user-ledger index key.
///
/// # Errors
///
/// Returns an error if the key is shorter than 32 bytes.
pub fn extract_entry_id_from_user_key(key: &[u8]) -> Result<LedgerEntryId, IdError> {
    let bytes: [u8; 16] = key
        .get(16..32)
        .and_then(|slice| slice.try_into().ok())
        .ok_or(IdError::InvalidUlid)?;
    LedgerEntryId::from_bytes(bytes)
}

/// Create an idempotency key from the owning user, a reason tag, and a
/// reference id.
///
/// Format: `user_id (16 bytes) || reason_tag || 0x00 || reference_id`.
/// The key is scoped to the account because some references repeat across
/// users (every subscriber refilling on the same date shares the refill
/// date); the separator keeps tags that are prefixes of one another from
/// colliding.
#[must_use]
pub fn idempotency_key(user_id: &UserId, reason_tag: &str, reference_id: &str) -> Vec<u8> {
    let mut key = Vec::with_capacity(16 + reason_tag.len() + 1 + reference_id.len());
    key.extend_from_slice(user_id.as_bytes());
    key.extend_from_slice(reason_tag.as_bytes());
    key.push(0);
    key.extend_from_slice(reference_id.as_bytes());
    key
}

/// Create a job key from a job id.
#[must_use]
pub fn job_key(job_id: &JobId) -> Vec<u8> {
    job_id.to_bytes().to_vec()
}

/// Create a user-job index key.
///
/// Format: `user_id (16 bytes) || job_id (16 bytes)`
#[must_use]
pub fn user_job_key(user_id: &UserId, job_id: &JobId) -> Vec<u8> {
    let mut key = Vec::with_capacity(32);
    key.extend_from_slice(user_id.as_bytes());
    key.extend_from_slice(&job_id.to_bytes());
    key
}

/// Create a prefix for iterating all jobs for a user.
#[must_use]
pub fn user_jobs_prefix(user_id: &UserId) -> Vec<u8> {
    user_id.as_bytes().to_vec()
}

/// Extract the job id from a user-job index key.
///
/// # Errors
///
/// Returns an error if the key is shorter than 32 bytes.
pub fn extract_job_id_from_user_key(key: &[u8]) -> Result<JobId, IdError> {
    let bytes: [u8; 16] = key
        .get(16..32)
        .and_then(|slice| slice.try_into().ok())
        .ok_or(IdError::InvalidUlid)?;
    JobId::from_bytes(bytes)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn account_key_length() {
        let user_id = UserId::generate();
        let key = account_key(&user_id);
        assert_eq!(key.len(), 16);
    }

    #[test]
    fn user_ledger_key_format() {
        let user_id = UserId::generate();
        let entry_id = LedgerEntryId::generate();
        let key = user_ledger_key(&user_id, &entry_id);

        assert_eq!(key.len(), 32);
        assert_eq!(&key[..16], user_id.as_bytes());
        assert_eq!(&key[16..], entry_id.to_bytes());
    }

    #[test]
    fn extract_entry_id_roundtrip() {
        let user_id = UserId::generate();
        let entry_id = LedgerEntryId::generate();
        let key = user_ledger_key(&user_id, &entry_id);

        let extracted = extract_entry_id_from_user_key(&key).unwrap();
        assert_eq!(extracted, entry_id);
    }

    #[test]
    fn extract_entry_id_rejects_short_key() {
        assert!(extract_entry_id_from_user_key(&[0u8; 20]).is_err());
    }

    #[test]
    fn extract_job_id_roundtrip() {
        let user_id = UserId::generate();
        let job_id = JobId::generate();
        let key = user_job_key(&user_id, &job_id);

        let extracted = extract_job_id_from_user_key(&key).unwrap();
        assert_eq!(extracted, job_id);
    }

    #[test]
    fn idempotency_key_separates_tag_and_reference() {
        let user_id = UserId::generate();
        let a = idempotency_key(&user_id, "JOB_RESERVE", "x");
        let b = idempotency_key(&user_id, "JOB_RESERVE:x", "");
        assert_ne!(a, b);
    }

    #[test]
    fn idempotency_key_is_scoped_per_user() {
        let a = idempotency_key(&UserId::generate(), "SUBS_REFILL", "2025-01-01");
        let b = idempotency_key(&UserId::generate(), "SUBS_REFILL", "2025-01-01");
        assert_ne!(a, b);
    }
}
