//! Ledger entry types for adsmith.
//!
//! Every balance change is recorded as a ledger entry. Entries are
//! append-only: once written they are never mutated or deleted, and
//! replaying a user's entries in id order reconstructs the balance.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::{JobId, LedgerEntryId, UserId};

/// A single balance-affecting event.
///
/// `balance_after` snapshots the account balance immediately after this
/// entry; it must equal the running sum of deltas through this row and is
/// the reconciliation anchor for audits.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LedgerEntry {
    /// Unique entry id (ULID, insertion-ordered).
    pub id: LedgerEntryId,

    /// The user whose balance was affected.
    pub user_id: UserId,

    /// When the mutation occurred.
    pub occurred_at: DateTime<Utc>,

    /// Signed token delta. Positive for credits, negative for debits.
    pub delta: i64,

    /// Why the balance changed.
    pub reason: LedgerReason,

    /// External correlation key: job id, checkout session id, refill date,
    /// or subscription id. Together with the reason tag it forms the
    /// idempotency key; replaying the same external event is a no-op.
    pub reference_id: Option<String>,

    /// Account balance immediately after this entry.
    pub balance_after: i64,
}

impl LedgerEntry {
    /// Create a reservation entry funding a generation job.
    #[must_use]
    pub fn reserve(user_id: UserId, tokens_cost: i64, job_id: &JobId, balance_after: i64) -> Self {
        Self {
            id: LedgerEntryId::generate(),
            user_id,
            occurred_at: Utc::now(),
            delta: -tokens_cost.abs(), // Always negative for reservations
            reason: LedgerReason::JobReserve,
            reference_id: Some(job_id.to_string()),
            balance_after,
        }
    }

    /// Create a refund entry for a failed or cancelled job.
    #[must_use]
    pub fn refund(user_id: UserId, tokens_cost: i64, job_id: &JobId, balance_after: i64) -> Self {
        Self {
            id: LedgerEntryId::generate(),
            user_id,
            occurred_at: Utc::now(),
            delta: tokens_cost.abs(),
            reason: LedgerReason::JobRefund,
            reference_id: Some(job_id.to_string()),
            balance_after,
        }
    }

    /// Create a topup entry for a purchased credit pack.
    #[must_use]
    pub fn topup(
        user_id: UserId,
        tokens_amount: i64,
        sku: String,
        checkout_session_id: &str,
        balance_after: i64,
    ) -> Self {
        Self {
            id: LedgerEntryId::generate(),
            user_id,
            occurred_at: Utc::now(),
            delta: tokens_amount.abs(),
            reason: LedgerReason::TopupPurchase { sku },
            reference_id: Some(checkout_session_id.to_string()),
            balance_after,
        }
    }

    /// Create a subscription refill entry.
    ///
    /// The delta is the top-up-to-floor difference, not the plan allotment.
    #[must_use]
    pub fn refill(user_id: UserId, delta: i64, refill_date: &str, balance_after: i64) -> Self {
        Self {
            id: LedgerEntryId::generate(),
            user_id,
            occurred_at: Utc::now(),
            delta,
            reason: LedgerReason::SubsRefill,
            reference_id: Some(refill_date.to_string()),
            balance_after,
        }
    }

    /// Create a subscription activation grant entry.
    #[must_use]
    pub fn activation(
        user_id: UserId,
        delta: i64,
        subscription_id: &str,
        balance_after: i64,
    ) -> Self {
        Self {
            id: LedgerEntryId::generate(),
            user_id,
            occurred_at: Utc::now(),
            delta,
            reason: LedgerReason::SubsActivation,
            reference_id: Some(subscription_id.to_string()),
            balance_after,
        }
    }

    /// Create the initial grant entry written when an account is
    /// provisioned.
    #[must_use]
    pub fn initial_grant(user_id: UserId, tokens: i64, balance_after: i64) -> Self {
        Self {
            id: LedgerEntryId::generate(),
            user_id,
            occurred_at: Utc::now(),
            delta: tokens.abs(),
            reason: LedgerReason::InitialGrant,
            reference_id: Some(user_id.to_string()),
            balance_after,
        }
    }

    /// Create an administrative adjustment entry.
    #[must_use]
    pub fn adjustment(
        user_id: UserId,
        delta: i64,
        reference_id: Option<String>,
        balance_after: i64,
    ) -> Self {
        Self {
            id: LedgerEntryId::generate(),
            user_id,
            occurred_at: Utc::now(),
            delta,
            reason: LedgerReason::AdminAdjust,
            reference_id,
            balance_after,
        }
    }
}

/// Why a balance changed. A closed vocabulary.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum LedgerReason {
    /// Tokens reserved to fund a generation job.
    JobReserve,

    /// Tokens credited back after a job failed or was cancelled.
    JobRefund,

    /// One-time purchased credit pack.
    TopupPurchase {
        /// The purchased pack SKU.
        sku: String,
    },

    /// Periodic subscription refill (top-up-to-floor).
    SubsRefill,

    /// Grant applied when a subscription is activated.
    SubsActivation,

    /// Starter balance granted at account provisioning.
    InitialGrant,

    /// Manual adjustment by an operator.
    AdminAdjust,
}

impl LedgerReason {
    /// The audit tag for this reason.
    ///
    /// The tag plus `reference_id` forms the idempotency key, so topups of
    /// the same SKU carry the SKU in the tag while remaining distinct per
    /// checkout session.
    #[must_use]
    pub fn tag(&self) -> String {
        match self {
            Self::JobReserve => "JOB_RESERVE".to_string(),
            Self::JobRefund => "JOB_REFUND".to_string(),
            Self::TopupPurchase { sku } => format!("TOPUP_PURCHASE:{sku}"),
            Self::SubsRefill => "SUBS_REFILL".to_string(),
            Self::SubsActivation => "SUBS_ACTIVATION".to_string(),
            Self::InitialGrant => "INITIAL_GRANT".to_string(),
            Self::AdminAdjust => "ADMIN_ADJUST".to_string(),
        }
    }

    /// Check if this reason only ever credits tokens.
    #[must_use]
    pub const fn is_credit(&self) -> bool {
        matches!(
            self,
            Self::JobRefund
                | Self::TopupPurchase { .. }
                | Self::SubsRefill
                | Self::SubsActivation
                | Self::InitialGrant
        )
    }

    /// Check if this reason only ever debits tokens.
    #[must_use]
    pub const fn is_debit(&self) -> bool {
        matches!(self, Self::JobReserve)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reserve_entry_is_negative() {
        let user_id = UserId::generate();
        let job_id = JobId::generate();
        let entry = LedgerEntry::reserve(user_id, 80, &job_id, 20);

        assert_eq!(entry.delta, -80);
        assert_eq!(entry.reason, LedgerReason::JobReserve);
        assert_eq!(entry.balance_after, 20);
        assert_eq!(entry.reference_id.as_deref(), Some(job_id.to_string().as_str()));
    }

    #[test]
    fn refund_entry_is_positive() {
        let user_id = UserId::generate();
        let job_id = JobId::generate();
        let entry = LedgerEntry::refund(user_id, 80, &job_id, 100);

        assert_eq!(entry.delta, 80);
        assert_eq!(entry.reason, LedgerReason::JobRefund);
    }

    #[test]
    fn topup_tag_carries_sku() {
        let reason = LedgerReason::TopupPurchase {
            sku: "pack_500".into(),
        };
        assert_eq!(reason.tag(), "TOPUP_PURCHASE:pack_500");
    }

    #[test]
    fn reason_credit_debit() {
        assert!(LedgerReason::JobRefund.is_credit());
        assert!(LedgerReason::SubsRefill.is_credit());
        assert!(LedgerReason::InitialGrant.is_credit());
        assert!(!LedgerReason::JobReserve.is_credit());

        assert!(LedgerReason::JobReserve.is_debit());
        assert!(!LedgerReason::AdminAdjust.is_debit());
        assert!(!LedgerReason::AdminAdjust.is_credit());
    }

    #[test]
    fn refill_entry_keeps_reference_date() {
        let user_id = UserId::generate();
        let entry = LedgerEntry::refill(user_id, 250, "2025-01-01", 300);

        assert_eq!(entry.delta, 250);
        assert_eq!(entry.reference_id.as_deref(), Some("2025-01-01"));
        assert_eq!(entry.balance_after, 300);
    }
}
