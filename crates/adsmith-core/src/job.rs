//! Generation job types for adsmith.
//!
//! A generation job is one unit of paid work. Its lifecycle is bound to
//! exactly one reservation ledger entry: the job row and its funding
//! reservation are created together, and a terminal failure or cancel
//! triggers exactly one refund.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::{JobId, LedgerEntryId, UserId};

/// A paid ad-generation job.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GenerationJob {
    /// Unique job id (ULID, creation-ordered).
    pub id: JobId,

    /// The user that owns the job.
    pub user_id: UserId,

    /// Current lifecycle state.
    pub status: JobStatus,

    /// Tokens reserved for this job at creation time.
    pub tokens_cost: i64,

    /// The reservation ledger entry that funded this job. One reservation,
    /// one job.
    pub ledger_entry_id: LedgerEntryId,

    /// Machine-readable error code; populated only on `Failed`.
    pub error_code: Option<String>,

    /// Human-readable error message; populated only on `Failed`.
    pub error_message: Option<String>,

    /// When the job was created.
    pub created_at: DateTime<Utc>,

    /// When the external workflow picked the job up.
    pub started_at: Option<DateTime<Utc>>,

    /// When the job reached a terminal state.
    pub completed_at: Option<DateTime<Utc>>,
}

impl GenerationJob {
    /// Create a new queued job funded by the given reservation entry.
    #[must_use]
    pub fn new(
        id: JobId,
        user_id: UserId,
        tokens_cost: i64,
        ledger_entry_id: LedgerEntryId,
    ) -> Self {
        Self {
            id,
            user_id,
            status: JobStatus::Queued,
            tokens_cost,
            ledger_entry_id,
            error_code: None,
            error_message: None,
            created_at: Utc::now(),
            started_at: None,
            completed_at: None,
        }
    }
}

/// Lifecycle state of a generation job.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    /// Created and funded, waiting for the workflow to pick it up.
    Queued,

    /// The external workflow is executing.
    Running,

    /// Completed successfully. The reservation is the final cost.
    Succeeded,

    /// Failed; the reservation is refunded.
    Failed,

    /// Cancelled before completion; the reservation is refunded.
    Canceled,
}

impl JobStatus {
    /// The wire representation of this status.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Queued => "queued",
            Self::Running => "running",
            Self::Succeeded => "succeeded",
            Self::Failed => "failed",
            Self::Canceled => "canceled",
        }
    }

    /// Check if this state accepts no further transitions.
    #[must_use]
    pub const fn is_terminal(&self) -> bool {
        matches!(self, Self::Succeeded | Self::Failed | Self::Canceled)
    }

    /// Check whether a transition to `next` is legal.
    ///
    /// Queued jobs may fail or be cancelled without ever running.
    #[must_use]
    pub const fn can_transition_to(&self, next: Self) -> bool {
        matches!(
            (self, next),
            (Self::Queued, Self::Running | Self::Failed | Self::Canceled)
                | (Self::Running, Self::Succeeded | Self::Failed | Self::Canceled)
        )
    }
}

/// A requested job state transition, as reported by the workflow caller.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum JobTransition {
    /// The workflow started executing the job.
    Running,

    /// The workflow finished successfully.
    Succeeded,

    /// The workflow failed terminally.
    Failed {
        /// Machine-readable error code.
        error_code: String,
        /// Human-readable error message.
        error_message: String,
    },

    /// The job was cancelled.
    Canceled,
}

impl JobTransition {
    /// The status this transition targets.
    #[must_use]
    pub const fn target_status(&self) -> JobStatus {
        match self {
            Self::Running => JobStatus::Running,
            Self::Succeeded => JobStatus::Succeeded,
            Self::Failed { .. } => JobStatus::Failed,
            Self::Canceled => JobStatus::Canceled,
        }
    }

    /// Check if this transition ends the job and releases its reservation.
    #[must_use]
    pub const fn refunds_reservation(&self) -> bool {
        matches!(self, Self::Failed { .. } | Self::Canceled)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_job_is_queued() {
        let job = GenerationJob::new(
            JobId::generate(),
            UserId::generate(),
            40,
            LedgerEntryId::generate(),
        );
        assert_eq!(job.status, JobStatus::Queued);
        assert!(job.started_at.is_none());
        assert!(job.completed_at.is_none());
        assert!(job.error_code.is_none());
    }

    #[test]
    fn legal_transitions() {
        assert!(JobStatus::Queued.can_transition_to(JobStatus::Running));
        assert!(JobStatus::Queued.can_transition_to(JobStatus::Failed));
        assert!(JobStatus::Queued.can_transition_to(JobStatus::Canceled));
        assert!(JobStatus::Running.can_transition_to(JobStatus::Succeeded));
        assert!(JobStatus::Running.can_transition_to(JobStatus::Failed));
        assert!(JobStatus::Running.can_transition_to(JobStatus::Canceled));
    }

    #[test]
    fn illegal_transitions() {
        assert!(!JobStatus::Queued.can_transition_to(JobStatus::Succeeded));
        assert!(!JobStatus::Running.can_transition_to(JobStatus::Queued));
        assert!(!JobStatus::Succeeded.can_transition_to(JobStatus::Failed));
        assert!(!JobStatus::Failed.can_transition_to(JobStatus::Canceled));
        assert!(!JobStatus::Canceled.can_transition_to(JobStatus::Running));
    }

    #[test]
    fn terminal_states() {
        assert!(!JobStatus::Queued.is_terminal());
        assert!(!JobStatus::Running.is_terminal());
        assert!(JobStatus::Succeeded.is_terminal());
        assert!(JobStatus::Failed.is_terminal());
        assert!(JobStatus::Canceled.is_terminal());
    }

    #[test]
    fn transition_targets_and_refunds() {
        assert_eq!(JobTransition::Running.target_status(), JobStatus::Running);
        assert!(!JobTransition::Succeeded.refunds_reservation());
        assert!(JobTransition::Canceled.refunds_reservation());
        let failed = JobTransition::Failed {
            error_code: "WORKFLOW_TIMEOUT".into(),
            error_message: "generation timed out".into(),
        };
        assert_eq!(failed.target_status(), JobStatus::Failed);
        assert!(failed.refunds_reservation());
    }
}
