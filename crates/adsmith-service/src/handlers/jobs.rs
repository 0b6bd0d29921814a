//! Generation job handlers.
//!
//! Job creation reserves tokens and inserts the job row as one atomic
//! unit; the status callback drives the state machine and, on terminal
//! failure or cancel, releases the reservation in the same write.

use std::sync::Arc;

use axum::extract::{Path, Query, State};
use axum::Json;
use serde::{Deserialize, Serialize};

use adsmith_core::{GenerationJob, JobId, JobTransition, UserId};
use adsmith_store::Store;

use crate::auth::ServiceAuth;
use crate::error::ApiError;
use crate::state::AppState;

/// Job response.
#[derive(Debug, Serialize)]
pub struct JobResponse {
    /// Job id.
    pub id: String,
    /// Owning user.
    pub user_id: String,
    /// Lifecycle state.
    pub status: String,
    /// Tokens reserved for this job.
    pub tokens_cost: i64,
    /// The reservation ledger entry that funded the job.
    pub ledger_entry_id: String,
    /// Error code, on failure.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_code: Option<String>,
    /// Error message, on failure.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_message: Option<String>,
    /// Created timestamp.
    pub created_at: String,
    /// Started timestamp.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub started_at: Option<String>,
    /// Completed timestamp.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<String>,
}

impl From<&GenerationJob> for JobResponse {
    fn from(job: &GenerationJob) -> Self {
        Self {
            id: job.id.to_string(),
            user_id: job.user_id.to_string(),
            status: job.status.as_str().to_string(),
            tokens_cost: job.tokens_cost,
            ledger_entry_id: job.ledger_entry_id.to_string(),
            error_code: job.error_code.clone(),
            error_message: job.error_message.clone(),
            created_at: job.created_at.to_rfc3339(),
            started_at: job.started_at.map(|t| t.to_rfc3339()),
            completed_at: job.completed_at.map(|t| t.to_rfc3339()),
        }
    }
}

/// Create job request.
#[derive(Debug, Deserialize)]
pub struct CreateJobRequest {
    /// The user paying for the job.
    pub user_id: String,
    /// Tokens to reserve.
    pub tokens_cost: i64,
    /// Optional client-supplied job id, for idempotent retries. Generated
    /// when absent.
    pub job_id: Option<String>,
}

/// Create job response.
#[derive(Debug, Serialize)]
pub struct CreateJobResponse {
    /// The job as stored.
    pub job: JobResponse,
    /// Balance after the reservation.
    pub balance: i64,
    /// Whether this job id had already been created.
    pub replayed: bool,
}

/// Create a generation job funded by a token reservation.
///
/// Fails with `insufficient_tokens` (402) when the balance cannot cover
/// the cost; the UI renders an upsell from that code.
pub async fn create_job(
    State(state): State<Arc<AppState>>,
    auth: ServiceAuth,
    Json(body): Json<CreateJobRequest>,
) -> Result<Json<CreateJobResponse>, ApiError> {
    let user_id: UserId = body
        .user_id
        .parse()
        .map_err(|_| ApiError::BadRequest(format!("Invalid user_id: {}", body.user_id)))?;

    let job_id = match &body.job_id {
        Some(raw) => raw
            .parse::<JobId>()
            .map_err(|_| ApiError::BadRequest(format!("Invalid job_id: {raw}")))?,
        None => JobId::generate(),
    };

    let creation = state.store.create_job(&user_id, &job_id, body.tokens_cost)?;

    tracing::info!(
        service = %auth.service_name,
        user_id = %user_id,
        job_id = %job_id,
        tokens_cost = body.tokens_cost,
        balance = creation.balance,
        replayed = creation.replayed,
        "generation job requested"
    );

    Ok(Json(CreateJobResponse {
        job: JobResponse::from(&creation.job),
        balance: creation.balance,
        replayed: creation.replayed,
    }))
}

/// Get a job by id.
pub async fn get_job(
    State(state): State<Arc<AppState>>,
    _auth: ServiceAuth,
    Path(job_id): Path<String>,
) -> Result<Json<JobResponse>, ApiError> {
    let job_id: JobId = job_id
        .parse()
        .map_err(|_| ApiError::BadRequest(format!("Invalid job_id: {job_id}")))?;

    let job = state
        .store
        .get_job(&job_id)?
        .ok_or_else(|| ApiError::NotFound(format!("job not found: {job_id}")))?;

    Ok(Json(JobResponse::from(&job)))
}

/// Job listing query parameters.
#[derive(Debug, Deserialize)]
pub struct ListJobsQuery {
    /// The user whose jobs to list.
    pub user_id: String,
    /// Maximum jobs to return.
    pub limit: Option<usize>,
    /// Jobs to skip.
    pub offset: Option<usize>,
}

/// Job listing response.
#[derive(Debug, Serialize)]
pub struct ListJobsResponse {
    /// Jobs, newest first.
    pub jobs: Vec<JobResponse>,
}

/// List a user's jobs, newest first.
pub async fn list_jobs(
    State(state): State<Arc<AppState>>,
    _auth: ServiceAuth,
    Query(query): Query<ListJobsQuery>,
) -> Result<Json<ListJobsResponse>, ApiError> {
    let user_id: UserId = query
        .user_id
        .parse()
        .map_err(|_| ApiError::BadRequest(format!("Invalid user_id: {}", query.user_id)))?;

    let jobs = state.store.list_jobs_by_user(
        &user_id,
        query.limit.unwrap_or(50).min(200),
        query.offset.unwrap_or(0),
    )?;

    Ok(Json(ListJobsResponse {
        jobs: jobs.iter().map(JobResponse::from).collect(),
    }))
}

/// Job transition response.
#[derive(Debug, Serialize)]
pub struct TransitionResponse {
    /// The job after the transition.
    pub job: JobResponse,
}

/// Report a job status change from the generation workflow.
///
/// A `failed` or `canceled` report refunds the reservation exactly once,
/// however many times the callback is delivered.
pub async fn transition_job(
    State(state): State<Arc<AppState>>,
    auth: ServiceAuth,
    Path(job_id): Path<String>,
    Json(transition): Json<JobTransition>,
) -> Result<Json<TransitionResponse>, ApiError> {
    let job_id: JobId = job_id
        .parse()
        .map_err(|_| ApiError::BadRequest(format!("Invalid job_id: {job_id}")))?;

    let job = state.store.transition_job(&job_id, &transition)?;

    tracing::info!(
        service = %auth.service_name,
        job_id = %job_id,
        status = ?job.status,
        "job status reported"
    );

    Ok(Json(TransitionResponse {
        job: JobResponse::from(&job),
    }))
}
