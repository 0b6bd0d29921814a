//! Token balance and ledger handlers.

use std::sync::Arc;

use axum::extract::{Path, Query, State};
use axum::Json;
use serde::{Deserialize, Serialize};

use adsmith_core::{LedgerEntry, UserId};
use adsmith_store::{LedgerAudit, Store};

use crate::auth::{AdminAuth, ServiceAuth};
use crate::error::ApiError;
use crate::state::AppState;

/// Default page size for ledger listings.
const DEFAULT_PAGE_LIMIT: usize = 50;

/// Maximum page size for ledger listings.
const MAX_PAGE_LIMIT: usize = 200;

fn parse_user(user_id: &str) -> Result<UserId, ApiError> {
    user_id
        .parse()
        .map_err(|_| ApiError::BadRequest(format!("Invalid user_id: {user_id}")))
}

/// Balance query parameters.
#[derive(Debug, Deserialize)]
pub struct BalanceQuery {
    /// Optional required amount for a sufficiency check.
    pub required: Option<i64>,
}

/// Balance response.
#[derive(Debug, Serialize)]
pub struct BalanceResponse {
    /// Current token balance.
    pub balance: i64,
    /// The amount the caller asked about, if any.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub required: Option<i64>,
    /// Whether the balance covers `required`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sufficient: Option<bool>,
}

/// Get a user's current balance, optionally checking sufficiency.
pub async fn get_balance(
    State(state): State<Arc<AppState>>,
    _auth: ServiceAuth,
    Path(user_id): Path<String>,
    Query(query): Query<BalanceQuery>,
) -> Result<Json<BalanceResponse>, ApiError> {
    let user_id = parse_user(&user_id)?;

    let account = state
        .store
        .get_account(&user_id)?
        .ok_or_else(|| ApiError::NotFound(format!("account not found: {user_id}")))?;

    Ok(Json(BalanceResponse {
        balance: account.balance,
        required: query.required,
        sufficient: query.required.map(|r| account.balance >= r),
    }))
}

/// Pagination query parameters.
#[derive(Debug, Deserialize)]
pub struct PageQuery {
    /// Maximum entries to return.
    pub limit: Option<usize>,
    /// Entries to skip.
    pub offset: Option<usize>,
}

impl PageQuery {
    fn limit(&self) -> usize {
        self.limit.unwrap_or(DEFAULT_PAGE_LIMIT).min(MAX_PAGE_LIMIT)
    }

    fn offset(&self) -> usize {
        self.offset.unwrap_or(0)
    }
}

/// One ledger entry in a history response.
#[derive(Debug, Serialize)]
pub struct LedgerEntryResponse {
    /// Entry id.
    pub id: String,
    /// Signed token delta.
    pub delta: i64,
    /// Audit tag for the reason.
    pub reason: String,
    /// External correlation key.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reference_id: Option<String>,
    /// Balance after this entry.
    pub balance_after: i64,
    /// When the mutation occurred.
    pub occurred_at: String,
}

impl From<&LedgerEntry> for LedgerEntryResponse {
    fn from(entry: &LedgerEntry) -> Self {
        Self {
            id: entry.id.to_string(),
            delta: entry.delta,
            reason: entry.reason.tag(),
            reference_id: entry.reference_id.clone(),
            balance_after: entry.balance_after,
            occurred_at: entry.occurred_at.to_rfc3339(),
        }
    }
}

/// Ledger history response.
#[derive(Debug, Serialize)]
pub struct LedgerResponse {
    /// Entries, newest first.
    pub entries: Vec<LedgerEntryResponse>,
}

/// List a user's ledger entries, newest first.
pub async fn list_ledger(
    State(state): State<Arc<AppState>>,
    _auth: ServiceAuth,
    Path(user_id): Path<String>,
    Query(query): Query<PageQuery>,
) -> Result<Json<LedgerResponse>, ApiError> {
    let user_id = parse_user(&user_id)?;

    let entries = state
        .store
        .list_ledger_by_user(&user_id, query.limit(), query.offset())?;

    Ok(Json(LedgerResponse {
        entries: entries.iter().map(LedgerEntryResponse::from).collect(),
    }))
}

/// Replay a user's ledger and report whether it reconstructs the balance.
pub async fn verify_ledger(
    State(state): State<Arc<AppState>>,
    _auth: ServiceAuth,
    Path(user_id): Path<String>,
) -> Result<Json<LedgerAudit>, ApiError> {
    let user_id = parse_user(&user_id)?;
    let audit = state.store.verify_ledger(&user_id)?;

    if !audit.consistent {
        tracing::error!(
            user_id = %user_id,
            expected = audit.expected_balance,
            actual = audit.actual_balance,
            first_mismatch = ?audit.first_mismatch,
            "ledger does not reconstruct account balance"
        );
    }

    Ok(Json(audit))
}

/// Operator adjustment request.
#[derive(Debug, Deserialize)]
pub struct AdjustRequest {
    /// The user whose balance to adjust.
    pub user_id: String,
    /// Signed token delta.
    pub delta: i64,
    /// Optional idempotency reference (ticket id, incident id).
    pub reference_id: Option<String>,
}

/// Operator adjustment response.
#[derive(Debug, Serialize)]
pub struct AdjustResponse {
    /// Balance after the adjustment.
    pub balance: i64,
    /// Whether the reference had already been applied.
    pub replayed: bool,
}

/// Apply an operator balance adjustment.
pub async fn adjust(
    State(state): State<Arc<AppState>>,
    auth: AdminAuth,
    Json(body): Json<AdjustRequest>,
) -> Result<Json<AdjustResponse>, ApiError> {
    let user_id = parse_user(&body.user_id)?;

    let outcome = state
        .store
        .adjust(&user_id, body.delta, body.reference_id.clone())?;

    tracing::info!(
        admin_id = %auth.admin_id,
        user_id = %user_id,
        delta = body.delta,
        balance = outcome.balance(),
        "operator adjustment"
    );

    Ok(Json(AdjustResponse {
        balance: outcome.balance(),
        replayed: outcome.is_replay(),
    }))
}
