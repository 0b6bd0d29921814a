//! Token account handlers.

use std::sync::Arc;

use axum::extract::{Path, State};
use axum::Json;
use serde::{Deserialize, Serialize};

use adsmith_core::{TokenAccount, UserId};
use adsmith_store::Store;

use crate::auth::ServiceAuth;
use crate::error::ApiError;
use crate::state::AppState;

/// Account response.
#[derive(Debug, Serialize)]
pub struct AccountResponse {
    /// User id.
    pub user_id: String,
    /// Current token balance.
    pub balance: i64,
    /// Current plan code.
    pub plan: String,
    /// Billing cadence.
    pub period: String,
    /// Subscription status, if any.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub subscription_status: Option<String>,
    /// When the next subscription refill is due.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub next_refill_at: Option<String>,
    /// Created timestamp.
    pub created_at: String,
}

impl From<&TokenAccount> for AccountResponse {
    fn from(account: &TokenAccount) -> Self {
        Self {
            user_id: account.user_id.to_string(),
            balance: account.balance,
            plan: account.plan.code().to_string(),
            period: account.period.as_str().to_string(),
            subscription_status: account
                .subscription_status
                .map(|s| s.as_str().to_string()),
            next_refill_at: account.next_refill_at.map(|t| t.to_rfc3339()),
            created_at: account.created_at.to_rfc3339(),
        }
    }
}

/// Create account request.
#[derive(Debug, Deserialize)]
pub struct CreateAccountRequest {
    /// The user to provision an account for.
    pub user_id: String,
}

/// Create account response.
#[derive(Debug, Serialize)]
pub struct CreateAccountResponse {
    /// The account as stored.
    pub account: AccountResponse,
    /// Whether this call created the account.
    pub created: bool,
    /// Tokens granted by this call.
    pub granted_tokens: i64,
}

/// Provision a token account with the starter grant.
///
/// Idempotent: repeating the call returns the existing account.
pub async fn create_account(
    State(state): State<Arc<AppState>>,
    auth: ServiceAuth,
    Json(body): Json<CreateAccountRequest>,
) -> Result<Json<CreateAccountResponse>, ApiError> {
    let user_id: UserId = body
        .user_id
        .parse()
        .map_err(|_| ApiError::BadRequest(format!("Invalid user_id: {}", body.user_id)))?;

    let creation = state.store.create_account(&user_id)?;

    tracing::info!(
        service = %auth.service_name,
        user_id = %user_id,
        created = creation.created,
        "account provisioning requested"
    );

    Ok(Json(CreateAccountResponse {
        account: AccountResponse::from(&creation.account),
        created: creation.created,
        granted_tokens: creation.granted.map_or(0, |e| e.delta),
    }))
}

/// Get an account by user id.
pub async fn get_account(
    State(state): State<Arc<AppState>>,
    _auth: ServiceAuth,
    Path(user_id): Path<String>,
) -> Result<Json<AccountResponse>, ApiError> {
    let user_id: UserId = user_id
        .parse()
        .map_err(|_| ApiError::BadRequest(format!("Invalid user_id: {user_id}")))?;

    let account = state
        .store
        .get_account(&user_id)?
        .ok_or_else(|| ApiError::NotFound(format!("account not found: {user_id}")))?;

    Ok(Json(AccountResponse::from(&account)))
}
