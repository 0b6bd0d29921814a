//! Stripe webhook handlers.
//!
//! Stripe is the only inbound payment surface. Every handler maps an
//! event onto one ledger operation keyed by the event's own correlation
//! id (checkout session, subscription id, period date), so redeliveries
//! are safe by construction.

use std::sync::Arc;

use axum::extract::State;
use axum::http::HeaderMap;
use axum::Json;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use adsmith_core::{BillingPeriod, Plan, SubscriptionActivation, SubscriptionStatus, UserId};
use adsmith_store::Store;

use crate::crypto::verify_stripe_signature;
use crate::error::ApiError;
use crate::state::AppState;

/// The slice of a Stripe event this service consumes.
#[derive(Debug, Deserialize)]
pub struct StripeEvent {
    /// Event type, e.g. `checkout.session.completed`.
    #[serde(rename = "type")]
    pub event_type: String,
    /// Stripe's event id.
    pub id: String,
    /// The event payload.
    pub data: StripeEventData,
}

/// Container for the event's object.
#[derive(Debug, Deserialize)]
pub struct StripeEventData {
    /// The object the event describes (session, subscription, invoice).
    pub object: serde_json::Value,
}

/// Acknowledgement body returned to Stripe.
#[derive(Debug, Serialize)]
pub struct WebhookResponse {
    /// Whether the event was accepted.
    pub received: bool,
}

/// Entry point for `POST /webhooks/stripe`.
pub async fn stripe_webhook(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    body: String,
) -> Result<Json<WebhookResponse>, ApiError> {
    check_signature(&state, &headers, &body)?;

    let event: StripeEvent =
        serde_json::from_str(&body).map_err(|e| ApiError::BadRequest(e.to_string()))?;

    tracing::info!(
        event_type = %event.event_type,
        event_id = %event.id,
        "stripe webhook received"
    );

    let object = &event.data.object;
    match event.event_type.as_str() {
        "checkout.session.completed" => handle_checkout_completed(&state, object)?,
        "customer.subscription.created" | "customer.subscription.updated" => {
            handle_subscription_update(&state, object)?;
        }
        "invoice.paid" => handle_invoice_paid(&state, object)?,
        "customer.subscription.deleted" => handle_subscription_deleted(&state, object)?,
        other => {
            tracing::debug!(event_type = %other, "ignoring unhandled stripe event");
        }
    }

    Ok(Json(WebhookResponse { received: true }))
}

/// Verify the `stripe-signature` header when a secret is configured.
fn check_signature(state: &AppState, headers: &HeaderMap, body: &str) -> Result<(), ApiError> {
    let Some(secret) = &state.config.stripe_webhook_secret else {
        tracing::warn!("stripe webhook secret not configured, accepting unsigned event");
        return Ok(());
    };

    let signature = headers
        .get("stripe-signature")
        .and_then(|v| v.to_str().ok())
        .ok_or_else(|| ApiError::BadRequest("Missing Stripe signature".into()))?;

    verify_stripe_signature(body, signature, secret).map_err(|e| {
        tracing::warn!(error = %e, "stripe signature verification failed");
        ApiError::BadRequest("Invalid webhook signature".into())
    })
}

fn str_field<'v>(object: &'v serde_json::Value, key: &str) -> Option<&'v str> {
    object.get(key).and_then(serde_json::Value::as_str)
}

fn metadata_field<'v>(object: &'v serde_json::Value, key: &str) -> Option<&'v str> {
    object
        .get("metadata")
        .and_then(|m| m.get(key))
        .and_then(serde_json::Value::as_str)
}

fn timestamp_field(object: &serde_json::Value, key: &str) -> Option<DateTime<Utc>> {
    object
        .get(key)
        .and_then(serde_json::Value::as_i64)
        .and_then(|ts| DateTime::from_timestamp(ts, 0))
}

fn required_user(raw: Option<&str>, field: &str) -> Result<UserId, ApiError> {
    let raw = raw.ok_or_else(|| ApiError::BadRequest(format!("Missing {field}")))?;
    raw.parse()
        .map_err(|_| ApiError::BadRequest(format!("Invalid user_id: {raw}")))
}

/// Handle `checkout.session.completed`: credit a purchased token pack.
///
/// One-time purchases carry `metadata.token_amount` and `metadata.sku`;
/// the checkout session id is the idempotency reference, so each paid
/// session credits exactly once. Subscription-mode checkouts are ignored
/// here, the subscription events carry their own grant.
fn handle_checkout_completed(
    state: &AppState,
    object: &serde_json::Value,
) -> Result<(), ApiError> {
    let session_id = str_field(object, "id").unwrap_or("unknown");
    let payment_status = str_field(object, "payment_status").unwrap_or("unknown");

    if payment_status != "paid" {
        tracing::info!(session_id, payment_status, "checkout session not paid, skipping");
        return Ok(());
    }

    if str_field(object, "mode").unwrap_or("payment") == "subscription" {
        tracing::debug!(session_id, "subscription checkout, grant handled by subscription events");
        return Ok(());
    }

    let user_id = required_user(str_field(object, "client_reference_id"), "client_reference_id")?;

    let token_amount = metadata_field(object, "token_amount")
        .and_then(|raw| raw.parse::<i64>().ok())
        .ok_or_else(|| ApiError::BadRequest("Missing metadata.token_amount".into()))?;
    let sku = metadata_field(object, "sku").unwrap_or("custom");

    let outcome = state.store.topup(&user_id, token_amount, session_id, sku)?;

    tracing::info!(
        user_id = %user_id,
        session_id,
        sku,
        tokens_added = token_amount,
        new_balance = outcome.balance(),
        replayed = outcome.is_replay(),
        "topup credited from checkout session"
    );

    Ok(())
}

/// Handle subscription creation or update: activate the plan.
///
/// The application stamps `metadata.user_id`, `metadata.plan_code`, and
/// `metadata.period` onto the subscription at checkout time. The grant is
/// keyed by the subscription id; metadata refreshes on every delivery.
fn handle_subscription_update(
    state: &AppState,
    object: &serde_json::Value,
) -> Result<(), ApiError> {
    let subscription_id = str_field(object, "id")
        .ok_or_else(|| ApiError::BadRequest("Missing subscription id".into()))?;
    let user_id = required_user(metadata_field(object, "user_id"), "metadata.user_id")?;

    let plan_code = metadata_field(object, "plan_code").unwrap_or("free");
    let Some(plan) = Plan::from_code(plan_code) else {
        tracing::warn!(plan_code, "unknown plan code, ignoring subscription event");
        return Ok(());
    };

    let status = match str_field(object, "status") {
        Some("past_due") => SubscriptionStatus::PastDue,
        Some("canceled" | "unpaid") => SubscriptionStatus::Canceled,
        _ => SubscriptionStatus::Active,
    };

    let period = match metadata_field(object, "period") {
        Some("yearly") => BillingPeriod::Yearly,
        _ => BillingPeriod::Monthly,
    };

    let activation = SubscriptionActivation {
        stripe_customer_id: str_field(object, "customer").unwrap_or("unknown").to_string(),
        stripe_subscription_id: subscription_id.to_string(),
        status,
        plan,
        period,
    };

    let outcome = state.store.activate(&user_id, &activation)?;

    tracing::info!(
        user_id = %user_id,
        subscription_id,
        plan = plan.code(),
        granted = outcome.entry.as_ref().map_or(0, |e| e.delta),
        new_balance = outcome.balance,
        "subscription activated"
    );

    Ok(())
}

/// Handle `invoice.paid` for a renewal cycle: apply the periodic refill.
///
/// Only `billing_reason = subscription_cycle` refills; the first invoice
/// of a subscription (`subscription_create`) is covered by activation.
/// The period start date is the idempotency reference.
fn handle_invoice_paid(state: &AppState, object: &serde_json::Value) -> Result<(), ApiError> {
    let billing_reason = str_field(object, "billing_reason").unwrap_or("unknown");
    if billing_reason != "subscription_cycle" {
        tracing::debug!(billing_reason, "invoice is not a renewal cycle, skipping refill");
        return Ok(());
    }

    let subscription = object
        .get("subscription_details")
        .ok_or_else(|| ApiError::BadRequest("Missing subscription_details".into()))?;
    let user_id = required_user(
        metadata_field(subscription, "user_id"),
        "subscription_details.metadata.user_id",
    )?;

    let plan_code = metadata_field(subscription, "plan_code").unwrap_or("free");
    let Some(plan) = Plan::from_code(plan_code) else {
        tracing::warn!(plan_code, "unknown plan code, ignoring renewal invoice");
        return Ok(());
    };

    let tokens_per_period = plan.monthly_tokens();
    if tokens_per_period == 0 {
        tracing::debug!(plan = plan.code(), "plan has no monthly tokens to refill");
        return Ok(());
    }

    let refill_date = timestamp_field(object, "period_start")
        .map(|dt| dt.format("%Y-%m-%d").to_string())
        .ok_or_else(|| ApiError::BadRequest("Missing period_start".into()))?;

    let outcome = state.store.refill(&user_id, tokens_per_period, &refill_date)?;

    tracing::info!(
        user_id = %user_id,
        refill_date = %refill_date,
        granted = outcome.entry.as_ref().map_or(0, |e| e.delta),
        new_balance = outcome.balance,
        replayed = outcome.replayed,
        "subscription refill processed"
    );

    Ok(())
}

/// Handle subscription deletion: record the cancellation.
///
/// Metadata only. Credits are not revoked on cancellation; the remaining
/// balance depletes naturally through usage.
fn handle_subscription_deleted(
    state: &AppState,
    object: &serde_json::Value,
) -> Result<(), ApiError> {
    let user_id = required_user(metadata_field(object, "user_id"), "metadata.user_id")?;
    let canceled_at = timestamp_field(object, "canceled_at").unwrap_or_else(Utc::now);

    if state.store.get_account(&user_id)?.is_none() {
        tracing::warn!(user_id = %user_id, "cancellation for unknown account, ignoring");
        return Ok(());
    }

    let account = state.store.mark_subscription_canceled(&user_id, canceled_at)?;

    tracing::info!(
        user_id = %user_id,
        balance_retained = account.balance,
        "subscription cancelled, credits retained"
    );

    Ok(())
}
