//! Token account types for adsmith.
//!
//! This module defines the per-user prepaid token account, including plan
//! and subscription metadata.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::UserId;

// ============================================================================
// Constants
// ============================================================================

/// Tokens granted when an account is first provisioned.
pub const INITIAL_GRANT_TOKENS: i64 = 25;

/// Starter plan monthly token allotment.
pub const STARTER_PLAN_TOKENS: i64 = 300;

/// Pro plan monthly token allotment.
pub const PRO_PLAN_TOKENS: i64 = 1000;

/// Agency plan monthly token allotment.
pub const AGENCY_PLAN_TOKENS: i64 = 3000;

/// A prepaid token account for a user.
///
/// The account tracks the spendable token balance, the current plan, refill
/// scheduling, and correlation ids for the external payment provider. The
/// balance is a derived value: it always equals the sum of all ledger entry
/// deltas for the user, and is never negative.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TokenAccount {
    /// The user that owns this account (1:1).
    pub user_id: UserId,

    /// Current spendable token balance.
    pub balance: i64,

    /// Current subscription plan.
    pub plan: Plan,

    /// Billing cadence for the subscription.
    pub period: BillingPeriod,

    /// When the last subscription refill was applied.
    pub last_refill_at: Option<DateTime<Utc>>,

    /// When the next subscription refill is due.
    pub next_refill_at: Option<DateTime<Utc>>,

    /// Stripe customer id for payments.
    pub stripe_customer_id: Option<String>,

    /// Stripe subscription id, if a subscription is active.
    pub stripe_subscription_id: Option<String>,

    /// Status of the Stripe subscription.
    pub subscription_status: Option<SubscriptionStatus>,

    /// When the subscription was cancelled, if it was.
    pub cancellation_time: Option<DateTime<Utc>>,

    /// When the account was created.
    pub created_at: DateTime<Utc>,

    /// When the account was last updated.
    pub updated_at: DateTime<Utc>,
}

impl TokenAccount {
    /// Create a new account with zero balance on the free plan.
    #[must_use]
    pub fn new(user_id: UserId) -> Self {
        let now = Utc::now();
        Self {
            user_id,
            balance: 0,
            plan: Plan::Free,
            period: BillingPeriod::Monthly,
            last_refill_at: None,
            next_refill_at: None,
            stripe_customer_id: None,
            stripe_subscription_id: None,
            subscription_status: None,
            cancellation_time: None,
            created_at: now,
            updated_at: now,
        }
    }

    /// Check if the account has sufficient tokens for a reservation.
    #[must_use]
    pub fn has_sufficient_tokens(&self, tokens: i64) -> bool {
        self.balance >= tokens
    }

    /// Check if the account has an active subscription.
    #[must_use]
    pub fn has_active_subscription(&self) -> bool {
        self.subscription_status == Some(SubscriptionStatus::Active)
    }
}

/// Available subscription plans.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Plan {
    /// Free tier: no monthly tokens, pay-as-you-go topups only.
    Free,

    /// Starter plan: 300 tokens/month.
    Starter,

    /// Pro plan: 1000 tokens/month.
    Pro,

    /// Agency plan: 3000 tokens/month.
    Agency,
}

impl Plan {
    /// Get the monthly token allotment for this plan.
    #[must_use]
    pub const fn monthly_tokens(&self) -> i64 {
        match self {
            Self::Free => 0,
            Self::Starter => STARTER_PLAN_TOKENS,
            Self::Pro => PRO_PLAN_TOKENS,
            Self::Agency => AGENCY_PLAN_TOKENS,
        }
    }

    /// The plan code as carried in Stripe metadata.
    #[must_use]
    pub const fn code(&self) -> &'static str {
        match self {
            Self::Free => "free",
            Self::Starter => "starter",
            Self::Pro => "pro",
            Self::Agency => "agency",
        }
    }

    /// Parse a plan code from Stripe metadata.
    #[must_use]
    pub fn from_code(code: &str) -> Option<Self> {
        match code {
            "free" => Some(Self::Free),
            "starter" => Some(Self::Starter),
            "pro" => Some(Self::Pro),
            "agency" => Some(Self::Agency),
            _ => None,
        }
    }
}

/// Billing cadence for a subscription.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BillingPeriod {
    /// Billed monthly.
    Monthly,

    /// Billed yearly. Token refills still land monthly.
    Yearly,
}

impl BillingPeriod {
    /// The wire representation of this cadence.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Monthly => "monthly",
            Self::Yearly => "yearly",
        }
    }
}

/// Status of a Stripe subscription.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SubscriptionStatus {
    /// Subscription is active.
    Active,

    /// Payment failed, subscription is past due.
    PastDue,

    /// Subscription was cancelled.
    Canceled,
}

impl SubscriptionStatus {
    /// The wire representation of this status.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Active => "active",
            Self::PastDue => "past_due",
            Self::Canceled => "canceled",
        }
    }
}

/// Parameters for a subscription activation.
///
/// Carried from the payment provider's subscription event into the
/// `activate` operation. Metadata is applied unconditionally; the token
/// grant is keyed by `stripe_subscription_id` for idempotency.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SubscriptionActivation {
    /// Stripe customer id.
    pub stripe_customer_id: String,

    /// Stripe subscription id; the idempotency reference for the grant.
    pub stripe_subscription_id: String,

    /// Status reported by the provider.
    pub status: SubscriptionStatus,

    /// The plan being activated.
    pub plan: Plan,

    /// Billing cadence.
    pub period: BillingPeriod,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_account_has_zero_balance() {
        let user_id = UserId::generate();
        let account = TokenAccount::new(user_id);
        assert_eq!(account.balance, 0);
        assert_eq!(account.plan, Plan::Free);
        assert!(account.subscription_status.is_none());
        assert!(account.next_refill_at.is_none());
    }

    #[test]
    fn account_sufficient_tokens() {
        let user_id = UserId::generate();
        let mut account = TokenAccount::new(user_id);
        account.balance = 100;

        assert!(account.has_sufficient_tokens(50));
        assert!(account.has_sufficient_tokens(100));
        assert!(!account.has_sufficient_tokens(101));
    }

    #[test]
    fn plan_monthly_tokens() {
        assert_eq!(Plan::Free.monthly_tokens(), 0);
        assert_eq!(Plan::Starter.monthly_tokens(), 300);
        assert_eq!(Plan::Pro.monthly_tokens(), 1000);
        assert_eq!(Plan::Agency.monthly_tokens(), 3000);
    }

    #[test]
    fn plan_code_roundtrip() {
        for plan in [Plan::Free, Plan::Starter, Plan::Pro, Plan::Agency] {
            assert_eq!(Plan::from_code(plan.code()), Some(plan));
        }
        assert_eq!(Plan::from_code("enterprise"), None);
    }
}
