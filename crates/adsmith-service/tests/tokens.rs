//! Token balance, ledger, and adjustment integration tests.

mod common;

use axum::http::StatusCode;
use common::TestHarness;
use serde_json::json;

#[tokio::test]
async fn balance_with_sufficiency_check() {
    let harness = TestHarness::new();
    harness.set_balance(100).await;

    let response = harness
        .server
        .get(&format!("/v1/tokens/{}/balance?required=80", harness.user_id))
        .add_header("x-api-key", harness.service_api_key.clone())
        .await;
    response.assert_status_ok();
    let body: serde_json::Value = response.json();
    assert_eq!(body["balance"], 100);
    assert_eq!(body["sufficient"], true);

    let response = harness
        .server
        .get(&format!("/v1/tokens/{}/balance?required=101", harness.user_id))
        .add_header("x-api-key", harness.service_api_key.clone())
        .await;
    let body: serde_json::Value = response.json();
    assert_eq!(body["sufficient"], false);
}

#[tokio::test]
async fn balance_without_account_is_not_found() {
    let harness = TestHarness::new();

    let response = harness
        .server
        .get(&format!("/v1/tokens/{}/balance", harness.user_id))
        .add_header("x-api-key", harness.service_api_key.clone())
        .await;

    response.assert_status_not_found();
}

#[tokio::test]
async fn ledger_history_newest_first() {
    let harness = TestHarness::new();
    harness.create_account().await;

    harness
        .server
        .post("/v1/tokens/adjust")
        .add_header("x-admin-key", harness.admin_api_key.clone())
        .json(&json!({
            "user_id": harness.user_id.to_string(),
            "delta": 75,
        }))
        .await
        .assert_status_ok();

    let response = harness
        .server
        .get(&format!("/v1/tokens/{}/ledger", harness.user_id))
        .add_header("x-api-key", harness.service_api_key.clone())
        .await;
    response.assert_status_ok();
    let body: serde_json::Value = response.json();
    let entries = body["entries"].as_array().unwrap();
    assert_eq!(entries.len(), 2);
    assert_eq!(entries[0]["reason"], "ADMIN_ADJUST");
    assert_eq!(entries[0]["delta"], 75);
    assert_eq!(entries[0]["balance_after"], 100);
    assert_eq!(entries[1]["reason"], "INITIAL_GRANT");
    assert_eq!(entries[1]["balance_after"], 25);
}

#[tokio::test]
async fn adjust_requires_admin_key() {
    let harness = TestHarness::new();
    harness.create_account().await;

    // The service key is not enough for operator adjustments.
    let response = harness
        .server
        .post("/v1/tokens/adjust")
        .add_header("x-api-key", harness.service_api_key.clone())
        .json(&json!({
            "user_id": harness.user_id.to_string(),
            "delta": 1000,
        }))
        .await;

    response.assert_status_unauthorized();
}

#[tokio::test]
async fn adjust_is_idempotent_with_reference() {
    let harness = TestHarness::new();
    harness.create_account().await;

    let request = json!({
        "user_id": harness.user_id.to_string(),
        "delta": 50,
        "reference_id": "ticket-1234",
    });

    let first = harness
        .server
        .post("/v1/tokens/adjust")
        .add_header("x-admin-key", harness.admin_api_key.clone())
        .json(&request)
        .await;
    first.assert_status_ok();
    let body: serde_json::Value = first.json();
    assert_eq!(body["balance"], 75);
    assert_eq!(body["replayed"], false);

    let second = harness
        .server
        .post("/v1/tokens/adjust")
        .add_header("x-admin-key", harness.admin_api_key.clone())
        .json(&request)
        .await;
    second.assert_status_ok();
    let body: serde_json::Value = second.json();
    assert_eq!(body["balance"], 75);
    assert_eq!(body["replayed"], true);
}

#[tokio::test]
async fn adjust_cannot_overdraw() {
    let harness = TestHarness::new();
    harness.create_account().await;

    let response = harness
        .server
        .post("/v1/tokens/adjust")
        .add_header("x-admin-key", harness.admin_api_key.clone())
        .json(&json!({
            "user_id": harness.user_id.to_string(),
            "delta": -26,
        }))
        .await;

    response.assert_status(StatusCode::PAYMENT_REQUIRED);
    assert_eq!(harness.balance().await, 25);
}

#[tokio::test]
async fn verify_reports_consistent_ledger() {
    let harness = TestHarness::new();
    harness.set_balance(100).await;

    harness
        .server
        .post("/v1/jobs")
        .add_header("x-api-key", harness.service_api_key.clone())
        .json(&json!({
            "user_id": harness.user_id.to_string(),
            "tokens_cost": 30,
        }))
        .await
        .assert_status_ok();

    let response = harness
        .server
        .get(&format!("/v1/tokens/{}/verify", harness.user_id))
        .add_header("x-api-key", harness.service_api_key.clone())
        .await;
    response.assert_status_ok();
    let body: serde_json::Value = response.json();
    assert_eq!(body["consistent"], true);
    assert_eq!(body["expected_balance"], 70);
    assert_eq!(body["actual_balance"], 70);
    assert!(body["first_mismatch"].is_null());
}
