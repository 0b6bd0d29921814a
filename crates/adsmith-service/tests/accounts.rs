//! Account provisioning integration tests.

mod common;

use common::TestHarness;
use serde_json::json;

#[tokio::test]
async fn create_account_grants_starter_balance() {
    let harness = TestHarness::new();

    let body = harness.create_account().await;
    assert_eq!(body["created"], true);
    assert_eq!(body["granted_tokens"], 25);
    assert_eq!(body["account"]["balance"], 25);
    assert_eq!(body["account"]["plan"], "free");

    let response = harness
        .server
        .get(&format!("/v1/accounts/{}", harness.user_id))
        .add_header("x-api-key", harness.service_api_key.clone())
        .await;
    response.assert_status_ok();
    let body: serde_json::Value = response.json();
    assert_eq!(body["balance"], 25);
}

#[tokio::test]
async fn create_account_is_idempotent() {
    let harness = TestHarness::new();

    harness.create_account().await;
    let second = harness.create_account().await;

    assert_eq!(second["created"], false);
    assert_eq!(second["granted_tokens"], 0);
    assert_eq!(second["account"]["balance"], 25);
}

#[tokio::test]
async fn create_account_requires_auth() {
    let harness = TestHarness::new();

    let response = harness
        .server
        .post("/v1/accounts")
        .json(&json!({ "user_id": harness.user_id.to_string() }))
        .await;

    response.assert_status_unauthorized();
}

#[tokio::test]
async fn create_account_rejects_invalid_user_id() {
    let harness = TestHarness::new();

    let response = harness
        .server
        .post("/v1/accounts")
        .add_header("x-api-key", harness.service_api_key.clone())
        .json(&json!({ "user_id": "not-a-uuid" }))
        .await;

    response.assert_status_bad_request();
}

#[tokio::test]
async fn get_account_not_found() {
    let harness = TestHarness::new();

    let response = harness
        .server
        .get(&format!("/v1/accounts/{}", harness.user_id))
        .add_header("x-api-key", harness.service_api_key.clone())
        .await;

    response.assert_status_not_found();
}
