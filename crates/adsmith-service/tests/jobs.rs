//! Generation job integration tests.

mod common;

use axum::http::StatusCode;
use common::TestHarness;
use serde_json::json;

use adsmith_core::JobId;

#[tokio::test]
async fn create_job_reserves_tokens() {
    let harness = TestHarness::new();
    harness.set_balance(100).await;

    let response = harness
        .server
        .post("/v1/jobs")
        .add_header("x-api-key", harness.service_api_key.clone())
        .json(&json!({
            "user_id": harness.user_id.to_string(),
            "tokens_cost": 80,
        }))
        .await;

    response.assert_status_ok();
    let body: serde_json::Value = response.json();
    assert_eq!(body["balance"], 20);
    assert_eq!(body["replayed"], false);
    assert_eq!(body["job"]["status"], "queued");
    assert_eq!(body["job"]["tokens_cost"], 80);

    assert_eq!(harness.balance().await, 20);
}

#[tokio::test]
async fn create_job_insufficient_tokens_returns_402() {
    let harness = TestHarness::new();
    harness.set_balance(20).await;

    let response = harness
        .server
        .post("/v1/jobs")
        .add_header("x-api-key", harness.service_api_key.clone())
        .json(&json!({
            "user_id": harness.user_id.to_string(),
            "tokens_cost": 50,
        }))
        .await;

    response.assert_status(StatusCode::PAYMENT_REQUIRED);
    let body: serde_json::Value = response.json();
    assert_eq!(body["error"]["code"], "insufficient_tokens");
    assert_eq!(body["error"]["details"]["balance"], 20);
    assert_eq!(body["error"]["details"]["required"], 50);

    // Balance untouched by the failed reservation.
    assert_eq!(harness.balance().await, 20);
}

#[tokio::test]
async fn create_job_duplicate_id_charges_once() {
    let harness = TestHarness::new();
    harness.set_balance(100).await;

    let job_id = JobId::generate().to_string();
    let request = json!({
        "user_id": harness.user_id.to_string(),
        "tokens_cost": 40,
        "job_id": job_id,
    });

    let first = harness
        .server
        .post("/v1/jobs")
        .add_header("x-api-key", harness.service_api_key.clone())
        .json(&request)
        .await;
    first.assert_status_ok();

    let second = harness
        .server
        .post("/v1/jobs")
        .add_header("x-api-key", harness.service_api_key.clone())
        .json(&request)
        .await;
    second.assert_status_ok();
    let body: serde_json::Value = second.json();
    assert_eq!(body["replayed"], true);
    assert_eq!(body["balance"], 60);

    assert_eq!(harness.balance().await, 60);
}

#[tokio::test]
async fn job_success_keeps_tokens_spent() {
    let harness = TestHarness::new();
    harness.set_balance(100).await;

    let created = harness
        .server
        .post("/v1/jobs")
        .add_header("x-api-key", harness.service_api_key.clone())
        .json(&json!({
            "user_id": harness.user_id.to_string(),
            "tokens_cost": 40,
        }))
        .await;
    created.assert_status_ok();
    let created: serde_json::Value = created.json();
    let job_id = created["job"]["id"].as_str().unwrap().to_string();

    let running = harness
        .server
        .post(&format!("/v1/jobs/{job_id}/status"))
        .add_header("x-api-key", harness.service_api_key.clone())
        .json(&json!({ "status": "running" }))
        .await;
    running.assert_status_ok();
    let body: serde_json::Value = running.json();
    assert_eq!(body["job"]["status"], "running");
    assert!(body["job"]["started_at"].is_string());

    let done = harness
        .server
        .post(&format!("/v1/jobs/{job_id}/status"))
        .add_header("x-api-key", harness.service_api_key.clone())
        .json(&json!({ "status": "succeeded" }))
        .await;
    done.assert_status_ok();
    let body: serde_json::Value = done.json();
    assert_eq!(body["job"]["status"], "succeeded");

    // The reservation is the final cost.
    assert_eq!(harness.balance().await, 60);
}

#[tokio::test]
async fn job_failure_refunds_once() {
    let harness = TestHarness::new();
    harness.set_balance(100).await;

    let created = harness
        .server
        .post("/v1/jobs")
        .add_header("x-api-key", harness.service_api_key.clone())
        .json(&json!({
            "user_id": harness.user_id.to_string(),
            "tokens_cost": 40,
        }))
        .await;
    let created: serde_json::Value = created.json();
    let job_id = created["job"]["id"].as_str().unwrap().to_string();

    harness
        .server
        .post(&format!("/v1/jobs/{job_id}/status"))
        .add_header("x-api-key", harness.service_api_key.clone())
        .json(&json!({ "status": "running" }))
        .await
        .assert_status_ok();

    let failed = harness
        .server
        .post(&format!("/v1/jobs/{job_id}/status"))
        .add_header("x-api-key", harness.service_api_key.clone())
        .json(&json!({
            "status": "failed",
            "error_code": "WORKFLOW_ERROR",
            "error_message": "render crashed",
        }))
        .await;
    failed.assert_status_ok();
    let body: serde_json::Value = failed.json();
    assert_eq!(body["job"]["status"], "failed");
    assert_eq!(body["job"]["error_code"], "WORKFLOW_ERROR");

    assert_eq!(harness.balance().await, 100);

    // A redelivered failure callback conflicts instead of double-crediting.
    let replay = harness
        .server
        .post(&format!("/v1/jobs/{job_id}/status"))
        .add_header("x-api-key", harness.service_api_key.clone())
        .json(&json!({
            "status": "failed",
            "error_code": "WORKFLOW_ERROR",
            "error_message": "render crashed",
        }))
        .await;
    replay.assert_status(StatusCode::CONFLICT);

    assert_eq!(harness.balance().await, 100);
}

#[tokio::test]
async fn queued_job_cannot_skip_to_succeeded() {
    let harness = TestHarness::new();
    harness.set_balance(100).await;

    let created = harness
        .server
        .post("/v1/jobs")
        .add_header("x-api-key", harness.service_api_key.clone())
        .json(&json!({
            "user_id": harness.user_id.to_string(),
            "tokens_cost": 40,
        }))
        .await;
    let created: serde_json::Value = created.json();
    let job_id = created["job"]["id"].as_str().unwrap().to_string();

    let response = harness
        .server
        .post(&format!("/v1/jobs/{job_id}/status"))
        .add_header("x-api-key", harness.service_api_key.clone())
        .json(&json!({ "status": "succeeded" }))
        .await;

    response.assert_status(StatusCode::CONFLICT);
}

#[tokio::test]
async fn transition_unknown_job_is_not_found() {
    let harness = TestHarness::new();

    let response = harness
        .server
        .post(&format!("/v1/jobs/{}/status", JobId::generate()))
        .add_header("x-api-key", harness.service_api_key.clone())
        .json(&json!({ "status": "running" }))
        .await;

    response.assert_status_not_found();
}

#[tokio::test]
async fn list_jobs_newest_first() {
    let harness = TestHarness::new();
    harness.set_balance(100).await;

    for cost in [10, 20] {
        harness
            .server
            .post("/v1/jobs")
            .add_header("x-api-key", harness.service_api_key.clone())
            .json(&json!({
                "user_id": harness.user_id.to_string(),
                "tokens_cost": cost,
            }))
            .await
            .assert_status_ok();
    }

    let response = harness
        .server
        .get(&format!("/v1/jobs?user_id={}", harness.user_id))
        .add_header("x-api-key", harness.service_api_key.clone())
        .await;
    response.assert_status_ok();
    let body: serde_json::Value = response.json();
    let jobs = body["jobs"].as_array().unwrap();
    assert_eq!(jobs.len(), 2);
    assert_eq!(jobs[0]["tokens_cost"], 20);
    assert_eq!(jobs[1]["tokens_cost"], 10);
}
