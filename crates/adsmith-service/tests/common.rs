//! Common test utilities for adsmith integration tests.

#![allow(dead_code)] // Some utilities are used by different test files

use std::sync::Arc;

use axum::Router;
use axum_test::TestServer;
use tempfile::TempDir;

use adsmith_core::UserId;
use adsmith_service::{create_router, AppState, ServiceConfig};
use adsmith_store::RocksStore;

/// Test harness containing everything needed for integration tests.
pub struct TestHarness {
    /// The test server for making HTTP requests.
    pub server: TestServer,
    /// Temporary directory for the database (kept alive for test duration).
    pub _temp_dir: TempDir,
    /// A test user id for requests.
    pub user_id: UserId,
    /// The service API key for service-to-service requests.
    pub service_api_key: String,
    /// The admin API key for operator requests.
    pub admin_api_key: String,
}

impl TestHarness {
    /// Create a new test harness with a fresh database.
    pub fn new() -> Self {
        Self::with_webhook_secret(None)
    }

    /// Create a harness with a Stripe webhook secret configured.
    pub fn with_webhook_secret(secret: Option<&str>) -> Self {
        let temp_dir = TempDir::new().expect("Failed to create temp directory");
        let store = RocksStore::open(temp_dir.path()).expect("Failed to open store");

        let service_api_key = "test-service-key".to_string();
        let admin_api_key = "test-admin-key".to_string();

        let config = ServiceConfig {
            listen_addr: "127.0.0.1:0".into(),
            data_dir: temp_dir.path().to_string_lossy().to_string(),
            service_api_key: Some(service_api_key.clone()),
            admin_api_key: Some(admin_api_key.clone()),
            stripe_webhook_secret: secret.map(String::from),
            cors_origins: vec!["*".into()],
            max_body_bytes: 1024 * 1024,
            request_timeout_seconds: 30,
        };

        let state = AppState::new(Arc::new(store), config);
        let router: Router = create_router(state);

        let server = TestServer::new(router).expect("Failed to create test server");
        let user_id = UserId::generate();

        Self {
            server,
            _temp_dir: temp_dir,
            user_id,
            service_api_key,
            admin_api_key,
        }
    }

    /// Provision the harness user's account and return the response body.
    pub async fn create_account(&self) -> serde_json::Value {
        let response = self
            .server
            .post("/v1/accounts")
            .add_header("x-api-key", self.service_api_key.clone())
            .json(&serde_json::json!({ "user_id": self.user_id.to_string() }))
            .await;
        response.assert_status_ok();
        response.json()
    }

    /// Set the harness user's balance to an exact value via an operator
    /// adjustment on top of the starter grant.
    pub async fn set_balance(&self, balance: i64) {
        let body = self.create_account().await;
        let current = body["account"]["balance"].as_i64().unwrap();
        let delta = balance - current;
        if delta == 0 {
            return;
        }
        self.server
            .post("/v1/tokens/adjust")
            .add_header("x-admin-key", self.admin_api_key.clone())
            .json(&serde_json::json!({
                "user_id": self.user_id.to_string(),
                "delta": delta,
            }))
            .await
            .assert_status_ok();
    }

    /// Fetch the harness user's current balance.
    pub async fn balance(&self) -> i64 {
        let response = self
            .server
            .get(&format!("/v1/tokens/{}/balance", self.user_id))
            .add_header("x-api-key", self.service_api_key.clone())
            .await;
        response.assert_status_ok();
        let body: serde_json::Value = response.json();
        body["balance"].as_i64().unwrap()
    }
}

impl Default for TestHarness {
    fn default() -> Self {
        Self::new()
    }
}
