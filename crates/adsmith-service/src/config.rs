//! Service configuration.
//!
//! Everything comes from environment variables with sensible defaults;
//! the Stripe webhook secret may also come from a mounted JSON secrets
//! file, which wins over the environment when present.

use serde::Deserialize;
use std::path::Path;

const DEFAULT_LISTEN_ADDR: &str = "0.0.0.0:8080";
const DEFAULT_DATA_DIR: &str = "/data/adsmith";
const DEFAULT_MAX_BODY_BYTES: usize = 1024 * 1024;
const DEFAULT_REQUEST_TIMEOUT_SECONDS: u64 = 30;

/// Candidate locations for the Stripe secrets file, relative to the
/// working directory of the deployment.
const STRIPE_SECRET_PATHS: [&str; 3] = [
    ".secrets/stripe.json",
    "adsmith/.secrets/stripe.json",
    "../.secrets/stripe.json",
];

/// Service configuration loaded from environment variables.
#[derive(Debug, Clone)]
pub struct ServiceConfig {
    /// Address to listen on.
    pub listen_addr: String,

    /// Path to the `RocksDB` data directory.
    pub data_dir: String,

    /// Service API key for service-to-service auth.
    pub service_api_key: Option<String>,

    /// Admin API key for operator-only endpoints.
    pub admin_api_key: Option<String>,

    /// Stripe webhook secret. Verification is skipped without it, for
    /// development.
    pub stripe_webhook_secret: Option<String>,

    /// CORS allowed origins.
    pub cors_origins: Vec<String>,

    /// Maximum request body size in bytes.
    pub max_body_bytes: usize,

    /// Request timeout in seconds.
    pub request_timeout_seconds: u64,
}

impl ServiceConfig {
    /// Load configuration from environment variables and secrets files.
    #[must_use]
    pub fn from_env() -> Self {
        Self {
            listen_addr: env_or("LISTEN_ADDR", DEFAULT_LISTEN_ADDR),
            data_dir: env_or("DATA_DIR", DEFAULT_DATA_DIR),
            service_api_key: std::env::var("SERVICE_API_KEY").ok(),
            admin_api_key: std::env::var("ADMIN_API_KEY").ok(),
            stripe_webhook_secret: load_webhook_secret(),
            cors_origins: parse_origins(&env_or("CORS_ORIGINS", "*")),
            max_body_bytes: env_parsed("MAX_BODY_BYTES").unwrap_or(DEFAULT_MAX_BODY_BYTES),
            request_timeout_seconds: env_parsed("REQUEST_TIMEOUT_SECONDS")
                .unwrap_or(DEFAULT_REQUEST_TIMEOUT_SECONDS),
        }
    }
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            listen_addr: DEFAULT_LISTEN_ADDR.into(),
            data_dir: DEFAULT_DATA_DIR.into(),
            service_api_key: None,
            admin_api_key: None,
            stripe_webhook_secret: None,
            cors_origins: vec!["*".into()],
            max_body_bytes: DEFAULT_MAX_BODY_BYTES,
            request_timeout_seconds: DEFAULT_REQUEST_TIMEOUT_SECONDS,
        }
    }
}

fn env_or(name: &str, default: &str) -> String {
    std::env::var(name).unwrap_or_else(|_| default.into())
}

fn env_parsed<T: std::str::FromStr>(name: &str) -> Option<T> {
    std::env::var(name).ok().and_then(|raw| raw.parse().ok())
}

fn parse_origins(raw: &str) -> Vec<String> {
    raw.split(',').map(|origin| origin.trim().to_string()).collect()
}

/// Stripe secrets file structure.
#[derive(Debug, Deserialize)]
struct StripeSecrets {
    #[serde(default)]
    webhook_secret: Option<String>,
}

/// Find the webhook secret: secrets file first, environment fallback.
fn load_webhook_secret() -> Option<String> {
    for path in STRIPE_SECRET_PATHS {
        if let Ok(secrets) = read_secrets_file(Path::new(path)) {
            tracing::info!(path, "loaded Stripe secrets file");
            return secrets.webhook_secret;
        }
    }

    tracing::debug!("no Stripe secrets file found, falling back to environment");
    std::env::var("STRIPE_WEBHOOK_SECRET").ok()
}

fn read_secrets_file(path: &Path) -> std::io::Result<StripeSecrets> {
    let contents = std::fs::read(path)?;
    serde_json::from_slice(&contents)
        .map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidData, e))
}
