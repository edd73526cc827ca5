pub mod aggregate;
pub mod client;
mod error;
pub mod queries;
pub mod retry;
pub mod users;

pub use error::ApiError;
pub use queries::GraphQlRequest;

use crate::config::ApiConfig;
use async_trait::async_trait;
use once_cell::sync::Lazy;
use std::time::Duration;

/// Shared HTTP client for all API requests to enable connection pooling
pub static HTTP_CLIENT: Lazy<reqwest::Client> = Lazy::new(|| {
    reqwest::Client::builder()
        .timeout(Duration::from_secs(30))
        .connect_timeout(Duration::from_secs(10))
        .pool_max_idle_per_host(5)
        .build()
        .expect("Failed to create HTTP client")
});

/// One authenticated round trip to the platform's GraphQL endpoint.
///
/// Implementations return the raw response body; turning an `errors` list
/// into a failure is the caller's job so it flows through the retry
/// classifier like any other error.
#[async_trait]
pub trait Transport: Send + Sync {
    async fn post(&self, request: &GraphQlRequest) -> Result<serde_json::Value, ApiError>;
}

/// Transport over HTTPS using the shared reqwest client
#[derive(Debug, Clone)]
pub struct HttpTransport {
    endpoint: String,
    token: Option<String>,
    api_version: String,
}

impl HttpTransport {
    pub fn new(config: &ApiConfig, token: Option<String>) -> Self {
        Self {
            endpoint: config.endpoint.clone(),
            token,
            api_version: config.api_version.clone(),
        }
    }
}

#[async_trait]
impl Transport for HttpTransport {
    async fn post(&self, request: &GraphQlRequest) -> Result<serde_json::Value, ApiError> {
        let client = &*HTTP_CLIENT;

        let mut builder = client
            .post(&self.endpoint)
            .header("Content-Type", "application/json")
            .header("API-Version", &self.api_version)
            .json(request);
        if let Some(token) = &self.token {
            builder = builder.header("Authorization", token);
        }

        let response = builder.send().await.map_err(|e| {
            let message = if e.is_timeout() {
                format!("request timed out: {}", e)
            } else {
                e.to_string()
            };
            ApiError::transport(e.status().map(|s| s.as_u16()), message)
        })?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(ApiError::transport(
                Some(status.as_u16()),
                format!("HTTP {}: {}", status, body.trim()),
            ));
        }

        response
            .json::<serde_json::Value>()
            .await
            .map_err(|e| ApiError::Decode(e.to_string()))
    }
}
