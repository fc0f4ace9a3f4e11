//! API client module
//!
//! HTTP client for the web agent's read-only endpoints.

use anyhow::{Context, Result};
use reqwest::Client;

use crate::types::DeploymentStatus;

/// HTTP client for the web agent
pub struct WebClient {
    base_url: String,
    client: Client,
}

impl WebClient {
    /// Create a new client
    ///
    /// # Arguments
    /// * `base_url` - The base URL of the web agent
    pub fn new(base_url: &str) -> Self {
        Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            client: Client::new(),
        }
    }

    /// Live generation and the generations kept on disk
    pub async fn deployment_status(&self) -> Result<DeploymentStatus> {
        let url = format!("{}/api/deployment", self.base_url);
        let response = self
            .client
            .get(&url)
            .send()
            .await
            .context("Failed to send deployment status request")?;

        self.handle_response(response).await
    }

    /// Whether the web agent reports itself healthy
    pub async fn health(&self) -> Result<bool> {
        let url = format!("{}/health", self.base_url);
        let response = self
            .client
            .get(&url)
            .send()
            .await
            .context("Failed to send health request")?;

        Ok(response.status().is_success())
    }

    async fn handle_response<T: serde::de::DeserializeOwned>(
        &self,
        response: reqwest::Response,
    ) -> Result<T> {
        if !response.status().is_success() {
            let status = response.status();
            let error_text = response.text().await.unwrap_or_default();
            anyhow::bail!("Request failed with status {}: {}", status, error_text);
        }

        response
            .json()
            .await
            .context("Failed to parse response JSON")
    }
}
