//! SPARQL repository
//!
//! Runs a query against a SPARQL endpoint and returns the results document
//! untouched. Interpreting the bindings is the business of later stages.

use anyhow::{Context, Result};
use async_trait::async_trait;
use reqwest::Client;
use reqwest::header::ACCEPT;
use std::time::Duration;

/// Media type of SPARQL JSON results
pub const SPARQL_RESULTS_JSON: &str = "application/sparql-results+json";

/// Repository trait for SPARQL endpoints
#[async_trait]
pub trait SparqlRepository: Send + Sync {
    /// Executes `query` at `endpoint`, returning the JSON results document
    async fn select(&self, endpoint: &str, query: &str) -> Result<String>;
}

/// HTTP implementation of SparqlRepository
///
/// Uses the SPARQL 1.1 protocol's form-encoded POST.
pub struct HttpSparqlRepository {
    client: Client,
}

impl HttpSparqlRepository {
    /// Creates a repository whose requests give up after `timeout`
    pub fn new(timeout: Duration) -> Result<Self> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .context("Failed to build SPARQL HTTP client")?;

        Ok(Self { client })
    }
}

#[async_trait]
impl SparqlRepository for HttpSparqlRepository {
    async fn select(&self, endpoint: &str, query: &str) -> Result<String> {
        let response = self
            .client
            .post(endpoint)
            .header(ACCEPT, SPARQL_RESULTS_JSON)
            .form(&[("query", query)])
            .send()
            .await
            .with_context(|| format!("Failed to reach SPARQL endpoint {}", endpoint))?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            anyhow::bail!("SPARQL endpoint {} returned {} - {}", endpoint, status, body);
        }

        response
            .text()
            .await
            .context("Failed to read SPARQL results")
    }
}
