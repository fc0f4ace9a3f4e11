//! Stagehand Broker Client
//!
//! Channel plumbing shared by every Stagehand process. Stages never talk to
//! each other directly: they consume records from topics and produce records
//! to topics through the traits defined here.
//!
//! Two brokers implement the traits:
//! - [`RestProxy`]: a Kafka cluster fronted by the Confluent REST Proxy (v2 API)
//! - [`MemoryBroker`]: an in-process broker with the same delivery semantics,
//!   used by tests and single-process setups
//!
//! # Example
//!
//! ```no_run
//! use stagehand_client::{Consumer, RestProxy, publish};
//! use std::time::Duration;
//!
//! #[tokio::main]
//! async fn main() -> stagehand_client::Result<()> {
//!     let proxy = RestProxy::new("http://localhost:8082");
//!
//!     publish(&proxy, "cmd.query_agent", None, &serde_json::json!({
//!         "date": "2024-06-20",
//!         "collection": "OJ",
//!     })).await?;
//!
//!     let mut consumer = proxy.consumer("cli", &["logs.app".to_string()]).await?;
//!     while let Some(delivery) = consumer.poll(Duration::from_secs(1)).await? {
//!         println!("{}", delivery.value);
//!     }
//!     Ok(())
//! }
//! ```

pub mod error;
pub mod memory;
pub mod retry;
mod consumer;
mod producer;

// Re-export commonly used types
pub use consumer::RestConsumer;
pub use error::{ClientError, Result};
pub use memory::{MemoryBroker, MemoryConsumer};
pub use retry::RetryPolicy;

use async_trait::async_trait;
use reqwest::Client;
use serde::Serialize;
use serde::de::DeserializeOwned;
use std::sync::Arc;
use std::time::Duration;

/// A record handed out by a consumer
#[derive(Debug, Clone, PartialEq)]
pub struct Delivery {
    /// Topic the record was read from
    pub topic: String,
    pub partition: i32,
    pub offset: i64,
    pub key: Option<String>,
    /// Record payload; schema validation happens when the consumer decodes it
    pub value: serde_json::Value,
}

/// Reading side of a channel
///
/// Records of one partition are handed out in log order. A record is
/// redelivered after a restart unless it (or a later record of the same
/// partition) was committed.
#[async_trait]
pub trait Consumer: Send {
    /// Waits up to `timeout` for the next record
    ///
    /// Dropping the returned future before it completes loses nothing: the
    /// record stays available for the next poll.
    async fn poll(&mut self, timeout: Duration) -> Result<Option<Delivery>>;

    /// Marks `delivery` and everything before it on its partition as processed
    async fn commit(&mut self, delivery: &Delivery) -> Result<()>;

    /// Leaves the consumer group; uncommitted records go back to the group
    async fn close(&mut self) -> Result<()> {
        Ok(())
    }
}

/// Writing side of a channel
#[async_trait]
pub trait Producer: Send + Sync {
    /// Publishes `value` and waits until the broker confirms it
    async fn produce(&self, topic: &str, key: Option<&str>, value: &serde_json::Value)
    -> Result<()>;
}

#[async_trait]
impl<P: Producer + ?Sized> Producer for Arc<P> {
    async fn produce(
        &self,
        topic: &str,
        key: Option<&str>,
        value: &serde_json::Value,
    ) -> Result<()> {
        (**self).produce(topic, key, value).await
    }
}

/// Serializes `message` and publishes it on `topic`
pub async fn publish<P, T>(producer: &P, topic: &str, key: Option<&str>, message: &T) -> Result<()>
where
    P: Producer + ?Sized,
    T: Serialize + ?Sized,
{
    let value = serde_json::to_value(message)?;
    producer.produce(topic, key, &value).await
}

/// Client for the Confluent REST Proxy (v2 API)
///
/// Producing goes through `POST /topics/{topic}`; consuming creates a
/// consumer instance per [`RestProxy::consumer`] call. All records use the
/// JSON embedded format.
#[derive(Debug, Clone)]
pub struct RestProxy {
    /// Base URL of the proxy (e.g., "http://localhost:8082")
    base_url: String,
    /// HTTP client instance
    client: Client,
    /// Backoff for transient failures
    retry: RetryPolicy,
}

impl RestProxy {
    /// Create a new proxy client
    ///
    /// # Example
    /// ```
    /// use stagehand_client::RestProxy;
    ///
    /// let proxy = RestProxy::new("http://localhost:8082/");
    /// assert_eq!(proxy.base_url(), "http://localhost:8082");
    /// ```
    pub fn new(base_url: impl Into<String>) -> Self {
        Self::with_client(base_url, Client::new())
    }

    /// Create a new proxy client with a custom HTTP client
    ///
    /// This allows you to configure timeouts, proxies, TLS settings, etc.
    pub fn with_client(base_url: impl Into<String>, client: Client) -> Self {
        let base_url = base_url.into();
        Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            client,
            retry: RetryPolicy::default(),
        }
    }

    /// Replace the retry policy
    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    /// Get the base URL of the proxy
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    // =============================================================================
    // Response Handlers
    // =============================================================================

    /// Check the status code and deserialize the JSON body
    async fn handle_response<T: DeserializeOwned>(response: reqwest::Response) -> Result<T> {
        let status = response.status();

        if !status.is_success() {
            let error_text = response
                .text()
                .await
                .unwrap_or_else(|_| "Unknown error".to_string());
            return Err(ClientError::api_error(status.as_u16(), error_text));
        }

        response
            .json()
            .await
            .map_err(|e| ClientError::ParseError(format!("Failed to parse JSON response: {}", e)))
    }

    /// Check the status code of a response without a body
    async fn handle_empty_response(response: reqwest::Response) -> Result<()> {
        let status = response.status();

        if !status.is_success() {
            let error_text = response
                .text()
                .await
                .unwrap_or_else(|_| "Unknown error".to_string());
            return Err(ClientError::api_error(status.as_u16(), error_text));
        }

        Ok(())
    }
}

/// Content type of JSON embedded-format record requests
const JSON_RECORDS: &str = "application/vnd.kafka.json.v2+json";

/// Content type of proxy control requests
const PROXY_V2: &str = "application/vnd.kafka.v2+json";
