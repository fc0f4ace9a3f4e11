//! REST Proxy producer
//!
//! `POST /topics/{topic}` returns once the proxy has the broker's answer for
//! every record, so a successful response is a delivery confirmation. The
//! per-record entries still have to be checked: the request as a whole can
//! succeed while a record was refused.

use async_trait::async_trait;
use reqwest::header::{ACCEPT, CONTENT_TYPE};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::{ClientError, Result};
use crate::{JSON_RECORDS, PROXY_V2, Producer, RestProxy};

#[derive(Serialize)]
struct ProduceRequest<'a> {
    records: [OutgoingRecord<'a>; 1],
}

#[derive(Serialize)]
struct OutgoingRecord<'a> {
    #[serde(skip_serializing_if = "Option::is_none")]
    key: Option<&'a str>,
    value: &'a serde_json::Value,
}

#[derive(Debug, Deserialize)]
struct ProduceResponse {
    offsets: Vec<RecordOutcome>,
}

#[derive(Debug, Deserialize)]
struct RecordOutcome {
    partition: Option<i32>,
    offset: Option<i64>,
    error_code: Option<i64>,
    error: Option<String>,
}

impl ProduceResponse {
    /// First refused record, if any
    fn rejection(&self) -> Option<String> {
        self.offsets
            .iter()
            .find(|o| o.error_code.is_some() || o.error.is_some())
            .map(|o| {
                format!(
                    "{} (code {})",
                    o.error.as_deref().unwrap_or("unknown error"),
                    o.error_code.unwrap_or_default()
                )
            })
    }
}

#[async_trait]
impl Producer for RestProxy {
    async fn produce(
        &self,
        topic: &str,
        key: Option<&str>,
        value: &serde_json::Value,
    ) -> Result<()> {
        let url = format!("{}/topics/{}", self.base_url, topic);
        let body = serde_json::to_vec(&ProduceRequest {
            records: [OutgoingRecord { key, value }],
        })?;

        let outcome: ProduceResponse = self
            .retry
            .run("produce", || async {
                let response = self
                    .client
                    .post(&url)
                    .header(CONTENT_TYPE, JSON_RECORDS)
                    .header(ACCEPT, PROXY_V2)
                    .body(body.clone())
                    .send()
                    .await?;
                Self::handle_response(response).await
            })
            .await?;

        if let Some(reason) = outcome.rejection() {
            return Err(ClientError::Rejected(format!("{}: {}", topic, reason)));
        }

        if let Some(first) = outcome.offsets.first() {
            debug!(
                "Produced to {} partition {:?} offset {:?}",
                topic, first.partition, first.offset
            );
        }
        Ok(())
    }
}
