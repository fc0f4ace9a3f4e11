//! REST Proxy consumer instances
//!
//! A consumer instance lives inside the proxy. It is created per group,
//! subscribed to the input topics, polled through `GET …/records` and
//! committed explicitly: auto-commit is disabled so an offset only moves
//! once the stage has finished with the record.

use async_trait::async_trait;
use reqwest::header::{ACCEPT, CONTENT_TYPE};
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use std::time::Duration;
use tracing::{debug, info, warn};

use crate::error::{ClientError, Result};
use crate::{Consumer, Delivery, JSON_RECORDS, PROXY_V2, RestProxy};

#[derive(Serialize)]
struct CreateInstance<'a> {
    name: &'a str,
    format: &'a str,
    #[serde(rename = "auto.offset.reset")]
    auto_offset_reset: &'a str,
    #[serde(rename = "auto.commit.enable")]
    auto_commit_enable: &'a str,
}

#[derive(Deserialize)]
struct InstanceCreated {
    instance_id: String,
    base_uri: String,
}

#[derive(Serialize)]
struct Subscription<'a> {
    topics: &'a [String],
}

#[derive(Deserialize)]
struct ConsumedRecord {
    topic: String,
    #[serde(default)]
    key: serde_json::Value,
    value: serde_json::Value,
    partition: i32,
    offset: i64,
}

#[derive(Serialize)]
struct CommitOffsets<'a> {
    offsets: [OffsetPosition<'a>; 1],
}

#[derive(Serialize)]
struct OffsetPosition<'a> {
    topic: &'a str,
    partition: i32,
    offset: i64,
}

impl From<ConsumedRecord> for Delivery {
    fn from(record: ConsumedRecord) -> Self {
        let key = match record.key {
            serde_json::Value::Null => None,
            serde_json::Value::String(s) => Some(s),
            other => Some(other.to_string()),
        };
        Delivery {
            topic: record.topic,
            partition: record.partition,
            offset: record.offset,
            key,
            value: record.value,
        }
    }
}

impl RestProxy {
    // =============================================================================
    // Consumer Instances
    // =============================================================================

    /// Create a consumer instance for `group` and subscribe it to `topics`
    ///
    /// New groups start from the earliest offset so that nothing published
    /// before the first stage start is lost.
    pub async fn consumer(&self, group: &str, topics: &[String]) -> Result<RestConsumer> {
        let name = format!("{}-{}", group, uuid::Uuid::new_v4());
        let url = format!("{}/consumers/{}", self.base_url, group);

        let created: InstanceCreated = self
            .retry
            .run("create consumer instance", || async {
                let response = self
                    .client
                    .post(&url)
                    .header(CONTENT_TYPE, PROXY_V2)
                    .json(&CreateInstance {
                        name: &name,
                        format: "json",
                        auto_offset_reset: "earliest",
                        auto_commit_enable: "false",
                    })
                    .send()
                    .await?;
                Self::handle_response(response).await
            })
            .await?;

        info!(
            "Created consumer instance {} in group {}",
            created.instance_id, group
        );

        let subscription_url = format!("{}/subscription", created.base_uri);
        self.retry
            .run("subscribe consumer", || async {
                let response = self
                    .client
                    .post(&subscription_url)
                    .header(CONTENT_TYPE, PROXY_V2)
                    .json(&Subscription { topics })
                    .send()
                    .await?;
                Self::handle_empty_response(response).await
            })
            .await?;

        debug!("Consumer {} subscribed to {:?}", created.instance_id, topics);

        Ok(RestConsumer {
            proxy: self.clone(),
            base_uri: created.base_uri,
            buffered: VecDeque::new(),
        })
    }
}

/// Consumer instance living in the REST proxy
pub struct RestConsumer {
    proxy: RestProxy,
    base_uri: String,
    /// Records fetched by the last request but not handed out yet
    buffered: VecDeque<Delivery>,
}

impl RestConsumer {
    async fn fetch(&self, timeout: Duration) -> Result<Vec<ConsumedRecord>> {
        let url = format!(
            "{}/records?timeout={}",
            self.base_uri,
            timeout.as_millis()
        );

        self.proxy
            .retry
            .run("fetch records", || async {
                let response = self
                    .proxy
                    .client
                    .get(&url)
                    .header(ACCEPT, JSON_RECORDS)
                    .send()
                    .await?;
                RestProxy::handle_response(response).await
            })
            .await
    }
}

#[async_trait]
impl Consumer for RestConsumer {
    async fn poll(&mut self, timeout: Duration) -> Result<Option<Delivery>> {
        if let Some(delivery) = self.buffered.pop_front() {
            return Ok(Some(delivery));
        }

        let started = tokio::time::Instant::now();
        let records = self.fetch(timeout).await?;

        if records.is_empty() {
            // The proxy may answer an empty fetch early; keep the caller's
            // cadence so idle polls stay one timeout apart.
            let elapsed = started.elapsed();
            if elapsed < timeout {
                tokio::time::sleep(timeout - elapsed).await;
            }
            return Ok(None);
        }

        debug!("Fetched {} record(s)", records.len());
        self.buffered.extend(records.into_iter().map(Delivery::from));
        Ok(self.buffered.pop_front())
    }

    async fn commit(&mut self, delivery: &Delivery) -> Result<()> {
        let url = format!("{}/offsets", self.base_uri);
        // The v2 proxy commits `offset + 1` for the offsets it is given.
        let body = CommitOffsets {
            offsets: [OffsetPosition {
                topic: &delivery.topic,
                partition: delivery.partition,
                offset: delivery.offset,
            }],
        };

        let result = self
            .proxy
            .retry
            .run("commit offset", || async {
                let response = self
                    .proxy
                    .client
                    .post(&url)
                    .header(CONTENT_TYPE, PROXY_V2)
                    .json(&body)
                    .send()
                    .await?;
                RestProxy::handle_empty_response(response).await
            })
            .await;

        if let Err(ClientError::ApiError { status: 404, .. }) = &result {
            warn!("Consumer instance {} expired before commit", self.base_uri);
        }
        result
    }

    /// Deletes the consumer instance from the proxy
    ///
    /// Uncommitted records are redelivered to the next instance of the group.
    async fn close(&mut self) -> Result<()> {
        self.buffered.clear();
        let response = self
            .proxy
            .client
            .delete(&self.base_uri)
            .header(CONTENT_TYPE, PROXY_V2)
            .send()
            .await?;
        RestProxy::handle_empty_response(response).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_consumed_record_keys() {
        let record: ConsumedRecord = serde_json::from_value(json!({
            "topic": "raw.sparql.out",
            "key": "2024-01-01_A",
            "value": { "run_id": "2024-01-01_A" },
            "partition": 2,
            "offset": 41
        }))
        .unwrap();

        let delivery = Delivery::from(record);
        assert_eq!(delivery.key.as_deref(), Some("2024-01-01_A"));
        assert_eq!(delivery.partition, 2);
        assert_eq!(delivery.offset, 41);

        let keyless: ConsumedRecord = serde_json::from_value(json!({
            "topic": "t", "key": null, "value": 1, "partition": 0, "offset": 0
        }))
        .unwrap();
        assert_eq!(Delivery::from(keyless).key, None);
    }

    #[test]
    fn test_create_instance_body() {
        let body = serde_json::to_value(CreateInstance {
            name: "stage-1",
            format: "json",
            auto_offset_reset: "earliest",
            auto_commit_enable: "false",
        })
        .unwrap();

        assert_eq!(body["auto.commit.enable"], "false");
        assert_eq!(body["auto.offset.reset"], "earliest");
    }
}
