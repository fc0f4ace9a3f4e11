//! In-memory broker
//!
//! Keeps one append-only log per topic (a single partition) and one
//! committed offset per consumer group and topic. A consumer created for a
//! group resumes from the group's committed offsets, so anything that was
//! handed out but never committed is delivered again. That is the
//! at-least-once behaviour stages have to live with on the real broker.

use async_trait::async_trait;
use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;
use tokio::sync::Notify;
use tokio::time::Instant;

use crate::error::{ClientError, Result};
use crate::{Consumer, Delivery, Producer};

#[derive(Debug, Clone)]
struct Record {
    key: Option<String>,
    value: serde_json::Value,
}

#[derive(Default)]
struct State {
    topics: HashMap<String, Vec<Record>>,
    /// (group, topic) -> next offset to deliver
    committed: HashMap<(String, String), i64>,
    /// Topics that refuse writes
    unavailable: HashSet<String>,
}

#[derive(Default)]
struct Shared {
    state: Mutex<State>,
    appended: Notify,
}

/// In-process broker
///
/// Cloning is cheap and every clone sees the same topics.
#[derive(Clone, Default)]
pub struct MemoryBroker {
    shared: Arc<Shared>,
}

impl MemoryBroker {
    /// Creates an empty broker
    pub fn new() -> Self {
        Self::default()
    }

    fn state(&self) -> MutexGuard<'_, State> {
        match self.shared.state.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }

    /// Creates a consumer for `group` subscribed to `topics`
    ///
    /// The consumer starts at the group's committed offsets, or at the
    /// beginning of each topic if the group never committed.
    pub fn consumer(&self, group: &str, topics: &[String]) -> MemoryConsumer {
        let state = self.state();
        let positions = topics
            .iter()
            .map(|topic| {
                let committed = state
                    .committed
                    .get(&(group.to_string(), topic.clone()))
                    .copied()
                    .unwrap_or(0);
                (topic.clone(), committed)
            })
            .collect();

        MemoryConsumer {
            broker: self.clone(),
            group: group.to_string(),
            topics: topics.to_vec(),
            positions,
            next_topic: 0,
        }
    }

    /// All record values of `topic`, oldest first
    pub fn records(&self, topic: &str) -> Vec<serde_json::Value> {
        self.state()
            .topics
            .get(topic)
            .map(|records| records.iter().map(|r| r.value.clone()).collect())
            .unwrap_or_default()
    }

    /// All record keys of `topic`, oldest first
    pub fn keys(&self, topic: &str) -> Vec<Option<String>> {
        self.state()
            .topics
            .get(topic)
            .map(|records| records.iter().map(|r| r.key.clone()).collect())
            .unwrap_or_default()
    }

    /// Committed offset of `group` on `topic`, if any
    pub fn committed(&self, group: &str, topic: &str) -> Option<i64> {
        self.state()
            .committed
            .get(&(group.to_string(), topic.to_string()))
            .copied()
    }

    /// Makes writes to `topic` fail until [`MemoryBroker::restore`] is called
    pub fn make_unavailable(&self, topic: &str) {
        self.state().unavailable.insert(topic.to_string());
    }

    /// Accepts writes to `topic` again
    pub fn restore(&self, topic: &str) {
        self.state().unavailable.remove(topic);
    }
}

#[async_trait]
impl Producer for MemoryBroker {
    async fn produce(
        &self,
        topic: &str,
        key: Option<&str>,
        value: &serde_json::Value,
    ) -> Result<()> {
        {
            let mut state = self.state();
            if state.unavailable.contains(topic) {
                return Err(ClientError::Unavailable(topic.to_string()));
            }
            state
                .topics
                .entry(topic.to_string())
                .or_default()
                .push(Record {
                    key: key.map(str::to_string),
                    value: value.clone(),
                });
        }
        self.shared.appended.notify_waiters();
        Ok(())
    }
}

/// Consumer handed out by [`MemoryBroker::consumer`]
pub struct MemoryConsumer {
    broker: MemoryBroker,
    group: String,
    topics: Vec<String>,
    /// topic -> next offset this consumer will hand out
    positions: HashMap<String, i64>,
    /// Round-robin start so one busy topic cannot starve the others
    next_topic: usize,
}

impl MemoryConsumer {
    fn take_next(&mut self) -> Option<Delivery> {
        let state = self.broker.state();
        let count = self.topics.len();

        for i in 0..count {
            let topic = &self.topics[(self.next_topic + i) % count];
            let position = self.positions.get(topic).copied().unwrap_or(0);
            let Some(record) = state
                .topics
                .get(topic)
                .and_then(|records| records.get(position as usize))
            else {
                continue;
            };

            let delivery = Delivery {
                topic: topic.clone(),
                partition: 0,
                offset: position,
                key: record.key.clone(),
                value: record.value.clone(),
            };
            self.positions.insert(topic.clone(), position + 1);
            self.next_topic = (self.next_topic + i + 1) % count;
            return Some(delivery);
        }

        None
    }
}

#[async_trait]
impl Consumer for MemoryConsumer {
    async fn poll(&mut self, timeout: Duration) -> Result<Option<Delivery>> {
        let deadline = Instant::now() + timeout;
        let shared = Arc::clone(&self.broker.shared);

        loop {
            // Register interest before looking, so an append between the
            // check and the wait still wakes us.
            let appended = shared.appended.notified();
            tokio::pin!(appended);
            appended.as_mut().enable();

            if let Some(delivery) = self.take_next() {
                return Ok(Some(delivery));
            }

            if tokio::time::timeout_at(deadline, appended).await.is_err() {
                return Ok(None);
            }
        }
    }

    async fn commit(&mut self, delivery: &Delivery) -> Result<()> {
        let mut state = self.broker.state();
        let slot = state
            .committed
            .entry((self.group.clone(), delivery.topic.clone()))
            .or_insert(0);
        *slot = (*slot).max(delivery.offset + 1);
        Ok(())
    }
}
