//! Heartbeat emitter
//!
//! Heartbeats are the only liveness signal external monitors get from a
//! stage. Sending one is best-effort: a lost heartbeat looks like a short
//! gap to the monitor, while a failed stage loop would look like an outage.

use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;
use tracing::{debug, warn};

use stagehand_client::{Producer, publish};
use stagehand_core::domain::monitor::Heartbeat;

pub struct Heartbeater {
    producer: Arc<dyn Producer>,
    topic: String,
    component: String,
    interval: Duration,
    last: Instant,
    sent: u64,
}

impl Heartbeater {
    pub fn new(
        producer: Arc<dyn Producer>,
        topic: impl Into<String>,
        component: impl Into<String>,
        interval: Duration,
    ) -> Self {
        Self {
            producer,
            topic: topic.into(),
            component: component.into(),
            interval,
            last: Instant::now(),
            sent: 0,
        }
    }

    /// True once a full interval passed since the last heartbeat
    pub fn is_due(&self) -> bool {
        self.last.elapsed() >= self.interval
    }

    /// Number of heartbeats delivered so far
    pub fn sent(&self) -> u64 {
        self.sent
    }

    /// Sends a heartbeat now
    pub async fn beat(&mut self) {
        self.last = Instant::now();

        let heartbeat = Heartbeat::now(&self.component);
        match publish(self.producer.as_ref(), &self.topic, None, &heartbeat).await {
            Ok(()) => {
                self.sent += 1;
                debug!("Heartbeat sent to {}", self.topic);
            }
            Err(e) => warn!("Failed to send heartbeat: {}", e),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use stagehand_client::MemoryBroker;

    #[tokio::test(start_paused = true)]
    async fn test_beat_publishes_component() {
        let broker = Arc::new(MemoryBroker::new());
        let mut hb = Heartbeater::new(broker.clone(), "hb.query", "query", Duration::from_secs(1));

        assert!(!hb.is_due());
        tokio::time::advance(Duration::from_secs(1)).await;
        assert!(hb.is_due());

        hb.beat().await;
        assert!(!hb.is_due());
        assert_eq!(hb.sent(), 1);

        let records = broker.records("hb.query");
        assert_eq!(records.len(), 1);
        assert_eq!(records[0]["component"], "query");
        assert!(records[0]["ts"].as_f64().is_some());
    }

    #[tokio::test]
    async fn test_failed_heartbeat_is_not_counted() {
        let broker = Arc::new(MemoryBroker::new());
        broker.make_unavailable("hb.query");
        let mut hb = Heartbeater::new(broker.clone(), "hb.query", "query", Duration::from_secs(1));

        hb.beat().await;
        assert_eq!(hb.sent(), 0);
    }
}
