//! Log forwarder
//!
//! Drains the log buffer on an interval and publishes each record to the
//! log channel. Forwarding is best-effort: a record that cannot be
//! delivered is dropped, and the operation that logged it never notices.

use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use stagehand_client::{Producer, publish};

use crate::logging::FORWARDER_TARGET;
use crate::service::log_buffer::LogBufferService;

/// Spawns the background task that ships buffered logs
///
/// The task stops when `shutdown` is cancelled, after one final drain so
/// the shutdown messages themselves reach the channel.
pub fn spawn_log_forwarder(
    buffer: Arc<dyn LogBufferService>,
    producer: Arc<dyn Producer>,
    topic: String,
    interval: Duration,
    shutdown: CancellationToken,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = time::interval(interval);

        loop {
            tokio::select! {
                _ = shutdown.cancelled() => break,
                _ = ticker.tick() => {}
            }
            forward(buffer.as_ref(), producer.as_ref(), &topic).await;
        }

        forward(buffer.as_ref(), producer.as_ref(), &topic).await;
    })
}

/// Publishes everything currently buffered; returns the number delivered
pub async fn forward(buffer: &dyn LogBufferService, producer: &dyn Producer, topic: &str) -> usize {
    let records = buffer.drain();
    if records.is_empty() {
        return 0;
    }

    let total = records.len();
    let mut delivered = 0;
    for record in &records {
        match publish(producer, topic, None, record).await {
            Ok(()) => delivered += 1,
            Err(e) => {
                warn!(target: FORWARDER_TARGET, "Failed to forward log record: {}", e);
            }
        }
    }

    debug!(target: FORWARDER_TARGET, "Forwarded {}/{} log records", delivered, total);
    delivered
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::service::log_buffer::InMemoryLogBuffer;
    use stagehand_client::MemoryBroker;
    use stagehand_core::domain::monitor::{LogLevel, LogRecord};

    fn record(msg: &str) -> LogRecord {
        LogRecord {
            ts: 1.0,
            component: "query".to_string(),
            level: LogLevel::Error,
            msg: msg.to_string(),
        }
    }

    #[tokio::test]
    async fn test_forward_publishes_records() {
        let buffer = InMemoryLogBuffer::new(10);
        buffer.add_entry(record("boom"));
        let broker = MemoryBroker::new();

        let delivered = forward(&buffer, &broker, "logs.app").await;

        assert_eq!(delivered, 1);
        let logs = broker.records("logs.app");
        assert_eq!(logs[0]["msg"], "boom");
        assert_eq!(logs[0]["level"], "ERROR");
        assert_eq!(logs[0]["component"], "query");
    }

    #[tokio::test]
    async fn test_unavailable_channel_drops_records() {
        let buffer = InMemoryLogBuffer::new(10);
        buffer.add_entry(record("lost"));
        let broker = MemoryBroker::new();
        broker.make_unavailable("logs.app");

        assert_eq!(forward(&buffer, &broker, "logs.app").await, 0);
        assert!(buffer.drain().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_forwarder_flushes_on_shutdown() {
        let buffer = Arc::new(InMemoryLogBuffer::new(10));
        let broker = Arc::new(MemoryBroker::new());
        let shutdown = CancellationToken::new();

        let handle = spawn_log_forwarder(
            buffer.clone(),
            broker.clone(),
            "logs.app".to_string(),
            Duration::from_secs(60),
            shutdown.clone(),
        );

        // Let the first (immediate) tick pass, then log something
        tokio::time::sleep(Duration::from_millis(10)).await;
        buffer.add_entry(record("last words"));
        shutdown.cancel();
        handle.await.unwrap();

        assert_eq!(broker.records("logs.app").len(), 1);
    }
}
