//! Stage runtime
//!
//! Drives one stage: poll, decode, process, deliver, acknowledge.
//! Each iteration handles at most one record, so records of a partition are
//! processed strictly in arrival order.
//!
//! Acknowledgement rules:
//! - a record with output is committed only after the output is confirmed
//! - records that can never succeed (malformed, refused output) are
//!   committed so they do not block the partition
//! - failed records are logged once and committed; retrying them is the
//!   producer's business, not the stage's
//! - on shutdown, a record that was dequeued but not yet committed stays
//!   uncommitted and is redelivered on restart

use serde_json::Value as JsonValue;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{Instrument, debug, error, info, info_span, warn};

use stagehand_client::{Consumer, Delivery, Producer};

use crate::runtime::heartbeat::Heartbeater;
use crate::runtime::stage::{Origin, Stage, StageError};

/// Tunables of a stage runtime
#[derive(Debug, Clone)]
pub struct RuntimeOptions {
    /// Poll timeout; an idle poll of this length emits a heartbeat
    pub heartbeat_interval: Duration,

    /// Upper bound on a single `Stage::process` call
    pub transform_timeout: Duration,

    /// Pause between attempts to deliver output while the broker is down
    pub redelivery_backoff: Duration,
}

impl Default for RuntimeOptions {
    fn default() -> Self {
        Self {
            heartbeat_interval: Duration::from_secs(1),
            transform_timeout: Duration::from_secs(60),
            redelivery_backoff: Duration::from_secs(1),
        }
    }
}

/// Counters reported when the runtime stops
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RuntimeStats {
    /// Messages handled successfully
    pub processed: u64,
    /// Messages whose transform or delivery failed
    pub failed: u64,
    /// Malformed messages dropped without processing
    pub discarded: u64,
    /// Heartbeats delivered
    pub heartbeats: u64,
}

/// What happened to one record
enum Outcome {
    /// Handled; commit it
    Done,
    /// Failed or dropped; commit it so the partition moves on
    Skipped,
    /// Shutdown interrupted delivery; leave it for redelivery
    Abandoned,
}

/// Generic consume/transform/produce loop
pub struct StageRuntime<S: Stage> {
    stage: S,
    consumer: Box<dyn Consumer>,
    producer: Arc<dyn Producer>,
    output_topic: Option<String>,
    heartbeat: Heartbeater,
    options: RuntimeOptions,
    stats: RuntimeStats,
}

impl<S: Stage> StageRuntime<S> {
    /// Creates a runtime for `stage`
    ///
    /// `consumer` must already be subscribed to the stage's input topics.
    /// Heartbeats go to `heartbeat_topic` through `producer`, the same
    /// producer used for the output topic.
    pub fn new(
        stage: S,
        consumer: Box<dyn Consumer>,
        producer: Arc<dyn Producer>,
        output_topic: Option<String>,
        heartbeat_topic: impl Into<String>,
        options: RuntimeOptions,
    ) -> Self {
        let heartbeat = Heartbeater::new(
            Arc::clone(&producer),
            heartbeat_topic,
            stage.name().to_string(),
            options.heartbeat_interval,
        );

        Self {
            stage,
            consumer,
            producer,
            output_topic,
            heartbeat,
            options,
            stats: RuntimeStats::default(),
        }
    }

    /// Runs until `shutdown` is cancelled
    ///
    /// Never fails: every per-message error is logged and contained here.
    pub async fn run(mut self, shutdown: CancellationToken) -> RuntimeStats {
        info!(
            "Starting stage {} (heartbeat interval: {:?}, output: {})",
            self.stage.name(),
            self.options.heartbeat_interval,
            self.output_topic.as_deref().unwrap_or("none")
        );

        loop {
            let polled = tokio::select! {
                biased;
                _ = shutdown.cancelled() => break,
                polled = self.consumer.poll(self.options.heartbeat_interval) => polled,
            };

            match polled {
                Ok(None) => {
                    self.heartbeat.beat().await;
                }
                Ok(Some(delivery)) => {
                    let outcome = self.handle(&delivery, &shutdown).await;
                    match outcome {
                        Outcome::Done | Outcome::Skipped => self.acknowledge(&delivery).await,
                        Outcome::Abandoned => break,
                    }

                    if self.heartbeat.is_due() {
                        self.heartbeat.beat().await;
                    }
                }
                Err(e) => {
                    error!("Failed to poll input: {}", e);
                    tokio::select! {
                        _ = shutdown.cancelled() => break,
                        _ = tokio::time::sleep(self.options.heartbeat_interval) => {}
                    }
                    self.heartbeat.beat().await;
                }
            }
        }

        if let Err(e) = self.consumer.close().await {
            warn!("Failed to close consumer: {}", e);
        }

        self.stats.heartbeats = self.heartbeat.sent();
        info!("Stage {} stopped: {:?}", self.stage.name(), self.stats);
        self.stats
    }

    async fn handle(&mut self, delivery: &Delivery, shutdown: &CancellationToken) -> Outcome {
        let run_id = delivery
            .value
            .get("run_id")
            .and_then(JsonValue::as_str)
            .unwrap_or("-")
            .to_string();

        let span = info_span!(
            "message",
            stage = %self.stage.name(),
            run_id = %run_id,
            topic = %delivery.topic,
            offset = delivery.offset
        );

        self.handle_in_span(delivery, &run_id, shutdown)
            .instrument(span)
            .await
    }

    async fn handle_in_span(
        &mut self,
        delivery: &Delivery,
        run_id: &str,
        shutdown: &CancellationToken,
    ) -> Outcome {
        debug!("Message received");

        let input = match serde_json::from_value::<S::Input>(delivery.value.clone()) {
            Ok(input) => input,
            Err(e) => {
                warn!("Discarding malformed message: {}", e);
                self.stats.discarded += 1;
                return Outcome::Skipped;
            }
        };

        let origin = Origin::from(delivery);
        let result = match tokio::time::timeout(
            self.options.transform_timeout,
            self.stage.process(&origin, input),
        )
        .await
        {
            Ok(result) => result,
            Err(_) => Err(StageError::Timeout(self.options.transform_timeout)),
        };

        let output = match result {
            Ok(output) => output,
            Err(StageError::Malformed(reason)) => {
                warn!("Discarding malformed message: {}", reason);
                self.stats.discarded += 1;
                return Outcome::Skipped;
            }
            Err(e @ StageError::UnknownAction(_)) => {
                warn!("Skipping message for run {}: {}", run_id, e);
                self.stats.failed += 1;
                return Outcome::Skipped;
            }
            Err(e) => {
                error!("Stage failed for run {}: {:#}", run_id, e);
                self.stats.failed += 1;
                return Outcome::Skipped;
            }
        };

        let (Some(output), Some(topic)) = (output, self.output_topic.clone()) else {
            self.stats.processed += 1;
            return Outcome::Done;
        };

        let value = match serde_json::to_value(&output) {
            Ok(value) => value,
            Err(e) => {
                error!("Failed to encode output for run {}: {}", run_id, e);
                self.stats.failed += 1;
                return Outcome::Skipped;
            }
        };

        // The query stage mints the run id, so prefer the output's
        let key = value
            .get("run_id")
            .and_then(JsonValue::as_str)
            .map(str::to_string)
            .or_else(|| (run_id != "-").then(|| run_id.to_string()));
        let label = key.clone().unwrap_or_else(|| run_id.to_string());
        self.deliver(&topic, key.as_deref(), &value, &label, shutdown)
            .await
    }

    /// Produces `value`, retrying while the broker is unreachable
    async fn deliver(
        &mut self,
        topic: &str,
        key: Option<&str>,
        value: &JsonValue,
        run_id: &str,
        shutdown: &CancellationToken,
    ) -> Outcome {
        loop {
            match self.producer.produce(topic, key, value).await {
                Ok(()) => {
                    info!("Produced output for run {} to {}", run_id, topic);
                    self.stats.processed += 1;
                    return Outcome::Done;
                }
                Err(e) if e.is_retryable() => {
                    warn!("Output for run {} not delivered yet: {}", run_id, e);
                    tokio::select! {
                        _ = shutdown.cancelled() => {
                            warn!("Shutting down with undelivered output for run {}", run_id);
                            return Outcome::Abandoned;
                        }
                        _ = tokio::time::sleep(self.options.redelivery_backoff) => {}
                    }
                }
                Err(e) => {
                    error!("Output for run {} refused by broker: {}", run_id, e);
                    self.stats.failed += 1;
                    return Outcome::Skipped;
                }
            }
        }
    }

    async fn acknowledge(&mut self, delivery: &Delivery) {
        if let Err(e) = self.consumer.commit(delivery).await {
            warn!(
                "Failed to commit {}@{}: {} (message may be redelivered)",
                delivery.topic, delivery.offset, e
            );
        }
    }
}
