//! Logging setup
//!
//! Every process logs through `tracing`. Besides the usual stdout
//! formatter, stage processes install [`ForwardLayer`], which copies INFO
//! and above into a log buffer for the forwarder to ship to the log channel.

use std::fmt::Write as _;
use std::sync::Arc;
use tracing::field::{Field, Visit};
use tracing::{Event, Level, Subscriber};
use tracing_subscriber::layer::{Context, Layer};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use stagehand_core::domain::monitor::{LogLevel, LogRecord, epoch_seconds};

use crate::service::log_buffer::LogBufferService;

/// Target of the forwarder's own events; never forwarded, or a dead log
/// channel would feed itself.
pub const FORWARDER_TARGET: &str = "stagehand::log_forwarder";

/// Installs the global subscriber: env-filtered stdout plus log forwarding
///
/// `default_filter` applies when `RUST_LOG` is not set.
pub fn init_tracing(component: &str, default_filter: &str, buffer: Arc<dyn LogBufferService>) {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| default_filter.into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .with(ForwardLayer::new(component, buffer))
        .init();
}

/// Layer that turns tracing events into [`LogRecord`]s
pub struct ForwardLayer {
    component: String,
    buffer: Arc<dyn LogBufferService>,
}

impl ForwardLayer {
    pub fn new(component: impl Into<String>, buffer: Arc<dyn LogBufferService>) -> Self {
        Self {
            component: component.into(),
            buffer,
        }
    }
}

impl<S: Subscriber> Layer<S> for ForwardLayer {
    fn on_event(&self, event: &Event<'_>, _ctx: Context<'_, S>) {
        let metadata = event.metadata();
        if *metadata.level() > Level::INFO || metadata.target() == FORWARDER_TARGET {
            return;
        }

        let mut visitor = MessageVisitor::default();
        event.record(&mut visitor);

        self.buffer.add_entry(LogRecord {
            ts: epoch_seconds(),
            component: self.component.clone(),
            level: level_of(metadata.level()),
            msg: visitor.finish(),
        });
    }
}

fn level_of(level: &Level) -> LogLevel {
    match *level {
        Level::ERROR => LogLevel::Error,
        Level::WARN => LogLevel::Warning,
        Level::INFO => LogLevel::Info,
        _ => LogLevel::Debug,
    }
}

/// Collects the `message` field, followed by any other fields as `k=v`
#[derive(Default)]
struct MessageVisitor {
    message: String,
    fields: String,
}

impl MessageVisitor {
    fn finish(self) -> String {
        if self.fields.is_empty() {
            self.message
        } else if self.message.is_empty() {
            self.fields.trim_start().to_string()
        } else {
            format!("{}{}", self.message, self.fields)
        }
    }
}

impl Visit for MessageVisitor {
    fn record_str(&mut self, field: &Field, value: &str) {
        if field.name() == "message" {
            self.message = value.to_string();
        } else {
            let _ = write!(self.fields, " {}={}", field.name(), value);
        }
    }

    fn record_debug(&mut self, field: &Field, value: &dyn std::fmt::Debug) {
        if field.name() == "message" {
            self.message = format!("{:?}", value);
        } else {
            let _ = write!(self.fields, " {}={:?}", field.name(), value);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::service::log_buffer::InMemoryLogBuffer;
    use tracing::{debug, error, info, warn};

    fn capture(f: impl FnOnce()) -> Vec<LogRecord> {
        let buffer = Arc::new(InMemoryLogBuffer::new(100));
        let subscriber =
            tracing_subscriber::registry().with(ForwardLayer::new("query", buffer.clone()));
        tracing::subscriber::with_default(subscriber, f);
        buffer.drain()
    }

    #[test]
    fn test_info_and_above_are_forwarded() {
        let records = capture(|| {
            debug!("too chatty");
            info!("started");
            warn!("slow endpoint");
            error!("gave up");
        });

        let levels: Vec<LogLevel> = records.iter().map(|r| r.level).collect();
        assert_eq!(levels, vec![LogLevel::Info, LogLevel::Warning, LogLevel::Error]);
        assert_eq!(records[0].msg, "started");
        assert!(records.iter().all(|r| r.component == "query"));
    }

    #[test]
    fn test_structured_fields_are_appended() {
        let records = capture(|| {
            info!(urls = 3, "Sitemap generated");
        });
        assert_eq!(records[0].msg, "Sitemap generated urls=3");
    }

    #[test]
    fn test_forwarder_events_are_skipped() {
        let records = capture(|| {
            warn!(target: FORWARDER_TARGET, "Failed to forward log record");
        });
        assert!(records.is_empty());
    }
}
