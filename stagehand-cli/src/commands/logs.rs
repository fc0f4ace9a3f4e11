//! Log channel follower
//!
//! Reads the log channel (and optionally the heartbeat channels) with a
//! throwaway consumer group. Nothing is committed: the tail is read-only.

use anyhow::{Context, Result};
use chrono::DateTime;
use clap::Args;
use colored::*;
use stagehand_client::{Consumer, Delivery, RestProxy};
use stagehand_core::domain::monitor::{Heartbeat, LogLevel, LogRecord};
use stagehand_core::topics;
use std::time::Duration;

use crate::config::Config;

/// Components that emit heartbeats in a default deployment
const COMPONENTS: [&str; 4] = ["query_agent", "sitemap_builder", "web_builder", "web_agent"];

#[derive(Args)]
pub struct LogsArgs {
    /// Only show records from this component
    #[arg(long)]
    pub component: Option<String>,

    /// Lowest level shown (debug, info, warning, error)
    #[arg(long, value_parser = parse_level, default_value = "info")]
    pub level: LogLevel,

    /// Also show heartbeats
    #[arg(long)]
    pub heartbeats: bool,
}

fn parse_level(value: &str) -> Result<LogLevel, String> {
    let name = match value.to_ascii_uppercase().as_str() {
        "WARN" => "WARNING".to_string(),
        other => other.to_string(),
    };
    serde_json::from_value(serde_json::Value::String(name))
        .map_err(|_| format!("unknown level '{}'", value))
}

pub async fn follow_logs(args: LogsArgs, config: &Config) -> Result<()> {
    let mut subscriptions = vec![config.logs_topic.clone()];
    if args.heartbeats {
        subscriptions.extend(COMPONENTS.iter().map(|c| topics::heartbeat(c)));
    }

    let proxy = RestProxy::new(&config.broker_url);
    let group = format!("stagehand_cli_{}", std::process::id());
    let mut consumer = proxy
        .consumer(&group, &subscriptions)
        .await
        .context("Failed to subscribe to the log channel")?;

    println!(
        "{}",
        format!("Following {} (Ctrl-C to stop)", subscriptions.join(", ")).dimmed()
    );

    let ctrl_c = tokio::signal::ctrl_c();
    tokio::pin!(ctrl_c);

    let result = loop {
        tokio::select! {
            _ = &mut ctrl_c => break Ok(()),
            polled = consumer.poll(Duration::from_secs(1)) => match polled {
                Ok(Some(delivery)) => {
                    if let Some(line) = render(&delivery, &args, &config.logs_topic) {
                        println!("{}", line);
                    }
                }
                Ok(None) => {}
                Err(e) => break Err(e),
            },
        }
    };

    consumer.close().await?;
    result.context("Failed to read the log channel")
}

/// Formats one record, or `None` when the filters hide it
fn render(delivery: &Delivery, args: &LogsArgs, logs_topic: &str) -> Option<String> {
    if delivery.topic == logs_topic {
        return match serde_json::from_value::<LogRecord>(delivery.value.clone()) {
            Ok(record) => accepts(&record, args).then(|| format_record(&record)),
            Err(_) => Some(format!("{}", delivery.value.to_string().dimmed())),
        };
    }

    match serde_json::from_value::<Heartbeat>(delivery.value.clone()) {
        Ok(hb) => {
            if args.component.as_ref().is_some_and(|c| *c != hb.component) {
                return None;
            }
            Some(format!(
                "{} {} {}",
                format_ts(hb.ts).dimmed(),
                "♥".magenta(),
                hb.component.dimmed()
            ))
        }
        Err(_) => Some(format!("{}", delivery.value.to_string().dimmed())),
    }
}

fn accepts(record: &LogRecord, args: &LogsArgs) -> bool {
    record.level >= args.level
        && args
            .component
            .as_ref()
            .is_none_or(|component| *component == record.component)
}

fn format_record(record: &LogRecord) -> String {
    let level = format!("{:<7}", record.level.to_string());
    let level = match record.level {
        LogLevel::Debug => level.dimmed(),
        LogLevel::Info => level.green(),
        LogLevel::Warning => level.yellow(),
        LogLevel::Error => level.red().bold(),
    };

    format!(
        "{} {} {} {}",
        format_ts(record.ts).dimmed(),
        level,
        record.component.cyan(),
        record.msg
    )
}

fn format_ts(ts: f64) -> String {
    DateTime::from_timestamp_micros((ts * 1_000_000.0) as i64)
        .map(|t| t.format("%Y-%m-%d %H:%M:%S%.3f").to_string())
        .unwrap_or_else(|| ts.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn args(component: Option<&str>, level: LogLevel) -> LogsArgs {
        LogsArgs {
            component: component.map(str::to_string),
            level,
            heartbeats: true,
        }
    }

    fn delivery(topic: &str, value: serde_json::Value) -> Delivery {
        Delivery {
            topic: topic.to_string(),
            partition: 0,
            offset: 0,
            key: None,
            value,
        }
    }

    #[test]
    fn test_parse_level() {
        assert_eq!(parse_level("warn").unwrap(), LogLevel::Warning);
        assert_eq!(parse_level("Error").unwrap(), LogLevel::Error);
        assert!(parse_level("trace").is_err());
    }

    #[test]
    fn test_filters() {
        colored::control::set_override(false);
        let warning = delivery(
            "logs.app",
            json!({ "ts": 0.0, "component": "web_agent", "level": "WARNING", "msg": "slow" }),
        );

        assert!(render(&warning, &args(None, LogLevel::Info), "logs.app").is_some());
        assert!(render(&warning, &args(None, LogLevel::Error), "logs.app").is_none());
        assert!(render(&warning, &args(Some("query_agent"), LogLevel::Info), "logs.app").is_none());

        let line = render(&warning, &args(Some("web_agent"), LogLevel::Debug), "logs.app").unwrap();
        assert_eq!(line, "1970-01-01 00:00:00.000 WARNING web_agent slow");
    }

    #[test]
    fn test_heartbeats_and_foreign_records() {
        colored::control::set_override(false);
        let hb = delivery("hb.web_agent", json!({ "ts": 1.5, "component": "web_agent" }));
        assert_eq!(
            render(&hb, &args(None, LogLevel::Info), "logs.app").unwrap(),
            "1970-01-01 00:00:01.500 ♥ web_agent"
        );
        assert!(render(&hb, &args(Some("query_agent"), LogLevel::Info), "logs.app").is_none());

        let junk = delivery("logs.app", json!("plain text"));
        assert_eq!(
            render(&junk, &args(None, LogLevel::Info), "logs.app").unwrap(),
            "\"plain text\""
        );
    }
}
