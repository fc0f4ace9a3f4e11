//! Runner configuration
//!
//! One `Config` value per process, built once in `main` and passed into
//! constructors. Every field has a default; environment variables override
//! them.

use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use stagehand_core::topics;

/// Topic names used by the data-path stages
#[derive(Debug, Clone)]
pub struct Topics {
    /// Work commands (query stage input)
    pub work: String,
    /// Raw results (query output, sitemap input)
    pub raw_results: String,
    /// Sitemaps (sitemap output, render input)
    pub sitemap: String,
    /// Log channel
    pub logs: String,
}

impl Default for Topics {
    fn default() -> Self {
        Self {
            work: topics::CMD_QUERY.to_string(),
            raw_results: topics::RAW_RESULTS.to_string(),
            sitemap: topics::RAW_SITEMAP.to_string(),
            logs: topics::LOGS.to_string(),
        }
    }
}

impl Topics {
    /// Reads overrides from `TOPIC_WORK`, `TOPIC_RAW_RESULTS`,
    /// `TOPIC_SITEMAP` and `TOPIC_LOGS`
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            work: env_or("TOPIC_WORK", defaults.work),
            raw_results: env_or("TOPIC_RAW_RESULTS", defaults.raw_results),
            sitemap: env_or("TOPIC_SITEMAP", defaults.sitemap),
            logs: env_or("TOPIC_LOGS", defaults.logs),
        }
    }
}

/// Stage process configuration
#[derive(Debug, Clone)]
pub struct Config {
    /// Component name, used for heartbeats, logs and the consumer group
    pub component: String,

    /// REST proxy base URL (e.g., "http://localhost:8082")
    pub broker_url: String,

    /// Consumer group; stages of the same kind share one
    pub consumer_group: String,

    /// Poll timeout and heartbeat period
    pub heartbeat_interval: Duration,

    /// Upper bound on one transform
    pub transform_timeout: Duration,

    /// How often buffered logs are shipped to the log channel
    pub log_send_interval: Duration,

    /// Log records held while the log channel is unreachable
    pub log_buffer_size: usize,

    pub topics: Topics,

    /// Per-run working directories of the query and sitemap stages
    pub runs_dir: PathBuf,

    /// Root of the staging area the render stage writes into
    pub staging_dir: PathBuf,

    /// JSON query catalog (action → endpoint, query, parameters)
    pub query_catalog: PathBuf,

    /// Request timeout for SPARQL endpoints
    pub sparql_timeout: Duration,

    /// External site generator; the built-in index is used when unset
    pub render_command: Option<String>,
}

impl Config {
    /// Creates a new configuration with defaults
    pub fn new(component: impl Into<String>) -> Self {
        let component = component.into();
        Self {
            consumer_group: component.clone(),
            component,
            broker_url: "http://localhost:8082".to_string(),
            heartbeat_interval: Duration::from_secs(1),
            transform_timeout: Duration::from_secs(60),
            log_send_interval: Duration::from_secs(2),
            log_buffer_size: 1000,
            topics: Topics::default(),
            runs_dir: PathBuf::from("/runs"),
            staging_dir: PathBuf::from("/srv/staging"),
            query_catalog: PathBuf::from("/etc/stagehand/queries.json"),
            sparql_timeout: Duration::from_secs(30),
            render_command: None,
        }
    }

    /// Creates configuration from environment variables
    ///
    /// Recognized variables (all optional):
    /// - BROKER_URL (default: http://localhost:8082)
    /// - CONSUMER_GROUP (default: the component name)
    /// - HEARTBEAT_INTERVAL (seconds, fractions allowed, default: 1)
    /// - TRANSFORM_TIMEOUT (seconds, default: 60)
    /// - LOG_SEND_INTERVAL (seconds, default: 2)
    /// - LOG_BUFFER_SIZE (default: 1000)
    /// - TOPIC_* (see [`Topics::from_env`])
    /// - RUNS_DIR (default: /runs)
    /// - STAGING_DIR (default: /srv/staging)
    /// - QUERY_CATALOG (default: /etc/stagehand/queries.json)
    /// - SPARQL_TIMEOUT (seconds, default: 30)
    /// - RENDER_COMMAND (shell command, default: built-in renderer)
    pub fn from_env(component: impl Into<String>) -> Self {
        let defaults = Self::new(component);

        Self {
            broker_url: env_or("BROKER_URL", defaults.broker_url),
            consumer_group: env_or("CONSUMER_GROUP", defaults.consumer_group),
            heartbeat_interval: env_duration("HEARTBEAT_INTERVAL", defaults.heartbeat_interval),
            transform_timeout: env_duration("TRANSFORM_TIMEOUT", defaults.transform_timeout),
            log_send_interval: env_duration("LOG_SEND_INTERVAL", defaults.log_send_interval),
            log_buffer_size: env_parse("LOG_BUFFER_SIZE", defaults.log_buffer_size),
            topics: Topics::from_env(),
            runs_dir: env_or("RUNS_DIR", defaults.runs_dir),
            staging_dir: env_or("STAGING_DIR", defaults.staging_dir),
            query_catalog: env_or("QUERY_CATALOG", defaults.query_catalog),
            sparql_timeout: env_duration("SPARQL_TIMEOUT", defaults.sparql_timeout),
            render_command: std::env::var("RENDER_COMMAND")
                .ok()
                .filter(|s| !s.trim().is_empty()),
            component: defaults.component,
        }
    }

    /// Validates the configuration
    pub fn validate(&self) -> anyhow::Result<()> {
        if self.component.is_empty() {
            anyhow::bail!("component cannot be empty");
        }

        validate_url("broker_url", &self.broker_url)?;

        if self.consumer_group.is_empty() {
            anyhow::bail!("consumer_group cannot be empty");
        }

        if self.heartbeat_interval.is_zero() {
            anyhow::bail!("heartbeat_interval must be greater than 0");
        }

        if self.transform_timeout.is_zero() {
            anyhow::bail!("transform_timeout must be greater than 0");
        }

        if self.log_send_interval.is_zero() {
            anyhow::bail!("log_send_interval must be greater than 0");
        }

        if self.log_buffer_size == 0 {
            anyhow::bail!("log_buffer_size must be greater than 0");
        }

        if self.sparql_timeout.is_zero() {
            anyhow::bail!("sparql_timeout must be greater than 0");
        }

        Ok(())
    }
}

/// Fails unless `url` is an http(s) URL
pub fn validate_url(name: &str, url: &str) -> anyhow::Result<()> {
    if url.is_empty() {
        anyhow::bail!("{} cannot be empty", name);
    }

    if !url.starts_with("http://") && !url.starts_with("https://") {
        anyhow::bail!("{} must start with http:// or https://", name);
    }

    Ok(())
}

/// Reads `name`, falling back to `default` when unset or empty
pub fn env_or<T: From<String>>(name: &str, default: T) -> T {
    std::env::var(name)
        .ok()
        .filter(|s| !s.is_empty())
        .map(T::from)
        .unwrap_or(default)
}

/// Parses `name`, falling back to `default` when unset or unparsable
pub fn env_parse<T: FromStr>(name: &str, default: T) -> T {
    std::env::var(name)
        .ok()
        .and_then(|s| s.trim().parse::<T>().ok())
        .unwrap_or(default)
}

/// Parses `name` as seconds (fractions allowed)
pub fn env_duration(name: &str, default: Duration) -> Duration {
    std::env::var(name)
        .ok()
        .and_then(|s| parse_seconds(&s))
        .unwrap_or(default)
}

fn parse_seconds(value: &str) -> Option<Duration> {
    let secs = value.trim().parse::<f64>().ok()?;
    if !secs.is_finite() || secs < 0.0 {
        return None;
    }
    Some(Duration::from_secs_f64(secs))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = Config::new("query");
        assert_eq!(config.consumer_group, "query");
        assert_eq!(config.heartbeat_interval, Duration::from_secs(1));
        assert_eq!(config.transform_timeout, Duration::from_secs(60));
        assert_eq!(config.topics.work, "cmd.query_agent");
        assert_eq!(config.topics.logs, "logs.app");
        assert!(config.render_command.is_none());
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_config_validation() {
        let mut config = Config::new("sitemap");
        assert!(config.validate().is_ok());

        config.broker_url = "localhost:8082".to_string();
        assert!(config.validate().is_err());

        config.broker_url = "http://proxy:8082".to_string();
        config.heartbeat_interval = Duration::ZERO;
        assert!(config.validate().is_err());

        config.heartbeat_interval = Duration::from_millis(500);
        config.log_buffer_size = 0;
        assert!(config.validate().is_err());

        config.log_buffer_size = 10;
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_parse_seconds() {
        assert_eq!(parse_seconds("2"), Some(Duration::from_secs(2)));
        assert_eq!(parse_seconds(" 0.5 "), Some(Duration::from_millis(500)));
        assert_eq!(parse_seconds("-1"), None);
        assert_eq!(parse_seconds("soon"), None);
        assert_eq!(parse_seconds("inf"), None);
    }
}
