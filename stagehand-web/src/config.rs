//! Web agent configuration
//!
//! Same conventions as the runner: defaults in `new`, environment
//! overrides in `from_env`, checks in `validate`.

use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;

use stagehand_core::topics;
use stagehand_runner::config::{env_duration, env_or, env_parse, validate_url};

/// Command and monitoring topics of the web agent
#[derive(Debug, Clone)]
pub struct CommandTopics {
    pub deploy: String,
    pub clean: String,
    pub rollback: String,
    pub logs: String,
}

impl Default for CommandTopics {
    fn default() -> Self {
        Self {
            deploy: topics::CMD_DEPLOY.to_string(),
            clean: topics::CMD_CLEAN.to_string(),
            rollback: topics::CMD_ROLLBACK.to_string(),
            logs: topics::LOGS.to_string(),
        }
    }
}

/// Web agent configuration
#[derive(Debug, Clone)]
pub struct Config {
    pub component: String,

    /// REST proxy base URL
    pub broker_url: String,

    pub consumer_group: String,

    /// Address of the HTTP front
    pub bind_addr: String,

    /// Root holding `<run_id>/` trees written by the render stage
    pub staging_dir: PathBuf,

    /// Served production root (a link managed by the deployment engine)
    pub prod_dir: PathBuf,

    pub heartbeat_interval: Duration,
    pub log_send_interval: Duration,
    pub log_buffer_size: usize,

    pub topics: CommandTopics,
}

impl Config {
    /// Creates a new configuration with defaults
    pub fn new() -> Self {
        Self {
            component: "web_agent".to_string(),
            broker_url: "http://localhost:8082".to_string(),
            consumer_group: "web_agent_cmds".to_string(),
            bind_addr: "0.0.0.0:8080".to_string(),
            staging_dir: PathBuf::from("/srv/staging"),
            prod_dir: PathBuf::from("/srv/prod"),
            heartbeat_interval: Duration::from_secs(1),
            log_send_interval: Duration::from_secs(2),
            log_buffer_size: 1000,
            topics: CommandTopics::default(),
        }
    }

    /// Creates configuration from environment variables
    ///
    /// Recognized variables (all optional):
    /// - BROKER_URL, CONSUMER_GROUP
    /// - WEB_BIND_ADDR (default: 0.0.0.0:8080)
    /// - STAGING_DIR (default: /srv/staging), PROD_DIR (default: /srv/prod)
    /// - HEARTBEAT_INTERVAL, LOG_SEND_INTERVAL (seconds), LOG_BUFFER_SIZE
    /// - TOPIC_DEPLOY, TOPIC_CLEAN, TOPIC_ROLLBACK, TOPIC_LOGS
    pub fn from_env() -> Self {
        let defaults = Self::new();

        Self {
            broker_url: env_or("BROKER_URL", defaults.broker_url),
            consumer_group: env_or("CONSUMER_GROUP", defaults.consumer_group),
            bind_addr: env_or("WEB_BIND_ADDR", defaults.bind_addr),
            staging_dir: env_or("STAGING_DIR", defaults.staging_dir),
            prod_dir: env_or("PROD_DIR", defaults.prod_dir),
            heartbeat_interval: env_duration("HEARTBEAT_INTERVAL", defaults.heartbeat_interval),
            log_send_interval: env_duration("LOG_SEND_INTERVAL", defaults.log_send_interval),
            log_buffer_size: env_parse("LOG_BUFFER_SIZE", defaults.log_buffer_size),
            topics: CommandTopics {
                deploy: env_or("TOPIC_DEPLOY", defaults.topics.deploy),
                clean: env_or("TOPIC_CLEAN", defaults.topics.clean),
                rollback: env_or("TOPIC_ROLLBACK", defaults.topics.rollback),
                logs: env_or("TOPIC_LOGS", defaults.topics.logs),
            },
            component: defaults.component,
        }
    }

    /// Validates the configuration
    pub fn validate(&self) -> anyhow::Result<()> {
        validate_url("broker_url", &self.broker_url)?;

        if self.consumer_group.is_empty() {
            anyhow::bail!("consumer_group cannot be empty");
        }

        if self.bind_addr.parse::<SocketAddr>().is_err() {
            anyhow::bail!("bind_addr must be an address like 0.0.0.0:8080");
        }

        if self.prod_dir.file_name().is_none() {
            anyhow::bail!("prod_dir must name a directory");
        }

        if self.prod_dir == self.staging_dir {
            anyhow::bail!("prod_dir and staging_dir must differ");
        }

        if self.heartbeat_interval.is_zero() || self.log_send_interval.is_zero() {
            anyhow::bail!("intervals must be greater than 0");
        }

        if self.log_buffer_size == 0 {
            anyhow::bail!("log_buffer_size must be greater than 0");
        }

        Ok(())
    }
}

impl Default for Config {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.topics.deploy, "cmd.web_agent.deploy");
        assert_eq!(config.topics.rollback, "cmd.web_agent.rollback");
        assert_eq!(config.consumer_group, "web_agent_cmds");
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_config_validation() {
        let mut config = Config::default();

        config.bind_addr = "localhost".to_string();
        assert!(config.validate().is_err());

        config.bind_addr = "127.0.0.1:9000".to_string();
        config.prod_dir = config.staging_dir.clone();
        assert!(config.validate().is_err());

        config.prod_dir = PathBuf::from("/");
        assert!(config.validate().is_err());

        config.prod_dir = PathBuf::from("/srv/www");
        assert!(config.validate().is_ok());
    }
}
