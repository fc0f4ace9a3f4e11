//! Configuration module
//!
//! Endpoints the CLI talks to and the topics it publishes on.

use stagehand_core::topics;

/// CLI configuration
#[derive(Debug, Clone)]
pub struct Config {
    /// REST proxy base URL
    pub broker_url: String,

    /// Base URL of the web agent's HTTP front
    pub web_url: String,

    pub work_topic: String,
    pub deploy_topic: String,
    pub clean_topic: String,
    pub rollback_topic: String,
    pub logs_topic: String,
}

impl Config {
    /// Default topic layout against the given endpoints
    pub fn new(broker_url: String, web_url: String) -> Self {
        Self {
            broker_url,
            web_url,
            work_topic: topics::CMD_QUERY.to_string(),
            deploy_topic: topics::CMD_DEPLOY.to_string(),
            clean_topic: topics::CMD_CLEAN.to_string(),
            rollback_topic: topics::CMD_ROLLBACK.to_string(),
            logs_topic: topics::LOGS.to_string(),
        }
    }
}
