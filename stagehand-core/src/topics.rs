//! Default topic names
//!
//! These match the channel layout of the deployed broker. Every process
//! reads them through its configuration, so any of them can be overridden.

/// Work commands consumed by the query stage
pub const CMD_QUERY: &str = "cmd.query_agent";

/// Raw query results, query stage → sitemap stage
pub const RAW_RESULTS: &str = "raw.sparql.out";

/// Sitemaps, sitemap stage → render stage
pub const RAW_SITEMAP: &str = "raw.sitemap.out";

/// Promote a staged run
pub const CMD_DEPLOY: &str = "cmd.web_agent.deploy";

/// Delete a staged run
pub const CMD_CLEAN: &str = "cmd.web_agent.clean";

/// Restore the previous production tree
pub const CMD_ROLLBACK: &str = "cmd.web_agent.rollback";

/// Log records from every component
pub const LOGS: &str = "logs.app";

/// Heartbeat topic of a component
pub fn heartbeat(component: &str) -> String {
    format!("hb.{}", component)
}
