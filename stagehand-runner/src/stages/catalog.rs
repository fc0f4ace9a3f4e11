//! Query catalog
//!
//! Maps an action (the `collection` of a work command) to the SPARQL query
//! that fetches its data. Loaded once at startup from a JSON file:
//!
//! ```json
//! {
//!   "OJ": {
//!     "endpoint": "https://publications.europa.eu/webapi/rdf/sparql",
//!     "query": "SELECT ?loc WHERE { ... FILTER(?date = \"<date>\") }",
//!     "parameters": ["date"]
//!   }
//! }
//! ```

use anyhow::{Context, Result};
use serde::Deserialize;
use std::collections::BTreeMap;
use std::path::Path;

use crate::config::validate_url;

/// Placeholder replaced by the run date in queries declaring `date`
pub const DATE_PLACEHOLDER: &str = "<date>";

/// One catalog entry
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct QueryDefinition {
    pub endpoint: String,
    pub query: String,
    #[serde(default)]
    pub parameters: Vec<String>,
}

impl QueryDefinition {
    /// The query text to send for a run on `date`
    pub fn render(&self, date: &str) -> String {
        if self.parameters.iter().any(|p| p == "date") {
            self.query.replace(DATE_PLACEHOLDER, date)
        } else {
            self.query.clone()
        }
    }
}

/// All known actions
#[derive(Debug, Clone, Default)]
pub struct QueryCatalog {
    queries: BTreeMap<String, QueryDefinition>,
}

impl QueryCatalog {
    /// Reads and validates the catalog file
    pub fn load(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read query catalog {}", path.display()))?;
        Self::from_json(&text)
            .with_context(|| format!("Invalid query catalog {}", path.display()))
    }

    /// Parses and validates a catalog document
    pub fn from_json(text: &str) -> Result<Self> {
        let queries: BTreeMap<String, QueryDefinition> =
            serde_json::from_str(text).context("Failed to parse query catalog")?;

        for (action, definition) in &queries {
            validate_url(&format!("endpoint of '{}'", action), &definition.endpoint)?;
            if definition.query.trim().is_empty() {
                anyhow::bail!("query of '{}' cannot be empty", action);
            }
        }

        Ok(Self { queries })
    }

    pub fn get(&self, action: &str) -> Option<&QueryDefinition> {
        self.queries.get(action)
    }

    pub fn actions(&self) -> impl Iterator<Item = &str> {
        self.queries.keys().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.queries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.queries.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const CATALOG: &str = r#"{
        "OJ": {
            "endpoint": "http://sparql.local/query",
            "query": "SELECT * WHERE { ?s ?p \"<date>\" }",
            "parameters": ["date"]
        },
        "STATIC": {
            "endpoint": "http://sparql.local/query",
            "query": "SELECT * WHERE { ?s ?p \"<date>\" }"
        }
    }"#;

    #[test]
    fn test_date_substituted_only_when_declared() {
        let catalog = QueryCatalog::from_json(CATALOG).unwrap();
        assert_eq!(catalog.len(), 2);

        let oj = catalog.get("OJ").unwrap();
        assert_eq!(oj.render("2024-01-01"), "SELECT * WHERE { ?s ?p \"2024-01-01\" }");

        let fixed = catalog.get("STATIC").unwrap();
        assert_eq!(fixed.render("2024-01-01"), fixed.query);
    }

    #[test]
    fn test_unknown_action() {
        let catalog = QueryCatalog::from_json(CATALOG).unwrap();
        assert!(catalog.get("NOPE").is_none());
        assert_eq!(catalog.actions().collect::<Vec<_>>(), vec!["OJ", "STATIC"]);
    }

    #[test]
    fn test_invalid_entries_are_rejected() {
        let bad_endpoint = r#"{ "A": { "endpoint": "ftp://x", "query": "SELECT" } }"#;
        assert!(QueryCatalog::from_json(bad_endpoint).is_err());

        let empty_query = r#"{ "A": { "endpoint": "http://x", "query": "  " } }"#;
        assert!(QueryCatalog::from_json(empty_query).is_err());

        assert!(QueryCatalog::from_json("[]").is_err());
    }

    #[test]
    fn test_load_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("queries.json");
        std::fs::write(&path, CATALOG).unwrap();

        let catalog = QueryCatalog::load(&path).unwrap();
        assert!(catalog.get("OJ").is_some());

        assert!(QueryCatalog::load(&dir.path().join("missing.json")).is_err());
    }
}
