//! Sitemap stage
//!
//! Turns the SPARQL JSON results of a run into a sitemaps.org `urlset`.
//! Each result row becomes one `<url>`:
//! - `loc` is the `loc` binding, or else the first URI-typed binding in
//!   the order the query declared its variables
//! - `lastmod` is the `lastmod` binding, or else the run date
//!
//! Rows without a usable location are skipped; repeated locations are kept
//! once. The output depends only on the message, so a redelivered message
//! yields the same sitemap.

use async_trait::async_trait;
use serde::Deserialize;
use std::collections::{HashMap, HashSet};
use std::path::PathBuf;
use tracing::{debug, info};

use stagehand_core::domain::message::{RawResults, Sitemap, StageMessage};

use crate::runtime::{Origin, Stage, StageError};
use crate::stages::workspace::RunWorkspace;

pub const SITEMAP_FILE: &str = "sitemap.xml";

const SITEMAP_NS: &str = "http://www.sitemaps.org/schemas/sitemap/0.9";

/// SPARQL 1.1 query results, JSON format
#[derive(Debug, Deserialize)]
struct SparqlResults {
    #[serde(default)]
    head: Head,
    results: Bindings,
}

#[derive(Debug, Default, Deserialize)]
struct Head {
    #[serde(default)]
    vars: Vec<String>,
}

#[derive(Debug, Deserialize)]
struct Bindings {
    bindings: Vec<HashMap<String, Term>>,
}

#[derive(Debug, Deserialize)]
struct Term {
    #[serde(rename = "type")]
    kind: String,
    value: String,
}

/// One `<url>` entry
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UrlEntry {
    pub loc: String,
    pub lastmod: String,
}

pub struct SitemapStage {
    runs_dir: PathBuf,
}

impl SitemapStage {
    pub fn new(runs_dir: PathBuf) -> Self {
        Self { runs_dir }
    }
}

#[async_trait]
impl Stage for SitemapStage {
    type Input = StageMessage<RawResults>;
    type Output = StageMessage<Sitemap>;

    fn name(&self) -> &str {
        "sitemap_builder"
    }

    async fn process(
        &self,
        _origin: &Origin,
        message: StageMessage<RawResults>,
    ) -> Result<Option<Self::Output>, StageError> {
        info!("Message received, run id is {}", message.run_id);

        let entries = url_entries(&message.payload.results, &message.date)?;
        let sitemap = render_urlset(&entries);
        info!("Sitemap generated, contains {} urls", entries.len());

        let workspace = RunWorkspace::open(&self.runs_dir, &message.run_id).await?;
        let path = workspace.write(SITEMAP_FILE, &sitemap).await?;
        debug!("Sitemap written to {}", path.display());

        Ok(Some(message.with_payload(Sitemap { sitemap })))
    }
}

/// Extracts the sitemap entries from a SPARQL JSON results document
pub fn url_entries(results: &str, date: &str) -> Result<Vec<UrlEntry>, StageError> {
    let parsed: SparqlResults = serde_json::from_str(results)
        .map_err(|e| StageError::Malformed(format!("results are not SPARQL JSON: {}", e)))?;

    let mut seen = HashSet::new();
    let mut entries = Vec::new();

    for row in &parsed.results.bindings {
        let Some(loc) = location(row, &parsed.head.vars) else {
            debug!("Skipping result row without a location");
            continue;
        };
        if !seen.insert(loc.clone()) {
            continue;
        }

        let lastmod = row
            .get("lastmod")
            .map(|term| term.value.clone())
            .unwrap_or_else(|| date.to_string());

        entries.push(UrlEntry { loc, lastmod });
    }

    Ok(entries)
}

fn location(row: &HashMap<String, Term>, vars: &[String]) -> Option<String> {
    if let Some(term) = row.get("loc") {
        return Some(term.value.clone()).filter(|v| !v.is_empty());
    }

    vars.iter()
        .filter_map(|var| row.get(var))
        .find(|term| term.kind == "uri" && !term.value.is_empty())
        .map(|term| term.value.clone())
}

/// Serializes entries as a sitemaps.org `urlset`
pub fn render_urlset(entries: &[UrlEntry]) -> String {
    let mut xml = String::from("<?xml version=\"1.0\" encoding=\"UTF-8\"?>\n");
    xml.push_str(&format!("<urlset xmlns=\"{}\">\n", SITEMAP_NS));
    for entry in entries {
        xml.push_str("  <url>\n");
        xml.push_str(&format!("    <loc>{}</loc>\n", escape_xml(&entry.loc)));
        xml.push_str(&format!("    <lastmod>{}</lastmod>\n", escape_xml(&entry.lastmod)));
        xml.push_str("  </url>\n");
    }
    xml.push_str("</urlset>\n");
    xml
}

/// Escapes the five XML special characters
pub fn escape_xml(text: &str) -> String {
    let mut escaped = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '&' => escaped.push_str("&amp;"),
            '<' => escaped.push_str("&lt;"),
            '>' => escaped.push_str("&gt;"),
            '"' => escaped.push_str("&quot;"),
            '\'' => escaped.push_str("&apos;"),
            _ => escaped.push(c),
        }
    }
    escaped
}
