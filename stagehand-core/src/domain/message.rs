//! Data-path messages
//!
//! A work command starts a run; every later hop carries a [`StageMessage`]
//! whose envelope (run id, action, date) stays fixed while the payload
//! changes shape from stage to stage.

use serde::{Deserialize, Serialize};

use crate::domain::run::RunId;

/// Request to execute the pipeline once
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkCommand {
    /// ISO calendar date the run is about (`YYYY-MM-DD`)
    pub date: String,

    /// Collection selector, used as the action key of the run
    pub collection: String,
}

/// Envelope shared by every inter-stage message
///
/// The payload fields are flattened next to the envelope on the wire, so a
/// stage that only cares about the envelope can still read any message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StageMessage<P> {
    pub run_id: RunId,
    pub action: String,
    pub date: String,
    #[serde(flatten)]
    pub payload: P,
}

impl<P> StageMessage<P> {
    pub fn new(run_id: RunId, action: impl Into<String>, date: impl Into<String>, payload: P) -> Self {
        Self {
            run_id,
            action: action.into(),
            date: date.into(),
            payload,
        }
    }

    /// Replaces the payload while keeping the envelope
    pub fn with_payload<Q>(self, payload: Q) -> StageMessage<Q> {
        StageMessage {
            run_id: self.run_id,
            action: self.action,
            date: self.date,
            payload,
        }
    }
}

/// Raw query results fetched by the query stage
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RawResults {
    /// SPARQL results document, JSON serialization
    pub results: String,
}

/// Sitemap derived from the raw results
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Sitemap {
    /// sitemaps.org `urlset` document
    pub sitemap: String,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_payload_is_flattened_into_envelope() {
        let message = StageMessage::new(
            RunId::parse("2024-01-01_A").unwrap(),
            "OJ",
            "2024-01-01",
            Sitemap {
                sitemap: "<urlset/>".to_string(),
            },
        );

        let value = serde_json::to_value(&message).unwrap();
        assert_eq!(
            value,
            json!({
                "run_id": "2024-01-01_A",
                "action": "OJ",
                "date": "2024-01-01",
                "sitemap": "<urlset/>"
            })
        );
    }

    #[test]
    fn test_missing_payload_field_is_rejected() {
        let value = json!({
            "run_id": "2024-01-01_A",
            "action": "OJ",
            "date": "2024-01-01"
        });
        assert!(serde_json::from_value::<StageMessage<RawResults>>(value).is_err());
    }

    #[test]
    fn test_with_payload_keeps_envelope() {
        let raw = StageMessage::new(
            RunId::parse("2024-01-01_A").unwrap(),
            "OJ",
            "2024-01-01",
            RawResults {
                results: "{}".to_string(),
            },
        );
        let next = raw.with_payload(Sitemap {
            sitemap: String::new(),
        });
        assert_eq!(next.run_id.as_str(), "2024-01-01_A");
        assert_eq!(next.action, "OJ");
        assert_eq!(next.date, "2024-01-01");
    }
}
