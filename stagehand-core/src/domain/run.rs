//! Run identity
//!
//! A run is one end-to-end execution of the pipeline. Its id is
//! `<date>_<ulid>`: the date prefix groups runs by the day they were
//! requested for, and the ULID suffix sorts by creation time.

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use std::sync::{LazyLock, Mutex};
use thiserror::Error;
use ulid::{Generator, Ulid};

/// Longest run id accepted from the wire
pub const MAX_RUN_ID_LEN: usize = 128;

static GENERATOR: LazyLock<Mutex<Generator>> = LazyLock::new(|| Mutex::new(Generator::new()));

/// Errors produced when parsing a run id received from outside the process
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RunIdError {
    #[error("run id is empty")]
    Empty,

    #[error("run id exceeds {MAX_RUN_ID_LEN} bytes")]
    TooLong,

    #[error("run id '{0}' is not a single path segment")]
    NotASegment(String),

    #[error("run id contains invalid character {0:?}")]
    InvalidChar(char),
}

/// Identifier of a single pipeline run
///
/// Run ids double as directory names under the staging and run roots, so
/// every value of this type is a safe single path segment.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct RunId(String);

impl RunId {
    /// Creates a fresh run id for `date`
    ///
    /// Ids created by one process are strictly increasing, even within the
    /// same millisecond. Ids from different processes share no state and
    /// rely on the 80 random bits of the ULID for uniqueness.
    ///
    /// `date` should be an ISO calendar date (`YYYY-MM-DD`); callers that
    /// take it from the wire validate it first.
    pub fn new(date: &str) -> Self {
        let suffix = next_ulid();
        Self(format!("{}_{}", date, suffix))
    }

    /// Parses a run id received from a message or the command line
    pub fn parse(value: &str) -> Result<Self, RunIdError> {
        if value.is_empty() {
            return Err(RunIdError::Empty);
        }
        if value.len() > MAX_RUN_ID_LEN {
            return Err(RunIdError::TooLong);
        }
        if value == "." || value == ".." {
            return Err(RunIdError::NotASegment(value.to_string()));
        }
        if let Some(c) = value
            .chars()
            .find(|c| !(c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.')))
        {
            return Err(RunIdError::InvalidChar(c));
        }
        Ok(Self(value.to_string()))
    }

    /// The date prefix, if the id follows the `<date>_<suffix>` layout
    pub fn date(&self) -> Option<&str> {
        self.0.split_once('_').map(|(date, _)| date)
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

fn next_ulid() -> Ulid {
    let mut generator = match GENERATOR.lock() {
        Ok(guard) => guard,
        Err(poisoned) => poisoned.into_inner(),
    };
    // Overflow only happens after 2^80 ids in one millisecond.
    generator.generate().unwrap_or_else(|_| Ulid::new())
}

impl fmt::Display for RunId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for RunId {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl std::str::FromStr for RunId {
    type Err = RunIdError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl Serialize for RunId {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.0)
    }
}

impl<'de> Deserialize<'de> for RunId {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        Self::parse(&raw).map_err(serde::de::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn test_new_run_id_layout() {
        let id = RunId::new("2024-01-01");
        assert_eq!(id.date(), Some("2024-01-01"));

        let (_, suffix) = id.as_str().split_once('_').unwrap();
        assert_eq!(suffix.len(), 26);
        assert!(Ulid::from_string(suffix).is_ok());

        // Generated ids are valid wire ids too
        assert_eq!(RunId::parse(id.as_str()).unwrap(), id);
    }

    #[test]
    fn test_run_ids_sort_in_creation_order() {
        let ids: Vec<RunId> = (0..1000).map(|_| RunId::new("2024-01-01")).collect();
        let mut sorted = ids.clone();
        sorted.sort();
        assert_eq!(ids, sorted);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 8)]
    async fn test_concurrent_run_ids_do_not_collide() {
        let mut handles = Vec::new();
        for _ in 0..100 {
            handles.push(tokio::spawn(async {
                (0..100)
                    .map(|_| RunId::new("2024-06-20"))
                    .collect::<Vec<_>>()
            }));
        }

        let mut seen = HashSet::new();
        for handle in handles {
            for id in handle.await.unwrap() {
                assert!(seen.insert(id), "duplicate run id");
            }
        }
        assert_eq!(seen.len(), 10_000);
    }

    #[test]
    fn test_parse_accepts_hand_made_ids() {
        let id = RunId::parse("run-2024-01-01_A").unwrap();
        assert_eq!(id.as_str(), "run-2024-01-01_A");
        assert_eq!(id.date(), Some("run-2024-01-01"));
    }

    #[test]
    fn test_parse_rejects_unsafe_ids() {
        assert_eq!(RunId::parse(""), Err(RunIdError::Empty));
        assert!(matches!(RunId::parse(".."), Err(RunIdError::NotASegment(_))));
        assert_eq!(RunId::parse("a/b"), Err(RunIdError::InvalidChar('/')));
        assert_eq!(RunId::parse("a\\b"), Err(RunIdError::InvalidChar('\\')));
        assert_eq!(RunId::parse(&"x".repeat(200)), Err(RunIdError::TooLong));
    }

    #[test]
    fn test_deserialize_validates() {
        let ok: RunId = serde_json::from_str("\"2024-01-01_abc\"").unwrap();
        assert_eq!(ok.as_str(), "2024-01-01_abc");

        let bad = serde_json::from_str::<RunId>("\"../etc\"");
        assert!(bad.is_err());
    }
}
