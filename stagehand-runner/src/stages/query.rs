//! Query stage
//!
//! Starts a run: mints the run id, fetches the raw data for the requested
//! collection and hands the results document to the sitemap stage.

use anyhow::Context;
use async_trait::async_trait;
use chrono::NaiveDate;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{debug, info};

use stagehand_core::domain::message::{RawResults, StageMessage, WorkCommand};
use stagehand_core::domain::run::RunId;

use crate::repository::SparqlRepository;
use crate::runtime::{Origin, Stage, StageError};
use crate::stages::catalog::QueryCatalog;
use crate::stages::workspace::RunWorkspace;

pub const QUERY_FILE: &str = "sparql_query.rq";
pub const RESULTS_FILE: &str = "sparql_results.json";

pub struct QueryStage {
    catalog: QueryCatalog,
    sparql: Arc<dyn SparqlRepository>,
    runs_dir: PathBuf,
}

impl QueryStage {
    pub fn new(catalog: QueryCatalog, sparql: Arc<dyn SparqlRepository>, runs_dir: PathBuf) -> Self {
        Self {
            catalog,
            sparql,
            runs_dir,
        }
    }
}

#[async_trait]
impl Stage for QueryStage {
    type Input = WorkCommand;
    type Output = StageMessage<RawResults>;

    fn name(&self) -> &str {
        "query_agent"
    }

    async fn process(
        &self,
        _origin: &Origin,
        command: WorkCommand,
    ) -> Result<Option<Self::Output>, StageError> {
        // The date becomes part of a directory name
        NaiveDate::parse_from_str(&command.date, "%Y-%m-%d").map_err(|e| {
            StageError::Malformed(format!("invalid date '{}': {}", command.date, e))
        })?;

        let definition = self
            .catalog
            .get(&command.collection)
            .ok_or_else(|| StageError::UnknownAction(command.collection.clone()))?;

        let run_id = RunId::new(&command.date);
        info!("Message received, run id is {}", run_id);

        let workspace = RunWorkspace::open(&self.runs_dir, &run_id).await?;
        let query = definition.render(&command.date);
        workspace.write(QUERY_FILE, &query).await?;
        debug!("Query for {}: {}", run_id, query);

        info!(
            "Running SPARQL for {} on {} against {}",
            command.collection, command.date, definition.endpoint
        );
        let results = self
            .sparql
            .select(&definition.endpoint, &query)
            .await
            .with_context(|| format!("Query for run {} failed", run_id))?;
        info!("Results obtained for {}, {} characters", run_id, results.len());

        workspace.write(RESULTS_FILE, &results).await?;

        Ok(Some(StageMessage::new(
            run_id,
            command.collection,
            command.date,
            RawResults { results },
        )))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    struct FakeSparql {
        response: Result<String, String>,
        calls: Mutex<Vec<(String, String)>>,
    }

    impl FakeSparql {
        fn answering(response: &str) -> Arc<Self> {
            Arc::new(Self {
                response: Ok(response.to_string()),
                calls: Mutex::new(Vec::new()),
            })
        }

        fn failing(reason: &str) -> Arc<Self> {
            Arc::new(Self {
                response: Err(reason.to_string()),
                calls: Mutex::new(Vec::new()),
            })
        }
    }

    #[async_trait]
    impl SparqlRepository for FakeSparql {
        async fn select(&self, endpoint: &str, query: &str) -> anyhow::Result<String> {
            self.calls
                .lock()
                .unwrap()
                .push((endpoint.to_string(), query.to_string()));
            self.response.clone().map_err(anyhow::Error::msg)
        }
    }

    fn catalog() -> QueryCatalog {
        QueryCatalog::from_json(
            r#"{ "OJ": {
                "endpoint": "http://sparql.local/query",
                "query": "SELECT ?loc WHERE { ?loc ?p \"<date>\" }",
                "parameters": ["date"]
            } }"#,
        )
        .unwrap()
    }

    fn origin() -> Origin {
        Origin {
            topic: "cmd.query_agent".to_string(),
            partition: 0,
            offset: 0,
            key: None,
        }
    }

    fn command(date: &str, collection: &str) -> WorkCommand {
        WorkCommand {
            date: date.to_string(),
            collection: collection.to_string(),
        }
    }

    #[tokio::test]
    async fn test_query_emits_results_and_writes_workspace() {
        let runs = tempfile::tempdir().unwrap();
        let sparql = FakeSparql::answering(r#"{"results":{"bindings":[]}}"#);
        let stage = QueryStage::new(catalog(), sparql.clone(), runs.path().to_path_buf());

        let output = stage
            .process(&origin(), command("2024-01-01", "OJ"))
            .await
            .unwrap()
            .unwrap();

        assert_eq!(output.action, "OJ");
        assert_eq!(output.date, "2024-01-01");
        assert_eq!(output.run_id.date(), Some("2024-01-01"));
        assert_eq!(output.payload.results, r#"{"results":{"bindings":[]}}"#);

        let calls = sparql.calls.lock().unwrap();
        assert_eq!(calls[0].0, "http://sparql.local/query");
        assert!(calls[0].1.contains("\"2024-01-01\""));

        let run_dir = runs.path().join(output.run_id.as_str());
        assert_eq!(std::fs::read_to_string(run_dir.join(QUERY_FILE)).unwrap(), calls[0].1);
        assert!(run_dir.join(RESULTS_FILE).is_file());
    }

    #[tokio::test]
    async fn test_every_command_gets_a_new_run() {
        let runs = tempfile::tempdir().unwrap();
        let stage = QueryStage::new(catalog(), FakeSparql::answering("{}"), runs.path().into());

        let a = stage.process(&origin(), command("2024-01-01", "OJ")).await.unwrap();
        let b = stage.process(&origin(), command("2024-01-01", "OJ")).await.unwrap();
        assert!(a.unwrap().run_id < b.unwrap().run_id);
    }

    #[tokio::test]
    async fn test_unknown_collection_is_skipped() {
        let runs = tempfile::tempdir().unwrap();
        let sparql = FakeSparql::answering("{}");
        let stage = QueryStage::new(catalog(), sparql.clone(), runs.path().into());

        let result = stage.process(&origin(), command("2024-01-01", "NOPE")).await;
        assert!(matches!(result, Err(StageError::UnknownAction(a)) if a == "NOPE"));
        assert!(sparql.calls.lock().unwrap().is_empty());
        assert_eq!(std::fs::read_dir(runs.path()).unwrap().count(), 0);
    }

    #[tokio::test]
    async fn test_bad_date_is_malformed() {
        let runs = tempfile::tempdir().unwrap();
        let stage = QueryStage::new(catalog(), FakeSparql::answering("{}"), runs.path().into());

        let result = stage.process(&origin(), command("../../etc", "OJ")).await;
        assert!(matches!(result, Err(StageError::Malformed(_))));
    }

    #[tokio::test]
    async fn test_endpoint_failure_fails_the_message() {
        let runs = tempfile::tempdir().unwrap();
        let stage = QueryStage::new(
            catalog(),
            FakeSparql::failing("503 Service Unavailable"),
            runs.path().into(),
        );

        let result = stage.process(&origin(), command("2024-01-01", "OJ")).await;
        assert!(matches!(result, Err(StageError::Failed(_))));
    }
}
