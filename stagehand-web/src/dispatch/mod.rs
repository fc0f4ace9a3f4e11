//! Command dispatcher
//!
//! A stage for the runtime that multiplexes several command topics over
//! one consumer. The topic a record arrived on selects the handler; the
//! handler decodes the record itself, because each command has its own
//! schema.

pub mod handlers;

use async_trait::async_trait;
use serde_json::Value as JsonValue;
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::{debug, warn};

use stagehand_runner::runtime::{Origin, Stage, StageError};

pub use handlers::{CleanHandler, PromoteHandler, RollbackHandler};

/// Handler for one command topic
#[async_trait]
pub trait CommandHandler: Send + Sync {
    fn name(&self) -> &str;

    /// Executes one command; the record is still undecoded
    async fn handle(&self, command: JsonValue) -> Result<(), StageError>;
}

/// Routes records to handlers by originating topic
pub struct CommandDispatcher {
    component: String,
    routes: BTreeMap<String, Arc<dyn CommandHandler>>,
}

impl CommandDispatcher {
    pub fn new(component: impl Into<String>) -> Self {
        Self {
            component: component.into(),
            routes: BTreeMap::new(),
        }
    }

    /// Sends records from `topic` to `handler`
    pub fn route(mut self, topic: impl Into<String>, handler: Arc<dyn CommandHandler>) -> Self {
        self.routes.insert(topic.into(), handler);
        self
    }

    /// Topics the dispatcher has handlers for
    pub fn topics(&self) -> Vec<String> {
        self.routes.keys().cloned().collect()
    }
}

#[async_trait]
impl Stage for CommandDispatcher {
    type Input = JsonValue;
    type Output = ();

    fn name(&self) -> &str {
        &self.component
    }

    async fn process(&self, origin: &Origin, command: JsonValue) -> Result<Option<()>, StageError> {
        let Some(handler) = self.routes.get(&origin.topic) else {
            warn!("Unknown command topic {}", origin.topic);
            return Ok(None);
        };

        debug!("Dispatching {}@{} to {}", origin.topic, origin.offset, handler.name());
        handler.handle(command).await?;
        Ok(None)
    }
}
