//! Stage contract
//!
//! A stage is the only part that differs between pipeline processes. The
//! runtime owns polling, decoding, heartbeats, delivery and acknowledgement;
//! a stage only turns one decoded input into at most one output.

use async_trait::async_trait;
use serde::Serialize;
use serde::de::DeserializeOwned;
use std::time::Duration;
use thiserror::Error;

use stagehand_client::Delivery;

/// Where a message came from
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Origin {
    pub topic: String,
    pub partition: i32,
    pub offset: i64,
    pub key: Option<String>,
}

impl From<&Delivery> for Origin {
    fn from(delivery: &Delivery) -> Self {
        Self {
            topic: delivery.topic.clone(),
            partition: delivery.partition,
            offset: delivery.offset,
            key: delivery.key.clone(),
        }
    }
}

/// Why a stage could not handle a message
///
/// None of these stop the runtime; they decide how the failure is logged.
#[derive(Debug, Error)]
pub enum StageError {
    /// The message can never be processed; it is discarded
    #[error("malformed message: {0}")]
    Malformed(String),

    /// A precondition of the message does not hold
    #[error("not found: {0}")]
    NotFound(String),

    /// The message names an action this deployment does not know
    #[error("unknown action '{0}'")]
    UnknownAction(String),

    #[error("transform timed out after {0:?}")]
    Timeout(Duration),

    #[error(transparent)]
    Failed(#[from] anyhow::Error),
}

/// One consume/transform step of the pipeline
#[async_trait]
pub trait Stage: Send + Sync {
    /// Schema of the records this stage consumes
    type Input: DeserializeOwned + Send;

    /// Schema of the records this stage produces
    type Output: Serialize + Send + Sync;

    /// Component name used in heartbeats and logs
    fn name(&self) -> &str;

    /// Handles one message
    ///
    /// Returning `Ok(None)` means the message was handled and nothing goes
    /// downstream. Implementations must be idempotent for a given run id:
    /// the broker may deliver the same message more than once.
    async fn process(
        &self,
        origin: &Origin,
        input: Self::Input,
    ) -> Result<Option<Self::Output>, StageError>;
}
