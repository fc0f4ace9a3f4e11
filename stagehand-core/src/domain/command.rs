//! Web agent commands
//!
//! Commands arrive on their own topics, independent of the data path. The
//! topic a command came from decides which handler runs it.

use serde::{Deserialize, Serialize};

use crate::domain::run::RunId;

/// Where a deploy command publishes a run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DeployTarget {
    /// The live production tree
    #[default]
    Prod,

    /// The staging area, where renders already land
    Staging,
}

impl std::fmt::Display for DeployTarget {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            DeployTarget::Prod => write!(f, "prod"),
            DeployTarget::Staging => write!(f, "staging"),
        }
    }
}

/// Promote a staged run
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeployCommand {
    pub run_id: RunId,
    #[serde(default)]
    pub target: DeployTarget,
}

/// Delete a staged run
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CleanCommand {
    pub run_id: RunId,
}

/// Restore the previously served tree
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RollbackCommand {}
