//! Deployment
//!
//! Promotion of staged runs into the served production tree, and removal
//! of staged runs.

pub mod engine;
pub mod tree;

pub use engine::{DeployError, DeploymentEngine, Generation, Promotion};
pub use tree::TreeStats;
