//! Stagehand stage runtime
//!
//! The generic consume/transform/produce driver shared by every pipeline
//! process, the logging plumbing that ships logs to the log channel, and
//! the data-path stages themselves.

pub mod config;
pub mod logging;
pub mod repository;
pub mod runtime;
pub mod service;
pub mod stages;
