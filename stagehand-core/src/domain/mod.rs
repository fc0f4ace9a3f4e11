//! Core domain types
//!
//! This module contains the structures exchanged between Stagehand processes.
//! Every stage, the web agent and the CLI agree on these shapes; the broker
//! only ever sees their JSON form.

pub mod command;
pub mod message;
pub mod monitor;
pub mod run;
