//! Stagehand Core
//!
//! Core types shared by every Stagehand process.
//!
//! This crate contains:
//! - Domain types: run identity, inter-stage messages, commands and
//!   monitoring records
//! - Topic names: the default channel layout of a Stagehand deployment

pub mod domain;
pub mod topics;
