//! ifcbatch core - incremental CAD-to-IFC batch export logic.
//!
//! This crate contains all business logic with zero CLI dependencies:
//! the project catalog, the freshness oracle, the history journal, the
//! version-bucketed task grouper, and the orchestrator that drives one
//! export run against an external converter.

pub mod catalog;
pub mod config;
pub mod freshness;
pub mod history;
pub mod logging;
pub mod models;
pub mod orchestrator;
pub mod runner;
pub mod tasks;
pub mod util;
pub mod versions;

/// Returns the crate version.
pub fn version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}
