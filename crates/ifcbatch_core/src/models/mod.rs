//! Data models for the export engine.
//!
//! - `ExportItem`: one convertible source file plus its two export
//!   channels (the entity the whole run revolves around)
//! - `ExportDecision`: the pure verdict combining journal state and
//!   on-disk freshness
//! - `HistoryProvider` / `FreshnessProvider`: the seams between the
//!   item and its collaborators, implemented by the real journal and
//!   artifact checker and by test doubles

mod decision;
mod item;

pub use decision::ExportDecision;
pub use item::{ExportItem, FreshnessProvider, HistoryProvider};
