//! Error types for the export run.
//!
//! Only configuration-class problems abort a run (bad catalog, empty
//! version list, unusable work directories). Per-item and per-bucket
//! failures are captured in the [`RunSummary`](super::RunSummary)
//! instead, so one broken source or toolchain cannot stop the rest.

use std::io;

use thiserror::Error;

use crate::catalog::CatalogError;
use crate::tasks::GrouperError;

#[derive(Error, Debug)]
pub enum OrchestratorError {
    #[error("Catalog error: {0}")]
    Catalog(#[from] CatalogError),

    #[error("Grouping error: {0}")]
    Grouper(#[from] GrouperError),

    #[error("I/O error in {operation}: {source}")]
    Io {
        operation: String,
        #[source]
        source: io::Error,
    },
}

impl OrchestratorError {
    pub fn io(operation: impl Into<String>, source: io::Error) -> Self {
        Self::Io {
            operation: operation.into(),
            source,
        }
    }
}

pub type OrchestratorResult<T> = Result<T, OrchestratorError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn io_error_displays_operation() {
        let err = OrchestratorError::io(
            "write manifests",
            io::Error::new(io::ErrorKind::PermissionDenied, "denied"),
        );
        let msg = err.to_string();
        assert!(msg.contains("write manifests"));
        assert!(msg.contains("denied"));
    }
}
