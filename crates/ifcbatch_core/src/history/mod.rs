//! Persistent history journal.
//!
//! Remembers, across runs, the last source timestamp at which each
//! item was considered processed, and detects "time travel" - a
//! source whose modification time regressed. The journal is an
//! optimization only: freshness of output artifacts is always
//! re-derived from disk, so the journal can never mask stale outputs.

mod io;
mod store;

pub use io::{HistoryCsvIo, TIMESTAMP_FORMAT};
pub use store::{HistoryRow, HistoryStore};

use std::io as stdio;
use std::path::{Path, PathBuf};

use chrono::NaiveDateTime;

use crate::models::{ExportItem, HistoryProvider};

/// Facade over the in-memory store and its persistence.
///
/// Loaded once at startup, mutated in-process during the run, written
/// back exactly once at the end as a full sorted replacement.
pub struct HistoryJournal {
    store: HistoryStore,
    io: HistoryCsvIo,
}

impl HistoryJournal {
    /// Open the journal from its backing store.
    ///
    /// An unreadable store is logged and treated as empty history -
    /// equivalent to "nothing has ever been processed" - rather than
    /// aborting the run.
    pub fn open(path: impl Into<PathBuf>) -> Self {
        let io = HistoryCsvIo::new(path);
        let rows = match io.load_rows() {
            Ok(rows) => rows,
            Err(e) => {
                tracing::warn!(
                    path = %io.path().display(),
                    error = %e,
                    "history store unreadable, starting with empty history"
                );
                Vec::new()
            }
        };
        Self {
            store: HistoryStore::new(rows),
            io,
        }
    }

    pub fn store_path(&self) -> &Path {
        self.io.path()
    }

    /// Exact-match currency check for a raw identity.
    pub fn is_current_at(&self, identity: &str, ts: NaiveDateTime) -> bool {
        self.store.is_current(identity, ts)
    }

    /// Record that an item was considered at its current source
    /// timestamp (forward advance or rollback pruning, see
    /// [`HistoryStore::advance`]).
    pub fn advance_item(&mut self, item: &ExportItem) {
        self.store.advance(&item.identity(), item.last_modified);
    }

    /// Raw advance, for callers that are not holding an item.
    pub fn advance(&mut self, identity: &str, ts: NaiveDateTime) {
        self.store.advance(identity, ts);
    }

    /// Persist the journal as a full sorted rewrite.
    pub fn save(&self) -> stdio::Result<()> {
        let rows = self.store.rows_sorted();
        tracing::info!(rows = rows.len(), path = %self.io.path().display(), "saving history store");
        self.io.save_rows(&rows)
    }

    pub fn len(&self) -> usize {
        self.store.len()
    }

    pub fn is_empty(&self) -> bool {
        self.store.is_empty()
    }
}

impl HistoryProvider for HistoryJournal {
    fn is_current(&self, item: &ExportItem) -> bool {
        self.store.is_current(&item.identity(), item.last_modified)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;
    use tempfile::tempdir;

    fn ts(h: u32, m: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2024, 1, 2)
            .unwrap()
            .and_hms_opt(h, m, 0)
            .unwrap()
    }

    #[test]
    fn journal_survives_a_run_cycle() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("history.csv");

        let mut journal = HistoryJournal::open(&path);
        assert!(journal.is_empty());

        journal.advance("/models/b.rvt", ts(9, 0));
        journal.save().unwrap();

        // Next run: the store reports the item as current.
        let reloaded = HistoryJournal::open(&path);
        assert!(reloaded.is_current_at("/models/b.rvt", ts(9, 0)));
        assert!(!reloaded.is_current_at("/models/b.rvt", ts(9, 1)));
    }

    #[test]
    fn rollback_survives_persistence() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("history.csv");

        let mut journal = HistoryJournal::open(&path);
        journal.advance("/models/a.rvt", ts(10, 0));
        journal.advance("/models/a.rvt", ts(12, 0));
        journal.advance("/models/a.rvt", ts(11, 0)); // rollback
        journal.save().unwrap();

        let reloaded = HistoryJournal::open(&path);
        assert!(reloaded.is_current_at("/models/a.rvt", ts(11, 0)));
        assert_eq!(reloaded.len(), 2);
    }

    #[test]
    fn unreadable_store_starts_empty() {
        let dir = tempdir().unwrap();
        // A directory at the store path makes the read fail.
        let path = dir.path().join("history.csv");
        std::fs::create_dir(&path).unwrap();

        let journal = HistoryJournal::open(&path);
        assert!(journal.is_empty());
    }
}
