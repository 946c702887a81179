//! Persistence for the history journal.
//!
//! The backing store is a plain two-column table: one row per line,
//! `path;timestamp`, timestamps at minute resolution. The file is
//! rewritten in full on every save - never patched incrementally - so
//! a partially corrupted store can never accumulate.

use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};

use chrono::NaiveDateTime;

use super::store::HistoryRow;
use crate::util::fs::{ensure_dir, truncate_to_minute};

/// On-disk timestamp format, minute resolution.
pub const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M";

const SEPARATOR: char = ';';

/// Reads and writes the history table.
pub struct HistoryCsvIo {
    path: PathBuf,
}

impl HistoryCsvIo {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Load all rows from the store.
    ///
    /// A missing file is an empty history, not an error. Malformed
    /// rows - no separator, empty path, unparseable timestamp - are
    /// skipped with a warning, never fatal: one bad row must not cost
    /// the rest of the journal.
    pub fn load_rows(&self) -> io::Result<Vec<HistoryRow>> {
        if !self.path.exists() {
            tracing::info!(path = %self.path.display(), "history store not found, starting empty");
            return Ok(Vec::new());
        }

        let content = fs::read_to_string(&self.path)?;
        let mut rows = Vec::new();

        for (line_no, line) in content.lines().enumerate() {
            let line = line.trim_end_matches('\r');
            if line.is_empty() {
                continue;
            }

            // The timestamp is the last field and can never contain
            // the separator, so split from the right: a separator
            // inside the path stays with the path.
            let Some((path_str, ts_str)) = line.rsplit_once(SEPARATOR) else {
                tracing::warn!(line = line_no + 1, "history row has no separator, skipping");
                continue;
            };

            let path_str = path_str.trim();
            if path_str.is_empty() {
                tracing::warn!(line = line_no + 1, "history row has an empty path, skipping");
                continue;
            }

            match NaiveDateTime::parse_from_str(ts_str.trim(), TIMESTAMP_FORMAT) {
                Ok(ts) => rows.push((path_str.to_string(), truncate_to_minute(ts))),
                Err(_) => {
                    tracing::warn!(
                        line = line_no + 1,
                        value = ts_str.trim(),
                        "history row has an unparseable timestamp, skipping"
                    );
                }
            }
        }

        tracing::info!(
            rows = rows.len(),
            path = %self.path.display(),
            "loaded history store"
        );
        Ok(rows)
    }

    /// Rewrite the store with the given rows.
    ///
    /// Callers pass the sorted snapshot from the store; the write is
    /// atomic (temp file in the same directory, then rename).
    pub fn save_rows(&self, rows: &[HistoryRow]) -> io::Result<()> {
        if let Some(parent) = self.path.parent() {
            ensure_dir(parent)?;
        }

        let temp_path = self.path.with_extension("csv.tmp");
        {
            let mut file = fs::File::create(&temp_path)?;
            for (path_str, ts) in rows {
                writeln!(file, "{path_str}{SEPARATOR}{}", ts.format(TIMESTAMP_FORMAT))?;
            }
            file.sync_all()?;
        }
        fs::rename(&temp_path, &self.path)?;
        Ok(())
    }
}
