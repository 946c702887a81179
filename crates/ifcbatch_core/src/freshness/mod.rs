//! On-disk freshness oracle for derived artifacts.
//!
//! Answers "is the expected artifact for this item, on this channel,
//! at least as new as the source?" and caches output timestamps per
//! directory so each output directory is scanned exactly once per run.
//!
//! The cache is never invalidated within a run. That is safe only
//! under the documented precondition that no other process writes to
//! the output directories concurrently with this run - the run is
//! single-threaded and nothing here takes locks.

use std::cell::RefCell;
use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};

use chrono::NaiveDateTime;

use crate::models::{ExportItem, FreshnessProvider};
use crate::util::fs::file_mtime_minute;

/// Per-directory cache: file name → mtime at minute resolution.
type DirCache = HashMap<String, NaiveDateTime>;

/// Freshness oracle backed by a lazy per-directory mtime cache.
pub struct ArtifactChecker {
    /// Extension of derived artifacts (without the dot), e.g. `ifc`.
    artifact_ext: String,
    /// Whether the secondary channel is enabled at all for this run.
    /// Threaded in explicitly - never read from ambient global state.
    secondary_enabled: bool,
    /// directory → (file name → mtime). RefCell because lookups are
    /// logically reads; the run is single-threaded (see module docs).
    cache: RefCell<HashMap<PathBuf, DirCache>>,
}

impl ArtifactChecker {
    pub fn new(artifact_ext: impl Into<String>, secondary_enabled: bool) -> Self {
        Self {
            artifact_ext: artifact_ext.into(),
            secondary_enabled,
            cache: RefCell::new(HashMap::new()),
        }
    }

    /// Core check shared by both channels.
    ///
    /// - `expected == None` with `none_means_fresh` → vacuously fresh
    ///   (channel not required for this item).
    /// - `expected == None` without `none_means_fresh` → stale (the
    ///   channel is required but has no target).
    /// - Otherwise the artifact must exist and its minute-resolution
    ///   mtime must be `>=` the source timestamp. A missing artifact
    ///   or any filesystem failure counts as stale - fail toward
    ///   "needs work", never silently skip work.
    pub fn check(
        &self,
        expected: Option<&Path>,
        source_ts: NaiveDateTime,
        none_means_fresh: bool,
    ) -> bool {
        let path = match expected {
            Some(p) => p,
            None => return none_means_fresh,
        };

        match self.cached_mtime(path) {
            Some(artifact_ts) if artifact_ts >= source_ts => true,
            Some(artifact_ts) => {
                tracing::debug!(
                    artifact = %path.display(),
                    %artifact_ts,
                    %source_ts,
                    "artifact is older than its source"
                );
                false
            }
            None => {
                tracing::debug!(artifact = %path.display(), "artifact missing or unreadable");
                false
            }
        }
    }

    /// Artifact mtime served from the per-directory cache.
    ///
    /// The first lookup in a directory lists every candidate artifact
    /// (by extension) in one pass. A directory that does not exist
    /// caches as empty, not as an error.
    fn cached_mtime(&self, path: &Path) -> Option<NaiveDateTime> {
        let dir = path.parent()?.to_path_buf();
        let name = path.file_name()?.to_string_lossy().into_owned();

        let mut cache = self.cache.borrow_mut();
        if let Some(dir_cache) = cache.get(&dir) {
            return dir_cache.get(&name).copied();
        }

        let dir_cache = self.scan_dir(&dir);
        let result = dir_cache.get(&name).copied();
        cache.insert(dir, dir_cache);
        result
    }

    fn scan_dir(&self, dir: &Path) -> DirCache {
        let entries = match fs::read_dir(dir) {
            Ok(entries) => entries,
            Err(e) => {
                // Missing output directory: the artifacts do not exist.
                tracing::debug!(dir = %dir.display(), error = %e, "output directory not readable");
                return DirCache::new();
            }
        };

        let mut dir_cache = DirCache::new();
        for entry in entries.flatten() {
            let path = entry.path();
            let matches_ext = path
                .extension()
                .map(|e| e.eq_ignore_ascii_case(self.artifact_ext.as_str()))
                .unwrap_or(false);
            if !matches_ext {
                continue;
            }
            let Some(mtime) = file_mtime_minute(&path) else {
                tracing::debug!(file = %path.display(), "could not read artifact mtime, skipping");
                continue;
            };
            dir_cache.insert(entry.file_name().to_string_lossy().into_owned(), mtime);
        }
        dir_cache
    }
}

impl FreshnessProvider for ArtifactChecker {
    fn primary_fresh(&self, item: &ExportItem) -> bool {
        let expected = item.expected_primary_artifact(&self.artifact_ext);
        self.check(expected.as_deref(), item.last_modified, false)
    }

    fn secondary_fresh(&self, item: &ExportItem) -> bool {
        // Globally disabled secondary channel: vacuously fresh for
        // every item, same as an item that never configured it.
        let expected = if self.secondary_enabled {
            item.expected_secondary_artifact(&self.artifact_ext)
        } else {
            None
        };
        self.check(expected.as_deref(), item.last_modified, true)
    }
}
