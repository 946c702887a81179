//! Task grouping: version buckets, manifests, and job tables.
//!
//! Items that still need work are partitioned into buckets keyed by a
//! normalized version, then each bucket is emitted as two
//! deterministic artifacts: a manifest (one source path per line) for
//! the external runner, and a job-description table consumed by the
//! converter itself. This module does not decide whether an item
//! needs work - it only receives already-filtered items.
//!
//! Version policy:
//! - `None`           → unclassified exclusion log, not bucketed
//! - above the range  → "too new" exclusion log, not bucketed
//! - below the range  → clamped to the oldest supported version
//!   (older sources are still processed by the oldest toolchain)
//! - in range         → bucketed unchanged

mod exclusions;

pub use exclusions::{ExclusionLog, MTIME_ISSUES_LOG, VERSION_NOT_FOUND_LOG, VERSION_TOO_NEW_LOG};

use std::collections::BTreeMap;
use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};

use thiserror::Error;

use crate::models::ExportItem;
use crate::util::fs::ensure_dir;

/// UTF-8 byte-order mark, for legacy readers of the job table.
const UTF8_BOM: &[u8] = b"\xef\xbb\xbf";

const JOB_TABLE_SEPARATOR: char = ';';

#[derive(Error, Debug)]
pub enum GrouperError {
    /// The supported-version list is static configuration; an empty
    /// list means nothing could ever be bucketed.
    #[error("supported version list must not be empty")]
    NoSupportedVersions,
}

/// Groups items by version and writes the per-bucket artifacts.
pub struct TaskGrouper {
    /// version → items, ascending by construction of BTreeMap.
    buckets: BTreeMap<i32, Vec<ExportItem>>,
    /// Problem cases collected during `add`.
    exclusions: ExclusionLog,
    min_supported: i32,
    max_supported: i32,
}

impl TaskGrouper {
    /// Build a grouper over the canonical supported-version list.
    ///
    /// The list is normalized to ascending order; an empty list is a
    /// fatal configuration error.
    pub fn new(supported_versions: &[i32]) -> Result<Self, GrouperError> {
        let mut versions = supported_versions.to_vec();
        versions.sort_unstable();
        versions.dedup();

        let (&min_supported, &max_supported) = match (versions.first(), versions.last()) {
            (Some(min), Some(max)) => (min, max),
            _ => return Err(GrouperError::NoSupportedVersions),
        };

        Ok(Self {
            buckets: BTreeMap::new(),
            exclusions: ExclusionLog::default(),
            min_supported,
            max_supported,
        })
    }

    /// Place an item into its bucket, or record why it cannot run.
    pub fn add(&mut self, item: ExportItem, version: Option<i32>) {
        let identity = item.identity();

        let version = match version {
            None => {
                self.exclusions
                    .version_not_found
                    .push(format!("{identity} - source version could not be determined"));
                return;
            }
            Some(v) if v > self.max_supported => {
                self.exclusions.version_too_new.push(format!(
                    "{identity} - version {v} is above the supported range \
                     ({}..{})",
                    self.min_supported, self.max_supported
                ));
                return;
            }
            Some(v) if v < self.min_supported => self.min_supported,
            Some(v) => v,
        };

        self.buckets.entry(version).or_default().push(item);
    }

    /// Whether a probed version would end up in a bucket (possibly
    /// clamped) rather than an exclusion log.
    pub fn accepts(&self, version: Option<i32>) -> bool {
        version.is_some_and(|v| v <= self.max_supported)
    }

    /// Bucketed versions, ascending.
    pub fn versions(&self) -> Vec<i32> {
        self.buckets.keys().copied().collect()
    }

    /// Number of items bucketed under a version.
    pub fn bucket_len(&self, version: i32) -> usize {
        self.buckets.get(&version).map_or(0, Vec::len)
    }

    pub fn is_empty(&self) -> bool {
        self.buckets.is_empty()
    }

    pub fn exclusions(&self) -> &ExclusionLog {
        &self.exclusions
    }

    /// Write the exclusion logs collected so far.
    pub fn write_exclusion_logs(&self, dir: &Path) -> io::Result<()> {
        self.exclusions.write_logs(dir)
    }

    /// Manifest path for a version inside `dir`.
    pub fn manifest_path(dir: &Path, version: i32) -> PathBuf {
        dir.join(format!("manifest_{version}.txt"))
    }

    /// Job table path for a version inside `dir`.
    pub fn job_table_path(dir: &Path, version: i32) -> PathBuf {
        dir.join(format!("jobs_{version}.csv"))
    }

    /// Write one manifest per bucket, ascending by version: one source
    /// path per line, items ordered by the string form of the path.
    /// Idempotent - identical bucket contents produce byte-identical
    /// files.
    pub fn write_manifests(&self, dir: &Path) -> io::Result<Vec<(i32, PathBuf)>> {
        ensure_dir(dir)?;
        let mut written = Vec::with_capacity(self.buckets.len());

        for (&version, items) in &self.buckets {
            let mut paths: Vec<String> = items.iter().map(|m| m.identity()).collect();
            paths.sort();

            let manifest = Self::manifest_path(dir, version);
            let mut file = fs::File::create(&manifest)?;
            for path in &paths {
                writeln!(file, "{path}")?;
            }
            written.push((version, manifest));
        }
        Ok(written)
    }

    /// Write the job table for one version's bucket.
    ///
    /// One row per item, six semicolon-separated columns:
    /// `source;primary_out;primary_settings;mapping;secondary_out;secondary_settings`
    /// with cleared channels rendered as empty columns. Fields that
    /// contain the separator, a quote, or a line break are quoted with
    /// doubled embedded quotes, as CSV readers expect. No header row;
    /// UTF-8 with BOM. Column order and emptiness rules are the
    /// contract with the external converter - do not reorder.
    pub fn write_job_table(&self, version: i32, dir: &Path) -> io::Result<PathBuf> {
        ensure_dir(dir)?;

        let mut items: Vec<&ExportItem> = self
            .buckets
            .get(&version)
            .map(|b| b.iter().collect())
            .unwrap_or_default();
        items.sort_by_key(|m| m.identity());

        let table_path = Self::job_table_path(dir, version);
        let mut file = fs::File::create(&table_path)?;
        file.write_all(UTF8_BOM)?;

        for item in items {
            let row = [
                item.identity(),
                display_opt(item.primary_output_dir.as_deref()),
                item.primary_settings.to_string_lossy().into_owned(),
                item.category_mapping.to_string_lossy().into_owned(),
                display_opt(item.secondary_output_dir.as_deref()),
                display_opt(item.secondary_settings.as_deref()),
            ]
            .map(csv_field);
            writeln!(file, "{}", row.join(&JOB_TABLE_SEPARATOR.to_string()))?;
        }
        Ok(table_path)
    }
}

/// Quote a field when it would otherwise break the row: it contains
/// the separator, a quote, or a line break. Embedded quotes are
/// doubled. Paths may legally contain the separator on every platform
/// this runs on.
fn csv_field(value: String) -> String {
    if value.contains([JOB_TABLE_SEPARATOR, '"', '\n', '\r']) {
        format!("\"{}\"", value.replace('"', "\"\""))
    } else {
        value
    }
}

fn display_opt(path: Option<&Path>) -> String {
    path.map(|p| p.to_string_lossy().into_owned())
        .unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{NaiveDate, NaiveDateTime};
    use tempfile::tempdir;

    fn ts() -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2024, 1, 1)
            .unwrap()
            .and_hms_opt(10, 0, 0)
            .unwrap()
    }

    fn item(name: &str) -> ExportItem {
        ExportItem::new(
            PathBuf::from(format!("/models/{name}")),
            ts(),
            PathBuf::from("/out/mapped"),
            PathBuf::from("/cfg/export.json"),
            PathBuf::from("/cfg/categories.txt"),
            None,
            None,
        )
    }

    fn grouper() -> TaskGrouper {
        TaskGrouper::new(&[2021, 2022, 2023, 2024]).unwrap()
    }

    #[test]
    fn empty_supported_list_is_fatal() {
        assert!(matches!(
            TaskGrouper::new(&[]),
            Err(GrouperError::NoSupportedVersions)
        ));
    }

    #[test]
    fn accepts_mirrors_bucketing_policy() {
        let g = grouper();
        assert!(g.accepts(Some(2018)));
        assert!(g.accepts(Some(2024)));
        assert!(!g.accepts(Some(2030)));
        assert!(!g.accepts(None));
    }

    #[test]
    fn in_range_version_buckets_unchanged() {
        let mut g = grouper();
        g.add(item("a.rvt"), Some(2022));
        assert_eq!(g.versions(), vec![2022]);
        assert_eq!(g.bucket_len(2022), 1);
    }

    #[test]
    fn old_version_clamps_to_minimum() {
        let mut g = grouper();
        g.add(item("old.rvt"), Some(2018));
        assert_eq!(g.versions(), vec![2021]);
        assert!(g.exclusions().is_empty());
    }

    #[test]
    fn too_new_version_is_excluded() {
        let mut g = grouper();
        g.add(item("future.rvt"), Some(2030));
        assert!(g.is_empty());
        assert_eq!(g.exclusions().version_too_new.len(), 1);
        assert!(g.exclusions().version_too_new[0].contains("2030"));
    }

    #[test]
    fn unclassified_version_is_excluded() {
        let mut g = grouper();
        g.add(item("odd.rvt"), None);
        assert!(g.is_empty());
        assert_eq!(g.exclusions().version_not_found.len(), 1);
    }

    #[test]
    fn manifests_are_sorted_and_idempotent() {
        let dir = tempdir().unwrap();
        let mut g = grouper();
        g.add(item("b.rvt"), Some(2023));
        g.add(item("a.rvt"), Some(2023));

        g.write_manifests(dir.path()).unwrap();
        let first = fs::read(TaskGrouper::manifest_path(dir.path(), 2023)).unwrap();

        g.write_manifests(dir.path()).unwrap();
        let second = fs::read(TaskGrouper::manifest_path(dir.path(), 2023)).unwrap();

        assert_eq!(first, second);
        let text = String::from_utf8(first).unwrap();
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(lines.len(), 2);
        assert!(lines[0].ends_with("a.rvt"));
        assert!(lines[1].ends_with("b.rvt"));
    }

    #[test]
    fn job_table_has_bom_and_six_columns() {
        let dir = tempdir().unwrap();
        let mut g = grouper();
        g.add(item("a.rvt"), Some(2021));

        let table = g.write_job_table(2021, dir.path()).unwrap();
        let bytes = fs::read(&table).unwrap();
        assert!(bytes.starts_with(b"\xef\xbb\xbf"));

        let text = String::from_utf8(bytes[3..].to_vec()).unwrap();
        let fields: Vec<&str> = text.trim_end().split(';').collect();
        assert_eq!(fields.len(), 6);
        assert!(fields[0].ends_with("a.rvt"));
        assert_eq!(fields[1], "/out/mapped");
        assert_eq!(fields[4], "");
        assert_eq!(fields[5], "");
    }

    #[test]
    fn job_table_secondary_only_keeps_mapping_column() {
        // An item whose primary artifact was fresh (channel cleared)
        // but whose secondary is stale: the row still carries the
        // shared mapping path resolved at load time.
        let dir = tempdir().unwrap();
        let mut g = grouper();

        let mut it = ExportItem::new(
            PathBuf::from("/models/s.rvt"),
            ts(),
            PathBuf::from("/out/mapped"),
            PathBuf::from("/cfg/export.json"),
            PathBuf::from("/cfg/categories.txt"),
            Some(PathBuf::from("/out/raw")),
            Some(PathBuf::from("/cfg/raw.json")),
        );
        it.primary_output_dir = None;
        g.add(it, Some(2022));

        let table = g.write_job_table(2022, dir.path()).unwrap();
        let text = fs::read_to_string(&table).unwrap();
        let line = text.trim_start_matches('\u{feff}').trim_end();
        let fields: Vec<&str> = line.split(';').collect();

        assert_eq!(fields[1], "", "primary output must be empty");
        assert_eq!(fields[3], "/cfg/categories.txt");
        assert_eq!(fields[4], "/out/raw");
        assert_eq!(fields[5], "/cfg/raw.json");
    }

    #[test]
    fn job_table_quotes_fields_containing_the_separator() {
        let dir = tempdir().unwrap();
        let mut g = grouper();
        g.add(item("tower; phase2.rvt"), Some(2023));

        let table = g.write_job_table(2023, dir.path()).unwrap();
        let text = fs::read_to_string(&table).unwrap();
        let line = text.trim_start_matches('\u{feff}').trim_end();

        // The path's separator stays inside the quoted first column;
        // the row still delimits exactly six columns.
        assert_eq!(
            line,
            "\"/models/tower; phase2.rvt\";/out/mapped;/cfg/export.json;/cfg/categories.txt;;"
        );
    }

    #[test]
    fn job_tables_are_idempotent() {
        let dir = tempdir().unwrap();
        let mut g = grouper();
        g.add(item("b.rvt"), Some(2024));
        g.add(item("a.rvt"), Some(2024));

        let first = fs::read(g.write_job_table(2024, dir.path()).unwrap()).unwrap();
        let second = fs::read(g.write_job_table(2024, dir.path()).unwrap()).unwrap();
        assert_eq!(first, second);
    }
}
