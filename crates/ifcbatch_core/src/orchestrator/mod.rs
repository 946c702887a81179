//! The export run cycle.
//!
//! One run: load the catalog, decide per item what still needs doing,
//! bucket the remaining work by authoring-tool version, hand each
//! bucket to the external converter, and persist the history journal
//! exactly once at the end - regardless of how the conversions went.
//!
//! Failure containment: configuration problems (bad catalog, empty
//! version list) abort before any conversion; everything discovered
//! per item or per bucket lands in the summary and the exclusion logs
//! instead of stopping the run.

mod errors;

pub use errors::{OrchestratorError, OrchestratorResult};

use std::fs;
use std::path::PathBuf;

use serde::Serialize;

use crate::catalog::CatalogLoader;
use crate::config::Settings;
use crate::freshness::ArtifactChecker;
use crate::history::HistoryJournal;
use crate::runner::ConverterRunner;
use crate::tasks::{TaskGrouper, MTIME_ISSUES_LOG};
use crate::util::fs::{ensure_dir, write_log_lines};

/// Outcome of one version bucket.
#[derive(Debug, Clone, Serialize)]
pub struct BucketOutcome {
    pub version: i32,
    /// Number of items in the bucket.
    pub items: usize,
    /// Converter exit code; `None` for dry runs and launch failures.
    pub exit_code: Option<i32>,
    pub succeeded: bool,
}

/// What one run did, for the caller and for the structured log.
#[derive(Debug, Clone, Default, Serialize)]
pub struct RunSummary {
    pub items_total: usize,
    pub items_ignored: usize,
    pub items_up_to_date: usize,
    pub items_needing_work: usize,
    pub items_excluded: usize,
    pub buckets: Vec<BucketOutcome>,
    pub converter_failures: usize,
    pub history_saved: bool,
    pub dry_run: bool,
}

impl RunSummary {
    /// A run succeeds when no bucket failed and the journal was
    /// persisted. An empty run (nothing to do) is a success.
    pub fn success(&self) -> bool {
        self.converter_failures == 0 && self.history_saved
    }
}

/// Drives a full export run from settings.
pub struct ExportOrchestrator {
    settings: Settings,
    dry_run: bool,
    debug: bool,
}

impl ExportOrchestrator {
    pub fn new(settings: Settings) -> Self {
        Self {
            settings,
            dry_run: false,
            debug: false,
        }
    }

    /// Plan everything but do not launch the converter. Job tables and
    /// manifests are still written for inspection.
    pub fn with_dry_run(mut self, dry_run: bool) -> Self {
        self.dry_run = dry_run;
        self
    }

    /// Forward a debug flag to the converter.
    pub fn with_debug(mut self, debug: bool) -> Self {
        self.debug = debug;
        self
    }

    /// Execute one run cycle.
    pub fn run(&self) -> OrchestratorResult<RunSummary> {
        let paths = &self.settings.paths;
        let logs_dir = PathBuf::from(&paths.logs_folder);
        let work_dir = PathBuf::from(&paths.work_folder);
        ensure_dir(&logs_dir).map_err(|e| OrchestratorError::io("create logs dir", e))?;
        ensure_dir(&work_dir).map_err(|e| OrchestratorError::io("create work dir", e))?;

        let loaded = CatalogLoader::new(&paths.catalog_path)
            .load(&self.settings.sources.source_extension)?;

        if !loaded.mtime_issues.is_empty() {
            if let Err(e) = write_log_lines(&logs_dir, MTIME_ISSUES_LOG, &loaded.mtime_issues) {
                tracing::warn!(error = %e, "could not write the mtime issue log");
            }
        }

        let mut journal = HistoryJournal::open(&paths.history_path);
        let checker = ArtifactChecker::new(
            self.settings.sources.artifact_extension.clone(),
            self.settings.export.secondary_enabled,
        );
        let mut grouper = TaskGrouper::new(&self.settings.converter.supported_versions)?;

        let mut summary = RunSummary {
            items_total: loaded.items.len(),
            dry_run: self.dry_run,
            ..RunSummary::default()
        };

        for mut item in loaded.items {
            let identity = item.identity();
            if loaded.ignore.contains(&identity) {
                tracing::info!(source = %identity, "ignored by catalog");
                summary.items_ignored += 1;
                continue;
            }

            let decision = item.decide(&journal, &checker);
            tracing::debug!(
                source = %identity,
                history_current = decision.history_current,
                primary_fresh = decision.primary_fresh,
                secondary_fresh = decision.secondary_fresh,
                "decision"
            );

            if !item.apply(&decision) {
                summary.items_up_to_date += 1;
                continue;
            }
            summary.items_needing_work += 1;

            // Version probing is deferred until an item is known to
            // need work; up-to-date items never touch the file again.
            let version = item.resolve_version();
            if grouper.accepts(version) {
                journal.advance_item(&item);
            } else {
                summary.items_excluded += 1;
            }
            grouper.add(item, version);
        }

        let manifests = grouper
            .write_manifests(&work_dir)
            .map_err(|e| OrchestratorError::io("write manifests", e))?;

        for (version, manifest) in manifests {
            let outcome = self.run_bucket(&grouper, version, &manifest, &work_dir)?;
            if !outcome.succeeded {
                summary.converter_failures += 1;
            }
            summary.buckets.push(outcome);
        }

        // The journal is saved exactly once, whatever the converter
        // outcomes were: "considered" is not "converted".
        match journal.save() {
            Ok(()) => summary.history_saved = true,
            Err(e) => {
                tracing::error!(error = %e, path = %journal.store_path().display(), "could not persist the history journal");
            }
        }

        if let Err(e) = grouper.write_exclusion_logs(&logs_dir) {
            tracing::warn!(error = %e, "could not write exclusion logs");
        }

        tracing::info!(
            needing_work = summary.items_needing_work,
            up_to_date = summary.items_up_to_date,
            failures = summary.converter_failures,
            history_saved = summary.history_saved,
            "run finished"
        );
        Ok(summary)
    }

    /// Run one version bucket: job table, converter, cleanup.
    ///
    /// The job table is deleted after a clean exit and retained on any
    /// failure so the failed bucket can be re-driven by hand.
    fn run_bucket(
        &self,
        grouper: &TaskGrouper,
        version: i32,
        manifest: &std::path::Path,
        work_dir: &std::path::Path,
    ) -> OrchestratorResult<BucketOutcome> {
        let items = grouper.bucket_len(version);
        let table = grouper
            .write_job_table(version, work_dir)
            .map_err(|e| OrchestratorError::io("write job table", e))?;

        if self.dry_run {
            tracing::info!(version, items, "dry run: skipping converter");
            return Ok(BucketOutcome {
                version,
                items,
                exit_code: None,
                succeeded: true,
            });
        }

        let runner = ConverterRunner::new(
            self.settings.converter.program.clone(),
            self.settings.converter.script.clone(),
            self.settings.converter.timeout_secs,
        )
        .with_debug(self.debug);

        let outcome = match runner.run(manifest, version) {
            Ok(outcome) => outcome,
            Err(e) => {
                tracing::error!(version, error = %e, "converter run failed");
                return Ok(BucketOutcome {
                    version,
                    items,
                    exit_code: None,
                    succeeded: false,
                });
            }
        };

        if outcome.success() {
            if let Err(e) = fs::remove_file(&table) {
                tracing::warn!(table = %table.display(), error = %e, "could not delete job table");
            }
        } else {
            tracing::warn!(version, table = %table.display(), "bucket failed, retaining job table");
        }

        Ok(BucketOutcome {
            version,
            items,
            exit_code: Some(outcome.exit_code),
            succeeded: outcome.success(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::Path;
    use tempfile::tempdir;

    use crate::config::Settings;
    use crate::tasks::VERSION_NOT_FOUND_LOG;

    fn utf16le(s: &str) -> Vec<u8> {
        s.encode_utf16().flat_map(|u| u.to_le_bytes()).collect()
    }

    /// A source whose version probe resolves to `year`.
    fn write_source(dir: &Path, name: &str, year: i32) {
        let mut bytes = vec![0u8; 64];
        bytes.extend(utf16le(&format!("Format: {year} ")));
        bytes.extend(vec![0u8; 64]);
        fs::write(dir.join(name), bytes).unwrap();
    }

    #[cfg(unix)]
    fn fake_converter(dir: &Path, body: &str) -> PathBuf {
        use std::os::unix::fs::PermissionsExt;
        let path = dir.join("fake-converter.sh");
        fs::write(&path, format!("#!/bin/sh\n{body}\n")).unwrap();
        fs::set_permissions(&path, fs::Permissions::from_mode(0o755)).unwrap();
        path
    }

    /// Settings rooted in a temp directory, with one catalog project.
    fn fixture(root: &Path) -> Settings {
        let src = root.join("models");
        fs::create_dir_all(&src).unwrap();
        fs::write(root.join("export.json"), "{}").unwrap();
        fs::write(root.join("categories.txt"), "").unwrap();

        let catalog = format!(
            "[[projects]]\n\
             source_dir = \"{src}\"\n\
             primary_output_dir = \"{out}\"\n\
             primary_settings = \"{settings}\"\n\
             category_mapping = \"{mapping}\"\n",
            src = src.display(),
            out = root.join("out").display(),
            settings = root.join("export.json").display(),
            mapping = root.join("categories.txt").display(),
        );
        fs::write(root.join("catalog.toml"), catalog).unwrap();

        let mut settings = Settings::default();
        settings.paths.catalog_path = root.join("catalog.toml").display().to_string();
        settings.paths.history_path = root.join("history.csv").display().to_string();
        settings.paths.logs_folder = root.join("logs").display().to_string();
        settings.paths.work_folder = root.join("work").display().to_string();
        settings.converter.timeout_secs = 10;
        settings
    }

    #[test]
    fn up_to_date_item_does_no_work() {
        let dir = tempdir().unwrap();
        let settings = fixture(dir.path());
        write_source(&dir.path().join("models"), "a.rvt", 2023);

        // Artifact written in the same minute as the source: fresh.
        let out = dir.path().join("out");
        fs::create_dir_all(&out).unwrap();
        fs::write(out.join("a.ifc"), "ifc").unwrap();

        // Journal already records the source at its current mtime.
        let source = fs::canonicalize(dir.path().join("models").join("a.rvt")).unwrap();
        let mtime = crate::util::fs::file_mtime_minute(&source).unwrap();
        let mut journal = HistoryJournal::open(&settings.paths.history_path);
        journal.advance(&source.display().to_string(), mtime);
        journal.save().unwrap();

        let summary = ExportOrchestrator::new(settings).run().unwrap();

        assert_eq!(summary.items_total, 1);
        assert_eq!(summary.items_up_to_date, 1);
        assert_eq!(summary.items_needing_work, 0);
        assert!(summary.buckets.is_empty());
        assert!(summary.success());
        // No manifest was written for an empty run.
        assert!(!dir.path().join("work").join("manifest_2023.txt").exists());
    }

    #[cfg(unix)]
    #[test]
    fn stale_item_is_converted_and_journaled() {
        let dir = tempdir().unwrap();
        let mut settings = fixture(dir.path());
        settings.converter.program = fake_converter(dir.path(), "exit 0")
            .display()
            .to_string();
        write_source(&dir.path().join("models"), "b.rvt", 2023);

        let summary = ExportOrchestrator::new(settings.clone()).run().unwrap();

        assert_eq!(summary.items_needing_work, 1);
        assert_eq!(summary.buckets.len(), 1);
        assert_eq!(summary.buckets[0].version, 2023);
        assert!(summary.success());

        // Clean exit: manifest stays, job table is gone.
        let work = dir.path().join("work");
        assert!(work.join("manifest_2023.txt").exists());
        assert!(!work.join("jobs_2023.csv").exists());

        // The journal now reports the item as current.
        let source = fs::canonicalize(dir.path().join("models").join("b.rvt")).unwrap();
        let mtime = crate::util::fs::file_mtime_minute(&source).unwrap();
        let journal = HistoryJournal::open(&settings.paths.history_path);
        assert!(journal.is_current_at(&source.display().to_string(), mtime));
    }

    #[cfg(unix)]
    #[test]
    fn failed_bucket_retains_job_table_but_history_still_saves() {
        let dir = tempdir().unwrap();
        let mut settings = fixture(dir.path());
        settings.converter.program = fake_converter(dir.path(), "exit 2")
            .display()
            .to_string();
        write_source(&dir.path().join("models"), "c.rvt", 2022);

        let summary = ExportOrchestrator::new(settings).run().unwrap();

        assert_eq!(summary.converter_failures, 1);
        assert!(!summary.success());
        assert!(summary.history_saved);
        assert_eq!(summary.buckets[0].exit_code, Some(2));
        assert!(dir.path().join("work").join("jobs_2022.csv").exists());
    }

    #[test]
    fn unclassifiable_source_is_excluded_not_journaled() {
        let dir = tempdir().unwrap();
        let settings = fixture(dir.path());
        // Plain bytes: the version probe finds nothing.
        fs::write(dir.path().join("models").join("d.rvt"), "not a real model").unwrap();

        let summary = ExportOrchestrator::new(settings.clone())
            .with_dry_run(true)
            .run()
            .unwrap();

        assert_eq!(summary.items_needing_work, 1);
        assert_eq!(summary.items_excluded, 1);
        assert!(summary.buckets.is_empty());
        assert!(dir.path().join("logs").join(VERSION_NOT_FOUND_LOG).exists());

        // Nothing was advanced for the excluded item.
        let journal = HistoryJournal::open(&settings.paths.history_path);
        assert!(journal.is_empty());
    }

    #[test]
    fn dry_run_writes_artifacts_but_skips_converter() {
        let dir = tempdir().unwrap();
        let mut settings = fixture(dir.path());
        // A converter that would fail loudly if it were launched.
        settings.converter.program = "/nonexistent/converter".to_string();
        write_source(&dir.path().join("models"), "e.rvt", 2024);

        let summary = ExportOrchestrator::new(settings)
            .with_dry_run(true)
            .run()
            .unwrap();

        assert!(summary.success());
        assert_eq!(summary.buckets[0].exit_code, None);
        let work = dir.path().join("work");
        assert!(work.join("manifest_2024.txt").exists());
        assert!(work.join("jobs_2024.csv").exists());
    }

    #[test]
    fn unwritable_history_store_fails_the_run_but_reports_buckets() {
        let dir = tempdir().unwrap();
        let mut settings = fixture(dir.path());
        write_source(&dir.path().join("models"), "g.rvt", 2023);

        // A plain file where the store's parent directory should be:
        // loading still starts from empty history, saving fails.
        let blocker = dir.path().join("blocker");
        fs::write(&blocker, "").unwrap();
        settings.paths.history_path = blocker.join("history.csv").display().to_string();

        let summary = ExportOrchestrator::new(settings)
            .with_dry_run(true)
            .run()
            .unwrap();

        assert!(!summary.history_saved);
        assert!(!summary.success());
        // The conversion outcomes are still reported.
        assert_eq!(summary.buckets.len(), 1);
        assert!(summary.buckets[0].succeeded);
    }

    #[test]
    fn ignored_source_is_skipped() {
        let dir = tempdir().unwrap();
        let settings = fixture(dir.path());
        write_source(&dir.path().join("models"), "f.rvt", 2023);

        let source = fs::canonicalize(dir.path().join("models").join("f.rvt")).unwrap();
        let catalog = fs::read_to_string(dir.path().join("catalog.toml")).unwrap();
        fs::write(
            dir.path().join("catalog.toml"),
            format!("ignore = [\"{}\"]\n\n{catalog}", source.display()),
        )
        .unwrap();

        let summary = ExportOrchestrator::new(settings)
            .with_dry_run(true)
            .run()
            .unwrap();

        assert_eq!(summary.items_ignored, 1);
        assert_eq!(summary.items_needing_work, 0);
    }
}
