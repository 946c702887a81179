//! The export item entity and its collaborator traits.

use std::path::PathBuf;

use chrono::NaiveDateTime;

use super::decision::ExportDecision;
use crate::util::fs::resolve_if_exists;
use crate::versions::SourceVersionInfo;

/// History journal seam: "was this exact source state already handled?"
pub trait HistoryProvider {
    /// True iff the recorded current timestamp for the item's identity
    /// equals the item's source timestamp exactly. Any other
    /// relationship - including "journal is newer" - means work is
    /// needed; output artifacts on disk are the authority, not the
    /// journal.
    fn is_current(&self, item: &ExportItem) -> bool;
}

/// Freshness oracle seam: "is the derived artifact still valid?"
pub trait FreshnessProvider {
    /// Primary artifact exists and is at least as new as the source.
    /// An item without a primary output directory is never fresh on
    /// this axis (the primary channel must always have a target).
    fn primary_fresh(&self, item: &ExportItem) -> bool;

    /// Secondary artifact is fresh, or the secondary channel is not
    /// required for this item (globally disabled or not configured).
    fn secondary_fresh(&self, item: &ExportItem) -> bool;
}

/// One convertible source file plus its target configuration.
///
/// Constructed by the catalog loader with both channels populated (if
/// configured), mutated exactly once by [`ExportItem::apply`], and
/// read-only afterward within a single run. Once a channel's output
/// directory has been cleared to `None` that channel is permanently
/// "not required" for the remainder of the run.
#[derive(Debug, Clone)]
pub struct ExportItem {
    /// Absolute source path. Resolved at construction when the file
    /// exists; this string form is the item's identity in the journal.
    pub source_path: PathBuf,
    /// Source mtime, truncated to minute resolution.
    pub last_modified: NaiveDateTime,

    /// Output directory for the primary export. Mandatory at load
    /// time; cleared to `None` once proven unnecessary.
    pub primary_output_dir: Option<PathBuf>,
    /// Conversion-settings file for the primary export.
    pub primary_settings: PathBuf,
    /// Shared category-mapping file (primary channel only).
    pub category_mapping: PathBuf,

    /// Output directory for the optional secondary export.
    pub secondary_output_dir: Option<PathBuf>,
    /// Conversion-settings file for the secondary export.
    pub secondary_settings: Option<PathBuf>,

    /// Authoring-tool generation, resolved lazily by
    /// [`ExportItem::resolve_version`].
    version: Option<i32>,
    /// Build string reported by the probe, if any.
    build: Option<String>,
    /// Resolution is attempted exactly once, even when it fails.
    version_probed: bool,
}

impl ExportItem {
    /// Build an item, normalizing every known path.
    ///
    /// Existing paths become absolute; paths not (yet) on disk are
    /// kept as written, never an error at this stage.
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        source_path: PathBuf,
        last_modified: NaiveDateTime,
        primary_output_dir: PathBuf,
        primary_settings: PathBuf,
        category_mapping: PathBuf,
        secondary_output_dir: Option<PathBuf>,
        secondary_settings: Option<PathBuf>,
    ) -> Self {
        Self {
            source_path: resolve_if_exists(source_path),
            last_modified,
            primary_output_dir: Some(resolve_if_exists(primary_output_dir)),
            primary_settings: resolve_if_exists(primary_settings),
            category_mapping: resolve_if_exists(category_mapping),
            secondary_output_dir: secondary_output_dir.map(resolve_if_exists),
            secondary_settings: secondary_settings.map(resolve_if_exists),
            version: None,
            build: None,
            version_probed: false,
        }
    }

    /// File stem of the source - the artifact carries the same name.
    pub fn name(&self) -> String {
        self.source_path
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_default()
    }

    /// String form of the source path, used as the journal identity.
    pub fn identity(&self) -> String {
        self.source_path.to_string_lossy().into_owned()
    }

    /// Expected primary artifact path, or `None` once the channel has
    /// been cleared.
    pub fn expected_primary_artifact(&self, artifact_ext: &str) -> Option<PathBuf> {
        self.primary_output_dir
            .as_ref()
            .map(|dir| dir.join(format!("{}.{artifact_ext}", self.name())))
    }

    /// Expected secondary artifact path, or `None` when the channel is
    /// not configured for this item.
    pub fn expected_secondary_artifact(&self, artifact_ext: &str) -> Option<PathBuf> {
        self.secondary_output_dir
            .as_ref()
            .map(|dir| dir.join(format!("{}.{artifact_ext}", self.name())))
    }

    /// Resolved version, if resolution has happened and succeeded.
    pub fn version(&self) -> Option<i32> {
        self.version
    }

    /// Build string from the version probe, if one was found.
    pub fn build(&self) -> Option<&str> {
        self.build.as_deref()
    }

    /// Resolve the authoring-tool generation from the source file.
    ///
    /// Idempotent and attempted at most once: repeated calls return
    /// the first result without touching the file again.
    pub fn resolve_version(&mut self) -> Option<i32> {
        if self.version_probed {
            return self.version;
        }
        self.version_probed = true;

        let info = SourceVersionInfo::probe(&self.source_path);
        self.version = info.year;
        self.build = info.build;
        self.version
    }

    /// Inject a known version (used by tests and by loaders that carry
    /// the version out-of-band). Counts as the single resolution.
    pub fn set_version(&mut self, version: Option<i32>) {
        self.version = version;
        self.version_probed = true;
    }

    /// Combine journal and oracle lookups into a verdict.
    ///
    /// Pure: three independent lookups, no mutation. Calling it twice
    /// against unchanged collaborators yields an identical decision.
    pub fn decide(
        &self,
        history: &dyn HistoryProvider,
        freshness: &dyn FreshnessProvider,
    ) -> ExportDecision {
        ExportDecision {
            history_current: history.is_current(self),
            primary_fresh: freshness.primary_fresh(self),
            secondary_fresh: freshness.secondary_fresh(self),
        }
    }

    /// Commit a verdict: channels that are already fresh get their
    /// output directory cleared so they never re-enter a job table.
    ///
    /// Returns whether the item still needs any work.
    pub fn apply(&mut self, decision: &ExportDecision) -> bool {
        if decision.primary_fresh {
            self.primary_output_dir = None;
        }
        if decision.secondary_fresh {
            self.secondary_output_dir = None;
        }
        decision.needs_any_work()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn ts(h: u32, m: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2024, 1, 1)
            .unwrap()
            .and_hms_opt(h, m, 0)
            .unwrap()
    }

    fn item() -> ExportItem {
        ExportItem::new(
            PathBuf::from("/models/tower.rvt"),
            ts(10, 0),
            PathBuf::from("/out/mapped"),
            PathBuf::from("/cfg/export.json"),
            PathBuf::from("/cfg/categories.txt"),
            Some(PathBuf::from("/out/raw")),
            Some(PathBuf::from("/cfg/raw.json")),
        )
    }

    struct FixedHistory(bool);
    impl HistoryProvider for FixedHistory {
        fn is_current(&self, _item: &ExportItem) -> bool {
            self.0
        }
    }

    struct FixedFreshness {
        primary: bool,
        secondary: bool,
    }
    impl FreshnessProvider for FixedFreshness {
        fn primary_fresh(&self, _item: &ExportItem) -> bool {
            self.primary
        }
        fn secondary_fresh(&self, _item: &ExportItem) -> bool {
            self.secondary
        }
    }

    #[test]
    fn decide_is_pure() {
        let it = item();
        let history = FixedHistory(true);
        let freshness = FixedFreshness {
            primary: false,
            secondary: true,
        };

        let first = it.decide(&history, &freshness);
        let second = it.decide(&history, &freshness);
        assert_eq!(first, second);
        assert!(first.needs_any_work());
    }

    #[test]
    fn apply_clears_fresh_channels() {
        let mut it = item();
        let decision = ExportDecision {
            history_current: false,
            primary_fresh: true,
            secondary_fresh: false,
        };

        assert!(it.apply(&decision));
        assert!(it.primary_output_dir.is_none());
        assert!(it.secondary_output_dir.is_some());
    }

    #[test]
    fn history_and_artifacts_are_orthogonal() {
        // Journal current, but one artifact independently stale: the
        // item still needs work on that channel.
        let it = item();
        let decision = it.decide(
            &FixedHistory(true),
            &FixedFreshness {
                primary: true,
                secondary: false,
            },
        );
        assert!(decision.history_current);
        assert!(decision.needs_any_work());
        assert!(decision.needs_secondary());
        assert!(!decision.needs_primary());
    }

    #[test]
    fn expected_artifact_paths_follow_output_dirs() {
        let it = item();
        assert_eq!(
            it.expected_primary_artifact("ifc"),
            Some(PathBuf::from("/out/mapped/tower.ifc"))
        );
        assert_eq!(
            it.expected_secondary_artifact("ifc"),
            Some(PathBuf::from("/out/raw/tower.ifc"))
        );

        let mut cleared = it.clone();
        cleared.primary_output_dir = None;
        assert!(cleared.expected_primary_artifact("ifc").is_none());
    }

    #[test]
    fn version_resolution_is_attempted_once() {
        let mut it = item();
        // Missing file: probe fails, but the failure is remembered.
        assert!(it.resolve_version().is_none());
        it.set_version(Some(2023));
        // set_version wins; but a plain second resolve after the first
        // failed probe must not re-read the file:
        let mut other = item();
        assert!(other.resolve_version().is_none());
        assert!(other.resolve_version().is_none());
    }
}
