//! Exclusion logs for items that never reach a bucket.

use std::io;
use std::path::Path;

use crate::util::fs::write_log_lines;

/// Log file for items whose version could not be determined.
pub const VERSION_NOT_FOUND_LOG: &str = "version_not_found.txt";
/// Log file for items newer than the supported version range.
pub const VERSION_TOO_NEW_LOG: &str = "version_too_new.txt";
/// Log file for sources whose mtime could not be read at load time.
pub const MTIME_ISSUES_LOG: &str = "mtime_issues.txt";

/// Accumulates exclusion cases during grouping; written out once at
/// the end of the run. Entries are sorted and deduplicated on write,
/// so repeated runs against unchanged input produce identical files.
#[derive(Debug, Default)]
pub struct ExclusionLog {
    /// Items with an unclassifiable version.
    pub version_not_found: Vec<String>,
    /// Items whose version exceeds the supported maximum.
    pub version_too_new: Vec<String>,
}

impl ExclusionLog {
    /// Write the accumulated cases into per-reason text files.
    /// Empty categories write nothing.
    pub fn write_logs(&self, dir: &Path) -> io::Result<()> {
        write_log_lines(dir, VERSION_NOT_FOUND_LOG, &self.version_not_found)?;
        write_log_lines(dir, VERSION_TOO_NEW_LOG, &self.version_too_new)?;
        Ok(())
    }

    pub fn is_empty(&self) -> bool {
        self.version_not_found.is_empty() && self.version_too_new.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::tempdir;

    #[test]
    fn writes_only_non_empty_categories() {
        let dir = tempdir().unwrap();
        let log = ExclusionLog {
            version_not_found: vec!["b.rvt - version unknown".into(), "a.rvt - version unknown".into()],
            version_too_new: Vec::new(),
        };
        log.write_logs(dir.path()).unwrap();

        let content = fs::read_to_string(dir.path().join(VERSION_NOT_FOUND_LOG)).unwrap();
        assert!(content.starts_with("a.rvt"));
        assert!(!dir.path().join(VERSION_TOO_NEW_LOG).exists());
    }
}
