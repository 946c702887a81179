//! Filesystem helpers: path normalization, minute-resolution mtimes,
//! and plain-text log writing.
//!
//! Every timestamp comparison in this system happens at minute
//! granularity, so the single source of file times is
//! [`file_mtime_minute`]. Access errors never propagate as panics or
//! errors from these helpers: a file we cannot stat simply has no
//! usable mtime.

use std::collections::BTreeSet;
use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};

use chrono::{DateTime, Local, NaiveDateTime, Timelike};

/// Create a directory (and its parents) if it does not exist yet.
///
/// Idempotent: an already existing directory is not an error.
pub fn ensure_dir(path: &Path) -> io::Result<()> {
    if !path.exists() {
        fs::create_dir_all(path)?;
    }
    Ok(())
}

/// Canonicalize a path if it exists; return it unchanged otherwise.
///
/// Used when constructing items: paths that are present on disk become
/// absolute and symlink-free (stable identities for the history
/// journal), paths that are not yet present are kept as written.
pub fn resolve_if_exists(path: PathBuf) -> PathBuf {
    if !path.exists() {
        return path;
    }
    path.canonicalize().unwrap_or(path)
}

/// Truncate a timestamp to minute resolution.
pub fn truncate_to_minute(dt: NaiveDateTime) -> NaiveDateTime {
    // with_second/with_nanosecond only fail for out-of-range values.
    dt.with_second(0)
        .and_then(|d| d.with_nanosecond(0))
        .unwrap_or(dt)
}

/// Local modification time of a file, truncated to minutes.
///
/// Returns `None` when the file is missing, unreadable, or its mtime
/// cannot be represented.
pub fn file_mtime_minute(path: &Path) -> Option<NaiveDateTime> {
    let modified = fs::metadata(path).and_then(|m| m.modified()).ok()?;
    let local: DateTime<Local> = modified.into();
    Some(truncate_to_minute(local.naive_local()))
}

/// Write lines to `<dir>/<name>`, sorted and deduplicated, one per line.
///
/// Repeated runs against the same set of lines produce byte-identical
/// files. Nothing is written when `lines` is empty.
pub fn write_log_lines<I, S>(dir: &Path, name: &str, lines: I) -> io::Result<()>
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    let sorted: BTreeSet<String> = lines
        .into_iter()
        .map(|l| l.as_ref().to_string())
        .collect();
    if sorted.is_empty() {
        return Ok(());
    }

    ensure_dir(dir)?;
    let mut file = fs::File::create(dir.join(name))?;
    for line in &sorted {
        writeln!(file, "{line}")?;
    }
    Ok(())
}
