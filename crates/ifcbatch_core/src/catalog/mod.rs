//! Project catalog: TOML description of what to export and where.
//!
//! The catalog names project rows (a source directory plus the output
//! directories and conversion-settings files for its exports) and an
//! ignore list of source paths. Loading expands each row into one
//! [`ExportItem`] per convertible file found in the source directory.
//!
//! Missing settings or mapping files are configuration errors and
//! abort the load before any conversion work starts. Missing source
//! files inside a directory are not errors, and a source file whose
//! mtime cannot be read is skipped with a note instead of failing the
//! run.

use std::collections::HashSet;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use serde::Deserialize;
use thiserror::Error;

use crate::models::ExportItem;
use crate::util::fs::{ensure_dir, file_mtime_minute, resolve_if_exists};

#[derive(Error, Debug)]
pub enum CatalogError {
    #[error("Failed to read catalog {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("Failed to parse catalog {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },

    #[error("Catalog names no projects: {0}")]
    Empty(PathBuf),

    #[error("Referenced {role} file does not exist: {path}")]
    MissingConfigFile { role: &'static str, path: PathBuf },

    #[error("Failed to read source directory {path}: {source}")]
    SourceDirUnreadable {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("Failed to create output directory {path}: {source}")]
    OutputDirCreate {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
}

impl CatalogError {
    fn read(path: &Path, source: io::Error) -> Self {
        Self::Read {
            path: path.to_path_buf(),
            source,
        }
    }

    fn parse(path: &Path, source: toml::de::Error) -> Self {
        Self::Parse {
            path: path.to_path_buf(),
            source,
        }
    }
}

/// One `[[projects]]` row in the catalog file.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Deserialize)]
pub struct ProjectEntry {
    /// Directory scanned for convertible source files.
    pub source_dir: PathBuf,
    /// Output directory for the primary (mapped) export.
    pub primary_output_dir: PathBuf,
    /// Conversion-settings file for the primary export.
    pub primary_settings: PathBuf,
    /// Shared category-mapping file.
    pub category_mapping: PathBuf,
    /// Output directory for the optional secondary (raw) export.
    #[serde(default)]
    pub secondary_output_dir: Option<PathBuf>,
    /// Conversion-settings file for the secondary export.
    #[serde(default)]
    pub secondary_settings: Option<PathBuf>,
}

#[derive(Debug, Default, Deserialize)]
struct CatalogFile {
    /// Source paths excluded from every run, as written in the catalog.
    #[serde(default)]
    ignore: Vec<String>,

    #[serde(default)]
    projects: Vec<ProjectEntry>,
}

/// Everything the orchestrator needs from a catalog load.
#[derive(Debug, Default)]
pub struct LoadedCatalog {
    /// One item per discovered source file, directory order.
    pub items: Vec<ExportItem>,
    /// Resolved string identities to skip.
    pub ignore: HashSet<String>,
    /// Source files whose mtime could not be read, one note each.
    pub mtime_issues: Vec<String>,
}

/// Loads the TOML catalog and expands it into export items.
pub struct CatalogLoader {
    path: PathBuf,
}

impl CatalogLoader {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Load the catalog and expand every project row.
    ///
    /// `source_extension` selects which files count as sources (case
    /// insensitive, without the dot). Identical project rows are
    /// collapsed so a duplicated catalog entry cannot double-export a
    /// directory. Output directories are created here, before any
    /// freshness question is asked about them.
    pub fn load(&self, source_extension: &str) -> Result<LoadedCatalog, CatalogError> {
        let content =
            fs::read_to_string(&self.path).map_err(|e| CatalogError::read(&self.path, e))?;
        let catalog: CatalogFile =
            toml::from_str(&content).map_err(|e| CatalogError::parse(&self.path, e))?;

        if catalog.projects.is_empty() {
            return Err(CatalogError::Empty(self.path.clone()));
        }

        let mut seen_rows: HashSet<ProjectEntry> = HashSet::new();
        let mut loaded = LoadedCatalog {
            ignore: catalog
                .ignore
                .iter()
                .map(|p| resolve_if_exists(PathBuf::from(p)).to_string_lossy().into_owned())
                .collect(),
            ..LoadedCatalog::default()
        };

        for entry in catalog.projects {
            if !seen_rows.insert(entry.clone()) {
                tracing::warn!(source_dir = %entry.source_dir.display(), "duplicate catalog row, skipping");
                continue;
            }
            self.expand_project(&entry, source_extension, &mut loaded)?;
        }

        tracing::info!(
            items = loaded.items.len(),
            ignored = loaded.ignore.len(),
            "catalog loaded"
        );
        Ok(loaded)
    }

    fn expand_project(
        &self,
        entry: &ProjectEntry,
        source_extension: &str,
        loaded: &mut LoadedCatalog,
    ) -> Result<(), CatalogError> {
        validate_config_file("settings", &entry.primary_settings)?;
        validate_config_file("mapping", &entry.category_mapping)?;
        if let Some(secondary_settings) = &entry.secondary_settings {
            validate_config_file("settings", secondary_settings)?;
        }

        // A half-configured secondary channel (dir without settings or
        // the reverse) cannot be run; treat it as not configured.
        let mut entry = entry.clone();
        if entry.secondary_output_dir.is_some() != entry.secondary_settings.is_some() {
            tracing::warn!(
                source_dir = %entry.source_dir.display(),
                "incomplete secondary channel configuration, disabling it for this row"
            );
            entry.secondary_output_dir = None;
            entry.secondary_settings = None;
        }
        let entry = &entry;

        ensure_dir(&entry.primary_output_dir).map_err(|e| CatalogError::OutputDirCreate {
            path: entry.primary_output_dir.clone(),
            source: e,
        })?;
        if let Some(dir) = &entry.secondary_output_dir {
            ensure_dir(dir).map_err(|e| CatalogError::OutputDirCreate {
                path: dir.clone(),
                source: e,
            })?;
        }

        for source in scan_sources(&entry.source_dir, source_extension)? {
            let Some(last_modified) = file_mtime_minute(&source) else {
                loaded.mtime_issues.push(format!(
                    "{} - modification time could not be read",
                    source.display()
                ));
                continue;
            };

            loaded.items.push(ExportItem::new(
                source,
                last_modified,
                entry.primary_output_dir.clone(),
                entry.primary_settings.clone(),
                entry.category_mapping.clone(),
                entry.secondary_output_dir.clone(),
                entry.secondary_settings.clone(),
            ));
        }
        Ok(())
    }
}

fn validate_config_file(role: &'static str, path: &Path) -> Result<(), CatalogError> {
    if path.is_file() {
        Ok(())
    } else {
        Err(CatalogError::MissingConfigFile {
            role,
            path: path.to_path_buf(),
        })
    }
}

/// Convertible files in a directory, sorted by name.
///
/// Lock and backup companions are skipped: names starting with `~`, and
/// the `name.NNNN.<ext>` pattern authoring tools leave next to a saved
/// file.
fn scan_sources(dir: &Path, extension: &str) -> Result<Vec<PathBuf>, CatalogError> {
    let entries = fs::read_dir(dir).map_err(|e| CatalogError::SourceDirUnreadable {
        path: dir.to_path_buf(),
        source: e,
    })?;

    let mut sources = Vec::new();
    for entry in entries {
        let entry = entry.map_err(|e| CatalogError::SourceDirUnreadable {
            path: dir.to_path_buf(),
            source: e,
        })?;
        let path = entry.path();
        if !path.is_file() {
            continue;
        }

        let has_extension = path
            .extension()
            .is_some_and(|e| e.eq_ignore_ascii_case(extension));
        if !has_extension {
            continue;
        }

        let name = entry.file_name().to_string_lossy().into_owned();
        if name.starts_with('~') || is_backup_name(&name) {
            continue;
        }

        sources.push(path);
    }
    sources.sort();
    Ok(sources)
}

/// Matches `anything.NNNN.ext`, the numbered-backup naming scheme.
fn is_backup_name(name: &str) -> bool {
    let stem = match name.rsplit_once('.') {
        Some((stem, _ext)) => stem,
        None => return false,
    };
    match stem.rsplit_once('.') {
        Some((_, counter)) => {
            counter.len() == 4 && counter.chars().all(|c| c.is_ascii_digit())
        }
        None => false,
    }
}
