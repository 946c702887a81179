//! Settings struct with TOML-based sections.
//!
//! Settings are organized into logical sections that map to TOML
//! tables; each section can be updated independently. Values are
//! threaded into the components that need them - nothing reads
//! configuration through a global.

use serde::{Deserialize, Serialize};

/// Root settings structure containing all configuration sections.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Settings {
    /// Path-related settings.
    #[serde(default)]
    pub paths: PathSettings,

    /// Source-file and artifact conventions.
    #[serde(default)]
    pub sources: SourceSettings,

    /// External converter invocation.
    #[serde(default)]
    pub converter: ConverterSettings,

    /// Export behavior toggles.
    #[serde(default)]
    pub export: ExportSettings,
}

/// Identifies a settings section for targeted updates.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfigSection {
    Paths,
    Sources,
    Converter,
    Export,
}

impl ConfigSection {
    pub fn table_name(&self) -> &'static str {
        match self {
            ConfigSection::Paths => "paths",
            ConfigSection::Sources => "sources",
            ConfigSection::Converter => "converter",
            ConfigSection::Export => "export",
        }
    }
}

/// Locations of the catalog, journal, logs, and run artifacts.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PathSettings {
    /// Project catalog (TOML).
    #[serde(default = "default_catalog_path")]
    pub catalog_path: String,

    /// History journal store.
    #[serde(default = "default_history_path")]
    pub history_path: String,

    /// Folder for run logs (exclusion logs, mtime issues).
    #[serde(default = "default_logs_folder")]
    pub logs_folder: String,

    /// Folder for manifests and job tables.
    #[serde(default = "default_work_folder")]
    pub work_folder: String,
}

fn default_catalog_path() -> String {
    "catalog.toml".to_string()
}

fn default_history_path() -> String {
    "history.csv".to_string()
}

fn default_logs_folder() -> String {
    "logs".to_string()
}

fn default_work_folder() -> String {
    "work".to_string()
}

impl Default for PathSettings {
    fn default() -> Self {
        Self {
            catalog_path: default_catalog_path(),
            history_path: default_history_path(),
            logs_folder: default_logs_folder(),
            work_folder: default_work_folder(),
        }
    }
}

/// File-extension conventions for sources and derived artifacts.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SourceSettings {
    /// Extension of convertible source files, without the dot.
    #[serde(default = "default_source_extension")]
    pub source_extension: String,

    /// Extension of the exported artifacts, without the dot.
    #[serde(default = "default_artifact_extension")]
    pub artifact_extension: String,
}

fn default_source_extension() -> String {
    "rvt".to_string()
}

fn default_artifact_extension() -> String {
    "ifc".to_string()
}

impl Default for SourceSettings {
    fn default() -> Self {
        Self {
            source_extension: default_source_extension(),
            artifact_extension: default_artifact_extension(),
        }
    }
}

/// How the external converter is launched.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConverterSettings {
    /// Runner executable.
    #[serde(default = "default_program")]
    pub program: String,

    /// Export script passed to the runner.
    #[serde(default)]
    pub script: String,

    /// Versions a converter toolchain is installed for, ascending.
    #[serde(default = "default_supported_versions")]
    pub supported_versions: Vec<i32>,

    /// Per-bucket timeout in seconds; 0 disables the timeout.
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

fn default_program() -> String {
    "pyrevit".to_string()
}

fn default_supported_versions() -> Vec<i32> {
    vec![2021, 2022, 2023, 2024]
}

fn default_timeout_secs() -> u64 {
    3600
}

impl Default for ConverterSettings {
    fn default() -> Self {
        Self {
            program: default_program(),
            script: String::new(),
            supported_versions: default_supported_versions(),
            timeout_secs: default_timeout_secs(),
        }
    }
}

/// Export behavior toggles.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExportSettings {
    /// Whether the secondary (unmapped) export channel is processed.
    #[serde(default)]
    pub secondary_enabled: bool,
}

impl Default for ExportSettings {
    fn default() -> Self {
        Self {
            secondary_enabled: false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_fill_missing_sections() {
        let settings: Settings = toml::from_str("").unwrap();
        assert_eq!(settings.paths.catalog_path, "catalog.toml");
        assert_eq!(settings.sources.artifact_extension, "ifc");
        assert!(!settings.export.secondary_enabled);
    }

    #[test]
    fn partial_section_keeps_other_defaults() {
        let settings: Settings =
            toml::from_str("[sources]\nsource_extension = \"nwd\"\n").unwrap();
        assert_eq!(settings.sources.source_extension, "nwd");
        assert_eq!(settings.sources.artifact_extension, "ifc");
    }

    #[test]
    fn supported_versions_default_is_ascending() {
        let settings = Settings::default();
        let mut sorted = settings.converter.supported_versions.clone();
        sorted.sort_unstable();
        assert_eq!(settings.converter.supported_versions, sorted);
    }
}
