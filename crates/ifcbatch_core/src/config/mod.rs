//! Configuration: TOML settings sections and the config manager.

mod manager;
mod settings;

pub use manager::{ConfigError, ConfigManager, ConfigResult};
pub use settings::{
    ConfigSection, ConverterSettings, ExportSettings, PathSettings, Settings, SourceSettings,
};
