//! Configuration module
//!
//! Handles application settings stored as TOML in the platform config directory

mod settings;

pub use settings::{
    AppConfig, ConfigError, DecoderSettings, LoggingConfig, MonitorConfig, ReceiverConfig,
    ReceiverFamily,
};

use directories::ProjectDirs;
use std::path::PathBuf;

/// Config file name inside [`config_dir`]
pub const CONFIG_FILE: &str = "config.toml";

/// Get the application configuration directory
pub fn config_dir() -> Option<PathBuf> {
    ProjectDirs::from("org", "gpsmux", "gpsmux").map(|dirs| dirs.config_dir().to_path_buf())
}

/// Get the default config file path
pub fn config_path() -> Option<PathBuf> {
    config_dir().map(|d| d.join(CONFIG_FILE))
}
