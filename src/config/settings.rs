//! Application settings

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::core::protocol::decoder::DEFAULT_MAX_SENTENCE_LEN;
use crate::core::protocol::{DecoderConfig, SyncPair};
use crate::core::session::DEFAULT_READ_CHUNK;
use crate::core::transport::{RetryPolicy, SerialConfig, DEFAULT_I2C_ADDRESS};

/// Configuration errors
#[derive(Error, Debug)]
pub enum ConfigError {
    /// No platform config directory
    #[error("Could not determine config directory")]
    NoConfigDir,

    /// File could not be read or written
    #[error("Config I/O error on {path}: {source}")]
    Io {
        /// File involved
        path: PathBuf,
        /// Underlying error
        #[source]
        source: std::io::Error,
    },

    /// File is not valid TOML for [`AppConfig`]
    #[error("Invalid config: {0}")]
    Parse(#[from] toml::de::Error),

    /// Config could not be rendered
    #[error("Config serialization failed: {0}")]
    Serialize(#[from] toml::ser::Error),
}

/// Receiver family, which fixes the binary sync pair
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ReceiverFamily {
    /// u-blox (`B5 62`)
    #[default]
    Ublox,
    /// Allystar (`F1 D9`)
    Allystar,
}

impl ReceiverFamily {
    /// Binary sync pair used by this family
    pub fn sync(&self) -> SyncPair {
        match self {
            Self::Ublox => SyncPair::UBLOX,
            Self::Allystar => SyncPair::ALLYSTAR,
        }
    }
}

impl std::str::FromStr for ReceiverFamily {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "ublox" | "u-blox" => Ok(Self::Ublox),
            "allystar" => Ok(Self::Allystar),
            other => Err(format!("unknown receiver family: {}", other)),
        }
    }
}

/// Application configuration
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    /// Receiver settings
    pub receiver: ReceiverConfig,
    /// Serial link
    pub serial: SerialConfig,
    /// Decoder settings
    pub decoder: DecoderSettings,
    /// Fault retry policy for the transport
    pub retry: RetryPolicy,
    /// Logging settings
    pub logging: LoggingConfig,
    /// Live monitor settings
    pub monitor: MonitorConfig,
}

impl AppConfig {
    /// Load config from the default location; defaults if the file is missing
    pub fn load() -> Result<Self, ConfigError> {
        let path = super::config_path().ok_or(ConfigError::NoConfigDir)?;
        Self::load_from(&path)
    }

    /// Load config from `path`; defaults if the file is missing
    pub fn load_from(path: &Path) -> Result<Self, ConfigError> {
        if !path.exists() {
            tracing::debug!("No config at {}, using defaults", path.display());
            return Ok(Self::default());
        }

        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Ok(toml::from_str(&content)?)
    }

    /// Save config to the default location
    pub fn save(&self) -> Result<PathBuf, ConfigError> {
        let path = super::config_path().ok_or(ConfigError::NoConfigDir)?;
        self.save_to(&path)?;
        Ok(path)
    }

    /// Save config to `path`, creating parent directories
    pub fn save_to(&self, path: &Path) -> Result<(), ConfigError> {
        let io_err = |source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        };

        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(io_err)?;
        }
        let content = toml::to_string_pretty(self)?;
        std::fs::write(path, content).map_err(io_err)
    }

    /// Decoder configuration for the configured receiver family
    pub fn decoder_config(&self) -> DecoderConfig {
        DecoderConfig {
            sync: self.receiver.family.sync(),
            max_sentence_len: self.decoder.max_sentence_len,
        }
    }
}

/// Receiver settings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ReceiverConfig {
    /// Receiver family
    pub family: ReceiverFamily,
    /// I2C bus device (e.g. `/dev/i2c-1`); the serial link is used when unset
    #[serde(skip_serializing_if = "Option::is_none")]
    pub i2c_bus: Option<PathBuf>,
    /// 7-bit I2C address when attached over I2C
    pub i2c_address: u8,
}

impl Default for ReceiverConfig {
    fn default() -> Self {
        Self {
            family: ReceiverFamily::Ublox,
            i2c_bus: None,
            i2c_address: DEFAULT_I2C_ADDRESS,
        }
    }
}

/// Decoder settings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DecoderSettings {
    /// Longest sentence accumulated before it is dropped
    pub max_sentence_len: usize,
    /// Maximum bytes read from the channel per poll
    pub read_chunk: usize,
}

impl Default for DecoderSettings {
    fn default() -> Self {
        Self {
            max_sentence_len: DEFAULT_MAX_SENTENCE_LEN,
            read_chunk: DEFAULT_READ_CHUNK,
        }
    }
}

/// Logging settings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Default filter directive (`RUST_LOG` takes precedence)
    pub level: String,
    /// Emit JSON log lines
    pub json: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            json: false,
        }
    }
}

/// Live monitor settings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct MonitorConfig {
    /// Stop when nothing is decoded for this long (0 = never)
    pub watchdog_secs: u64,
    /// Sleep between polls of an idle channel
    pub idle_poll_ms: u64,
}

impl Default for MonitorConfig {
    fn default() -> Self {
        Self {
            watchdog_secs: 10,
            idle_poll_ms: 20,
        }
    }
}
