//! Configuration loading for extentfs.
//!
//! Both `extentd` and `extentctl` read the same file, each using the
//! sections that concern it.
//!
//! # Usage
//!
//! ```rust,no_run
//! use extentconf::ExtentConfig;
//!
//! let config = ExtentConfig::load().expect("Failed to load config");
//! println!("extent dir: {}", config.paths.extent_dir.display());
//! println!("listening on {}", config.bind.addr());
//! ```
//!
//! # Config File Locations
//!
//! Files are loaded in order (later wins):
//! 1. `/etc/extentfs/config.toml` (system)
//! 2. `~/.config/extentfs/config.toml` (user)
//! 3. `./extentfs.toml` (local override), or the `--config` path instead
//! 4. Environment variables (`EXTENTFS_*`, `RUST_LOG`)
//!
//! # Example Config
//!
//! ```toml
//! [paths]
//! extent_dir = "~/.local/share/extentfs/extents"
//!
//! [bind]
//! host = "0.0.0.0"
//! port = 8989
//!
//! [client]
//! server_host = "localhost"
//! server_port = 8989
//! chunk_size = 4096
//!
//! [store]
//! flush_policy = "full"
//!
//! [telemetry]
//! log_level = "info"
//! otlp_endpoint = "127.0.0.1:4317"
//! ```

pub mod infra;
pub mod loader;
pub mod logging;

pub use infra::{BindConfig, ClientConfig, PathsConfig, StoreConfig, TelemetryConfig, DEFAULT_PORT};
pub use loader::{discover_config_files_with_override, expand_path, ConfigSources};
pub use logging::{normalize_directive, LogLevel};

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Configuration loading errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file {path}: {source}")]
    FileRead {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("Failed to parse config file {path}: {message}")]
    Parse { path: PathBuf, message: String },

    #[error("Invalid value for {key}: {reason}")]
    Invalid { key: String, reason: String },
}

/// Complete extentfs configuration.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExtentConfig {
    #[serde(default)]
    pub paths: PathsConfig,
    #[serde(default)]
    pub bind: BindConfig,
    #[serde(default)]
    pub client: ClientConfig,
    #[serde(default)]
    pub store: StoreConfig,
    #[serde(default)]
    pub telemetry: TelemetryConfig,
}

impl ExtentConfig {
    /// Load configuration from all sources.
    pub fn load() -> Result<Self, ConfigError> {
        Self::load_from(None)
    }

    /// Load configuration, using `config_path` instead of `./extentfs.toml`.
    ///
    /// System and user configs still load first.
    pub fn load_from(config_path: Option<&Path>) -> Result<Self, ConfigError> {
        let (config, _sources) = Self::load_with_sources_from(config_path)?;
        Ok(config)
    }

    /// Load configuration from optional path and return information about sources.
    pub fn load_with_sources_from(
        config_path: Option<&Path>,
    ) -> Result<(Self, ConfigSources), ConfigError> {
        let mut sources = ConfigSources::default();
        let mut config = ExtentConfig::default();

        for path in loader::discover_config_files_with_override(config_path) {
            loader::apply_file(&mut config, &path)?;
            sources.files.push(path);
        }

        loader::apply_env_overrides(&mut config, &mut sources)?;

        Ok((config, sources))
    }

    /// Serialize config to a TOML string.
    pub fn to_toml(&self) -> String {
        // Sections are plain tables of scalars; serialization cannot fail.
        toml::to_string_pretty(self).unwrap_or_default()
    }
}
