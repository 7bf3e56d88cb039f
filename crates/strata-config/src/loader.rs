//! Configuration file discovery and loading.

use std::path::{Path, PathBuf};
use tracing::debug;

use crate::error::{ConfigError, ConfigResult};
use crate::types::Config;
use crate::validate;

impl Config {
    /// Load configuration from an explicit TOML file.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read, parsed, or fails
    /// validation.
    pub fn load(path: impl AsRef<Path>) -> ConfigResult<Self> {
        let content = std::fs::read_to_string(path.as_ref())?;
        let config: Self = toml::from_str(&content).map_err(|e| ConfigError::Parse(e.to_string()))?;
        validate::validate(&config)?;
        debug!(path = %path.as_ref().display(), "Loaded configuration");
        Ok(config)
    }

    /// Load from the default location, falling back to built-in defaults
    /// when no file exists.
    ///
    /// # Errors
    ///
    /// Returns an error if a file exists but cannot be parsed or validated.
    pub fn load_default() -> ConfigResult<Self> {
        let path = Self::default_path()?;
        if path.exists() {
            Self::load(&path)
        } else {
            let config = Self::default();
            validate::validate(&config)?;
            Ok(config)
        }
    }

    /// Default config file location (`~/.strata/config.toml`).
    ///
    /// # Errors
    ///
    /// Returns an error if the home directory cannot be determined.
    pub fn default_path() -> ConfigResult<PathBuf> {
        let dirs = directories::BaseDirs::new().ok_or(ConfigError::NoConfigDir)?;
        Ok(dirs.home_dir().join(".strata").join("config.toml"))
    }
}
