use std::{fs, path::PathBuf};

use config::Config;
use serde::Deserialize;

use crate::utils::error::ConfigError;

/// Configuration for one server instance: which directory to serve and on
/// which port. Immutable once a server has been constructed from it.
#[derive(Debug, Deserialize, Clone)]
pub struct ServerConfig {
    /// Directory whose files are served.
    pub root_directory: PathBuf,
    /// Port to listen on, 1-65535.
    #[serde(default = "default_port")]
    pub port: u16,
}

fn default_port() -> u16 {
    8000
}

impl ServerConfig {
    /// Loads the configuration from environment variables.
    ///
    /// Variables are prefixed with `DIRSERVE_`, e.g. `DIRSERVE_ROOT_DIRECTORY`
    /// and `DIRSERVE_PORT`.
    ///
    /// # Errors
    /// Returns a `ConfigError` if the configuration cannot be loaded.
    pub fn from_env() -> Result<Self, ConfigError> {
        Config::builder()
            .add_source(config::Environment::with_prefix("DIRSERVE").try_parsing(true))
            .build()
            .map_err(|e| ConfigError(e.to_string()))?
            .try_deserialize()
            .map_err(|e| ConfigError(e.to_string()))
    }

    /// Validates the configuration settings.
    ///
    /// Ensures the root directory exists and is readable and that the port
    /// is in range.
    ///
    /// # Errors
    /// Returns a `ConfigError` if validation fails.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.port == 0 {
            return Err(ConfigError("port must be between 1 and 65535".into()));
        }

        if !self.root_directory.is_dir() {
            return Err(ConfigError(format!(
                "root directory not found: {}",
                self.root_directory.display()
            )));
        }

        fs::read_dir(&self.root_directory).map_err(|e| {
            ConfigError(format!(
                "root directory not readable: {} ({e})",
                self.root_directory.display()
            ))
        })?;

        Ok(())
    }
}
