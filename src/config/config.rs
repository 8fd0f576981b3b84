use serde::Deserialize;
use std::path::Path;
use tokio::fs;

use super::types::LogLevel;
use crate::errors::ConfigError;

// -----------------------------------------------------------------------------
// ----- Constants -------------------------------------------------------------

const DEFAULT_READ_BUFFER_CAPACITY: usize = 4 * 1024;

// -----------------------------------------------------------------------------
// ----- TransportConfig -------------------------------------------------------

/// Tunables for the TCP transport and the process log level.
#[derive(Clone, Debug, Deserialize, PartialEq, Eq)]
#[serde(default, deny_unknown_fields)]
pub struct TransportConfig {
    /// Bytes reserved in the inbound buffer before each socket read.
    pub read_buffer_capacity: usize,
    pub nodelay: bool,
    pub log_level: LogLevel,
}

impl Default for TransportConfig {
    fn default() -> Self {
        Self {
            read_buffer_capacity: DEFAULT_READ_BUFFER_CAPACITY,
            nodelay: true,
            log_level: LogLevel::Info,
        }
    }
}

// -----------------------------------------------------------------------------
// ----- TransportConfig: Static -----------------------------------------------

impl TransportConfig {
    /// Async because the file is read with non-blocking IO.
    pub async fn load(path: &Path) -> Result<Self, ConfigError> {
        let raw = fs::read_to_string(path)
            .await
            .map_err(|e| ConfigError::Io {
                path: path.to_path_buf(),
                source: e,
            })?;

        Self::from_toml_str(&raw)
    }

    pub fn from_toml_str(raw: &str) -> Result<Self, ConfigError> {
        let cfg: TransportConfig =
            toml::from_str(raw).map_err(|e| ConfigError::Toml { source: e })?;
        cfg.validate()?;
        Ok(cfg)
    }
}

// -----------------------------------------------------------------------------
// ----- TransportConfig: Public -----------------------------------------------

impl TransportConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.read_buffer_capacity == 0 {
            return Err(ConfigError::Invalid(
                "read_buffer_capacity must be greater than zero".to_string(),
            ));
        }

        Ok(())
    }
}

// -----------------------------------------------------------------------------
// ----- Tests -----------------------------------------------------------------


// -----------------------------------------------------------------------------
// -----------------------------------------------------------------------------
