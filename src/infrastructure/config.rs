//! Configuration management

use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::pipeline::ConfigError;

const MIN_POLL_INTERVAL_MS: u64 = 1;

/// Application configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Docker daemon address; `DOCKER_HOST` or the local socket when unset
    pub docker_host: Option<String>,
    /// Log level
    pub log_level: String,
    /// Delay between two container state polls, in milliseconds
    pub poll_interval_ms: u64,
    /// Directory inside the container that receives `script.sh`
    pub script_dir: String,
    /// Interpreter used when a stage names none
    pub default_shell: String,
    /// Prefix of cache volume names
    pub volume_prefix: String,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            docker_host: None,
            log_level: "info".to_string(),
            poll_interval_ms: 1000,
            script_dir: "/tmp".to_string(),
            default_shell: "bash".to_string(),
            volume_prefix: "polka".to_string(),
        }
    }
}

impl Config {
    /// Loads a YAML configuration file; missing keys keep their defaults.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Read`] if the file cannot be read and
    /// [`ConfigError::Malformed`] if it is not valid YAML or sets a zero
    /// poll interval.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let source = std::fs::read_to_string(path).map_err(|e| ConfigError::Read {
            path: path.display().to_string(),
            reason: e.to_string(),
        })?;
        let config: Self =
            serde_yaml::from_str(&source).map_err(|e| ConfigError::Malformed(e.to_string()))?;

        if config.poll_interval_ms == 0 {
            return Err(ConfigError::Malformed(
                "poll_interval_ms must be greater than 0".to_string(),
            ));
        }
        Ok(config)
    }

    /// Polling interval as a [`Duration`], never shorter than 1ms
    #[must_use]
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms.max(MIN_POLL_INTERVAL_MS))
    }
}
