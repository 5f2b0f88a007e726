//! Demo configuration

use serde::{Deserialize, Serialize};
use std::path::Path;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    ReadError(#[from] std::io::Error),

    #[error("Failed to parse YAML: {0}")]
    ParseError(#[from] serde_yaml::Error),
}

/// Shape of the object the demo serves
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DemoConfig {
    /// Value of the `name` member
    #[serde(default = "default_name")]
    pub name: String,

    /// Value written to `quote` during the demo
    #[serde(default = "default_quote")]
    pub quote: String,

    /// Delay passed to `timeout(ms)`
    #[serde(default = "default_delay_ms")]
    pub delay_ms: u64,

    /// Starting value of `countdown(n, callback)`
    #[serde(default = "default_countdown")]
    pub countdown: u32,
}

fn default_name() -> String {
    "tether".to_string()
}

fn default_quote() -> String {
    "Hello from the other side".to_string()
}

fn default_delay_ms() -> u64 {
    50
}

fn default_countdown() -> u32 {
    3
}

impl Default for DemoConfig {
    fn default() -> Self {
        Self {
            name: default_name(),
            quote: default_quote(),
            delay_ms: default_delay_ms(),
            countdown: default_countdown(),
        }
    }
}

impl DemoConfig {
    /// Load configuration from a YAML file
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path.as_ref())?;
        let config: DemoConfig = serde_yaml::from_str(&contents)?;
        Ok(config)
    }
}
