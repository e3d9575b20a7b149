// Transfer configuration
//
// Static per deployment: end-of-data marker, default pacing and how pacing
// delays are scheduled. Stored as JSON; marker bytes are hex encoded.

use crate::transport::ble::fragment::EndMarker;
use crate::transport::ble::task::Pacing;
use serde::{Deserialize, Serialize};
use std::path::Path;
use thiserror::Error;

/// Largest message the reassembler buffers while waiting for a marker
pub const DEFAULT_MAX_MESSAGE_SIZE: usize = 1024 * 1024;

/// How the executor serves pacing delays
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum PacingMode {
    /// Sleep inline; every other event waits until the delay is over
    Blocking,
    /// Arm a timer and keep handling enqueues and disconnects meanwhile
    #[default]
    Scheduled,
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ConfigError {
    #[error("End marker must not be empty")]
    EmptyMarker,
    #[error("Invalid pacing: {0}")]
    InvalidPacing(String),
    #[error("Maximum message size must be positive")]
    InvalidMessageLimit,
    #[error("Config I/O error: {0}")]
    Io(String),
    #[error("Config parse error: {0}")]
    Parse(String),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransferConfig {
    /// Delimiter appended to every outbound payload; `None` makes every
    /// packet its own message
    #[serde(default)]
    pub end_marker: Option<EndMarker>,

    /// Pacing for tasks that do not bring their own
    #[serde(default)]
    pub default_pacing: Option<Pacing>,

    #[serde(default)]
    pub pacing_mode: PacingMode,

    #[serde(default = "default_max_message_size")]
    pub max_message_size: usize,
}

fn default_max_message_size() -> usize {
    DEFAULT_MAX_MESSAGE_SIZE
}

impl Default for TransferConfig {
    fn default() -> Self {
        Self {
            end_marker: None,
            default_pacing: None,
            pacing_mode: PacingMode::default(),
            max_message_size: DEFAULT_MAX_MESSAGE_SIZE,
        }
    }
}

impl TransferConfig {
    pub fn with_end_marker(mut self, marker: Option<EndMarker>) -> Self {
        self.end_marker = marker;
        self
    }

    pub fn with_default_pacing(mut self, pacing: Option<Pacing>) -> Self {
        self.default_pacing = pacing;
        self
    }

    pub fn with_pacing_mode(mut self, mode: PacingMode) -> Self {
        self.pacing_mode = mode;
        self
    }

    pub fn with_max_message_size(mut self, size: usize) -> Self {
        self.max_message_size = size;
        self
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.end_marker.as_ref().is_some_and(EndMarker::is_empty) {
            return Err(ConfigError::EmptyMarker);
        }
        if let Some(pacing) = self.default_pacing {
            if pacing.bytes_between_delay == 0 {
                return Err(ConfigError::InvalidPacing(
                    "bytes_between_delay must be positive".to_string(),
                ));
            }
            if pacing.delay_ms == 0 {
                return Err(ConfigError::InvalidPacing(
                    "delay_ms must be positive".to_string(),
                ));
            }
        }
        if self.max_message_size == 0 {
            return Err(ConfigError::InvalidMessageLimit);
        }
        Ok(())
    }

    /// Parse and validate a JSON document
    pub fn from_json(json: &str) -> Result<Self, ConfigError> {
        let config: Self =
            serde_json::from_str(json).map_err(|e| ConfigError::Parse(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    pub fn to_json(&self) -> Result<String, ConfigError> {
        serde_json::to_string_pretty(self).map_err(|e| ConfigError::Parse(e.to_string()))
    }

    /// Load from a JSON file
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let contents =
            std::fs::read_to_string(path.as_ref()).map_err(|e| ConfigError::Io(e.to_string()))?;
        Self::from_json(&contents)
    }

    /// Write to a JSON file, creating parent directories
    pub fn save(&self, path: impl AsRef<Path>) -> Result<(), ConfigError> {
        let path = path.as_ref();
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| ConfigError::Io(e.to_string()))?;
        }
        std::fs::write(path, self.to_json()?).map_err(|e| ConfigError::Io(e.to_string()))
    }
}
