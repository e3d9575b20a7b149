// Configuration management for the blelink CLI
//
// Cross-platform config stored in:
// - macOS: ~/Library/Application Support/blelink/config.json
// - Linux: ~/.config/blelink/config.json
// - Windows: %APPDATA%\blelink\config.json

use anyhow::{Context, Result};
use blelink_core::{EndMarker, Pacing, PacingMode, TransferConfig, WriteMode};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Engine settings shared by sender and receiver
    #[serde(default)]
    pub transfer: TransferConfig,

    /// Link defaults for `simulate`
    #[serde(default)]
    pub link: LinkDefaults,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LinkDefaults {
    /// Packet size limit per peer
    pub mtu: usize,

    /// Packets buffered before the link pushes back
    pub buffer_packets: usize,

    pub write_mode: WriteMode,

    /// Simulated air tick in milliseconds
    pub tick_ms: u64,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            transfer: TransferConfig::default()
                .with_end_marker(EndMarker::new(b"\x00EOM\x00".to_vec())),
            link: LinkDefaults::default(),
        }
    }
}

impl Default for LinkDefaults {
    fn default() -> Self {
        Self {
            mtu: 20,
            buffer_packets: 4,
            write_mode: WriteMode::BackToBack,
            tick_ms: 5,
        }
    }
}

fn parse_bool(value: &str) -> Result<bool> {
    value.parse().context("Invalid boolean value")
}

impl Config {
    /// Get the config directory path (cross-platform)
    pub fn config_dir() -> Result<PathBuf> {
        let config_dir = dirs::config_dir()
            .context("Failed to determine config directory")?
            .join("blelink");

        std::fs::create_dir_all(&config_dir).context("Failed to create config directory")?;

        Ok(config_dir)
    }

    /// Get the config file path
    pub fn config_file() -> Result<PathBuf> {
        Ok(Self::config_dir()?.join("config.json"))
    }

    /// Load config from `path`, creating it with defaults if missing
    pub fn load_from(path: &Path) -> Result<Self> {
        if path.exists() {
            let contents = std::fs::read_to_string(path).context("Failed to read config file")?;
            let config: Config =
                serde_json::from_str(&contents).context("Failed to parse config file")?;
            config
                .transfer
                .validate()
                .context("Invalid transfer settings in config file")?;
            Ok(config)
        } else {
            let config = Config::default();
            config.save_to(path)?;
            Ok(config)
        }
    }

    /// Save config to the default location
    pub fn save(&self) -> Result<()> {
        self.save_to(&Self::config_file()?)
    }

    pub fn save_to(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).context("Failed to create config directory")?;
        }
        let contents = serde_json::to_string_pretty(self).context("Failed to serialize config")?;
        std::fs::write(path, contents).context("Failed to write config file")?;
        Ok(())
    }

    /// Set a config value; the caller persists it
    pub fn set(&mut self, key: &str, value: &str) -> Result<()> {
        match key {
            "end_marker" => {
                self.transfer.end_marker = if value.is_empty() {
                    None
                } else {
                    let bytes = hex::decode(value).context("Marker must be hex encoded")?;
                    let coalesce = self
                        .transfer
                        .end_marker
                        .as_ref()
                        .map(EndMarker::coalesces)
                        .unwrap_or(true);
                    EndMarker::new(bytes).map(|m| if coalesce { m } else { m.separate() })
                };
            }
            "marker_coalesce" => {
                let coalesce = parse_bool(value)?;
                let marker = self
                    .transfer
                    .end_marker
                    .take()
                    .context("No end marker configured")?;
                self.transfer.end_marker = EndMarker::new(marker.bytes().to_vec())
                    .map(|m| if coalesce { m } else { m.separate() });
            }
            "pacing" => {
                self.transfer.default_pacing = if value.is_empty() || value == "off" {
                    None
                } else {
                    let (bytes, ms) = value
                        .split_once('/')
                        .context("Pacing must look like <bytes>/<ms>")?;
                    Some(Pacing::new(
                        ms.trim().parse().context("Invalid delay")?,
                        bytes.trim().parse().context("Invalid byte interval")?,
                    ))
                };
            }
            "pacing_mode" => {
                self.transfer.pacing_mode = match value {
                    "blocking" => PacingMode::Blocking,
                    "scheduled" => PacingMode::Scheduled,
                    _ => anyhow::bail!("Pacing mode must be 'blocking' or 'scheduled'"),
                };
            }
            "max_message_size" => {
                self.transfer.max_message_size = value.parse().context("Invalid number")?;
            }
            "mtu" => {
                self.link.mtu = value.parse().context("Invalid number")?;
            }
            "buffer_packets" => {
                self.link.buffer_packets = value.parse().context("Invalid number")?;
            }
            "write_mode" => {
                self.link.write_mode = match value {
                    "back-to-back" => WriteMode::BackToBack,
                    "one-per-ready" => WriteMode::OnePerReady,
                    _ => anyhow::bail!("Write mode must be 'back-to-back' or 'one-per-ready'"),
                };
            }
            "tick_ms" => {
                self.link.tick_ms = value.parse().context("Invalid number")?;
            }
            _ => anyhow::bail!("Unknown config key: {}", key),
        }
        self.transfer.validate().context("Rejected setting")?;
        Ok(())
    }

    /// List all config values
    pub fn list(&self) -> Vec<(String, String)> {
        let marker = self.transfer.end_marker.as_ref();
        vec![
            (
                "end_marker".to_string(),
                marker
                    .map(|m| hex::encode(m.bytes()))
                    .unwrap_or_else(|| "(none)".to_string()),
            ),
            (
                "marker_coalesce".to_string(),
                marker
                    .map(|m| m.coalesces().to_string())
                    .unwrap_or_else(|| "-".to_string()),
            ),
            (
                "pacing".to_string(),
                self.transfer
                    .default_pacing
                    .map(|p| format!("{}/{}", p.bytes_between_delay, p.delay_ms))
                    .unwrap_or_else(|| "off".to_string()),
            ),
            (
                "pacing_mode".to_string(),
                match self.transfer.pacing_mode {
                    PacingMode::Blocking => "blocking".to_string(),
                    PacingMode::Scheduled => "scheduled".to_string(),
                },
            ),
            (
                "max_message_size".to_string(),
                self.transfer.max_message_size.to_string(),
            ),
            ("mtu".to_string(), self.link.mtu.to_string()),
            (
                "buffer_packets".to_string(),
                self.link.buffer_packets.to_string(),
            ),
            ("write_mode".to_string(), self.link.write_mode.to_string()),
            ("tick_ms".to_string(), format!("{}ms", self.link.tick_ms)),
        ]
    }
}
