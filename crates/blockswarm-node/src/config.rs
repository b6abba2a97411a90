//! Node configuration types

use blockswarm_core::SwarmConfig;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Complete process configuration
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct NodeConfig {
    /// Protocol parameters shared by peers and the tracker
    #[serde(default)]
    pub swarm: SwarmConfig,

    /// Block and output locations
    #[serde(default)]
    pub storage: StorageConfig,

    /// Logging configuration
    #[serde(default)]
    pub logging: LoggingConfig,
}

impl NodeConfig {
    /// Load from a TOML file; `None` means built-in defaults
    pub fn load(path: Option<&Path>) -> anyhow::Result<Self> {
        let config = match path {
            Some(path) => {
                let content = std::fs::read_to_string(path)
                    .map_err(|e| anyhow::anyhow!("Cannot read config {}: {}", path.display(), e))?;
                Self::from_toml(&content)?
            }
            None => Self::default(),
        };
        config.swarm.validate()?;
        Ok(config)
    }

    pub fn from_toml(content: &str) -> anyhow::Result<Self> {
        Ok(toml::from_str(content)?)
    }

    /// Output file of a completed peer
    pub fn output_path(&self, id: u16) -> PathBuf {
        self.storage.output_dir.join(format!("peer_{}_complete", id))
    }

    /// Log file of a peer
    pub fn log_path(&self, id: u16) -> PathBuf {
        self.logging.dir.join(format!("peer_{}.log", id))
    }
}

/// Storage locations
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct StorageConfig {
    /// Directory of `block_<i>` files
    #[serde(default = "default_blocks_dir")]
    pub blocks_dir: PathBuf,

    /// Directory for reconstructed files
    #[serde(default = "default_output_dir")]
    pub output_dir: PathBuf,
}

fn default_blocks_dir() -> PathBuf {
    PathBuf::from("files/blocks")
}

fn default_output_dir() -> PathBuf {
    PathBuf::from("files/downloads")
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            blocks_dir: default_blocks_dir(),
            output_dir: default_output_dir(),
        }
    }
}

/// Logging configuration
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Default filter when `RUST_LOG` is unset
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Directory of per-peer log files
    #[serde(default = "default_log_dir")]
    pub dir: PathBuf,

    /// Write a per-peer log file besides the console
    #[serde(default = "default_true")]
    pub file: bool,
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_log_dir() -> PathBuf {
    PathBuf::from("logs")
}

fn default_true() -> bool {
    true
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            dir: default_log_dir(),
            file: true,
        }
    }
}
