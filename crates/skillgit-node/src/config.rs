//! Node configuration types.

use anyhow::Context;
use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use std::path::{Path, PathBuf};

/// Configuration for the skillgit node.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct Config {
    /// HTTP listen address.
    pub listen_addr: SocketAddr,
    /// Directory holding one subdirectory per skill.
    pub skills_dir: PathBuf,
    /// Log level.
    pub log_level: String,
    /// Log format (`pretty` or `json`).
    pub log_format: String,
    /// Use file modification times as commit times.
    pub use_file_timestamps: bool,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            listen_addr: SocketAddr::from(([127, 0, 0, 1], 8080)),
            skills_dir: PathBuf::from("./skills"),
            log_level: "info".to_string(),
            log_format: "pretty".to_string(),
            use_file_timestamps: true,
        }
    }
}

impl Config {
    /// Reads a YAML configuration file, falling back to defaults when the
    /// file does not exist. Missing keys take their default value.
    pub fn load(path: &Path) -> anyhow::Result<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }

        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read config {}", path.display()))?;
        Self::from_yaml(&raw).with_context(|| format!("invalid config {}", path.display()))
    }

    /// Parses a YAML document.
    pub fn from_yaml(raw: &str) -> anyhow::Result<Self> {
        if raw.trim().is_empty() {
            return Ok(Self::default());
        }
        Ok(serde_yaml::from_str(raw)?)
    }
}
