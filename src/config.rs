use std::path::{Path, PathBuf};

use clap::Parser;
use serde::{Deserialize, Serialize};

use crate::serial::interface::DEFAULT_DEVICE_MATCH;
use crate::serial::DeviceMatcher;

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to read config {path}: {source}")]
    Io { path: PathBuf, source: std::io::Error },

    #[error("Invalid config: {0}")]
    Parse(#[from] serde_json::Error),
}

/// Command line flags. Anything given here wins over the config file.
#[derive(Debug, Default, Parser)]
#[command(name = "tempwatch", version, about = "Monitor a serial temperature sensor and adjust its warning threshold")]
pub struct Cli {
    /// JSON config file
    #[arg(long)]
    pub config: Option<PathBuf>,

    /// Substring the port description must contain (case-sensitive)
    #[arg(long)]
    pub device_match: Option<String>,

    /// Use this port instead of scanning
    #[arg(long)]
    pub port: Option<String>,

    /// Talk to a simulated board instead of hardware
    #[arg(long)]
    pub simulate: bool,

    /// Print events as JSON lines
    #[arg(long)]
    pub json: bool,

    /// Stop polling when the link drops instead of reconnecting
    #[arg(long)]
    pub no_reconnect: bool,

    /// Log filter, e.g. "debug" or "tempwatch_lib=trace"
    #[arg(long)]
    pub log_level: Option<String>,
}

/// Application settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub device_match: String,
    pub port: Option<String>,
    pub simulate: bool,
    pub json_output: bool,
    pub reconnect: bool,
    pub log_level: String,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            device_match: DEFAULT_DEVICE_MATCH.to_string(),
            port: None,
            simulate: false,
            json_output: false,
            reconnect: true,
            log_level: "info".to_string(),
        }
    }
}

impl AppConfig {
    pub fn from_json(json: &str) -> Result<Self, ConfigError> {
        Ok(serde_json::from_str(json)?)
    }

    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let json = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_json(&json)
    }

    /// Config file (if any) overlaid with command line flags
    pub fn resolve(cli: &Cli) -> Result<Self, ConfigError> {
        let base = match &cli.config {
            Some(path) => Self::load(path)?,
            None => Self::default(),
        };
        Ok(base.with_cli(cli))
    }

    pub fn with_cli(mut self, cli: &Cli) -> Self {
        if let Some(device_match) = &cli.device_match {
            self.device_match = device_match.clone();
        }
        if let Some(port) = &cli.port {
            self.port = Some(port.clone());
        }
        if let Some(level) = &cli.log_level {
            self.log_level = level.clone();
        }
        self.simulate |= cli.simulate;
        self.json_output |= cli.json;
        if cli.no_reconnect {
            self.reconnect = false;
        }
        self
    }

    pub fn matcher(&self) -> DeviceMatcher {
        DeviceMatcher::Description(self.device_match.clone())
    }
}
