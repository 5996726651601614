//! Configuration: loads optional ~/.musictoy/config.yaml.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use thiserror::Error;

use crate::audio::master::DEFAULT_MASTER_GAIN;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("could not read config file: {0}")]
    Io(#[from] std::io::Error),

    #[error("invalid config file: {0}")]
    Yaml(#[from] serde_yaml::Error),
}

/// Runtime settings for the player. Every field has a default.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct Config {
    /// Force an output sample rate instead of the device default.
    pub sample_rate: Option<u32>,
    /// Frames rendered per block.
    pub block_size: u32,
    /// Gain of the shared output bus.
    pub master_gain: f32,
    /// Seed for the noise generator.
    pub seed: u64,
    /// How far rendering runs ahead of the wall clock.
    pub render_ahead_ms: u64,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            sample_rate: None,
            block_size: 512,
            master_gain: DEFAULT_MASTER_GAIN,
            seed: 42,
            render_ahead_ms: 60,
        }
    }
}

/// Get the config file path.
pub fn config_path() -> Option<PathBuf> {
    dirs::home_dir().map(|h| h.join(".musictoy").join("config.yaml"))
}

/// Load ~/.musictoy/config.yaml. A missing file (or home dir) gives defaults.
pub fn load_config() -> Result<Config, ConfigError> {
    match config_path() {
        Some(path) if path.exists() => load_from(&path),
        _ => Ok(Config::default()),
    }
}

pub fn load_from(path: &Path) -> Result<Config, ConfigError> {
    let content = std::fs::read_to_string(path)?;
    Ok(serde_yaml::from_str(&content)?)
}
