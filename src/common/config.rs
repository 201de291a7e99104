//! Configuration file handling

use serde::Deserialize;
use std::path::Path;

use super::paths::config_path;
use super::Result;
use crate::rpc::codec::{DEFAULT_MAX_FRAME_BYTES, FRAME_LIMIT_CEILING};

/// Main configuration structure
#[derive(Debug, Deserialize, Default)]
pub struct Config {
    /// Presentation settings shared by every attached UI
    #[serde(default)]
    pub ui: UiConfig,

    /// Wire settings
    #[serde(default)]
    pub rpc: RpcConfig,

    /// Listen-mode settings
    #[serde(default)]
    pub server: ServerConfig,
}

/// Presentation settings
#[derive(Debug, Deserialize)]
pub struct UiConfig {
    /// Prompt shown under startup diagnostics
    #[serde(default = "default_pager_prompt")]
    pub pager_prompt: String,

    /// Initial default foreground, `#RRGGBB`
    #[serde(default)]
    pub default_fg: Option<String>,

    /// Initial default background, `#RRGGBB`
    #[serde(default)]
    pub default_bg: Option<String>,

    /// Initial default special color, `#RRGGBB`
    #[serde(default)]
    pub default_sp: Option<String>,
}

impl Default for UiConfig {
    fn default() -> Self {
        Self {
            pager_prompt: default_pager_prompt(),
            default_fg: None,
            default_bg: None,
            default_sp: None,
        }
    }
}

fn default_pager_prompt() -> String {
    "Press ENTER or type command to continue".to_string()
}

/// Wire settings
#[derive(Debug, Deserialize)]
pub struct RpcConfig {
    /// Largest accepted frame body in bytes
    #[serde(default = "default_max_frame_bytes")]
    pub max_frame_bytes: usize,
}

impl Default for RpcConfig {
    fn default() -> Self {
        Self {
            max_frame_bytes: default_max_frame_bytes(),
        }
    }
}

fn default_max_frame_bytes() -> usize {
    DEFAULT_MAX_FRAME_BYTES
}

/// Listen-mode settings
#[derive(Debug, Deserialize, Default)]
pub struct ServerConfig {
    /// Address used by `listen` when none is given on the command line
    #[serde(default)]
    pub default_address: Option<String>,
}

impl Config {
    /// Load configuration from the default config file
    ///
    /// Returns default configuration if file doesn't exist
    pub fn load() -> Result<Self> {
        match config_path() {
            Some(path) if path.exists() => Self::load_from(&path),
            _ => Ok(Self::default()),
        }
    }

    /// Load configuration from an explicit path
    pub fn load_from(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| super::Error::FileRead {
            path: path.display().to_string(),
            error: e.to_string(),
        })?;
        Self::parse(&content)
    }

    /// Parse configuration from TOML text
    pub fn parse(content: &str) -> Result<Self> {
        let config: Self =
            toml::from_str(content).map_err(|e| super::Error::ConfigParse(e.to_string()))?;

        if config.rpc.max_frame_bytes == 0 {
            return Err(super::Error::Config(
                "rpc.max_frame_bytes must be greater than zero".to_string(),
            ));
        }
        if config.rpc.max_frame_bytes > FRAME_LIMIT_CEILING {
            return Err(super::Error::Config(format!(
                "rpc.max_frame_bytes must be at most {}",
                FRAME_LIMIT_CEILING
            )));
        }

        Ok(config)
    }
}
