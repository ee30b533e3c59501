use serde::{Deserialize, Serialize};
use sessionkit_core::{get_default_config_file, ManagerConfig, SessionError, SessionResult};
use std::fs;
use std::net::SocketAddr;
use std::path::{Path, PathBuf};

/// Directory name under `~/.config`
pub const APP_NAME: &str = "sessionkit";

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct AppConfig {
    pub http_addr: SocketAddr,
    pub session: ManagerConfig,
}

impl Default for AppConfig {
    fn default() -> Self {
        AppConfig {
            http_addr: SocketAddr::from(([127, 0, 0, 1], 9090)),
            session: ManagerConfig::default(),
        }
    }
}

impl AppConfig {
    /// Load from `path`, falling back to defaults when the file does not exist
    pub fn load_from_file(path: &Path) -> SessionResult<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }

        let content = fs::read_to_string(path).map_err(|e| {
            SessionError::Config(format!("Failed to read config file {}: {}", path.display(), e))
        })?;
        let config: Self = toml::from_str(&content)?;
        config.session.validate()?;
        Ok(config)
    }

    /// Load from `~/.config/sessionkit/config.toml`
    pub fn load_from_default() -> SessionResult<(Self, PathBuf)> {
        let path = get_default_config_file(APP_NAME)?;
        let config = Self::load_from_file(&path)?;
        Ok((config, path))
    }
}
