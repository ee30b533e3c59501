use crate::errors::{SessionError, SessionResult};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Name of the backend registered by the in-memory provider
pub const DEFAULT_PROVIDER: &str = "memory";
pub const DEFAULT_COOKIE_NAME: &str = "sessionid";
pub const DEFAULT_MAX_LIFETIME_SECS: u64 = 3600;

/// Configuration for a session manager
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
#[serde(default)]
pub struct ManagerConfig {
    /// Registered name of the storage backend
    pub provider: String,
    /// Name of the cookie carrying the session identifier
    pub cookie_name: String,
    /// Cookie max-age and idle expiry threshold, in seconds
    pub max_lifetime_secs: u64,
}

impl Default for ManagerConfig {
    fn default() -> Self {
        Self {
            provider: DEFAULT_PROVIDER.to_string(),
            cookie_name: DEFAULT_COOKIE_NAME.to_string(),
            max_lifetime_secs: DEFAULT_MAX_LIFETIME_SECS,
        }
    }
}

/// Partial configuration, typically built from command line flags
#[derive(Debug, Default, Clone)]
pub struct ManagerConfigOverlay {
    pub provider: Option<String>,
    pub cookie_name: Option<String>,
    pub max_lifetime_secs: Option<u64>,
}

impl ManagerConfig {
    pub fn new(provider: impl Into<String>, cookie_name: impl Into<String>, max_lifetime_secs: u64) -> Self {
        Self {
            provider: provider.into(),
            cookie_name: cookie_name.into(),
            max_lifetime_secs,
        }
    }

    /// Loads configuration from a file if it exists, otherwise returns the default config
    pub fn load_from_file(path: &Path) -> SessionResult<Self> {
        if !path.exists() {
            tracing::debug!(path = %path.display(), "Config file missing, using defaults");
            return Ok(Self::default());
        }

        let content = fs::read_to_string(path).map_err(|e| {
            SessionError::Config(format!("Failed to read config file {}: {}", path.display(), e))
        })?;
        let config: Self = toml::from_str(&content)?;
        config.validate()?;
        Ok(config)
    }

    /// Saves configuration to a file
    pub fn save_to_file(&self, path: &Path) -> SessionResult<()> {
        let content = toml::to_string(self)?;

        // Ensure the directory exists
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }

        fs::write(path, content)?;
        Ok(())
    }

    /// Merges this config with an overlay, preferring values from the overlay if present
    pub fn merge(&self, overlay: &ManagerConfigOverlay) -> Self {
        Self {
            provider: overlay.provider.clone().unwrap_or_else(|| self.provider.clone()),
            cookie_name: overlay
                .cookie_name
                .clone()
                .unwrap_or_else(|| self.cookie_name.clone()),
            max_lifetime_secs: overlay.max_lifetime_secs.unwrap_or(self.max_lifetime_secs),
        }
    }

    pub fn max_lifetime(&self) -> Duration {
        Duration::from_secs(self.max_lifetime_secs)
    }

    /// Rejects settings a manager cannot run with
    pub fn validate(&self) -> SessionResult<()> {
        if self.provider.is_empty() {
            return Err(SessionError::Config("provider name is empty".to_string()));
        }
        validate_cookie_name(&self.cookie_name)?;
        if self.max_lifetime_secs == 0 {
            return Err(SessionError::Config(
                "max_lifetime_secs must be greater than zero".to_string(),
            ));
        }
        Ok(())
    }
}

/// Checks that `name` is a valid RFC 6265 cookie name (an HTTP token)
pub fn validate_cookie_name(name: &str) -> SessionResult<()> {
    if name.is_empty() {
        return Err(SessionError::Config("cookie name is empty".to_string()));
    }
    let is_token_char = |c: char| {
        c.is_ascii_graphic() && !"()<>@,;:\\\"/[]?={}".contains(c)
    };
    if let Some(bad) = name.chars().find(|c| !is_token_char(*c)) {
        return Err(SessionError::Config(format!(
            "cookie name {:?} contains invalid character {:?}",
            name, bad
        )));
    }
    Ok(())
}

/// Helper function to get default config directory
pub fn get_default_config_dir(app_name: &str) -> SessionResult<PathBuf> {
    let home_dir = dirs::home_dir().ok_or_else(|| {
        SessionError::Config("Could not determine home directory".to_string())
    })?;

    Ok(home_dir.join(".config").join(app_name))
}

/// Helper function to get default config file path
pub fn get_default_config_file(app_name: &str) -> SessionResult<PathBuf> {
    let config_dir = get_default_config_dir(app_name)?;
    Ok(config_dir.join("config.toml"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_missing_file_yields_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let config = ManagerConfig::load_from_file(&dir.path().join("absent.toml")).unwrap();
        assert_eq!(config, ManagerConfig::default());
        assert_eq!(config.max_lifetime(), Duration::from_secs(3600));
    }

    #[test]
    fn test_save_and_load() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("config.toml");
        let config = ManagerConfig::new("memory", "gosessionid", 120);

        config.save_to_file(&path).unwrap();
        let loaded = ManagerConfig::load_from_file(&path).unwrap();
        assert_eq!(loaded, config);
    }

    #[test]
    fn test_partial_file_keeps_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        fs::write(&path, "cookie_name = \"sid\"\n").unwrap();

        let loaded = ManagerConfig::load_from_file(&path).unwrap();
        assert_eq!(loaded.cookie_name, "sid");
        assert_eq!(loaded.provider, DEFAULT_PROVIDER);
        assert_eq!(loaded.max_lifetime_secs, DEFAULT_MAX_LIFETIME_SECS);
    }

    #[test]
    fn test_invalid_file_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        fs::write(&path, "max_lifetime_secs = 0\n").unwrap();
        assert!(matches!(
            ManagerConfig::load_from_file(&path),
            Err(SessionError::Config(_))
        ));

        fs::write(&path, "max_lifetime_secs = \"soon\"\n").unwrap();
        assert!(matches!(
            ManagerConfig::load_from_file(&path),
            Err(SessionError::TomlDe(_))
        ));
    }

    #[test]
    fn test_merge_prefers_overlay() {
        let base = ManagerConfig::default();
        let overlay = ManagerConfigOverlay {
            cookie_name: Some("sid".to_string()),
            max_lifetime_secs: Some(60),
            ..Default::default()
        };

        let merged = base.merge(&overlay);
        assert_eq!(merged.provider, "memory");
        assert_eq!(merged.cookie_name, "sid");
        assert_eq!(merged.max_lifetime_secs, 60);
    }

    #[test]
    fn test_cookie_name_validation() {
        assert!(validate_cookie_name("sessionid").is_ok());
        assert!(validate_cookie_name("__Host-sid").is_ok());
        assert!(validate_cookie_name("").is_err());
        assert!(validate_cookie_name("session id").is_err());
        assert!(validate_cookie_name("sid;").is_err());
        assert!(validate_cookie_name("a=b").is_err());
    }
}
