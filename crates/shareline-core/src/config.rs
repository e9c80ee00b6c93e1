//! Configuration system for Shareline
//!
//! Supports TOML configuration files with sensible defaults.
//! Configuration is loaded from:
//! - macOS: ~/Library/Application Support/shareline/config.toml
//! - Linux: ~/.config/shareline/config.toml
//! - Windows: %APPDATA%/shareline/config.toml

use std::io;
use std::path::{Path, PathBuf};
use std::time::Duration;

use directories::ProjectDirs;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::error::ConfigError;

/// Main configuration structure
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Session settings handed to the transport on connect
    pub connection: ConnectionConfig,
    /// Local directory transport settings
    pub local: LocalConfig,
}

/// Per-connection configuration. Immutable once a connection is built.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ConnectionConfig {
    /// Connection timeout in seconds
    pub connect_timeout_secs: u64,
    /// Request timeout in seconds
    pub request_timeout_secs: u64,
    /// Read/write buffer size in bytes
    pub buffer_size: usize,
    /// Refuse sessions that cannot be signed
    pub signing_required: bool,
    /// Defer connecting until the share handle is first needed
    pub delayed_initialization: bool,
}

impl Default for ConnectionConfig {
    fn default() -> Self {
        Self {
            connect_timeout_secs: 10,
            request_timeout_secs: 30,
            buffer_size: 1024 * 1024, // 1MB
            signing_required: false,
            delayed_initialization: false,
        }
    }
}

impl ConnectionConfig {
    pub fn connect_timeout(&self) -> Duration {
        Duration::from_secs(self.connect_timeout_secs)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }
}

/// Local directory transport configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct LocalConfig {
    /// Directory whose subdirectories are served as shares
    pub root: Option<PathBuf>,
}

impl Config {
    /// The file at [`Config::default_path`], or defaults when it is missing
    /// or unreadable
    pub fn load() -> Self {
        let Some(path) = Self::default_path() else {
            debug!("No config directory, using defaults");
            return Self::default();
        };
        Self::load_from(&path).unwrap_or_else(|e| {
            warn!("Ignoring config at {}: {}", path.display(), e);
            Self::default()
        })
    }

    /// Parse `path`; a missing file yields the defaults
    pub fn load_from(path: &Path) -> Result<Self, ConfigError> {
        let content = match std::fs::read_to_string(path) {
            Ok(content) => content,
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                debug!("No config at {}", path.display());
                return Ok(Self::default());
            }
            Err(e) => return Err(ConfigError::Io(e.to_string())),
        };
        let config = toml::from_str(&content).map_err(|e| ConfigError::Parse(e.to_string()))?;
        info!("Loaded config from {}", path.display());
        Ok(config)
    }

    /// Write to `path`, creating its directory
    pub fn save_to(&self, path: &Path) -> Result<(), ConfigError> {
        let content = self.to_toml()?;
        if let Some(dir) = path.parent() {
            std::fs::create_dir_all(dir).map_err(|e| ConfigError::Io(e.to_string()))?;
        }
        std::fs::write(path, content).map_err(|e| ConfigError::Io(e.to_string()))
    }

    pub fn to_toml(&self) -> Result<String, ConfigError> {
        toml::to_string_pretty(self).map_err(|e| ConfigError::Serialize(e.to_string()))
    }

    /// `config.toml` in the per-user configuration directory
    pub fn default_path() -> Option<PathBuf> {
        ProjectDirs::from("com", "shareline", "shareline")
            .map(|dirs| dirs.config_dir().join("config.toml"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.connection.connect_timeout_secs, 10);
        assert_eq!(config.connection.request_timeout(), Duration::from_secs(30));
        assert!(!config.connection.delayed_initialization);
        assert!(config.local.root.is_none());
    }

    #[test]
    fn test_partial_config() {
        let toml_str = r#"
            [connection]
            delayed_initialization = true
        "#;
        let config: Config = toml::from_str(toml_str).unwrap();
        assert!(config.connection.delayed_initialization);
        // Other values should be defaults
        assert_eq!(config.connection.buffer_size, 1024 * 1024);
    }

    #[test]
    fn test_defaults_render_every_section() {
        let rendered = Config::default().to_toml().unwrap();
        assert!(rendered.contains("[connection]"));
        assert!(rendered.contains("connect_timeout_secs"));
    }

    #[test]
    fn test_config_load_missing() {
        let config = Config::load_from(Path::new("/nonexistent/config.toml")).unwrap();
        assert_eq!(config.connection.connect_timeout_secs, 10);
    }

    #[test]
    fn test_config_save_and_load() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("config.toml");

        let mut config = Config::default();
        config.local.root = Some(PathBuf::from("/srv/shares"));
        config.connection.signing_required = true;
        config.save_to(&path).unwrap();

        let loaded = Config::load_from(&path).unwrap();
        assert_eq!(loaded.local.root, Some(PathBuf::from("/srv/shares")));
        assert!(loaded.connection.signing_required);
    }

    #[test]
    fn test_config_parse_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(&path, "[connection\nbroken").unwrap();
        assert!(matches!(Config::load_from(&path), Err(ConfigError::Parse(_))));
    }
}
