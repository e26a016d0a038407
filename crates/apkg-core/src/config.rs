//! Application configuration
//!
//! Configuration is loaded from:
//! 1. Default values
//! 2. Config file (~/.config/apkg-export/config.toml)
//! 3. Environment variables (APKG_* prefix)
//!
//! Environment variables take precedence over config file values.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::export::ExportOptions;

/// Environment variable prefix
const ENV_PREFIX: &str = "APKG";

/// Seconds an upload stays available before it is swept
const DEFAULT_UPLOAD_TTL_SECS: u64 = 30;

/// Application configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    /// Extract archives here instead of a fresh temporary directory
    #[serde(default)]
    pub extract_dir: Option<PathBuf>,

    /// Log file used when APKG_LOG is set (stderr otherwise)
    #[serde(default)]
    pub log_file: Option<PathBuf>,

    /// Default export options
    #[serde(default)]
    pub export: ExportOptions,

    /// Upload server settings
    #[serde(default)]
    pub server: ServerConfig,
}

/// Upload/download server settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Address to listen on
    pub bind: String,
    /// Directory uploaded archives and rendered workbooks are written to
    pub upload_dir: PathBuf,
    /// How long an upload is kept
    pub upload_ttl_secs: u64,
    /// How often expired uploads are swept
    pub sweep_interval_secs: u64,
    /// Largest accepted request body
    pub max_upload_bytes: usize,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: "127.0.0.1:9000".to_string(),
            upload_dir: default_upload_dir(),
            upload_ttl_secs: DEFAULT_UPLOAD_TTL_SECS,
            sweep_interval_secs: 5,
            max_upload_bytes: 256 * 1024 * 1024,
        }
    }
}

impl Config {
    /// Load configuration from default location and environment
    ///
    /// Order of precedence (highest to lowest):
    /// 1. Environment variables (APKG_EXTRACT_DIR, APKG_BIND, APKG_UPLOAD_DIR, ...)
    /// 2. Config file (~/.config/apkg-export/config.toml or APKG_CONFIG)
    /// 3. Default values
    pub fn load() -> Result<Self> {
        Self::load_from_path(&Self::config_file_path())
    }

    /// Load configuration, using `path` instead of the default file if given
    pub fn load_with_cli_override(path: Option<&PathBuf>) -> Result<Self> {
        match path {
            Some(p) => Self::load_from_path(p),
            None => Self::load(),
        }
    }

    /// Load configuration from a specific path
    ///
    /// Environment variables are still applied as overrides.
    /// If the file doesn't exist, defaults are used.
    pub fn load_from_path(path: &Path) -> Result<Self> {
        let mut config = if path.exists() {
            let content = std::fs::read_to_string(path)
                .with_context(|| format!("Failed to read config file: {:?}", path))?;
            toml::from_str(&content)
                .with_context(|| format!("Failed to parse config file: {:?}", path))?
        } else {
            Self::default()
        };

        config.apply_env_overrides();
        Ok(config)
    }

    /// Load configuration from a TOML string (useful for testing)
    pub fn load_from_str(toml_content: &str) -> Result<Self> {
        let mut config: Config =
            toml::from_str(toml_content).context("Failed to parse config TOML")?;
        config.apply_env_overrides();
        Ok(config)
    }

    /// Apply environment variable overrides
    fn apply_env_overrides(&mut self) {
        // APKG_EXTRACT_DIR
        if let Ok(val) = std::env::var(format!("{}_EXTRACT_DIR", ENV_PREFIX)) {
            self.extract_dir = if val.is_empty() {
                None
            } else {
                Some(PathBuf::from(val))
            };
        }

        // APKG_LOG_FILE
        if let Ok(val) = std::env::var(format!("{}_LOG_FILE", ENV_PREFIX)) {
            self.log_file = if val.is_empty() {
                None
            } else {
                Some(PathBuf::from(val))
            };
        }

        // APKG_BIND
        if let Ok(val) = std::env::var(format!("{}_BIND", ENV_PREFIX)) {
            if !val.is_empty() {
                self.server.bind = val;
            }
        }

        // APKG_UPLOAD_DIR
        if let Ok(val) = std::env::var(format!("{}_UPLOAD_DIR", ENV_PREFIX)) {
            if !val.is_empty() {
                self.server.upload_dir = PathBuf::from(val);
            }
        }

        // APKG_UPLOAD_TTL_SECS (ignored if not a number)
        if let Ok(val) = std::env::var(format!("{}_UPLOAD_TTL_SECS", ENV_PREFIX)) {
            if let Ok(secs) = val.parse() {
                self.server.upload_ttl_secs = secs;
            }
        }
    }

    /// Save configuration to the default file
    pub fn save(&self) -> Result<()> {
        self.save_to_path(&Self::config_file_path())
    }

    /// Save configuration to a specific file
    pub fn save_to_path(&self, config_path: &Path) -> Result<()> {
        if let Some(parent) = config_path.parent() {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create config directory: {:?}", parent))?;
        }

        let content = toml::to_string_pretty(self).context("Failed to serialize config")?;
        std::fs::write(config_path, content)
            .with_context(|| format!("Failed to write config file: {:?}", config_path))?;
        Ok(())
    }

    /// Get the config file path
    ///
    /// Can be overridden with APKG_CONFIG environment variable
    pub fn config_file_path() -> PathBuf {
        if let Ok(path) = std::env::var(format!("{}_CONFIG", ENV_PREFIX)) {
            return PathBuf::from(path);
        }

        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("apkg-export")
            .join("config.toml")
    }
}

/// Get the default upload directory
fn default_upload_dir() -> PathBuf {
    dirs::cache_dir()
        .unwrap_or_else(std::env::temp_dir)
        .join("apkg-export")
        .join("uploads")
}
