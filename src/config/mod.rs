//! Configuration management for AgChat
//!
//! Configuration is loaded from:
//! 1. Embedded default_config.toml (compile-time defaults)
//! 2. User config at ~/.config/agchat/config.toml (or platform-specific location),
//!    or an explicit file given on the command line

use crate::error::{ConfigError, ConfigResult};
use crate::launcher::bridge::BridgeMode;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Default configuration embedded in binary
const DEFAULT_CONFIG: &str = include_str!("../../default_config.toml");

/// Main configuration structure
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    #[serde(default)]
    pub cli: CliConfig,
    #[serde(default)]
    pub bridge: BridgeConfig,
    #[serde(default)]
    pub session: SessionConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Agent CLI location and process settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CliConfig {
    #[serde(default = "default_binary")]
    pub binary: String,
    #[serde(default)]
    pub path: Option<String>,
    #[serde(default)]
    pub extra_search_dirs: Vec<String>,
    #[serde(default = "default_true")]
    pub use_pty: bool,
    #[serde(default = "default_cols")]
    pub cols: u16,
    #[serde(default = "default_rows")]
    pub rows: u16,
}

impl Default for CliConfig {
    fn default() -> Self {
        Self {
            binary: default_binary(),
            path: None,
            extra_search_dirs: Vec::new(),
            use_pty: true,
            cols: default_cols(),
            rows: default_rows(),
        }
    }
}

/// Bridge shell settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BridgeConfig {
    #[serde(default)]
    pub mode: BridgeMode,
    #[serde(default = "default_bridge_program")]
    pub program: String,
    #[serde(default = "default_binary")]
    pub cli_path: String,
    #[serde(default = "default_mount_root")]
    pub mount_root: String,
}

impl Default for BridgeConfig {
    fn default() -> Self {
        Self {
            mode: BridgeMode::default(),
            program: default_bridge_program(),
            cli_path: default_binary(),
            mount_root: default_mount_root(),
        }
    }
}

/// Session timing and lifecycle settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionConfig {
    #[serde(default = "default_response_timeout")]
    pub response_timeout_secs: u64,
    #[serde(default = "default_first_response_timeout")]
    pub first_response_timeout_secs: u64,
    #[serde(default = "default_idle_flush")]
    pub idle_flush_ms: u64,
    #[serde(default = "default_true")]
    pub resume_previous: bool,
    #[serde(default = "default_max_sessions")]
    pub max_sessions: usize,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            response_timeout_secs: default_response_timeout(),
            first_response_timeout_secs: default_first_response_timeout(),
            idle_flush_ms: default_idle_flush(),
            resume_previous: true,
            max_sessions: default_max_sessions(),
        }
    }
}

impl SessionConfig {
    pub fn response_timeout(&self) -> Duration {
        Duration::from_secs(self.response_timeout_secs)
    }

    pub fn first_response_timeout(&self) -> Duration {
        Duration::from_secs(self.first_response_timeout_secs)
    }

    pub fn idle_flush(&self) -> Duration {
        Duration::from_millis(self.idle_flush_ms)
    }
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    #[serde(default = "default_log_level")]
    pub level: String,
    #[serde(default = "default_log_format")]
    pub format: String,
    #[serde(default = "default_true")]
    pub timestamps: bool,
    #[serde(default)]
    pub file_output: bool,
    #[serde(default)]
    pub file_path: Option<PathBuf>,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            format: default_log_format(),
            timestamps: true,
            file_output: false,
            file_path: None,
        }
    }
}

// Default value functions
fn default_true() -> bool {
    true
}
fn default_binary() -> String {
    "kiro-cli".to_string()
}
fn default_cols() -> u16 {
    120
}
fn default_rows() -> u16 {
    40
}
fn default_bridge_program() -> String {
    "wsl".to_string()
}
fn default_mount_root() -> String {
    "/mnt".to_string()
}
fn default_response_timeout() -> u64 {
    60
}
fn default_first_response_timeout() -> u64 {
    120
}
fn default_idle_flush() -> u64 {
    2000
}
fn default_max_sessions() -> usize {
    16
}
fn default_log_level() -> String {
    "info".to_string()
}
fn default_log_format() -> String {
    "pretty".to_string()
}

impl AppConfig {
    /// Load configuration from default locations
    ///
    /// The user config replaces the embedded defaults section by section;
    /// keys missing from a section take their default values. A broken user
    /// config is logged and ignored.
    pub fn load() -> ConfigResult<Self> {
        let mut config = Self::default();

        if let Some(user_config_path) = Self::user_config_path() {
            if user_config_path.exists() {
                match Self::load_from_file(&user_config_path) {
                    Ok(user_config) => {
                        config = user_config;
                        tracing::info!("Loaded user config from {:?}", user_config_path);
                    }
                    Err(e) => {
                        tracing::warn!("Failed to load user config: {}", e);
                    }
                }
            }
        }

        Ok(config)
    }

    /// Load configuration from a specific file
    pub fn load_from_file(path: &Path) -> ConfigResult<Self> {
        if !path.exists() {
            return Err(ConfigError::FileNotFound {
                path: path.to_path_buf(),
            });
        }

        let contents =
            std::fs::read_to_string(path).map_err(|e| ConfigError::IoError(e.to_string()))?;

        toml::from_str(&contents).map_err(|e| {
            ConfigError::ParseError(format!("Failed to parse {}: {}", path.display(), e))
        })
    }

    /// Get the user config path (~/.config/agchat/config.toml)
    pub fn user_config_path() -> Option<PathBuf> {
        dirs::config_dir().map(|config_dir| config_dir.join("agchat").join("config.toml"))
    }

    /// Explicit CLI path with `~` expanded
    pub fn cli_path_override(&self) -> Option<String> {
        self.cli
            .path
            .as_deref()
            .map(str::trim)
            .filter(|path| !path.is_empty())
            .map(|path| shellexpand::tilde(path).into_owned())
    }

    /// Log directory with `~` expanded
    pub fn log_dir(&self) -> Option<PathBuf> {
        self.logging
            .file_path
            .as_ref()
            .map(|path| PathBuf::from(shellexpand::tilde(&path.to_string_lossy()).as_ref()))
    }

    /// Save configuration to a file
    pub fn save_to(&self, path: &Path) -> ConfigResult<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| ConfigError::IoError(e.to_string()))?;
        }

        let toml_string =
            toml::to_string_pretty(self).map_err(|e| ConfigError::SerializeError(e.to_string()))?;

        std::fs::write(path, toml_string).map_err(|e| ConfigError::IoError(e.to_string()))
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        toml::from_str(DEFAULT_CONFIG).unwrap_or_else(|_| Self {
            cli: CliConfig::default(),
            bridge: BridgeConfig::default(),
            session: SessionConfig::default(),
            logging: LoggingConfig::default(),
        })
    }
}
