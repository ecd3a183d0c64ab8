//! TOML-based configuration for the xkbmirror client.
//!
//! Reads `AppConfig` from `$XDG_CONFIG_HOME/xkbmirror/config.toml`
//! (falling back to `~/.config/xkbmirror/config.toml`).  A missing file is
//! not an error: every field has a default, so the program runs unconfigured.
//!
//! ```toml
//! [server]
//! display = ":1"
//!
//! [session]
//! exit_keycode = 9
//! log_level = "debug"
//! ```

use std::path::PathBuf;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Error type for configuration file operations.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// The platform config directory could not be determined.
    #[error("could not determine platform config directory")]
    NoPlatformConfigDir,

    /// A file system I/O error occurred.
    #[error("I/O error accessing config at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The TOML content could not be parsed.
    #[error("failed to parse config TOML: {0}")]
    Parse(#[from] toml::de::Error),
}

// ── Config schema types ───────────────────────────────────────────────────────

/// Top-level application configuration.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
pub struct AppConfig {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub session: SessionConfig,
}

/// Which server to connect to.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
pub struct ServerConfig {
    /// Display name to connect to.  `None` uses the `DISPLAY` environment
    /// variable, like every other X client.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub display: Option<String>,
}

/// Session behaviour settings.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SessionConfig {
    /// Key code that ends the session.  Defaults to 9, the escape key on
    /// X11 servers.
    #[serde(default = "default_exit_keycode")]
    pub exit_keycode: u32,
    /// `tracing` log level: `"error"`, `"warn"`, `"info"`, `"debug"`, `"trace"`.
    #[serde(default = "default_log_level")]
    pub log_level: String,
}

fn default_exit_keycode() -> u32 {
    9
}
fn default_log_level() -> String {
    "info".to_string()
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            exit_keycode: default_exit_keycode(),
            log_level: default_log_level(),
        }
    }
}

// ── Config loading ────────────────────────────────────────────────────────────

/// Resolves the full path to the config file.
///
/// # Errors
///
/// Returns [`ConfigError::NoPlatformConfigDir`] if neither `XDG_CONFIG_HOME`
/// nor `HOME` is set.
pub fn config_file_path() -> Result<PathBuf, ConfigError> {
    let base = std::env::var_os("XDG_CONFIG_HOME")
        .map(PathBuf::from)
        .or_else(|| std::env::var_os("HOME").map(|h| PathBuf::from(h).join(".config")))
        .ok_or(ConfigError::NoPlatformConfigDir)?;
    Ok(base.join("xkbmirror").join("config.toml"))
}

/// Loads `AppConfig` from disk, returning `AppConfig::default()` if the file
/// does not yet exist.
///
/// # Errors
///
/// Returns [`ConfigError::Io`] for file-system errors other than "not
/// found", and [`ConfigError::Parse`] if the TOML is malformed.
pub fn load_config() -> Result<AppConfig, ConfigError> {
    let path = config_file_path()?;

    match std::fs::read_to_string(&path) {
        Ok(content) => {
            let cfg: AppConfig = toml::from_str(&content)?;
            Ok(cfg)
        }
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(AppConfig::default()),
        Err(e) => Err(ConfigError::Io { path, source: e }),
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
