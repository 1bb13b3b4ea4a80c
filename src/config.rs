//! Configuration loading.
//!
//! Reads `config.json` from the configuration directory and applies
//! environment overrides on top. Every field has a default, so a missing
//! file is not an error.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::{fs, path::PathBuf};

/// Default GPM control socket.
pub const DEFAULT_GPM_SOCKET: &str = "/dev/gpmctl";

/// Default console device used for pointer drawing.
pub const DEFAULT_CONSOLE_DEVICE: &str = "/dev/tty0";

/// Configuration for the bridge.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
#[serde(default)]
pub struct Config {
    /// Path of the GPM daemon's control socket.
    pub gpm_socket: PathBuf,
    /// Console device opened for pointer drawing.
    pub console_device: PathBuf,
    /// Whether to try connecting to the mouse server at all.
    pub mouse_enabled: bool,
    /// Log file; a file in the temp directory when unset.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub log_file: Option<PathBuf>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            gpm_socket: PathBuf::from(DEFAULT_GPM_SOCKET),
            console_device: PathBuf::from(DEFAULT_CONSOLE_DEVICE),
            mouse_enabled: true,
            log_file: None,
        }
    }
}

impl Config {
    /// Returns the configuration directory path.
    ///
    /// Directory selection priority:
    /// 1. `MOUSEBRIDGE_CONFIG_DIR` env var: explicit override
    /// 2. Default: platform config dir joined with `mousebridge`
    pub fn config_dir() -> Result<PathBuf> {
        if let Ok(dir) = std::env::var("MOUSEBRIDGE_CONFIG_DIR") {
            return Ok(PathBuf::from(dir));
        }
        Ok(dirs::config_dir()
            .context("Could not determine config directory")?
            .join("mousebridge"))
    }

    /// Loads configuration from file, with environment variable overrides.
    pub fn load() -> Result<Self> {
        let mut config = Self::load_from_file()?;
        config.apply_env_overrides();
        Ok(config)
    }

    fn load_from_file() -> Result<Self> {
        let config_path = Self::config_dir()?.join("config.json");
        if !config_path.exists() {
            return Ok(Self::default());
        }
        let content = fs::read_to_string(&config_path)
            .with_context(|| format!("Failed to read {}", config_path.display()))?;
        serde_json::from_str(&content)
            .with_context(|| format!("Invalid config file {}", config_path.display()))
    }

    fn apply_env_overrides(&mut self) {
        if let Ok(socket) = std::env::var("MOUSEBRIDGE_GPM_SOCKET") {
            self.gpm_socket = PathBuf::from(socket);
        }
        if let Ok(console) = std::env::var("MOUSEBRIDGE_CONSOLE") {
            self.console_device = PathBuf::from(console);
        }
        if std::env::var("MOUSEBRIDGE_NO_MOUSE").is_ok_and(|v| !v.is_empty()) {
            self.mouse_enabled = false;
        }
        if let Ok(log_file) = std::env::var("MOUSEBRIDGE_LOG_FILE") {
            self.log_file = Some(PathBuf::from(log_file));
        }
    }

    /// Log file to use, falling back to `<tmp>/mousebridge.log`.
    pub fn log_path(&self) -> PathBuf {
        self.log_file
            .clone()
            .unwrap_or_else(|| std::env::temp_dir().join("mousebridge.log"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = Config::default();
        assert_eq!(config.gpm_socket, PathBuf::from("/dev/gpmctl"));
        assert_eq!(config.console_device, PathBuf::from("/dev/tty0"));
        assert!(config.mouse_enabled);
        assert!(config.log_file.is_none());
        assert!(config.log_path().ends_with("mousebridge.log"));
    }

    #[test]
    fn test_partial_file_keeps_other_defaults() {
        let config: Config =
            serde_json::from_str(r#"{ "mouse_enabled": false }"#).expect("parse");
        assert!(!config.mouse_enabled);
        assert_eq!(config.gpm_socket, PathBuf::from(DEFAULT_GPM_SOCKET));
    }

    #[test]
    fn test_serialization_roundtrip() {
        let config = Config {
            gpm_socket: PathBuf::from("/run/gpm.sock"),
            log_file: Some(PathBuf::from("/var/log/mb.log")),
            ..Config::default()
        };
        let json = serde_json::to_string(&config).expect("serialize");
        let back: Config = serde_json::from_str(&json).expect("deserialize");
        assert_eq!(config, back);
    }

    #[test]
    fn test_unset_log_file_not_serialized() {
        let json = serde_json::to_string(&Config::default()).expect("serialize");
        assert!(!json.contains("log_file"));
    }

    #[test]
    fn test_explicit_log_file_wins() {
        let config = Config {
            log_file: Some(PathBuf::from("/tmp/custom.log")),
            ..Config::default()
        };
        assert_eq!(config.log_path(), PathBuf::from("/tmp/custom.log"));
    }
}
