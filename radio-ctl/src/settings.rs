//! Tool settings

use std::path::PathBuf;
use std::time::Duration;

use radio_detect::paths::DEFAULT_CONFIG_DIR;
use radio_detect::{RadioPaths, SikConfig};
use serde::{Deserialize, Serialize};

/// Settings stored in `settings.json`
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Settings {
    /// Directory holding the persisted radio state
    pub data_dir: PathBuf,
    /// Keep every TX capable interface active
    #[serde(default = "default_true")]
    pub auto_tx: bool,
    /// Deadline for `OK` after the escape sequence, in milliseconds
    #[serde(default = "default_command_mode_timeout")]
    pub sik_command_mode_timeout_ms: u64,
    /// Deadline for each SiK command response, in milliseconds
    #[serde(default = "default_response_timeout")]
    pub sik_response_timeout_ms: u64,
}

fn default_true() -> bool {
    true
}

fn default_command_mode_timeout() -> u64 {
    3000
}

fn default_response_timeout() -> u64 {
    2000
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::from(DEFAULT_CONFIG_DIR),
            auto_tx: true,
            sik_command_mode_timeout_ms: default_command_mode_timeout(),
            sik_response_timeout_ms: default_response_timeout(),
        }
    }
}

impl Settings {
    /// Uses $XDG_CONFIG_HOME/radioctl, falls back to ~/.config/radioctl
    fn config_dir() -> Option<PathBuf> {
        if let Ok(xdg_config) = std::env::var("XDG_CONFIG_HOME") {
            let path = PathBuf::from(xdg_config);
            if path.is_absolute() {
                return Some(path.join("radioctl"));
            }
        }
        dirs::home_dir().map(|h| h.join(".config").join("radioctl"))
    }

    pub fn settings_path() -> Option<PathBuf> {
        Self::config_dir().map(|p| p.join("settings.json"))
    }

    /// Load settings from disk, defaults when missing or unreadable
    pub fn load() -> Self {
        Self::settings_path()
            .and_then(|path| std::fs::read_to_string(path).ok())
            .map(|s| Self::from_json(&s))
            .unwrap_or_default()
    }

    fn from_json(text: &str) -> Self {
        serde_json::from_str(text).unwrap_or_else(|e| {
            tracing::warn!("Ignoring unreadable settings: {}", e);
            Self::default()
        })
    }

    pub fn paths(&self) -> RadioPaths {
        RadioPaths::new(&self.data_dir)
    }

    pub fn sik_config(&self) -> SikConfig {
        SikConfig {
            command_mode_timeout: Duration::from_millis(self.sik_command_mode_timeout_ms),
            response_timeout: Duration::from_millis(self.sik_response_timeout_ms),
            ..SikConfig::default()
        }
    }
}
