//! Application configuration read from `config.toml`.
//!
//! Lives next to the tile state in the platform config directory
//! (`~/.config/hyperfps/config.toml` on Linux). Every field is optional:
//!
//! ```toml
//! [display]
//! command = ["adb", "shell", "settings"]
//! namespace = "secure"
//! channels = ["miui_refresh_rate", "user_refresh_rate"]
//! read_channel = "user_refresh_rate"
//!
//! [coordinator]
//! apply_timeout_ms = 3000
//! ```

use crate::controller::{MIUI_REFRESH_RATE, SettingsRateController, USER_REFRESH_RATE};
use crate::coordinator::CoordinatorOptions;
use crate::error::ConfigError;
use crate::settings::ShellSettings;

use log::{debug, info};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

const CONFIG_FILE_NAME: &str = "config.toml";

/// Top-level configuration.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AppConfig {
    /// How refresh rates reach the platform.
    #[serde(default)]
    pub display: DisplayConfig,
    /// Toggle coordinator tuning.
    #[serde(default)]
    pub coordinator: CoordinatorConfig,
}

/// Settings for the display rate controller.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DisplayConfig {
    /// Program and leading arguments used to reach the `settings` tool.
    #[serde(default = "default_command")]
    pub command: Vec<String>,
    /// Settings namespace holding the refresh rate keys.
    #[serde(default = "default_namespace")]
    pub namespace: String,
    /// Keys written on every apply, in order.
    #[serde(default = "default_channels")]
    pub channels: Vec<String>,
    /// Key read back as the current rate.
    #[serde(default = "default_read_channel")]
    pub read_channel: String,
}

/// Settings for the toggle coordinator.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CoordinatorConfig {
    /// How long one apply may take before it counts as failed.
    #[serde(default = "default_apply_timeout_ms")]
    pub apply_timeout_ms: u64,
}

fn default_command() -> Vec<String> {
    vec!["settings".to_string()]
}
fn default_namespace() -> String {
    "secure".to_string()
}
fn default_channels() -> Vec<String> {
    vec![MIUI_REFRESH_RATE.to_string(), USER_REFRESH_RATE.to_string()]
}
fn default_read_channel() -> String {
    USER_REFRESH_RATE.to_string()
}
fn default_apply_timeout_ms() -> u64 {
    3000
}

impl Default for DisplayConfig {
    fn default() -> Self {
        Self {
            command: default_command(),
            namespace: default_namespace(),
            channels: default_channels(),
            read_channel: default_read_channel(),
        }
    }
}

impl Default for CoordinatorConfig {
    fn default() -> Self {
        Self {
            apply_timeout_ms: default_apply_timeout_ms(),
        }
    }
}

impl AppConfig {
    /// Load from the platform config directory, falling back to defaults when
    /// the file does not exist.
    pub fn load() -> Result<Self, ConfigError> {
        let path = config_file_path()?;
        Self::load_from(&path)
    }

    /// Load from `path`, falling back to defaults when it does not exist.
    ///
    /// # Errors
    ///
    /// - [`ConfigError::Io`] for read failures other than "not found"
    /// - [`ConfigError::Parse`] if the TOML is malformed
    /// - [`ConfigError::Invalid`] if a value cannot be used
    pub fn load_from(path: &Path) -> Result<Self, ConfigError> {
        let config = match std::fs::read_to_string(path) {
            Ok(content) => {
                let config: AppConfig = toml::from_str(&content)?;
                info!("loaded config from {}", path.display());
                config
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                debug!("no config at {}, using defaults", path.display());
                AppConfig::default()
            }
            Err(source) => {
                return Err(ConfigError::Io {
                    path: path.to_path_buf(),
                    source,
                });
            }
        };

        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if self.display.command.is_empty() {
            return Err(ConfigError::Invalid {
                field: "display.command",
                reason: "must name a program",
            });
        }
        if self.display.channels.is_empty() {
            return Err(ConfigError::Invalid {
                field: "display.channels",
                reason: "must list at least one setting key",
            });
        }
        if self.coordinator.apply_timeout_ms == 0 {
            return Err(ConfigError::Invalid {
                field: "coordinator.apply_timeout_ms",
                reason: "must be greater than zero",
            });
        }
        Ok(())
    }

    /// Build the controller described by `[display]`.
    pub fn rate_controller(&self) -> SettingsRateController<ShellSettings> {
        SettingsRateController::with_channels(
            ShellSettings::new(self.display.command.clone(), self.display.namespace.clone()),
            self.display.channels.clone(),
            self.display.read_channel.clone(),
        )
    }

    /// Coordinator options described by `[coordinator]`.
    pub fn coordinator_options(&self) -> CoordinatorOptions {
        CoordinatorOptions {
            apply_timeout: Duration::from_millis(self.coordinator.apply_timeout_ms),
        }
    }
}

/// Full path of `config.toml`.
pub fn config_file_path() -> Result<PathBuf, ConfigError> {
    let dir = dirs::config_dir().ok_or(ConfigError::NoConfigDir)?;
    Ok(dir.join("hyperfps").join(CONFIG_FILE_NAME))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_missing_file_is_default() {
        let dir = tempfile::tempdir().unwrap();
        let config = AppConfig::load_from(&dir.path().join("config.toml")).unwrap();
        assert_eq!(config, AppConfig::default());
        assert_eq!(
            config.coordinator_options().apply_timeout,
            Duration::from_secs(3)
        );
    }

    #[test]
    fn test_partial_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(
            &path,
            "[display]\ncommand = [\"adb\", \"shell\", \"settings\"]\n",
        )
        .unwrap();

        let config = AppConfig::load_from(&path).unwrap();
        assert_eq!(config.display.command, vec!["adb", "shell", "settings"]);
        assert_eq!(config.display.namespace, "secure");
        assert_eq!(
            config.rate_controller().channels(),
            &[MIUI_REFRESH_RATE.to_string(), USER_REFRESH_RATE.to_string()]
        );
        assert_eq!(config.coordinator.apply_timeout_ms, 3000);
    }

    #[test]
    fn test_rejects_empty_channels() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(&path, "[display]\nchannels = []\n").unwrap();

        assert!(matches!(
            AppConfig::load_from(&path),
            Err(ConfigError::Invalid {
                field: "display.channels",
                ..
            })
        ));
    }

    #[test]
    fn test_rejects_zero_timeout() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(&path, "[coordinator]\napply_timeout_ms = 0\n").unwrap();

        assert!(AppConfig::load_from(&path).is_err());
    }

    #[test]
    fn test_malformed_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(&path, "[display\n").unwrap();

        assert!(matches!(
            AppConfig::load_from(&path),
            Err(ConfigError::Parse(_))
        ));
    }
}
