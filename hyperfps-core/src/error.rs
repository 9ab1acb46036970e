//! Error types for the refresh-rate toggle.

use std::path::PathBuf;

/// Failure reported by a [`RateController`](crate::RateController) when a
/// refresh rate could not be applied.
///
/// The coordinator treats every variant as a full failure. The variant is kept
/// for logging and so the UI can explain how to grant the missing permission.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RateError {
    /// The process is not allowed to write system settings.
    #[error("Permission denied writing {channel} (grant WRITE_SECURE_SETTINGS)")]
    PermissionDenied {
        /// The channel that rejected the write.
        channel: String,
    },

    /// The platform rejected the value or does not know the setting.
    #[error("Refresh rate {rate} not supported by {channel}")]
    Unsupported {
        /// The channel that rejected the write.
        channel: String,
        /// The rate that was rejected.
        rate: u32,
    },

    /// Any other platform fault.
    #[error("Failed to apply refresh rate: {0}")]
    Unknown(String),
}

/// Errors from the persisted tile settings.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// The platform config directory could not be determined.
    #[error("Could not determine the platform config directory")]
    NoConfigDir,

    /// Reading or writing the settings file failed.
    #[error("IO error on {path}: {source}")]
    Io {
        /// The file or directory being accessed.
        path: PathBuf,
        /// The underlying error.
        #[source]
        source: std::io::Error,
    },

    /// The settings file is not valid TOML for this schema.
    #[error("Failed to parse settings: {0}")]
    Parse(#[from] toml::de::Error),

    /// The settings could not be serialized.
    #[error("Failed to serialize settings: {0}")]
    Serialize(#[from] toml::ser::Error),
}

/// Errors loading `config.toml`.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// The platform config directory could not be determined.
    #[error("Could not determine the platform config directory")]
    NoConfigDir,

    /// Reading the file failed for a reason other than it not existing.
    #[error("IO error reading {path}: {source}")]
    Io {
        /// The config file path.
        path: PathBuf,
        /// The underlying error.
        #[source]
        source: std::io::Error,
    },

    /// The file is not valid TOML for this schema.
    #[error("Failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),

    /// A field has a value the application cannot use.
    #[error("Invalid config value for {field}: {reason}")]
    Invalid {
        /// The offending field.
        field: &'static str,
        /// What is wrong with it.
        reason: &'static str,
    },
}

/// User text that is not a positive integer refresh rate.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ParseRateError {
    /// Nothing was entered.
    #[error("Enter a refresh rate")]
    Empty,

    /// The text is not a whole number.
    #[error("'{0}' is not a valid refresh rate")]
    NotANumber(String),

    /// Zero or negative.
    #[error("Refresh rate must be greater than zero")]
    NotPositive,
}

/// Errors returned by [`ToggleCoordinator`](crate::ToggleCoordinator) requests.
#[derive(Debug, thiserror::Error)]
pub enum ToggleError {
    /// The display subsystem refused the new rate.
    #[error(transparent)]
    Rate(#[from] RateError),

    /// Another apply is still in flight; this request was dropped.
    #[error("A refresh rate change is already in progress")]
    Busy,

    /// The rate was applied but the new toggle state could not be saved.
    #[error("Failed to save toggle state: {0}")]
    Store(#[from] StoreError),

    /// The coordinator has shut down.
    #[error("Coordinator is not running")]
    Stopped,
}

impl ToggleError {
    /// Whether this failure means the app needs the settings-write permission.
    pub fn is_permission_denied(&self) -> bool {
        matches!(self, ToggleError::Rate(RateError::PermissionDenied { .. }))
    }
}
