//! Access to the platform's integer system settings.

use crate::error::RateError;

use log::{debug, trace, warn};
use std::process::{Command, Output};

/// The raw key/value primitive behind the refresh rate channels.
///
/// Implementations may talk to the OS directly, shell out, or forward to a
/// privileged helper.
pub trait SettingsBackend: Send + Sync {
    /// Write `value` to `key`.
    fn put_int(&self, key: &str, value: u32) -> Result<(), RateError>;

    /// Read `key`. `Ok(None)` means the setting has never been written or is
    /// not an integer.
    fn get_int(&self, key: &str) -> Result<Option<u32>, RateError>;
}

/// Drives the Android `settings` command line tool.
///
/// By default this runs `settings put secure <key> <value>` on the device
/// itself, which needs `WRITE_SECURE_SETTINGS`. With a prefix such as
/// `["adb", "shell", "settings"]` the same commands go through adb from a
/// connected host.
#[derive(Debug, Clone)]
pub struct ShellSettings {
    command: Vec<String>,
    namespace: String,
}

impl ShellSettings {
    /// `command` is the program followed by any leading arguments.
    pub fn new(command: Vec<String>, namespace: impl Into<String>) -> Self {
        Self {
            command,
            namespace: namespace.into(),
        }
    }

    fn run(&self, args: &[&str]) -> Result<Output, RateError> {
        let (program, prefix) = self
            .command
            .split_first()
            .ok_or_else(|| RateError::Unknown("no settings command configured".to_string()))?;

        trace!("running {} {:?} {:?}", program, prefix, args);
        Command::new(program)
            .args(prefix)
            .args(args)
            .output()
            .map_err(|e| RateError::Unknown(format!("failed to run {}: {}", program, e)))
    }
}

impl Default for ShellSettings {
    fn default() -> Self {
        Self::new(vec!["settings".to_string()], "secure")
    }
}

impl SettingsBackend for ShellSettings {
    fn put_int(&self, key: &str, value: u32) -> Result<(), RateError> {
        let value_arg = value.to_string();
        let output = self.run(&["put", &self.namespace, key, &value_arg])?;
        let stdout = String::from_utf8_lossy(&output.stdout);
        let stderr = String::from_utf8_lossy(&output.stderr);

        // `settings` reports some failures on stdout with a zero exit code.
        if let Some(err) = classify_failure(key, value, &stdout, &stderr) {
            warn!("settings put {} {} failed: {}", key, value, err);
            return Err(err);
        }
        if !output.status.success() {
            return Err(RateError::Unknown(format!(
                "settings put {} exited with {}: {}",
                key,
                output.status,
                stderr.trim()
            )));
        }

        debug!("settings put {} {}", key, value);
        Ok(())
    }

    fn get_int(&self, key: &str) -> Result<Option<u32>, RateError> {
        let output = self.run(&["get", &self.namespace, key])?;
        let stdout = String::from_utf8_lossy(&output.stdout);
        let stderr = String::from_utf8_lossy(&output.stderr);

        if let Some(err) = classify_failure(key, 0, &stdout, &stderr) {
            return Err(err);
        }
        if !output.status.success() {
            return Err(RateError::Unknown(format!(
                "settings get {} exited with {}: {}",
                key,
                output.status,
                stderr.trim()
            )));
        }

        Ok(parse_setting_value(&stdout))
    }
}

/// Maps `settings` tool output to a failure, if it describes one.
fn classify_failure(key: &str, value: u32, stdout: &str, stderr: &str) -> Option<RateError> {
    let text = format!("{}\n{}", stdout, stderr);

    if text.contains("SecurityException") || text.contains("Permission denial") {
        Some(RateError::PermissionDenied {
            channel: key.to_string(),
        })
    } else if text.contains("IllegalArgumentException")
        || text.contains("Invalid namespace")
        || text.contains("Unknown setting")
    {
        Some(RateError::Unsupported {
            channel: key.to_string(),
            rate: value,
        })
    } else if text.contains("Exception") {
        Some(RateError::Unknown(text.trim().to_string()))
    } else {
        None
    }
}

/// `settings get` prints `null` for keys that were never written.
fn parse_setting_value(stdout: &str) -> Option<u32> {
    let value = stdout.trim();
    if value == "null" {
        return None;
    }
    value.parse().ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_classify_permission_denial() {
        let stderr = "Exception occurred while executing 'put':\n\
                      java.lang.SecurityException: Permission denial: writing to settings requires:android.permission.WRITE_SECURE_SETTINGS";
        assert_eq!(
            classify_failure("user_refresh_rate", 120, "", stderr),
            Some(RateError::PermissionDenied {
                channel: "user_refresh_rate".to_string()
            })
        );
    }

    #[test]
    fn test_classify_unsupported() {
        let stdout = "java.lang.IllegalArgumentException: Invalid namespace";
        assert_eq!(
            classify_failure("miui_refresh_rate", 90, stdout, ""),
            Some(RateError::Unsupported {
                channel: "miui_refresh_rate".to_string(),
                rate: 90
            })
        );
    }

    #[test]
    fn test_classify_other_exception() {
        let err = classify_failure("k", 1, "", "java.lang.NullPointerException").unwrap();
        assert!(matches!(err, RateError::Unknown(_)));
    }

    #[test]
    fn test_classify_clean_output() {
        assert_eq!(classify_failure("k", 60, "", ""), None);
    }

    #[test]
    fn test_parse_setting_value() {
        assert_eq!(parse_setting_value("120\n"), Some(120));
        assert_eq!(parse_setting_value("null\n"), None);
        assert_eq!(parse_setting_value(""), None);
        assert_eq!(parse_setting_value("abc"), None);
    }

    #[test]
    fn test_missing_program_is_unknown_failure() {
        let settings = ShellSettings::new(vec!["hyperfps-no-such-binary".to_string()], "secure");
        assert!(matches!(
            settings.put_int("user_refresh_rate", 60),
            Err(RateError::Unknown(_))
        ));
    }

    #[test]
    fn test_empty_command_is_unknown_failure() {
        let settings = ShellSettings::new(Vec::new(), "secure");
        assert!(matches!(
            settings.get_int("user_refresh_rate"),
            Err(RateError::Unknown(_))
        ));
    }
}
