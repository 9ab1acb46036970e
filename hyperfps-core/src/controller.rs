//! Display refresh rate controller.

use crate::error::RateError;
use crate::rate::RefreshRate;
use crate::settings::SettingsBackend;

use log::{debug, error, info, warn};

/// Vendor-specific refresh rate setting.
pub const MIUI_REFRESH_RATE: &str = "miui_refresh_rate";
/// Generic refresh rate setting.
pub const USER_REFRESH_RATE: &str = "user_refresh_rate";

// =============================================================================
// Rate Controller Trait
// =============================================================================

/// Trait for refresh rate controller implementations.
///
/// This allows for mock implementations in tests.
pub trait RateController: Send + Sync {
    /// Apply `rate` to every channel the platform exposes.
    ///
    /// Succeeds only if all channels accepted the write. Nothing is retried.
    fn apply(&self, rate: RefreshRate) -> Result<(), RateError>;

    /// Read the rate from the canonical channel.
    ///
    /// `None` when the setting was never written or cannot be read on this
    /// device. This is not an error.
    fn current_rate(&self) -> Option<RefreshRate>;
}

// =============================================================================
// SettingsRateController
// =============================================================================

/// A [`RateController`] that writes integer system settings.
///
/// Every channel is written, in order, even after one rejects the rate. The
/// apply fails with the first rejection; channels that took the rate keep it.
///
/// # Example
///
/// ```
/// use hyperfps_core::{MemorySettings, RateController, RefreshRate, SettingsRateController};
///
/// let controller = SettingsRateController::new(MemorySettings::new());
/// assert_eq!(controller.current_rate(), None);
///
/// controller.apply(RefreshRate::new(90).unwrap()).unwrap();
/// assert_eq!(controller.current_rate(), RefreshRate::new(90));
/// ```
pub struct SettingsRateController<B> {
    backend: B,
    channels: Vec<String>,
    read_channel: String,
}

impl<B: SettingsBackend> SettingsRateController<B> {
    /// Controller using the two standard channels.
    pub fn new(backend: B) -> Self {
        Self::with_channels(
            backend,
            vec![MIUI_REFRESH_RATE.to_string(), USER_REFRESH_RATE.to_string()],
            USER_REFRESH_RATE.to_string(),
        )
    }

    /// Controller writing `channels` and reading `read_channel`.
    pub fn with_channels(backend: B, channels: Vec<String>, read_channel: String) -> Self {
        Self {
            backend,
            channels,
            read_channel,
        }
    }

    /// Channels written by [`RateController::apply`], in order.
    pub fn channels(&self) -> &[String] {
        &self.channels
    }

    /// The underlying settings backend.
    pub fn backend(&self) -> &B {
        &self.backend
    }

    /// Read one specific channel, for diagnostics.
    pub fn channel_rate(&self, channel: &str) -> Option<RefreshRate> {
        match self.backend.get_int(channel) {
            Ok(value) => value.and_then(RefreshRate::new),
            Err(e) => {
                warn!("reading {} failed: {}", channel, e);
                None
            }
        }
    }
}

impl<B: SettingsBackend> RateController for SettingsRateController<B> {
    fn apply(&self, rate: RefreshRate) -> Result<(), RateError> {
        if self.channels.is_empty() {
            return Err(RateError::Unknown("no refresh rate channels configured".to_string()));
        }

        let mut first_error = None;
        let mut written = Vec::with_capacity(self.channels.len());
        for channel in &self.channels {
            match self.backend.put_int(channel, rate.get()) {
                Ok(()) => {
                    debug!("{} = {}", channel, rate);
                    written.push(channel.as_str());
                }
                Err(e) => {
                    error!("failed to set {} Hz on {}: {}", rate, channel, e);
                    first_error.get_or_insert(e);
                }
            }
        }

        if let Some(e) = first_error {
            warn!(
                "{} Hz only written to [{}] of {} channels",
                rate,
                written.join(", "),
                self.channels.len()
            );
            return Err(e);
        }

        info!("refresh rate set to {} Hz", rate);
        Ok(())
    }

    fn current_rate(&self) -> Option<RefreshRate> {
        let rate = self.channel_rate(&self.read_channel);
        debug!("current refresh rate: {:?}", rate.map(RefreshRate::get));
        rate
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mock::MemorySettings;

    fn hz(value: u32) -> RefreshRate {
        RefreshRate::new(value).unwrap()
    }

    #[test]
    fn test_apply_writes_every_channel() {
        let controller = SettingsRateController::new(MemorySettings::new());
        controller.apply(hz(120)).unwrap();

        assert_eq!(controller.backend().value(MIUI_REFRESH_RATE), Some(120));
        assert_eq!(controller.backend().value(USER_REFRESH_RATE), Some(120));
        assert_eq!(controller.current_rate(), Some(hz(120)));
    }

    #[test]
    fn test_second_channel_rejection_fails_without_rollback() {
        let settings = MemorySettings::new();
        settings.reject(
            USER_REFRESH_RATE,
            RateError::Unsupported {
                channel: USER_REFRESH_RATE.to_string(),
                rate: 75,
            },
        );
        let controller = SettingsRateController::new(settings);

        let err = controller.apply(hz(75)).unwrap_err();
        assert!(matches!(err, RateError::Unsupported { rate: 75, .. }));

        // The vendor channel keeps the partial write.
        assert_eq!(controller.backend().value(MIUI_REFRESH_RATE), Some(75));
        assert_eq!(controller.current_rate(), None);
    }

    #[test]
    fn test_first_channel_rejection_still_writes_the_rest() {
        let settings = MemorySettings::new();
        settings.reject(
            MIUI_REFRESH_RATE,
            RateError::PermissionDenied {
                channel: MIUI_REFRESH_RATE.to_string(),
            },
        );
        let controller = SettingsRateController::new(settings);

        assert!(matches!(
            controller.apply(hz(90)),
            Err(RateError::PermissionDenied { .. })
        ));
        assert_eq!(controller.backend().value(MIUI_REFRESH_RATE), None);
        assert_eq!(controller.backend().value(USER_REFRESH_RATE), Some(90));
        assert_eq!(controller.current_rate(), Some(hz(90)));
    }

    #[test]
    fn test_unreadable_channel_is_unknown_rate() {
        let settings = MemorySettings::new();
        settings.reject(USER_REFRESH_RATE, RateError::Unknown("boom".to_string()));
        let controller = SettingsRateController::new(settings);

        assert_eq!(controller.current_rate(), None);
    }

    #[test]
    fn test_vendor_channel_read() {
        let settings = MemorySettings::new();
        settings.put_int(MIUI_REFRESH_RATE, 144).unwrap();
        let controller = SettingsRateController::new(settings);

        assert_eq!(controller.channel_rate(MIUI_REFRESH_RATE), Some(hz(144)));
        assert_eq!(controller.current_rate(), None);
    }

    #[test]
    fn test_no_channels_is_a_failure() {
        let controller = SettingsRateController::with_channels(
            MemorySettings::new(),
            Vec::new(),
            USER_REFRESH_RATE.to_string(),
        );
        assert!(matches!(controller.apply(hz(60)), Err(RateError::Unknown(_))));
    }
}
