//! Toggle a display's refresh rate between two saved presets.
//!
//! The crate keeps two presets and an on/off state on disk, applies refresh
//! rates through the platform's system settings, and runs a small state
//! machine that keeps a quick-access tile in line with the rate that was
//! actually applied.
//!
//! # Requirements
//!
//! - A device exposing the refresh rate as integer system settings
//!   (`miui_refresh_rate` / `user_refresh_rate` by default)
//! - Permission to write those settings, e.g. `WRITE_SECURE_SETTINGS` granted
//!   through adb, or running the `settings` tool through `adb shell`
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use hyperfps_core::{AppConfig, FileConfigStore, ToggleCoordinator};
//!
//! fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = AppConfig::load()?;
//!     let store = Arc::new(FileConfigStore::open_default()?);
//!
//!     let coordinator = ToggleCoordinator::start(
//!         store,
//!         Arc::new(config.rate_controller()),
//!         config.coordinator_options(),
//!     )?;
//!
//!     let tile = coordinator.toggle_requested()?;
//!     println!("{}: {}Hz (active: {})", tile.label, tile.subtitle_rate, tile.is_active);
//!     Ok(())
//! }
//! ```
//!
//! # Testing
//!
//! Use [`MockRateController`] to test code without a device:
//!
//! ```
//! use hyperfps_core::{MockRateController, RateController, RefreshRate};
//!
//! let mock = MockRateController::new();
//! mock.apply(RefreshRate::new(90).unwrap()).unwrap();
//! assert_eq!(mock.current_rate(), RefreshRate::new(90));
//! ```

#![warn(missing_docs)]

mod config;
mod controller;
mod coordinator;
mod error;
mod mock;
mod rate;
mod settings;
mod store;

// Re-export public API
pub use config::{AppConfig, CoordinatorConfig, DisplayConfig, config_file_path};
pub use controller::{MIUI_REFRESH_RATE, RateController, SettingsRateController, USER_REFRESH_RATE};
pub use coordinator::{
    CoordinatorOptions, Notification, Pending, TILE_LABEL, TileSnapshot, TileState,
    ToggleCoordinator,
};
pub use error::{ConfigError, ParseRateError, RateError, StoreError, ToggleError};
pub use mock::{ApplyGate, MemorySettings, MockRateController};
pub use rate::RefreshRate;
pub use settings::{SettingsBackend, ShellSettings};
pub use store::{ConfigStore, FileConfigStore, MemoryConfigStore, TileSettings};
