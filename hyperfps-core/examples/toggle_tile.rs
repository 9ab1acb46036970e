//! Example: Toggle the refresh rate tile once.
//!
//! Run with: `cargo run --example toggle_tile`
//!
//! Uses `config.toml` and `state.toml` from the platform config directory, so
//! the `settings` tool (or `adb shell settings`) must be reachable.

use std::sync::Arc;

use hyperfps_core::{AppConfig, FileConfigStore, Notification, ToggleCoordinator, ToggleError};

fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize logging (optional)
    env_logger::init();

    let config = AppConfig::load()?;
    let store = Arc::new(FileConfigStore::open_default()?);
    println!("Settings file: {}", store.path().display());

    let coordinator = ToggleCoordinator::start(
        store,
        Arc::new(config.rate_controller()),
        config.coordinator_options(),
    )?;

    // Show what the tile renders before the toggle
    let updates = coordinator.subscribe();
    if let Ok(Notification::Snapshot(tile)) = updates.recv() {
        println!(
            "Tile before: {} ({}Hz)",
            if tile.is_active { "ON" } else { "OFF" },
            tile.subtitle_rate
        );
    }

    match coordinator.refresh_applied_rate()? {
        Some(rate) => println!("Current refresh rate: {} Hz", rate),
        None => println!("Current refresh rate: unknown"),
    }

    match coordinator.toggle_requested() {
        Ok(tile) => println!(
            "Toggled to: {} ({}Hz)",
            if tile.is_active { "ON" } else { "OFF" },
            tile.subtitle_rate
        ),
        Err(e) if e.is_permission_denied() => {
            eprintln!("Error toggling: {}", e);
            eprintln!(
                "Grant the permission with: adb shell pm grant <package> android.permission.WRITE_SECURE_SETTINGS"
            );
        }
        Err(ToggleError::Busy) => eprintln!("Another change is still in progress"),
        Err(e) => eprintln!("Error toggling: {}", e),
    }

    Ok(())
}
