//! Persisted tile presets and toggle state.
//!
//! Two presets and one boolean, stored under a `[tile]` table:
//!
//! ```toml
//! [tile]
//! off_refresh_rate = 60
//! on_refresh_rate = 120
//! state = false
//! ```

use crate::error::StoreError;
use crate::rate::RefreshRate;

use log::debug;
use serde::{Deserialize, Serialize};
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard};

const STATE_FILE_NAME: &str = "state.toml";

// =============================================================================
// Config Store Trait
// =============================================================================

/// Durable key-value storage for the tile.
///
/// Getters return the default when a key was never written. Setters do not
/// validate; callers parse user input into a [`RefreshRate`] first.
pub trait ConfigStore: Send + Sync {
    /// Rate applied when the tile is off. Defaults to 60.
    fn off_rate(&self) -> RefreshRate;

    /// Rate applied when the tile is on. Defaults to 120.
    fn on_rate(&self) -> RefreshRate;

    /// Last successfully applied toggle state. Defaults to off.
    fn toggle_state(&self) -> bool;

    /// Overwrite the off preset.
    fn set_off_rate(&self, rate: RefreshRate) -> Result<(), StoreError>;

    /// Overwrite the on preset.
    fn set_on_rate(&self, rate: RefreshRate) -> Result<(), StoreError>;

    /// Overwrite the toggle state.
    fn set_toggle_state(&self, on: bool) -> Result<(), StoreError>;
}

// =============================================================================
// Persisted Layout
// =============================================================================

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
struct StateFile {
    #[serde(default)]
    tile: TileSettings,
}

/// The values behind a [`ConfigStore`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TileSettings {
    /// Off preset.
    #[serde(rename = "off_refresh_rate", default = "default_off_rate")]
    pub off_rate: RefreshRate,
    /// On preset.
    #[serde(rename = "on_refresh_rate", default = "default_on_rate")]
    pub on_rate: RefreshRate,
    /// Toggle state.
    #[serde(rename = "state", default)]
    pub is_on: bool,
}

fn default_off_rate() -> RefreshRate {
    RefreshRate::DEFAULT_OFF
}

fn default_on_rate() -> RefreshRate {
    RefreshRate::DEFAULT_ON
}

impl Default for TileSettings {
    fn default() -> Self {
        Self {
            off_rate: default_off_rate(),
            on_rate: default_on_rate(),
            is_on: false,
        }
    }
}

// =============================================================================
// File Store
// =============================================================================

/// A [`ConfigStore`] backed by a TOML file.
///
/// Values are cached in memory; every setter rewrites the file and syncs it to
/// disk before returning.
pub struct FileConfigStore {
    path: PathBuf,
    settings: Mutex<TileSettings>,
}

impl FileConfigStore {
    /// Open the store in the platform config directory
    /// (e.g. `~/.config/hyperfps/state.toml`).
    pub fn open_default() -> Result<Self, StoreError> {
        let dir = dirs::config_dir().ok_or(StoreError::NoConfigDir)?;
        Self::open(dir.join("hyperfps").join(STATE_FILE_NAME))
    }

    /// Open the store at `path`, creating its directory if needed.
    ///
    /// A missing file is not an error; all values take their defaults until
    /// the first write.
    ///
    /// # Errors
    ///
    /// - [`StoreError::Io`] if the directory cannot be created or the file
    ///   cannot be read
    /// - [`StoreError::Parse`] if the file exists but is malformed
    pub fn open(path: impl Into<PathBuf>) -> Result<Self, StoreError> {
        let path = path.into();

        if let Some(dir) = path.parent() {
            fs::create_dir_all(dir).map_err(|source| StoreError::Io {
                path: dir.to_path_buf(),
                source,
            })?;
        }

        let settings = match fs::read_to_string(&path) {
            Ok(content) => toml::from_str::<StateFile>(&content)?.tile,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => TileSettings::default(),
            Err(source) => return Err(StoreError::Io { path, source }),
        };
        debug!("loaded tile settings from {}: {:?}", path.display(), settings);

        Ok(Self {
            path,
            settings: Mutex::new(settings),
        })
    }

    /// Location of the backing file.
    pub fn path(&self) -> &Path {
        &self.path
    }

    fn lock(&self) -> MutexGuard<'_, TileSettings> {
        self.settings.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn update(&self, change: impl FnOnce(&mut TileSettings)) -> Result<(), StoreError> {
        let mut settings = self.lock();
        let mut next = *settings;
        change(&mut next);
        if next == *settings {
            return Ok(());
        }

        write_atomically(&self.path, &StateFile { tile: next })?;
        *settings = next;
        Ok(())
    }
}

fn write_atomically(path: &Path, state: &StateFile) -> Result<(), StoreError> {
    let content = toml::to_string_pretty(state)?;
    let tmp = path.with_extension("toml.tmp");
    let io_err = |source: std::io::Error| StoreError::Io {
        path: tmp.clone(),
        source,
    };

    let mut file = fs::File::create(&tmp).map_err(io_err)?;
    file.write_all(content.as_bytes()).map_err(io_err)?;
    file.sync_all().map_err(io_err)?;
    drop(file);

    fs::rename(&tmp, path).map_err(|source| StoreError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    debug!("saved tile settings to {}", path.display());
    Ok(())
}

impl ConfigStore for FileConfigStore {
    fn off_rate(&self) -> RefreshRate {
        self.lock().off_rate
    }

    fn on_rate(&self) -> RefreshRate {
        self.lock().on_rate
    }

    fn toggle_state(&self) -> bool {
        self.lock().is_on
    }

    fn set_off_rate(&self, rate: RefreshRate) -> Result<(), StoreError> {
        self.update(|s| s.off_rate = rate)
    }

    fn set_on_rate(&self, rate: RefreshRate) -> Result<(), StoreError> {
        self.update(|s| s.on_rate = rate)
    }

    fn set_toggle_state(&self, on: bool) -> Result<(), StoreError> {
        self.update(|s| s.is_on = on)
    }
}

// =============================================================================
// Memory Store
// =============================================================================

/// A [`ConfigStore`] that lives only in memory.
///
/// ```
/// use hyperfps_core::{ConfigStore, MemoryConfigStore, RefreshRate};
///
/// let store = MemoryConfigStore::new();
/// assert_eq!(store.on_rate(), RefreshRate::DEFAULT_ON);
/// store.set_on_rate(RefreshRate::new(144).unwrap()).unwrap();
/// assert_eq!(store.on_rate().get(), 144);
/// ```
#[derive(Debug, Default)]
pub struct MemoryConfigStore {
    settings: Mutex<TileSettings>,
}

impl MemoryConfigStore {
    /// A store holding the defaults.
    pub fn new() -> Self {
        Self::default()
    }

    /// A store holding `settings`.
    pub fn with_settings(settings: TileSettings) -> Self {
        Self {
            settings: Mutex::new(settings),
        }
    }

    /// Copy of the current values.
    pub fn settings(&self) -> TileSettings {
        *self.lock()
    }

    fn lock(&self) -> MutexGuard<'_, TileSettings> {
        self.settings.lock().unwrap_or_else(|e| e.into_inner())
    }
}

impl ConfigStore for MemoryConfigStore {
    fn off_rate(&self) -> RefreshRate {
        self.lock().off_rate
    }

    fn on_rate(&self) -> RefreshRate {
        self.lock().on_rate
    }

    fn toggle_state(&self) -> bool {
        self.lock().is_on
    }

    fn set_off_rate(&self, rate: RefreshRate) -> Result<(), StoreError> {
        self.lock().off_rate = rate;
        Ok(())
    }

    fn set_on_rate(&self, rate: RefreshRate) -> Result<(), StoreError> {
        self.lock().on_rate = rate;
        Ok(())
    }

    fn set_toggle_state(&self, on: bool) -> Result<(), StoreError> {
        self.lock().is_on = on;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn hz(value: u32) -> RefreshRate {
        RefreshRate::new(value).unwrap()
    }

    #[test]
    fn test_missing_file_uses_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileConfigStore::open(dir.path().join("hyperfps").join("state.toml")).unwrap();

        assert_eq!(store.off_rate(), hz(60));
        assert_eq!(store.on_rate(), hz(120));
        assert!(!store.toggle_state());
        assert!(!store.path().exists());
    }

    #[test]
    fn test_values_survive_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("state.toml");

        let store = FileConfigStore::open(&path).unwrap();
        store.set_off_rate(hz(48)).unwrap();
        store.set_on_rate(hz(144)).unwrap();
        store.set_toggle_state(true).unwrap();
        drop(store);

        let reopened = FileConfigStore::open(&path).unwrap();
        assert_eq!(reopened.off_rate(), hz(48));
        assert_eq!(reopened.on_rate(), hz(144));
        assert!(reopened.toggle_state());
        assert!(!path.with_extension("toml.tmp").exists());
    }

    #[test]
    fn test_setting_same_value_twice() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileConfigStore::open(dir.path().join("state.toml")).unwrap();

        store.set_off_rate(hz(60)).unwrap();
        store.set_off_rate(hz(60)).unwrap();
        assert_eq!(store.off_rate(), hz(60));
    }

    #[test]
    fn test_file_layout_is_namespaced() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("state.toml");
        let store = FileConfigStore::open(&path).unwrap();
        store.set_on_rate(hz(90)).unwrap();

        let content = fs::read_to_string(&path).unwrap();
        assert!(content.contains("[tile]"));
        assert!(content.contains("on_refresh_rate = 90"));
        assert!(content.contains("off_refresh_rate = 60"));
        assert!(content.contains("state = false"));
    }

    #[test]
    fn test_partial_file_fills_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("state.toml");
        fs::write(&path, "[tile]\nstate = true\n").unwrap();

        let store = FileConfigStore::open(&path).unwrap();
        assert!(store.toggle_state());
        assert_eq!(store.off_rate(), hz(60));
        assert_eq!(store.on_rate(), hz(120));
    }

    #[test]
    fn test_zero_rate_in_file_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("state.toml");
        fs::write(&path, "[tile]\noff_refresh_rate = 0\n").unwrap();

        assert!(matches!(
            FileConfigStore::open(&path),
            Err(StoreError::Parse(_))
        ));
    }

    #[test]
    fn test_memory_store_defaults() {
        let store = MemoryConfigStore::new();
        assert_eq!(store.settings(), TileSettings::default());
        store.set_toggle_state(true).unwrap();
        assert!(store.toggle_state());
    }
}
