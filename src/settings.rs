//! Persisted user settings.
//!
//! Stored as a small JSON file. The render core reads everything but only
//! writes the `running` flag and the heartbeat; the rest is owned by
//! whatever settings UI sits in front (here: the HTTP API).

use crate::error::SettingsError;
use crate::grid::{MAX_CONTRAST, NEUTRAL_CONTRAST};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::time::{SystemTime, UNIX_EPOCH};

/// What the matrix shows for the current track. The two are exclusive.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize, utoipa::ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum DisplayMode {
    /// Album art as a brightness image.
    Art,
    /// Scrolling "artist - title" text.
    #[default]
    Title,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize, utoipa::ToSchema)]
#[serde(default)]
pub struct Settings {
    /// Auto-display is switched on.
    pub running: bool,
    pub mode: DisplayMode,
    /// Image brightness scale, 0-255.
    pub brightness: u8,
    /// Image contrast, 0-200 (100 = unchanged).
    pub contrast: u8,
    /// Master switch for reacting to notifications at all.
    pub service_enabled: bool,
    /// Last liveness stamp (Unix milliseconds).
    pub heartbeat_ms: u64,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            running: false,
            mode: DisplayMode::Title,
            brightness: 255,
            contrast: NEUTRAL_CONTRAST,
            service_enabled: true,
            heartbeat_ms: 0,
        }
    }
}

impl Settings {
    fn normalized(mut self) -> Self {
        self.contrast = self.contrast.min(MAX_CONTRAST);
        self
    }
}

/// Partial update coming from a settings screen.
#[derive(Clone, Debug, Default, Deserialize, utoipa::ToSchema)]
pub struct SettingsPatch {
    pub mode: Option<DisplayMode>,
    #[schema(minimum = 0, maximum = 255)]
    pub brightness: Option<u8>,
    #[schema(minimum = 0, maximum = 200)]
    pub contrast: Option<u8>,
    pub service_enabled: Option<bool>,
}

/// Shared, file-backed settings handle. Clones share the same state.
#[derive(Clone)]
pub struct SettingsStore {
    path: Option<PathBuf>,
    inner: Arc<Mutex<Settings>>,
}

impl SettingsStore {
    /// Settings that are never written to disk (tests, `--settings` unset).
    pub fn in_memory(settings: Settings) -> Self {
        Self {
            path: None,
            inner: Arc::new(Mutex::new(settings.normalized())),
        }
    }

    /// Load from `path`. A missing file yields defaults; an unreadable one
    /// yields defaults plus a warning.
    pub fn load(path: &Path) -> Self {
        let settings = match read_file(path) {
            Ok(Some(s)) => s,
            Ok(None) => Settings::default(),
            Err(e) => {
                tracing::warn!("Ignoring settings file {}: {}", path.display(), e);
                Settings::default()
            }
        };
        Self {
            path: Some(path.to_path_buf()),
            inner: Arc::new(Mutex::new(settings.normalized())),
        }
    }

    pub fn get(&self) -> Settings {
        self.lock().clone()
    }

    /// Apply `f`, clamp, persist. The in-memory value changes even if the
    /// write fails.
    ///
    /// The lock is held through the write so the file always ends up with
    /// the latest in-memory value.
    pub fn update(&self, f: impl FnOnce(&mut Settings)) -> Result<Settings, SettingsError> {
        let mut guard = self.lock();
        f(&mut guard);
        *guard = guard.clone().normalized();
        let snapshot = guard.clone();
        self.save(&snapshot)?;
        Ok(snapshot)
    }

    pub fn apply_patch(&self, patch: SettingsPatch) -> Result<Settings, SettingsError> {
        self.update(|s| {
            if let Some(mode) = patch.mode {
                s.mode = mode;
            }
            if let Some(b) = patch.brightness {
                s.brightness = b;
            }
            if let Some(c) = patch.contrast {
                s.contrast = c;
            }
            if let Some(enabled) = patch.service_enabled {
                s.service_enabled = enabled;
            }
        })
    }

    pub fn set_running(&self, running: bool) -> Result<Settings, SettingsError> {
        self.update(|s| s.running = running)
    }

    /// Stamp the heartbeat with the current wall-clock time.
    pub fn touch_heartbeat(&self) -> Result<Settings, SettingsError> {
        let now = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_millis() as u64)
            .unwrap_or(0);
        self.update(|s| s.heartbeat_ms = now)
    }

    fn save(&self, settings: &Settings) -> Result<(), SettingsError> {
        let Some(path) = &self.path else {
            return Ok(());
        };
        if let Some(dir) = path.parent().filter(|d| !d.as_os_str().is_empty()) {
            fs::create_dir_all(dir)?;
        }
        fs::write(path, serde_json::to_vec_pretty(settings)?)?;
        Ok(())
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Settings> {
        self.inner.lock().unwrap_or_else(|e| e.into_inner())
    }
}

fn read_file(path: &Path) -> Result<Option<Settings>, SettingsError> {
    match fs::read(path) {
        Ok(bytes) => Ok(Some(serde_json::from_slice(&bytes)?)),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
        Err(e) => Err(e.into()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use tempfile::TempDir;

    #[test]
    fn missing_file_gives_defaults() {
        let tmp = TempDir::new().unwrap();
        let store = SettingsStore::load(&tmp.path().join("settings.json"));
        assert_eq!(store.get(), Settings::default());
    }

    #[test]
    fn corrupt_file_gives_defaults() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("settings.json");
        fs::write(&path, b"{not json").unwrap();
        assert_eq!(SettingsStore::load(&path).get(), Settings::default());
    }

    #[test]
    fn partial_file_fills_in_defaults() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("settings.json");
        fs::write(&path, br#"{"mode":"art","contrast":250}"#).unwrap();
        let s = SettingsStore::load(&path).get();
        assert_eq!(s.mode, DisplayMode::Art);
        assert_eq!(s.contrast, 200);
        assert_eq!(s.brightness, 255);
        assert!(s.service_enabled);
    }

    #[test]
    fn updates_persist_across_loads() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("nested").join("settings.json");
        let store = SettingsStore::load(&path);
        store.set_running(true).unwrap();
        store
            .apply_patch(SettingsPatch {
                mode: Some(DisplayMode::Art),
                brightness: Some(120),
                contrast: Some(150),
                service_enabled: None,
            })
            .unwrap();

        let reloaded = SettingsStore::load(&path).get();
        assert!(reloaded.running);
        assert_eq!(reloaded.mode, DisplayMode::Art);
        assert_eq!(reloaded.brightness, 120);
        assert_eq!(reloaded.contrast, 150);
    }

    #[test]
    fn concurrent_updates_leave_latest_value_on_disk() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("settings.json");
        let store = SettingsStore::load(&path);

        let writers: Vec<_> = (0..4u8)
            .map(|t| {
                let store = store.clone();
                std::thread::spawn(move || {
                    for i in 0..50u8 {
                        store.update(|s| s.brightness = t * 50 + i).unwrap();
                    }
                })
            })
            .collect();
        for w in writers {
            w.join().unwrap();
        }

        assert_eq!(SettingsStore::load(&path).get(), store.get());
    }

    #[test]
    fn heartbeat_moves_forward() {
        let store = SettingsStore::in_memory(Settings::default());
        let s = store.touch_heartbeat().unwrap();
        assert!(s.heartbeat_ms > 0);
    }

    #[test]
    fn clones_share_state() {
        let a = SettingsStore::in_memory(Settings::default());
        let b = a.clone();
        a.update(|s| s.brightness = 10).unwrap();
        assert_eq!(b.get().brightness, 10);
    }
}
