// ─── Settings ───
// Application-lifetime configuration store plus the derived on-disk layout.
// Created once at process start and passed down by handle; no global state.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::error::{LauncherError, LauncherResult};

const APP_DIR_NAME: &str = "mcl";
const SETTINGS_FILE: &str = "settings.json";
const VERSIONS_CACHE_FILE: &str = "versions_cache.json";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Resolution {
    pub width: u32,
    pub height: u32,
}

/// User preferences persisted between runs.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub last_username: Option<String>,
    pub last_version: Option<String>,
    pub java_executable: Option<PathBuf>,
    pub jvm_arguments: Vec<String>,
    pub memory_gb: u32,
    pub resolution: Option<Resolution>,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            last_username: None,
            last_version: None,
            java_executable: None,
            jvm_arguments: Vec::new(),
            memory_gb: 4,
            resolution: None,
        }
    }
}

/// Handle to the settings file and the data directory layout.
///
/// An absent or corrupt settings file loads as defaults; it never fails the
/// caller. Writes happen only through `save`, flushed at process end.
pub struct SettingsStore {
    data_dir: PathBuf,
    settings: Settings,
}

impl SettingsStore {
    pub fn open(data_dir: PathBuf) -> Self {
        let settings = load_settings(&data_dir.join(SETTINGS_FILE));
        Self { data_dir, settings }
    }

    pub fn default_data_dir() -> PathBuf {
        dirs::data_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join(APP_DIR_NAME)
    }

    pub fn data_dir(&self) -> &Path {
        &self.data_dir
    }

    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    pub fn settings_mut(&mut self) -> &mut Settings {
        &mut self.settings
    }

    pub fn save(&self) -> LauncherResult<()> {
        std::fs::create_dir_all(&self.data_dir)
            .map_err(|e| LauncherError::io(&self.data_dir, e))?;
        let path = self.data_dir.join(SETTINGS_FILE);
        let json = serde_json::to_string_pretty(&self.settings)?;
        std::fs::write(&path, json).map_err(|e| LauncherError::io(&path, e))
    }

    pub fn mods_dir(&self) -> PathBuf {
        self.data_dir.join("mods")
    }

    pub fn versions_cache_path(&self) -> PathBuf {
        self.data_dir.join(VERSIONS_CACHE_FILE)
    }

    /// Per-version game directory, isolating saves and config per version.
    /// Derived deterministically from the requested version id.
    pub fn game_dir(&self, version: &str) -> PathBuf {
        self.data_dir.join("instances").join(version)
    }
}

fn load_settings(path: &Path) -> Settings {
    let raw = match std::fs::read_to_string(path) {
        Ok(raw) => raw,
        Err(_) => return Settings::default(),
    };
    match serde_json::from_str(&raw) {
        Ok(settings) => settings,
        Err(err) => {
            warn!("Ignoring corrupt settings file {:?}: {}", path, err);
            Settings::default()
        }
    }
}
