use crate::settings::config::Settings;
use anyhow::{Context, Result};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard};
use tracing::{debug, warn};

const SETTINGS_DIR: &str = ".slnview";
const SETTINGS_FILE: &str = "settings.toml";

/// Explorer settings backed by a TOML file.
///
/// Clones share one in-memory copy. The actor reads it whenever discovery
/// runs and replaces it on `SaveSettings`; other processes only see a change
/// once it has been written.
#[derive(Clone)]
pub struct SettingsManager {
    settings_path: PathBuf,
    inner: Arc<Mutex<Settings>>,
}

impl SettingsManager {
    /// Settings from `~/.slnview/settings.toml`.
    pub fn new() -> Result<Self> {
        let home = dirs::home_dir().context("Failed to get home directory")?;
        Self::from_path(home.join(SETTINGS_DIR).join(SETTINGS_FILE))
    }

    /// Settings from `path`. A missing file is created with the defaults; an
    /// unreadable one is moved aside to `*.toml.backup` and replaced with
    /// the defaults.
    pub fn from_path(path: PathBuf) -> Result<Self> {
        let settings = if path.exists() {
            Self::load_or_recover(&path)?
        } else {
            debug!("Creating default settings at {path:?}");
            write_settings(&path, &Settings::default())?;
            Settings::default()
        };

        Ok(Self {
            settings_path: path,
            inner: Arc::new(Mutex::new(settings)),
        })
    }

    fn load_or_recover(path: &Path) -> Result<Settings> {
        let contents = fs::read_to_string(path)
            .with_context(|| format!("Failed to read settings from {path:?}"))?;

        match toml::from_str(&contents) {
            Ok(settings) => Ok(settings),
            Err(e) => {
                let backup_path = path.with_extension("toml.backup");
                warn!("Settings file {path:?} is corrupted, moving it to {backup_path:?}: {e}");
                fs::rename(path, &backup_path).with_context(|| {
                    format!("Failed to backup corrupted settings to {backup_path:?}")
                })?;
                write_settings(path, &Settings::default())?;
                Ok(Settings::default())
            }
        }
    }

    fn lock(&self) -> MutexGuard<'_, Settings> {
        self.inner
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    pub fn settings(&self) -> Settings {
        self.lock().clone()
    }

    /// Changes the in-memory copy only; call `save` to persist.
    pub fn update_setting<F>(&self, updater: F)
    where
        F: FnOnce(&mut Settings),
    {
        updater(&mut self.lock());
    }

    /// Writes `settings` to disk, then makes them the in-memory copy.
    pub fn save_settings(&self, settings: Settings) -> Result<()> {
        write_settings(&self.settings_path, &settings)?;
        *self.lock() = settings;
        Ok(())
    }

    pub fn save(&self) -> Result<()> {
        self.save_settings(self.settings())
    }

    pub fn path(&self) -> &Path {
        &self.settings_path
    }
}

fn write_settings(path: &Path, settings: &Settings) -> Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)
            .with_context(|| format!("Failed to create directory: {parent:?}"))?;
    }
    let contents = toml::to_string_pretty(settings).context("Failed to serialize settings")?;
    fs::write(path, contents).with_context(|| format!("Failed to write settings to {path:?}"))
}
