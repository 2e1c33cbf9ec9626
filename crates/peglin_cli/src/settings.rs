use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use chrono::{DateTime, TimeDelta, Utc};
use directories::ProjectDirs;
use peglin_core::type_library::locate_type_library;
use serde::{Deserialize, Serialize};

const SETTINGS_FILE: &str = "settings.json";
const INSTALL_CACHE_MAX_AGE_DAYS: i64 = 7;

/// Persisted CLI preferences.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub install_path: Option<PathBuf>,
    pub save_path: Option<PathBuf>,
    pub install_cache: Option<InstallCache>,
}

/// Result of the last install search.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InstallCache {
    pub paths: Vec<PathBuf>,
    pub detected_at: DateTime<Utc>,
}

impl InstallCache {
    /// Usable while younger than a week and every path still holds a type library.
    pub fn is_fresh(&self, now: DateTime<Utc>) -> bool {
        now.signed_duration_since(self.detected_at) < TimeDelta::days(INSTALL_CACHE_MAX_AGE_DAYS)
            && !self.paths.is_empty()
            && self
                .paths
                .iter()
                .all(|path| locate_type_library(path).is_some())
    }
}

/// Settings file plus its location. Setters write through immediately.
#[derive(Debug)]
pub struct SettingsStore {
    path: PathBuf,
    settings: Settings,
}

impl SettingsStore {
    pub fn default_path() -> Option<PathBuf> {
        ProjectDirs::from("io", "peglin-stats", "peglin-stats")
            .map(|dirs| dirs.config_dir().join(SETTINGS_FILE))
    }

    /// Load `path`; a missing or unreadable file gives default settings.
    pub fn open(path: PathBuf) -> Self {
        let settings = match fs::read_to_string(&path) {
            Ok(data) => match serde_json::from_str::<Settings>(&data) {
                Ok(settings) => settings,
                Err(e) => {
                    tracing::warn!(path = %path.display(), "ignoring unparsable settings: {e}");
                    Settings::default()
                }
            },
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Settings::default(),
            Err(e) => {
                tracing::warn!(path = %path.display(), "failed to read settings: {e}");
                Settings::default()
            }
        };
        tracing::debug!(path = %path.display(), "settings loaded");
        Self { path, settings }
    }

    /// Settings that live only for this process.
    pub fn in_memory() -> Self {
        Self {
            path: PathBuf::new(),
            settings: Settings::default(),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    pub fn set_install_path(&mut self, path: PathBuf) -> Result<()> {
        self.settings.install_path = Some(path);
        self.settings.install_cache = None;
        self.persist()
    }

    pub fn set_save_path(&mut self, path: PathBuf) -> Result<()> {
        self.settings.save_path = Some(path);
        self.persist()
    }

    pub fn cached_install(&self, now: DateTime<Utc>) -> Option<PathBuf> {
        let cache = self.settings.install_cache.as_ref()?;
        if !cache.is_fresh(now) {
            tracing::debug!("install cache is stale");
            return None;
        }
        cache.paths.first().cloned()
    }

    pub fn remember_install(&mut self, dir: PathBuf, now: DateTime<Utc>) -> Result<()> {
        self.settings.install_cache = Some(InstallCache {
            paths: vec![dir],
            detected_at: now,
        });
        self.persist()
    }

    fn persist(&self) -> Result<()> {
        if self.path.as_os_str().is_empty() {
            return Ok(());
        }
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent).with_context(|| {
                format!("failed to create settings directory {}", parent.display())
            })?;
        }
        let data = serde_json::to_string_pretty(&self.settings)?;
        fs::write(&self.path, data)
            .with_context(|| format!("failed to write settings to {}", self.path.display()))
    }
}
