use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::config::DEFAULT_PET;

#[derive(thiserror::Error, Debug)]
pub enum SettingsError {
    #[error("settings i/o error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("malformed settings: {0}")]
    Parse(#[source] serde_json::Error),

    #[error("cannot serialize settings: {0}")]
    Serialize(#[source] serde_json::Error),
}

/// Persisted companion settings (`config.json`).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Settings {
    #[serde(default)]
    pub window_x: Option<i32>,

    #[serde(default)]
    pub window_y: Option<i32>,

    #[serde(default = "default_opacity")]
    pub opacity: f32,

    #[serde(default = "default_pet_type")]
    pub pet_type: String,
}

fn default_opacity() -> f32 {
    1.0
}

fn default_pet_type() -> String {
    DEFAULT_PET.to_owned()
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            window_x: None,
            window_y: None,
            opacity: default_opacity(),
            pet_type: default_pet_type(),
        }
    }
}

impl Settings {
    /// Saved window position, only if both coordinates are present.
    pub fn window_position(&self) -> Option<(i32, i32)> {
        Some((self.window_x?, self.window_y?))
    }

    /// Opacity clamped to [0, 1]; NaN counts as opaque.
    pub fn effective_opacity(&self) -> f32 {
        if self.opacity.is_nan() {
            1.0
        } else {
            self.opacity.clamp(0.0, 1.0)
        }
    }
}

/// Settings plus the file they live in. Read once at startup.
#[derive(Debug)]
pub struct SettingsStore {
    path: PathBuf,
    settings: Settings,
}

impl SettingsStore {
    /// Load from `path`, falling back to defaults on any problem.
    pub fn load(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        let settings = match Self::read(&path) {
            Ok(Some(settings)) => {
                log::info!("Loaded settings from {}", path.display());
                settings
            }
            Ok(None) => {
                log::info!("No settings at {}, using defaults", path.display());
                Settings::default()
            }
            Err(e) => {
                log::warn!("Failed to load settings, using defaults: {e}");
                Settings::default()
            }
        };
        Self { path, settings }
    }

    fn read(path: &Path) -> Result<Option<Settings>, SettingsError> {
        let text = match fs::read_to_string(path) {
            Ok(text) => text,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(None),
            Err(source) => {
                return Err(SettingsError::Io {
                    path: path.to_owned(),
                    source,
                })
            }
        };
        serde_json::from_str(&text)
            .map(Some)
            .map_err(SettingsError::Parse)
    }

    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Write the current settings as pretty JSON.
    pub fn save(&self) -> Result<(), SettingsError> {
        let json = serde_json::to_string_pretty(&self.settings).map_err(SettingsError::Serialize)?;
        fs::write(&self.path, json).map_err(|source| SettingsError::Io {
            path: self.path.clone(),
            source,
        })?;
        log::info!("Settings saved to {}", self.path().display());
        Ok(())
    }

    /// Record the window position and persist. Failures are logged, never raised.
    pub fn save_position(&mut self, x: i32, y: i32) {
        self.settings.window_x = Some(x);
        self.settings.window_y = Some(y);
        if let Err(e) = self.save() {
            log::error!("Failed to save settings: {e}");
        }
    }
}
