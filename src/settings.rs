//! Save service configuration
//!
//! Settings are read once, when the service initializes, from a TOML
//! document. Every field has a default, so partial files are fine:
//!
//! ```toml
//! backend = "file"
//! file_name = "slot1.json"
//! folder = "saves"
//! use_encryption = true
//! encryption_key = "k1"
//! auto_save_interval = 30.0
//! ```

use crate::error::PersistError;
use serde::{Deserialize, Serialize};
use std::path::{Component, Path, PathBuf};
use std::time::Duration;
use tracing::{info, warn};

/// Which storage medium holds the save blob
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum BackendKind {
    /// One slot of the host key/value registry
    #[default]
    Registry,
    /// One file under the application data directory
    File,
}

/// Configuration record, immutable once loaded
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub backend: BackendKind,
    /// Registry slot name
    pub registry_key: String,
    pub file_name: String,
    /// Folder relative to the application data directory
    pub folder: String,
    pub use_encryption: bool,
    pub encryption_key: String,
    pub pretty_print: bool,
    /// Seconds between automatic flushes, 0 disables
    pub auto_save_interval: f64,
    pub save_on_pause: bool,
    pub save_on_focus_lost: bool,
    pub save_on_quit: bool,
}

const DEFAULT_REGISTRY_KEY: &str = "SaveData";
const DEFAULT_FILE_NAME: &str = "save.json";
const DEFAULT_FOLDER: &str = "saves";
/// Shortest auto-save period, in seconds
const MIN_AUTO_SAVE_INTERVAL: f64 = 0.001;

impl Default for Settings {
    fn default() -> Self {
        Self {
            backend: BackendKind::Registry,
            registry_key: DEFAULT_REGISTRY_KEY.to_string(),
            file_name: DEFAULT_FILE_NAME.to_string(),
            folder: DEFAULT_FOLDER.to_string(),
            use_encryption: false,
            encryption_key: String::new(),
            pretty_print: true,
            auto_save_interval: 0.0,
            save_on_pause: true,
            save_on_focus_lost: false,
            save_on_quit: true,
        }
    }
}

impl Settings {
    /// Parse settings from TOML text and normalize them
    pub fn from_toml(text: &str) -> Result<Self, PersistError> {
        let mut settings: Settings =
            toml::from_str(text).map_err(|e| PersistError::Settings(e.to_string()))?;
        settings.normalize();
        Ok(settings)
    }

    pub fn to_toml(&self) -> Result<String, PersistError> {
        toml::to_string_pretty(self).map_err(|e| PersistError::Settings(e.to_string()))
    }

    /// Replace invalid values with defaults, warning for each repair
    pub fn normalize(&mut self) {
        if self.registry_key.trim().is_empty() {
            warn!("registry_key is empty; using {DEFAULT_REGISTRY_KEY}");
            self.registry_key = DEFAULT_REGISTRY_KEY.to_string();
        }
        if self.file_name.trim().is_empty() || !is_single_component(&self.file_name) {
            warn!(file_name = %self.file_name, "invalid file_name; using {DEFAULT_FILE_NAME}");
            self.file_name = DEFAULT_FILE_NAME.to_string();
        }
        if !is_relative_below(&self.folder) {
            warn!(folder = %self.folder, "folder must stay inside the data directory; using {DEFAULT_FOLDER}");
            self.folder = DEFAULT_FOLDER.to_string();
        }
        if !self.auto_save_interval.is_finite() || self.auto_save_interval < 0.0 {
            warn!(
                interval = self.auto_save_interval,
                "invalid auto_save_interval; auto-save disabled"
            );
            self.auto_save_interval = 0.0;
        } else if self.auto_save_interval > 0.0
            && self.auto_save_interval < MIN_AUTO_SAVE_INTERVAL
        {
            warn!(
                interval = self.auto_save_interval,
                "auto_save_interval below 1 ms; using 1 ms"
            );
            self.auto_save_interval = MIN_AUTO_SAVE_INTERVAL;
        } else if Duration::try_from_secs_f64(self.auto_save_interval).is_err() {
            warn!(
                interval = self.auto_save_interval,
                "auto_save_interval too large; auto-save disabled"
            );
            self.auto_save_interval = 0.0;
        }
    }

    /// Interval between automatic flushes, `None` when disabled
    ///
    /// Never returns a zero period, even for settings that skipped
    /// [`normalize`](Self::normalize).
    pub fn auto_save_interval(&self) -> Option<Duration> {
        if self.auto_save_interval > 0.0 {
            Duration::try_from_secs_f64(self.auto_save_interval)
                .ok()
                .filter(|period| !period.is_zero())
        } else {
            None
        }
    }

    /// Whether any trigger needs the scheduler running
    pub fn wants_scheduler(&self) -> bool {
        self.auto_save_interval().is_some()
            || self.save_on_focus_lost
            || self.save_on_pause
            || self.save_on_quit
    }

    /// Path of the save file below `data_dir`
    pub fn file_path(&self, data_dir: &Path) -> PathBuf {
        let mut path = data_dir.to_path_buf();
        if !self.folder.is_empty() {
            path.push(&self.folder);
        }
        path.push(&self.file_name);
        path
    }
}

fn is_single_component(name: &str) -> bool {
    let mut components = Path::new(name).components();
    matches!(
        (components.next(), components.next()),
        (Some(Component::Normal(_)), None)
    )
}

fn is_relative_below(folder: &str) -> bool {
    Path::new(folder)
        .components()
        .all(|c| matches!(c, Component::Normal(_) | Component::CurDir))
}

/// Where settings are read from at initialization
#[derive(Debug, Clone, Default)]
pub enum SettingsSource {
    /// A TOML file; a missing file means defaults
    File(PathBuf),
    /// Settings provided by the host directly
    Inline(Settings),
    /// Nothing configured; defaults
    #[default]
    None,
}

impl SettingsSource {
    /// Read the settings, `Ok(None)` when the source has nothing
    pub fn load(&self) -> Result<Option<Settings>, PersistError> {
        match self {
            SettingsSource::File(path) => {
                let text = match std::fs::read_to_string(path) {
                    Ok(text) => text,
                    Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
                    Err(e) => return Err(PersistError::io(path.display().to_string(), e)),
                };
                let settings = Settings::from_toml(&text)?;
                info!(path = %path.display(), "loaded save settings");
                Ok(Some(settings))
            }
            SettingsSource::Inline(settings) => {
                let mut settings = settings.clone();
                settings.normalize();
                Ok(Some(settings))
            }
            SettingsSource::None => Ok(None),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn partial_toml_fills_defaults() {
        let settings = Settings::from_toml("backend = \"file\"\nauto_save_interval = 2.5\n").unwrap();
        assert_eq!(settings.backend, BackendKind::File);
        assert_eq!(settings.file_name, DEFAULT_FILE_NAME);
        assert_eq!(settings.auto_save_interval(), Some(Duration::from_millis(2500)));
        assert!(settings.save_on_quit);
    }

    #[test]
    fn unknown_backend_is_a_settings_error() {
        let err = Settings::from_toml("backend = \"cloud\"").unwrap_err();
        assert!(matches!(err, PersistError::Settings(_)));
    }

    #[test]
    fn escaping_paths_are_repaired() {
        let mut settings = Settings {
            folder: "../../etc".into(),
            file_name: "a/b.json".into(),
            registry_key: "  ".into(),
            auto_save_interval: f64::NAN,
            ..Settings::default()
        };
        settings.normalize();
        assert_eq!(settings.folder, DEFAULT_FOLDER);
        assert_eq!(settings.file_name, DEFAULT_FILE_NAME);
        assert_eq!(settings.registry_key, DEFAULT_REGISTRY_KEY);
        assert_eq!(settings.auto_save_interval(), None);
    }

    #[test]
    fn sub_millisecond_interval_is_raised_to_the_minimum() {
        let mut settings = Settings {
            auto_save_interval: 1e-10,
            ..Settings::default()
        };
        assert_eq!(settings.auto_save_interval(), None);

        settings.normalize();
        assert_eq!(settings.auto_save_interval, MIN_AUTO_SAVE_INTERVAL);
        assert_eq!(settings.auto_save_interval(), Some(Duration::from_millis(1)));
    }

    #[test]
    fn unrepresentable_interval_disables_auto_save() {
        let mut settings = Settings {
            auto_save_interval: 1e300,
            ..Settings::default()
        };
        settings.normalize();
        assert_eq!(settings.auto_save_interval, 0.0);
        assert_eq!(settings.auto_save_interval(), None);

        let parsed = Settings::from_toml("auto_save_interval = 1e-12").unwrap();
        assert_eq!(parsed.auto_save_interval(), Some(Duration::from_millis(1)));
    }

    #[test]
    fn file_path_joins_folder_and_name() {
        let settings = Settings {
            folder: "slots/main".into(),
            file_name: "one.json".into(),
            ..Settings::default()
        };
        assert_eq!(
            settings.file_path(Path::new("/data")),
            Path::new("/data/slots/main/one.json")
        );
    }

    #[test]
    fn missing_file_source_yields_none() {
        let dir = tempfile::tempdir().unwrap();
        let source = SettingsSource::File(dir.path().join("absent.toml"));
        assert!(source.load().unwrap().is_none());
    }

    #[test]
    fn toml_round_trips_through_file_source() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("savestate.toml");
        let settings = Settings {
            backend: BackendKind::File,
            use_encryption: true,
            encryption_key: "k1".into(),
            ..Settings::default()
        };
        std::fs::write(&path, settings.to_toml().unwrap()).unwrap();

        let loaded = SettingsSource::File(path).load().unwrap().unwrap();
        assert_eq!(loaded, settings);
    }
}
