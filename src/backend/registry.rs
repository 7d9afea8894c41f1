use super::Backend;
use crate::error::PersistError;
use crate::settings::BackendKind;
use std::collections::HashMap;
use std::fmt;
use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use tracing::debug;

/// Small persistent string registry provided by the host
///
/// Think of a preferences API: a flat namespace of named string slots.
pub trait Registry: Send + Sync {
    fn get(&self, slot: &str) -> Result<Option<String>, PersistError>;
    fn set(&self, slot: &str, value: &str) -> Result<(), PersistError>;
    fn remove(&self, slot: &str) -> Result<(), PersistError>;
    fn contains(&self, slot: &str) -> bool;
}

/// Stores the blob in one registry slot
#[derive(Clone)]
pub struct RegistryBackend {
    registry: Arc<dyn Registry>,
    slot: String,
}

impl RegistryBackend {
    pub fn new(registry: Arc<dyn Registry>, slot: impl Into<String>) -> Self {
        Self {
            registry,
            slot: slot.into(),
        }
    }

    pub fn slot(&self) -> &str {
        &self.slot
    }
}

impl fmt::Debug for RegistryBackend {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RegistryBackend")
            .field("slot", &self.slot)
            .finish_non_exhaustive()
    }
}

impl Backend for RegistryBackend {
    fn kind(&self) -> BackendKind {
        BackendKind::Registry
    }

    fn location(&self) -> String {
        format!("registry slot `{}`", self.slot)
    }

    fn write(&self, blob: &str) -> Result<(), PersistError> {
        self.registry.set(&self.slot, blob)
    }

    fn read(&self) -> Result<Option<String>, PersistError> {
        Ok(self
            .registry
            .get(&self.slot)?
            .filter(|blob| !blob.trim().is_empty()))
    }

    fn delete(&self) -> Result<(), PersistError> {
        self.registry.remove(&self.slot)
    }

    fn exists(&self) -> bool {
        self.registry.contains(&self.slot)
    }
}

/// Registry living only in process memory
#[derive(Debug, Default)]
pub struct MemoryRegistry {
    slots: Mutex<HashMap<String, String>>,
}

impl MemoryRegistry {
    fn slots(&self) -> std::sync::MutexGuard<'_, HashMap<String, String>> {
        self.slots.lock().unwrap_or_else(|e| e.into_inner())
    }
}

impl Registry for MemoryRegistry {
    fn get(&self, slot: &str) -> Result<Option<String>, PersistError> {
        Ok(self.slots().get(slot).cloned())
    }

    fn set(&self, slot: &str, value: &str) -> Result<(), PersistError> {
        self.slots().insert(slot.to_string(), value.to_string());
        Ok(())
    }

    fn remove(&self, slot: &str) -> Result<(), PersistError> {
        self.slots().remove(slot);
        Ok(())
    }

    fn contains(&self, slot: &str) -> bool {
        self.slots().contains_key(slot)
    }
}

/// Registry persisted as one JSON map file, `slot -> string`
///
/// Each `set`/`remove` loads the map, applies the change and writes the
/// whole file back. A process-wide lock serializes those cycles.
#[derive(Debug)]
pub struct PrefsFileRegistry {
    path: PathBuf,
    lock: Mutex<()>,
}

impl PrefsFileRegistry {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            lock: Mutex::new(()),
        }
    }

    /// `prefs.json` inside `dir`
    pub fn in_dir(dir: &Path) -> Self {
        Self::new(dir.join("prefs.json"))
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn load_map(&self) -> Result<HashMap<String, String>, PersistError> {
        let contents = match fs::read_to_string(&self.path) {
            Ok(contents) => contents,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(HashMap::new()),
            Err(e) => return Err(PersistError::io(self.path.display().to_string(), e)),
        };

        if contents.trim().is_empty() {
            return Ok(HashMap::new());
        }

        serde_json::from_str(&contents)
            .map_err(|e| PersistError::Registry(format!("failed to parse prefs file: {e}")))
    }

    fn save_map(&self, map: &HashMap<String, String>) -> Result<(), PersistError> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent)
                .map_err(|e| PersistError::io(parent.display().to_string(), e))?;
        }

        let contents = serde_json::to_string_pretty(map).map_err(PersistError::Encode)?;
        fs::write(&self.path, contents)
            .map_err(|e| PersistError::io(self.path.display().to_string(), e))?;
        debug!(path = %self.path.display(), slots = map.len(), "wrote prefs file");
        Ok(())
    }

    /// Load, modify and save back; the modifier returns whether anything changed
    fn modify<F>(&self, modifier: F) -> Result<bool, PersistError>
    where
        F: FnOnce(&mut HashMap<String, String>) -> bool,
    {
        let _guard = self.lock.lock().unwrap_or_else(|e| e.into_inner());
        let mut map = self.load_map()?;
        let modified = modifier(&mut map);

        if modified {
            self.save_map(&map)?;
        }

        Ok(modified)
    }
}

impl Registry for PrefsFileRegistry {
    fn get(&self, slot: &str) -> Result<Option<String>, PersistError> {
        let _guard = self.lock.lock().unwrap_or_else(|e| e.into_inner());
        Ok(self.load_map()?.remove(slot))
    }

    fn set(&self, slot: &str, value: &str) -> Result<(), PersistError> {
        self.modify(|map| {
            map.insert(slot.to_string(), value.to_string());
            true
        })
        .map(|_| ())
    }

    fn remove(&self, slot: &str) -> Result<(), PersistError> {
        self.modify(|map| map.remove(slot).is_some()).map(|_| ())
    }

    fn contains(&self, slot: &str) -> bool {
        self.get(slot).map(|v| v.is_some()).unwrap_or(false)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn registry_backend_uses_single_slot() {
        let registry = Arc::new(MemoryRegistry::default());
        registry.set("other", "keep me").unwrap();
        let backend = RegistryBackend::new(registry.clone(), "SaveData");

        assert!(!backend.exists());
        backend.write("{\"a\":1}").unwrap();
        assert!(backend.exists());
        assert_eq!(backend.read().unwrap().as_deref(), Some("{\"a\":1}"));

        backend.delete().unwrap();
        backend.delete().unwrap();
        assert!(!backend.exists());
        assert_eq!(registry.get("other").unwrap().as_deref(), Some("keep me"));
    }

    #[test]
    fn prefs_file_survives_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let prefs = PrefsFileRegistry::in_dir(dir.path());
        prefs.set("SaveData", "blob").unwrap();
        prefs.set("volume", "0.8").unwrap();
        prefs.remove("volume").unwrap();

        let reopened = PrefsFileRegistry::in_dir(dir.path());
        assert_eq!(reopened.get("SaveData").unwrap().as_deref(), Some("blob"));
        assert!(!reopened.contains("volume"));
    }

    #[test]
    fn removing_missing_slot_does_not_create_file() {
        let dir = tempfile::tempdir().unwrap();
        let prefs = PrefsFileRegistry::in_dir(dir.path());
        prefs.remove("nothing").unwrap();
        assert!(!prefs.path().exists());
    }

    #[test]
    fn corrupt_prefs_file_is_a_registry_error() {
        let dir = tempfile::tempdir().unwrap();
        let prefs = PrefsFileRegistry::in_dir(dir.path());
        fs::write(prefs.path(), "{not json").unwrap();
        assert!(matches!(prefs.get("x"), Err(PersistError::Registry(_))));
    }
}
