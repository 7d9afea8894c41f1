//! Durable locations for the save blob
//!
//! A backend owns exactly one bucket (a registry slot or a file) and moves
//! the whole encoded store in and out of it. There is no per-key storage:
//! every write replaces the previous blob.

mod file;
mod registry;

pub use file::FileBackend;
pub use registry::{MemoryRegistry, PrefsFileRegistry, Registry, RegistryBackend};

use crate::error::PersistError;
use crate::settings::{BackendKind, Settings};
use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;

/// Storage medium for one encoded store
pub trait Backend: Send + Sync + fmt::Debug {
    fn kind(&self) -> BackendKind;

    /// Human-readable location, used in logs and errors
    fn location(&self) -> String;

    /// Replace the stored blob
    fn write(&self, blob: &str) -> Result<(), PersistError>;

    /// Read the stored blob, `Ok(None)` if nothing was ever written
    fn read(&self) -> Result<Option<String>, PersistError>;

    /// Remove the stored blob; removing nothing succeeds
    fn delete(&self) -> Result<(), PersistError>;

    fn exists(&self) -> bool;
}

/// Everything a backend may need besides the settings
#[derive(Clone)]
pub struct BackendContext {
    pub data_dir: PathBuf,
    pub registry: Arc<dyn Registry>,
}

impl fmt::Debug for BackendContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BackendContext")
            .field("data_dir", &self.data_dir)
            .finish_non_exhaustive()
    }
}

/// Bind a backend to the bucket named by `settings`
pub fn create_backend(settings: &Settings, context: &BackendContext) -> Arc<dyn Backend> {
    match settings.backend {
        BackendKind::Registry => Arc::new(RegistryBackend::new(
            Arc::clone(&context.registry),
            settings.registry_key.clone(),
        )),
        BackendKind::File => Arc::new(FileBackend::new(settings.file_path(&context.data_dir))),
    }
}
