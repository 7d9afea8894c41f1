#![allow(dead_code)]

use savestate::{
    AppName, BackendKind, ErrorKind, MemoryRegistry, PersistError, Registry, SaveService,
    SaveServiceBuilder, Settings,
};
use std::path::Path;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

pub fn app() -> AppName {
    AppName::new("com", "example", "savestate-tests")
}

/// Settings with every automatic trigger off
pub fn quiet(backend: BackendKind) -> Settings {
    Settings {
        backend,
        pretty_print: false,
        save_on_pause: false,
        save_on_focus_lost: false,
        save_on_quit: false,
        ..Settings::default()
    }
}

pub fn builder(dir: &Path, settings: Settings) -> SaveServiceBuilder {
    SaveService::builder(app())
        .with_data_dir(dir)
        .with_settings(settings)
}

pub fn file_service(dir: &Path) -> SaveService {
    builder(dir, quiet(BackendKind::File)).build()
}

/// Records the kind of every error handed to the observer
#[derive(Clone, Default)]
pub struct Reports(Arc<Mutex<Vec<ErrorKind>>>);

impl Reports {
    pub fn observer(&self) -> impl Fn(&PersistError) + Send + Sync + 'static {
        let seen = Arc::clone(&self.0);
        move |err: &PersistError| seen.lock().unwrap().push(err.kind())
    }

    pub fn kinds(&self) -> Vec<ErrorKind> {
        self.0.lock().unwrap().clone()
    }

    pub fn contains(&self, kind: ErrorKind) -> bool {
        self.kinds().contains(&kind)
    }
}

/// In-memory registry that counts writes and can be told to fail
#[derive(Default)]
pub struct FlakyRegistry {
    inner: MemoryRegistry,
    writes: AtomicUsize,
    failing: AtomicBool,
}

impl FlakyRegistry {
    pub fn writes(&self) -> usize {
        self.writes.load(Ordering::SeqCst)
    }

    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }
}

impl Registry for FlakyRegistry {
    fn get(&self, slot: &str) -> Result<Option<String>, PersistError> {
        self.inner.get(slot)
    }

    fn set(&self, slot: &str, value: &str) -> Result<(), PersistError> {
        if self.failing.load(Ordering::SeqCst) {
            return Err(PersistError::Registry("disk full".to_string()));
        }
        self.inner.set(slot, value)?;
        self.writes.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    fn remove(&self, slot: &str) -> Result<(), PersistError> {
        self.inner.remove(slot)
    }

    fn contains(&self, slot: &str) -> bool {
        self.inner.contains(slot)
    }
}

/// In-memory registry whose writes take a fixed time to land
pub struct SlowRegistry {
    inner: MemoryRegistry,
    delay: Duration,
    writes: AtomicUsize,
}

impl SlowRegistry {
    pub fn new(delay: Duration) -> Self {
        Self {
            inner: MemoryRegistry::default(),
            delay,
            writes: AtomicUsize::new(0),
        }
    }

    pub fn writes(&self) -> usize {
        self.writes.load(Ordering::SeqCst)
    }
}

impl Registry for SlowRegistry {
    fn get(&self, slot: &str) -> Result<Option<String>, PersistError> {
        self.inner.get(slot)
    }

    fn set(&self, slot: &str, value: &str) -> Result<(), PersistError> {
        std::thread::sleep(self.delay);
        self.inner.set(slot, value)?;
        self.writes.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    fn remove(&self, slot: &str) -> Result<(), PersistError> {
        self.inner.remove(slot)
    }

    fn contains(&self, slot: &str) -> bool {
        self.inner.contains(slot)
    }
}
