//! The save/load orchestrator
//!
//! [`SaveService`] is a cheap, cloneable handle. All clones share one store,
//! one backend/codec pairing, one component registry and one scheduler.
//!
//! Writes are write-behind: [`SaveService::save`] only touches memory and a
//! flush ([`SaveService::save_all`]) moves the whole store to the backend.
//! [`SaveService::save_direct`] is the write-through variant.
//!
//! Failures never reach the caller of the plain operations. They are logged
//! and handed to the observer installed with
//! [`SaveServiceBuilder::with_observer`]; the `try_*` operations return them.
//!
//! Lock order: `gate` -> `flush` -> `state`. The component and scheduler
//! locks are never held while calling into components or other locks.

use crate::app_name::AppName;
use crate::backend::{Backend, BackendContext, PrefsFileRegistry, Registry, create_backend};
use crate::clock::{Clock, SystemClock};
use crate::codec::Codec;
use crate::component::{ComponentRegistry, SaveableComponent};
use crate::error::{ErrorKind, Observer, PersistError};
use crate::scheduler::{AutoSaveScheduler, LifecycleEvent};
use crate::settings::{Settings, SettingsSource};
use crate::store::{LAST_SAVE_KEY, Store, encode_value};
use chrono::{DateTime, Utc};
use serde::Serialize;
use serde::de::DeserializeOwned;
use std::fmt;
use std::panic::{AssertUnwindSafe, catch_unwind};
use std::path::PathBuf;
use std::sync::{Arc, Mutex, MutexGuard};
use std::thread::{self, ThreadId};
use std::time::Duration;
use tokio::runtime::Handle;
use tracing::{debug, error, info, warn};

/// Lifecycle of a [`SaveService`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Uninitialized,
    Initializing,
    Ready,
    Disposing,
}

/// Backend and codec bound from the active settings
#[derive(Clone)]
struct Engine {
    settings: Arc<Settings>,
    backend: Arc<dyn Backend>,
    codec: Codec,
}

struct State {
    phase: Phase,
    store: Store,
    engine: Option<Engine>,
    initializing_on: Option<ThreadId>,
}

struct Inner {
    app_name: AppName,
    data_dir: PathBuf,
    source: SettingsSource,
    registry: Arc<dyn Registry>,
    clock: Arc<dyn Clock>,
    observer: Option<Observer>,
    runtime: Option<Handle>,
    gate: Mutex<()>,
    flush: Mutex<()>,
    state: Mutex<State>,
    components: Mutex<ComponentRegistry>,
    scheduler: Mutex<AutoSaveScheduler>,
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|e| e.into_inner())
}

/// Configures and builds a [`SaveService`]
///
/// # Example
///
/// ```
/// use savestate::{AppName, SaveService, Settings};
///
/// let dir = std::env::temp_dir().join("savestate-doc-builder");
/// let service = SaveService::builder(AppName::new("com", "example", "game"))
///     .with_data_dir(&dir)
///     .with_settings(Settings::default())
///     .build();
/// assert!(!service.is_initialized());
/// ```
pub struct SaveServiceBuilder {
    app_name: AppName,
    data_dir: Option<PathBuf>,
    source: Option<SettingsSource>,
    registry: Option<Arc<dyn Registry>>,
    clock: Option<Arc<dyn Clock>>,
    observer: Option<Observer>,
    runtime: Option<Handle>,
}

impl SaveServiceBuilder {
    fn new(app_name: AppName) -> Self {
        Self {
            app_name,
            data_dir: None,
            source: None,
            registry: None,
            clock: None,
            observer: None,
            runtime: None,
        }
    }

    /// Keep save files, prefs and the default settings file under `dir`
    pub fn with_data_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.data_dir = Some(dir.into());
        self
    }

    /// Use these settings instead of reading a file
    pub fn with_settings(mut self, settings: Settings) -> Self {
        self.source = Some(SettingsSource::Inline(settings));
        self
    }

    /// Read settings from this TOML file at initialization
    pub fn with_settings_file(mut self, path: impl Into<PathBuf>) -> Self {
        self.source = Some(SettingsSource::File(path.into()));
        self
    }

    /// Read settings from `source` at initialization
    pub fn with_settings_source(mut self, source: SettingsSource) -> Self {
        self.source = Some(source);
        self
    }

    /// Host registry backing the registry backend
    pub fn with_registry(mut self, registry: Arc<dyn Registry>) -> Self {
        self.registry = Some(registry);
        self
    }

    /// Time source for flush timestamps, defaults to the wall clock
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = Some(clock);
        self
    }

    /// Receive every error the service swallows
    pub fn with_observer<F>(mut self, observer: F) -> Self
    where
        F: Fn(&PersistError) + Send + Sync + 'static,
    {
        self.observer = Some(Arc::new(observer));
        self
    }

    /// Runtime for the auto-save timer, defaults to the ambient one
    pub fn with_runtime(mut self, runtime: Handle) -> Self {
        self.runtime = Some(runtime);
        self
    }

    /// Finish configuration; nothing is read until the service initializes
    pub fn build(self) -> SaveService {
        let (data_dir, config_dir) = match self.data_dir {
            Some(dir) => (dir.clone(), dir),
            None => (self.app_name.data_dir(), self.app_name.config_dir()),
        };

        let source = self
            .source
            .unwrap_or_else(|| SettingsSource::File(config_dir.join("savestate.toml")));
        let registry = self
            .registry
            .unwrap_or_else(|| Arc::new(PrefsFileRegistry::in_dir(&config_dir)));

        SaveService {
            inner: Arc::new(Inner {
                app_name: self.app_name,
                data_dir,
                source,
                registry,
                clock: self.clock.unwrap_or_else(|| Arc::new(SystemClock)),
                observer: self.observer,
                runtime: self.runtime,
                gate: Mutex::new(()),
                flush: Mutex::new(()),
                state: Mutex::new(State {
                    phase: Phase::Uninitialized,
                    store: Store::new(),
                    engine: None,
                    initializing_on: None,
                }),
                components: Mutex::new(ComponentRegistry::default()),
                scheduler: Mutex::new(AutoSaveScheduler::default()),
            }),
        }
    }
}

/// Handle to a save service instance
#[derive(Clone)]
pub struct SaveService {
    inner: Arc<Inner>,
}

impl fmt::Debug for SaveService {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SaveService")
            .field("app_name", &self.inner.app_name)
            .field("phase", &self.phase())
            .finish_non_exhaustive()
    }
}

impl SaveService {
    /// Service with platform default directories and settings file
    pub fn new(app_name: AppName) -> Self {
        Self::builder(app_name).build()
    }

    /// Start configuring a service for `app_name`
    pub fn builder(app_name: AppName) -> SaveServiceBuilder {
        SaveServiceBuilder::new(app_name)
    }

    fn state(&self) -> MutexGuard<'_, State> {
        lock(&self.inner.state)
    }

    fn engine(&self) -> Option<Engine> {
        self.state().engine.clone()
    }

    fn report(&self, context: &str, err: &PersistError) {
        match err.kind() {
            ErrorKind::BackendIo | ErrorKind::Encode | ErrorKind::Task => {
                error!(error = %err, "{context}")
            }
            _ => warn!(error = %err, "{context}"),
        }
        if let Some(observer) = &self.inner.observer {
            observer(err);
        }
    }

    /// Current lifecycle phase
    pub fn phase(&self) -> Phase {
        self.state().phase
    }

    /// Whether the service is ready for use without auto-initializing
    pub fn is_initialized(&self) -> bool {
        self.phase() == Phase::Ready
    }

    /// Settings bound at initialization
    pub fn settings(&self) -> Option<Arc<Settings>> {
        self.engine().map(|engine| engine.settings)
    }

    /// Where the save blob lives, once initialized
    pub fn backend_location(&self) -> Option<String> {
        self.engine().map(|engine| engine.backend.location())
    }

    /// Period of the running auto-save timer
    pub fn auto_save_period(&self) -> Option<Duration> {
        let scheduler = lock(&self.inner.scheduler);
        scheduler.is_running().then(|| scheduler.period()).flatten()
    }

    // -- lifecycle ---------------------------------------------------------

    /// Returns true when the caller must initialize before touching the store
    fn needs_init(&self, operation: &'static str) -> bool {
        let (phase, initializing_on) = {
            let state = self.state();
            (state.phase, state.initializing_on)
        };
        match phase {
            Phase::Ready | Phase::Disposing => false,
            Phase::Initializing => initializing_on != Some(thread::current().id()),
            Phase::Uninitialized => {
                self.report(
                    "auto-initializing save service",
                    &PersistError::NotInitialized { operation },
                );
                true
            }
        }
    }

    fn ensure_ready(&self, operation: &'static str) {
        if self.needs_init(operation) {
            self.initialize();
        }
    }

    async fn ensure_ready_async(&self, operation: &'static str) {
        if self.needs_init(operation) {
            self.initialize_async().await;
        }
    }

    fn ambient_runtime(&self) -> Option<Handle> {
        self.inner
            .runtime
            .clone()
            .or_else(|| Handle::try_current().ok())
    }

    /// Load settings, bind the backend, load the store and arm auto-save
    ///
    /// Calling it on a ready service does nothing.
    pub fn initialize(&self) {
        self.initialize_on(self.ambient_runtime());
    }

    /// [`initialize`](Self::initialize) with the I/O on a blocking worker
    pub async fn initialize_async(&self) {
        let runtime = self.ambient_runtime();
        let service = self.clone();
        if let Err(e) = tokio::task::spawn_blocking(move || service.initialize_on(runtime)).await
        {
            self.report("initialization task failed", &e.into());
        }
    }

    fn initialize_on(&self, runtime: Option<Handle>) {
        let _gate = lock(&self.inner.gate);
        {
            let mut state = self.state();
            if state.phase == Phase::Ready {
                debug!("save service already initialized");
                return;
            }
            state.phase = Phase::Initializing;
            state.initializing_on = Some(thread::current().id());
        }

        let settings = Arc::new(self.load_settings());
        let context = BackendContext {
            data_dir: self.inner.data_dir.clone(),
            registry: Arc::clone(&self.inner.registry),
        };
        let engine = Engine {
            backend: create_backend(&settings, &context),
            codec: Codec::from_settings(&settings),
            settings: Arc::clone(&settings),
        };
        info!(
            app = %self.inner.app_name.application,
            location = %engine.backend.location(),
            obfuscated = engine.codec.is_obfuscated(),
            "initializing save service"
        );

        let store = {
            let _flush = lock(&self.inner.flush);
            self.read_store(&engine).unwrap_or_else(|e| {
                self.report("could not load save data; starting fresh", &e);
                Store::new()
            })
        };

        {
            let mut state = self.state();
            state.store = store;
            state.engine = Some(engine);
            state.phase = Phase::Ready;
            state.initializing_on = None;
        }

        self.start_scheduler(&settings, runtime);
        info!("save service ready");
    }

    fn load_settings(&self) -> Settings {
        match self.inner.source.load() {
            Ok(Some(settings)) => settings,
            Ok(None) => {
                warn!("no save settings found; using defaults");
                Settings::default()
            }
            Err(e) => {
                self.report("could not read save settings; using defaults", &e);
                Settings::default()
            }
        }
    }

    fn start_scheduler(&self, settings: &Settings, runtime: Option<Handle>) {
        let mut scheduler = lock(&self.inner.scheduler);
        scheduler.stop();
        if !settings.wants_scheduler() {
            return;
        }
        scheduler.arm(settings);

        let Some(period) = settings.auto_save_interval() else {
            return;
        };
        let Some(runtime) = runtime else {
            warn!("no tokio runtime available; periodic auto-save disabled");
            return;
        };

        let target = Arc::downgrade(&self.inner);
        scheduler.start(&runtime, period, move || {
            let service = SaveService {
                inner: target.upgrade()?,
            };
            Some(async move {
                // Ticks never revive a disposed service.
                if service.phase() != Phase::Ready {
                    return;
                }
                debug!("periodic auto-save");
                service.save_all_async().await;
            })
        });
    }

    /// Flush components and store, then release everything
    ///
    /// Waits for an in-flight flush to finish first. Safe to call on an
    /// uninitialized service, and never panics because of a component.
    pub fn dispose(&self) {
        let _gate = lock(&self.inner.gate);
        {
            let mut state = self.state();
            if state.phase != Phase::Ready {
                debug!("dispose on uninitialized save service ignored");
                return;
            }
            state.phase = Phase::Disposing;
        }

        lock(&self.inner.scheduler).stop();

        let components = lock(&self.inner.components).drain();
        for component in components.iter().filter(|c| c.auto_save()) {
            self.run_component(component.as_ref(), "save", |c| c.save(self));
        }

        if let Err(e) = self.write_snapshot() {
            self.report("final flush failed; unsaved changes are lost", &e);
        }

        {
            let mut state = self.state();
            state.store.clear();
            state.engine = None;
            state.phase = Phase::Uninitialized;
        }
        info!("save service disposed");
    }

    /// [`dispose`](Self::dispose) on a blocking worker
    pub async fn dispose_async(&self) {
        let service = self.clone();
        if let Err(e) = tokio::task::spawn_blocking(move || service.dispose()).await {
            self.report("dispose task failed", &e.into());
        }
    }

    // -- single keys -------------------------------------------------------

    /// Store `value` under `key` in memory; durable after the next flush
    pub fn save<T: Serialize + ?Sized>(&self, key: &str, value: &T) {
        self.store_value(key, value);
    }

    /// Returns whether the value made it into the store
    fn store_value<T: Serialize + ?Sized>(&self, key: &str, value: &T) -> bool {
        if key == LAST_SAVE_KEY {
            warn!(key, "refusing to overwrite the reserved timestamp key");
            return false;
        }
        self.ensure_ready("save");

        match encode_value(key, value) {
            Ok(value) => {
                self.state().store.insert(key, value);
                true
            }
            Err(e) => {
                self.report("value not saved", &e);
                false
            }
        }
    }

    /// Store `value` and flush immediately
    ///
    /// Nothing is flushed when the value was refused.
    pub fn save_direct<T: Serialize + ?Sized>(&self, key: &str, value: &T) {
        if self.store_value(key, value) {
            self.save_all();
        }
    }

    /// Value under `key` as `T`, or `default` when absent or unconvertible
    pub fn load<T: DeserializeOwned>(&self, key: &str, default: T) -> T {
        match self.try_load(key) {
            Ok(Some(value)) => value,
            Ok(None) => default,
            Err(e) => {
                self.report("returning default value", &e);
                default
            }
        }
    }

    /// Strict form of [`load`](Self::load)
    pub fn try_load<T: DeserializeOwned>(&self, key: &str) -> Result<Option<T>, PersistError> {
        self.ensure_ready("load");
        self.state().store.get_as(key)
    }

    /// Whether `key` is present in memory
    pub fn has_data(&self, key: &str) -> bool {
        self.ensure_ready("has_data");
        self.state().store.contains(key)
    }

    /// Remove `key` from memory; no flush
    pub fn delete_data(&self, key: &str) {
        if key == LAST_SAVE_KEY {
            warn!(key, "refusing to delete the reserved timestamp key");
            return;
        }
        self.ensure_ready("delete_data");
        self.state().store.remove(key);
    }

    /// User keys currently in memory
    pub fn keys(&self) -> Vec<String> {
        self.ensure_ready("keys");
        self.state().store.keys().map(str::to_string).collect()
    }

    /// Time of the last successful flush, from memory
    pub fn last_save_time(&self) -> Option<DateTime<Utc>> {
        self.ensure_ready("last_save_time");
        self.state().store.last_save_time()
    }

    // -- whole store -------------------------------------------------------

    fn read_store(&self, engine: &Engine) -> Result<Store, PersistError> {
        let Some(blob) = engine.backend.read()? else {
            info!(location = %engine.backend.location(), "no save data; fresh start");
            return Ok(Store::new());
        };
        let store = engine.codec.decode(&blob)?;
        debug!(keys = store.len(), "decoded save data");
        Ok(store)
    }

    fn run_component<F>(&self, component: &dyn SaveableComponent, action: &str, f: F)
    where
        F: FnOnce(&dyn SaveableComponent),
    {
        if catch_unwind(AssertUnwindSafe(|| f(component))).is_err() {
            error!(key = component.save_key(), action, "component panicked");
        }
    }

    fn flush_components(&self) {
        let components = lock(&self.inner.components).auto_savers();
        for component in &components {
            self.run_component(component.as_ref(), "save", |c| c.save(self));
        }
    }

    /// Encode and write the current store, stamping it on success
    fn write_snapshot(&self) -> Result<(), PersistError> {
        let _flush = lock(&self.inner.flush);

        let now = self.inner.clock.now();
        let (engine, snapshot) = {
            let state = self.state();
            let Some(engine) = state.engine.clone() else {
                return Err(PersistError::NotInitialized { operation: "save_all" });
            };
            let mut snapshot = state.store.clone();
            snapshot.stamp(now);
            (engine, snapshot)
        };

        let blob = engine.codec.encode(&snapshot)?;
        engine.backend.write(&blob)?;
        self.state().store.stamp(now);

        info!(
            location = %engine.backend.location(),
            keys = snapshot.len(),
            "save data flushed"
        );
        Ok(())
    }

    /// Collect component state and write the whole store to the backend
    ///
    /// A failed write leaves the in-memory store intact for a later retry.
    pub fn save_all(&self) {
        if let Err(e) = self.try_save_all() {
            self.report("flush failed; data kept in memory", &e);
        }
    }

    /// Strict form of [`save_all`](Self::save_all)
    pub fn try_save_all(&self) -> Result<(), PersistError> {
        self.ensure_ready("save_all");
        self.flush_components();
        self.write_snapshot()
    }

    /// [`save_all`](Self::save_all) with encoding and I/O on a blocking worker
    pub async fn save_all_async(&self) {
        if let Err(e) = self.try_save_all_async().await {
            self.report("flush failed; data kept in memory", &e);
        }
    }

    /// Strict form of [`save_all_async`](Self::save_all_async)
    ///
    /// # Errors
    ///
    /// Returns the encode or backend error of the write, or
    /// [`PersistError::Task`] if the blocking worker failed.
    pub async fn try_save_all_async(&self) -> Result<(), PersistError> {
        self.ensure_ready_async("save_all").await;
        self.flush_components();
        let service = self.clone();
        tokio::task::spawn_blocking(move || service.write_snapshot()).await?
    }

    fn replace_store(&self, strict: bool) -> Result<(), PersistError> {
        let Some(engine) = self.engine() else {
            return Err(PersistError::NotInitialized { operation: "load_all" });
        };
        let _flush = lock(&self.inner.flush);

        let store = match self.read_store(&engine) {
            Ok(store) => store,
            Err(e) if strict => return Err(e),
            Err(e) => {
                self.report("could not load save data; starting fresh", &e);
                Store::new()
            }
        };
        self.state().store = store;
        Ok(())
    }

    /// Replace the store with what the backend holds
    ///
    /// Missing or unreadable data leaves an empty store.
    pub fn load_all(&self) {
        self.ensure_ready("load_all");
        if let Err(e) = self.replace_store(false) {
            self.report("load skipped", &e);
        }
    }

    /// Strict form of [`load_all`](Self::load_all); the store is kept on error
    pub fn try_load_all(&self) -> Result<(), PersistError> {
        self.ensure_ready("load_all");
        self.replace_store(true)
    }

    /// [`load_all`](Self::load_all) with the read and decode on a blocking worker
    pub async fn load_all_async(&self) {
        self.ensure_ready_async("load_all").await;
        let service = self.clone();
        match tokio::task::spawn_blocking(move || service.replace_store(false)).await {
            Ok(Ok(())) => {}
            Ok(Err(e)) => self.report("load skipped", &e),
            Err(e) => self.report("load task failed", &e.into()),
        }
    }

    /// Strict form of [`load_all_async`](Self::load_all_async); the store is kept on error
    pub async fn try_load_all_async(&self) -> Result<(), PersistError> {
        self.ensure_ready_async("load_all").await;
        let service = self.clone();
        tokio::task::spawn_blocking(move || service.replace_store(true)).await?
    }

    /// Whether the backend holds a save blob
    pub fn save_data_exists(&self) -> bool {
        self.ensure_ready("save_data_exists");
        self.engine()
            .is_some_and(|engine| engine.backend.exists())
    }

    /// Delete the backend blob and clear memory
    pub fn delete_all_data(&self) {
        if let Err(e) = self.try_delete_all_data() {
            self.report("could not delete save data", &e);
        }
    }

    /// Strict form of [`delete_all_data`](Self::delete_all_data); memory is cleared either way
    pub fn try_delete_all_data(&self) -> Result<(), PersistError> {
        self.ensure_ready("delete_all_data");
        let _flush = lock(&self.inner.flush);
        let result = match self.engine() {
            Some(engine) => engine.backend.delete(),
            None => Err(PersistError::NotInitialized {
                operation: "delete_all_data",
            }),
        };
        self.state().store.clear();
        if result.is_ok() {
            info!("all save data deleted");
        }
        result
    }

    // -- components and triggers ---------------------------------------------

    /// Add a component; loads it right away when it asks for auto-load
    pub fn register_component(&self, component: Arc<dyn SaveableComponent>) {
        self.ensure_ready("register_component");
        if !lock(&self.inner.components).insert(Arc::clone(&component)) {
            debug!(key = component.save_key(), "component already registered");
            return;
        }
        debug!(key = component.save_key(), "component registered");
        if component.auto_load() {
            self.run_component(component.as_ref(), "load", |c| c.load(self));
        }
    }

    /// Remove a component; it saves one last time when it asks for auto-save
    pub fn unregister_component(&self, component: Arc<dyn SaveableComponent>) {
        if !lock(&self.inner.components).remove(&component) {
            return;
        }
        debug!(key = component.save_key(), "component unregistered");
        if component.auto_save() {
            self.run_component(component.as_ref(), "save", |c| c.save(self));
        }
    }

    /// Number of registered components
    pub fn component_count(&self) -> usize {
        lock(&self.inner.components).len()
    }

    /// Forward a host lifecycle event; returns whether it caused a flush
    pub fn notify(&self, event: LifecycleEvent) -> bool {
        let flush = lock(&self.inner.scheduler).should_flush(event);
        if flush {
            debug!(?event, "lifecycle flush");
            self.save_all();
        }
        flush
    }

    /// [`notify`](Self::notify) without blocking the caller on I/O
    pub async fn notify_async(&self, event: LifecycleEvent) -> bool {
        let flush = lock(&self.inner.scheduler).should_flush(event);
        if flush {
            debug!(?event, "lifecycle flush");
            self.save_all_async().await;
        }
        flush
    }
}
