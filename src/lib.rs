//! Save/load service for application state
//!
//! Keeps structured values in memory, flushes them to a durable location on
//! demand or on a schedule, and reloads them on startup.
//!
//! # Features
//!
//! - Write-behind `save`, write-through `save_direct`
//! - Registry slot or file storage, chosen by settings
//! - JSON wire format with optional XOR + base64 obfuscation
//! - Components that save and load themselves during bulk flushes
//! - Periodic and lifecycle-driven auto-save
//! - Failures are logged and reported, never raised to the host
//!
//! # Example
//!
//! ```no_run
//! use savestate::{AppName, BackendKind, SaveService, Settings};
//!
//! let settings = Settings {
//!     backend: BackendKind::File,
//!     ..Settings::default()
//! };
//! let service = SaveService::builder(AppName::new("com", "example", "game"))
//!     .with_settings(settings)
//!     .build();
//!
//! service.initialize();
//! service.save("score", &42);
//! service.save_all();
//!
//! let score: u32 = service.load("score", 0);
//! assert_eq!(score, 42);
//! service.dispose();
//! ```

mod app_name;
pub mod backend;
mod clock;
mod codec;
mod component;
mod error;
pub mod logging;
mod scheduler;
mod service;
mod settings;
mod store;

pub use app_name::AppName;
pub use backend::{
    Backend, BackendContext, FileBackend, MemoryRegistry, PrefsFileRegistry, Registry,
    RegistryBackend, create_backend,
};
pub use clock::{Clock, ManualClock, SystemClock};
pub use codec::Codec;
pub use component::SaveableComponent;
pub use error::{ErrorKind, Observer, PersistError};
pub use scheduler::LifecycleEvent;
pub use service::{Phase, SaveService, SaveServiceBuilder};
pub use settings::{BackendKind, Settings, SettingsSource};
pub use store::{LAST_SAVE_KEY, Store, encode_value};
