//! Error types for the save service
//!
//! Public service operations never return these directly; they log them and
//! hand them to the optional observer. The `try_*` operations return them.

use std::sync::Arc;
use thiserror::Error;

/// Everything that can go wrong while persisting or restoring the store
#[derive(Debug, Error)]
pub enum PersistError {
    /// An operation ran before `initialize` and triggered it implicitly
    #[error("save service used before initialization ({operation})")]
    NotInitialized { operation: &'static str },

    /// Reading or writing the backing medium failed
    #[error("backend I/O failed at {location}: {source}")]
    Io {
        location: String,
        #[source]
        source: std::io::Error,
    },

    /// The host registry rejected an operation
    #[error("registry error: {0}")]
    Registry(String),

    /// The store could not be serialized
    #[error("failed to encode store: {0}")]
    Encode(#[source] serde_json::Error),

    /// The stored blob is corrupt, foreign or was written with another secret
    #[error("failed to decode save data: {0}")]
    Decode(String),

    /// A stored value could not be turned into the requested type
    #[error("cannot convert value for key `{key}`: {source}")]
    Conversion {
        key: String,
        #[source]
        source: serde_json::Error,
    },

    /// Settings could not be read or parsed
    #[error("settings error: {0}")]
    Settings(String),

    /// A background worker panicked or was cancelled
    #[error("background task failed: {0}")]
    Task(String),
}

/// Flat classification of [`PersistError`] for observers
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    NotInitialized,
    BackendIo,
    Encode,
    Decode,
    Conversion,
    Config,
    Task,
}

impl PersistError {
    pub fn io(location: impl Into<String>, source: std::io::Error) -> Self {
        Self::Io {
            location: location.into(),
            source,
        }
    }

    /// Classify this error
    pub fn kind(&self) -> ErrorKind {
        match self {
            PersistError::NotInitialized { .. } => ErrorKind::NotInitialized,
            PersistError::Io { .. } | PersistError::Registry(_) => ErrorKind::BackendIo,
            PersistError::Encode(_) => ErrorKind::Encode,
            PersistError::Decode(_) => ErrorKind::Decode,
            PersistError::Conversion { .. } => ErrorKind::Conversion,
            PersistError::Settings(_) => ErrorKind::Config,
            PersistError::Task(_) => ErrorKind::Task,
        }
    }
}

impl From<tokio::task::JoinError> for PersistError {
    fn from(err: tokio::task::JoinError) -> Self {
        PersistError::Task(err.to_string())
    }
}

/// Callback receiving every error the service swallows
pub type Observer = Arc<dyn Fn(&PersistError) + Send + Sync>;
