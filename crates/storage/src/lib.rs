//! Storage Layer
//!
//! Durable session logs for decoded samples: the storage driver boundary,
//! the storage gate that decides whether logging is possible, and the
//! sample sink that appends and flushes.

mod driver;
mod fs;
mod gate;
mod memory;
mod sample;
mod sink;

pub use driver::StorageDriver;
pub use fs::{FsSession, FsStorage, DATA_DIR};
pub use gate::probe_storage;
pub use memory::{MemorySessionLog, MemoryStorage};
pub use sample::{LogFormat, LogRecord, Sample};
pub use sink::{SampleSink, SinkStats, FLUSH_THRESHOLD};

use std::path::PathBuf;
use thiserror::Error;

/// Storage errors
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("Storage medium not present: {0}")]
    MediumAbsent(String),
    #[error("Failed to mount log volume: {0}")]
    MountFailed(String),
    #[error("IO error on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("Storage not ready")]
    NotReady,
    #[error("No open session")]
    NoSession,
    #[error("Serialization error: {0}")]
    SerializationError(String),
}

impl StorageError {
    pub(crate) fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        StorageError::Io {
            path: path.into(),
            source,
        }
    }
}
