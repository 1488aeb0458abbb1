//! Samples and their on-disk encodings

use crate::StorageError;
use obd_protocol::Pid;
use serde::{Deserialize, Serialize};

/// A decoded reading, written once and dropped
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Sample {
    pub pid: Pid,
    pub value: f64,
    /// Milliseconds since the logger started
    pub timestamp_ms: u64,
}

/// Binary log record
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct LogRecord {
    pub timestamp_ms: u64,
    pub pid: u8,
    pub value: f64,
}

impl From<&Sample> for LogRecord {
    fn from(sample: &Sample) -> Self {
        Self {
            timestamp_ms: sample.timestamp_ms,
            pid: sample.pid.as_hex(),
            value: sample.value,
        }
    }
}

/// Session log encoding
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LogFormat {
    /// `timestamp,0x100|pid (hex),value` lines
    #[default]
    Csv,
    /// COBS-framed postcard [`LogRecord`]s
    Postcard,
}

impl LogFormat {
    /// File extension for session logs
    pub fn extension(&self) -> &'static str {
        match self {
            LogFormat::Csv => "csv",
            LogFormat::Postcard => "bin",
        }
    }

    /// Encode one sample
    pub fn encode(&self, sample: &Sample) -> Result<Vec<u8>, StorageError> {
        match self {
            LogFormat::Csv => Ok(format!(
                "{},{:X},{:.2}\n",
                sample.timestamp_ms,
                0x100 | u16::from(sample.pid.as_hex()),
                sample.value
            )
            .into_bytes()),
            LogFormat::Postcard => postcard::to_allocvec_cobs(&LogRecord::from(sample))
                .map_err(|e| StorageError::SerializationError(e.to_string())),
        }
    }
}
