//! Sample sink
//!
//! Appends encoded samples to the open session log and flushes once at
//! least [`FLUSH_THRESHOLD`] unflushed bytes have accumulated, on the same
//! write that crossed the threshold.

use crate::gate::probe_storage;
use crate::{LogFormat, Sample, StorageDriver, StorageError};
use tracing::{debug, info, warn};

/// Unflushed bytes that force a flush
pub const FLUSH_THRESHOLD: usize = 1024;

/// Running totals for the current session
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SinkStats {
    pub samples_written: u64,
    pub bytes_written: u64,
    pub flushes: u64,
}

/// Writes samples to durable storage
pub struct SampleSink<D: StorageDriver> {
    driver: D,
    format: LogFormat,
    /// Last storage probe succeeded and no write has failed since
    ready: bool,
    /// Log index of session 0, fixed at the first successful probe
    log_base: Option<u32>,
    session: Option<(u32, D::Session)>,
    /// Bytes written since the last flush
    write_cursor: usize,
    last_timestamp_ms: Option<u64>,
    stats: SinkStats,
}

impl<D: StorageDriver> SampleSink<D> {
    pub fn new(driver: D, format: LogFormat) -> Self {
        Self {
            driver,
            format,
            ready: false,
            log_base: None,
            session: None,
            write_cursor: 0,
            last_timestamp_ms: None,
            stats: SinkStats::default(),
        }
    }

    /// Run the storage gate; logging is possible only after this returns true
    pub fn probe(&mut self) -> bool {
        self.ready = probe_storage(&mut self.driver);
        if self.ready && self.log_base.is_none() {
            let base = self.driver.next_free_index();
            info!("Session logs start at index {}", base);
            self.log_base = Some(base);
        }
        self.ready
    }

    pub fn is_ready(&self) -> bool {
        self.ready
    }

    pub fn has_session(&self) -> bool {
        self.session.is_some()
    }

    /// Index of the open session
    pub fn session_index(&self) -> Option<u32> {
        self.session.as_ref().map(|(index, _)| *index)
    }

    /// Medium log index backing session `index`, once the medium has been seen
    pub fn log_index(&self, index: u32) -> Option<u32> {
        self.log_base.map(|base| base.saturating_add(index))
    }

    /// Bytes written since the last flush
    pub fn write_cursor(&self) -> usize {
        self.write_cursor
    }

    /// Totals for the current session
    pub fn stats(&self) -> SinkStats {
        self.stats
    }

    pub fn format(&self) -> LogFormat {
        self.format
    }

    pub fn driver(&self) -> &D {
        &self.driver
    }

    pub fn driver_mut(&mut self) -> &mut D {
        &mut self.driver
    }

    /// Open the log for session `index`, closing any open one first.
    /// Reopening a session appends to its log.
    pub fn open_session(&mut self, index: u32) -> Result<(), StorageError> {
        let Some(log_index) = self.log_index(index).filter(|_| self.ready) else {
            return Err(StorageError::NotReady);
        };
        self.close_session();
        match self.driver.open_session(log_index) {
            Ok(session) => {
                info!("Logging session {} to log {}", index, log_index);
                self.session = Some((index, session));
                self.write_cursor = 0;
                self.last_timestamp_ms = None;
                self.stats = SinkStats::default();
                Ok(())
            }
            Err(e) => {
                self.mark_unavailable(&e);
                Err(e)
            }
        }
    }

    /// Flush and close the open session, if any
    pub fn close_session(&mut self) {
        let Some((index, session)) = self.session.take() else {
            return;
        };
        self.write_cursor = 0;
        match self.driver.close(session) {
            Ok(()) => info!(
                "Closed session {} ({} samples, {} bytes)",
                index, self.stats.samples_written, self.stats.bytes_written
            ),
            Err(e) => self.mark_unavailable(&e),
        }
    }

    /// Append one sample. Returns `Ok(false)` when no session is open.
    pub fn record(&mut self, sample: &Sample) -> Result<bool, StorageError> {
        let Some((_, session)) = self.session.as_mut() else {
            return Ok(false);
        };
        if let Some(last) = self.last_timestamp_ms {
            if sample.timestamp_ms < last {
                warn!(
                    "Dropping out-of-order sample at {}ms (last {}ms)",
                    sample.timestamp_ms, last
                );
                return Ok(false);
            }
        }

        let bytes = self.format.encode(sample)?;
        if let Err(e) = self.driver.append(session, &bytes) {
            self.mark_unavailable(&e);
            return Err(e);
        }
        self.write_cursor += bytes.len();
        self.last_timestamp_ms = Some(sample.timestamp_ms);
        self.stats.samples_written += 1;
        self.stats.bytes_written += bytes.len() as u64;

        if self.write_cursor >= FLUSH_THRESHOLD {
            if let Err(e) = self.driver.flush(session) {
                self.mark_unavailable(&e);
                return Err(e);
            }
            debug!("Flushed {} bytes", self.write_cursor);
            self.write_cursor = 0;
            self.stats.flushes += 1;
        }
        Ok(true)
    }

    fn mark_unavailable(&mut self, err: &StorageError) {
        warn!("Storage unavailable, logging suspended: {}", err);
        self.session = None;
        self.ready = false;
        self.write_cursor = 0;
    }
}
