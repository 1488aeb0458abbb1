//! In-memory storage driver

use crate::{StorageDriver, StorageError};
use std::collections::BTreeMap;
use tracing::debug;

/// Contents of one in-memory session log
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MemorySessionLog {
    /// Bytes that reached the medium
    pub flushed: Vec<u8>,
    /// Bytes appended since the last flush
    pub buffered: Vec<u8>,
    /// Flush calls on this session
    pub flushes: usize,
    /// Whether the session was closed
    pub closed: bool,
}

/// Storage driver keeping session logs in memory, with fault switches
#[derive(Debug)]
pub struct MemoryStorage {
    medium_present: bool,
    mount_fails: bool,
    writes_fail: bool,
    mounts: usize,
    sessions: BTreeMap<u32, MemorySessionLog>,
}

impl MemoryStorage {
    /// Create a healthy in-memory medium
    pub fn new() -> Self {
        debug!("Creating in-memory storage");
        Self {
            medium_present: true,
            mount_fails: false,
            writes_fail: false,
            mounts: 0,
            sessions: BTreeMap::new(),
        }
    }

    /// Insert or remove the medium
    pub fn set_medium_present(&mut self, present: bool) {
        self.medium_present = present;
    }

    /// Make volume mounts fail
    pub fn set_mount_fails(&mut self, fails: bool) {
        self.mount_fails = fails;
    }

    /// Make appends and flushes fail
    pub fn set_writes_fail(&mut self, fails: bool) {
        self.writes_fail = fails;
    }

    /// Successful mounts so far
    pub fn mounts(&self) -> usize {
        self.mounts
    }

    /// Log of session `index`, if it was ever opened
    pub fn session(&self, index: u32) -> Option<&MemorySessionLog> {
        self.sessions.get(&index)
    }

    /// Indices of every session opened
    pub fn session_indices(&self) -> Vec<u32> {
        self.sessions.keys().copied().collect()
    }

    fn log_mut(&mut self, index: u32) -> Result<&mut MemorySessionLog, StorageError> {
        if self.writes_fail || !self.medium_present {
            return Err(StorageError::io(
                format!("memory/{}", index),
                std::io::ErrorKind::BrokenPipe.into(),
            ));
        }
        self.sessions.get_mut(&index).ok_or(StorageError::NoSession)
    }
}

impl Default for MemoryStorage {
    fn default() -> Self {
        Self::new()
    }
}

impl StorageDriver for MemoryStorage {
    type Session = u32;

    fn probe_medium(&mut self) -> bool {
        self.medium_present
    }

    fn mount_volume(&mut self) -> Result<(), StorageError> {
        if self.mount_fails {
            return Err(StorageError::MountFailed("memory volume".to_string()));
        }
        self.mounts += 1;
        Ok(())
    }

    fn next_free_index(&self) -> u32 {
        self.sessions
            .keys()
            .next_back()
            .map_or(0, |last| last.saturating_add(1))
    }

    fn open_session(&mut self, index: u32) -> Result<u32, StorageError> {
        if !self.medium_present {
            return Err(StorageError::MediumAbsent("memory".to_string()));
        }
        self.sessions.entry(index).or_default().closed = false;
        Ok(index)
    }

    fn append(&mut self, session: &mut u32, bytes: &[u8]) -> Result<(), StorageError> {
        self.log_mut(*session)?.buffered.extend_from_slice(bytes);
        Ok(())
    }

    fn flush(&mut self, session: &mut u32) -> Result<(), StorageError> {
        let log = self.log_mut(*session)?;
        let pending = std::mem::take(&mut log.buffered);
        log.flushed.extend_from_slice(&pending);
        log.flushes += 1;
        Ok(())
    }

    fn close(&mut self, mut session: u32) -> Result<(), StorageError> {
        self.flush(&mut session)?;
        self.log_mut(session)?.closed = true;
        Ok(())
    }
}
