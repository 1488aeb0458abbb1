//! Filesystem storage driver
//!
//! Session logs live under `<root>/DATA/` as `DAT00000.csv`, `DAT00001.csv`, ...

use crate::{StorageDriver, StorageError};
use std::fs::{self, File, OpenOptions};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use tracing::{debug, info};

/// Directory holding session logs, relative to the storage root
pub const DATA_DIR: &str = "DATA";

/// An open session log file
#[derive(Debug)]
pub struct FsSession {
    path: PathBuf,
    writer: BufWriter<File>,
}

impl FsSession {
    pub fn path(&self) -> &Path {
        &self.path
    }
}

/// Storage driver writing session logs to a mounted filesystem
#[derive(Debug, Clone)]
pub struct FsStorage {
    root: PathBuf,
    extension: String,
    /// One past the highest log index found at the last mount
    next_free: u32,
}

impl FsStorage {
    /// `root` is the mount point of the log medium
    pub fn new(root: impl Into<PathBuf>, extension: &str) -> Self {
        Self {
            root: root.into(),
            extension: extension.to_string(),
            next_free: 0,
        }
    }

    /// Directory session logs are written to
    pub fn data_dir(&self) -> PathBuf {
        self.root.join(DATA_DIR)
    }

    /// Path of the log for session `index`
    pub fn session_path(&self, index: u32) -> PathBuf {
        self.data_dir().join(format!("DAT{:05}.{}", index, self.extension))
    }

    /// Index encoded in a `DATnnnnn.<ext>` file name
    fn log_index(&self, name: &str) -> Option<u32> {
        let stem = name.strip_prefix("DAT")?.strip_suffix(self.extension.as_str())?;
        let digits = stem.strip_suffix('.')?;
        if digits.is_empty() || !digits.bytes().all(|b| b.is_ascii_digit()) {
            return None;
        }
        digits.parse().ok()
    }

    fn scan_next_free(&self, dir: &Path) -> Result<u32, StorageError> {
        let mut next = 0;
        for entry in fs::read_dir(dir).map_err(|e| StorageError::io(dir, e))? {
            let entry = entry.map_err(|e| StorageError::io(dir, e))?;
            if let Some(index) = entry.file_name().to_str().and_then(|n| self.log_index(n)) {
                next = next.max(index.saturating_add(1));
            }
        }
        Ok(next)
    }
}

impl StorageDriver for FsStorage {
    type Session = FsSession;

    fn probe_medium(&mut self) -> bool {
        self.root.is_dir()
    }

    fn mount_volume(&mut self) -> Result<(), StorageError> {
        let dir = self.data_dir();
        fs::create_dir_all(&dir).map_err(|e| StorageError::io(&dir, e))?;

        // A volume that cannot take a write is not mounted
        let probe = dir.join(".probe");
        File::create(&probe)
            .and_then(|mut f| f.write_all(b"ok"))
            .map_err(|e| StorageError::MountFailed(format!("{}: {}", dir.display(), e)))?;
        fs::remove_file(&probe).map_err(|e| StorageError::io(&probe, e))?;

        self.next_free = self.scan_next_free(&dir)?;
        debug!(
            "Log volume mounted at {}, next free log {}",
            dir.display(),
            self.next_free
        );
        Ok(())
    }

    fn next_free_index(&self) -> u32 {
        self.next_free
    }

    fn open_session(&mut self, index: u32) -> Result<FsSession, StorageError> {
        let path = self.session_path(index);
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .map_err(|e| StorageError::io(&path, e))?;
        info!("Opened session log {}", path.display());
        Ok(FsSession {
            path,
            writer: BufWriter::new(file),
        })
    }

    fn append(&mut self, session: &mut FsSession, bytes: &[u8]) -> Result<(), StorageError> {
        session
            .writer
            .write_all(bytes)
            .map_err(|e| StorageError::io(&session.path, e))
    }

    fn flush(&mut self, session: &mut FsSession) -> Result<(), StorageError> {
        session
            .writer
            .flush()
            .and_then(|_| session.writer.get_ref().sync_data())
            .map_err(|e| StorageError::io(&session.path, e))
    }

    fn close(&mut self, mut session: FsSession) -> Result<(), StorageError> {
        self.flush(&mut session)?;
        info!("Closed session log {}", session.path.display());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_missing_root_is_not_present() {
        let mut storage = FsStorage::new("/nonexistent/datalogger/medium", "csv");
        assert!(!storage.probe_medium());
    }

    #[test]
    fn test_session_file_lifecycle() {
        let root = TempDir::new().unwrap();
        let mut storage = FsStorage::new(root.path(), "csv");
        assert!(storage.probe_medium());
        storage.mount_volume().unwrap();
        assert_eq!(storage.next_free_index(), 0);

        let mut session = storage.open_session(7).unwrap();
        assert_eq!(session.path(), root.path().join("DATA").join("DAT00007.csv"));
        storage.append(&mut session, b"1,10C,800\n").unwrap();
        storage.flush(&mut session).unwrap();
        assert_eq!(fs::read(storage.session_path(7)).unwrap(), b"1,10C,800\n");

        storage.append(&mut session, b"2,10D,12\n").unwrap();
        storage.close(session).unwrap();
        assert_eq!(
            fs::read_to_string(storage.session_path(7)).unwrap(),
            "1,10C,800\n2,10D,12\n"
        );
    }

    #[test]
    fn test_reopen_keeps_logged_data() {
        let root = TempDir::new().unwrap();
        let mut storage = FsStorage::new(root.path(), "bin");
        storage.mount_volume().unwrap();

        let mut session = storage.open_session(0).unwrap();
        storage.append(&mut session, b"first").unwrap();
        storage.flush(&mut session).unwrap();
        drop(session);

        let mut session = storage.open_session(0).unwrap();
        storage.append(&mut session, b"+second").unwrap();
        storage.close(session).unwrap();
        assert_eq!(fs::read(storage.session_path(0)).unwrap(), b"first+second");
    }

    #[test]
    fn test_mount_continues_after_existing_logs() {
        let root = TempDir::new().unwrap();
        let mut first_boot = FsStorage::new(root.path(), "csv");
        first_boot.mount_volume().unwrap();
        for index in [0, 1, 4] {
            let mut session = first_boot.open_session(index).unwrap();
            first_boot.append(&mut session, b"1,10C,800.00\n").unwrap();
            first_boot.close(session).unwrap();
        }
        // Logs in another format or with a foreign name do not count
        fs::write(root.path().join("DATA").join("DAT00009.bin"), b"x").unwrap();
        fs::write(root.path().join("DATA").join("DATA.csv"), b"x").unwrap();

        let mut second_boot = FsStorage::new(root.path(), "csv");
        second_boot.mount_volume().unwrap();
        assert_eq!(second_boot.next_free_index(), 5);
        assert_eq!(
            fs::read(second_boot.session_path(0)).unwrap(),
            b"1,10C,800.00\n"
        );
    }
}
