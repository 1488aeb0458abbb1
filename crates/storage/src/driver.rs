//! Storage driver abstraction

use crate::StorageError;

/// Operations the sample sink needs from the storage medium
pub trait StorageDriver {
    /// Handle to an open session log
    type Session;

    /// Check the physical medium is present
    fn probe_medium(&mut self) -> bool;

    /// Prepare the log volume for writing
    fn mount_volume(&mut self) -> Result<(), StorageError>;

    /// Lowest log index with nothing recorded on the medium, as of the last mount
    fn next_free_index(&self) -> u32;

    /// Open the log for session `index`, appending to it if it already exists
    fn open_session(&mut self, index: u32) -> Result<Self::Session, StorageError>;

    /// Append bytes to a session log
    fn append(&mut self, session: &mut Self::Session, bytes: &[u8]) -> Result<(), StorageError>;

    /// Force buffered bytes onto the medium
    fn flush(&mut self, session: &mut Self::Session) -> Result<(), StorageError>;

    /// Flush and release a session log
    fn close(&mut self, session: Self::Session) -> Result<(), StorageError>;
}
