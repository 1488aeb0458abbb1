//! Storage gate

use crate::StorageDriver;
use tracing::{info, warn};

/// Check the medium and mount the log volume. No retries; callers pick the cadence.
pub fn probe_storage<D: StorageDriver + ?Sized>(driver: &mut D) -> bool {
    if !driver.probe_medium() {
        warn!("Storage medium not present, logging disabled");
        return false;
    }
    match driver.mount_volume() {
        Ok(()) => {
            info!("Storage ready");
            true
        }
        Err(e) => {
            warn!("Storage unavailable: {}", e);
            false
        }
    }
}
