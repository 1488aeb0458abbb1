//! OBD-II Data Logger
//!
//! Polls vehicle PIDs over an OBD-II link on a three-tier schedule, writes
//! decoded samples to per-session logs and recovers from link and storage
//! failures without operator intervention.

mod config;
mod logger;

pub use config::{ConfigError, LoggerConfig, MOCK_DEVICE};
pub use logger::{DataLogger, LoggerStats, TickOutcome};

use obd_protocol::LinkDriver;
use obd_scheduler::SchedulerError;
use storage::StorageDriver;
use tracing::subscriber::SetGlobalDefaultError;
use tracing::Level;
use tracing_subscriber::FmtSubscriber;

/// Initialize logging
pub fn init_logging(level: Level) -> Result<(), SetGlobalDefaultError> {
    let subscriber = FmtSubscriber::builder()
        .with_max_level(level)
        .with_target(true)
        .finish();

    tracing::subscriber::set_global_default(subscriber)
}

/// Build a logger over `link` and `storage` and run it forever
pub async fn run_logger<L, D>(link: L, storage: D, config: &LoggerConfig) -> Result<(), SchedulerError>
where
    L: LinkDriver,
    D: StorageDriver,
{
    let mut logger = DataLogger::new(link, storage, config)?;
    logger.run().await;
    Ok(())
}
