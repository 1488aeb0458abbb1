//! OBD-II Data Logger - Main Entry Point

use anyhow::Context;
use datalogger::{init_logging, run_logger, LoggerConfig};
use obd_protocol::{Elm327, MockLink};
use storage::FsStorage;
use tracing::info;

#[tokio::main(flavor = "current_thread")]
async fn main() -> anyhow::Result<()> {
    let config = LoggerConfig::load().context("loading configuration")?;
    init_logging(config.level()?).context("installing log subscriber")?;

    info!("=== OBD-II Data Logger v{} ===", env!("CARGO_PKG_VERSION"));
    info!(
        "Link: {}, storage: {} ({:?})",
        config.device,
        config.storage_root.display(),
        config.log_format
    );

    let storage = FsStorage::new(&config.storage_root, config.log_format.extension());
    if config.is_mock() {
        run_logger(MockLink::new(), storage, &config).await?;
    } else {
        let mut link = Elm327::new(&config.device, config.baud_rate);
        link.set_protocol(config.protocol);
        link.set_timeout(config.response_timeout());
        run_logger(link, storage, &config).await?;
    }

    Ok(())
}
