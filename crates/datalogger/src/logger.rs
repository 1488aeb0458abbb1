//! Top-level data logger
//!
//! Ties the link, the connection state machine, the tiered scheduler and the
//! sample sink together. Every tick performs at most one bus query and at
//! most one storage write. Polling never waits on storage.

use crate::config::LoggerConfig;
use obd_protocol::{LinkDriver, Pid};
use obd_scheduler::{
    CapabilityProber, CapabilityReport, ConnectionManager, RetryOutcome, SchedulerError,
    TieredScheduler,
};
use std::time::Duration;
use storage::{Sample, SampleSink, StorageDriver};
use tokio::time::{Instant, MissedTickBehavior};
use tracing::{info, warn};

/// Pause after an idle tick so a disconnected logger does not spin
const IDLE_PAUSE: Duration = Duration::from_millis(100);

/// What a single tick did
#[derive(Debug, Clone, PartialEq)]
pub enum TickOutcome {
    /// Disconnected and the next retry is not due
    Idle,
    /// Disconnected and the periodic retry failed
    RetryFailed,
    /// Disconnected and the periodic retry brought the link up
    Connected { session: u32 },
    /// A PID was decoded; `logged` tells whether it reached storage
    Sampled { sample: Sample, logged: bool },
    /// A query failed below the reconnect threshold
    QueryFailed { pid: Pid, consecutive: u32 },
    /// The reconnect threshold was hit and the link has been restored
    Reconnected { session: u32 },
}

/// Lifetime counters
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct LoggerStats {
    pub ticks: u64,
    pub queries: u64,
    pub samples: u64,
    pub samples_logged: u64,
    pub query_failures: u64,
    pub storage_errors: u64,
    pub reconnects: u64,
}

/// The telemetry logger
pub struct DataLogger<L: LinkDriver, D: StorageDriver> {
    link: L,
    connection: ConnectionManager,
    scheduler: TieredScheduler,
    prober: CapabilityProber,
    sink: SampleSink<D>,
    capabilities: Option<CapabilityReport>,
    storage_reprobe: Duration,
    tick_interval: Duration,
    last_storage_probe: Instant,
    started: Instant,
    stats: LoggerStats,
}

impl<L: LinkDriver, D: StorageDriver> DataLogger<L, D> {
    /// Create a logger; nothing touches the link or the medium until [`setup`](Self::setup)
    pub fn new(link: L, storage: D, config: &LoggerConfig) -> Result<Self, SchedulerError> {
        let now = Instant::now();
        Ok(Self {
            link,
            connection: ConnectionManager::new(),
            scheduler: TieredScheduler::new(config.tiers.clone())?,
            prober: CapabilityProber::new(config.capability_pids.clone()),
            sink: SampleSink::new(storage, config.log_format),
            capabilities: None,
            storage_reprobe: config.storage_reprobe(),
            tick_interval: config.tick_interval(),
            last_storage_probe: now,
            started: now,
            stats: LoggerStats::default(),
        })
    }

    /// Probe storage, acquire the link (bounded), probe capabilities and open the session
    pub async fn setup(&mut self) {
        info!("Setting up data logger");
        self.probe_storage();
        if self.connection.acquire(&mut self.link).await {
            self.on_connected().await;
        }
    }

    /// Run one tick
    pub async fn tick(&mut self) -> TickOutcome {
        self.stats.ticks += 1;

        if !self.connection.is_connected() {
            return match self.connection.poll_disconnected(&mut self.link).await {
                RetryOutcome::NotDue => TickOutcome::Idle,
                RetryOutcome::Failed => TickOutcome::RetryFailed,
                RetryOutcome::Connected => {
                    if !self.sink.is_ready() {
                        self.probe_storage();
                    }
                    self.on_connected().await;
                    TickOutcome::Connected {
                        session: self.connection.session_index(),
                    }
                }
            };
        }

        self.reprobe_storage_if_due();

        let pid = self.scheduler.next_metric();
        self.stats.queries += 1;
        match self.link.query(pid).await {
            Ok(response) => {
                self.connection.record_success();
                let sample = Sample {
                    pid: response.pid,
                    value: response.value,
                    timestamp_ms: self.elapsed_ms(),
                };
                let logged = match self.sink.record(&sample) {
                    Ok(logged) => logged,
                    Err(_) => {
                        self.stats.storage_errors += 1;
                        false
                    }
                };
                self.stats.samples += 1;
                if logged {
                    self.stats.samples_logged += 1;
                }
                TickOutcome::Sampled { sample, logged }
            }
            Err(e) => {
                self.stats.query_failures += 1;
                let reconnect = self.connection.record_failure();
                let consecutive = self.connection.error_count();
                warn!(
                    "PID {:02X} query failed (attempt {}): {}",
                    pid.as_hex(),
                    consecutive,
                    e
                );
                if reconnect {
                    let session = self.reconnect().await;
                    return TickOutcome::Reconnected { session };
                }
                TickOutcome::QueryFailed { pid, consecutive }
            }
        }
    }

    /// Set up, then tick until the process is stopped
    pub async fn run(&mut self) {
        self.setup().await;

        if self.tick_interval.is_zero() {
            loop {
                if self.tick().await == TickOutcome::Idle {
                    tokio::time::sleep(IDLE_PAUSE).await;
                } else {
                    tokio::task::yield_now().await;
                }
            }
        } else {
            let mut interval = tokio::time::interval(self.tick_interval);
            interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                interval.tick().await;
                self.tick().await;
            }
        }
    }

    /// Close the session, block until the link is back, then set up a fresh session
    async fn reconnect(&mut self) -> u32 {
        self.sink.close_session();
        let session = self.connection.reconnect(&mut self.link).await;
        self.stats.reconnects += 1;
        self.probe_storage();
        self.on_connected().await;
        info!("Reconnected: {:?}", self.stats);
        session
    }

    async fn on_connected(&mut self) {
        let report = self.prober.probe(&mut self.link).await;
        for pid in report.unsupported() {
            if let Some(tier) = self.scheduler.tiers().tier_of(pid) {
                warn!(
                    "{} is scheduled in {:?} but not reported by the vehicle; its failures count toward reconnection",
                    pid, tier
                );
            }
        }
        self.capabilities = Some(report);
        self.open_session();
    }

    fn open_session(&mut self) {
        if !self.sink.is_ready() {
            return;
        }
        if let Err(e) = self.sink.open_session(self.connection.session_index()) {
            warn!("Could not open session log: {}", e);
        }
    }

    fn probe_storage(&mut self) -> bool {
        self.last_storage_probe = Instant::now();
        self.sink.probe()
    }

    fn reprobe_storage_if_due(&mut self) {
        if self.sink.has_session() || self.last_storage_probe.elapsed() < self.storage_reprobe {
            return;
        }
        if self.sink.is_ready() || self.probe_storage() {
            self.open_session();
        }
        // Rate-limit retries even when storage was ready but the open failed
        self.last_storage_probe = Instant::now();
    }

    fn elapsed_ms(&self) -> u64 {
        self.started.elapsed().as_millis() as u64
    }

    pub fn link(&self) -> &L {
        &self.link
    }

    pub fn link_mut(&mut self) -> &mut L {
        &mut self.link
    }

    pub fn sink(&self) -> &SampleSink<D> {
        &self.sink
    }

    pub fn sink_mut(&mut self) -> &mut SampleSink<D> {
        &mut self.sink
    }

    pub fn connection(&self) -> &ConnectionManager {
        &self.connection
    }

    pub fn scheduler(&self) -> &TieredScheduler {
        &self.scheduler
    }

    /// Report from the most recent capability probe
    pub fn capabilities(&self) -> Option<&CapabilityReport> {
        self.capabilities.as_ref()
    }

    pub fn stats(&self) -> LoggerStats {
        self.stats
    }
}
