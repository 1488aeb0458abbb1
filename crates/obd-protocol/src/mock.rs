//! Simulated link for running without an adapter and for tests

use crate::error::ObdError;
use crate::link::LinkDriver;
use crate::pid::{Pid, PidResponse};
use async_trait::async_trait;
use std::collections::hash_map::DefaultHasher;
use std::collections::{HashSet, VecDeque};
use std::hash::{Hash, Hasher};
use tracing::debug;

/// Simulated vehicle link with scriptable failures
#[derive(Debug, Default)]
pub struct MockLink {
    connected: bool,
    offline: bool,
    /// Outcomes of upcoming `initialize` calls; `true` once exhausted
    init_script: VecDeque<bool>,
    /// Number of upcoming `try_receive` calls that fail
    failing_receives: u32,
    unsupported: HashSet<Pid>,
    pending: Option<Pid>,
    init_attempts: u32,
    queries: Vec<Pid>,
    sequence: u64,
}

impl MockLink {
    /// A vehicle that answers everything
    pub fn new() -> Self {
        Self::default()
    }

    /// Script the outcome of the next `initialize` calls
    pub fn script_init<I: IntoIterator<Item = bool>>(&mut self, outcomes: I) {
        self.init_script.extend(outcomes);
    }

    /// Make the next `count` receives fail with a timeout
    pub fn fail_next_receives(&mut self, count: u32) {
        self.failing_receives += count;
    }

    /// Report `pid` as unsupported; queries for it answer `NO DATA`
    pub fn mark_unsupported(&mut self, pid: Pid) {
        self.unsupported.insert(pid);
    }

    /// Take the vehicle off the bus (or put it back)
    pub fn set_offline(&mut self, offline: bool) {
        self.offline = offline;
        if offline {
            self.connected = false;
        }
    }

    /// Whether the last `initialize` succeeded and the link is up
    pub fn is_connected(&self) -> bool {
        self.connected
    }

    /// Number of `initialize` calls so far
    pub fn init_attempts(&self) -> u32 {
        self.init_attempts
    }

    /// Every PID queried so far, in order
    pub fn queries(&self) -> &[Pid] {
        &self.queries
    }

    /// Generate plausible raw bytes for a PID
    fn simulate(&mut self, pid: Pid) -> Vec<u8> {
        // Hash a running counter so values vary but runs are reproducible
        let mut hasher = DefaultHasher::new();
        self.sequence.hash(&mut hasher);
        pid.hash(&mut hasher);
        self.sequence += 1;
        let hash = hasher.finish();

        match pid {
            // RPM: 800-3500 RPM range
            Pid::Rpm => {
                let encoded = (800 + (hash % 2700) as u16) * 4;
                encoded.to_be_bytes().to_vec()
            }
            // Speed: 0-120 km/h
            Pid::Speed => vec![(hash % 120) as u8],
            // Temperatures: 15-105°C (stored as value + 40)
            Pid::CoolantTemp | Pid::IntakeTemp | Pid::AmbientTemp => vec![(55 + (hash % 90)) as u8],
            // Percentages: 20-80%
            Pid::EngineLoad | Pid::Throttle | Pid::FuelLevel => vec![(51 + (hash % 153)) as u8],
            // MAF: 5-50 g/s
            Pid::Maf => (500 + (hash % 4500) as u16).to_be_bytes().to_vec(),
            // Timing advance: 0-30° (A/2 - 64)
            Pid::TimingAdvance => vec![(128 + (hash % 60)) as u8],
            // Module voltage: 12.0-14.5 V
            Pid::ControlModuleVoltage => (12_000 + (hash % 2500) as u16).to_be_bytes().to_vec(),
            Pid::Runtime | Pid::Distance => ((self.sequence % 65_536) as u16).to_be_bytes().to_vec(),
            Pid::Barometric => vec![(95 + (hash % 10)) as u8],
            Pid::IntakeMap => vec![(30 + (hash % 70)) as u8],
            Pid::FuelPressure => vec![(80 + (hash % 40)) as u8],
        }
    }
}

#[async_trait]
impl LinkDriver for MockLink {
    async fn initialize(&mut self) -> Result<(), ObdError> {
        self.init_attempts += 1;
        self.pending = None;
        let scripted = self.init_script.pop_front().unwrap_or(true);
        if self.offline || !scripted {
            debug!("Mock link: init attempt {} failed", self.init_attempts);
            self.connected = false;
            return Err(ObdError::AdapterNotResponding);
        }
        debug!("Mock link: init attempt {} succeeded", self.init_attempts);
        self.connected = true;
        Ok(())
    }

    async fn send_query(&mut self, pid: Pid) -> Result<(), ObdError> {
        if !self.connected {
            return Err(ObdError::NotInitialized);
        }
        self.queries.push(pid);
        self.pending = Some(pid);
        Ok(())
    }

    async fn try_receive(&mut self) -> Result<PidResponse, ObdError> {
        let pid = self.pending.take().ok_or(ObdError::NoPendingQuery)?;
        if self.offline {
            return Err(ObdError::Timeout(0));
        }
        if self.failing_receives > 0 {
            self.failing_receives -= 1;
            return Err(ObdError::Timeout(0));
        }
        if self.unsupported.contains(&pid) {
            return Err(ObdError::NoData(pid.as_hex()));
        }
        let raw = self.simulate(pid);
        PidResponse::decode(pid, raw)
    }

    async fn is_supported(&mut self, pid: Pid) -> Result<bool, ObdError> {
        if !self.connected {
            return Err(ObdError::NotInitialized);
        }
        Ok(!self.unsupported.contains(&pid))
    }
}
