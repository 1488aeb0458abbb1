//! Vehicle capability probe
//!
//! Run once per connection. The report is informational only; tiers are
//! never narrowed by it.

use obd_protocol::{LinkDriver, Pid};
use std::collections::BTreeMap;
use tracing::{debug, info};

/// Which PIDs the connected vehicle reports
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CapabilityReport {
    entries: BTreeMap<Pid, bool>,
}

impl CapabilityReport {
    /// Support status of one PID, if it was probed
    pub fn get(&self, pid: Pid) -> Option<bool> {
        self.entries.get(&pid).copied()
    }

    /// PIDs the vehicle reports
    pub fn supported(&self) -> impl Iterator<Item = Pid> + '_ {
        self.entries.iter().filter(|(_, s)| **s).map(|(p, _)| *p)
    }

    /// PIDs the vehicle does not report (or that could not be checked)
    pub fn unsupported(&self) -> impl Iterator<Item = Pid> + '_ {
        self.entries.iter().filter(|(_, s)| !**s).map(|(p, _)| *p)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Probes a fixed PID list against the connected vehicle
#[derive(Debug, Clone)]
pub struct CapabilityProber {
    pids: Vec<Pid>,
}

impl CapabilityProber {
    pub fn new(pids: Vec<Pid>) -> Self {
        Self { pids }
    }

    /// The PID list shown at every connection
    pub fn default_pids() -> Vec<Pid> {
        vec![
            Pid::Rpm,
            Pid::Speed,
            Pid::Throttle,
            Pid::EngineLoad,
            Pid::ControlModuleVoltage,
            Pid::Maf,
            Pid::IntakeMap,
            Pid::FuelLevel,
            Pid::FuelPressure,
            Pid::CoolantTemp,
            Pid::IntakeTemp,
            Pid::AmbientTemp,
            Pid::TimingAdvance,
            Pid::Barometric,
        ]
    }

    /// Ask the link about every PID and log one line per PID
    pub async fn probe<L: LinkDriver + ?Sized>(&self, link: &mut L) -> CapabilityReport {
        let mut report = CapabilityReport::default();
        for &pid in &self.pids {
            let supported = match link.is_supported(pid).await {
                Ok(supported) => supported,
                Err(e) => {
                    debug!("Support check for {} failed: {}", pid, e);
                    false
                }
            };
            info!("{}: {}", pid.name(), if supported { "Yes" } else { "No" });
            report.entries.insert(pid, supported);
        }
        report
    }
}

impl Default for CapabilityProber {
    fn default() -> Self {
        Self::new(Self::default_pids())
    }
}
