//! Static tier tables

use crate::SchedulerError;
use obd_protocol::Pid;
use serde::{Deserialize, Serialize};

/// Polling priority class
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Tier {
    /// Polled every tick
    Tier1,
    /// Polled once per Tier1 cycle until exhausted
    Tier2,
    /// Polled once per Tier1 cycle after Tier2
    Tier3,
}

/// The three PID tables the scheduler walks
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TierTable {
    pub tier1: Vec<Pid>,
    #[serde(default)]
    pub tier2: Vec<Pid>,
    #[serde(default)]
    pub tier3: Vec<Pid>,
}

impl TierTable {
    /// Build a table, rejecting an empty Tier1
    pub fn new(tier1: Vec<Pid>, tier2: Vec<Pid>, tier3: Vec<Pid>) -> Result<Self, SchedulerError> {
        let table = Self { tier1, tier2, tier3 };
        table.validate()?;
        Ok(table)
    }

    /// Check the table can drive the scheduler
    pub fn validate(&self) -> Result<(), SchedulerError> {
        if self.tier1.is_empty() {
            return Err(SchedulerError::EmptyTier(Tier::Tier1));
        }
        Ok(())
    }

    /// PIDs of one tier
    pub fn pids(&self, tier: Tier) -> &[Pid] {
        match tier {
            Tier::Tier1 => &self.tier1,
            Tier::Tier2 => &self.tier2,
            Tier::Tier3 => &self.tier3,
        }
    }

    /// Which tier a PID belongs to, if any
    pub fn tier_of(&self, pid: Pid) -> Option<Tier> {
        [Tier::Tier1, Tier::Tier2, Tier::Tier3]
            .into_iter()
            .find(|tier| self.pids(*tier).contains(&pid))
    }

    /// Every configured PID, Tier1 first
    pub fn all(&self) -> impl Iterator<Item = Pid> + '_ {
        self.tier1.iter().chain(&self.tier2).chain(&self.tier3).copied()
    }
}

impl Default for TierTable {
    fn default() -> Self {
        Self {
            tier1: vec![Pid::Rpm, Pid::Speed, Pid::EngineLoad, Pid::Throttle],
            tier2: vec![Pid::TimingAdvance],
            tier3: vec![
                Pid::CoolantTemp,
                Pid::IntakeTemp,
                Pid::AmbientTemp,
                Pid::FuelLevel,
                Pid::Barometric,
                Pid::Distance,
                Pid::Runtime,
            ],
        }
    }
}
