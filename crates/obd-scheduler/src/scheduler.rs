//! Tiered PID Scheduler Implementation
//!
//! Tier1 PIDs are polled round-robin, one per tick. Each time Tier1 wraps,
//! the next tick is given to a slower PID: Tier2 in order until exhausted,
//! then all of Tier3, then back to Tier2. Bus load stays at one query per
//! tick and every configured PID is eventually covered.

use crate::tier::{Tier, TierTable};
use crate::SchedulerError;
use obd_protocol::Pid;
use tracing::{debug, info};

/// Position of the scheduler within the three tiers
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SchedulerCursor {
    /// Next Tier1 index
    pub i1: usize,
    /// Next Tier2 index
    pub i2: usize,
    /// Next Tier3 index
    pub i3: usize,
    /// Tier2 is exhausted and the slow slot is walking Tier3
    pub in_tier3: bool,
    /// A Tier1 cycle just completed and the next pick goes to Tier2/Tier3
    pub slow_due: bool,
}

/// A PID picked by the scheduler
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ScheduledPid {
    /// The PID to query
    pub pid: Pid,
    /// Tier the PID was drawn from
    pub tier: Tier,
}

/// Three-tier round-robin PID scheduler
#[derive(Debug, Clone)]
pub struct TieredScheduler {
    tiers: TierTable,
    cursor: SchedulerCursor,
    /// Completed Tier1 cycles
    cycles: u64,
}

impl TieredScheduler {
    /// Create a scheduler positioned at the start of every tier
    pub fn new(tiers: TierTable) -> Result<Self, SchedulerError> {
        Self::with_cursor(tiers, SchedulerCursor::default())
    }

    /// Create a scheduler resuming from `cursor`
    pub fn with_cursor(tiers: TierTable, cursor: SchedulerCursor) -> Result<Self, SchedulerError> {
        tiers.validate()?;
        for (tier, index) in [(Tier::Tier1, cursor.i1), (Tier::Tier2, cursor.i2), (Tier::Tier3, cursor.i3)] {
            let len = tiers.pids(tier).len();
            if index >= len.max(1) {
                return Err(SchedulerError::CursorOutOfRange { tier, index, len });
            }
        }
        if cursor.in_tier3 && tiers.tier3.is_empty() {
            return Err(SchedulerError::CursorOutOfRange {
                tier: Tier::Tier3,
                index: cursor.i3,
                len: 0,
            });
        }

        info!(
            "Tiered scheduler created with {}/{}/{} PIDs",
            tiers.tier1.len(),
            tiers.tier2.len(),
            tiers.tier3.len()
        );
        Ok(Self {
            tiers,
            cursor,
            cycles: 0,
        })
    }

    /// Pick the PID to query on this tick
    pub fn next_metric(&mut self) -> Pid {
        self.next_scheduled().pid
    }

    /// Pick the PID to query on this tick, with the tier it came from
    pub fn next_scheduled(&mut self) -> ScheduledPid {
        if self.cursor.slow_due {
            self.cursor.slow_due = false;
            if let Some(scheduled) = self.next_slow() {
                debug!("Scheduled {:?} PID {}", scheduled.tier, scheduled.pid);
                return scheduled;
            }
        }

        let pid = self.tiers.tier1[self.cursor.i1];
        self.cursor.i1 = (self.cursor.i1 + 1) % self.tiers.tier1.len();
        if self.cursor.i1 == 0 {
            self.cycles += 1;
            self.cursor.slow_due = true;
        }
        ScheduledPid {
            pid,
            tier: Tier::Tier1,
        }
    }

    fn next_slow(&mut self) -> Option<ScheduledPid> {
        let len2 = self.tiers.tier2.len();
        let len3 = self.tiers.tier3.len();
        if len2 == 0 && len3 == 0 {
            return None;
        }

        if !self.cursor.in_tier3 && len2 > 0 {
            let pid = self.tiers.tier2[self.cursor.i2];
            self.cursor.i2 += 1;
            if self.cursor.i2 == len2 {
                self.cursor.i2 = 0;
                self.cursor.in_tier3 = len3 > 0;
            }
            return Some(ScheduledPid {
                pid,
                tier: Tier::Tier2,
            });
        }

        let pid = self.tiers.tier3[self.cursor.i3];
        self.cursor.i3 = (self.cursor.i3 + 1) % len3;
        if self.cursor.i3 == 0 && len2 > 0 {
            self.cursor.in_tier3 = false;
        }
        Some(ScheduledPid {
            pid,
            tier: Tier::Tier3,
        })
    }

    /// Current cursor
    pub fn cursor(&self) -> SchedulerCursor {
        self.cursor
    }

    /// The tier tables being walked
    pub fn tiers(&self) -> &TierTable {
        &self.tiers
    }

    /// Number of completed Tier1 cycles
    pub fn cycles(&self) -> u64 {
        self.cycles
    }

    /// Get the number of scheduled PIDs
    pub fn pid_count(&self) -> usize {
        self.tiers.all().count()
    }
}
