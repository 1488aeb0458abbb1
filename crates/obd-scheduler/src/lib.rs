//! OBD-II Polling and Connection Management
//!
//! Provides the three-tier PID scheduler, the link connection state machine
//! and the one-shot vehicle capability probe.

mod capability;
mod connection;
mod error;
mod scheduler;
mod tier;

pub use capability::{CapabilityProber, CapabilityReport};
pub use connection::{
    ConnectionManager, LinkState, RetryOutcome, ERROR_THRESHOLD, INITIAL_ATTEMPTS,
    RECONNECT_PAUSE, RETRY_INTERVAL,
};
pub use error::SchedulerError;
pub use scheduler::{ScheduledPid, SchedulerCursor, TieredScheduler};
pub use tier::{Tier, TierTable};
