//! Scheduler Error Types

use crate::tier::Tier;
use thiserror::Error;

/// Errors raised while building the scheduler
#[derive(Debug, Clone, Error)]
pub enum SchedulerError {
    /// A tier that must hold PIDs is empty
    #[error("{0:?} must contain at least one PID")]
    EmptyTier(Tier),

    /// Cursor index outside its tier
    #[error("{tier:?} cursor {index} out of range for {len} PIDs")]
    CursorOutOfRange { tier: Tier, index: usize, len: usize },
}
