//! OBD-II Link Driver
//!
//! This crate owns everything on the far side of the diagnostic link: the
//! PID table and decoding formulas, the [`LinkDriver`] trait the logger core
//! consumes, an ELM327 serial driver and a simulated link.

mod elm327;
mod error;
mod link;
mod mock;
mod pid;
mod protocol;

pub use elm327::{AdapterPort, Elm327, DEFAULT_TIMEOUT_MS};
pub use error::ObdError;
pub use link::LinkDriver;
pub use mock::MockLink;
pub use pid::{Pid, PidResponse};
pub use protocol::ObdProtocol;

/// OBD-II mode constants
pub mod mode {
    /// Current data
    pub const CURRENT_DATA: u8 = 0x01;
}
