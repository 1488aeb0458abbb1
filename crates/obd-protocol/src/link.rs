//! Link driver abstraction
//!
//! The logger core talks to the diagnostic bus only through [`LinkDriver`],
//! so the ELM327 serial driver and the simulated link are interchangeable.

use crate::error::ObdError;
use crate::pid::{Pid, PidResponse};
use async_trait::async_trait;

/// Operations the logger needs from a diagnostic link
#[async_trait]
pub trait LinkDriver: Send {
    /// Bring the link up. Called repeatedly by the connection state machine.
    async fn initialize(&mut self) -> Result<(), ObdError>;

    /// Send a Mode 01 query for `pid`
    async fn send_query(&mut self, pid: Pid) -> Result<(), ObdError>;

    /// Receive and decode the answer to the last query
    async fn try_receive(&mut self) -> Result<PidResponse, ObdError>;

    /// Ask the connected vehicle whether it reports `pid`
    async fn is_supported(&mut self, pid: Pid) -> Result<bool, ObdError>;

    /// Query `pid` and wait for its decoded answer
    async fn query(&mut self, pid: Pid) -> Result<PidResponse, ObdError> {
        self.send_query(pid).await?;
        self.try_receive().await
    }
}
