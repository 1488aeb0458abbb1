//! OBD-II Error Types

use thiserror::Error;

/// Errors that can occur during OBD-II communication
#[derive(Debug, Error)]
pub enum ObdError {
    /// Serial port connection error
    #[error("Serial port error: {0}")]
    SerialError(String),

    /// Timeout waiting for response
    #[error("Timeout waiting for OBD response after {0}ms")]
    Timeout(u64),

    /// Invalid response from adapter
    #[error("Invalid response: {0}")]
    InvalidResponse(String),

    /// Adapter answered `NO DATA`
    #[error("No data returned for PID {0:02X}")]
    NoData(u8),

    /// PID not supported by vehicle
    #[error("PID {0:02X} not supported by vehicle")]
    PidNotSupported(u8),

    /// Adapter not responding
    #[error("OBD adapter not responding")]
    AdapterNotResponding,

    /// Adapter rejected the command (`?`)
    #[error("Adapter rejected command: {0}")]
    CommandRejected(String),

    /// CAN bus error
    #[error("CAN bus error: {0}")]
    CanBusError(String),

    /// Vehicle not connected
    #[error("Vehicle ignition is off or not connected")]
    VehicleNotConnected,

    /// A query was attempted before `initialize` succeeded
    #[error("Link not initialized")]
    NotInitialized,

    /// `try_receive` called with no query in flight
    #[error("No query pending")]
    NoPendingQuery,
}

impl ObdError {
    /// Whether the failure means the vehicle lacks the metric rather than the link failing
    pub fn is_unsupported(&self) -> bool {
        matches!(self, ObdError::PidNotSupported(_) | ObdError::NoData(_))
    }
}

impl From<std::io::Error> for ObdError {
    fn from(err: std::io::Error) -> Self {
        ObdError::SerialError(err.to_string())
    }
}

impl From<tokio_serial::Error> for ObdError {
    fn from(err: tokio_serial::Error) -> Self {
        ObdError::SerialError(err.to_string())
    }
}
