//! OBD-II PID Definitions and Response Parsing
//!
//! Defines the Mode 01 Parameter IDs (PIDs) the logger polls and their decoding formulas.

use crate::error::ObdError;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Standard OBD-II PIDs for Mode 01 (current data)
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
#[repr(u8)]
pub enum Pid {
    /// Calculated engine load (0x04)
    EngineLoad = 0x04,
    /// Engine coolant temperature (0x05)
    CoolantTemp = 0x05,
    /// Fuel rail gauge pressure (0x0A)
    FuelPressure = 0x0A,
    /// Intake manifold absolute pressure (0x0B)
    IntakeMap = 0x0B,
    /// Engine RPM (0x0C)
    Rpm = 0x0C,
    /// Vehicle speed (0x0D)
    Speed = 0x0D,
    /// Timing advance before TDC (0x0E)
    TimingAdvance = 0x0E,
    /// Intake air temperature (0x0F)
    IntakeTemp = 0x0F,
    /// Mass air flow rate (0x10)
    Maf = 0x10,
    /// Throttle position (0x11)
    Throttle = 0x11,
    /// Run time since engine start (0x1F)
    Runtime = 0x1F,
    /// Distance traveled with MIL on (0x21)
    Distance = 0x21,
    /// Fuel tank level input (0x2F)
    FuelLevel = 0x2F,
    /// Absolute barometric pressure (0x33)
    Barometric = 0x33,
    /// Control module voltage (0x42)
    ControlModuleVoltage = 0x42,
    /// Ambient air temperature (0x46)
    AmbientTemp = 0x46,
}

impl Pid {
    /// Every PID known to the logger, in ascending PID order
    pub const ALL: [Pid; 16] = [
        Pid::EngineLoad,
        Pid::CoolantTemp,
        Pid::FuelPressure,
        Pid::IntakeMap,
        Pid::Rpm,
        Pid::Speed,
        Pid::TimingAdvance,
        Pid::IntakeTemp,
        Pid::Maf,
        Pid::Throttle,
        Pid::Runtime,
        Pid::Distance,
        Pid::FuelLevel,
        Pid::Barometric,
        Pid::ControlModuleVoltage,
        Pid::AmbientTemp,
    ];

    /// Get the PID hex value
    pub fn as_hex(&self) -> u8 {
        *self as u8
    }

    /// Look up a PID by its hex value
    pub fn from_hex(value: u8) -> Option<Pid> {
        Self::ALL.iter().copied().find(|pid| pid.as_hex() == value)
    }

    /// Get the number of response bytes for this PID
    pub fn response_bytes(&self) -> usize {
        match self {
            Pid::Rpm
            | Pid::Maf
            | Pid::Runtime
            | Pid::Distance
            | Pid::ControlModuleVoltage => 2,
            _ => 1,
        }
    }

    /// Short label used in diagnostic output
    pub fn name(&self) -> &'static str {
        match self {
            Pid::EngineLoad => "ENGINE LOAD",
            Pid::CoolantTemp => "COOLANT",
            Pid::FuelPressure => "FUEL PRESSURE",
            Pid::IntakeMap => "MAP",
            Pid::Rpm => "RPM",
            Pid::Speed => "SPEED",
            Pid::TimingAdvance => "TIMING",
            Pid::IntakeTemp => "INTAKE",
            Pid::Maf => "MAF",
            Pid::Throttle => "THROTTLE",
            Pid::Runtime => "RUNTIME",
            Pid::Distance => "DISTANCE",
            Pid::FuelLevel => "FUEL LEVEL",
            Pid::Barometric => "BARO",
            Pid::ControlModuleVoltage => "MODULE VOLTAGE",
            Pid::AmbientTemp => "AMBIENT",
        }
    }
}

impl fmt::Display for Pid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({:02X})", self.name(), self.as_hex())
    }
}

impl TryFrom<u8> for Pid {
    type Error = ObdError;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        Pid::from_hex(value).ok_or(ObdError::PidNotSupported(value))
    }
}

/// Decoded response to a PID query
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PidResponse {
    /// The PID the adapter answered for
    pub pid: Pid,
    /// Decoded value in the PID's engineering unit
    pub value: f64,
    /// Raw data bytes from the response
    pub raw_bytes: Vec<u8>,
}

impl PidResponse {
    /// Create a new PID response by decoding raw data bytes
    pub fn decode(pid: Pid, raw_bytes: Vec<u8>) -> Result<Self, ObdError> {
        if raw_bytes.len() < pid.response_bytes() {
            return Err(ObdError::InvalidResponse(format!(
                "PID {:02X} needs {} data bytes, got {}",
                pid.as_hex(),
                pid.response_bytes(),
                raw_bytes.len()
            )));
        }
        let value = Self::decode_value(pid, &raw_bytes);
        Ok(Self {
            pid,
            value,
            raw_bytes,
        })
    }

    /// Decode the raw bytes to a value based on the PID formula
    fn decode_value(pid: Pid, bytes: &[u8]) -> f64 {
        let a = bytes[0] as f64;
        let word = || a * 256.0 + bytes[1] as f64;
        match pid {
            // A * 100 / 255 (%)
            Pid::EngineLoad | Pid::Throttle | Pid::FuelLevel => a * 100.0 / 255.0,
            // A - 40 (°C)
            Pid::CoolantTemp | Pid::IntakeTemp | Pid::AmbientTemp => a - 40.0,
            // 3 * A (kPa)
            Pid::FuelPressure => a * 3.0,
            // A (kPa, km/h)
            Pid::IntakeMap | Pid::Speed | Pid::Barometric => a,
            // ((A*256)+B)/4
            Pid::Rpm => word() / 4.0,
            // A/2 - 64 (° before TDC)
            Pid::TimingAdvance => a / 2.0 - 64.0,
            // ((A*256)+B) / 100 (g/s)
            Pid::Maf => word() / 100.0,
            // (A*256)+B (s, km)
            Pid::Runtime | Pid::Distance => word(),
            // ((A*256)+B) / 1000 (V)
            Pid::ControlModuleVoltage => word() / 1000.0,
        }
    }
}
