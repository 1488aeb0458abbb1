//! Bus protocol selection for ELM327 adapters

use serde::{Deserialize, Serialize};

/// Bus protocol the adapter is told to use (`ATSP<n>`)
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ObdProtocol {
    /// Let the adapter search for the vehicle's protocol
    #[default]
    Auto,
    /// SAE J1850 PWM (41.6 kbaud)
    J1850Pwm,
    /// SAE J1850 VPW (10.4 kbaud)
    J1850Vpw,
    /// ISO 9141-2 (5 baud init)
    Iso9141,
    /// ISO 14230-4 KWP (5 baud init)
    Kwp5Baud,
    /// ISO 14230-4 KWP (fast init)
    KwpFast,
    /// ISO 15765-4 CAN (11 bit ID, 500 kbaud)
    Can11bit500,
    /// ISO 15765-4 CAN (29 bit ID, 500 kbaud)
    Can29bit500,
    /// ISO 15765-4 CAN (11 bit ID, 250 kbaud)
    Can11bit250,
    /// ISO 15765-4 CAN (29 bit ID, 250 kbaud)
    Can29bit250,
}

impl ObdProtocol {
    /// Protocol number as understood by `ATSP`
    pub fn code(&self) -> u8 {
        match self {
            ObdProtocol::Auto => 0,
            ObdProtocol::J1850Pwm => 1,
            ObdProtocol::J1850Vpw => 2,
            ObdProtocol::Iso9141 => 3,
            ObdProtocol::Kwp5Baud => 4,
            ObdProtocol::KwpFast => 5,
            ObdProtocol::Can11bit500 => 6,
            ObdProtocol::Can29bit500 => 7,
            ObdProtocol::Can11bit250 => 8,
            ObdProtocol::Can29bit250 => 9,
        }
    }

    /// Get the ELM327 AT command selecting this protocol
    pub fn to_elm_command(&self) -> String {
        format!("ATSP{}", self.code())
    }

    /// Check if this is a CAN protocol
    pub fn is_can(&self) -> bool {
        self.code() >= 6
    }
}
