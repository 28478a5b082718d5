//! Protocol commands
//!
//! Message kinds understood by the DIO card and the automotive sequence MCU.
//! A request and its response carry the same kind.

use serde::{Deserialize, Serialize};

/// Command kinds
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Kind {
    /// Error report from the MCU
    ErrZero,

    // Automotive sequence MCU
    /// Supply voltage, volts as a little-endian f32
    GetInputVoltage,
    /// Ignition line state
    GetIgnitionState,
    /// Firmware version bytes
    GetFirmwareVersion,
    /// Read the automotive mode flag
    GetAutomotiveMode,
    /// Write the automotive mode flag
    SetAutomotiveMode,
    /// Read the low-power enable flag
    GetLowPowerEnable,
    /// Write the low-power enable flag
    SetLowPowerEnable,
    /// Read the start-up timer
    GetStartUpTimer,
    /// Write the start-up timer
    SetStartUpTimer,
    /// Read the soft-off timer
    GetSoftOffTimer,
    /// Write the soft-off timer
    SetSoftOffTimer,
    /// Read the hard-off timer
    GetHardOffTimer,
    /// Write the hard-off timer
    SetHardOffTimer,
    /// Read the low-voltage timer
    GetLowVoltageTimer,
    /// Write the low-voltage timer
    SetLowVoltageTimer,
    /// Read the shutdown voltage (centivolts)
    GetShutdownVoltage,
    /// Write the shutdown voltage (centivolts)
    SetShutdownVoltage,

    // DIO card
    /// Read one input pin
    GetDi,
    /// Drive one output pin
    SetDo,
    /// Read one output pin
    GetDo,
    /// Read the input contact type
    GetDiContact,
    /// Read the output contact type
    GetDoContact,
    /// Write the input contact type
    SetDiContact,
    /// Write the output contact type
    SetDoContact,
}

impl Kind {
    /// Wire code
    pub fn code(&self) -> u8 {
        match self {
            Kind::ErrZero => 0x00,
            Kind::GetInputVoltage => 0x01,
            Kind::GetIgnitionState => 0x02,
            Kind::GetFirmwareVersion => 0x03,
            Kind::GetAutomotiveMode => 0x06,
            Kind::SetAutomotiveMode => 0x07,
            Kind::GetLowPowerEnable => 0x08,
            Kind::SetLowPowerEnable => 0x09,
            Kind::GetStartUpTimer => 0x0A,
            Kind::SetStartUpTimer => 0x0B,
            Kind::GetSoftOffTimer => 0x0C,
            Kind::SetSoftOffTimer => 0x0D,
            Kind::GetHardOffTimer => 0x0E,
            Kind::SetHardOffTimer => 0x0F,
            Kind::GetLowVoltageTimer => 0x10,
            Kind::SetLowVoltageTimer => 0x11,
            Kind::GetShutdownVoltage => 0x12,
            Kind::SetShutdownVoltage => 0x13,
            Kind::GetDi => 0x20,
            Kind::SetDo => 0x21,
            Kind::GetDo => 0x22,
            Kind::GetDiContact => 0x50,
            Kind::GetDoContact => 0x51,
            Kind::SetDiContact => 0x52,
            Kind::SetDoContact => 0x53,
        }
    }

    /// Look up a kind by wire code
    pub fn from_code(code: u8) -> Option<Kind> {
        Self::ALL.iter().copied().find(|k| k.code() == code)
    }

    const ALL: [Kind; 25] = [
        Kind::ErrZero,
        Kind::GetInputVoltage,
        Kind::GetIgnitionState,
        Kind::GetFirmwareVersion,
        Kind::GetAutomotiveMode,
        Kind::SetAutomotiveMode,
        Kind::GetLowPowerEnable,
        Kind::SetLowPowerEnable,
        Kind::GetStartUpTimer,
        Kind::SetStartUpTimer,
        Kind::GetSoftOffTimer,
        Kind::SetSoftOffTimer,
        Kind::GetHardOffTimer,
        Kind::SetHardOffTimer,
        Kind::GetLowVoltageTimer,
        Kind::SetLowVoltageTimer,
        Kind::GetShutdownVoltage,
        Kind::SetShutdownVoltage,
        Kind::GetDi,
        Kind::SetDo,
        Kind::GetDo,
        Kind::GetDiContact,
        Kind::GetDoContact,
        Kind::SetDiContact,
        Kind::SetDoContact,
    ];
}

impl From<Kind> for u8 {
    fn from(kind: Kind) -> u8 {
        kind.code()
    }
}
