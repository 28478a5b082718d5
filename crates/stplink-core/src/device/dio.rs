//! DIO add-in card
//!
//! Eight digital inputs and eight digital outputs, each pin read or driven
//! individually. Contact type selects wet (0) or dry (1) contact mode for
//! the whole input or output bank.

use serde::{Deserialize, Serialize};
use serialport::SerialPort;
use tracing::info;

use super::{check_range, expect, BINARY_RANGE, DIO_PIN_RANGE};
use crate::protocol::{
    Arg, Kind, ProtocolError, Response, Role, SerialLink, Session, SessionConfig, SharedSession,
    Value,
};

/// Number of input pins and of output pins
pub const PIN_COUNT: usize = 8;

/// Every input and output state, pin 0 first
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct IoStates {
    /// Input states
    pub inputs: [u8; PIN_COUNT],
    /// Output states
    pub outputs: [u8; PIN_COUNT],
}

/// Typed access to the DIO card
pub struct DioCard<L: SerialLink = Box<dyn SerialPort>> {
    session: SharedSession<L>,
}

impl DioCard<Box<dyn SerialPort>> {
    /// Claim the card, autodetecting its port unless `config` names one
    pub fn claim(config: SessionConfig) -> Result<Self, ProtocolError> {
        if config.role != Role::DioCard {
            return Err(ProtocolError::Config(format!(
                "DIO card needs the dio_card role, got {:?}",
                config.role
            )));
        }
        let session: Session = Session::claim(config)?;
        Ok(Self::new(session.into()))
    }
}

impl<L: SerialLink> DioCard<L> {
    /// Wrap a shared session already claimed for the DIO card
    pub fn new(session: SharedSession<L>) -> Self {
        Self { session }
    }

    /// Underlying session, for raw commands
    pub fn session(&self) -> &SharedSession<L> {
        &self.session
    }

    fn read_pin(&self, kind: Kind, pin: u8) -> Result<u8, ProtocolError> {
        check_range("pin", pin, &DIO_PIN_RANGE)?;
        let value = self.session.try_invoke(kind, &[Arg::U8(pin)], Response::Binary)?;
        expect(kind, value, Value::as_u8)
    }

    fn read_flag(&self, kind: Kind) -> Result<u8, ProtocolError> {
        let value = self.session.try_invoke(kind, &[], Response::Binary)?;
        expect(kind, value, Value::as_u8)
    }

    fn write_flag(&self, kind: Kind, flag: u8) -> Result<(), ProtocolError> {
        check_range("contact type", flag, &BINARY_RANGE)?;
        self.session.try_invoke(kind, &[Arg::U8(flag)], Response::Binary)?;
        Ok(())
    }

    /// State of input `pin`
    pub fn get_di(&self, pin: u8) -> Result<u8, ProtocolError> {
        self.read_pin(Kind::GetDi, pin)
    }

    /// State of output `pin`
    pub fn get_do(&self, pin: u8) -> Result<u8, ProtocolError> {
        self.read_pin(Kind::GetDo, pin)
    }

    /// Drive output `pin` low (0) or high (1)
    pub fn set_do(&self, pin: u8, value: u8) -> Result<(), ProtocolError> {
        check_range("pin", pin, &DIO_PIN_RANGE)?;
        check_range("output value", value, &BINARY_RANGE)?;
        self.session
            .try_invoke(Kind::SetDo, &[Arg::U8(pin), Arg::U8(value)], Response::Binary)?;
        Ok(())
    }

    /// Input bank contact type (0 wet, 1 dry)
    pub fn get_di_contact(&self) -> Result<u8, ProtocolError> {
        self.read_flag(Kind::GetDiContact)
    }

    /// Output bank contact type (0 wet, 1 dry)
    pub fn get_do_contact(&self) -> Result<u8, ProtocolError> {
        self.read_flag(Kind::GetDoContact)
    }

    /// Select wet (0) or dry (1) contacts for the inputs
    pub fn set_di_contact(&self, contact: u8) -> Result<(), ProtocolError> {
        self.write_flag(Kind::SetDiContact, contact)
    }

    /// Select wet (0) or dry (1) contacts for the outputs
    pub fn set_do_contact(&self, contact: u8) -> Result<(), ProtocolError> {
        self.write_flag(Kind::SetDoContact, contact)
    }

    /// Read every input, pin 0 first
    pub fn get_all_inputs(&self) -> Result<[u8; PIN_COUNT], ProtocolError> {
        let mut states = [0u8; PIN_COUNT];
        for (pin, state) in DIO_PIN_RANGE.zip(states.iter_mut()) {
            *state = self.get_di(pin)?;
        }
        Ok(states)
    }

    /// Read every output, pin 0 first
    pub fn get_all_outputs(&self) -> Result<[u8; PIN_COUNT], ProtocolError> {
        let mut states = [0u8; PIN_COUNT];
        for (pin, state) in DIO_PIN_RANGE.zip(states.iter_mut()) {
            *state = self.get_do(pin)?;
        }
        Ok(states)
    }

    /// Read every input, then every output
    pub fn get_all_io(&self) -> Result<IoStates, ProtocolError> {
        Ok(IoStates {
            inputs: self.get_all_inputs()?,
            outputs: self.get_all_outputs()?,
        })
    }

    /// Drive all outputs. Every value is checked before the first write.
    pub fn set_all_outputs(&self, values: [u8; PIN_COUNT]) -> Result<(), ProtocolError> {
        for value in values {
            check_range("output value", value, &BINARY_RANGE)?;
        }
        for (pin, value) in DIO_PIN_RANGE.zip(values) {
            self.set_do(pin, value)?;
        }
        info!("All outputs set to {:?}", values);
        Ok(())
    }

    /// Firmware version as "major.minor.patch"
    pub fn firmware_version(&self) -> Result<String, ProtocolError> {
        let value = self
            .session
            .try_invoke(Kind::GetFirmwareVersion, &[], Response::Version)?;
        expect(Kind::GetFirmwareVersion, value, |v| v.as_str().map(str::to_string))
    }
}
