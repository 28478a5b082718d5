//! Automotive sequence MCU
//!
//! Controls ignition-driven power sequencing: automotive mode, low-power
//! enable, four sequencing timers (seconds) and the low-voltage shutdown
//! threshold (centivolts).

use serde::{Deserialize, Serialize};
use serialport::SerialPort;
use tracing::{error, info};

use super::{
    check_range, expect, BINARY_RANGE, SHUTDOWN_MARGIN_VOLTS, SHUTDOWN_VOLTAGE_RANGE, TIMER_RANGE,
};
use crate::protocol::{
    Arg, Kind, ProtocolError, Response, Role, SerialLink, Session, SessionConfig, SharedSession,
    Value,
};

/// Snapshot of every persistent automotive setting
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct AutomotiveSettings {
    /// Automotive mode flag (0 or 1)
    pub automotive_mode: u8,
    /// Low-power enable flag (0 or 1)
    pub low_power_enable: u8,
    /// Start-up delay, seconds
    pub start_up_timer: u64,
    /// Soft-off delay, seconds
    pub soft_off_timer: u64,
    /// Hard-off delay, seconds
    pub hard_off_timer: u64,
    /// Low-voltage delay, seconds
    pub low_voltage_timer: u64,
    /// Centivolts
    pub shutdown_voltage: u64,
}

/// Typed access to the automotive sequence MCU
pub struct AutomotiveController<L: SerialLink = Box<dyn SerialPort>> {
    session: SharedSession<L>,
}

impl AutomotiveController<Box<dyn SerialPort>> {
    /// Claim the MCU's UART. `config` must name the port.
    pub fn claim(config: SessionConfig) -> Result<Self, ProtocolError> {
        if config.role != Role::Automotive {
            return Err(ProtocolError::Config(format!(
                "automotive controller needs the automotive role, got {:?}",
                config.role
            )));
        }
        let session: Session = Session::claim(config)?;
        Ok(Self::new(session.into()))
    }
}

fn read_flag<L: SerialLink>(session: &mut Session<L>, kind: Kind) -> Result<u8, ProtocolError> {
    let value = session.try_invoke(kind, &[], Response::Binary)?;
    expect(kind, value, Value::as_u8)
}

fn read_number<L: SerialLink>(session: &mut Session<L>, kind: Kind) -> Result<u64, ProtocolError> {
    let value = session.try_invoke(kind, &[], Response::UnsignedLe)?;
    expect(kind, value, Value::as_u64)
}

fn read_input_voltage<L: SerialLink>(session: &mut Session<L>) -> Result<f32, ProtocolError> {
    let value = session.try_invoke(Kind::GetInputVoltage, &[], Response::FloatLe)?;
    expect(Kind::GetInputVoltage, value, Value::as_f32)
}

/// Refuse a threshold that would leave less than the margin below `system_volts`
fn check_shutdown_voltage(requested_cv: u64, system_volts: f32) -> Result<(), ProtocolError> {
    let requested_volts = requested_cv as f64 / 100.0;
    if requested_volts + SHUTDOWN_MARGIN_VOLTS >= f64::from(system_volts) {
        error!(
            "Shutdown voltage {:.2} V is not {} V below the input voltage {:.2} V",
            requested_volts, SHUTDOWN_MARGIN_VOLTS, system_volts
        );
        return Err(ProtocolError::ShutdownVoltageOverSystem {
            requested_cv,
            system_volts,
        });
    }
    Ok(())
}

fn write_shutdown_voltage<L: SerialLink>(session: &mut Session<L>, centivolts: u64) -> Result<(), ProtocolError> {
    let system_volts = read_input_voltage(session)?;
    check_shutdown_voltage(centivolts, system_volts)?;
    session.try_invoke(Kind::SetShutdownVoltage, &[Arg::U64Le(centivolts)], Response::Ack)?;
    Ok(())
}

impl<L: SerialLink> AutomotiveController<L> {
    /// Wrap a shared session already claimed for the automotive MCU
    pub fn new(session: SharedSession<L>) -> Self {
        Self { session }
    }

    /// Underlying session, for raw commands
    pub fn session(&self) -> &SharedSession<L> {
        &self.session
    }

    fn get_flag(&self, kind: Kind) -> Result<u8, ProtocolError> {
        self.session.with(|s| read_flag(s, kind))
    }

    fn set_flag(&self, kind: Kind, flag: u8) -> Result<(), ProtocolError> {
        check_range("flag", flag, &BINARY_RANGE)?;
        self.session.try_invoke(kind, &[Arg::U8(flag)], Response::Binary)?;
        Ok(())
    }

    fn get_number(&self, kind: Kind) -> Result<u64, ProtocolError> {
        self.session.with(|s| read_number(s, kind))
    }

    fn set_timer(&self, kind: Kind, seconds: u64) -> Result<(), ProtocolError> {
        check_range("timer", seconds, &TIMER_RANGE)?;
        self.session.try_invoke(kind, &[Arg::U64Le(seconds)], Response::Ack)?;
        Ok(())
    }

    /// Automotive mode flag
    pub fn get_automotive_mode(&self) -> Result<u8, ProtocolError> {
        self.get_flag(Kind::GetAutomotiveMode)
    }

    /// Enable (1) or disable (0) automotive mode
    pub fn set_automotive_mode(&self, mode: u8) -> Result<(), ProtocolError> {
        self.set_flag(Kind::SetAutomotiveMode, mode)
    }

    /// Low-power enable flag
    pub fn get_low_power_enable(&self) -> Result<u8, ProtocolError> {
        self.get_flag(Kind::GetLowPowerEnable)
    }

    /// Enable (1) or disable (0) low-power mode
    pub fn set_low_power_enable(&self, enable: u8) -> Result<(), ProtocolError> {
        self.set_flag(Kind::SetLowPowerEnable, enable)
    }

    /// Seconds the ignition must be stable before power-on
    pub fn get_start_up_timer(&self) -> Result<u64, ProtocolError> {
        self.get_number(Kind::GetStartUpTimer)
    }

    /// Set the start-up delay in seconds
    pub fn set_start_up_timer(&self, seconds: u64) -> Result<(), ProtocolError> {
        self.set_timer(Kind::SetStartUpTimer, seconds)
    }

    /// Soft-off delay in seconds
    pub fn get_soft_off_timer(&self) -> Result<u64, ProtocolError> {
        self.get_number(Kind::GetSoftOffTimer)
    }

    /// Set the soft-off delay in seconds
    pub fn set_soft_off_timer(&self, seconds: u64) -> Result<(), ProtocolError> {
        self.set_timer(Kind::SetSoftOffTimer, seconds)
    }

    /// Hard-off delay in seconds
    pub fn get_hard_off_timer(&self) -> Result<u64, ProtocolError> {
        self.get_number(Kind::GetHardOffTimer)
    }

    /// Set the hard-off delay in seconds
    pub fn set_hard_off_timer(&self, seconds: u64) -> Result<(), ProtocolError> {
        self.set_timer(Kind::SetHardOffTimer, seconds)
    }

    /// Low-voltage delay in seconds
    pub fn get_low_voltage_timer(&self) -> Result<u64, ProtocolError> {
        self.get_number(Kind::GetLowVoltageTimer)
    }

    /// Set the low-voltage delay in seconds
    pub fn set_low_voltage_timer(&self, seconds: u64) -> Result<(), ProtocolError> {
        self.set_timer(Kind::SetLowVoltageTimer, seconds)
    }

    /// Low-voltage shutdown threshold in centivolts
    pub fn get_shutdown_voltage(&self) -> Result<u64, ProtocolError> {
        self.get_number(Kind::GetShutdownVoltage)
    }

    /// Set the low-voltage shutdown threshold.
    ///
    /// Reads the input voltage first and refuses, without sending the set
    /// command, unless `centivolts` is more than 0.2 V below it. The read and
    /// the write run under one session lock.
    pub fn set_shutdown_voltage(&self, centivolts: u64) -> Result<(), ProtocolError> {
        check_range("shutdown voltage", centivolts, &SHUTDOWN_VOLTAGE_RANGE)?;
        self.session.with(|s| write_shutdown_voltage(s, centivolts))
    }

    /// Supply voltage seen by the MCU, in volts
    pub fn input_voltage(&self) -> Result<f32, ProtocolError> {
        self.session.with(read_input_voltage)
    }

    /// Ignition line state (0 off, 1 on)
    pub fn ignition_state(&self) -> Result<u8, ProtocolError> {
        self.get_flag(Kind::GetIgnitionState)
    }

    /// Firmware version as "major.minor.patch"
    pub fn firmware_version(&self) -> Result<String, ProtocolError> {
        let value = self
            .session
            .try_invoke(Kind::GetFirmwareVersion, &[], Response::Version)?;
        expect(Kind::GetFirmwareVersion, value, |v| v.as_str().map(str::to_string))
    }

    /// Read every persistent setting in one locked pass
    pub fn all_settings(&self) -> Result<AutomotiveSettings, ProtocolError> {
        self.session.with(|s| {
            Ok(AutomotiveSettings {
                automotive_mode: read_flag(s, Kind::GetAutomotiveMode)?,
                low_power_enable: read_flag(s, Kind::GetLowPowerEnable)?,
                start_up_timer: read_number(s, Kind::GetStartUpTimer)?,
                soft_off_timer: read_number(s, Kind::GetSoftOffTimer)?,
                hard_off_timer: read_number(s, Kind::GetHardOffTimer)?,
                low_voltage_timer: read_number(s, Kind::GetLowVoltageTimer)?,
                shutdown_voltage: read_number(s, Kind::GetShutdownVoltage)?,
            })
        })
    }

    /// Apply every setting. All values are range-checked before the first write.
    pub fn set_all_settings(&self, settings: &AutomotiveSettings) -> Result<(), ProtocolError> {
        check_range("automotive mode", settings.automotive_mode, &BINARY_RANGE)?;
        check_range("low power enable", settings.low_power_enable, &BINARY_RANGE)?;
        for timer in [
            settings.start_up_timer,
            settings.soft_off_timer,
            settings.hard_off_timer,
            settings.low_voltage_timer,
        ] {
            check_range("timer", timer, &TIMER_RANGE)?;
        }
        check_range("shutdown voltage", settings.shutdown_voltage, &SHUTDOWN_VOLTAGE_RANGE)?;

        self.set_automotive_mode(settings.automotive_mode)?;
        self.set_low_power_enable(settings.low_power_enable)?;
        self.set_start_up_timer(settings.start_up_timer)?;
        self.set_soft_off_timer(settings.soft_off_timer)?;
        self.set_hard_off_timer(settings.hard_off_timer)?;
        self.set_low_voltage_timer(settings.low_voltage_timer)?;
        self.set_shutdown_voltage(settings.shutdown_voltage)?;
        info!("Applied automotive settings {:?}", settings);
        Ok(())
    }
}
