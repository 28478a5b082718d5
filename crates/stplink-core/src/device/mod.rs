//! Typed device managers
//!
//! Thin wrappers that know each MCU's command catalog and argument ranges.
//! Arguments are validated before anything reaches the session, so a bad
//! call never writes to the port.

pub mod automotive;
pub mod dio;

pub use automotive::{AutomotiveController, AutomotiveSettings};
pub use dio::{DioCard, IoStates};

use std::ops::RangeInclusive;

use crate::protocol::{Kind, ProtocolError, Value};

/// Digital I/O pin numbers on the DIO card
pub const DIO_PIN_RANGE: RangeInclusive<u8> = 0..=7;

/// Flags, pin states and contact types
pub const BINARY_RANGE: RangeInclusive<u8> = 0..=1;

/// Automotive timers, in seconds
pub const TIMER_RANGE: RangeInclusive<u64> = 1..=36_000;

/// Shutdown voltage, in centivolts (1.00 V to 48.00 V)
pub const SHUTDOWN_VOLTAGE_RANGE: RangeInclusive<u64> = 100..=4_800;

/// Headroom the shutdown voltage must leave below the input voltage
pub const SHUTDOWN_MARGIN_VOLTS: f64 = 0.2;

fn check_range<T>(what: &str, value: T, range: &RangeInclusive<T>) -> Result<(), ProtocolError>
where
    T: PartialOrd + std::fmt::Display,
{
    if range.contains(&value) {
        Ok(())
    } else {
        Err(ProtocolError::InvalidArgument(format!(
            "{} {} outside {}..={}",
            what,
            value,
            range.start(),
            range.end()
        )))
    }
}

/// Pull the expected variant out of a decoded response
fn expect<T>(kind: Kind, value: Option<Value>, pick: impl FnOnce(&Value) -> Option<T>) -> Result<T, ProtocolError> {
    value.as_ref().and_then(pick).ok_or_else(|| {
        ProtocolError::ValueOutOfRange(format!("{:?}: unexpected response value {:?}", kind, value))
    })
}
