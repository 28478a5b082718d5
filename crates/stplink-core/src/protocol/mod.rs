//! Shell Transport Protocol
//!
//! Implements the framed, CRC-8 protected, byte-acknowledged protocol spoken
//! by the DIO add-in card and the automotive sequence MCU.
//!
//! Wire frame: `[SOF][CRC8][LEN][KIND][payload × LEN]`. Every byte of a frame
//! is answered with a single [`ACK`] or [`NACK`] by the receiving side.

pub mod checksum;
pub mod commands;
pub mod config;
pub mod discovery;
mod error;
pub mod frame;
pub mod link;
pub mod serial;
pub mod session;
mod status;
pub mod transport;

pub use checksum::crc8;
pub use commands::Kind;
pub use config::{DiscoveryConfig, LinkConfig, Role, SessionConfig};
pub use error::{FrameError, ProtocolError};
pub use frame::{Frame, FrameAccumulator, Progress};
pub use link::SerialLink;
pub use serial::{describe_ports, list_ports, open_port, PortInfo};
pub use session::{Arg, Counters, Response, Session, SharedSession, Value};
pub use status::Status;

/// Start-of-frame marker
pub const SOF: u8 = 0x01;

/// Byte accepted, expected (ASCII '\r')
pub const ACK: u8 = 0x0D;

/// Byte unexpected or rejected; also the MCU's idle reply (ASCII '\a')
pub const NACK: u8 = 0x07;

/// SOF + CRC + LEN + KIND
pub const HEADER_LEN: usize = 4;

/// Largest payload a one-byte LEN field can describe
pub const MAX_PAYLOAD_LEN: usize = 255;

/// Default baud rate for both MCUs
pub const DEFAULT_BAUD_RATE: u32 = 115_200;

/// Default per-byte read timeout in milliseconds
pub const DEFAULT_BYTE_TIMEOUT_MS: u64 = 1000;
