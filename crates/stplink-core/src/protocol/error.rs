//! Protocol errors

use thiserror::Error;

/// Reasons a byte sequence is not a well-formed frame
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum FrameError {
    /// First byte was not SOF
    #[error("Start of frame not found: got {found:#04x}")]
    Sof { found: u8 },

    /// Fewer bytes than LEN promises
    #[error("Partial frame: have {have} of {need} bytes")]
    Partial { have: usize, need: usize },

    /// Checksum does not cover the received bytes
    #[error("CRC mismatch: expected {expected:#04x}, got {actual:#04x}")]
    Crc { expected: u8, actual: u8 },

    /// Payload does not fit the LEN byte
    #[error("Payload too long: {0} bytes (max 255)")]
    PayloadTooLong(usize),
}

/// Errors that can occur while talking to an MCU
#[derive(Error, Debug)]
pub enum ProtocolError {
    /// Port could not be opened, read or written
    #[error("Serial port error: {0}")]
    SerialError(String),

    /// No port is claimed
    #[error("Not connected to MCU")]
    NotConnected,

    /// The session already holds a port
    #[error("Already connected")]
    AlreadyConnected,

    /// MCU answered a request byte with NACK
    #[error("MCU rejected byte {index} of the frame (NACK)")]
    Nack { index: usize },

    /// MCU went quiet while a request byte was pending
    #[error("MCU did not acknowledge byte {index} of the frame")]
    NoAck { index: usize },

    /// MCU answered a request byte with something other than ACK or NACK
    #[error("MCU answered byte {index} with {byte:#04x} instead of ACK")]
    UnexpectedAck { index: usize, byte: u8 },

    /// Response bytes did not form a valid frame
    #[error("Invalid frame: {0}")]
    Frame(#[from] FrameError),

    /// End-of-frame NACK did not arrive
    #[error("Frame terminator missing: got {0:02x?}")]
    MissingTerminator(Option<u8>),

    /// MCU sent ACK where the end-of-frame NACK belongs
    #[error("MCU acknowledged instead of terminating the frame")]
    AckInsteadOfTerminator,

    /// Response kind differs from the request kind
    #[error("Unexpected response kind: expected {expected:#04x}, got {actual:#04x}")]
    UnexpectedKind { expected: u8, actual: u8 },

    /// Response value is outside what the command can return
    #[error("Response value out of range: {0}")]
    ValueOutOfRange(String),

    /// Response carried no payload where a value was expected
    #[error("Empty response payload for command {kind:#04x}")]
    EmptyPayload { kind: u8 },

    /// A required argument was not supplied
    #[error("Missing argument for command {kind:#04x}")]
    MissingArgument { kind: u8 },

    /// Argument outside the range the device accepts
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    /// Requested shutdown voltage is too close to the supply voltage
    #[error("Shutdown voltage {requested_cv} cV is not below system voltage {system_volts:.2} V - 0.2 V")]
    ShutdownVoltageOverSystem { requested_cv: u64, system_volts: f32 },

    /// No usable port
    #[error("Port not found: {0}")]
    PortNotFound(String),

    /// Port opened but the MCU did not acknowledge the probe
    #[error("Port {port} failed the probe: {reason}")]
    ProbeFailed { port: String, reason: String },

    /// Another session in this process holds the port
    #[error("Port {0} is already claimed by another session")]
    PortInUse(String),

    /// Automotive role pointed at the DIO card
    #[error("Port {0} belongs to the DIO card")]
    DioPortForAutomotive(String),

    /// Clearance gave up before the MCU went idle
    #[error("Could not resynchronize MCU after {0} writes")]
    ResyncFailed(usize),

    /// Configuration could not be read or parsed
    #[error("Configuration error: {0}")]
    Config(String),

    /// Filesystem or other I/O failure
    #[error("I/O error: {0}")]
    IoError(#[from] std::io::Error),
}

impl From<serialport::Error> for ProtocolError {
    fn from(e: serialport::Error) -> Self {
        ProtocolError::SerialError(e.to_string())
    }
}

impl From<serde_json::Error> for ProtocolError {
    fn from(e: serde_json::Error) -> Self {
        ProtocolError::Config(e.to_string())
    }
}
