//! Per-command outcome codes
//!
//! Values are part of the log/wire contract and must not be renumbered.

use serde::{Deserialize, Serialize};
use std::fmt;

use super::{FrameError, ProtocolError};

/// Outcome of a single command invocation. `Success` is the only non-error.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[repr(i8)]
pub enum Status {
    /// Round trip completed and validated
    Success = 0,
    /// Byte-level send handshake failed
    SendCmdFailure = -1,
    /// Response kind/shape mismatched the request
    RecvUnexpectedPayloadError = -2,
    /// Flow-control desync, host-sent-NACK side
    RecvFrameNackError = -3,
    /// Response checksum mismatch
    RecvFrameCrcError = -4,
    /// Flow-control desync, peer-ack side
    RecvFrameAckError = -5,
    /// Start byte not found
    RecvFrameSofError = -6,
    /// Incomplete frame at timeout
    RecvPartialFrameValidationError = -7,
    /// Payload value out of valid domain
    RecvFrameValueError = -8,
    /// Missing/invalid argument encountered during encoding
    FormatNoneError = -9,
    /// Requested shutdown voltage is not below system voltage - 0.2 V
    ShutdownVoltageOverSystemVal = -10,
}

impl Status {
    const ALL: [Status; 11] = [
        Status::Success,
        Status::SendCmdFailure,
        Status::RecvUnexpectedPayloadError,
        Status::RecvFrameNackError,
        Status::RecvFrameCrcError,
        Status::RecvFrameAckError,
        Status::RecvFrameSofError,
        Status::RecvPartialFrameValidationError,
        Status::RecvFrameValueError,
        Status::FormatNoneError,
        Status::ShutdownVoltageOverSystemVal,
    ];

    /// Signed status code as written to logs
    pub fn code(self) -> i8 {
        self as i8
    }

    /// Parse a status code
    pub fn from_code(code: i8) -> Option<Self> {
        Self::ALL.iter().copied().find(|s| s.code() == code)
    }

    /// True for [`Status::Success`]
    pub fn is_success(self) -> bool {
        self == Status::Success
    }

    /// Upper-case name used in logs
    pub fn name(self) -> &'static str {
        match self {
            Status::Success => "SUCCESS",
            Status::SendCmdFailure => "SEND_CMD_FAILURE",
            Status::RecvUnexpectedPayloadError => "RECV_UNEXPECTED_PAYLOAD_ERROR",
            Status::RecvFrameNackError => "RECV_FRAME_NACK_ERROR",
            Status::RecvFrameCrcError => "RECV_FRAME_CRC_ERROR",
            Status::RecvFrameAckError => "RECV_FRAME_ACK_ERROR",
            Status::RecvFrameSofError => "RECV_FRAME_SOF_ERROR",
            Status::RecvPartialFrameValidationError => "RECV_PARTIAL_FRAME_VALIDATION_ERROR",
            Status::RecvFrameValueError => "RECV_FRAME_VALUE_ERROR",
            Status::FormatNoneError => "FORMAT_NONE_ERROR",
            Status::ShutdownVoltageOverSystemVal => "SHUTDOWN_VOLTAGE_OVER_SYSTEM_VAL",
        }
    }
}

impl fmt::Display for Status {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({})", self.name(), self.code())
    }
}

impl From<&ProtocolError> for Status {
    fn from(err: &ProtocolError) -> Self {
        match err {
            ProtocolError::Nack { .. }
            | ProtocolError::NoAck { .. }
            | ProtocolError::UnexpectedAck { .. } => {
                Status::SendCmdFailure
            }
            ProtocolError::Frame(FrameError::Sof { .. }) => Status::RecvFrameSofError,
            ProtocolError::Frame(FrameError::Partial { .. }) => {
                Status::RecvPartialFrameValidationError
            }
            ProtocolError::Frame(FrameError::Crc { .. }) => Status::RecvFrameCrcError,
            ProtocolError::Frame(FrameError::PayloadTooLong(_)) => Status::FormatNoneError,
            ProtocolError::MissingTerminator(_) => Status::RecvFrameNackError,
            ProtocolError::AckInsteadOfTerminator => Status::RecvFrameAckError,
            ProtocolError::UnexpectedKind { .. } => Status::RecvUnexpectedPayloadError,
            ProtocolError::ValueOutOfRange(_) => Status::RecvFrameValueError,
            ProtocolError::MissingArgument { .. }
            | ProtocolError::InvalidArgument(_)
            | ProtocolError::EmptyPayload { .. } => {
                Status::FormatNoneError
            }
            ProtocolError::ShutdownVoltageOverSystem { .. } => {
                Status::ShutdownVoltageOverSystemVal
            }
            // Link-level failures (closed port, resync failure, ...) surface as a
            // failed send; nothing reached the MCU in a usable state.
            _ => Status::SendCmdFailure,
        }
    }
}

impl From<ProtocolError> for Status {
    fn from(err: ProtocolError) -> Self {
        Status::from(&err)
    }
}
