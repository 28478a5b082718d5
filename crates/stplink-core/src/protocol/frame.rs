//! Frame encoding/decoding
//!
//! Frame format:
//! - 1 byte: SOF (0x01)
//! - 1 byte: CRC-8 over LEN, KIND and payload
//! - 1 byte: LEN (payload length)
//! - 1 byte: KIND (message identifier)
//! - LEN bytes: payload
//!
//! The length is only known once the third byte has arrived, so decoding is
//! built on [`FrameAccumulator`], which is fed one byte at a time by the
//! transport. [`Frame::from_bytes`] is a thin wrapper over it.

use super::{crc8, FrameError, HEADER_LEN, MAX_PAYLOAD_LEN, SOF};

const CRC_INDEX: usize = 1;
const LEN_INDEX: usize = 2;
const KIND_INDEX: usize = 3;

/// A validated protocol frame
///
/// Fields are private so every frame goes through [`Frame::new`] or the
/// decoder, and the payload always fits the one-byte LEN field.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    kind: u8,
    payload: Vec<u8>,
}

impl Frame {
    /// Create a frame, rejecting payloads the LEN field cannot describe
    pub fn new(kind: u8, payload: Vec<u8>) -> Result<Self, FrameError> {
        if payload.len() > MAX_PAYLOAD_LEN {
            return Err(FrameError::PayloadTooLong(payload.len()));
        }
        Ok(Self { kind, payload })
    }

    /// Message identifier, shared by a request and its response
    pub fn kind(&self) -> u8 {
        self.kind
    }

    /// Raw payload; interpreted by the session, not the codec
    pub fn payload(&self) -> &[u8] {
        &self.payload
    }

    /// Checksum this frame carries on the wire
    pub fn crc(&self) -> u8 {
        let mut covered = Vec::with_capacity(2 + self.payload.len());
        covered.push(self.payload.len() as u8);
        covered.push(self.kind);
        covered.extend_from_slice(&self.payload);
        crc8(&covered)
    }

    /// Encode the frame to raw bytes
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut bytes = Vec::with_capacity(self.encoded_size());
        bytes.push(SOF);
        bytes.push(self.crc());
        bytes.push(self.payload.len() as u8);
        bytes.push(self.kind);
        bytes.extend_from_slice(&self.payload);
        bytes
    }

    /// Decode a frame from raw bytes. Bytes past the declared length are ignored.
    pub fn from_bytes(data: &[u8]) -> Result<Self, FrameError> {
        let mut acc = FrameAccumulator::new();
        for &b in data {
            if let Progress::Complete(frame) = acc.push(b)? {
                return Ok(frame);
            }
        }
        acc.finish()
    }

    /// Get the total encoded size
    pub fn encoded_size(&self) -> usize {
        HEADER_LEN + self.payload.len()
    }
}

/// Encode `(kind, payload)` into a wire frame
pub fn encode(kind: u8, payload: &[u8]) -> Result<Vec<u8>, FrameError> {
    Ok(Frame::new(kind, payload.to_vec())?.to_bytes())
}

/// Decode and validate a complete wire frame
pub fn decode(data: &[u8]) -> Result<Frame, FrameError> {
    Frame::from_bytes(data)
}

/// Where an accumulator stands after a byte was pushed
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Progress {
    /// More bytes are required. `need` is `None` until LEN has arrived.
    Incomplete { have: usize, need: Option<usize> },
    /// The frame is complete and its checksum verified
    Complete(Frame),
}

/// Incremental frame decoder
///
/// Answers "I have N bytes so far; am I done, and if so, valid?" without
/// rescanning. A byte that cannot start a frame is rejected and not stored.
#[derive(Debug, Default, Clone)]
pub struct FrameAccumulator {
    buf: Vec<u8>,
    complete: bool,
}

impl FrameAccumulator {
    /// Empty accumulator waiting for SOF
    pub fn new() -> Self {
        Self::default()
    }

    /// Bytes accumulated so far
    pub fn len(&self) -> usize {
        self.buf.len()
    }

    /// True until a SOF has been accepted
    pub fn is_empty(&self) -> bool {
        self.buf.is_empty()
    }

    /// Raw bytes accumulated so far
    pub fn bytes(&self) -> &[u8] {
        &self.buf
    }

    /// Total frame length, once the LEN byte has been seen
    pub fn expected_len(&self) -> Option<usize> {
        self.buf
            .get(LEN_INDEX)
            .map(|&len| HEADER_LEN + len as usize)
    }

    /// Discard everything and wait for a new SOF
    pub fn reset(&mut self) {
        self.buf.clear();
        self.complete = false;
    }

    /// Feed one byte.
    ///
    /// Pushing onto a completed accumulator starts a new frame.
    pub fn push(&mut self, byte: u8) -> Result<Progress, FrameError> {
        if self.complete {
            self.reset();
        }

        if self.buf.is_empty() && byte != SOF {
            return Err(FrameError::Sof { found: byte });
        }
        self.buf.push(byte);

        match self.expected_len() {
            Some(need) if self.buf.len() >= need => {
                self.complete = true;
                self.validate().map(Progress::Complete)
            }
            need => Ok(Progress::Incomplete {
                have: self.buf.len(),
                need,
            }),
        }
    }

    /// Judge the bytes received so far as a whole frame.
    ///
    /// Fails with [`FrameError::Partial`] while bytes are still missing.
    pub fn finish(&self) -> Result<Frame, FrameError> {
        if let Some(&first) = self.buf.first() {
            if first != SOF {
                return Err(FrameError::Sof { found: first });
            }
        }
        let need = self.expected_len().unwrap_or(HEADER_LEN);
        if self.buf.len() < need {
            return Err(FrameError::Partial {
                have: self.buf.len(),
                need,
            });
        }
        self.validate()
    }

    fn validate(&self) -> Result<Frame, FrameError> {
        let need = self.expected_len().unwrap_or(HEADER_LEN);
        let actual = self.buf[CRC_INDEX];
        let expected = crc8(&self.buf[LEN_INDEX..need]);
        if actual != expected {
            return Err(FrameError::Crc { expected, actual });
        }
        Ok(Frame {
            kind: self.buf[KIND_INDEX],
            payload: self.buf[HEADER_LEN..need].to_vec(),
        })
    }
}
