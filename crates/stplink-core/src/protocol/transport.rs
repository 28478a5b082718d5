//! Byte-level transport
//!
//! Turns the one-byte-at-a-time ACK/NACK handshake into a frame-level
//! send/receive contract. Both directions are strictly lock-step: no byte
//! is written before the previous one has been answered.
//!
//! Receiving works by "pulling": the host writes an ACK, the MCU answers
//! with the next frame byte. Once the whole frame is acknowledged the MCU
//! answers the final ACK with a NACK, meaning "frame complete".

use std::time::Duration;
use tracing::{debug, error, trace, warn};

use super::{Frame, FrameAccumulator, FrameError, Progress, ProtocolError, SerialLink, ACK, HEADER_LEN, NACK};

/// Send `frame`, consuming one acknowledgment per byte.
///
/// Aborts on the first NACK, foreign byte or timeout; remaining bytes are
/// not transmitted. There is no retry at this layer.
pub fn send_frame<L: SerialLink + ?Sized>(
    link: &mut L,
    frame: &Frame,
    byte_timeout: Duration,
) -> Result<(), ProtocolError> {
    let bytes = frame.to_bytes();
    debug!("send_frame: {} bytes: {:02x?}", bytes.len(), bytes);

    for (index, &byte) in bytes.iter().enumerate() {
        link.write_byte(byte)?;
        match link.read_byte(byte_timeout)? {
            Some(ACK) => trace!("send_frame: byte {} ({:#04x}) acknowledged", index, byte),
            Some(NACK) => {
                error!("send_frame: MCU rejected byte {} ({:#04x})", index, byte);
                return Err(ProtocolError::Nack { index });
            }
            Some(other) => {
                error!(
                    "send_frame: byte {} answered with {:#04x} instead of ACK",
                    index, other
                );
                return Err(ProtocolError::UnexpectedAck { index, byte: other });
            }
            None => {
                error!("send_frame: no acknowledgment for byte {}", index);
                return Err(ProtocolError::NoAck { index });
            }
        }
    }
    Ok(())
}

/// Receive one frame, answering every byte with ACK (expected) or NACK
/// (rejected), then check the MCU's end-of-frame NACK.
pub fn receive_frame<L: SerialLink + ?Sized>(
    link: &mut L,
    byte_timeout: Duration,
) -> Result<Frame, ProtocolError> {
    let mut acc = FrameAccumulator::new();

    // Prompt the MCU for the first byte
    link.write_byte(ACK)?;

    let frame = loop {
        let byte = match link.read_byte(byte_timeout)? {
            Some(b) => b,
            None => {
                let need = acc.expected_len().unwrap_or(HEADER_LEN);
                warn!(
                    "receive_frame: stalled after {} of {} bytes: {:02x?}",
                    acc.len(),
                    need,
                    acc.bytes()
                );
                return Err(FrameError::Partial {
                    have: acc.len(),
                    need,
                }
                .into());
            }
        };
        trace!("receive_frame: got {:#04x}", byte);

        match acc.push(byte) {
            Ok(Progress::Incomplete { .. }) => link.write_byte(ACK)?,
            Ok(Progress::Complete(frame)) => {
                link.write_byte(ACK)?;
                break frame;
            }
            Err(e) => {
                link.write_byte(NACK)?;
                error!("receive_frame: {}", e);
                return Err(e.into());
            }
        }
    };

    match link.read_byte(byte_timeout)? {
        Some(NACK) => {
            debug!(
                "receive_frame: kind {:#04x}, payload {:02x?}",
                frame.kind(),
                frame.payload()
            );
            Ok(frame)
        }
        Some(ACK) => {
            error!("receive_frame: MCU acknowledged instead of terminating the frame");
            Err(ProtocolError::AckInsteadOfTerminator)
        }
        other => {
            error!("receive_frame: missing end-of-frame NACK, got {:02x?}", other);
            Err(ProtocolError::MissingTerminator(other))
        }
    }
}

/// Bring the MCU to a known idle state.
///
/// Writes ACKs until `nacks` consecutive NACKs come back; any other reply
/// restarts the count. Flushes host buffers first when `flush_host` is set.
/// Returns the number of ACKs written.
pub fn clear_mcu<L: SerialLink + ?Sized>(
    link: &mut L,
    nacks: usize,
    max_writes: usize,
    flush_host: bool,
    byte_timeout: Duration,
) -> Result<usize, ProtocolError> {
    if flush_host {
        link.clear_buffers()?;
    }

    let mut remaining = nacks;
    let mut writes = 0;
    while remaining > 0 {
        if writes >= max_writes {
            error!("clear_mcu: cannot recover MCU after {} writes", writes);
            return Err(ProtocolError::ResyncFailed(writes));
        }
        link.write_byte(ACK)?;
        writes += 1;
        match link.read_byte(byte_timeout)? {
            Some(NACK) => remaining -= 1,
            Some(_) => remaining = nacks,
            None => {
                error!("clear_mcu: MCU silent after {} writes", writes);
                return Err(ProtocolError::ResyncFailed(writes));
            }
        }
    }
    trace!("clear_mcu: idle after {} writes", writes);
    Ok(writes)
}
