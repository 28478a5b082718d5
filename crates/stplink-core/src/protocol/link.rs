//! Byte-level link capability
//!
//! The transport only needs to write single bytes, read single bytes with a
//! deadline, and flush. Real ports and test doubles both implement this.

use serialport::SerialPort;
use std::io::{Read, Write};
use std::time::{Duration, Instant};

use super::ProtocolError;

/// Poll interval while waiting for a byte
const POLL_INTERVAL: Duration = Duration::from_millis(1);

/// Minimal serial capability used by the STP transport
pub trait SerialLink: Send {
    /// Write and flush a single byte
    fn write_byte(&mut self, byte: u8) -> Result<(), ProtocolError>;

    /// Read a single byte, returning `Ok(None)` if `timeout` elapses first.
    ///
    /// A closed or reset port must surface as `Err`, never as a hang.
    fn read_byte(&mut self, timeout: Duration) -> Result<Option<u8>, ProtocolError>;

    /// Discard anything pending in the host's input and output buffers
    fn clear_buffers(&mut self) -> Result<(), ProtocolError>;

    /// Human-readable name for logs
    fn name(&self) -> String {
        String::from("<link>")
    }
}

impl SerialLink for Box<dyn SerialPort> {
    fn write_byte(&mut self, byte: u8) -> Result<(), ProtocolError> {
        self.write_all(&[byte])
            .map_err(|e| ProtocolError::SerialError(e.to_string()))?;
        self.flush()
            .map_err(|e| ProtocolError::SerialError(e.to_string()))
    }

    fn read_byte(&mut self, timeout: Duration) -> Result<Option<u8>, ProtocolError> {
        // Poll bytes_to_read() rather than blocking in read(); some USB CDC
        // drivers ignore the port timeout.
        let start = Instant::now();
        let mut buf = [0u8; 1];
        loop {
            let available = SerialPort::bytes_to_read(&**self)
                .map_err(|e| ProtocolError::SerialError(e.to_string()))?;
            if available > 0 {
                match self.read(&mut buf) {
                    Ok(0) => return Err(ProtocolError::SerialError("port closed".into())),
                    Ok(_) => return Ok(Some(buf[0])),
                    Err(ref e)
                        if e.kind() == std::io::ErrorKind::TimedOut
                            || e.kind() == std::io::ErrorKind::WouldBlock => {}
                    Err(e) => return Err(ProtocolError::SerialError(e.to_string())),
                }
            }
            if start.elapsed() >= timeout {
                return Ok(None);
            }
            std::thread::sleep(POLL_INTERVAL);
        }
    }

    fn clear_buffers(&mut self) -> Result<(), ProtocolError> {
        self.clear(serialport::ClearBuffer::All)
            .map_err(|e| ProtocolError::SerialError(e.to_string()))
    }

    fn name(&self) -> String {
        SerialPort::name(&**self).unwrap_or_else(|| String::from("<serial>"))
    }
}
