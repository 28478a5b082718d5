//! Command session
//!
//! Owns one claimed port and runs request/response exchanges on it. Every
//! failure below this boundary is folded into a [`Status`]; callers that
//! want the underlying error use [`Session::try_invoke`] instead.

use byteorder::{ByteOrder, LittleEndian};
use serde::{Deserialize, Serialize};
use serialport::SerialPort;
use std::sync::{Arc, Mutex, MutexGuard};
use tracing::{debug, error, info, warn};

use super::discovery::{self, Claimed, PortLease};
use super::transport::{clear_mcu, receive_frame, send_frame};
use super::{
    list_ports, open_port, Frame, FrameError, PortInfo, ProtocolError, SerialLink, SessionConfig,
    Status, MAX_PAYLOAD_LEN,
};

/// One typed command argument
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Arg {
    /// Single byte (pin number, binary flag)
    U8(u8),
    /// 8-byte little-endian integer (timers, voltages)
    U64Le(u64),
    /// Raw bytes copied as-is
    Bytes(Vec<u8>),
    /// A required value the caller did not supply
    Missing,
}

impl From<u8> for Arg {
    fn from(v: u8) -> Self {
        Arg::U8(v)
    }
}

impl From<Option<u8>> for Arg {
    fn from(v: Option<u8>) -> Self {
        v.map_or(Arg::Missing, Arg::U8)
    }
}

/// Expected shape of a response payload
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Response {
    /// Acknowledgment only; the echoed payload is not interpreted
    Ack,
    /// Last payload byte, must be 0 or 1
    Binary,
    /// Whole payload as a little-endian unsigned integer (1..=8 bytes)
    UnsignedLe,
    /// 4-byte little-endian IEEE-754 float
    FloatLe,
    /// Payload bytes joined with '.'
    Version,
}

/// Decoded response value
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Value {
    /// Single byte: flags, pin states
    U8(u8),
    /// Unsigned integer: timers, centivolts
    U64(u64),
    /// Float: volts
    F32(f32),
    /// Dotted version string
    Version(String),
}

impl Value {
    /// Byte value, if this is one
    pub fn as_u8(&self) -> Option<u8> {
        match self {
            Value::U8(v) => Some(*v),
            _ => None,
        }
    }

    /// Integer value, widening bytes
    pub fn as_u64(&self) -> Option<u64> {
        match self {
            Value::U8(v) => Some(u64::from(*v)),
            Value::U64(v) => Some(*v),
            _ => None,
        }
    }

    /// Float value, if this is one
    pub fn as_f32(&self) -> Option<f32> {
        match self {
            Value::F32(v) => Some(*v),
            _ => None,
        }
    }

    /// Version string, if this is one
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::Version(s) => Some(s),
            _ => None,
        }
    }
}

/// Serialize `args` into a request payload.
///
/// Fails before any I/O if an argument is missing or the result would not
/// fit in a frame.
pub fn encode_args(kind: u8, args: &[Arg]) -> Result<Vec<u8>, ProtocolError> {
    let mut payload = Vec::new();
    for arg in args {
        match arg {
            Arg::U8(v) => payload.push(*v),
            Arg::U64Le(v) => {
                let mut buf = [0u8; 8];
                LittleEndian::write_u64(&mut buf, *v);
                payload.extend_from_slice(&buf);
            }
            Arg::Bytes(bytes) => payload.extend_from_slice(bytes),
            Arg::Missing => {
                error!("encode_args: missing argument for kind {:#04x}", kind);
                return Err(ProtocolError::MissingArgument { kind });
            }
        }
    }
    if payload.len() > MAX_PAYLOAD_LEN {
        return Err(FrameError::PayloadTooLong(payload.len()).into());
    }
    Ok(payload)
}

/// Convert a response payload to a typed value
pub fn decode_result(kind: u8, shape: Response, payload: &[u8]) -> Result<Option<Value>, ProtocolError> {
    let last = match shape {
        Response::Ack => return Ok(None),
        _ => *payload.last().ok_or(ProtocolError::EmptyPayload { kind })?,
    };

    let value = match shape {
        Response::Binary if last > 1 => {
            return Err(ProtocolError::ValueOutOfRange(format!(
                "kind {:#04x}: {} is not a binary value",
                kind, last
            )));
        }
        Response::Binary => Value::U8(last),
        Response::UnsignedLe => {
            if payload.len() > 8 {
                return Err(ProtocolError::ValueOutOfRange(format!(
                    "kind {:#04x}: {}-byte integer does not fit in 64 bits",
                    kind,
                    payload.len()
                )));
            }
            Value::U64(LittleEndian::read_uint(payload, payload.len()))
        }
        Response::FloatLe => {
            if payload.len() != 4 {
                return Err(ProtocolError::ValueOutOfRange(format!(
                    "kind {:#04x}: expected 4 float bytes, got {}",
                    kind,
                    payload.len()
                )));
            }
            let v = LittleEndian::read_f32(payload);
            if !v.is_finite() {
                return Err(ProtocolError::ValueOutOfRange(format!(
                    "kind {:#04x}: non-finite float",
                    kind
                )));
            }
            Value::F32(v)
        }
        Response::Version => Value::Version(
            payload
                .iter()
                .map(|b| b.to_string())
                .collect::<Vec<_>>()
                .join("."),
        ),
        Response::Ack => return Ok(None),
    };
    Ok(Some(value))
}

/// Traffic counters for a session
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct Counters {
    /// Request bytes written
    pub tx_bytes: u64,
    /// Response bytes received
    pub rx_bytes: u64,
    /// Requests sent
    pub tx_frames: u64,
    /// Responses received
    pub rx_frames: u64,
}

/// A session bound to at most one claimed port
pub struct Session<L: SerialLink = Box<dyn SerialPort>> {
    config: SessionConfig,
    link: Option<L>,
    port_name: Option<String>,
    lease: Option<PortLease>,
    counters: Counters,
}

impl Session<Box<dyn SerialPort>> {
    /// Claim a real serial port as described by `config`
    pub fn claim(config: SessionConfig) -> Result<Self, ProtocolError> {
        let mut session = Self::new(config);
        session.connect()?;
        Ok(session)
    }

    /// Enumerate host ports and claim one
    pub fn connect(&mut self) -> Result<(), ProtocolError> {
        let candidates = list_ports();
        let baud_rate = self.config.link.baud_rate;
        self.connect_with(&candidates, |name| open_port(name, Some(baud_rate)))
    }
}

impl<L: SerialLink> Session<L> {
    /// Unclaimed session
    pub fn new(config: SessionConfig) -> Self {
        Self {
            config,
            link: None,
            port_name: None,
            lease: None,
            counters: Counters::default(),
        }
    }

    /// Claim a port from `candidates`, opening them with `open`
    pub fn claim_with<F>(config: SessionConfig, candidates: &[PortInfo], open: F) -> Result<Self, ProtocolError>
    where
        F: FnMut(&str) -> Result<L, ProtocolError>,
    {
        let mut session = Self::new(config);
        session.connect_with(candidates, open)?;
        Ok(session)
    }

    /// Wrap an already-open link, skipping discovery and the port lease
    pub fn from_link(config: SessionConfig, port_name: impl Into<String>, link: L) -> Self {
        Self {
            config,
            link: Some(link),
            port_name: Some(port_name.into()),
            lease: None,
            counters: Counters::default(),
        }
    }

    /// Claim a port from `candidates`; fails if one is already held
    pub fn connect_with<F>(&mut self, candidates: &[PortInfo], open: F) -> Result<(), ProtocolError>
    where
        F: FnMut(&str) -> Result<L, ProtocolError>,
    {
        if self.link.is_some() {
            return Err(ProtocolError::AlreadyConnected);
        }

        let Claimed {
            port_name,
            mut link,
            lease,
        } = discovery::claim(&self.config, candidates, open)?;

        let link_cfg = &self.config.link;
        clear_mcu(
            &mut link,
            link_cfg.resync_nacks,
            link_cfg.max_resync_writes,
            true,
            link_cfg.byte_timeout(),
        )?;

        info!("Claimed {} ({:?})", port_name, self.config.role);
        self.link = Some(link);
        self.port_name = Some(port_name);
        self.lease = Some(lease);
        Ok(())
    }

    /// True while a port is held
    pub fn is_claimed(&self) -> bool {
        self.link.is_some()
    }

    /// Name of the claimed port
    pub fn port_name(&self) -> Option<&str> {
        self.port_name.as_deref()
    }

    /// Configuration this session was built with
    pub fn config(&self) -> &SessionConfig {
        &self.config
    }

    /// Traffic counters since creation
    pub fn counters(&self) -> Counters {
        self.counters
    }

    /// Resynchronize the MCU and give up the port. Safe to call twice.
    pub fn release(&mut self) {
        let Some(mut link) = self.link.take() else {
            return;
        };
        let link_cfg = &self.config.link;
        if let Err(e) = clear_mcu(
            &mut link,
            link_cfg.resync_nacks,
            link_cfg.max_resync_writes,
            true,
            link_cfg.byte_timeout(),
        ) {
            warn!("Resync on release failed: {}", e);
        }
        if let Some(name) = self.port_name.take() {
            info!("Released {}", name);
        }
        self.lease = None;
    }

    /// Run one command and return the decoded value, or the first error
    pub fn try_invoke(
        &mut self,
        kind: impl Into<u8>,
        args: &[Arg],
        shape: Response,
    ) -> Result<Option<Value>, ProtocolError> {
        let kind = kind.into();

        // Argument checks come first so a bad call never touches the wire
        let payload = encode_args(kind, args)?;
        let request = Frame::new(kind, payload)?;

        let link_cfg = &self.config.link;
        let timeout = link_cfg.byte_timeout();
        let link = self.link.as_mut().ok_or(ProtocolError::NotConnected)?;

        clear_mcu(
            link,
            link_cfg.clearance_nacks,
            link_cfg.max_resync_writes,
            true,
            timeout,
        )?;

        send_frame(link, &request, timeout)?;
        self.counters.tx_bytes += request.encoded_size() as u64;
        self.counters.tx_frames += 1;

        let response = receive_frame(link, timeout)?;
        self.counters.rx_bytes += response.encoded_size() as u64;
        self.counters.rx_frames += 1;

        if let Err(e) = clear_mcu(
            link,
            link_cfg.clearance_nacks,
            link_cfg.max_resync_writes,
            false,
            timeout,
        ) {
            warn!("Post-response clearance failed: {}", e);
        }

        if response.kind() != kind {
            return Err(ProtocolError::UnexpectedKind {
                expected: kind,
                actual: response.kind(),
            });
        }

        let value = decode_result(kind, shape, response.payload())?;
        debug!("kind {:#04x} -> {:?}", kind, value);
        std::thread::sleep(link_cfg.settle_delay());
        Ok(value)
    }

    /// Run one command, folding any failure into a [`Status`]
    pub fn invoke(&mut self, kind: impl Into<u8>, args: &[Arg], shape: Response) -> (Status, Option<Value>) {
        let kind = kind.into();
        match self.try_invoke(kind, args, shape) {
            Ok(value) => (Status::Success, value),
            Err(e) => {
                let status = Status::from(&e);
                error!("kind {:#04x} failed: {} -> {}", kind, e, status);
                (status, None)
            }
        }
    }
}

impl<L: SerialLink> Drop for Session<L> {
    fn drop(&mut self) {
        self.release();
    }
}

/// Session shared between callers; commands are serialized on the mutex
pub struct SharedSession<L: SerialLink = Box<dyn SerialPort>> {
    inner: Arc<Mutex<Session<L>>>,
}

impl<L: SerialLink> Clone for SharedSession<L> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<L: SerialLink> SharedSession<L> {
    /// Share `session` between callers
    pub fn new(session: Session<L>) -> Self {
        Self {
            inner: Arc::new(Mutex::new(session)),
        }
    }

    fn lock(&self) -> MutexGuard<'_, Session<L>> {
        // A panic mid-command leaves the MCU in an unknown state, but the
        // next command's clearance pass recovers it.
        self.inner.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// See [`Session::invoke`]
    pub fn invoke(&self, kind: impl Into<u8>, args: &[Arg], shape: Response) -> (Status, Option<Value>) {
        self.lock().invoke(kind, args, shape)
    }

    /// See [`Session::try_invoke`]
    pub fn try_invoke(
        &self,
        kind: impl Into<u8>,
        args: &[Arg],
        shape: Response,
    ) -> Result<Option<Value>, ProtocolError> {
        self.lock().try_invoke(kind, args, shape)
    }

    /// Run `f` with exclusive access, e.g. to chain commands atomically
    pub fn with<R>(&self, f: impl FnOnce(&mut Session<L>) -> R) -> R {
        f(&mut self.lock())
    }

    /// See [`Session::release`]
    pub fn release(&self) {
        self.lock().release();
    }
}

impl<L: SerialLink> From<Session<L>> for SharedSession<L> {
    fn from(session: Session<L>) -> Self {
        Self::new(session)
    }
}
