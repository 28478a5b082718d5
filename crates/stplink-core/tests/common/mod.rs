//! In-memory MCU for integration tests
//!
//! Speaks the device side of STP: acknowledges each byte of an incoming
//! frame, answers idle ACKs with NACK, and streams a queued response one
//! byte per host ACK followed by the NACK terminator.

#![allow(dead_code)]

use std::collections::{HashMap, VecDeque};
use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use stplink_core::protocol::frame::encode;
use stplink_core::protocol::{crc8, ProtocolError, SerialLink, SessionConfig, ACK, NACK, SOF};

type Handler = Box<dyn FnMut(u8, &[u8]) -> Option<(u8, Vec<u8>)> + Send>;

enum Phase {
    Idle,
    Receiving(Vec<u8>),
    Sending { bytes: Vec<u8>, pos: usize },
}

pub struct McuState {
    phase: Phase,
    outbox: VecDeque<u8>,
    pending: Option<Vec<u8>>,
    handler: Handler,
    /// Every byte the host wrote, in order
    pub written: Vec<u8>,
    /// Every well-formed frame received, as (kind, payload)
    pub frames: Vec<(u8, Vec<u8>)>,
    /// Reply to every host byte with this instead of following the protocol
    pub stuck_reply: Option<u8>,
    /// Byte sent after the last response byte
    pub terminator: u8,
    /// XOR applied to the CRC of outgoing frames
    pub crc_corruption: u8,
    pub clears: usize,
}

impl McuState {
    fn on_byte(&mut self, byte: u8) {
        self.written.push(byte);
        if let Some(reply) = self.stuck_reply {
            self.outbox.push_back(reply);
            return;
        }

        let phase = std::mem::replace(&mut self.phase, Phase::Idle);
        self.phase = match phase {
            Phase::Idle if byte == SOF => {
                self.outbox.push_back(ACK);
                Phase::Receiving(vec![SOF])
            }
            Phase::Idle if byte == ACK => match self.pending.take() {
                Some(bytes) => {
                    self.outbox.push_back(bytes[0]);
                    Phase::Sending { bytes, pos: 1 }
                }
                None => {
                    self.outbox.push_back(NACK);
                    Phase::Idle
                }
            },
            Phase::Idle => {
                self.outbox.push_back(NACK);
                Phase::Idle
            }
            Phase::Receiving(mut buf) => {
                buf.push(byte);
                self.outbox.push_back(ACK);
                if buf.len() >= 3 && buf.len() == 4 + buf[2] as usize {
                    self.complete(&buf);
                    Phase::Idle
                } else {
                    Phase::Receiving(buf)
                }
            }
            Phase::Sending { bytes, pos } => {
                if byte != ACK {
                    // Host rejected a byte; drop the response
                    Phase::Idle
                } else if pos < bytes.len() {
                    self.outbox.push_back(bytes[pos]);
                    Phase::Sending { bytes, pos: pos + 1 }
                } else {
                    self.outbox.push_back(self.terminator);
                    Phase::Idle
                }
            }
        };
    }

    fn complete(&mut self, buf: &[u8]) {
        // Garbage that happens to reach its declared length is discarded
        if crc8(&buf[2..]) != buf[1] {
            return;
        }
        let kind = buf[3];
        let payload = buf[4..].to_vec();
        self.frames.push((kind, payload.clone()));
        if let Some((resp_kind, resp_payload)) = (self.handler)(kind, &payload) {
            if let Ok(mut bytes) = encode(resp_kind, &resp_payload) {
                bytes[1] ^= self.crc_corruption;
                self.pending = Some(bytes);
            }
        }
    }
}

/// Cloneable handle to a simulated MCU; clones share state
#[derive(Clone)]
pub struct SimulatedMcu {
    state: Arc<Mutex<McuState>>,
}

impl SimulatedMcu {
    pub fn new(handler: impl FnMut(u8, &[u8]) -> Option<(u8, Vec<u8>)> + Send + 'static) -> Self {
        Self {
            state: Arc::new(Mutex::new(McuState {
                phase: Phase::Idle,
                outbox: VecDeque::new(),
                pending: None,
                handler: Box::new(handler),
                written: Vec::new(),
                frames: Vec::new(),
                stuck_reply: None,
                terminator: NACK,
                crc_corruption: 0,
                clears: 0,
            })),
        }
    }

    /// MCU that echoes the request kind with a fixed payload
    pub fn echo(payload: Vec<u8>) -> Self {
        Self::new(move |kind, _| Some((kind, payload.clone())))
    }

    /// Register-backed MCU: GET kinds read `registers[kind]`, SET kinds
    /// (odd automotive codes, DIO sets) store the payload and echo it.
    pub fn with_registers(registers: HashMap<u8, Vec<u8>>) -> Self {
        let mut regs = registers;
        Self::new(move |kind, payload| match kind {
            // SET_DO: [pin, value] -> GET_DO register for that pin
            0x21 => {
                regs.insert(0x80 | payload[0], vec![payload[1]]);
                Some((kind, vec![payload[1]]))
            }
            0x20 | 0x22 => {
                let key = if kind == 0x22 { 0x80 | payload[0] } else { 0x40 | payload[0] };
                Some((kind, regs.get(&key).cloned().unwrap_or_else(|| vec![0])))
            }
            0x52 | 0x53 => {
                regs.insert(kind - 2, payload.to_vec());
                Some((kind, payload.to_vec()))
            }
            0x07 | 0x09 | 0x0B | 0x0D | 0x0F | 0x11 | 0x13 => {
                regs.insert(kind - 1, payload.to_vec());
                Some((kind, payload.to_vec()))
            }
            _ => Some((kind, regs.get(&kind).cloned().unwrap_or_default())),
        })
    }

    /// MCU that answers everything with `reply`
    pub fn stuck(reply: u8) -> Self {
        let mcu = Self::echo(vec![]);
        mcu.state().stuck_reply = Some(reply);
        mcu
    }

    pub fn state(&self) -> MutexGuard<'_, McuState> {
        self.state.lock().unwrap()
    }

    pub fn written(&self) -> Vec<u8> {
        self.state().written.clone()
    }

    pub fn frames(&self) -> Vec<(u8, Vec<u8>)> {
        self.state().frames.clone()
    }

    pub fn kinds(&self) -> Vec<u8> {
        self.frames().into_iter().map(|(kind, _)| kind).collect()
    }
}

impl fmt::Debug for SimulatedMcu {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = self.state();
        f.debug_struct("SimulatedMcu")
            .field("written", &state.written.len())
            .field("frames", &state.frames.len())
            .finish()
    }
}

impl SerialLink for SimulatedMcu {
    fn write_byte(&mut self, byte: u8) -> Result<(), ProtocolError> {
        self.state().on_byte(byte);
        Ok(())
    }

    fn read_byte(&mut self, _timeout: Duration) -> Result<Option<u8>, ProtocolError> {
        Ok(self.state().outbox.pop_front())
    }

    fn clear_buffers(&mut self) -> Result<(), ProtocolError> {
        let mut state = self.state();
        state.outbox.clear();
        state.clears += 1;
        Ok(())
    }

    fn name(&self) -> String {
        String::from("simulated-mcu")
    }
}

/// Config with short timeouts and no settle delay
pub fn fast_config(config: SessionConfig) -> SessionConfig {
    let mut config = config;
    config.link.byte_timeout_ms = 20;
    config.link.settle_delay_ms = 0;
    config.discovery.retry_delay_ms = 0;
    config.discovery.time_threshold_ms = 500;
    config
}

/// Subscriber for `RUST_LOG=debug cargo test` runs
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}
