//! Link, discovery and session configuration
//!
//! All tuning values flow through these structs; nothing is process-global.

use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

use super::{ProtocolError, DEFAULT_BAUD_RATE, DEFAULT_BYTE_TIMEOUT_MS, HEADER_LEN, MAX_PAYLOAD_LEN, SOF};

/// USB identity of the DIO add-in card's CDC interface
pub const DIO_VID: u16 = 0x353F;
/// USB product ID of the DIO card
pub const DIO_PID: u16 = 0xA105;

/// NACKs a probe may collect before the candidate is rejected
pub const NACKS_NEEDED: u32 = 5;

/// Probe window in milliseconds
pub const TIME_THRESHOLD_MS: u64 = 2500;

/// Which MCU a session talks to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    /// DIO add-in card on USB CDC; port is autodetected when not given
    DioCard,
    /// Automotive sequence MCU on a UART; port must be given
    Automotive,
}

/// Byte-level link settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LinkConfig {
    /// Baud rate
    pub baud_rate: u32,
    /// Deadline for each individual byte read
    pub byte_timeout_ms: u64,
    /// Pause after each completed command
    pub settle_delay_ms: u64,
    /// Consecutive NACKs that prove the MCU is idle before a command
    pub clearance_nacks: usize,
    /// Consecutive NACKs required when claiming/releasing the port
    pub resync_nacks: usize,
    /// Give up resynchronizing after this many ACK writes
    pub max_resync_writes: usize,
}

impl Default for LinkConfig {
    fn default() -> Self {
        Self {
            baud_rate: DEFAULT_BAUD_RATE,
            byte_timeout_ms: DEFAULT_BYTE_TIMEOUT_MS,
            settle_delay_ms: 3,
            clearance_nacks: 64,
            resync_nacks: MAX_PAYLOAD_LEN + HEADER_LEN,
            max_resync_writes: 1024,
        }
    }
}

impl LinkConfig {
    /// Per-byte timeout as a [`Duration`]
    pub fn byte_timeout(&self) -> Duration {
        Duration::from_millis(self.byte_timeout_ms)
    }

    /// Pause after each command as a [`Duration`]
    pub fn settle_delay(&self) -> Duration {
        Duration::from_millis(self.settle_delay_ms)
    }
}

/// Port discovery and probe tuning
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DiscoveryConfig {
    /// USB vendor ID of the DIO card
    pub vid: u16,
    /// USB product ID of the DIO card
    pub pid: u16,
    /// A candidate collecting this many NACKs inside the window is rejected
    pub nacks_needed: u32,
    /// Probe window
    pub time_threshold_ms: u64,
    /// Byte written to provoke an acknowledgment
    pub probe_byte: u8,
    /// Pause before re-sending the probe after a NACK
    pub retry_delay_ms: u64,
}

impl Default for DiscoveryConfig {
    fn default() -> Self {
        Self {
            vid: DIO_VID,
            pid: DIO_PID,
            nacks_needed: NACKS_NEEDED,
            time_threshold_ms: TIME_THRESHOLD_MS,
            probe_byte: SOF,
            retry_delay_ms: 3,
        }
    }
}

impl DiscoveryConfig {
    /// Probe window as a [`Duration`]
    pub fn time_threshold(&self) -> Duration {
        Duration::from_millis(self.time_threshold_ms)
    }

    /// Pause before re-sending the probe
    pub fn retry_delay(&self) -> Duration {
        Duration::from_millis(self.retry_delay_ms)
    }
}

/// Everything needed to claim a port and run commands on it
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionConfig {
    /// Which MCU this session talks to
    pub role: Role,
    /// Explicit port; optional for the DIO card, required for automotive
    #[serde(default)]
    pub port_name: Option<String>,
    /// Byte-level timing and resync limits
    #[serde(default)]
    pub link: LinkConfig,
    /// Probe and autodetection settings
    #[serde(default)]
    pub discovery: DiscoveryConfig,
}

impl SessionConfig {
    /// DIO card, autodetected by USB identity
    pub fn dio_card() -> Self {
        Self {
            role: Role::DioCard,
            port_name: None,
            link: LinkConfig::default(),
            discovery: DiscoveryConfig::default(),
        }
    }

    /// Automotive sequence MCU on an explicit UART
    pub fn automotive(port_name: impl Into<String>) -> Self {
        Self {
            role: Role::Automotive,
            port_name: Some(port_name.into()),
            link: LinkConfig::default(),
            discovery: DiscoveryConfig::default(),
        }
    }

    /// Same config with an explicit port
    pub fn with_port(mut self, port_name: impl Into<String>) -> Self {
        self.port_name = Some(port_name.into());
        self
    }

    /// Parse from JSON text
    pub fn from_json(text: &str) -> Result<Self, ProtocolError> {
        Ok(serde_json::from_str(text)?)
    }

    /// Load from a JSON file
    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self, ProtocolError> {
        let text = std::fs::read_to_string(path)?;
        Self::from_json(&text)
    }

    /// Save as pretty-printed JSON
    pub fn save_json_file(&self, path: impl AsRef<Path>) -> Result<(), ProtocolError> {
        let text = serde_json::to_string_pretty(self)?;
        std::fs::write(path, text)?;
        Ok(())
    }
}
