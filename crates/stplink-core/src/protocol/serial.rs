//! Serial port handling
//!
//! Enumerates and opens the host serial ports the MCUs appear on.

use serialport::{SerialPort, SerialPortInfo, SerialPortType};
use std::collections::HashMap;
#[cfg(target_os = "linux")]
use std::fs;
use std::time::Duration;

use super::{ProtocolError, DEFAULT_BAUD_RATE};

/// Information about an available serial port
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PortInfo {
    /// Port name (e.g., "/dev/ttyACM0" or "COM3")
    pub name: String,

    /// USB vendor ID (if USB device)
    pub vid: Option<u16>,

    /// USB product ID (if USB device)
    pub pid: Option<u16>,

    /// Manufacturer name (if available)
    pub manufacturer: Option<String>,

    /// Product name (if available)
    pub product: Option<String>,

    /// Serial number (if available)
    pub serial_number: Option<String>,
}

impl PortInfo {
    /// Port with no USB identity (UART, or found only under /dev)
    pub fn bare(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            vid: None,
            pid: None,
            manufacturer: None,
            product: None,
            serial_number: None,
        }
    }

    /// True if this port carries the given USB identity
    pub fn matches_usb(&self, vid: u16, pid: u16) -> bool {
        self.vid == Some(vid) && self.pid == Some(pid)
    }
}

impl From<SerialPortInfo> for PortInfo {
    fn from(info: SerialPortInfo) -> Self {
        match info.port_type {
            SerialPortType::UsbPort(usb_info) => Self {
                name: info.port_name,
                vid: Some(usb_info.vid),
                pid: Some(usb_info.pid),
                manufacturer: usb_info.manufacturer,
                product: usb_info.product,
                serial_number: usb_info.serial_number,
            },
            _ => Self::bare(info.port_name),
        }
    }
}

/// Sort key so that ttyACM* (CDC, the DIO card) comes first, then ttyUSB*,
/// then on-board UARTs (ttyS*, the sequence MCU), then everything else.
fn port_sort_key(name: &str) -> (u8, usize, String) {
    let basename = name.rsplit('/').next().unwrap_or(name);
    for (rank, prefix) in ["ttyACM", "ttyUSB", "ttyS"].iter().enumerate() {
        if let Some(rest) = basename.strip_prefix(prefix) {
            let num = rest.parse::<usize>().unwrap_or(usize::MAX);
            return (rank as u8, num, basename.to_string());
        }
    }
    if let Some(rest) = basename.strip_prefix("COM") {
        let num = rest.parse::<usize>().unwrap_or(usize::MAX);
        return (3, num, basename.to_string());
    }
    (4, 0, basename.to_string())
}

/// Sort ports deterministically
pub fn sort_ports(ports: &mut [PortInfo]) {
    ports.sort_by_key(|p| port_sort_key(&p.name));
}

/// List all available serial ports, with /dev fallbacks and deterministic ordering
pub fn list_ports() -> Vec<PortInfo> {
    let mut map: HashMap<String, PortInfo> = HashMap::new();
    for info in serialport::available_ports().unwrap_or_default() {
        let p = PortInfo::from(info);
        map.entry(p.name.clone()).or_insert(p);
    }

    // Linux-only: pick up CDC/USB nodes the enumeration API missed
    #[cfg(target_os = "linux")]
    if let Ok(entries) = fs::read_dir("/dev") {
        for entry in entries.flatten() {
            if let Some(fname) = entry.file_name().to_str() {
                if fname.starts_with("ttyACM") || fname.starts_with("ttyUSB") {
                    let full = format!("/dev/{}", fname);
                    map.entry(full.clone())
                        .or_insert_with(|| PortInfo::bare(full));
                }
            }
        }
    }

    let mut v: Vec<PortInfo> = map.into_values().collect();
    sort_ports(&mut v);
    v
}

/// One line per port, for diagnostics after a failed claim
pub fn describe_ports(ports: &[PortInfo]) -> Vec<String> {
    ports
        .iter()
        .map(|p| match (p.vid, p.pid) {
            (Some(vid), Some(pid)) => format!(
                "{} [{:04X}:{:04X}] {}",
                p.name,
                vid,
                pid,
                p.product.as_deref().unwrap_or("")
            )
            .trim_end()
            .to_string(),
            _ => p.name.clone(),
        })
        .collect()
}

/// Open a serial port configured 8N1 without flow control
pub fn open_port(name: &str, baud_rate: Option<u32>) -> Result<Box<dyn SerialPort>, ProtocolError> {
    let baud = baud_rate.unwrap_or(DEFAULT_BAUD_RATE);

    serialport::new(name, baud)
        .data_bits(serialport::DataBits::Eight)
        .parity(serialport::Parity::None)
        .stop_bits(serialport::StopBits::One)
        .flow_control(serialport::FlowControl::None)
        .timeout(Duration::from_millis(100))
        .open()
        .map_err(|e| ProtocolError::SerialError(format!("{name}: {e}")))
}
