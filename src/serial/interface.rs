use std::io::{ErrorKind, Read, Write};
use std::time::Duration;

use async_trait::async_trait;
use serialport::{SerialPort, SerialPortInfo, SerialPortType};

use super::{Result, SerialDeviceInfo, SerialError};

pub const BAUD_RATE: u32 = 9600;
/// Zero timeout: reads hand back whatever is buffered and never wait for a line.
pub const READ_TIMEOUT: Duration = Duration::from_millis(0);
pub const DEFAULT_DEVICE_MATCH: &str = "Arduino";

const MAX_PENDING_BYTES: usize = 8192;
const TRIMMED_PENDING_BYTES: usize = 4096;

/// Byte-level link to the sensor board.
///
/// Implementations must not block waiting for a full line: `read_line`
/// returns an empty string when no complete line is available yet.
#[async_trait]
pub trait SerialTransport: Send {
    /// Write raw bytes. No terminator is appended.
    async fn write_bytes(&mut self, data: &[u8]) -> Result<usize>;

    /// Return the next complete line without its `\n`, or `""` if none is ready.
    async fn read_line(&mut self) -> Result<String>;

    fn port_name(&self) -> &str;
}

/// Opens a fresh transport. Used at startup and again after the link drops.
pub trait Connector: Send + Sync {
    fn connect(&self) -> Result<Box<dyn SerialTransport>>;
}

/// Selects a port by its human-readable description.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DeviceMatcher {
    /// Case-sensitive substring of the port description.
    Description(String),
}

impl DeviceMatcher {
    pub fn matches(&self, device: &SerialDeviceInfo) -> bool {
        match self {
            DeviceMatcher::Description(needle) => device.description.contains(needle.as_str()),
        }
    }
}

impl Default for DeviceMatcher {
    fn default() -> Self {
        DeviceMatcher::Description(DEFAULT_DEVICE_MATCH.to_string())
    }
}

/// Human-readable description of a port, close to what OS device managers show.
fn port_description(port: &SerialPortInfo) -> String {
    match &port.port_type {
        SerialPortType::UsbPort(usb_info) => {
            let parts: Vec<&str> = [usb_info.manufacturer.as_deref(), usb_info.product.as_deref()]
                .into_iter()
                .flatten()
                .collect();
            if parts.is_empty() {
                format!("USB device {:04x}:{:04x}", usb_info.vid, usb_info.pid)
            } else {
                parts.join(" ")
            }
        }
        SerialPortType::BluetoothPort => "Bluetooth serial port".to_string(),
        SerialPortType::PciPort => "PCI serial port".to_string(),
        SerialPortType::Unknown => "n/a".to_string(),
    }
}

/// Pick the first device, by port name, whose description satisfies `matcher`.
pub fn select_device(mut devices: Vec<SerialDeviceInfo>, matcher: &DeviceMatcher) -> Option<SerialDeviceInfo> {
    devices.sort_by(|a, b| a.port_name.cmp(&b.port_name));
    devices.into_iter().find(|d| matcher.matches(d))
}

pub struct SerialInterface {
    port: Box<dyn SerialPort>,
    port_name: String,
    pending: Vec<u8>,
}

impl SerialInterface {
    /// List every serial port on the system
    pub fn available_devices() -> Result<Vec<SerialDeviceInfo>> {
        let ports = serialport::available_ports()?;
        Ok(ports
            .iter()
            .map(|port| SerialDeviceInfo {
                port_name: port.port_name.clone(),
                description: port_description(port),
            })
            .collect())
    }

    /// Find the sensor board among the available ports
    pub fn find_device(matcher: &DeviceMatcher) -> Result<SerialDeviceInfo> {
        let devices = Self::available_devices()?;
        log::debug!("Scanning {} serial ports for {:?}", devices.len(), matcher);
        select_device(devices, matcher)
            .ok_or_else(|| SerialError::PortNotFound(format!("no port matching {:?}", matcher)))
    }

    pub fn open(port_name: &str, baud_rate: u32, read_timeout: Duration) -> Result<Self> {
        let port = serialport::new(port_name, baud_rate)
            .timeout(read_timeout)
            .open()
            .map_err(|e| SerialError::ConnectionFailed(e.to_string()))?;

        log::info!("Opened {} at {} baud", port_name, baud_rate);
        Ok(Self {
            port,
            port_name: port_name.to_string(),
            pending: Vec::new(),
        })
    }

    /// Pull whatever the OS has buffered into `pending` without waiting.
    fn fill_pending(&mut self) -> Result<()> {
        let available = self.port.bytes_to_read()? as usize;
        if available == 0 {
            return Ok(());
        }

        let mut buffer = vec![0u8; available];
        match self.port.read(&mut buffer) {
            Ok(n) => self.pending.extend_from_slice(&buffer[..n]),
            Err(ref e) if e.kind() == ErrorKind::TimedOut || e.kind() == ErrorKind::WouldBlock => {}
            Err(e) => return Err(SerialError::IoError(e)),
        }

        if self.pending.len() > MAX_PENDING_BYTES {
            let excess = self.pending.len() - TRIMMED_PENDING_BYTES;
            self.pending.drain(..excess);
            log::warn!("{}: discarded {} bytes with no line terminator", self.port_name, excess);
        }
        Ok(())
    }
}

/// Split the first `\n`-terminated line off the front of `pending`.
pub(crate) fn take_line(pending: &mut Vec<u8>) -> Option<String> {
    let pos = pending.iter().position(|&b| b == b'\n')?;
    let line: Vec<u8> = pending.drain(..=pos).collect();
    Some(String::from_utf8_lossy(&line[..pos]).into_owned())
}

#[async_trait]
impl SerialTransport for SerialInterface {
    async fn write_bytes(&mut self, data: &[u8]) -> Result<usize> {
        self.port.write_all(data).map_err(SerialError::IoError)?;
        self.port.flush().map_err(SerialError::IoError)?;
        Ok(data.len())
    }

    async fn read_line(&mut self) -> Result<String> {
        self.fill_pending()?;
        Ok(take_line(&mut self.pending).unwrap_or_default())
    }

    fn port_name(&self) -> &str {
        &self.port_name
    }
}

/// Connects to real hardware, either a fixed port or the first matching one.
pub struct SerialConnector {
    matcher: DeviceMatcher,
    fixed_port: Option<String>,
}

impl SerialConnector {
    pub fn new(matcher: DeviceMatcher, fixed_port: Option<String>) -> Self {
        Self { matcher, fixed_port }
    }
}

impl Connector for SerialConnector {
    fn connect(&self) -> Result<Box<dyn SerialTransport>> {
        let port_name = match &self.fixed_port {
            Some(port) => port.clone(),
            None => SerialInterface::find_device(&self.matcher)?.port_name,
        };
        let interface = SerialInterface::open(&port_name, BAUD_RATE, READ_TIMEOUT)?;
        Ok(Box::new(interface))
    }
}
