//! Serial port (UART) transport

use std::io::{Read, Write};
use std::sync::atomic::AtomicBool;
use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use serde::{Deserialize, Serialize};
use serialport::{DataBits, FlowControl, Parity, SerialPort, StopBits};

use super::{read_len, GnssChannel, RetryPolicy, TransportError, TransportStats};

/// Serial port flow control type
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum SerialFlowControl {
    /// No flow control
    #[default]
    None,
    /// Hardware flow control (RTS/CTS)
    Hardware,
    /// Software flow control (XON/XOFF)
    Software,
}

impl std::str::FromStr for SerialFlowControl {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "none" | "off" => Ok(Self::None),
            "hw" | "hardware" | "rtscts" => Ok(Self::Hardware),
            "sw" | "software" | "xonxoff" => Ok(Self::Software),
            other => Err(format!("unknown flow control: {}", other)),
        }
    }
}

/// Serial port parity
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum SerialParity {
    /// No parity
    #[default]
    None,
    /// Odd parity
    Odd,
    /// Even parity
    Even,
}

impl std::str::FromStr for SerialParity {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "none" | "n" => Ok(Self::None),
            "odd" | "o" => Ok(Self::Odd),
            "even" | "e" => Ok(Self::Even),
            other => Err(format!("unknown parity: {}", other)),
        }
    }
}

/// Serial port configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SerialConfig {
    /// Port name (e.g., COM3, /dev/ttyUSB0)
    pub port: String,
    /// Baud rate
    pub baud_rate: u32,
    /// Data bits (5, 6, 7, 8)
    pub data_bits: u8,
    /// Stop bits (1, 2)
    pub stop_bits: u8,
    /// Parity
    pub parity: SerialParity,
    /// Flow control
    pub flow_control: SerialFlowControl,
    /// Driver read timeout
    pub timeout_ms: u64,
}

impl SerialConfig {
    /// Create a new serial configuration with default settings
    pub fn new(port: &str, baud_rate: u32) -> Self {
        Self {
            port: port.to_string(),
            baud_rate,
            data_bits: 8,
            stop_bits: 1,
            parity: SerialParity::None,
            flow_control: SerialFlowControl::None,
            timeout_ms: 100,
        }
    }

    /// Set stop bits
    #[must_use]
    pub fn stop_bits(mut self, bits: u8) -> Self {
        self.stop_bits = bits;
        self
    }

    /// Set parity
    #[must_use]
    pub fn parity(mut self, parity: SerialParity) -> Self {
        self.parity = parity;
        self
    }

    /// Set flow control
    #[must_use]
    pub fn flow_control(mut self, flow: SerialFlowControl) -> Self {
        self.flow_control = flow;
        self
    }

    /// Short description, e.g. `/dev/ttyACM0 @ 115200 baud (8N1 No FC)`
    pub fn describe(&self) -> String {
        format!(
            "{} @ {} baud ({}{}{} {})",
            self.port,
            self.baud_rate,
            self.data_bits,
            match self.parity {
                SerialParity::None => "N",
                SerialParity::Odd => "O",
                SerialParity::Even => "E",
            },
            self.stop_bits,
            match self.flow_control {
                SerialFlowControl::None => "No FC",
                SerialFlowControl::Hardware => "HW FC",
                SerialFlowControl::Software => "SW FC",
            }
        )
    }
}

impl Default for SerialConfig {
    fn default() -> Self {
        Self::new("/dev/ttyACM0", 115200)
    }
}

/// Receiver attached to a serial port
pub struct SerialChannel {
    config: SerialConfig,
    port: Box<dyn SerialPort>,
    retry: RetryPolicy,
    stats: TransportStats,
    cancel: Option<Arc<AtomicBool>>,
}

impl SerialChannel {
    /// Open the configured port
    pub fn open(config: SerialConfig) -> Result<Self, TransportError> {
        let port = serialport::new(&config.port, config.baud_rate)
            .data_bits(data_bits(config.data_bits))
            .stop_bits(if config.stop_bits == 2 { StopBits::Two } else { StopBits::One })
            .parity(config.parity.into())
            .flow_control(config.flow_control.into())
            .timeout(Duration::from_millis(config.timeout_ms))
            .open()
            .map_err(|e| open_error(&config.port, e))?;

        tracing::info!("Opened {}", config.describe());
        Ok(Self::from_port(port, config))
    }

    /// Wrap an already open port
    pub fn from_port(port: Box<dyn SerialPort>, config: SerialConfig) -> Self {
        Self {
            config,
            port,
            retry: RetryPolicy::default(),
            stats: TransportStats::default(),
            cancel: None,
        }
    }

    /// Set retry policy
    #[must_use]
    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    /// Abandon retries once `flag` is set
    #[must_use]
    pub fn with_cancel(mut self, flag: Arc<AtomicBool>) -> Self {
        self.cancel = Some(flag);
        self
    }

    /// Port configuration
    pub fn config(&self) -> &SerialConfig {
        &self.config
    }
}

impl GnssChannel for SerialChannel {
    fn available(&mut self) -> Option<usize> {
        match self.port.bytes_to_read() {
            Ok(n) => Some(n as usize),
            Err(e) => {
                self.stats.faults += 1;
                tracing::debug!("Bytes-available query on {} failed: {}", self.config.port, e);
                None
            }
        }
    }

    fn read(&mut self, max: Option<usize>) -> Result<Option<Bytes>, TransportError> {
        let available = match self.available() {
            Some(n) if n > 0 => n,
            _ => return Ok(None),
        };

        let mut buf = vec![0u8; read_len(available, max)];
        let port = &mut self.port;
        let n = self
            .retry
            .run("serial read", &mut self.stats, self.cancel.as_deref(), || port.read(&mut buf))?;

        if n == 0 {
            return Ok(None);
        }
        buf.truncate(n);
        self.stats.bytes_received += n as u64;
        Ok(Some(Bytes::from(buf)))
    }

    fn write(&mut self, data: &[u8]) -> Result<(), TransportError> {
        let port = &mut self.port;
        self.retry.run("serial write", &mut self.stats, self.cancel.as_deref(), || {
            port.write_all(data)?;
            port.flush()
        })?;

        self.stats.bytes_sent += data.len() as u64;
        Ok(())
    }

    fn stats(&self) -> TransportStats {
        self.stats
    }

    fn connection_info(&self) -> String {
        self.config.describe()
    }
}

impl From<SerialParity> for Parity {
    fn from(parity: SerialParity) -> Self {
        match parity {
            SerialParity::None => Parity::None,
            SerialParity::Odd => Parity::Odd,
            SerialParity::Even => Parity::Even,
        }
    }
}

impl From<SerialFlowControl> for FlowControl {
    fn from(flow: SerialFlowControl) -> Self {
        match flow {
            SerialFlowControl::None => FlowControl::None,
            SerialFlowControl::Hardware => FlowControl::Hardware,
            SerialFlowControl::Software => FlowControl::Software,
        }
    }
}

/// Anything other than 5, 6 or 7 is treated as 8
fn data_bits(bits: u8) -> DataBits {
    match bits {
        5 => DataBits::Five,
        6 => DataBits::Six,
        7 => DataBits::Seven,
        _ => DataBits::Eight,
    }
}

fn open_error(port: &str, e: serialport::Error) -> TransportError {
    use std::io::ErrorKind;

    match e.kind() {
        serialport::ErrorKind::NoDevice | serialport::ErrorKind::Io(ErrorKind::NotFound) => {
            TransportError::PortNotFound(port.to_string())
        }
        serialport::ErrorKind::Io(ErrorKind::PermissionDenied) => TransportError::PermissionDenied(port.to_string()),
        _ => TransportError::ConnectionFailed(format!("{}: {}", port, e)),
    }
}

/// List available serial ports
pub fn list_ports() -> Result<Vec<serialport::SerialPortInfo>, TransportError> {
    serialport::available_ports().map_err(|e| TransportError::IoError(e.into()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_describe() {
        let config = SerialConfig::new("/dev/ttyUSB0", 9600)
            .parity(SerialParity::Even)
            .stop_bits(2)
            .flow_control(SerialFlowControl::Hardware);
        assert_eq!(config.describe(), "/dev/ttyUSB0 @ 9600 baud (8E2 HW FC)");
    }

    #[test]
    fn test_driver_settings() {
        assert_eq!(Parity::from(SerialParity::Odd), Parity::Odd);
        assert_eq!(FlowControl::from(SerialFlowControl::Software), FlowControl::Software);
        assert_eq!(data_bits(7), DataBits::Seven);
        assert_eq!(data_bits(9), DataBits::Eight);
    }

    #[test]
    fn test_parse_settings() {
        assert_eq!("O".parse::<SerialParity>(), Ok(SerialParity::Odd));
        assert!("mark".parse::<SerialParity>().is_err());
        assert_eq!("hw".parse::<SerialFlowControl>(), Ok(SerialFlowControl::Hardware));
        assert_eq!("xonxoff".parse::<SerialFlowControl>(), Ok(SerialFlowControl::Software));
    }
}
