//! I2C (DDC) register-device transport
//!
//! The receiver exposes a pending-byte counter at register `0xFD` (two bytes,
//! big-endian) and a data stream at register `0xFF`. Reads are plain bus reads
//! that continue from the stream register.

use std::sync::atomic::AtomicBool;
use std::sync::Arc;

use bytes::Bytes;
use embedded_hal::i2c::I2c;

use super::{read_len, GnssChannel, RetryPolicy, TransportError, TransportStats};

/// Default 7-bit address of u-blox receivers
pub const DEFAULT_I2C_ADDRESS: u8 = 0x42;

/// Pending byte count register (2 bytes, big-endian)
pub const REG_BYTES_AVAILABLE: u8 = 0xFD;

/// Data stream register
pub const REG_DATA_STREAM: u8 = 0xFF;

/// Receiver attached to an I2C bus
pub struct I2cChannel<I> {
    i2c: I,
    address: u8,
    retry: RetryPolicy,
    stats: TransportStats,
    write_buf: Vec<u8>,
    cancel: Option<Arc<AtomicBool>>,
}

impl<I: I2c> I2cChannel<I> {
    /// Channel at the default address with the default retry policy
    pub fn new(i2c: I) -> Self {
        Self {
            i2c,
            address: DEFAULT_I2C_ADDRESS,
            retry: RetryPolicy::default(),
            stats: TransportStats::default(),
            write_buf: Vec::new(),
            cancel: None,
        }
    }

    /// Set device address
    #[must_use]
    pub fn with_address(mut self, address: u8) -> Self {
        self.address = address;
        self
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

    /// Device address
    pub fn address(&self) -> u8 {
        self.address
    }

    /// Give the bus back
    pub fn release(self) -> I {
        self.i2c
    }
}

impl<I: I2c> GnssChannel for I2cChannel<I> {
    fn available(&mut self) -> Option<usize> {
        let mut raw = [0u8; 2];
        match self.i2c.write_read(self.address, &[REG_BYTES_AVAILABLE], &mut raw) {
            Ok(()) => Some(usize::from(u16::from_be_bytes(raw))),
            Err(e) => {
                self.stats.faults += 1;
                tracing::debug!("Bytes-available query at {:#04X} failed: {:?}", self.address, e);
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
        let i2c = &mut self.i2c;
        let address = self.address;
        self.retry
            .run("i2c read", &mut self.stats, self.cancel.as_deref(), || i2c.read(address, &mut buf))?;

        self.stats.bytes_received += buf.len() as u64;
        Ok(Some(Bytes::from(buf)))
    }

    fn write(&mut self, data: &[u8]) -> Result<(), TransportError> {
        self.write_buf.clear();
        self.write_buf.push(REG_DATA_STREAM);
        self.write_buf.extend_from_slice(data);

        let i2c = &mut self.i2c;
        let address = self.address;
        let frame = &self.write_buf;
        self.retry
            .run("i2c write", &mut self.stats, self.cancel.as_deref(), || i2c.write(address, frame))?;

        self.stats.bytes_sent += data.len() as u64;
        Ok(())
    }

    fn stats(&self) -> TransportStats {
        self.stats
    }

    fn connection_info(&self) -> String {
        format!("I2C device {:#04X}", self.address)
    }
}

#[cfg(target_os = "linux")]
impl I2cChannel<linux_embedded_hal::I2cdev> {
    /// Open a Linux I2C bus device such as `/dev/i2c-1`
    pub fn open(bus: &std::path::Path) -> Result<Self, TransportError> {
        if !bus.exists() {
            return Err(TransportError::PortNotFound(bus.display().to_string()));
        }
        let dev = linux_embedded_hal::I2cdev::new(bus)
            .map_err(|e| TransportError::ConnectionFailed(format!("{}: {}", bus.display(), e)))?;

        tracing::info!("Opened I2C bus {}", bus.display());
        Ok(Self::new(dev))
    }
}
