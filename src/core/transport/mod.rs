//! Transport layer between the receiver and the decoder
//!
//! Every physical link implements [`GnssChannel`], a three-operation contract:
//! query pending bytes, read, write. Two links are provided:
//! - I2C register device (u-blox DDC interface)
//! - Serial port (UART)
//!
//! Transient faults are retried according to a [`RetryPolicy`].

mod i2c;
mod retry;
mod serial;

pub use i2c::{I2cChannel, DEFAULT_I2C_ADDRESS, REG_BYTES_AVAILABLE, REG_DATA_STREAM};
pub use retry::RetryPolicy;
pub use serial::{list_ports, SerialChannel, SerialConfig, SerialFlowControl, SerialParity};

use bytes::Bytes;
use serde::Serialize;
use thiserror::Error;

/// Transport error types
#[derive(Error, Debug)]
pub enum TransportError {
    /// Connection failed
    #[error("Connection failed: {0}")]
    ConnectionFailed(String),

    /// Port not found
    #[error("Port not found: {0}")]
    PortNotFound(String),

    /// Permission denied
    #[error("Permission denied: {0}")]
    PermissionDenied(String),

    /// I/O error
    #[error("I/O error: {0}")]
    IoError(#[from] std::io::Error),

    /// Transient faults persisted past the retry policy
    #[error("{operation} failed after {attempts} attempts: {last_error}")]
    RetriesExhausted {
        /// Operation that kept failing
        operation: &'static str,
        /// Attempts made, including the first
        attempts: u32,
        /// Last fault reported by the device
        last_error: String,
    },

    /// Retrying stopped because the caller asked to shut down
    #[error("{0} cancelled")]
    Cancelled(&'static str),
}

/// Transport statistics
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct TransportStats {
    /// Bytes received
    pub bytes_received: u64,
    /// Bytes sent
    pub bytes_sent: u64,
    /// Faults reported by the device, retried or not
    pub faults: u64,
    /// Retries performed
    pub retries: u64,
}

/// Byte channel to a receiver.
///
/// A fault while querying `available` means "no data now". Faults during
/// `read` and `write` are retried by the implementation and only surface once
/// its retry policy gives up.
pub trait GnssChannel {
    /// Bytes waiting on the device, `None` if the query faulted
    fn available(&mut self) -> Option<usize>;

    /// Read up to `max` waiting bytes (all of them for `None` or `Some(0)`).
    ///
    /// `Ok(None)` when nothing is waiting.
    fn read(&mut self, max: Option<usize>) -> Result<Option<Bytes>, TransportError>;

    /// Write all of `data`
    fn write(&mut self, data: &[u8]) -> Result<(), TransportError>;

    /// Get statistics
    fn stats(&self) -> TransportStats {
        TransportStats::default()
    }

    /// Get connection info string
    fn connection_info(&self) -> String;
}

impl<C: GnssChannel + ?Sized> GnssChannel for Box<C> {
    fn available(&mut self) -> Option<usize> {
        (**self).available()
    }

    fn read(&mut self, max: Option<usize>) -> Result<Option<Bytes>, TransportError> {
        (**self).read(max)
    }

    fn write(&mut self, data: &[u8]) -> Result<(), TransportError> {
        (**self).write(data)
    }

    fn stats(&self) -> TransportStats {
        (**self).stats()
    }

    fn connection_info(&self) -> String {
        (**self).connection_info()
    }
}

/// Effective read size: `max` of `None`/0 means everything available
pub(crate) fn read_len(available: usize, max: Option<usize>) -> usize {
    match max {
        Some(max) if max > 0 => max.min(available),
        _ => available,
    }
}
