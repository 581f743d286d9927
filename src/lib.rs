//! # gpsmux Core Library
//!
//! Decodes the byte stream of a GNSS receiver that interleaves two protocols
//! on one channel:
//! - UBX binary frames (sync pair, class, id, length, payload, Fletcher checksum)
//! - NMEA text sentences (`$...*HH\r\n`, XOR checksum)
//!
//! ## Features
//!
//! - Single-pass decoder with no backtracking and bounded buffers
//! - Frame encoder for configuration commands
//! - I2C and serial transports with bounded retry of transient faults
//! - NAV-TIMEUTC payload decoding
//!
//! ## Example
//!
//! ```rust,no_run
//! use gpsmux_core::{SerialChannel, SerialConfig, Session, SessionEvent, StreamDecoder};
//!
//! fn main() -> anyhow::Result<()> {
//!     let channel = SerialChannel::open(SerialConfig::new("/dev/ttyACM0", 115200))?;
//!     let mut session = Session::new(channel, StreamDecoder::new());
//!
//!     // poll NAV-TIMEUTC
//!     session.send_command(0x01, 0x21, &[])?;
//!
//!     loop {
//!         session.pump()?;
//!         for event in session.drain() {
//!             match event {
//!                 SessionEvent::Frame(frame) => println!("{}", frame),
//!                 SessionEvent::Sentence(sentence) => println!("{}", sentence),
//!             }
//!         }
//!     }
//! }
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]
#![allow(clippy::module_name_repetitions)]

pub mod cli;
pub mod config;
pub mod core;

// Re-exports for convenience
pub use crate::cli::{CliResult, ExitCodes, OutputFormat};
pub use crate::config::{AppConfig, ReceiverFamily};
pub use crate::core::protocol::{
    encode, DecoderConfig, DecoderState, DecoderStats, FrameEncoder, FrameError, NavTimeUtc,
    NmeaSentence, SentenceSink, SharedDecoder, StreamDecoder, SyncPair, UbxFrame,
};
pub use crate::core::session::{drain_events, Session, SessionError, SessionEvent};
pub use crate::core::transport::{
    list_ports, GnssChannel, I2cChannel, RetryPolicy, SerialChannel, SerialConfig, SerialFlowControl,
    SerialParity, TransportError, TransportStats,
};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Library name
pub const NAME: &str = env!("CARGO_PKG_NAME");
