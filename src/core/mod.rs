//! Core module containing the receiver-facing functionality
//!
//! This module provides:
//! - Protocol layer: UBX frame encoder, NMEA sentence checks, the interleaved
//!   stream decoder and its checksum algorithms
//! - Transport layer for I2C and serial receivers with bounded fault retry
//! - Session binding a channel to a decoder and an encoder

pub mod protocol;
pub mod session;
pub mod transport;
