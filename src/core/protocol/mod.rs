//! Receiver protocols
//!
//! - UBX binary frames (encoder and frame type)
//! - NMEA text sentences (checksum tail, interpreter hook)
//! - Checksum algorithms for both
//! - The streaming decoder that separates the two on one byte stream
//! - NAV-TIMEUTC payload decoding

pub mod checksum;
pub mod decoder;
pub mod nav;
pub mod nmea;
pub mod ubx;

pub use checksum::{ubx_checksum, xor_checksum, NmeaChecksum, UbxChecksum};
pub use decoder::{DecoderConfig, DecoderState, DecoderStats, SharedDecoder, StreamDecoder};
pub use nav::{NavError, NavTimeUtc};
pub use nmea::{check_tail, NmeaSentence, SentenceSink, TailCheck};
pub use ubx::{encode, format_raw_frame, hexify, FrameEncoder, FrameError, SyncPair, UbxFrame};
