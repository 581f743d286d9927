//! UBX binary frames
//!
//! Wire layout (integers little-endian):
//!
//! ```text
//! sync1 sync2 class id len_lo len_hi payload[len] ck_a ck_b
//! ```
//!
//! The checksum covers `class..payload` inclusive.

use std::fmt;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use super::checksum::UbxChecksum;

/// Largest payload the 16-bit length field can describe
pub const MAX_PAYLOAD_LEN: usize = u16::MAX as usize;

/// Bytes surrounding the payload: sync(2) + class + id + length(2) + checksum(2)
pub const FRAME_OVERHEAD: usize = 8;

/// Two-byte marker opening every binary frame
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SyncPair {
    /// First sync byte
    pub first: u8,
    /// Second sync byte
    pub second: u8,
}

impl SyncPair {
    /// u-blox receivers (`0xB5 0x62`)
    pub const UBLOX: SyncPair = SyncPair { first: 0xB5, second: 0x62 };

    /// Allystar receivers (`0xF1 0xD9`), same frame shape
    pub const ALLYSTAR: SyncPair = SyncPair { first: 0xF1, second: 0xD9 };

    /// Custom sync pair
    pub const fn new(first: u8, second: u8) -> Self {
        Self { first, second }
    }

    /// Both bytes in wire order
    pub fn bytes(&self) -> [u8; 2] {
        [self.first, self.second]
    }
}

impl Default for SyncPair {
    fn default() -> Self {
        Self::UBLOX
    }
}

/// Frame construction errors
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum FrameError {
    /// Payload does not fit the 16-bit length field
    #[error("Payload too large: {0} bytes (max {MAX_PAYLOAD_LEN})")]
    PayloadTooLarge(usize),
}

/// A fully received binary frame.
///
/// `checksum_a`/`checksum_b` are the bytes as received; `checksum_valid`
/// records whether they matched the locally computed checksum. Frames with a
/// bad checksum are still delivered so the consumer can decide what to trust.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UbxFrame {
    /// Message class
    pub class_id: u8,
    /// Message id within the class
    pub message_id: u8,
    /// Length field as received
    pub declared_length: u16,
    /// Payload bytes, `declared_length` long
    pub payload: Vec<u8>,
    /// Received first checksum byte
    pub checksum_a: u8,
    /// Received second checksum byte
    pub checksum_b: u8,
    /// Whether the received checksum matched
    pub checksum_valid: bool,
}

impl UbxFrame {
    /// `(class_id, message_id)`, the key consumers dispatch on
    pub fn key(&self) -> (u8, u8) {
        (self.class_id, self.message_id)
    }

    /// Check the message type
    pub fn is(&self, class_id: u8, message_id: u8) -> bool {
        self.class_id == class_id && self.message_id == message_id
    }
}

impl fmt::Display for UbxFrame {
    /// `CC II LLLL PP PP .. *AA BB`
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{:02X} {:02X} {:04X} {} *{:02X} {:02X}",
            self.class_id,
            self.message_id,
            self.declared_length,
            hexify(&self.payload),
            self.checksum_a,
            self.checksum_b
        )
    }
}

/// Builds outbound command frames for one receiver family
#[derive(Debug, Clone, Copy, Default)]
pub struct FrameEncoder {
    sync: SyncPair,
}

impl FrameEncoder {
    /// Encoder emitting the given sync pair
    pub fn new(sync: SyncPair) -> Self {
        Self { sync }
    }

    /// Sync pair in use
    pub fn sync(&self) -> SyncPair {
        self.sync
    }

    /// Encode a frame: sync, header, payload and checksum
    pub fn encode(&self, class_id: u8, message_id: u8, payload: &[u8]) -> Result<Vec<u8>, FrameError> {
        if payload.len() > MAX_PAYLOAD_LEN {
            return Err(FrameError::PayloadTooLarge(payload.len()));
        }
        let len = (payload.len() as u16).to_le_bytes();

        let mut frame = Vec::with_capacity(payload.len() + FRAME_OVERHEAD);
        frame.extend_from_slice(&self.sync.bytes());
        frame.extend_from_slice(&[class_id, message_id, len[0], len[1]]);
        frame.extend_from_slice(payload);

        let mut ck = UbxChecksum::new();
        ck.update_slice(&frame[2..]);
        let (ck_a, ck_b) = ck.value();
        frame.push(ck_a);
        frame.push(ck_b);

        Ok(frame)
    }
}

/// Encode a frame with the u-blox sync pair
pub fn encode(class_id: u8, message_id: u8, payload: &[u8]) -> Result<Vec<u8>, FrameError> {
    FrameEncoder::default().encode(class_id, message_id, payload)
}

/// Space separated uppercase hex
pub fn hexify(data: &[u8]) -> String {
    data.iter()
        .map(|b| format!("{:02X}", b))
        .collect::<Vec<_>>()
        .join(" ")
}

/// Render an encoded frame for command echo:
/// `B5 62 CC II LLLL PP .. *AA BB`.
///
/// Input shorter than a bare frame is rendered as plain hex.
pub fn format_raw_frame(raw: &[u8]) -> String {
    if raw.len() < FRAME_OVERHEAD {
        return hexify(raw);
    }

    let length = u16::from_le_bytes([raw[4], raw[5]]);
    let payload = &raw[6..raw.len() - 2];

    let mut parts = vec![hexify(&raw[..4]), format!("{:04X}", length)];
    if !payload.is_empty() {
        parts.push(hexify(payload));
    }
    parts.push(format!("*{}", hexify(&raw[raw.len() - 2..])));
    parts.join(" ")
}
