//! NAV-TIMEUTC (`0x01 0x21`) payload
//!
//! The receiver's UTC time solution, used by consumers to set clocks.

use chrono::{NaiveDate, NaiveDateTime};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use super::ubx::{encode, FrameError, UbxFrame};

/// NAV message class
pub const CLASS_NAV: u8 = 0x01;

/// NAV-TIMEUTC message id
pub const ID_TIMEUTC: u8 = 0x21;

/// Payload size of NAV-TIMEUTC
pub const TIMEUTC_LEN: usize = 20;

/// Validity bits: time of week, week number and UTC all resolved
const VALID_FULLY_RESOLVED: u8 = 0x07;

/// Payload decoding errors
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum NavError {
    /// Frame is some other message
    #[error("Unexpected message {0:02X}/{1:02X}")]
    WrongMessage(u8, u8),

    /// Payload length does not match the record
    #[error("Invalid payload length: expected {expected}, got {actual}")]
    InvalidLength {
        /// Required length
        expected: usize,
        /// Received length
        actual: usize,
    },
}

/// Decoded NAV-TIMEUTC record
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct NavTimeUtc {
    /// GPS time of week (ms)
    pub itow: u32,
    /// Time accuracy estimate (ns)
    pub time_accuracy_ns: u32,
    /// Fraction of second (ns), may be negative
    pub nano: i32,
    /// Year (UTC)
    pub year: u16,
    /// Month 1..12
    pub month: u8,
    /// Day 1..31
    pub day: u8,
    /// Hour 0..23
    pub hour: u8,
    /// Minute 0..59
    pub minute: u8,
    /// Second 0..60
    pub second: u8,
    /// Validity flags
    pub valid: u8,
}

impl NavTimeUtc {
    /// Decode from a received frame
    pub fn from_frame(frame: &UbxFrame) -> Result<Self, NavError> {
        if !frame.is(CLASS_NAV, ID_TIMEUTC) {
            return Err(NavError::WrongMessage(frame.class_id, frame.message_id));
        }
        Self::from_payload(&frame.payload)
    }

    /// Decode a 20-byte little-endian payload
    pub fn from_payload(payload: &[u8]) -> Result<Self, NavError> {
        if payload.len() != TIMEUTC_LEN {
            return Err(NavError::InvalidLength {
                expected: TIMEUTC_LEN,
                actual: payload.len(),
            });
        }

        let u32_at = |i: usize| u32::from_le_bytes([payload[i], payload[i + 1], payload[i + 2], payload[i + 3]]);

        Ok(Self {
            itow: u32_at(0),
            time_accuracy_ns: u32_at(4),
            nano: u32_at(8) as i32,
            year: u16::from_le_bytes([payload[12], payload[13]]),
            month: payload[14],
            day: payload[15],
            hour: payload[16],
            minute: payload[17],
            second: payload[18],
            valid: payload[19],
        })
    }

    /// Encode back into a 20-byte payload
    pub fn to_payload(&self) -> [u8; TIMEUTC_LEN] {
        let mut out = [0u8; TIMEUTC_LEN];
        out[0..4].copy_from_slice(&self.itow.to_le_bytes());
        out[4..8].copy_from_slice(&self.time_accuracy_ns.to_le_bytes());
        out[8..12].copy_from_slice(&self.nano.to_le_bytes());
        out[12..14].copy_from_slice(&self.year.to_le_bytes());
        out[14] = self.month;
        out[15] = self.day;
        out[16] = self.hour;
        out[17] = self.minute;
        out[18] = self.second;
        out[19] = self.valid;
        out
    }

    /// Time of week, week number and UTC are all valid
    pub fn is_fully_resolved(&self) -> bool {
        self.valid & VALID_FULLY_RESOLVED == VALID_FULLY_RESOLVED
    }

    /// Calendar date and time, whole seconds.
    ///
    /// `None` if any field is out of range (e.g. before the receiver has a fix).
    pub fn to_datetime(&self) -> Option<NaiveDateTime> {
        NaiveDate::from_ymd_opt(i32::from(self.year), u32::from(self.month), u32::from(self.day))?
            .and_hms_opt(u32::from(self.hour), u32::from(self.minute), u32::from(self.second))
    }

    /// Poll request for this message (empty payload)
    pub fn poll_request() -> Result<Vec<u8>, FrameError> {
        encode(CLASS_NAV, ID_TIMEUTC, &[])
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Datelike, Timelike};

    fn sample() -> NavTimeUtc {
        NavTimeUtc {
            itow: 345_600_000,
            time_accuracy_ns: 25,
            nano: -12_345,
            year: 2024,
            month: 3,
            day: 9,
            hour: 17,
            minute: 4,
            second: 59,
            valid: 0x37,
        }
    }

    #[test]
    fn test_payload_layout() {
        let payload = sample().to_payload();
        assert_eq!(&payload[12..14], &2024u16.to_le_bytes());
        assert_eq!(payload[19], 0x37);

        let decoded = NavTimeUtc::from_payload(&payload).unwrap();
        assert_eq!(decoded, sample());
    }

    #[test]
    fn test_datetime() {
        let dt = sample().to_datetime().unwrap();
        assert_eq!((dt.year(), dt.month(), dt.day()), (2024, 3, 9));
        assert_eq!((dt.hour(), dt.minute(), dt.second()), (17, 4, 59));
    }

    #[test]
    fn test_unresolved_time() {
        let mut t = sample();
        t.valid = 0x03;
        assert!(!t.is_fully_resolved());
        assert!(sample().is_fully_resolved());

        t.month = 0;
        assert!(t.to_datetime().is_none());
    }

    #[test]
    fn test_wrong_length() {
        assert_eq!(
            NavTimeUtc::from_payload(&[0u8; 19]),
            Err(NavError::InvalidLength { expected: 20, actual: 19 })
        );
    }

    #[test]
    fn test_wrong_message() {
        let frame = UbxFrame {
            class_id: 0x01,
            message_id: 0x07,
            declared_length: 0,
            payload: Vec::new(),
            checksum_a: 0,
            checksum_b: 0,
            checksum_valid: true,
        };
        assert_eq!(NavTimeUtc::from_frame(&frame), Err(NavError::WrongMessage(0x01, 0x07)));
    }

    #[test]
    fn test_poll_request() {
        assert_eq!(
            NavTimeUtc::poll_request().unwrap(),
            vec![0xB5, 0x62, 0x01, 0x21, 0x00, 0x00, 0x22, 0x67]
        );
    }
}
