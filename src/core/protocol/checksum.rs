//! Checksum algorithms for the two receiver protocols
//!
//! - UBX binary frames: 8-bit Fletcher pair `(ck_a, ck_b)`, accumulated per byte
//! - NMEA text sentences: XOR of every character between `$` and `*`

/// Running two-byte additive checksum used by binary frames.
///
/// `ck_a` is the sum of all bytes, `ck_b` the sum of all intermediate `ck_a`
/// values, both modulo 256.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct UbxChecksum {
    ck_a: u8,
    ck_b: u8,
}

impl UbxChecksum {
    /// Create a zeroed accumulator
    pub fn new() -> Self {
        Self::default()
    }

    /// Reset to `(0, 0)`
    pub fn reset(&mut self) {
        self.ck_a = 0;
        self.ck_b = 0;
    }

    /// Fold one byte into the accumulator
    #[inline]
    pub fn update(&mut self, byte: u8) {
        self.ck_a = self.ck_a.wrapping_add(byte);
        self.ck_b = self.ck_b.wrapping_add(self.ck_a);
    }

    /// Fold a slice of bytes into the accumulator
    pub fn update_slice(&mut self, data: &[u8]) {
        for &byte in data {
            self.update(byte);
        }
    }

    /// Current `(ck_a, ck_b)`
    pub fn value(&self) -> (u8, u8) {
        (self.ck_a, self.ck_b)
    }

    /// Compare against a received checksum pair
    pub fn matches(&self, ck_a: u8, ck_b: u8) -> bool {
        self.ck_a == ck_a && self.ck_b == ck_b
    }
}

/// Running XOR checksum used by text sentences.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct NmeaChecksum {
    value: u8,
}

impl NmeaChecksum {
    /// Create a zeroed accumulator
    pub fn new() -> Self {
        Self::default()
    }

    /// Fold one byte into the accumulator
    #[inline]
    pub fn update(&mut self, byte: u8) {
        self.value ^= byte;
    }

    /// Current checksum
    pub fn value(&self) -> u8 {
        self.value
    }
}

// ============ One-shot helpers ============

/// Fletcher-8 pair over `data`, as carried at the end of a binary frame
pub fn ubx_checksum(data: &[u8]) -> (u8, u8) {
    let mut ck = UbxChecksum::new();
    ck.update_slice(data);
    ck.value()
}

/// XOR checksum - XOR of all bytes
pub fn xor_checksum(data: &[u8]) -> u8 {
    data.iter().fold(0u8, |acc, &b| acc ^ b)
}

/// Parse two ASCII hex digits (either case) into a byte
pub fn parse_hex_pair(hi: u8, lo: u8) -> Option<u8> {
    let hi = (hi as char).to_digit(16)?;
    let lo = (lo as char).to_digit(16)?;
    Some((hi * 16 + lo) as u8)
}
