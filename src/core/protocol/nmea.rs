//! NMEA 0183 text sentences
//!
//! The decoder only frames sentences and checks their XOR checksum. Field
//! interpretation (fix, position, speed) belongs to an external interpreter
//! that is fed one character at a time through [`SentenceSink`].

use std::fmt;

use serde::{Deserialize, Serialize};

use super::checksum::{parse_hex_pair, NmeaChecksum};

/// Sentence start character
pub const SENTENCE_START: u8 = b'$';

/// Checksum delimiter
pub const CHECKSUM_DELIMITER: u8 = b'*';

/// A complete sentence as received, without its line terminator
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NmeaSentence {
    /// Raw text including the leading `$` and the `*HH` tail
    pub raw_text: String,
    /// Whether the XOR checksum in the tail matched
    pub checksum_valid: bool,
}

impl NmeaSentence {
    /// Address field, e.g. `GPGGA` for `$GPGGA,...`
    pub fn address(&self) -> Option<&str> {
        let body = self.raw_text.strip_prefix('$')?;
        let end = body.find([',', '*']).unwrap_or(body.len());
        Some(&body[..end])
    }

    /// Three-letter sentence formatter (`GGA`, `RMC`, ...), talker stripped
    pub fn formatter(&self) -> Option<&str> {
        let address = self.address()?;
        if address.len() < 3 || address.starts_with('P') {
            return Some(address);
        }
        address.get(address.len() - 3..)
    }
}

impl fmt::Display for NmeaSentence {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.raw_text)
    }
}

/// Outcome of checking a sentence's `*HH` tail
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TailCheck {
    /// Checksum present and correct
    Valid,
    /// Checksum present but wrong (`received` is `None` for non-hex digits)
    Mismatch {
        /// XOR computed over the body
        computed: u8,
        /// Value parsed from the tail
        received: Option<u8>,
    },
    /// The third-from-last character is not `*`
    MalformedTail,
}

impl TailCheck {
    /// True only for [`TailCheck::Valid`]
    pub fn is_valid(&self) -> bool {
        matches!(self, TailCheck::Valid)
    }
}

/// Check the checksum of an accumulated sentence.
///
/// The last three characters are taken as the tail and must read `*HH`.
/// Everything before the tail, minus the leading `$`, is XOR-ed and compared.
pub fn check_tail(raw: &[u8]) -> TailCheck {
    let split = raw.len().saturating_sub(3);
    let (body, tail) = raw.split_at(split);

    if tail.len() < 3 || tail[0] != CHECKSUM_DELIMITER {
        return TailCheck::MalformedTail;
    }

    let mut ck = NmeaChecksum::new();
    for &b in body.iter().skip(1) {
        ck.update(b);
    }
    let computed = ck.value();

    match parse_hex_pair(tail[1], tail[2]) {
        Some(received) if received == computed => TailCheck::Valid,
        received => TailCheck::Mismatch { computed, received },
    }
}

/// Append `*HH` to a sentence body that starts with `$`
pub fn with_checksum(body: &str) -> String {
    let mut ck = NmeaChecksum::new();
    for b in body.bytes().skip(1) {
        ck.update(b);
    }
    format!("{}*{:02X}", body, ck.value())
}

/// Receives every character consumed while a sentence is being accumulated,
/// including the leading `$` and the line terminator.
///
/// Calls are fire-and-forget: the decoder never looks at what the sink does
/// with a character, and a panic inside the sink is contained by the decoder.
pub trait SentenceSink: Send {
    /// Feed one character
    fn update(&mut self, ch: char);
}

impl<F> SentenceSink for F
where
    F: FnMut(char) + Send,
{
    fn update(&mut self, ch: char) {
        self(ch)
    }
}
