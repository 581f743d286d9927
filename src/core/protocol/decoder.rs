//! Streaming decoder for interleaved UBX frames and NMEA sentences
//!
//! Bytes are consumed one at a time by a single state machine covering both
//! protocols. Completed frames and sentences land in two independent FIFO
//! queues; nothing is ever re-parsed and no input is backtracked over.
//!
//! Malformed input never produces an error. The decoder drops whatever it
//! was holding and waits for the next `$` or sync byte.

use std::collections::VecDeque;
use std::fmt;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};

use super::checksum::UbxChecksum;
use super::nmea::{check_tail, NmeaSentence, SentenceSink, TailCheck, SENTENCE_START};
use super::ubx::{SyncPair, UbxFrame};

/// Decoder behind the single lock required for multi-threaded use
pub type SharedDecoder = Arc<Mutex<StreamDecoder>>;

/// Default cap on an accumulating sentence
pub const DEFAULT_MAX_SENTENCE_LEN: usize = 512;

/// Decoder state, shared by both protocols
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum DecoderState {
    /// Waiting for a sync byte or `$`
    #[default]
    Idle,
    /// First sync byte seen
    ExpectBinarySync2,
    /// Next byte is the message class
    BinaryClass,
    /// Next byte is the message id
    BinaryId,
    /// Next byte is the low length byte
    BinaryLenLo,
    /// Next byte is the high length byte
    BinaryLenHi,
    /// Collecting payload
    BinaryPayload,
    /// Next byte is the first checksum byte
    BinaryCkA,
    /// Next byte is the second checksum byte
    BinaryCkB,
    /// Inside a text sentence
    TextAccumulate,
}

/// Decoder settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DecoderConfig {
    /// Binary sync pair to look for
    pub sync: SyncPair,
    /// Longest sentence accumulated before the buffer is dropped
    pub max_sentence_len: usize,
}

impl Default for DecoderConfig {
    fn default() -> Self {
        Self {
            sync: SyncPair::UBLOX,
            max_sentence_len: DEFAULT_MAX_SENTENCE_LEN,
        }
    }
}

/// Decoder counters
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct DecoderStats {
    /// Binary frames enqueued
    pub frames: u64,
    /// Sentences enqueued
    pub sentences: u64,
    /// Frames enqueued with a bad checksum
    pub frame_checksum_errors: u64,
    /// Sentences enqueued with a bad or missing checksum
    pub sentence_checksum_errors: u64,
    /// Partial sentences dropped
    pub resyncs: u64,
    /// Bytes skipped while idle or after a failed sync match
    pub ignored_bytes: u64,
}

/// The stream decoder.
///
/// Owns both output queues and the in-progress frame/sentence buffers.
/// Not reentrant; wrap in [`SharedDecoder`] to share across threads.
pub struct StreamDecoder {
    config: DecoderConfig,
    state: DecoderState,

    // binary frame in flight
    checksum: UbxChecksum,
    class_id: u8,
    message_id: u8,
    len_lo: u8,
    declared_length: u16,
    remaining: u16,
    payload: Vec<u8>,
    received_ck_a: u8,

    // text sentence in flight
    text: Vec<u8>,

    frames: VecDeque<UbxFrame>,
    sentences: VecDeque<NmeaSentence>,
    sink: Option<Box<dyn SentenceSink>>,
    stats: DecoderStats,
}

impl Default for StreamDecoder {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for StreamDecoder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StreamDecoder")
            .field("config", &self.config)
            .field("state", &self.state)
            .field("pending_frames", &self.frames.len())
            .field("pending_sentences", &self.sentences.len())
            .field("has_sink", &self.sink.is_some())
            .field("stats", &self.stats)
            .finish_non_exhaustive()
    }
}

impl StreamDecoder {
    /// Decoder for u-blox receivers with default settings
    pub fn new() -> Self {
        Self::with_config(DecoderConfig::default())
    }

    /// Decoder with explicit settings
    pub fn with_config(config: DecoderConfig) -> Self {
        Self {
            config,
            state: DecoderState::Idle,
            checksum: UbxChecksum::new(),
            class_id: 0,
            message_id: 0,
            len_lo: 0,
            declared_length: 0,
            remaining: 0,
            payload: Vec::new(),
            received_ck_a: 0,
            text: Vec::with_capacity(128),
            frames: VecDeque::new(),
            sentences: VecDeque::new(),
            sink: None,
            stats: DecoderStats::default(),
        }
    }

    /// Decoder looking for a different sync pair
    pub fn with_sync(sync: SyncPair) -> Self {
        Self::with_config(DecoderConfig {
            sync,
            ..DecoderConfig::default()
        })
    }

    /// Attach the external sentence interpreter
    #[must_use]
    pub fn with_sink(mut self, sink: impl SentenceSink + 'static) -> Self {
        self.sink = Some(Box::new(sink));
        self
    }

    /// Move into a [`SharedDecoder`]
    pub fn into_shared(self) -> SharedDecoder {
        Arc::new(Mutex::new(self))
    }

    /// Settings in use
    pub fn config(&self) -> &DecoderConfig {
        &self.config
    }

    /// Current state
    pub fn state(&self) -> DecoderState {
        self.state
    }

    /// Counters since creation
    pub fn stats(&self) -> DecoderStats {
        self.stats
    }

    /// Drop any partial frame or sentence and return to idle.
    /// Queued output is kept.
    pub fn reset(&mut self) {
        self.state = DecoderState::Idle;
        self.checksum.reset();
        self.payload.clear();
        self.text.clear();
    }

    // ============ Output queues ============

    /// Oldest decoded frame
    pub fn pop_frame(&mut self) -> Option<UbxFrame> {
        self.frames.pop_front()
    }

    /// Oldest decoded sentence
    pub fn pop_sentence(&mut self) -> Option<NmeaSentence> {
        self.sentences.pop_front()
    }

    /// All decoded frames, oldest first
    pub fn drain_frames(&mut self) -> Vec<UbxFrame> {
        self.frames.drain(..).collect()
    }

    /// All decoded sentences, oldest first
    pub fn drain_sentences(&mut self) -> Vec<NmeaSentence> {
        self.sentences.drain(..).collect()
    }

    /// Number of frames waiting
    pub fn pending_frames(&self) -> usize {
        self.frames.len()
    }

    /// Number of sentences waiting
    pub fn pending_sentences(&self) -> usize {
        self.sentences.len()
    }

    // ============ Decoding ============

    /// Consume a chunk of raw bytes.
    ///
    /// Chunk boundaries carry no meaning: feeding a stream in one call or one
    /// byte at a time produces the same output.
    pub fn feed(&mut self, bytes: &[u8]) {
        for &byte in bytes {
            self.step(byte);
        }
    }

    fn step(&mut self, byte: u8) {
        match self.state {
            DecoderState::Idle => {
                if byte == self.config.sync.first {
                    self.state = DecoderState::ExpectBinarySync2;
                } else if byte == SENTENCE_START {
                    self.start_sentence();
                } else {
                    self.stats.ignored_bytes += 1;
                }
            }
            DecoderState::ExpectBinarySync2 => {
                if byte == self.config.sync.second {
                    self.state = DecoderState::BinaryClass;
                } else {
                    // the mismatching byte is dropped, not re-tested as a start byte
                    tracing::trace!("False sync: {:02X} after first sync byte", byte);
                    self.stats.ignored_bytes += 1;
                    self.state = DecoderState::Idle;
                }
            }
            DecoderState::BinaryClass => {
                self.checksum.reset();
                self.class_id = byte;
                self.checksum.update(byte);
                self.state = DecoderState::BinaryId;
            }
            DecoderState::BinaryId => {
                self.message_id = byte;
                self.checksum.update(byte);
                self.state = DecoderState::BinaryLenLo;
            }
            DecoderState::BinaryLenLo => {
                self.len_lo = byte;
                self.checksum.update(byte);
                self.state = DecoderState::BinaryLenHi;
            }
            DecoderState::BinaryLenHi => {
                self.declared_length = u16::from_le_bytes([self.len_lo, byte]);
                self.remaining = self.declared_length;
                self.payload.clear();
                self.payload.reserve(self.declared_length as usize);
                self.checksum.update(byte);
                self.state = DecoderState::BinaryPayload;
            }
            DecoderState::BinaryPayload => {
                if self.remaining == 0 {
                    // payload complete: this byte is already the first checksum byte
                    self.accept_ck_a(byte);
                } else {
                    self.payload.push(byte);
                    self.remaining -= 1;
                    self.checksum.update(byte);
                }
            }
            DecoderState::BinaryCkA => self.accept_ck_a(byte),
            DecoderState::BinaryCkB => self.finish_frame(byte),
            DecoderState::TextAccumulate => self.step_text(byte),
        }
    }

    fn accept_ck_a(&mut self, byte: u8) {
        self.received_ck_a = byte;
        self.state = DecoderState::BinaryCkB;
    }

    fn finish_frame(&mut self, ck_b: u8) {
        let checksum_valid = self.checksum.matches(self.received_ck_a, ck_b);
        if !checksum_valid {
            let (calc_a, calc_b) = self.checksum.value();
            tracing::warn!(
                "Checksum discrepancy on {:02X}/{:02X}: calc {:02X} {:02X}, message {:02X} {:02X}",
                self.class_id,
                self.message_id,
                calc_a,
                calc_b,
                self.received_ck_a,
                ck_b
            );
            self.stats.frame_checksum_errors += 1;
        }

        self.frames.push_back(UbxFrame {
            class_id: self.class_id,
            message_id: self.message_id,
            declared_length: self.declared_length,
            payload: std::mem::take(&mut self.payload),
            checksum_a: self.received_ck_a,
            checksum_b: ck_b,
            checksum_valid,
        });
        self.stats.frames += 1;
        self.state = DecoderState::Idle;
    }

    fn step_text(&mut self, byte: u8) {
        match byte {
            SENTENCE_START => {
                tracing::debug!(
                    "New sentence started while reading sentence, dropping {} bytes",
                    self.text.len()
                );
                self.stats.resyncs += 1;
                self.start_sentence();
            }
            0x20..=0x7E => {
                if self.text.len() >= self.config.max_sentence_len {
                    tracing::debug!(
                        "Sentence exceeds {} bytes, dropping",
                        self.config.max_sentence_len
                    );
                    self.abandon_sentence(DecoderState::Idle);
                    return;
                }
                self.text.push(byte);
                self.forward(byte);
            }
            b'\r' | b'\n' => {
                self.forward(byte);
                self.finish_sentence();
                self.state = DecoderState::Idle;
            }
            _ if byte == self.config.sync.first => {
                tracing::debug!("Binary sync inside sentence, dropping {} bytes", self.text.len());
                self.abandon_sentence(DecoderState::ExpectBinarySync2);
            }
            _ => {
                tracing::debug!("Unexpected byte {:02X} inside sentence, dropping", byte);
                self.abandon_sentence(DecoderState::Idle);
            }
        }
    }

    fn start_sentence(&mut self) {
        self.text.clear();
        self.text.push(SENTENCE_START);
        self.forward(SENTENCE_START);
        self.state = DecoderState::TextAccumulate;
    }

    fn abandon_sentence(&mut self, next: DecoderState) {
        self.text.clear();
        self.stats.resyncs += 1;
        self.state = next;
    }

    fn finish_sentence(&mut self) {
        let verdict = check_tail(&self.text);
        match verdict {
            TailCheck::Valid => {}
            TailCheck::Mismatch { computed, received } => {
                tracing::warn!(
                    "Checksum discrepancy: calc {:02X}, message {}: {}",
                    computed,
                    received.map_or_else(|| "??".to_string(), |r| format!("{:02X}", r)),
                    String::from_utf8_lossy(&self.text)
                );
            }
            TailCheck::MalformedTail => {
                tracing::warn!("Sentence without checksum tail: {}", String::from_utf8_lossy(&self.text));
            }
        }

        if !self.text.is_empty() {
            let checksum_valid = verdict.is_valid();
            if !checksum_valid {
                self.stats.sentence_checksum_errors += 1;
            }
            self.sentences.push_back(NmeaSentence {
                raw_text: String::from_utf8_lossy(&self.text).into_owned(),
                checksum_valid,
            });
            self.stats.sentences += 1;
        }
        self.text.clear();
    }

    fn forward(&mut self, byte: u8) {
        if let Some(sink) = self.sink.as_mut() {
            let ch = char::from(byte);
            if panic::catch_unwind(AssertUnwindSafe(|| sink.update(ch))).is_err() {
                tracing::warn!("Sentence interpreter panicked on {:?}, continuing", ch);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::protocol::ubx::encode;

    const GGA: &[u8] = b"$GPGGA,123519,4807.038,N,01131.000,E,1,08,0.9,545.4,M,46.9,M,,*47\r\n";

    #[test]
    fn test_states_through_frame() {
        let frame = encode(0x01, 0x21, &[0xAA]).unwrap();
        let mut decoder = StreamDecoder::new();
        let expected = [
            DecoderState::ExpectBinarySync2,
            DecoderState::BinaryClass,
            DecoderState::BinaryId,
            DecoderState::BinaryLenLo,
            DecoderState::BinaryLenHi,
            DecoderState::BinaryPayload,
            DecoderState::BinaryPayload,
            DecoderState::BinaryCkB,
            DecoderState::Idle,
        ];
        for (byte, state) in frame.iter().zip(expected) {
            decoder.feed(&[*byte]);
            assert_eq!(decoder.state(), state);
        }
        assert_eq!(decoder.pending_frames(), 1);
    }

    #[test]
    fn test_zero_length_skips_payload_state() {
        let frame = encode(0x05, 0x01, &[]).unwrap();
        let mut decoder = StreamDecoder::new();
        decoder.feed(&frame[..6]);
        assert_eq!(decoder.state(), DecoderState::BinaryPayload);
        decoder.feed(&frame[6..7]);
        assert_eq!(decoder.state(), DecoderState::BinaryCkB);
        decoder.feed(&frame[7..]);

        let decoded = decoder.pop_frame().unwrap();
        assert!(decoded.checksum_valid);
        assert!(decoded.payload.is_empty());
    }

    #[test]
    fn test_false_sync_drops_following_byte() {
        let mut decoder = StreamDecoder::new();
        // the '$' right after a false sync is swallowed, so no sentence starts
        decoder.feed(b"\xB5$GPTXT,x*00\r\n");
        assert_eq!(decoder.pending_sentences(), 0);
        assert_eq!(decoder.state(), DecoderState::Idle);
    }

    #[test]
    fn test_false_sync_does_not_retest_sync1() {
        let mut decoder = StreamDecoder::new();
        let frame = encode(0x01, 0x02, &[1, 2, 3]).unwrap();
        let mut input = vec![0xB5];
        input.extend_from_slice(&frame);
        decoder.feed(&input);
        // second 0xB5 is consumed as the mismatching byte; the 0x62 that follows is noise
        assert_eq!(decoder.pending_frames(), 0);
    }

    #[test]
    fn test_sync_inside_sentence_drops_it() {
        let mut decoder = StreamDecoder::new();
        let frame = encode(0x0A, 0x04, &[9]).unwrap();
        let mut input = b"$GPGGA,1234".to_vec();
        input.extend_from_slice(&frame[..]);
        decoder.feed(&input);

        assert_eq!(decoder.pending_sentences(), 0);
        // 0xB5 moved straight to sync2, so the frame is intact
        assert_eq!(decoder.pop_frame().unwrap().payload, vec![9]);
        assert_eq!(decoder.stats().resyncs, 1);
    }

    #[test]
    fn test_control_byte_inside_sentence_drops_it() {
        let mut decoder = StreamDecoder::new();
        decoder.feed(b"$GPGGA,1\x00,2*00\r\n");
        assert_eq!(decoder.pending_sentences(), 0);
        assert_eq!(decoder.state(), DecoderState::Idle);
    }

    #[test]
    fn test_crlf_yields_single_sentence() {
        let mut decoder = StreamDecoder::new();
        decoder.feed(GGA);
        assert_eq!(decoder.pending_sentences(), 1);
        let s = decoder.pop_sentence().unwrap();
        assert!(s.checksum_valid);
        assert!(!s.raw_text.ends_with('\r'));
    }

    #[test]
    fn test_sentence_without_tail_still_delivered() {
        let mut decoder = StreamDecoder::new();
        decoder.feed(b"$GPTXT,no checksum\n");
        let s = decoder.pop_sentence().unwrap();
        assert_eq!(s.raw_text, "$GPTXT,no checksum");
        assert!(!s.checksum_valid);
        assert_eq!(decoder.stats().sentence_checksum_errors, 1);
    }

    #[test]
    fn test_bare_dollar_terminated() {
        let mut decoder = StreamDecoder::new();
        decoder.feed(b"$\r");
        let s = decoder.pop_sentence().unwrap();
        assert_eq!(s.raw_text, "$");
        assert!(!s.checksum_valid);
    }

    #[test]
    fn test_sink_sees_every_sentence_char() {
        let seen = Arc::new(Mutex::new(String::new()));
        let sink_seen = Arc::clone(&seen);
        let mut decoder = StreamDecoder::new().with_sink(move |c: char| sink_seen.lock().push(c));

        decoder.feed(b"noise");
        decoder.feed(GGA);

        let expected = std::str::from_utf8(&GGA[..GGA.len() - 1]).unwrap();
        // '\n' arrives in Idle after '\r' closed the sentence, so it is not forwarded
        assert_eq!(seen.lock().as_str(), expected);
    }

    #[test]
    fn test_panicking_sink_does_not_stop_decoding() {
        let mut decoder = StreamDecoder::new().with_sink(|c: char| {
            if c == ',' {
                panic!("interpreter failure");
            }
        });
        decoder.feed(GGA);
        let s = decoder.pop_sentence().unwrap();
        assert!(s.checksum_valid);
    }

    #[test]
    fn test_overlong_sentence_dropped() {
        let mut decoder = StreamDecoder::with_config(DecoderConfig {
            max_sentence_len: 16,
            ..DecoderConfig::default()
        });
        decoder.feed(b"$GPTXT,0123456789ABCDEF*00\r\n");
        assert_eq!(decoder.pending_sentences(), 0);
        assert_eq!(decoder.stats().resyncs, 1);

        decoder.feed(b"$GPTXT,short*00\r\n");
        assert_eq!(decoder.pending_sentences(), 1);
    }

    #[test]
    fn test_reset_keeps_queues() {
        let mut decoder = StreamDecoder::new();
        decoder.feed(GGA);
        decoder.feed(b"$GPGSV,partial");
        decoder.reset();
        assert_eq!(decoder.state(), DecoderState::Idle);
        assert_eq!(decoder.pending_sentences(), 1);
    }

    #[test]
    fn test_alternate_sync_pair() {
        let frame = crate::core::protocol::ubx::FrameEncoder::new(SyncPair::ALLYSTAR)
            .encode(0x06, 0x01, &[0xF0, 0x00, 0x01])
            .unwrap();

        let mut ublox = StreamDecoder::new();
        ublox.feed(&frame);
        assert_eq!(ublox.pending_frames(), 0);

        let mut allystar = StreamDecoder::with_sync(SyncPair::ALLYSTAR);
        allystar.feed(&frame);
        let decoded = allystar.pop_frame().unwrap();
        assert!(decoded.checksum_valid);
        assert_eq!(decoded.payload, vec![0xF0, 0x00, 0x01]);
    }

    #[test]
    fn test_stats_count_output() {
        let mut decoder = StreamDecoder::new();
        let mut bad = encode(0x01, 0x07, &[1, 2]).unwrap();
        let last = bad.len() - 1;
        bad[last] ^= 0xFF;

        decoder.feed(&bad);
        decoder.feed(GGA);
        decoder.feed(b"xyz");

        let stats = decoder.stats();
        assert_eq!(stats.frames, 1);
        assert_eq!(stats.frame_checksum_errors, 1);
        assert_eq!(stats.sentences, 1);
        assert_eq!(stats.ignored_bytes, 4); // '\n' after '\r' plus "xyz"
    }

    #[test]
    fn test_shared_decoder() {
        let shared = StreamDecoder::new().into_shared();
        let worker = {
            let shared = Arc::clone(&shared);
            std::thread::spawn(move || shared.lock().feed(GGA))
        };
        worker.join().unwrap();
        assert_eq!(shared.lock().pending_sentences(), 1);
    }
}
