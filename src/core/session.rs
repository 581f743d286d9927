//! Receiver session
//!
//! Binds one channel to one decoder and one encoder. The caller drives it:
//! `poll`/`pump` move bytes from the channel into the decoder, `drain`
//! collects what was decoded, `send_command` encodes and writes a frame.
//! Decoder and encoder never talk to each other; they only share the channel.

use std::sync::Arc;

use serde::Serialize;
use thiserror::Error;

use super::protocol::{
    format_raw_frame, FrameEncoder, FrameError, NmeaSentence, SharedDecoder, StreamDecoder, UbxFrame,
};
use super::transport::{GnssChannel, TransportError, TransportStats};

/// Default read size per poll
pub const DEFAULT_READ_CHUNK: usize = 1024;

/// Session errors
#[derive(Error, Debug)]
pub enum SessionError {
    /// Channel failure
    #[error(transparent)]
    Transport(#[from] TransportError),

    /// Command could not be encoded
    #[error(transparent)]
    Frame(#[from] FrameError),
}

/// Something the decoder produced
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum SessionEvent {
    /// Binary frame
    Frame(UbxFrame),
    /// Text sentence
    Sentence(NmeaSentence),
}

/// Take everything queued in `decoder`: frames first, then sentences
pub fn drain_events(decoder: &mut StreamDecoder) -> Vec<SessionEvent> {
    let mut events: Vec<SessionEvent> = decoder.drain_frames().into_iter().map(SessionEvent::Frame).collect();
    events.extend(decoder.drain_sentences().into_iter().map(SessionEvent::Sentence));
    events
}

/// A channel with its decoder and encoder
pub struct Session<C> {
    channel: C,
    decoder: SharedDecoder,
    encoder: FrameEncoder,
    read_chunk: usize,
}

impl<C: GnssChannel> Session<C> {
    /// New session; the encoder uses the decoder's sync pair
    pub fn new(channel: C, decoder: StreamDecoder) -> Self {
        Self::with_shared(channel, decoder.into_shared())
    }

    /// New session around a decoder that is also used elsewhere
    pub fn with_shared(channel: C, decoder: SharedDecoder) -> Self {
        let encoder = FrameEncoder::new(decoder.lock().config().sync);
        Self {
            channel,
            decoder,
            encoder,
            read_chunk: DEFAULT_READ_CHUNK,
        }
    }

    /// Set the maximum bytes read per poll
    #[must_use]
    pub fn with_read_chunk(mut self, read_chunk: usize) -> Self {
        self.read_chunk = read_chunk;
        self
    }

    /// Handle to the decoder
    pub fn decoder(&self) -> SharedDecoder {
        Arc::clone(&self.decoder)
    }

    /// The channel
    pub fn channel(&self) -> &C {
        &self.channel
    }

    /// Transport statistics
    pub fn transport_stats(&self) -> TransportStats {
        self.channel.stats()
    }

    /// Read one chunk if anything is waiting and feed it to the decoder.
    ///
    /// Returns the number of bytes fed, 0 when the channel was idle.
    pub fn poll(&mut self) -> Result<usize, TransportError> {
        match self.channel.read(Some(self.read_chunk))? {
            Some(bytes) => {
                tracing::trace!("Feeding {} bytes", bytes.len());
                self.decoder.lock().feed(&bytes);
                Ok(bytes.len())
            }
            None => Ok(0),
        }
    }

    /// Poll until the channel has nothing left. Returns total bytes fed.
    pub fn pump(&mut self) -> Result<usize, TransportError> {
        let mut total = 0;
        loop {
            let n = self.poll()?;
            if n == 0 {
                return Ok(total);
            }
            total += n;
        }
    }

    /// Everything decoded so far: frames first, then sentences.
    ///
    /// Each kind keeps arrival order; the two kinds are not ordered
    /// relative to each other.
    pub fn drain(&self) -> Vec<SessionEvent> {
        drain_events(&mut self.decoder.lock())
    }

    /// Encode a command frame and write it to the receiver
    pub fn send_command(&mut self, class_id: u8, message_id: u8, payload: &[u8]) -> Result<(), SessionError> {
        let frame = self.encoder.encode(class_id, message_id, payload)?;
        tracing::info!("-> {}", format_raw_frame(&frame));
        self.channel.write(&frame)?;
        Ok(())
    }

    /// Take the channel back
    pub fn into_channel(self) -> C {
        self.channel
    }
}
