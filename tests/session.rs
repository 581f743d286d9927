//! Session wiring between a channel, the decoder and the encoder

use std::collections::VecDeque;

use bytes::Bytes;
use mockall::mock;
use mockall::predicate::eq;

use gpsmux_core::core::protocol::ubx::MAX_PAYLOAD_LEN;
use gpsmux_core::{
    encode, FrameEncoder, FrameError, GnssChannel, Session, SessionError, SessionEvent, StreamDecoder, SyncPair,
    TransportError, TransportStats,
};

mock! {
    pub Channel {}

    impl GnssChannel for Channel {
        fn available(&mut self) -> Option<usize>;
        fn read(&mut self, max: Option<usize>) -> Result<Option<Bytes>, TransportError>;
        fn write(&mut self, data: &[u8]) -> Result<(), TransportError>;
        fn stats(&self) -> TransportStats;
        fn connection_info(&self) -> String;
    }
}

const GGA: &[u8] = b"$GPGGA,123519,4807.038,N,01131.000,E,1,08,0.9,545.4,M,46.9,M,,*47\r\n";

/// Channel that hands out `chunks` in order, then reports idle
fn scripted(chunks: Vec<Vec<u8>>) -> MockChannel {
    let mut pending: VecDeque<Bytes> = chunks.into_iter().map(Bytes::from).collect();
    let mut channel = MockChannel::new();
    channel.expect_read().returning(move |_| Ok(pending.pop_front()));
    channel
}

#[test]
fn test_poll_feeds_one_chunk() {
    let mut channel = MockChannel::new();
    channel
        .expect_read()
        .with(eq(Some(64)))
        .times(1)
        .returning(|_| Ok(Some(Bytes::from_static(GGA))));

    let mut session = Session::new(channel, StreamDecoder::new()).with_read_chunk(64);
    assert_eq!(session.poll().unwrap(), GGA.len());

    match session.drain().as_slice() {
        [SessionEvent::Sentence(sentence)] => assert!(sentence.checksum_valid),
        other => panic!("unexpected {:?}", other),
    }
}

#[test]
fn test_pump_until_idle() {
    let frame = encode(0x0D, 0x01, &[0x10; 16]).unwrap();
    // split the frame across reads
    let chunks = vec![frame[..5].to_vec(), frame[5..].to_vec(), GGA.to_vec()];
    let total: usize = chunks.iter().map(Vec::len).sum();

    let mut session = Session::new(scripted(chunks), StreamDecoder::new());
    assert_eq!(session.pump().unwrap(), total);
    assert_eq!(session.pump().unwrap(), 0);

    let events = session.drain();
    assert_eq!(events.len(), 2);
    assert!(matches!(&events[0], SessionEvent::Frame(f) if f.key() == (0x0D, 0x01) && f.checksum_valid));
    assert!(matches!(&events[1], SessionEvent::Sentence(_)));
}

#[test]
fn test_read_fault_surfaces() {
    let mut channel = MockChannel::new();
    channel.expect_read().returning(|_| {
        Err(TransportError::RetriesExhausted {
            operation: "i2c read",
            attempts: 8,
            last_error: "Nack".into(),
        })
    });

    let mut session = Session::new(channel, StreamDecoder::new());
    assert!(matches!(session.pump(), Err(TransportError::RetriesExhausted { attempts: 8, .. })));
}

#[test]
fn test_send_command_writes_encoded_frame() {
    let expected = encode(0x06, 0x01, &[0xF0, 0x05, 0x01]).unwrap();
    let mut channel = MockChannel::new();
    channel
        .expect_write()
        .withf(move |data: &[u8]| data == expected.as_slice())
        .times(1)
        .returning(|_| Ok(()));

    let mut session = Session::new(channel, StreamDecoder::new());
    session.send_command(0x06, 0x01, &[0xF0, 0x05, 0x01]).unwrap();
}

#[test]
fn test_send_command_uses_decoder_sync() {
    let expected = FrameEncoder::new(SyncPair::ALLYSTAR).encode(0x06, 0x01, &[]).unwrap();
    assert_eq!(&expected[..2], &[0xF1, 0xD9]);

    let mut channel = MockChannel::new();
    channel
        .expect_write()
        .withf(move |data: &[u8]| data == expected.as_slice())
        .times(1)
        .returning(|_| Ok(()));

    let mut session = Session::new(channel, StreamDecoder::with_sync(SyncPair::ALLYSTAR));
    session.send_command(0x06, 0x01, &[]).unwrap();
}

#[test]
fn test_oversized_command_never_written() {
    let mut channel = MockChannel::new();
    channel.expect_write().never();

    let mut session = Session::new(channel, StreamDecoder::new());
    let payload = vec![0u8; MAX_PAYLOAD_LEN + 1];
    match session.send_command(0x06, 0x01, &payload) {
        Err(SessionError::Frame(FrameError::PayloadTooLarge(n))) => assert_eq!(n, MAX_PAYLOAD_LEN + 1),
        other => panic!("unexpected {:?}", other),
    }
}

#[test]
fn test_write_fault_surfaces() {
    let mut channel = MockChannel::new();
    channel
        .expect_write()
        .returning(|_| Err(TransportError::ConnectionFailed("unplugged".into())));

    let mut session = Session::new(channel, StreamDecoder::new());
    assert!(matches!(
        session.send_command(0x01, 0x21, &[]),
        Err(SessionError::Transport(TransportError::ConnectionFailed(_)))
    ));
}

#[test]
fn test_stats_pass_through() {
    let mut channel = MockChannel::new();
    channel.expect_stats().return_const(TransportStats {
        bytes_received: 10,
        bytes_sent: 8,
        faults: 1,
        retries: 1,
    });

    let session = Session::new(channel, StreamDecoder::new());
    assert_eq!(session.transport_stats().faults, 1);
}

#[test]
fn test_shared_decoder_across_threads() {
    let mut session = Session::new(scripted(vec![GGA.to_vec(), GGA.to_vec()]), StreamDecoder::new());
    let decoder = session.decoder();

    let worker = std::thread::spawn(move || session.pump());
    assert_eq!(worker.join().unwrap().unwrap(), GGA.len() * 2);

    let mut decoder = decoder.lock();
    assert_eq!(decoder.pending_sentences(), 2);
    assert_eq!(decoder.stats().sentences, 2);
    assert!(decoder.pop_sentence().is_some());
}
