// End-to-end tests: raw byte streams in, events and diagnostics out
use chrono::Utc;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use meter_sniffer_decoder::crc::{self, with_crc};
use meter_sniffer_decoder::register_decoder::round3;
use meter_sniffer_decoder::registers::meter;
use meter_sniffer_decoder::scanner::{FrameScanner, ScanOutcome};
use meter_sniffer_decoder::{DecodedEvent, Decoder, DecoderConfig, Diagnostic, MeasurementSet};

/// Function codes and exception codes the scanner reacts to
const FRAME_FUNCTIONS: [u8; 6] = [0x03, 0x04, 0x10, 0x83, 0x84, 0x90];

fn read_request(start: u16, count: u16) -> Vec<u8> {
    let [start_hi, start_lo] = start.to_be_bytes();
    let [count_hi, count_lo] = count.to_be_bytes();
    with_crc(&[0x01, 0x03, start_hi, start_lo, count_hi, count_lo])
}

fn read_response(address: u8, payload: &[u8]) -> Vec<u8> {
    let mut data = vec![address, 0x03, payload.len() as u8];
    data.extend_from_slice(payload);
    with_crc(&data)
}

/// Float as the meter puts it on the wire: low word first
fn wire_float(value: f32) -> [u8; 4] {
    let [a, b, c, d] = value.to_be_bytes();
    [c, d, a, b]
}

fn measurements(events: Vec<DecodedEvent>) -> Vec<MeasurementSet> {
    events
        .into_iter()
        .filter_map(|event| match event {
            DecodedEvent::Measurements(set) => Some(set),
            _ => None,
        })
        .collect()
}

/// Noise bytes that can never act as a function code
fn noise(rng: &mut StdRng, len: usize) -> Vec<u8> {
    let mut bytes = Vec::with_capacity(len);
    while bytes.len() < len {
        let byte: u8 = rng.gen();
        if !FRAME_FUNCTIONS.contains(&byte) {
            bytes.push(byte);
        }
    }
    bytes
}

#[test]
fn crc_round_trip_on_random_frames() {
    let mut rng = StdRng::seed_from_u64(7);
    for _ in 0..200 {
        let len = rng.gen_range(1..64);
        let data: Vec<u8> = (0..len).map(|_| rng.gen()).collect();
        let mut frame = with_crc(&data);
        assert!(crc::validate(&frame));

        let index = rng.gen_range(0..data.len());
        frame[index] ^= 0x01;
        assert_eq!(crc::validate_with(&frame, false), None);
    }
}

#[test]
fn response_is_labelled_from_request_start() {
    let map = meter::default_map();
    let mut decoder = Decoder::with_defaults();

    let mut payload = vec![0u8; 84];
    payload[..4].copy_from_slice(&wire_float(5.5));
    decoder.push_bytes(&read_request(0x2004, 21));
    decoder.push_bytes(&read_response(0x05, &payload));

    let sets = measurements(decoder.decode_available(Utc::now()));
    assert_eq!(sets.len(), 1);

    let set = &sets[0];
    assert!(set.correlated);
    assert_eq!(set.start_register, 0x2004);
    assert_eq!(set.len(), 21);
    assert_eq!(set.readings[0].label, map.get(0x2004).unwrap().label);
    assert_eq!(set.readings[0].value, 5.5);
    assert_eq!(set.readings[20].label, "Register0x2018");
    assert!(decoder.pending_request().is_none());
}

#[test]
fn implausible_voltage_is_zeroed_once() {
    for value in [-5.0f32, 900.0] {
        let mut decoder = Decoder::with_defaults();
        decoder.push_bytes(&read_response(0x05, &wire_float(value)));

        let sets = measurements(decoder.decode_available(Utc::now()));
        assert_eq!(sets[0].get("Voltage L1"), Some(0.0));

        let diagnostics = decoder.take_diagnostics();
        assert_eq!(diagnostics.len(), 1);
        assert!(matches!(
            &diagnostics[0],
            Diagnostic::Implausible { register: 0x2000, value: v, .. } if *v == f64::from(value)
        ));
    }
}

#[test]
fn frames_survive_noise_and_split_reads() {
    let mut data = vec![0xFF, 0x00, 0x55, 0xAA];
    data.extend(read_request(0x2000, 1));
    data.extend([0x13, 0x37]);
    data.extend(read_response(0x05, &wire_float(230.7)));

    for chunk_size in [1, 3, data.len()] {
        let mut decoder = Decoder::with_defaults();
        let mut events = Vec::new();
        for chunk in data.chunks(chunk_size) {
            decoder.push_bytes(chunk);
            events.extend(decoder.decode_available(Utc::now()));
        }

        assert_eq!(events.len(), 2, "chunk size {}", chunk_size);
        assert!(matches!(
            events[0],
            DecodedEvent::Request {
                start_register: 0x2000,
                register_count: 1,
                ..
            }
        ));
        let sets = measurements(events);
        assert_eq!(sets[0].get("Voltage L1"), Some(230.7));
        assert!(sets[0].correlated);
        assert_eq!(decoder.buffered_len(), 0);
    }
}

#[test]
fn exception_leaves_next_response_uncorrelated() {
    let mut decoder = Decoder::with_defaults();
    decoder.push_bytes(&read_request(0x2004, 1));
    decoder.push_bytes(&with_crc(&[0x05, 0x83, 0x02]));
    decoder.push_bytes(&read_response(0x05, &wire_float(230.7)));

    let events = decoder.decode_available(Utc::now());
    assert_eq!(events.len(), 3);
    assert!(matches!(events[1], DecodedEvent::ExceptionResponse { exception_code: 2, .. }));

    let sets = measurements(events);
    assert!(!sets[0].correlated);
    assert_eq!(sets[0].start_register, 0x2000);
    assert_eq!(sets[0].get("Voltage L1"), Some(230.7));
    assert_eq!(decoder.stats().exception_responses, 1);
}

#[test]
fn length_mismatch_is_reported_and_decoded() {
    let mut decoder = Decoder::with_defaults();
    decoder.push_bytes(&read_request(0x2000, 2));
    decoder.push_bytes(&read_response(0x05, &wire_float(230.7)));

    let sets = measurements(decoder.decode_available(Utc::now()));
    assert_eq!(sets[0].len(), 1);
    assert_eq!(sets[0].get("Voltage L1"), Some(230.7));
    assert_eq!(
        decoder.take_diagnostics(),
        vec![Diagnostic::LengthMismatch {
            start_register: 0x2000,
            expected: 8,
            actual: 4,
        }]
    );
}

#[test]
fn big_endian_crc_is_accepted_by_default() {
    let data = [0x05, 0x03, 0x04, 0xB3, 0x33, 0x43, 0x66];
    let mut frame = data.to_vec();
    frame.extend_from_slice(&crc::crc16(&data).to_be_bytes());

    let mut decoder = Decoder::with_defaults();
    decoder.push_bytes(&frame);
    let sets = measurements(decoder.decode_available(Utc::now()));
    assert_eq!(sets.len(), 1);

    let config = DecoderConfig::new().with_big_endian_crc(false);
    let mut strict = Decoder::new(config, meter::default_map()).unwrap();
    strict.push_bytes(&frame);
    assert!(measurements(strict.decode_available(Utc::now())).is_empty());
}

#[test]
fn stale_partial_frame_does_not_block_next_frame() {
    let mut decoder = Decoder::with_defaults();
    // A response header claiming 8 payload bytes, cut off by a line drop
    decoder.push_bytes(&[0x05, 0x03, 0x08, 0x00]);
    assert!(decoder.decode_available(Utc::now()).is_empty());

    assert!(decoder.flush_idle() > 0);
    decoder.push_bytes(&read_response(0x05, &wire_float(230.7)));
    let sets = measurements(decoder.decode_available(Utc::now()));
    assert_eq!(sets.len(), 1);
    assert_eq!(sets[0].get("Voltage L1"), Some(230.7));
}

#[test]
fn random_noise_stays_within_capacity() {
    let mut rng = StdRng::seed_from_u64(42);
    let config = DecoderConfig::new().with_buffer_capacity(512);
    let mut decoder = Decoder::new(config, meter::default_map()).unwrap();

    for _ in 0..500 {
        let len = rng.gen_range(1..300);
        let chunk: Vec<u8> = (0..len).map(|_| rng.gen()).collect();
        decoder.push_bytes(&chunk);
        decoder.decode_available(Utc::now());
        assert!(decoder.buffered_len() <= 512);
    }
    assert!(decoder.stats().bytes_discarded > 0);
}

#[test]
fn overflowing_append_keeps_newest_bytes() {
    let config = DecoderConfig::new().with_buffer_capacity(512);
    let mut decoder = Decoder::new(config, meter::default_map()).unwrap();

    decoder.push_bytes(&vec![0u8; 612]);
    assert_eq!(decoder.buffered_len(), 512);
    assert!(decoder
        .take_diagnostics()
        .contains(&Diagnostic::BufferOverflow {
            discarded: 100,
            capacity: 512
        }));
}

#[test]
fn decoder_resynchronizes_on_every_frame() {
    let mut rng = StdRng::seed_from_u64(1234);
    let mut decoder = Decoder::with_defaults();
    let mut expected = Vec::new();
    let mut values = Vec::new();

    for _ in 0..100 {
        let voltage: f32 = rng.gen_range(200.0..250.0);
        expected.push(round3(f64::from(voltage)));

        let gap = rng.gen_range(0..16);
        let mut data = noise(&mut rng, gap);
        data.extend(read_request(0x2000, 1));
        let gap = rng.gen_range(0..16);
        data.extend(noise(&mut rng, gap));
        data.extend(read_response(0x05, &wire_float(voltage)));
        decoder.push_bytes(&data);

        let sets = measurements(decoder.decode_available(Utc::now()));
        values.extend(sets.iter().filter_map(|set| set.get("Voltage L1")));
    }

    assert_eq!(values, expected);
    assert_eq!(decoder.stats().requests, 100);
    assert_eq!(decoder.stats().crc_mismatches, 0);
}

#[test]
fn rescanning_is_idempotent() {
    let scanner = FrameScanner::new(&DecoderConfig::default());
    let mut data = vec![0x42, 0x05, 0x03];
    data.extend(read_response(0x05, &wire_float(230.7)));

    let first = scanner.scan(&data);
    let second = scanner.scan(&data);
    assert_eq!(first, second);
    assert!(matches!(first.outcome, ScanOutcome::Found(c) if c.start == 3));
}

#[test]
fn consumed_frame_is_never_emitted_again() {
    let mut decoder = Decoder::with_defaults();
    decoder.push_bytes(&read_response(0x05, &wire_float(230.7)));

    assert_eq!(decoder.decode_available(Utc::now()).len(), 1);
    assert!(decoder.decode_available(Utc::now()).is_empty());
    assert!(decoder.next_event(Utc::now()).is_none());
    assert_eq!(decoder.stats().measurement_sets, 1);
}
