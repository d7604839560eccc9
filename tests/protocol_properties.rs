use proptest::prelude::*;
use rocket_telemetry::protocol::{encode_frames, split_payload, Frame, Reassembler, MAX_FRAME_BYTES};
use std::time::{Duration, Instant};

fn topic() -> impl Strategy<Value = String> {
    "[a-z0-9_/]{1,15}"
}

fn payload() -> impl Strategy<Value = Vec<u8>> {
    prop_oneof![
        prop::collection::vec(any::<u8>(), 0..600),
        prop::collection::vec(any::<u8>(), 0..=45_000),
    ]
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    #[test]
    fn frames_fit_and_round_trip(topic in topic(), payload in payload()) {
        let wire = encode_frames(&topic, &payload, MAX_FRAME_BYTES).unwrap();
        let total = wire.len();
        prop_assert!(total >= 1 && total <= 255);

        let mut reassembler = Reassembler::default();
        let now = Instant::now();
        let mut completed = Vec::new();
        for (i, buf) in wire.iter().enumerate() {
            prop_assert!(buf.len() <= MAX_FRAME_BYTES);
            let frame = Frame::decode(buf).unwrap();
            prop_assert_eq!(&frame.topic, &topic);
            prop_assert_eq!(frame.index as usize, i + 1);
            prop_assert_eq!(frame.total as usize, total);
            completed.extend(reassembler.push(frame, now));
        }
        prop_assert_eq!(completed, vec![payload]);
        prop_assert_eq!(reassembler.pending(), 0);
    }

    #[test]
    fn reassembly_is_order_independent(
        payload in prop::collection::vec(any::<u8>(), 1..2_000),
        max_frame in 24usize..=200,
        seed in any::<u64>(),
    ) {
        let frames = split_payload("sensors", &payload, max_frame).unwrap();
        let mut order: Vec<usize> = (0..frames.len()).collect();
        // Deterministic shuffle from the seed
        let mut state = seed | 1;
        for i in (1..order.len()).rev() {
            state ^= state << 13;
            state ^= state >> 7;
            state ^= state << 17;
            order.swap(i, (state % (i as u64 + 1)) as usize);
        }

        let mut reassembler = Reassembler::default();
        let now = Instant::now();
        let mut results = Vec::new();
        for (n, i) in order.iter().enumerate() {
            let out = reassembler.push(frames[*i].clone(), now);
            if n + 1 < order.len() {
                prop_assert!(out.is_none());
            }
            results.extend(out);
        }
        prop_assert_eq!(results, vec![payload]);
    }
}

#[test]
fn stale_bucket_is_swept_and_not_completed_later() {
    let payload: Vec<u8> = (0..100u8).collect();
    let frames = split_payload("sensors", &payload, 40).unwrap();
    assert!(frames.len() >= 3);

    let mut reassembler = Reassembler::new(Duration::from_millis(200));
    let t0 = Instant::now();
    reassembler.push(frames[0].clone(), t0);
    reassembler.push(frames[1].clone(), t0);

    let later = t0 + Duration::from_millis(250);
    assert_eq!(reassembler.sweep(later), 1);
    assert_eq!(reassembler.pending(), 0);

    // The remaining frames alone cannot complete the message
    for frame in &frames[2..] {
        assert!(reassembler.push(frame.clone(), later).is_none());
    }
    assert_eq!(reassembler.pending(), 1);
}

#[test]
fn fresh_bucket_survives_sweep() {
    let frames = split_payload("sensors", &[7u8; 300], 100).unwrap();
    let mut reassembler = Reassembler::new(Duration::from_millis(200));
    let t0 = Instant::now();
    reassembler.push(frames[0].clone(), t0);
    assert_eq!(reassembler.sweep(t0 + Duration::from_millis(150)), 0);
    for frame in &frames[1..] {
        if let Some(message) = reassembler.push(frame.clone(), t0 + Duration::from_millis(160)) {
            assert_eq!(message, vec![7u8; 300]);
        }
    }
    assert_eq!(reassembler.pending(), 0);
}

#[test]
fn timeout_has_a_floor() {
    assert_eq!(Reassembler::new(Duration::from_millis(5)).timeout(), Duration::from_millis(100));
}
