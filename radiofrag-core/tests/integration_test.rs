//! Integration tests for the complete encode → lose → decode flow

use bytes::Bytes;
use radiofrag_core::{
    decoder::{DecoderConfig, FragmentDecoder},
    encoder::EncoderSession,
    error::FragError,
    fec::CodingMatrix,
    frame::encode_frame,
    link::{LinkConfig, LinkMachine, LinkStatus, Role},
    loopback::{LoopbackRadio, TallyDelay},
    store::{CallbackStore, MemoryStore},
    types::{CodingParams, DecodeStatus},
};
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::{Rng, SeedableRng};
use std::cell::RefCell;
use std::rc::Rc;

fn counting_block(len: usize) -> Vec<u8> {
    (0..len).map(|i| i as u8).collect()
}

fn decoder_for(params: CodingParams) -> FragmentDecoder<MemoryStore> {
    let config = DecoderConfig::new(params);
    let (decoder, _) = FragmentDecoder::init(config, MemoryStore::new(params.fragment_bytes())).unwrap();
    decoder
}

#[test]
fn test_single_lost_source_is_rebuilt() {
    let params = CodingParams::new(10, 19, 5);
    let block = counting_block(190);
    let session = EncoderSession::encode(&block, params).unwrap();
    let mut decoder = decoder_for(params);

    let mut statuses = Vec::new();
    for fragment in session.fragments().filter(|f| f.sequence != 5) {
        statuses.push(decoder.feed(fragment.index(), &fragment.payload).unwrap());
    }

    // sources 0..=9 without 5, then redundant row 0 covers {2, 5}
    assert!(statuses[..9].iter().all(|s| *s == DecodeStatus::Ongoing));
    assert!(statuses[9..].iter().all(|s| *s == DecodeStatus::Completed(1)));

    let mut fragment = [0u8; 19];
    decoder.read_fragment(5, &mut fragment).unwrap();
    assert_eq!(&fragment[..], &block[95..114]);

    let mut out = vec![0u8; 190];
    decoder.read_block(&mut out).unwrap();
    assert_eq!(out, block);
}

#[test]
fn test_six_lost_sources_exceed_tolerance() {
    let params = CodingParams::new(10, 19, 5);
    let session = EncoderSession::encode(&counting_block(190), params).unwrap();
    let config = DecoderConfig::new(params).tolerance(8);
    let (mut decoder, _) = FragmentDecoder::init(config, MemoryStore::new(285)).unwrap();

    let mut results = Vec::new();
    for fragment in session.fragments().filter(|f| f.sequence >= 6) {
        results.push(decoder.feed(fragment.index(), &fragment.payload));
    }

    assert_eq!(results.len(), 9);
    assert!(results[..8].iter().all(|r| *r == Ok(DecodeStatus::Ongoing)));
    // the five rows pin down four of the six lost sources
    let expected = FragError::Unrecoverable {
        received: 9,
        tolerance: 8,
        missing: 2,
    };
    assert_eq!(results[8], Err(expected.clone()));
    assert!(!decoder.is_complete());

    // the session stays failed
    let again = session.fragment(0).unwrap();
    assert_eq!(decoder.feed(0, &again), Err(expected));
}

#[test]
fn test_any_order_with_losses_never_misdecodes() {
    let params = CodingParams::new(10, 19, 5);
    let block: Vec<u8> = (0..190).map(|i| (i * 7 + 3) as u8).collect();
    let session = EncoderSession::encode(&block, params).unwrap();
    let mut rng = StdRng::seed_from_u64(0x5eed);

    for _ in 0..200 {
        let mut order: Vec<usize> = (0..params.total_fragments()).collect();
        order.shuffle(&mut rng);
        let keep = rng.gen_range(8..=order.len());

        let mut decoder = decoder_for(params);
        for &seq in &order[..keep] {
            let payload = session.fragment(seq).unwrap();
            if let DecodeStatus::Completed(_) = decoder.feed(seq, &payload).unwrap() {
                break;
            }
        }

        if keep == order.len() {
            assert!(decoder.is_complete());
        }
        if decoder.is_complete() {
            let mut out = vec![0u8; 190];
            decoder.read_block(&mut out).unwrap();
            assert_eq!(out, block);
        }
    }
}

/// Whether the received redundant rows pin down every lost source over GF(2)
fn lost_sources_determined(matrix: &CodingMatrix, lost: &[usize], rows: &[usize]) -> bool {
    let mut basis = [0u32; 32];
    let mut rank = 0;
    for &row in rows {
        let mut v = lost
            .iter()
            .enumerate()
            .filter(|(_, col)| matrix.get(row, **col))
            .fold(0u32, |acc, (i, _)| acc | (1 << i));
        while v != 0 {
            let top = 31 - v.leading_zeros() as usize;
            if basis[top] == 0 {
                basis[top] = v;
                rank += 1;
                break;
            }
            v ^= basis[top];
        }
    }
    rank == lost.len()
}

#[test]
fn test_every_determined_loss_pattern_completes() {
    let params = CodingParams::new(10, 19, 5);
    let block: Vec<u8> = (0..190).map(|i| (i as u8).wrapping_mul(13) ^ 0x5A).collect();
    let session = EncoderSession::encode(&block, params).unwrap();
    let matrix = CodingMatrix::generate(5, 10);
    let mut determined = 0;

    // bit s of `mask` set means fragment s is lost
    for mask in 1u32..(1 << 15) {
        if mask.count_ones() > 5 {
            continue;
        }
        let lost: Vec<usize> = (0..10).filter(|s| mask & (1 << s) != 0).collect();
        let rows: Vec<usize> = (0..5).filter(|r| mask & (1 << (10 + r)) == 0).collect();
        if !lost_sources_determined(&matrix, &lost, &rows) {
            continue;
        }
        determined += 1;

        let mut decoder = decoder_for(params);
        let mut status = DecodeStatus::Ongoing;
        for seq in (0..15).filter(|s| mask & (1 << s) == 0) {
            status = decoder.feed(seq, &session.fragment(seq).unwrap()).unwrap();
        }
        assert_eq!(
            status,
            DecodeStatus::Completed(lost.len()),
            "lost pattern {:015b}",
            mask
        );

        let mut out = vec![0u8; 190];
        decoder.read_block(&mut out).unwrap();
        assert_eq!(out, block, "lost pattern {:015b}", mask);
    }

    assert_eq!(determined, 2127);
}

#[test]
fn test_callback_store_backs_decoder() {
    let params = CodingParams::new(10, 19, 5);
    let block = counting_block(190);
    let session = EncoderSession::encode(&block, params).unwrap();

    let flash = Rc::new(RefCell::new(vec![0xFFu8; 285]));
    let reader = Rc::clone(&flash);
    let writer = Rc::clone(&flash);
    let store = CallbackStore::new(
        285,
        move |offset, buf: &mut [u8]| {
            buf.copy_from_slice(&reader.borrow()[offset..offset + buf.len()]);
            Ok(())
        },
        move |offset, bytes: &[u8]| {
            writer.borrow_mut()[offset..offset + bytes.len()].copy_from_slice(bytes);
            Ok(())
        },
    );

    let (mut decoder, cost) = FragmentDecoder::init(DecoderConfig::new(params), store).unwrap();
    assert_eq!(cost, 285);

    for fragment in session.fragments().filter(|f| f.sequence != 5) {
        decoder.feed(fragment.index(), &fragment.payload).unwrap();
    }
    assert!(decoder.is_complete());
    assert_eq!(&flash.borrow()[..190], &block[..]);
}

#[test]
fn test_storage_failure_leaves_decoder_unchanged() {
    let params = CodingParams::new(4, 2, 2);
    let session = EncoderSession::encode(&counting_block(8), params).unwrap();
    let fail = Rc::new(RefCell::new(false));
    let flag = Rc::clone(&fail);
    let data = Rc::new(RefCell::new(vec![0u8; 12]));
    let (reader, writer) = (Rc::clone(&data), Rc::clone(&data));

    let store = CallbackStore::new(
        12,
        move |offset, buf: &mut [u8]| {
            buf.copy_from_slice(&reader.borrow()[offset..offset + buf.len()]);
            Ok(())
        },
        move |offset, bytes: &[u8]| {
            if *flag.borrow() {
                return Err(FragError::Storage("flash busy".into()));
            }
            writer.borrow_mut()[offset..offset + bytes.len()].copy_from_slice(bytes);
            Ok(())
        },
    );
    let (mut decoder, _) = FragmentDecoder::init(DecoderConfig::new(params), store).unwrap();

    decoder.feed(0, &session.fragment(0).unwrap()).unwrap();
    *fail.borrow_mut() = true;
    let result = decoder.feed(1, &session.fragment(1).unwrap());
    assert!(matches!(result, Err(FragError::Storage(_))));
    assert_eq!(decoder.received_count(), 1);
    assert!(!decoder.is_received(1));
    assert_eq!(decoder.missing_sources(), 3);

    // the same fragment is accepted once the store recovers
    *fail.borrow_mut() = false;
    assert_eq!(
        decoder.feed(1, &session.fragment(1).unwrap()),
        Ok(DecodeStatus::Ongoing)
    );
    assert_eq!(decoder.received_count(), 2);
}

/// Run a sender and a receiver over loopback radios, dropping the frames
/// for which `lose` returns true
fn simulate(
    block: &[u8],
    receiver_config: LinkConfig,
    mut lose: impl FnMut(&Bytes) -> bool,
) -> (
    Result<LinkStatus, FragError>,
    LinkMachine<LoopbackRadio, TallyDelay>,
) {
    let params = receiver_config.params;
    let session = EncoderSession::encode(block, params).unwrap();
    let mut sender = LinkMachine::sender(
        LinkConfig::new(Role::Sender),
        LoopbackRadio::new(),
        TallyDelay::new(),
        session,
    )
    .unwrap();

    let (decoder, _) = FragmentDecoder::init(
        receiver_config.decoder_config(),
        MemoryStore::new(params.fragment_bytes()),
    )
    .unwrap();
    let mut receiver = LinkMachine::receiver(
        receiver_config,
        LoopbackRadio::new(),
        TallyDelay::new(),
        decoder,
    )
    .unwrap();

    sender.start().unwrap();
    receiver.start().unwrap();

    for _ in 0..500 {
        sender.poll().unwrap();
        for frame in sender.radio_mut().take_transmitted() {
            if !lose(&frame) {
                receiver.radio_mut().deliver(frame);
            }
        }
        match receiver.poll() {
            Ok(status) if status.is_terminal() => return (Ok(status), receiver),
            Ok(_) => {}
            Err(err) => return (Err(err), receiver),
        }
    }
    let status = receiver.status();
    (Ok(status), receiver)
}

#[test]
fn test_link_without_loss() {
    let block = counting_block(190);
    let (result, receiver) = simulate(&block, LinkConfig::new(Role::Receiver), |_| false);

    assert_eq!(result, Ok(LinkStatus::Completed { recovered: 0 }));
    assert_eq!(receiver.stats().sequence_gaps, 0);
    assert!(receiver.radio().is_asleep());
}

#[test]
fn test_link_rebuilds_lost_frames() {
    let block = counting_block(190);
    let (result, mut receiver) = simulate(&block, LinkConfig::new(Role::Receiver), |frame| {
        frame[0] == 3 || frame[0] == 8
    });

    assert_eq!(result, Ok(LinkStatus::Completed { recovered: 2 }));
    assert_eq!(receiver.stats().sequence_gaps, 2);
    assert_eq!(receiver.stats().frames_received, 13);

    let mut out = vec![0u8; 190];
    receiver.decoder_mut().unwrap().read_block(&mut out).unwrap();
    assert_eq!(out, block);
}

#[test]
fn test_link_random_loss() {
    let block: Vec<u8> = (0..190).map(|i| (i as u8).wrapping_mul(31)).collect();

    for seed in 0..50 {
        let mut rng = StdRng::seed_from_u64(seed);
        let (result, mut receiver) =
            simulate(&block, LinkConfig::new(Role::Receiver), |_| rng.gen_bool(0.2));

        match result {
            Ok(LinkStatus::Completed { .. }) => {
                let mut out = vec![0u8; 190];
                receiver.decoder_mut().unwrap().read_block(&mut out).unwrap();
                assert_eq!(out, block);
            }
            Ok(LinkStatus::Active) => {
                // the last frame was lost, nothing told the receiver to stop
                assert!(!receiver.decoder().unwrap().is_complete());
            }
            Err(FragError::StreamExhausted { missing }) => assert!(missing > 0),
            other => panic!("unexpected outcome {:?}", other),
        }
    }
}

#[test]
fn test_link_frames_match_encoder() {
    let params = CodingParams::new(10, 19, 5);
    let block = counting_block(190);
    let session = EncoderSession::encode(&block, params).unwrap();
    let expected: Vec<Bytes> = session
        .fragments()
        .map(|f| encode_frame(f.sequence, &f.payload, 32).unwrap())
        .collect();

    let mut sender = LinkMachine::sender(
        LinkConfig::new(Role::Sender),
        LoopbackRadio::new(),
        TallyDelay::new(),
        session,
    )
    .unwrap();
    assert_eq!(sender.run(100), Ok(LinkStatus::Sent { fragments: 15 }));
    assert_eq!(sender.radio().transmitted(), &expected[..]);
}
