//! Fuzzing entry points for radiofrag-core
//!
//! Each function takes arbitrary bytes and must never panic. They are plain
//! functions so any fuzzing driver (or a unit test) can call them.

use bytes::Bytes;
use radiofrag_core::{
    decoder::{DecoderConfig, FragmentDecoder},
    fec::CodingMatrix,
    frame::parse_frame,
    link::{LinkConfig, LinkMachine, Role},
    loopback::{LoopbackRadio, TallyDelay},
    store::MemoryStore,
    types::CodingParams,
};

/// Parse `data` as a frame; the first byte picks the fragment size
pub fn fuzz_parse_frame(data: &[u8]) {
    let Some((&size, rest)) = data.split_first() else {
        return;
    };
    let frame = Bytes::copy_from_slice(rest);
    if let Ok(fragment) = parse_frame(&frame, size as usize) {
        assert_eq!(fragment.payload.len(), size as usize);
    }
}

/// Load `data` as a coding matrix whose shape comes from the first two bytes
pub fn fuzz_matrix(data: &[u8]) {
    if data.len() < 2 {
        return;
    }
    let (rows, cols) = (data[0] as usize % 16 + 1, data[1] as usize % 16 + 1);
    if let Ok(matrix) = CodingMatrix::from_bytes(rows, cols, &data[2..]) {
        for row in 0..rows {
            assert!(matrix.row_weight(row) >= 1);
        }
    }
}

/// Feed `data` to a small decoder as `[sequence][payload]` records
pub fn fuzz_feed(data: &[u8]) {
    let params = CodingParams::new(4, 3, 3);
    let config = DecoderConfig::new(params).tolerance(5);
    let Ok((mut decoder, _)) =
        FragmentDecoder::init(config, MemoryStore::new(params.fragment_bytes()))
    else {
        return;
    };

    for record in data.chunks(1 + params.fragment_size) {
        let (sequence, payload) = (record[0] as usize % 8, &record[1..]);
        let before = decoder.received_count();
        match decoder.feed(sequence, payload) {
            Ok(_) => assert!(decoder.received_count() <= params.total_fragments()),
            Err(err) if err.is_transient() => assert_eq!(decoder.received_count(), before),
            Err(_) => {}
        }
    }
}

/// Replay `data` as 20-byte radio frames through a receiver link
pub fn fuzz_link(data: &[u8]) {
    let params = CodingParams::new(4, 3, 3);
    let mut config = LinkConfig::new(Role::Receiver);
    config.params = params;
    config.frame_size = 20;

    let Ok((decoder, _)) =
        FragmentDecoder::init(config.decoder_config(), MemoryStore::new(params.fragment_bytes()))
    else {
        return;
    };

    let mut radio = LoopbackRadio::new();
    let mut frames = 0;
    for chunk in data.chunks(config.frame_size) {
        radio.deliver(Bytes::copy_from_slice(chunk));
        frames += 1;
    }

    if let Ok(mut link) = LinkMachine::receiver(config, radio, TallyDelay::new(), decoder) {
        let _ = link.run(frames + 1);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fuzz_parse_frame_empty() {
        fuzz_parse_frame(&[]);
        fuzz_parse_frame(&[19]);
    }

    #[test]
    fn test_fuzz_parse_frame_random() {
        fuzz_parse_frame(&[2, 0x12, 0x34, 0x56, 0x78]);
    }

    #[test]
    fn test_fuzz_matrix() {
        fuzz_matrix(&[0, 0, 1]);
        fuzz_matrix(&[1, 1, 0, 0, 0, 0]);
        fuzz_matrix(&[0xFF; 300]);
    }

    #[test]
    fn test_fuzz_feed_random() {
        fuzz_feed(&[0xFF; 1024]);
        fuzz_feed(&[0, 1, 2, 3, 1, 9, 9, 9, 4, 5, 6, 7, 5, 0]);
    }

    #[test]
    fn test_fuzz_link_random() {
        fuzz_link(&[]);
        fuzz_link(&[0x00; 333]);
        let data: Vec<u8> = (0..=255).cycle().take(500).collect();
        fuzz_link(&data);
    }
}
