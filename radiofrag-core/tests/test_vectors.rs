//! Reference vectors for the 10/19/5 code over the counting block `0..190`
//!
//! Both ends derive the matrix on their own, so these bytes are the
//! compatibility contract between independently built sender and receiver.

use radiofrag_core::{encoder::EncoderSession, fec::CodingMatrix, types::CodingParams};

const MATRIX_HEX: &str = "00000100000100000000\
                          01000100010100000001\
                          00010001000101010000\
                          01010100010000000000\
                          00000001000100010100";

const REDUNDANT_HEX: [&str; 5] = [
    "7947494b494f494b4947595b595f595b594749",
    "9ea7a8a9b2abacada6afb0b1bab3b4b5aeb7b8",
    "82bbbcb5b6bfb0c9cac3c4dddee71811120b0c",
    "797f717369676163696f717379474143595f51",
    "7b45474d4b4d4f350b05071d1b1d1f151b0507",
];

fn reference_session() -> EncoderSession {
    let block: Vec<u8> = (0..190).map(|i| i as u8).collect();
    EncoderSession::encode(&block, CodingParams::new(10, 19, 5)).unwrap()
}

#[test]
fn test_matrix_vector() {
    let matrix = CodingMatrix::generate(5, 10);
    assert_eq!(hex::encode(matrix.as_bytes()), MATRIX_HEX);

    let session = reference_session();
    assert_eq!(hex::encode(&session.as_bytes()[285..335]), MATRIX_HEX);
}

#[test]
fn test_redundant_vectors() {
    let session = reference_session();
    for (row, expected) in REDUNDANT_HEX.iter().enumerate() {
        let fragment = session.fragment(10 + row).unwrap();
        assert_eq!(hex::encode(&fragment), *expected, "redundant row {}", row);
    }
}

#[test]
fn test_sources_are_verbatim() {
    let session = reference_session();
    let fragment = session.fragment(5).unwrap();
    let expected: Vec<u8> = (95..114).collect();
    assert_eq!(&fragment[..], &expected[..]);
}
