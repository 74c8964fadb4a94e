//! Wire frames
//!
//! ```text
//! +-----+----------------------+-----------------+
//! | seq | payload (frag size)  | zero padding    |
//! +-----+----------------------+-----------------+
//!   1B                          up to frame size
//! ```
//!
//! The sequence is the zero-based fragment index: sources `0..N`, then
//! redundant fragments `N..N+R`. Zero is an ordinary index, not a marker.

use crate::constants::SEQUENCE_SIZE;
use crate::error::FragError;
use crate::types::Fragment;
use alloc::format;
use bytes::{BufMut, Bytes, BytesMut};

/// Build a radio frame of exactly `frame_size` bytes
pub fn encode_frame(sequence: u8, payload: &[u8], frame_size: usize) -> Result<Bytes, FragError> {
    let needed = SEQUENCE_SIZE + payload.len();
    if needed > frame_size {
        return Err(FragError::BufferTooSmall {
            needed,
            available: frame_size,
        });
    }

    let mut buf = BytesMut::with_capacity(frame_size);
    buf.put_u8(sequence);
    buf.put_slice(payload);
    buf.resize(frame_size, 0);

    Ok(buf.freeze())
}

/// Parse a received frame carrying a `fragment_size` payload
///
/// Padding past the payload is ignored. The payload is a zero-copy slice of
/// `frame`.
pub fn parse_frame(frame: &Bytes, fragment_size: usize) -> Result<Fragment, FragError> {
    let needed = SEQUENCE_SIZE + fragment_size;
    if frame.len() < needed {
        return Err(FragError::MalformedFrame(format!(
            "{} bytes, need at least {}",
            frame.len(),
            needed
        )));
    }

    Ok(Fragment::new(frame[0], frame.slice(SEQUENCE_SIZE..needed)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::constants::FRAME_SIZE;

    #[test]
    fn test_frame_layout() {
        let payload: Vec<u8> = (0..19).collect();
        let frame = encode_frame(7, &payload, FRAME_SIZE).unwrap();

        assert_eq!(frame.len(), 32);
        assert_eq!(frame[0], 7);
        assert_eq!(&frame[1..20], &payload[..]);
        assert!(frame[20..].iter().all(|b| *b == 0));
    }

    #[test]
    fn test_parse_ignores_padding() {
        let frame = encode_frame(0, &[0xAB; 19], FRAME_SIZE).unwrap();
        let fragment = parse_frame(&frame, 19).unwrap();

        assert_eq!(fragment.sequence, 0);
        assert_eq!(fragment.payload.as_ref(), &[0xAB; 19]);
    }

    #[test]
    fn test_payload_too_large_for_frame() {
        let result = encode_frame(1, &[0u8; 32], FRAME_SIZE);
        assert_eq!(
            result,
            Err(FragError::BufferTooSmall {
                needed: 33,
                available: 32
            })
        );
    }

    #[test]
    fn test_short_frame_is_malformed() {
        let short = Bytes::from_static(&[3, 1, 2, 3]);
        let result = parse_frame(&short, 19);
        assert!(matches!(result, Err(FragError::MalformedFrame(_))));
    }
}
