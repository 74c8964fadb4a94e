//! Core types shared by the encoder, decoder and link

use crate::constants::{
    DEFAULT_FRAGMENT_SIZE, DEFAULT_REDUNDANT_COUNT, DEFAULT_SOURCE_COUNT, MAX_FRAGMENTS,
};
use crate::error::FragError;
use alloc::format;
use alloc::vec;
use alloc::vec::Vec;
use bytes::Bytes;
use serde::{Deserialize, Serialize};

/// Shape of a coded block: how many fragments of which size
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CodingParams {
    /// Number of source fragments the block is split into
    pub source_count: usize,

    /// Payload bytes per fragment
    pub fragment_size: usize,

    /// Number of redundant (XOR-coded) fragments
    pub redundant_count: usize,
}

impl CodingParams {
    /// Create new coding parameters
    pub const fn new(source_count: usize, fragment_size: usize, redundant_count: usize) -> Self {
        Self {
            source_count,
            fragment_size,
            redundant_count,
        }
    }

    /// Validate the parameters
    pub fn validate(&self) -> Result<(), FragError> {
        if self.source_count == 0 {
            return Err(FragError::InvalidConfig("source_count must be > 0".into()));
        }
        if self.fragment_size == 0 {
            return Err(FragError::InvalidConfig("fragment_size must be > 0".into()));
        }
        if self.redundant_count == 0 {
            return Err(FragError::InvalidConfig(
                "redundant_count must be > 0".into(),
            ));
        }
        if self.total_fragments() > MAX_FRAGMENTS {
            return Err(FragError::InvalidConfig(format!(
                "{} fragments exceed the one-byte sequence space ({})",
                self.total_fragments(),
                MAX_FRAGMENTS
            )));
        }
        Ok(())
    }

    /// Source plus redundant fragments
    pub const fn total_fragments(&self) -> usize {
        self.source_count + self.redundant_count
    }

    /// Length of the source block these parameters describe
    pub const fn block_len(&self) -> usize {
        self.source_count * self.fragment_size
    }

    /// Bytes needed to hold every fragment of the session
    pub const fn fragment_bytes(&self) -> usize {
        self.total_fragments() * self.fragment_size
    }

    /// Region layout of an encoder buffer
    pub const fn layout(&self) -> EncodeLayout {
        let source_len = self.source_count * self.fragment_size;
        let redundant_len = self.redundant_count * self.fragment_size;
        let matrix_len = self.source_count * self.redundant_count;
        EncodeLayout {
            source_len,
            redundant_len,
            matrix_len,
        }
    }
}

impl Default for CodingParams {
    fn default() -> Self {
        Self::new(
            DEFAULT_SOURCE_COUNT,
            DEFAULT_FRAGMENT_SIZE,
            DEFAULT_REDUNDANT_COUNT,
        )
    }
}

/// Sizes of the three regions of an encoder buffer
///
/// ```text
/// +----------------+-------------------+------------------+
/// | source N*size  | redundant R*size  | matrix N*R bytes |
/// +----------------+-------------------+------------------+
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EncodeLayout {
    /// Bytes of the source region
    pub source_len: usize,
    /// Bytes of the redundant region
    pub redundant_len: usize,
    /// Bytes of the matrix region (one byte per coefficient)
    pub matrix_len: usize,
}

impl EncodeLayout {
    /// Offset of the redundant region
    pub const fn redundant_offset(&self) -> usize {
        self.source_len
    }

    /// Offset of the matrix region
    pub const fn matrix_offset(&self) -> usize {
        self.source_len + self.redundant_len
    }

    /// Total buffer bytes required
    pub const fn total(&self) -> usize {
        self.source_len + self.redundant_len + self.matrix_len
    }
}

/// A fragment as carried over the link
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Fragment {
    /// Zero-based fragment index; sources first, then redundant fragments
    pub sequence: u8,

    /// Exactly `fragment_size` payload bytes
    pub payload: Bytes,
}

impl Fragment {
    /// Create a new fragment
    pub fn new(sequence: u8, payload: Bytes) -> Self {
        Self { sequence, payload }
    }

    /// Fragment index as a usize
    pub fn index(&self) -> usize {
        self.sequence as usize
    }
}

/// Outcome of feeding one fragment into the decoder
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DecodeStatus {
    /// More fragments are needed
    Ongoing,

    /// Every source fragment is known; carries how many were rebuilt from
    /// redundancy rather than received directly
    Completed(usize),
}

impl DecodeStatus {
    /// Whether decoding has finished
    pub const fn is_complete(&self) -> bool {
        matches!(self, DecodeStatus::Completed(_))
    }
}

/// Fixed-length bit set used for receipt and known-fragment tracking
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Bitmap {
    words: Vec<u32>,
    len: usize,
}

impl Bitmap {
    /// Create a bitmap of `len` cleared bits
    pub fn new(len: usize) -> Self {
        Self {
            words: vec![0u32; len.div_ceil(32)],
            len,
        }
    }

    /// Read bit `index`; out-of-range bits read as cleared
    pub fn get(&self, index: usize) -> bool {
        if index >= self.len {
            return false;
        }
        self.words[index / 32] & (1 << (index % 32)) != 0
    }

    /// Set bit `index`; out-of-range indices are ignored
    pub fn set(&mut self, index: usize) {
        if index < self.len {
            self.words[index / 32] |= 1 << (index % 32);
        }
    }

    /// Clear every bit
    pub fn clear(&mut self) {
        self.words.iter_mut().for_each(|w| *w = 0);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_layout_regions() {
        let params = CodingParams::new(10, 19, 5);
        let layout = params.layout();

        assert_eq!(layout.source_len, 190);
        assert_eq!(layout.redundant_offset(), 190);
        assert_eq!(layout.matrix_offset(), 285);
        assert_eq!(layout.total(), 335);
    }

    #[test]
    fn test_validate_rejects_zero_counts() {
        assert!(CodingParams::new(0, 19, 5).validate().is_err());
        assert!(CodingParams::new(10, 0, 5).validate().is_err());
        assert!(CodingParams::new(10, 19, 0).validate().is_err());
        assert!(CodingParams::default().validate().is_ok());
    }

    #[test]
    fn test_bitmap_set_and_clear() {
        let mut bits = Bitmap::new(40);
        bits.set(0);
        bits.set(33);
        bits.set(33);
        bits.set(40); // out of range, ignored

        assert!(bits.get(0));
        assert!(bits.get(33));
        assert!(!bits.get(1));
        assert!(!bits.get(40));

        bits.clear();
        assert!(!bits.get(0));
        assert!(!bits.get(33));
    }

    #[test]
    fn test_validate_rejects_oversized_sequence_space() {
        assert!(CodingParams::new(200, 4, 56).validate().is_ok());
        assert!(matches!(
            CodingParams::new(200, 4, 57).validate(),
            Err(FragError::InvalidConfig(_))
        ));
    }
}
