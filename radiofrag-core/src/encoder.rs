//! Fragment encoding
//!
//! The code is systematic: source fragments go out verbatim, followed by
//! redundant fragments built from the coding matrix. Everything lands in one
//! contiguous buffer (see [`EncodeLayout`](crate::types::EncodeLayout)).

use crate::error::FragError;
use crate::fec::{xor_into, CodingMatrix};
use crate::types::{CodingParams, Fragment};
use bytes::{Bytes, BytesMut};

#[cfg(feature = "logging")]
use tracing::debug;

/// Encode `source_block` into `output`
///
/// `output` receives, in order:
/// 1. Source region: the block unchanged (`source_count * fragment_size`)
/// 2. Redundant region: one XOR combination per matrix row
///    (`redundant_count * fragment_size`)
/// 3. Matrix region: one byte per coefficient (`source_count * redundant_count`)
///
/// Returns the number of bytes used. On error nothing is written.
pub fn encode(
    source_block: &[u8],
    params: &CodingParams,
    output: &mut [u8],
) -> Result<usize, FragError> {
    check_output(params, output.len())?;
    if source_block.len() != params.block_len() {
        return Err(FragError::BlockLengthMismatch {
            expected: params.block_len(),
            actual: source_block.len(),
        });
    }

    output[..params.block_len()].copy_from_slice(source_block);
    encode_in_place(output, params)
}

/// Encode a block that already sits at the start of `buffer`
///
/// Same layout and guarantees as [`encode`]; the source region is left as is.
pub fn encode_in_place(buffer: &mut [u8], params: &CodingParams) -> Result<usize, FragError> {
    check_output(params, buffer.len())?;

    let layout = params.layout();
    let size = params.fragment_size;
    let (source, rest) = buffer.split_at_mut(layout.source_len);
    let (redundant, rest) = rest.split_at_mut(layout.redundant_len);

    let matrix = CodingMatrix::generate(params.redundant_count, params.source_count);
    matrix.write_to(&mut rest[..layout.matrix_len])?;

    for (row, coded) in redundant.chunks_exact_mut(size).enumerate() {
        coded.fill(0);
        for col in matrix.columns(row) {
            xor_into(coded, &source[col * size..(col + 1) * size]);
        }
    }

    #[cfg(feature = "logging")]
    debug!(
        "Encoded {} source + {} redundant fragments of {} bytes ({} bytes used)",
        params.source_count,
        params.redundant_count,
        size,
        layout.total()
    );

    Ok(layout.total())
}

fn check_output(params: &CodingParams, available: usize) -> Result<(), FragError> {
    params.validate()?;
    let needed = params.layout().total();
    if available < needed {
        return Err(FragError::BufferTooSmall { needed, available });
    }
    Ok(())
}

/// An encoded block, served fragment by fragment to the link
#[derive(Debug, Clone)]
pub struct EncoderSession {
    params: CodingParams,
    buf: Bytes,
    used: usize,
}

impl EncoderSession {
    /// Encode `block` into a buffer sized exactly for `params`
    pub fn encode(block: &[u8], params: CodingParams) -> Result<Self, FragError> {
        Self::with_capacity(block, params, params.layout().total())
    }

    /// Encode `block` into a buffer of `capacity` bytes
    pub fn with_capacity(
        block: &[u8],
        params: CodingParams,
        capacity: usize,
    ) -> Result<Self, FragError> {
        check_output(&params, capacity)?;
        let mut buf = BytesMut::zeroed(capacity);
        let used = encode(block, &params, &mut buf)?;
        Ok(Self {
            params,
            buf: buf.freeze(),
            used,
        })
    }

    /// Coding parameters of this session
    pub fn params(&self) -> &CodingParams {
        &self.params
    }

    /// Buffer capacity in bytes
    pub fn capacity(&self) -> usize {
        self.buf.len()
    }

    /// Bytes of the buffer in use
    pub fn len(&self) -> usize {
        self.used
    }

    /// Whether the session holds no data
    pub fn is_empty(&self) -> bool {
        self.used == 0
    }

    /// Source plus redundant fragments
    pub fn total_fragments(&self) -> usize {
        self.params.total_fragments()
    }

    /// Payload of fragment `sequence` (sources first, then redundant)
    pub fn fragment(&self, sequence: usize) -> Option<Bytes> {
        if sequence >= self.total_fragments() {
            return None;
        }
        let size = self.params.fragment_size;
        Some(self.buf.slice(sequence * size..(sequence + 1) * size))
    }

    /// Every fragment in transmission order
    pub fn fragments(&self) -> impl Iterator<Item = Fragment> + '_ {
        (0..self.total_fragments()).filter_map(move |seq| {
            self.fragment(seq)
                .map(|payload| Fragment::new(seq as u8, payload))
        })
    }

    /// The source region
    pub fn source_region(&self) -> &[u8] {
        &self.buf[..self.params.layout().source_len]
    }

    /// The redundant region
    pub fn redundant_region(&self) -> &[u8] {
        let layout = self.params.layout();
        &self.buf[layout.redundant_offset()..layout.matrix_offset()]
    }

    /// The coding matrix, read back from the matrix region
    pub fn matrix(&self) -> Result<CodingMatrix, FragError> {
        let layout = self.params.layout();
        CodingMatrix::from_bytes(
            self.params.redundant_count,
            self.params.source_count,
            &self.buf[layout.matrix_offset()..layout.total()],
        )
    }

    /// The used part of the buffer
    pub fn as_bytes(&self) -> &[u8] {
        &self.buf[..self.used]
    }
}
