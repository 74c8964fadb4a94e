//! Binary erasure code: coding matrix generation and elimination steps
//!
//! Redundant fragment `i` is the byte-wise XOR of the source fragments
//! selected by row `i` of a [`CodingMatrix`]. Rows come from a 23-bit
//! pseudo-random binary sequence seeded per row, so the sender and the
//! receiver derive the same matrix from `(redundant_count, source_count)`
//! alone.
//!
//! Decoding is incremental: whenever a pending redundant row reduces to a
//! single unknown source, that source is the XOR of the redundant fragment
//! with every other (known) source in the row. [`next_pivot`] finds such a
//! row; the decoder applies it and asks again until nothing reduces. When
//! every pending row still has two or more unknowns, [`eliminate`] solves
//! the pending rows together over GF(2).

use crate::constants::MATRIX_SEED_STRIDE;
use crate::error::FragError;
use crate::types::Bitmap;
use alloc::format;
use alloc::vec;
use alloc::vec::Vec;

/// Redundant-by-source matrix of 0/1 coefficients, one byte each
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CodingMatrix {
    rows: usize,
    cols: usize,
    coeffs: Vec<u8>,
}

impl CodingMatrix {
    /// Generate the matrix for `redundant_count` rows over `source_count` columns
    pub fn generate(redundant_count: usize, source_count: usize) -> Self {
        let mut coeffs = vec![0u8; redundant_count * source_count];
        if source_count > 0 {
            for (row, line) in coeffs.chunks_exact_mut(source_count).enumerate() {
                parity_row(row, line);
            }
        }
        Self {
            rows: redundant_count,
            cols: source_count,
            coeffs,
        }
    }

    /// Load a matrix from its one-byte-per-coefficient form
    pub fn from_bytes(rows: usize, cols: usize, bytes: &[u8]) -> Result<Self, FragError> {
        if bytes.len() != rows * cols {
            return Err(FragError::BufferTooSmall {
                needed: rows * cols,
                available: bytes.len(),
            });
        }
        if let Some(pos) = bytes.iter().position(|b| *b > 1) {
            return Err(FragError::InvalidConfig(format!(
                "matrix coefficient {} at offset {} is not 0 or 1",
                bytes[pos], pos
            )));
        }
        let matrix = Self {
            rows,
            cols,
            coeffs: bytes.to_vec(),
        };
        if let Some(row) = (0..rows).find(|r| matrix.row_weight(*r) == 0) {
            return Err(FragError::InvalidConfig(format!(
                "matrix row {} combines no sources",
                row
            )));
        }
        Ok(matrix)
    }

    /// Number of rows (redundant fragments)
    pub fn rows(&self) -> usize {
        self.rows
    }

    /// Number of columns (source fragments)
    pub fn cols(&self) -> usize {
        self.cols
    }

    /// Coefficients of one row
    pub fn row(&self, row: usize) -> &[u8] {
        &self.coeffs[row * self.cols..(row + 1) * self.cols]
    }

    /// Whether source `col` contributes to redundant fragment `row`
    pub fn get(&self, row: usize, col: usize) -> bool {
        self.coeffs[row * self.cols + col] != 0
    }

    /// Source indices combined into redundant fragment `row`
    pub fn columns(&self, row: usize) -> impl Iterator<Item = usize> + '_ {
        self.row(row)
            .iter()
            .enumerate()
            .filter(|(_, c)| **c != 0)
            .map(|(i, _)| i)
    }

    /// Number of sources combined into `row`
    pub fn row_weight(&self, row: usize) -> usize {
        self.row(row).iter().filter(|c| **c != 0).count()
    }

    /// Whether any row includes source `col`
    pub fn covers(&self, col: usize) -> bool {
        (0..self.rows).any(|r| self.get(r, col))
    }

    /// Sources of `row` not yet marked in `known`
    pub fn unknown_count(&self, row: usize, known: &Bitmap) -> usize {
        self.columns(row).filter(|c| !known.get(*c)).count()
    }

    /// Raw coefficients, row-major
    pub fn as_bytes(&self) -> &[u8] {
        &self.coeffs
    }

    /// Copy the coefficients into `out`, which must be exactly `rows * cols` long
    pub fn write_to(&self, out: &mut [u8]) -> Result<(), FragError> {
        if out.len() != self.coeffs.len() {
            return Err(FragError::BufferTooSmall {
                needed: self.coeffs.len(),
                available: out.len(),
            });
        }
        out.copy_from_slice(&self.coeffs);
        Ok(())
    }
}

/// One step of the elimination cascade
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Pivot {
    /// Redundant row that reduces to a single unknown
    pub row: usize,
    /// The source index it determines
    pub column: usize,
}

/// Find the first pending row with exactly one unknown source
///
/// `pending` holds redundant row indices (not sequence numbers) that have
/// been received but not yet used.
pub fn next_pivot(matrix: &CodingMatrix, known: &Bitmap, pending: &[usize]) -> Option<Pivot> {
    pending.iter().find_map(|&row| {
        let mut unknown = matrix.columns(row).filter(|c| !known.get(*c));
        match (unknown.next(), unknown.next()) {
            (Some(column), None) => Some(Pivot { row, column }),
            _ => None,
        }
    })
}

/// Reduce `coeffs` to reduced row echelon form over GF(2)
///
/// Each line of `coeffs` is one equation over the unknown columns and
/// `payloads` holds its right-hand side; every row operation is applied to
/// both. Returns `(line, column)` for each reduced line left with a single
/// coefficient, in which case `payloads[line]` is the value of `column`.
pub fn eliminate(coeffs: &mut [Vec<u8>], payloads: &mut [Vec<u8>]) -> Vec<(usize, usize)> {
    let width = coeffs.first().map_or(0, Vec::len);
    let mut rank = 0;

    for col in 0..width {
        if rank == coeffs.len() {
            break;
        }
        let Some(found) = (rank..coeffs.len()).find(|r| coeffs[*r][col] != 0) else {
            continue;
        };
        coeffs.swap(rank, found);
        payloads.swap(rank, found);

        for line in 0..coeffs.len() {
            if line != rank && coeffs[line][col] != 0 {
                xor_lines(coeffs, line, rank);
                xor_lines(payloads, line, rank);
            }
        }
        rank += 1;
    }

    coeffs[..rank]
        .iter()
        .enumerate()
        .filter_map(|(line, row)| {
            let mut set = row.iter().enumerate().filter(|(_, c)| **c != 0);
            match (set.next(), set.next()) {
                (Some((column, _)), None) => Some((line, column)),
                _ => None,
            }
        })
        .collect()
}

/// XOR line `src` into line `dst`
fn xor_lines(lines: &mut [Vec<u8>], dst: usize, src: usize) {
    if dst < src {
        let (head, tail) = lines.split_at_mut(src);
        xor_into(&mut head[dst], &tail[0]);
    } else {
        let (head, tail) = lines.split_at_mut(dst);
        xor_into(&mut tail[0], &head[src]);
    }
}

/// XOR `src` into `dst` byte by byte
pub fn xor_into(dst: &mut [u8], src: &[u8]) {
    dst.iter_mut().zip(src).for_each(|(d, s)| *d ^= s);
}

/// Advance the 23-bit PRBS (taps at bit 0 and bit 5)
const fn prbs23(x: u32) -> u32 {
    let b0 = x & 0x01;
    let b1 = (x & 0x20) >> 5;
    (x >> 1) + ((b0 ^ b1) << 22)
}

/// Fill `line` with the coefficients of redundant row `row`
fn parity_row(row: usize, line: &mut [u8]) {
    let m = line.len() as u32;
    // power-of-two widths draw modulo m + 1
    let modulus = if m.is_power_of_two() { m + 1 } else { m };
    let mut x = 1 + MATRIX_SEED_STRIDE * (row as u32 + 1);

    line.iter_mut().for_each(|c| *c = 0);
    for _ in 0..m / 2 {
        let col = loop {
            x = prbs23(x);
            let r = x % modulus;
            if r < m {
                break r;
            }
        };
        line[col as usize] = 1;
    }

    if line.iter().all(|c| *c == 0) {
        line[row % line.len()] = 1;
    }
}
