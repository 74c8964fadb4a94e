//! Incremental fragment decoding
//!
//! Fragments arrive one at a time, in any order, possibly duplicated, and
//! some never arrive. Each accepted fragment is persisted to the backing
//! store at `sequence * fragment_size`. Redundant fragments join a pending
//! list; whenever a pending row reduces to a single unknown source, that
//! source is rebuilt, written back, and the cascade continues.
//!
//! A rejected call leaves the decoder exactly as it was. Payload bytes a
//! failed call may have left in the store sit in slots the decoder still
//! considers empty.

use crate::constants::{TOLERANCE_HEADROOM, TOLERANCE_LOSS_MARGIN};
use crate::error::FragError;
use crate::fec::{eliminate, next_pivot, xor_into, CodingMatrix};
use crate::store::FragmentStore;
use crate::types::{Bitmap, CodingParams, DecodeStatus};
use alloc::format;
use alloc::vec;
use alloc::vec::Vec;

#[cfg(feature = "logging")]
use tracing::{debug, warn};

/// Decoder configuration
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DecoderConfig {
    /// Shape of the coded block
    pub params: CodingParams,

    /// Backing-store bytes reserved for this session
    pub capacity: usize,

    /// Received fragments allowed before giving up
    pub tolerance: usize,
}

impl DecoderConfig {
    /// Configuration with the full store footprint and a tolerance that
    /// accepts every fragment of the session
    pub const fn new(params: CodingParams) -> Self {
        Self {
            params,
            capacity: params.fragment_bytes(),
            tolerance: params.total_fragments(),
        }
    }

    /// Set the reserved store capacity
    pub const fn capacity(mut self, capacity: usize) -> Self {
        self.capacity = capacity;
        self
    }

    /// Set the tolerance
    pub const fn tolerance(mut self, tolerance: usize) -> Self {
        self.tolerance = tolerance;
        self
    }

    /// Validate the configuration against a store of `store_capacity` bytes
    pub fn validate(&self, store_capacity: usize) -> Result<(), FragError> {
        self.params.validate()?;

        let total = self.params.total_fragments();
        if self.tolerance == 0 || self.tolerance > total {
            return Err(FragError::InvalidConfig(format!(
                "tolerance {} outside 1..={}",
                self.tolerance, total
            )));
        }

        let needed = self.params.fragment_bytes();
        let available = self.capacity.min(store_capacity);
        if available < needed {
            return Err(FragError::BufferTooSmall { needed, available });
        }
        Ok(())
    }
}

/// Tolerance sized for an expected loss rate
///
/// `headroom + source_count * (loss + margin)`, capped at the session size.
pub fn default_tolerance(params: &CodingParams, expected_loss: f32) -> usize {
    let loss = expected_loss.clamp(0.0, 1.0) + TOLERANCE_LOSS_MARGIN;
    let estimate = TOLERANCE_HEADROOM + (params.source_count as f32 * loss) as usize;
    estimate.min(params.total_fragments()).max(1)
}

/// Terminal state of a decode session
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Outcome {
    Running,
    Completed(usize),
    Failed,
}

/// Incremental decoder over a backing store
#[derive(Debug)]
pub struct FragmentDecoder<S> {
    config: DecoderConfig,
    store: S,
    matrix: CodingMatrix,
    /// Receipt bitmap over all `source_count + redundant_count` sequences
    received: Bitmap,
    /// Sources received or rebuilt
    known: Bitmap,
    /// Redundant rows received but not yet consumed
    pending: Vec<usize>,
    received_count: usize,
    missing: usize,
    recovered: usize,
    outcome: Outcome,
}

/// State a failed `feed` rolls back to
struct Checkpoint {
    received: Bitmap,
    known: Bitmap,
    pending: Vec<usize>,
    received_count: usize,
    missing: usize,
    recovered: usize,
}

impl<S: FragmentStore> FragmentDecoder<S> {
    /// Validate `config` against `store` and start a session
    ///
    /// Returns the decoder and the number of store bytes it will use.
    pub fn init(config: DecoderConfig, store: S) -> Result<(Self, usize), FragError> {
        config.validate(store.capacity())?;

        let params = config.params;
        let cost = params.fragment_bytes();

        #[cfg(feature = "logging")]
        debug!(
            "Decoder init: {} source + {} redundant fragments of {} bytes, tolerance {}, memory cost {}",
            params.source_count,
            params.redundant_count,
            params.fragment_size,
            config.tolerance,
            cost
        );

        let decoder = Self {
            config,
            store,
            matrix: CodingMatrix::generate(params.redundant_count, params.source_count),
            received: Bitmap::new(params.total_fragments()),
            known: Bitmap::new(params.source_count),
            pending: Vec::with_capacity(params.redundant_count),
            received_count: 0,
            missing: params.source_count,
            recovered: 0,
            outcome: Outcome::Running,
        };
        Ok((decoder, cost))
    }

    /// Feed one fragment
    ///
    /// Duplicates are ignored. Once the session has completed or failed the
    /// same outcome is returned for every further call.
    pub fn feed(&mut self, sequence: usize, payload: &[u8]) -> Result<DecodeStatus, FragError> {
        let params = self.config.params;

        if payload.len() != params.fragment_size {
            return Err(FragError::SizeMismatch {
                expected: params.fragment_size,
                actual: payload.len(),
            });
        }
        if sequence >= params.total_fragments() {
            return Err(FragError::SequenceOutOfRange {
                sequence,
                total: params.total_fragments(),
            });
        }

        match self.outcome {
            Outcome::Completed(n) => return Ok(DecodeStatus::Completed(n)),
            Outcome::Failed => return Err(self.unrecoverable()),
            Outcome::Running => {}
        }

        if self.received.get(sequence)
            || (sequence < params.source_count && self.known.get(sequence))
        {
            #[cfg(feature = "logging")]
            debug!("Fragment {} already known, ignoring", sequence);
            return Ok(DecodeStatus::Ongoing);
        }

        let checkpoint = self.checkpoint();
        if let Err(err) = self.accept(sequence, payload) {
            self.restore(checkpoint);
            return Err(err);
        }

        if self.missing == 0 {
            #[cfg(feature = "logging")]
            debug!(
                "Decode complete after {} fragments ({} rebuilt)",
                self.received_count, self.recovered
            );
            self.outcome = Outcome::Completed(self.recovered);
            self.pending.clear();
            return Ok(DecodeStatus::Completed(self.recovered));
        }

        if self.received_count > self.config.tolerance {
            #[cfg(feature = "logging")]
            warn!(
                "Giving up: {} fragments received, tolerance {}, {} sources missing",
                self.received_count, self.config.tolerance, self.missing
            );
            self.outcome = Outcome::Failed;
            return Err(self.unrecoverable());
        }

        Ok(DecodeStatus::Ongoing)
    }

    fn accept(&mut self, sequence: usize, payload: &[u8]) -> Result<(), FragError> {
        let params = self.config.params;

        self.store.write(sequence * params.fragment_size, payload)?;
        self.received.set(sequence);
        self.received_count += 1;

        if sequence < params.source_count {
            self.known.set(sequence);
            self.missing -= 1;
        } else {
            self.pending.push(sequence - params.source_count);
        }

        self.cascade()
    }

    /// Rebuild sources until the pending rows determine no further unknown
    fn cascade(&mut self) -> Result<(), FragError> {
        let params = self.config.params;
        let size = params.fragment_size;
        let mut acc = vec![0u8; size];
        let mut scratch = vec![0u8; size];

        loop {
            let matrix = &self.matrix;
            let known = &self.known;
            self.pending.retain(|row| matrix.unknown_count(*row, known) > 0);

            let Some(pivot) = next_pivot(&self.matrix, &self.known, &self.pending) else {
                if self.solve_pending()? == 0 {
                    return Ok(());
                }
                continue;
            };

            self.store
                .read((params.source_count + pivot.row) * size, &mut acc)?;
            for col in self.matrix.columns(pivot.row) {
                if col != pivot.column {
                    self.store.read(col * size, &mut scratch)?;
                    xor_into(&mut acc, &scratch);
                }
            }
            self.store.write(pivot.column * size, &acc)?;

            #[cfg(feature = "logging")]
            debug!(
                "Rebuilt source {} from redundant row {}",
                pivot.column, pivot.row
            );

            self.known.set(pivot.column);
            self.missing -= 1;
            self.recovered += 1;
            self.pending.retain(|row| *row != pivot.row);
        }
    }

    /// Solve the pending rows jointly once none of them peels on its own
    ///
    /// Returns the number of sources rebuilt.
    fn solve_pending(&mut self) -> Result<usize, FragError> {
        if self.pending.len() < 2 {
            return Ok(0);
        }

        let params = self.config.params;
        let size = params.fragment_size;
        let unknown: Vec<usize> = (0..params.source_count)
            .filter(|col| !self.known.get(*col))
            .collect();

        let mut coeffs = Vec::with_capacity(self.pending.len());
        let mut payloads = Vec::with_capacity(self.pending.len());
        let mut scratch = vec![0u8; size];
        for &row in &self.pending {
            let mut acc = vec![0u8; size];
            self.store
                .read((params.source_count + row) * size, &mut acc)?;
            for col in self.matrix.columns(row) {
                if self.known.get(col) {
                    self.store.read(col * size, &mut scratch)?;
                    xor_into(&mut acc, &scratch);
                }
            }
            coeffs.push(
                unknown
                    .iter()
                    .map(|col| u8::from(self.matrix.get(row, *col)))
                    .collect::<Vec<u8>>(),
            );
            payloads.push(acc);
        }

        let solved = eliminate(&mut coeffs, &mut payloads);
        for &(line, col) in &solved {
            let source = unknown[col];
            self.store.write(source * size, &payloads[line])?;

            #[cfg(feature = "logging")]
            debug!(
                "Rebuilt source {} by elimination over {} pending rows",
                source,
                self.pending.len()
            );

            self.known.set(source);
            self.missing -= 1;
            self.recovered += 1;
        }
        Ok(solved.len())
    }

    fn checkpoint(&self) -> Checkpoint {
        Checkpoint {
            received: self.received.clone(),
            known: self.known.clone(),
            pending: self.pending.clone(),
            received_count: self.received_count,
            missing: self.missing,
            recovered: self.recovered,
        }
    }

    fn restore(&mut self, checkpoint: Checkpoint) {
        self.received = checkpoint.received;
        self.known = checkpoint.known;
        self.pending = checkpoint.pending;
        self.received_count = checkpoint.received_count;
        self.missing = checkpoint.missing;
        self.recovered = checkpoint.recovered;
    }

    fn unrecoverable(&self) -> FragError {
        FragError::Unrecoverable {
            received: self.received_count,
            tolerance: self.config.tolerance,
            missing: self.missing,
        }
    }

    /// Current status, `Ongoing` while running
    pub fn status(&self) -> Result<DecodeStatus, FragError> {
        match self.outcome {
            Outcome::Running => Ok(DecodeStatus::Ongoing),
            Outcome::Completed(n) => Ok(DecodeStatus::Completed(n)),
            Outcome::Failed => Err(self.unrecoverable()),
        }
    }

    /// Whether every source fragment is known
    pub fn is_complete(&self) -> bool {
        self.missing == 0
    }

    /// Whether `sequence` has been received (rebuilt sources do not count)
    pub fn is_received(&self, sequence: usize) -> bool {
        self.received.get(sequence)
    }

    /// Fragments received so far, duplicates excluded
    pub fn received_count(&self) -> usize {
        self.received_count
    }

    /// Source fragments still unknown
    pub fn missing_sources(&self) -> usize {
        self.missing
    }

    /// Source fragments rebuilt from redundancy so far
    pub fn recovered_count(&self) -> usize {
        self.recovered
    }

    /// Session configuration
    pub fn config(&self) -> &DecoderConfig {
        &self.config
    }

    /// The coding matrix this decoder solves against
    pub fn matrix(&self) -> &CodingMatrix {
        &self.matrix
    }

    /// Read source fragment `index` out of the store
    pub fn read_fragment(&mut self, index: usize, out: &mut [u8]) -> Result<(), FragError> {
        let params = self.config.params;
        if index >= params.source_count || !self.known.get(index) {
            return Err(FragError::InvalidConfig(format!(
                "source fragment {} is not known",
                index
            )));
        }
        if out.len() != params.fragment_size {
            return Err(FragError::SizeMismatch {
                expected: params.fragment_size,
                actual: out.len(),
            });
        }
        self.store.read(index * params.fragment_size, out)
    }

    /// Read the reconstructed block into `out`
    pub fn read_block(&mut self, out: &mut [u8]) -> Result<(), FragError> {
        let params = self.config.params;
        if self.missing > 0 {
            return Err(FragError::InvalidConfig(format!(
                "block incomplete: {} sources missing",
                self.missing
            )));
        }
        if out.len() != params.block_len() {
            return Err(FragError::BlockLengthMismatch {
                expected: params.block_len(),
                actual: out.len(),
            });
        }
        self.store.read(0, out)
    }

    /// Forget every fragment and start a new session on the same store
    pub fn reset(&mut self) {
        let params = self.config.params;
        self.received.clear();
        self.known.clear();
        self.pending.clear();
        self.received_count = 0;
        self.missing = params.source_count;
        self.recovered = 0;
        self.outcome = Outcome::Running;
    }

    /// Borrow the backing store
    pub fn store(&self) -> &S {
        &self.store
    }

    /// End the session and hand back the store
    pub fn into_store(self) -> S {
        self.store
    }
}
