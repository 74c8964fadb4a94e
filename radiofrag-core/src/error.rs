//! Error types for fragment transport operations

use alloc::string::String;

/// Errors that can occur while encoding, decoding or moving fragments
#[cfg_attr(feature = "std", derive(thiserror::Error))]
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FragError {
    /// Counts or sizes that cannot form a session
    #[cfg_attr(feature = "std", error("Invalid configuration: {0}"))]
    InvalidConfig(String),

    /// Caller-supplied buffer or store is too small
    #[cfg_attr(feature = "std", error("Buffer too small: need {needed} bytes, have {available}"))]
    BufferTooSmall {
        /// Bytes the operation requires.
        needed: usize,
        /// Bytes actually available.
        available: usize,
    },

    /// Source block is not `source_count * fragment_size` bytes long
    #[cfg_attr(feature = "std", error("Block length mismatch: expected {expected} bytes, got {actual}"))]
    BlockLengthMismatch {
        /// The block length implied by the coding parameters.
        expected: usize,
        /// The length actually supplied.
        actual: usize,
    },

    /// Fragment payload length differs from the session fragment size
    #[cfg_attr(feature = "std", error("Fragment size mismatch: expected {expected} bytes, got {actual}"))]
    SizeMismatch {
        /// The session fragment size.
        expected: usize,
        /// The payload length supplied.
        actual: usize,
    },

    /// Sequence number outside `0..source_count + redundant_count`
    #[cfg_attr(feature = "std", error("Sequence {sequence} out of range (session has {total} fragments)"))]
    SequenceOutOfRange {
        /// The offending sequence number.
        sequence: usize,
        /// Total fragments in the session.
        total: usize,
    },

    /// Radio frame too short to carry a fragment
    #[cfg_attr(feature = "std", error("Malformed frame: {0}"))]
    MalformedFrame(String),

    /// More fragments arrived than the tolerance allows without completing
    #[cfg_attr(feature = "std", error("Unrecoverable: {received} fragments received (tolerance {tolerance}), {missing} sources still missing"))]
    Unrecoverable {
        /// Fragments received so far.
        received: usize,
        /// Configured tolerance.
        tolerance: usize,
        /// Source fragments still unknown.
        missing: usize,
    },

    /// The fragment stream ended before the block could be rebuilt
    #[cfg_attr(feature = "std", error("Fragment stream exhausted with {missing} sources still missing"))]
    StreamExhausted {
        /// Source fragments still unknown.
        missing: usize,
    },

    /// Backing store read/write failure
    #[cfg_attr(feature = "std", error("Storage error: {0}"))]
    Storage(String),

    /// Radio driver failure
    #[cfg_attr(feature = "std", error("Radio error: {0}"))]
    Radio(String),
}

impl FragError {
    /// Negative status code for firmware-style callers
    pub const fn code(&self) -> i32 {
        match self {
            FragError::InvalidConfig(_) => -1,
            FragError::BufferTooSmall { .. } => -2,
            FragError::BlockLengthMismatch { .. } => -3,
            FragError::SizeMismatch { .. } => -4,
            FragError::SequenceOutOfRange { .. } => -5,
            FragError::MalformedFrame(_) => -6,
            FragError::Unrecoverable { .. } => -7,
            FragError::StreamExhausted { .. } => -8,
            FragError::Storage(_) => -9,
            FragError::Radio(_) => -10,
        }
    }

    /// Whether the link can drop the offending frame and keep listening
    pub const fn is_transient(&self) -> bool {
        matches!(
            self,
            FragError::SizeMismatch { .. }
                | FragError::SequenceOutOfRange { .. }
                | FragError::MalformedFrame(_)
        )
    }
}
