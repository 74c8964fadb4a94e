//! # Radiofrag Core
//!
//! Erasure-coded fragmentation transport for lossy, half-duplex radio links.
//!
//! A block is split into fixed-size source fragments, redundant fragments are
//! added with a binary (XOR) linear code, and the receiver rebuilds missing
//! sources from whatever redundant fragments arrive.
//!
//! ## Modules
//!
//! - `constants`: Link contract (sizes, timeouts, radio defaults)
//! - `error`: `FragError` and its status codes
//! - `types`: Core types (CodingParams, Fragment, DecodeStatus)
//! - `fec`: Coding matrix and elimination step
//! - `encoder`: Fragment encoding
//! - `store`: Backing stores for the decoder
//! - `decoder`: Incremental fragment decoding
//! - `frame`: Wire frames
//! - `radio`: Radio collaborator interface
//! - `link`: Link state machine
//! - `loopback`: In-memory radio for host-side runs

#![cfg_attr(not(feature = "std"), no_std)]
#![warn(missing_docs)]

extern crate alloc;

pub mod constants;
pub mod decoder;
pub mod encoder;
pub mod error;
pub mod fec;
pub mod frame;
pub mod link;
pub mod loopback;
pub mod radio;
pub mod store;
pub mod types;

// Re-export commonly used types
pub use decoder::{default_tolerance, DecoderConfig, FragmentDecoder};
pub use encoder::{encode, EncoderSession};
pub use error::FragError;
pub use fec::CodingMatrix;
pub use frame::{encode_frame, parse_frame};
pub use link::{LinkConfig, LinkMachine, LinkState, LinkStats, LinkStatus, Role};
pub use loopback::{LoopbackRadio, TallyDelay};
pub use radio::{Radio, RadioConfig, RadioEvent};
pub use store::{CallbackStore, FragmentStore, MemoryStore};
pub use types::{CodingParams, DecodeStatus, Fragment};

/// Result type alias for radiofrag operations
pub type Result<T> = core::result::Result<T, FragError>;
