//! Constants and limits for the fragment link
//!
//! Fragment counts and sizes are a build-time contract between sender and
//! receiver: nothing here is negotiated on the wire.

/// Size of the sequence field at the start of every frame
pub const SEQUENCE_SIZE: usize = 1;

/// Fixed radio frame length in bytes (sequence + payload + padding)
pub const FRAME_SIZE: usize = 32;

/// Largest number of fragments (source + redundant) one session can address.
/// The sequence field is a single byte.
pub const MAX_FRAGMENTS: usize = 256;

/// Default number of source fragments a block is split into
pub const DEFAULT_SOURCE_COUNT: usize = 10;

/// Default fragment payload size in bytes
pub const DEFAULT_FRAGMENT_SIZE: usize = 19;

/// Default number of redundant fragments
pub const DEFAULT_REDUNDANT_COUNT: usize = DEFAULT_SOURCE_COUNT - 5;

/// Expected packet error rate used to size the default tolerance
pub const DEFAULT_EXPECTED_LOSS: f32 = 0.3;

/// Fixed headroom added to the tolerance on top of the loss estimate
pub const TOLERANCE_HEADROOM: usize = 10;

/// Extra loss margin applied on top of the expected loss
pub const TOLERANCE_LOSS_MARGIN: f32 = 0.05;

/// Receive window armed after every transaction, in milliseconds
pub const RX_TIMEOUT_MS: u32 = 3500;

/// Delay inserted before each fragment transmission, in milliseconds
pub const TX_PACING_MS: u32 = 10;

/// Passive wait observed in the low-power state, in milliseconds
pub const IDLE_DELAY_MS: u32 = 1000;

/// Seed multiplier for the parity row generator
pub const MATRIX_SEED_STRIDE: u32 = 1001;

/// Number of radio events the event queue holds before dropping
pub const EVENT_QUEUE_DEPTH: usize = 8;

/// Default carrier frequency in Hz
pub const RF_FREQUENCY_HZ: u32 = 868_000_000;

/// Default transmit power in dBm
pub const TX_OUTPUT_POWER_DBM: i8 = 14;

/// Default LoRa preamble length in symbols (same for TX and RX)
pub const LORA_PREAMBLE_LENGTH: u16 = 8;

/// Default LoRa receive symbol timeout
pub const LORA_SYMBOL_TIMEOUT: u16 = 5;

/// Default FSK frequency deviation in Hz
pub const FSK_DEVIATION_HZ: u32 = 25_000;

/// Default FSK data rate in bits per second
pub const FSK_DATARATE_BPS: u32 = 19_200;

/// Default FSK receive bandwidth in Hz
pub const FSK_BANDWIDTH_HZ: u32 = 50_000;

/// Default FSK AFC bandwidth in Hz
pub const FSK_AFC_BANDWIDTH_HZ: u32 = 83_333;

/// Default FSK preamble length in bytes
pub const FSK_PREAMBLE_LENGTH: u16 = 5;

/// Transmit timeout handed to the radio driver, in milliseconds
pub const TX_TIMEOUT_MS: u32 = 2000;
