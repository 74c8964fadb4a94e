//! Radio collaborator interface
//!
//! The link never touches transceiver registers. A driver implements
//! [`Radio`]: it applies a [`RadioConfig`], starts transmissions and
//! receive windows, and hands back the events its interrupt handlers
//! recorded. Handlers should do nothing beyond pushing onto an
//! [`EventQueue`]; all fragment work happens in the link's poll loop.

use crate::constants::{
    EVENT_QUEUE_DEPTH, FSK_AFC_BANDWIDTH_HZ, FSK_BANDWIDTH_HZ, FSK_DATARATE_BPS, FSK_DEVIATION_HZ,
    FSK_PREAMBLE_LENGTH, LORA_PREAMBLE_LENGTH, LORA_SYMBOL_TIMEOUT, RF_FREQUENCY_HZ,
    TX_OUTPUT_POWER_DBM, TX_TIMEOUT_MS,
};
use crate::error::FragError;
use alloc::collections::VecDeque;
use alloc::format;
use bytes::Bytes;
use serde::{Deserialize, Serialize};

/// Half-duplex transceiver driven by the link
pub trait Radio {
    /// Driver error
    type Error: core::fmt::Debug;

    /// Apply channel and modulation settings
    fn configure(&mut self, config: &RadioConfig) -> Result<(), Self::Error>;

    /// Start transmitting one frame; completion arrives as an event
    fn transmit(&mut self, frame: &[u8]) -> Result<(), Self::Error>;

    /// Open a receive window of `timeout_ms`
    fn listen(&mut self, timeout_ms: u32) -> Result<(), Self::Error>;

    /// Put the transceiver to sleep
    fn sleep(&mut self) -> Result<(), Self::Error>;

    /// Oldest event recorded since the last call
    fn next_event(&mut self) -> Option<RadioEvent>;
}

/// Notification raised by the transceiver
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RadioEvent {
    /// A transmission finished
    TxDone,

    /// A frame arrived
    RxDone {
        /// Frame bytes as received
        payload: Bytes,
        /// Received signal strength in dBm
        rssi: i16,
        /// Signal-to-noise ratio in dB
        snr: i8,
    },

    /// The receive window closed without a frame
    RxTimeout,

    /// A frame arrived but failed the radio's integrity check
    RxError,

    /// A transmission did not complete in time
    TxTimeout,
}

/// Bounded FIFO between event context and the poll loop
///
/// When full, new events are dropped and counted.
#[derive(Debug, Clone)]
pub struct EventQueue {
    events: VecDeque<RadioEvent>,
    depth: usize,
    dropped: usize,
}

impl EventQueue {
    /// Create a queue holding at most `depth` events
    pub fn new(depth: usize) -> Self {
        Self {
            events: VecDeque::with_capacity(depth),
            depth,
            dropped: 0,
        }
    }

    /// Record an event; returns false if it was dropped
    pub fn push(&mut self, event: RadioEvent) -> bool {
        if self.events.len() >= self.depth {
            self.dropped += 1;
            return false;
        }
        self.events.push_back(event);
        true
    }

    /// Take the oldest event
    pub fn pop(&mut self) -> Option<RadioEvent> {
        self.events.pop_front()
    }

    /// Events waiting
    pub fn len(&self) -> usize {
        self.events.len()
    }

    /// Whether no events are waiting
    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }

    /// Events dropped because the queue was full
    pub fn dropped(&self) -> usize {
        self.dropped
    }
}

impl Default for EventQueue {
    fn default() -> Self {
        Self::new(EVENT_QUEUE_DEPTH)
    }
}

/// LoRa bandwidth
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum LoRaBandwidth {
    /// 125 kHz
    Khz125,
    /// 250 kHz
    Khz250,
    /// 500 kHz
    #[default]
    Khz500,
}

impl LoRaBandwidth {
    /// Bandwidth in Hz
    pub const fn hz(self) -> u32 {
        match self {
            Self::Khz125 => 125_000,
            Self::Khz250 => 250_000,
            Self::Khz500 => 500_000,
        }
    }
}

/// LoRa coding rate
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum LoRaCodingRate {
    /// 4/5
    #[default]
    Cr4_5,
    /// 4/6
    Cr4_6,
    /// 4/7
    Cr4_7,
    /// 4/8
    Cr4_8,
}

/// Modulation settings
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "modem", rename_all = "lowercase")]
pub enum Modulation {
    /// LoRa chirp spread spectrum
    LoRa {
        /// Channel bandwidth
        bandwidth: LoRaBandwidth,
        /// Spreading factor, 7 to 12
        spreading_factor: u8,
        /// Forward error correction rate
        coding_rate: LoRaCodingRate,
        /// Preamble length in symbols
        preamble_len: u16,
        /// Receive symbol timeout
        symbol_timeout: u16,
        /// Hardware CRC on payloads
        crc: bool,
        /// IQ inversion
        iq_inverted: bool,
    },

    /// Frequency shift keying
    Fsk {
        /// Frequency deviation in Hz
        deviation_hz: u32,
        /// Data rate in bits per second
        datarate_bps: u32,
        /// Receive bandwidth in Hz
        bandwidth_hz: u32,
        /// AFC bandwidth in Hz
        afc_bandwidth_hz: u32,
        /// Preamble length in bytes
        preamble_len: u16,
        /// Hardware CRC on payloads
        crc: bool,
    },
}

impl Modulation {
    /// LoRa defaults: SF7, 500 kHz, 4/5, CRC on
    pub const fn lora() -> Self {
        Modulation::LoRa {
            bandwidth: LoRaBandwidth::Khz500,
            spreading_factor: 7,
            coding_rate: LoRaCodingRate::Cr4_5,
            preamble_len: LORA_PREAMBLE_LENGTH,
            symbol_timeout: LORA_SYMBOL_TIMEOUT,
            crc: true,
            iq_inverted: false,
        }
    }

    /// FSK defaults: 19.2 kbps, 25 kHz deviation, CRC on
    pub const fn fsk() -> Self {
        Modulation::Fsk {
            deviation_hz: FSK_DEVIATION_HZ,
            datarate_bps: FSK_DATARATE_BPS,
            bandwidth_hz: FSK_BANDWIDTH_HZ,
            afc_bandwidth_hz: FSK_AFC_BANDWIDTH_HZ,
            preamble_len: FSK_PREAMBLE_LENGTH,
            crc: true,
        }
    }

    /// Whether the radio checks payload CRCs (and raises `RxError`)
    pub const fn crc_enabled(&self) -> bool {
        match self {
            Modulation::LoRa { crc, .. } | Modulation::Fsk { crc, .. } => *crc,
        }
    }
}

/// Channel and modulation settings handed to the driver
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RadioConfig {
    /// Carrier frequency in Hz
    pub frequency_hz: u32,
    /// Transmit power in dBm
    pub tx_power_dbm: i8,
    /// Transmit timeout in milliseconds
    pub tx_timeout_ms: u32,
    /// Modulation settings
    pub modulation: Modulation,
}

impl RadioConfig {
    /// Check the settings a driver cannot apply
    pub fn validate(&self) -> Result<(), FragError> {
        if let Modulation::LoRa {
            spreading_factor, ..
        } = self.modulation
        {
            if !(7..=12).contains(&spreading_factor) {
                return Err(FragError::InvalidConfig(format!(
                    "spreading factor {} outside 7..=12",
                    spreading_factor
                )));
            }
        }
        if self.frequency_hz == 0 {
            return Err(FragError::InvalidConfig(
                "frequency must be > 0".into(),
            ));
        }
        Ok(())
    }
}

impl Default for RadioConfig {
    fn default() -> Self {
        Self {
            frequency_hz: RF_FREQUENCY_HZ,
            tx_power_dbm: TX_OUTPUT_POWER_DBM,
            tx_timeout_ms: TX_TIMEOUT_MS,
            modulation: Modulation::lora(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_queue_drops_when_full() {
        let mut queue = EventQueue::new(2);
        assert!(queue.push(RadioEvent::TxDone));
        assert!(queue.push(RadioEvent::RxTimeout));
        assert!(!queue.push(RadioEvent::RxError));

        assert_eq!(queue.dropped(), 1);
        assert_eq!(queue.pop(), Some(RadioEvent::TxDone));
        assert_eq!(queue.pop(), Some(RadioEvent::RxTimeout));
        assert!(queue.is_empty());
    }

    #[test]
    fn test_default_config() {
        let config = RadioConfig::default();
        assert_eq!(config.frequency_hz, 868_000_000);
        assert_eq!(config.tx_power_dbm, 14);
        assert!(config.modulation.crc_enabled());
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_rejects_bad_spreading_factor() {
        let mut config = RadioConfig::default();
        config.modulation = Modulation::LoRa {
            bandwidth: LoRaBandwidth::Khz125,
            spreading_factor: 13,
            coding_rate: LoRaCodingRate::Cr4_8,
            preamble_len: 8,
            symbol_timeout: 5,
            crc: true,
            iq_inverted: false,
        };
        assert!(config.validate().is_err());

        config.modulation = Modulation::fsk();
        assert!(config.validate().is_ok());
    }
}
