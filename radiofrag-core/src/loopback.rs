//! In-memory radio and delay for host-side runs
//!
//! [`LoopbackRadio`] behaves like a transceiver whose interrupt handlers
//! fire instantly: a transmission completes as soon as it starts, and a
//! receive window yields the next delivered frame or times out at once.
//! Wiring one sender's transmissions into a receiver's deliveries gives a
//! complete link without hardware.

use crate::constants::EVENT_QUEUE_DEPTH;
use crate::radio::{EventQueue, Radio, RadioConfig, RadioEvent};
use alloc::collections::VecDeque;
use alloc::vec::Vec;
use bytes::Bytes;
use core::convert::Infallible;
use embedded_hal::delay::DelayNs;

/// Radio that loops frames through in-memory queues
#[derive(Debug, Clone)]
pub struct LoopbackRadio {
    events: EventQueue,
    inbound: VecDeque<Bytes>,
    transmitted: Vec<Bytes>,
    config: Option<RadioConfig>,
    listens: usize,
    asleep: bool,
    rssi: i16,
    snr: i8,
}

impl LoopbackRadio {
    /// Create an idle radio with nothing to deliver
    pub fn new() -> Self {
        Self {
            events: EventQueue::new(EVENT_QUEUE_DEPTH),
            inbound: VecDeque::new(),
            transmitted: Vec::new(),
            config: None,
            listens: 0,
            asleep: false,
            rssi: -60,
            snr: 9,
        }
    }

    /// Queue a frame for a later receive window
    pub fn deliver(&mut self, frame: Bytes) {
        self.inbound.push_back(frame);
    }

    /// Record an arbitrary event, as an interrupt handler would
    pub fn inject(&mut self, event: RadioEvent) -> bool {
        self.events.push(event)
    }

    /// Signal quality reported with received frames
    pub fn set_signal(&mut self, rssi: i16, snr: i8) {
        self.rssi = rssi;
        self.snr = snr;
    }

    /// Frames transmitted so far
    pub fn transmitted(&self) -> &[Bytes] {
        &self.transmitted
    }

    /// Drain the transmitted frames
    pub fn take_transmitted(&mut self) -> Vec<Bytes> {
        core::mem::take(&mut self.transmitted)
    }

    /// Frames still waiting for a receive window
    pub fn pending_deliveries(&self) -> usize {
        self.inbound.len()
    }

    /// Receive windows opened so far
    pub fn listens(&self) -> usize {
        self.listens
    }

    /// Whether the radio was put to sleep
    pub fn is_asleep(&self) -> bool {
        self.asleep
    }

    /// Settings applied by the last `configure`
    pub fn config(&self) -> Option<&RadioConfig> {
        self.config.as_ref()
    }
}

impl Default for LoopbackRadio {
    fn default() -> Self {
        Self::new()
    }
}

impl Radio for LoopbackRadio {
    type Error = Infallible;

    fn configure(&mut self, config: &RadioConfig) -> Result<(), Self::Error> {
        self.config = Some(*config);
        Ok(())
    }

    fn transmit(&mut self, frame: &[u8]) -> Result<(), Self::Error> {
        self.asleep = false;
        self.transmitted.push(Bytes::copy_from_slice(frame));
        self.events.push(RadioEvent::TxDone);
        Ok(())
    }

    fn listen(&mut self, _timeout_ms: u32) -> Result<(), Self::Error> {
        self.asleep = false;
        self.listens += 1;
        let event = match self.inbound.pop_front() {
            Some(payload) => RadioEvent::RxDone {
                payload,
                rssi: self.rssi,
                snr: self.snr,
            },
            None => RadioEvent::RxTimeout,
        };
        self.events.push(event);
        Ok(())
    }

    fn sleep(&mut self) -> Result<(), Self::Error> {
        self.asleep = true;
        Ok(())
    }

    fn next_event(&mut self) -> Option<RadioEvent> {
        self.events.pop()
    }
}

/// Delay that returns at once and keeps a tally
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TallyDelay {
    total_ns: u64,
}

impl TallyDelay {
    /// Create a delay with an empty tally
    pub const fn new() -> Self {
        Self { total_ns: 0 }
    }

    /// Milliseconds that would have elapsed
    pub const fn elapsed_ms(&self) -> u64 {
        self.total_ns / 1_000_000
    }
}

impl DelayNs for TallyDelay {
    fn delay_ns(&mut self, ns: u32) {
        self.total_ns += u64::from(ns);
    }

    fn delay_ms(&mut self, ms: u32) {
        self.total_ns += u64::from(ms) * 1_000_000;
    }
}
