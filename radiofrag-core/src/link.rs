//! Link state machine
//!
//! A [`LinkMachine`] drives one half-duplex session, either as the sender
//! serving an [`EncoderSession`] or as the receiver feeding a
//! [`FragmentDecoder`]. Radio drivers only record events; each call to
//! [`LinkMachine::poll`] takes at most one of them, moves to the matching
//! [`LinkState`] and runs that state's handler. Every handler leaves the
//! machine in [`LinkState::LowPower`].
//!
//! The sender transmits one frame each time its receive window closes
//! empty, so frames go out at the pace of the receive timeout.

use crate::constants::{FRAME_SIZE, IDLE_DELAY_MS, RX_TIMEOUT_MS, SEQUENCE_SIZE, TX_PACING_MS};
use crate::decoder::{default_tolerance, DecoderConfig, FragmentDecoder};
use crate::encoder::EncoderSession;
use crate::error::FragError;
use crate::frame::{encode_frame, parse_frame};
use crate::radio::{Radio, RadioConfig, RadioEvent};
use crate::store::{FragmentStore, MemoryStore};
use crate::types::{CodingParams, DecodeStatus};
use alloc::format;
use alloc::vec::Vec;
use bytes::Bytes;
use embedded_hal::delay::DelayNs;
use serde::{Deserialize, Serialize};

#[cfg(feature = "logging")]
use tracing::{debug, info, warn};

/// Which end of the link a session runs
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    /// Owns the block and transmits its fragments
    #[default]
    Sender,
    /// Reconstructs the block
    Receiver,
}

/// Link session configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LinkConfig {
    /// Which end this session runs
    pub role: Role,

    /// Shape of the coded block, shared by both ends
    pub params: CodingParams,

    /// Radio frame length in bytes, padding included
    pub frame_size: usize,

    /// Receive window in milliseconds
    pub rx_timeout_ms: u32,

    /// Pause before each transmission in milliseconds
    pub tx_pacing_ms: u32,

    /// Sleep while no radio event is pending, in milliseconds
    pub idle_ms: u32,

    /// Receiver tolerance; `None` accepts every fragment of the session
    pub tolerance: Option<usize>,

    /// Sequences the receiver discards on arrival, to emulate loss
    pub drop_sequences: Vec<u8>,

    /// Channel and modulation settings
    pub radio: RadioConfig,
}

impl LinkConfig {
    /// Default configuration for `role`
    pub fn new(role: Role) -> Self {
        Self {
            role,
            ..Self::default()
        }
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<(), FragError> {
        self.params.validate()?;

        let needed = SEQUENCE_SIZE + self.params.fragment_size;
        if needed > self.frame_size {
            return Err(FragError::InvalidConfig(format!(
                "frame size {} cannot carry {} byte fragments",
                self.frame_size, self.params.fragment_size
            )));
        }

        self.radio.validate()
    }

    /// Size the receiver tolerance for `expected_loss` the way the bench
    /// firmware does
    pub fn expect_loss(&mut self, expected_loss: f32) {
        self.tolerance = Some(default_tolerance(&self.params, expected_loss));
    }

    /// Decoder configuration for a receiver session
    pub fn decoder_config(&self) -> DecoderConfig {
        let config = DecoderConfig::new(self.params);
        match self.tolerance {
            Some(tolerance) => config.tolerance(tolerance),
            None => config,
        }
    }
}

impl Default for LinkConfig {
    fn default() -> Self {
        Self {
            role: Role::Sender,
            params: CodingParams::default(),
            frame_size: FRAME_SIZE,
            rx_timeout_ms: RX_TIMEOUT_MS,
            tx_pacing_ms: TX_PACING_MS,
            idle_ms: IDLE_DELAY_MS,
            tolerance: None,
            drop_sequences: Vec::new(),
            radio: RadioConfig::default(),
        }
    }
}

/// State of the link between polls
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LinkState {
    /// Nothing to do until the radio reports an event
    LowPower,
    /// Receive window armed after start
    AwaitingReceive,
    /// A frame arrived
    Receiving,
    /// The receive window closed empty
    ReceiveTimeout,
    /// A frame failed the radio's integrity check
    ReceiveError,
    /// A transmission completed
    Transmitting,
    /// A transmission did not complete in time
    TransmitTimeout,
}

/// Progress of a session as seen by its caller
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum LinkStatus {
    /// Not started yet
    Idle,
    /// Running
    Active,
    /// Sender finished transmitting every fragment
    Sent {
        /// Fragments transmitted
        fragments: usize,
    },
    /// Receiver reconstructed the block
    Completed {
        /// Sources rebuilt from redundant fragments
        recovered: usize,
    },
    /// Session stopped on a fatal error
    Abandoned,
}

impl LinkStatus {
    /// Whether the session has stopped
    pub const fn is_terminal(&self) -> bool {
        matches!(
            self,
            LinkStatus::Sent { .. } | LinkStatus::Completed { .. } | LinkStatus::Abandoned
        )
    }
}

/// Counters kept over a session
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct LinkStats {
    /// Frames handed to the radio
    pub frames_sent: usize,
    /// Frames reported by the radio
    pub frames_received: usize,
    /// Frames discarded by `drop_sequences`
    pub frames_dropped: usize,
    /// Frames too short, out of range or rejected by the decoder
    pub malformed: usize,
    /// Fragments the decoder already knew
    pub duplicates: usize,
    /// Receive windows that closed empty
    pub rx_timeouts: usize,
    /// Frames that failed the radio's integrity check
    pub rx_errors: usize,
    /// Transmissions that timed out
    pub tx_timeouts: usize,
    /// Sequences skipped between consecutive arrivals
    pub sequence_gaps: usize,
    /// Signal strength of the last frame, dBm
    pub last_rssi: Option<i16>,
    /// Signal-to-noise ratio of the last frame, dB
    pub last_snr: Option<i8>,
}

#[derive(Debug)]
enum Endpoint<S> {
    Sender {
        session: EncoderSession,
        cursor: usize,
    },
    Receiver {
        decoder: FragmentDecoder<S>,
        next_expected: usize,
    },
}

/// One end of a fragment link
#[derive(Debug)]
pub struct LinkMachine<R, D, S = MemoryStore> {
    config: LinkConfig,
    radio: R,
    delay: D,
    endpoint: Endpoint<S>,
    state: LinkState,
    status: LinkStatus,
    stats: LinkStats,
    inbound: Option<Bytes>,
}

impl<R: Radio, D: DelayNs> LinkMachine<R, D, MemoryStore> {
    /// Sender session transmitting the fragments of `session`
    pub fn sender(
        config: LinkConfig,
        radio: R,
        delay: D,
        session: EncoderSession,
    ) -> Result<Self, FragError> {
        check_endpoint(&config, Role::Sender, session.params())?;
        Ok(Self::with_endpoint(
            config,
            radio,
            delay,
            Endpoint::Sender { session, cursor: 0 },
        ))
    }
}

impl<R: Radio, D: DelayNs, S: FragmentStore> LinkMachine<R, D, S> {
    /// Receiver session feeding `decoder`
    pub fn receiver(
        config: LinkConfig,
        radio: R,
        delay: D,
        decoder: FragmentDecoder<S>,
    ) -> Result<Self, FragError> {
        check_endpoint(&config, Role::Receiver, &decoder.config().params)?;
        Ok(Self::with_endpoint(
            config,
            radio,
            delay,
            Endpoint::Receiver {
                decoder,
                next_expected: 0,
            },
        ))
    }

    fn with_endpoint(config: LinkConfig, radio: R, delay: D, endpoint: Endpoint<S>) -> Self {
        Self {
            config,
            radio,
            delay,
            endpoint,
            state: LinkState::LowPower,
            status: LinkStatus::Idle,
            stats: LinkStats::default(),
            inbound: None,
        }
    }

    /// Configure the radio and open the first receive window
    pub fn start(&mut self) -> Result<(), FragError> {
        if self.status != LinkStatus::Idle {
            return Err(FragError::InvalidConfig("link already started".into()));
        }

        self.radio
            .configure(&self.config.radio)
            .map_err(radio_error)?;
        self.radio
            .listen(self.config.rx_timeout_ms)
            .map_err(radio_error)?;

        #[cfg(feature = "logging")]
        info!(
            "Link started as {:?}: {} fragments of {} bytes",
            self.config.role,
            self.config.params.total_fragments(),
            self.config.params.fragment_size
        );

        self.state = LinkState::AwaitingReceive;
        self.status = LinkStatus::Active;
        Ok(())
    }

    /// Handle at most one radio event
    ///
    /// Returns the session status after the step. A fatal error abandons
    /// the session and is returned once; later polls report `Abandoned`.
    pub fn poll(&mut self) -> Result<LinkStatus, FragError> {
        if self.status != LinkStatus::Active {
            return Ok(self.status);
        }

        if let Some(event) = self.radio.next_event() {
            self.dispatch(event);
        }

        let handled = match self.state {
            LinkState::LowPower | LinkState::AwaitingReceive => {
                self.delay.delay_ms(self.config.idle_ms);
                return Ok(self.status);
            }
            LinkState::Receiving => self.on_receive(),
            LinkState::ReceiveTimeout => self.on_receive_timeout(),
            LinkState::ReceiveError => {
                self.stats.rx_errors += 1;
                self.rearm()
            }
            LinkState::Transmitting => self.rearm(),
            LinkState::TransmitTimeout => {
                self.stats.tx_timeouts += 1;
                self.rearm()
            }
        };
        self.state = LinkState::LowPower;

        match handled {
            Ok(()) => Ok(self.status),
            Err(err) => {
                self.abandon(&err);
                Err(err)
            }
        }
    }

    /// Start if needed, then poll until the session stops or `max_polls`
    /// polls have run
    pub fn run(&mut self, max_polls: usize) -> Result<LinkStatus, FragError> {
        if self.status == LinkStatus::Idle {
            self.start()?;
        }
        for _ in 0..max_polls {
            let status = self.poll()?;
            if status.is_terminal() {
                return Ok(status);
            }
        }
        Ok(self.status)
    }

    fn dispatch(&mut self, event: RadioEvent) {
        self.state = match event {
            RadioEvent::TxDone => LinkState::Transmitting,
            RadioEvent::RxDone { payload, rssi, snr } => {
                self.stats.last_rssi = Some(rssi);
                self.stats.last_snr = Some(snr);
                self.inbound = Some(payload);
                LinkState::Receiving
            }
            RadioEvent::RxTimeout => {
                self.stats.rx_timeouts += 1;
                LinkState::ReceiveTimeout
            }
            RadioEvent::RxError => LinkState::ReceiveError,
            RadioEvent::TxTimeout => LinkState::TransmitTimeout,
        };
    }

    fn on_receive(&mut self) -> Result<(), FragError> {
        let Some(frame) = self.inbound.take() else {
            return self.rearm();
        };
        self.stats.frames_received += 1;

        if matches!(self.endpoint, Endpoint::Sender { .. }) {
            #[cfg(feature = "logging")]
            debug!("Sender ignoring {} byte frame", frame.len());
            return self.rearm();
        }

        match self.deliver(&frame)? {
            Some(recovered) => self.finish(LinkStatus::Completed { recovered }),
            None => self.rearm(),
        }
    }

    /// Feed one received frame to the decoder; `Some` once the block is whole
    fn deliver(&mut self, frame: &Bytes) -> Result<Option<usize>, FragError> {
        let params = self.config.params;
        let total = params.total_fragments();

        let fragment = match parse_frame(frame, params.fragment_size) {
            Ok(fragment) => fragment,
            Err(_err) => {
                #[cfg(feature = "logging")]
                warn!("Dropping frame: {:?}", _err);
                self.stats.malformed += 1;
                return Ok(None);
            }
        };

        let sequence = fragment.index();
        if sequence >= total {
            #[cfg(feature = "logging")]
            warn!("Dropping frame with sequence {} of {}", sequence, total);
            self.stats.malformed += 1;
            return Ok(None);
        }

        let Endpoint::Receiver {
            decoder,
            next_expected,
        } = &mut self.endpoint
        else {
            return Ok(None);
        };

        if sequence > *next_expected {
            self.stats.sequence_gaps += sequence - *next_expected;
        }
        *next_expected = (*next_expected).max(sequence + 1);

        if self.config.drop_sequences.contains(&fragment.sequence) {
            #[cfg(feature = "logging")]
            debug!("Discarding fragment {} (injected loss)", sequence);
            self.stats.frames_dropped += 1;
        } else {
            let before = decoder.received_count();
            match decoder.feed(sequence, &fragment.payload) {
                Ok(DecodeStatus::Completed(recovered)) => return Ok(Some(recovered)),
                Ok(DecodeStatus::Ongoing) => {
                    if decoder.received_count() == before {
                        self.stats.duplicates += 1;
                    }
                    #[cfg(feature = "logging")]
                    debug!(
                        "Fragment {} accepted, {} sources missing",
                        sequence,
                        decoder.missing_sources()
                    );
                }
                Err(err) if err.is_transient() => {
                    #[cfg(feature = "logging")]
                    warn!("Fragment {} rejected: {:?}", sequence, err);
                    self.stats.malformed += 1;
                }
                Err(err) => return Err(err),
            }
        }

        // frames arrive in order, nothing follows the last one
        if sequence + 1 == total {
            return Err(FragError::StreamExhausted {
                missing: decoder.missing_sources(),
            });
        }
        Ok(None)
    }

    fn on_receive_timeout(&mut self) -> Result<(), FragError> {
        let Endpoint::Sender { session, cursor } = &mut self.endpoint else {
            return self.rearm();
        };

        let total = session.total_fragments();
        if *cursor >= total {
            return self.finish(LinkStatus::Sent { fragments: total });
        }

        let sequence = *cursor;
        let frame = match session.fragment(sequence) {
            Some(payload) => encode_frame(sequence as u8, &payload, self.config.frame_size)?,
            None => return Err(FragError::SequenceOutOfRange { sequence, total }),
        };
        *cursor += 1;

        self.delay.delay_ms(self.config.tx_pacing_ms);
        self.radio.transmit(&frame).map_err(radio_error)?;
        self.stats.frames_sent += 1;

        #[cfg(feature = "logging")]
        debug!("Sent fragment {} ({}/{})", sequence, sequence + 1, total);

        Ok(())
    }

    fn rearm(&mut self) -> Result<(), FragError> {
        self.radio
            .listen(self.config.rx_timeout_ms)
            .map_err(radio_error)
    }

    fn finish(&mut self, status: LinkStatus) -> Result<(), FragError> {
        #[cfg(feature = "logging")]
        info!("Link finished: {:?}", status);

        self.status = status;
        self.radio.sleep().map_err(radio_error)
    }

    fn abandon(&mut self, _err: &FragError) {
        #[cfg(feature = "logging")]
        warn!("Abandoning session: {:?}", _err);

        self.status = LinkStatus::Abandoned;
        self.state = LinkState::LowPower;
        if self.radio.sleep().is_err() {
            #[cfg(feature = "logging")]
            warn!("Radio refused to sleep after abandonment");
        }
    }

    /// Current state
    pub fn state(&self) -> LinkState {
        self.state
    }

    /// Current status
    pub fn status(&self) -> LinkStatus {
        self.status
    }

    /// Session counters
    pub fn stats(&self) -> &LinkStats {
        &self.stats
    }

    /// Session configuration
    pub fn config(&self) -> &LinkConfig {
        &self.config
    }

    /// The radio
    pub fn radio(&self) -> &R {
        &self.radio
    }

    /// The radio, mutably
    pub fn radio_mut(&mut self) -> &mut R {
        &mut self.radio
    }

    /// The delay provider
    pub fn delay(&self) -> &D {
        &self.delay
    }

    /// Fragments transmitted so far (sender only)
    pub fn sent(&self) -> Option<usize> {
        match &self.endpoint {
            Endpoint::Sender { cursor, .. } => Some(*cursor),
            Endpoint::Receiver { .. } => None,
        }
    }

    /// The encoder session (sender only)
    pub fn encoder(&self) -> Option<&EncoderSession> {
        match &self.endpoint {
            Endpoint::Sender { session, .. } => Some(session),
            Endpoint::Receiver { .. } => None,
        }
    }

    /// The decoder (receiver only)
    pub fn decoder(&self) -> Option<&FragmentDecoder<S>> {
        match &self.endpoint {
            Endpoint::Receiver { decoder, .. } => Some(decoder),
            Endpoint::Sender { .. } => None,
        }
    }

    /// The decoder, mutably (receiver only)
    pub fn decoder_mut(&mut self) -> Option<&mut FragmentDecoder<S>> {
        match &mut self.endpoint {
            Endpoint::Receiver { decoder, .. } => Some(decoder),
            Endpoint::Sender { .. } => None,
        }
    }

    /// Take the decoder out of a finished receiver session
    pub fn into_decoder(self) -> Option<FragmentDecoder<S>> {
        match self.endpoint {
            Endpoint::Receiver { decoder, .. } => Some(decoder),
            Endpoint::Sender { .. } => None,
        }
    }
}

fn check_endpoint(config: &LinkConfig, role: Role, params: &CodingParams) -> Result<(), FragError> {
    config.validate()?;
    if config.role != role {
        return Err(FragError::InvalidConfig(format!(
            "{:?} session with a {:?} configuration",
            role, config.role
        )));
    }
    if *params != config.params {
        return Err(FragError::InvalidConfig(
            "session coding parameters differ from the link configuration".into(),
        ));
    }
    Ok(())
}

fn radio_error<E: core::fmt::Debug>(err: E) -> FragError {
    FragError::Radio(format!("{:?}", err))
}
