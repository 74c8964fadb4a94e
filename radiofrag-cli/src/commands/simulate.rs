use crate::commands::{counting_block, digest, fit_block, load_config, read_input};
use crate::{CodingArgs, ToleranceArgs};
use anyhow::{bail, Context, Result};
use colored::*;
use radiofrag_core::decoder::FragmentDecoder;
use radiofrag_core::encoder::EncoderSession;
use radiofrag_core::link::{LinkConfig, LinkMachine, LinkStats, LinkStatus, Role};
use radiofrag_core::loopback::{LoopbackRadio, TallyDelay};
use radiofrag_core::store::MemoryStore;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::Serialize;
use std::fs;
use std::io::BufRead;
use tracing::{debug, info, warn};

/// Knobs for a simulated session
#[derive(Debug, Clone)]
pub struct SimulateOptions {
    /// Probability that a frame is lost over the air
    pub loss: f64,
    /// Seed for the loss pattern
    pub seed: u64,
    /// Sequences the receiver discards on arrival
    pub drop: Vec<u8>,
    /// When the receiver gives up
    pub tolerance: ToleranceArgs,
    /// Poll budget for the whole session
    pub max_polls: usize,
    /// Where to write the JSON report
    pub report: Option<String>,
}

impl Default for SimulateOptions {
    fn default() -> Self {
        Self {
            loss: 0.0,
            seed: 0,
            drop: Vec::new(),
            tolerance: ToleranceArgs::default(),
            max_polls: 10_000,
            report: None,
        }
    }
}

/// Outcome of a simulated session
#[derive(Debug, Clone, Serialize)]
pub struct SimulationReport {
    /// Receiver status when the session stopped
    pub status: LinkStatus,
    /// Error that abandoned the receiver, if any
    pub error: Option<String>,
    /// Frames lost over the air
    pub frames_lost: usize,
    /// Sender counters
    pub sender: LinkStats,
    /// Receiver counters
    pub receiver: LinkStats,
    /// Simulated time spent by the sender, milliseconds
    pub sender_elapsed_ms: u64,
    /// CRC32C of the transmitted block
    pub block_crc32c: u32,
    /// CRC32C of the reconstructed block
    pub recovered_crc32c: Option<u32>,
}

impl SimulationReport {
    /// Whether the receiver rebuilt exactly the transmitted block
    pub fn is_success(&self) -> bool {
        self.recovered_crc32c == Some(self.block_crc32c)
    }
}

/// Block until a line starting with `1` is read, like the bench firmware's
/// start prompt
pub fn wait_for_start<R: BufRead>(mut reader: R) -> Result<()> {
    let mut line = String::new();
    loop {
        line.clear();
        if reader.read_line(&mut line)? == 0 {
            bail!("Input closed before the start signal");
        }
        if line.trim_start().starts_with('1') {
            return Ok(());
        }
        println!("Press 1 to start");
    }
}

/// Run a sender and a receiver over loopback radios with random loss
///
/// Without `input` the counting block is sent.
pub fn execute(
    input: Option<&str>,
    config_path: Option<&str>,
    coding: &CodingArgs,
    options: &SimulateOptions,
) -> Result<SimulationReport> {
    if !(0.0..=1.0).contains(&options.loss) {
        bail!("Loss rate {} outside 0..=1", options.loss);
    }

    let sender_config = load_config(config_path, Role::Sender, coding)?;
    let mut receiver_config = LinkConfig {
        role: Role::Receiver,
        ..sender_config.clone()
    };
    receiver_config.drop_sequences.extend_from_slice(&options.drop);
    options.tolerance.apply(&mut receiver_config);

    let params = sender_config.params;
    let block = match input {
        Some(path) => fit_block(read_input(path)?, &params)?,
        None => counting_block(&params),
    };

    info!(
        "Simulating {} fragments with {:.0}% loss (seed {})",
        params.total_fragments(),
        options.loss * 100.0,
        options.seed
    );

    let session =
        EncoderSession::encode(&block, params).with_context(|| "Failed to encode block")?;
    let mut sender = LinkMachine::sender(
        sender_config,
        LoopbackRadio::new(),
        TallyDelay::new(),
        session,
    )
    .with_context(|| "Failed to set up sender")?;

    let (decoder, _) = FragmentDecoder::init(
        receiver_config.decoder_config(),
        MemoryStore::new(params.fragment_bytes()),
    )
    .with_context(|| "Failed to initialize decoder")?;
    let mut receiver = LinkMachine::receiver(
        receiver_config,
        LoopbackRadio::new(),
        TallyDelay::new(),
        decoder,
    )
    .with_context(|| "Failed to set up receiver")?;

    sender.start()?;
    receiver.start()?;

    let mut rng = StdRng::seed_from_u64(options.seed);
    let mut frames_lost = 0;
    let mut error = None;
    let mut settled = 0;

    for _ in 0..options.max_polls {
        sender.poll().with_context(|| "Sender abandoned")?;

        for frame in sender.radio_mut().take_transmitted() {
            if rng.gen_bool(options.loss) {
                debug!("Lost frame {} over the air", frame[0]);
                frames_lost += 1;
            } else {
                receiver.radio_mut().deliver(frame);
            }
        }

        match receiver.poll() {
            Ok(status) if status.is_terminal() => break,
            Ok(_) => {}
            Err(err) => {
                warn!("Receiver abandoned: {}", err);
                error = Some(err.to_string());
                break;
            }
        }

        // one more round lets the receiver handle a frame its last listen took
        if sender.status().is_terminal() && receiver.radio().pending_deliveries() == 0 {
            settled += 1;
            if settled > 1 {
                break;
            }
        }
    }

    let recovered_crc32c = match receiver.status() {
        LinkStatus::Completed { .. } => {
            let mut out = vec![0u8; params.block_len()];
            match receiver.decoder_mut() {
                Some(decoder) => {
                    decoder
                        .read_block(&mut out)
                        .with_context(|| "Failed to read reconstructed block")?;
                    Some(digest(&out))
                }
                None => None,
            }
        }
        _ => None,
    };

    let report = SimulationReport {
        status: receiver.status(),
        error,
        frames_lost,
        sender: *sender.stats(),
        receiver: *receiver.stats(),
        sender_elapsed_ms: sender.delay().elapsed_ms(),
        block_crc32c: digest(&block),
        recovered_crc32c,
    };

    print_report(&report);

    if let Some(path) = &options.report {
        let json = serde_json::to_string_pretty(&report)
            .with_context(|| "Failed to serialize report")?;
        fs::write(path, json).with_context(|| format!("Failed to write report: {}", path))?;
        info!("Report written to: {}", path);
    }

    Ok(report)
}

fn print_report(report: &SimulationReport) {
    println!("\n=== Simulation Results ===");
    println!("Frames sent:       {}", report.sender.frames_sent);
    println!("Frames lost:       {}", report.frames_lost);
    println!("Frames received:   {}", report.receiver.frames_received);
    println!("Frames dropped:    {}", report.receiver.frames_dropped);
    println!("Sequence gaps:     {}", report.receiver.sequence_gaps);
    println!("Sender time:       {} ms", report.sender_elapsed_ms);

    match (&report.status, &report.error) {
        (LinkStatus::Completed { recovered }, _) if report.is_success() => println!(
            "{} Block rebuilt ({} sources recovered, crc32c {:08x})",
            "✓".green(),
            recovered,
            report.block_crc32c
        ),
        (_, Some(err)) => println!("{} {}", "✗".red(), err.red()),
        (status, None) => println!("{} Session ended as {:?}", "✗".red(), status),
    }
}
