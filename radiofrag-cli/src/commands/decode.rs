use crate::commands::{digest, load_config, read_input};
use crate::{CodingArgs, ToleranceArgs};
use anyhow::{bail, Context, Result};
use bytes::Bytes;
use colored::*;
use radiofrag_core::decoder::FragmentDecoder;
use radiofrag_core::link::{LinkMachine, LinkStatus, Role};
use radiofrag_core::loopback::{LoopbackRadio, TallyDelay};
use radiofrag_core::store::MemoryStore;
use std::fs;
use tracing::{info, warn};

/// Replay a captured frame stream through a receiver session and write the
/// reconstructed block to `output`
///
/// Frames are delivered in file order. `drop` lists sequences to discard on
/// arrival, on top of any in the configuration.
pub fn execute(
    input: &str,
    output: &str,
    config_path: Option<&str>,
    coding: &CodingArgs,
    drop: &[u8],
    tolerance: &ToleranceArgs,
) -> Result<()> {
    info!("Decoding frames from {} into {}", input, output);

    let mut config = load_config(config_path, Role::Receiver, coding)?;
    config.drop_sequences.extend_from_slice(drop);
    tolerance.apply(&mut config);
    let params = config.params;

    let data = read_input(input)?;
    if data.len() % config.frame_size != 0 {
        warn!(
            "Input is {} bytes, not a multiple of the {} byte frame size; trailing bytes ignored",
            data.len(),
            config.frame_size
        );
    }

    let mut radio = LoopbackRadio::new();
    let mut frames = 0;
    for chunk in data.chunks_exact(config.frame_size) {
        radio.deliver(Bytes::copy_from_slice(chunk));
        frames += 1;
    }
    info!("Replaying {} frames", frames);

    let (decoder, cost) = FragmentDecoder::init(
        config.decoder_config(),
        MemoryStore::new(params.fragment_bytes()),
    )
    .with_context(|| "Failed to initialize decoder")?;
    info!("Decoder memory cost: {} bytes", cost);

    let mut link = LinkMachine::receiver(config, radio, TallyDelay::new(), decoder)
        .with_context(|| "Failed to set up receiver")?;
    let status = link
        .run(frames + 1)
        .with_context(|| "Decode session abandoned")?;

    let stats = *link.stats();
    println!("\n=== Decode Results ===");
    println!("Frames replayed:   {}", frames);
    println!("Frames dropped:    {}", stats.frames_dropped);
    println!("Malformed frames:  {}", stats.malformed);
    println!("Sequence gaps:     {}", stats.sequence_gaps);

    let LinkStatus::Completed { recovered } = status else {
        let missing = link
            .decoder()
            .map(|decoder| decoder.missing_sources())
            .unwrap_or(params.source_count);
        println!("{} Block incomplete", "✗".red());
        bail!("Frame stream ended with {} sources missing", missing);
    };

    let mut block = vec![0u8; params.block_len()];
    if let Some(decoder) = link.decoder_mut() {
        decoder
            .read_block(&mut block)
            .with_context(|| "Failed to read reconstructed block")?;
    }

    fs::write(output, &block)
        .with_context(|| format!("Failed to write output file: {}", output))?;

    println!("Sources rebuilt:   {}", recovered.to_string().green());
    println!(
        "{} Block complete: {} bytes (crc32c {:08x})",
        "✓".green(),
        block.len(),
        digest(&block)
    );

    Ok(())
}
