use crate::commands::{
    digest, fit_block, hex_lines, load_config, read_input, unprotected_sources,
};
use crate::CodingArgs;
use anyhow::{Context, Result};
use colored::*;
use radiofrag_core::encoder::EncoderSession;
use radiofrag_core::frame::encode_frame;
use radiofrag_core::link::Role;
use std::fs;
use std::time::Instant;
use tracing::info;

/// Encode `input` into the frame stream a sender would transmit
///
/// The output holds `source_count + redundant_count` frames of
/// `frame_size` bytes each, in transmission order.
pub fn execute(
    input: &str,
    output: &str,
    config_path: Option<&str>,
    coding: &CodingArgs,
    show_matrix: bool,
) -> Result<()> {
    info!("Encoding {} into {}", input, output);

    let config = load_config(config_path, Role::Sender, coding)?;
    let params = config.params;
    let block = fit_block(read_input(input)?, &params)?;

    let start = Instant::now();
    let session = EncoderSession::encode(&block, params)
        .with_context(|| "Failed to encode block")?;
    let elapsed = start.elapsed();

    let mut stream = Vec::with_capacity(session.total_fragments() * config.frame_size);
    for fragment in session.fragments() {
        let frame = encode_frame(fragment.sequence, &fragment.payload, config.frame_size)
            .with_context(|| format!("Failed to frame fragment {}", fragment.sequence))?;
        stream.extend_from_slice(&frame);
    }

    fs::write(output, &stream)
        .with_context(|| format!("Failed to write output file: {}", output))?;

    println!("\n=== Encode Results ===");
    println!("Block:             {} bytes (crc32c {:08x})", block.len(), digest(&block));
    println!(
        "Fragments:         {} source + {} redundant",
        params.source_count, params.redundant_count
    );
    println!("Encoded buffer:    {} bytes", session.len());
    println!("Frame stream:      {} bytes", stream.len());
    println!("Duration:          {:.3} ms", elapsed.as_secs_f64() * 1000.0);

    if show_matrix {
        let matrix = session.matrix().with_context(|| "Failed to read coding matrix")?;
        println!("\n=== Coding Matrix ===");
        for (row, line) in hex_lines(matrix.as_bytes(), matrix.cols()).iter().enumerate() {
            println!(
                "row {:>3} -> frame {:>3}: {}  (weight {})",
                row,
                params.source_count + row,
                line,
                matrix.row_weight(row)
            );
        }

        let unprotected = unprotected_sources(&matrix);
        if unprotected.is_empty() {
            println!("Every source is covered by a redundant row");
        } else {
            println!(
                "{} Sources no redundant row covers: {:?}",
                "!".yellow(),
                unprotected
            );
        }
    }

    println!("{} Wrote {} frames to {}", "✓".green(), session.total_fragments(), output);

    Ok(())
}
