use anyhow::{bail, Result};
use clap::{Parser, Subcommand};
use radiofrag_cli::commands::{self, simulate::SimulateOptions};
use radiofrag_cli::{CodingArgs, ToleranceArgs};
use std::io;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

#[derive(Parser)]
#[command(name = "radiofrag")]
#[command(about = "Radiofrag - Erasure-coded fragment transport for lossy radio links", long_about = None)]
#[command(version)]
struct Cli {
    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    /// JSON link configuration
    #[arg(short, long, global = true)]
    config: Option<String>,

    #[command(flatten)]
    coding: CodingArgs,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Encode a block into the frame stream a sender transmits
    Encode {
        /// Input file holding the block (`-` for stdin)
        #[arg(short, long)]
        input: String,

        /// Output file for the frame stream
        #[arg(short, long)]
        output: String,

        /// Print the coding matrix
        #[arg(long)]
        show_matrix: bool,
    },

    /// Rebuild a block from a captured frame stream
    Decode {
        /// Input file with frames (`-` for stdin)
        #[arg(short, long)]
        input: String,

        /// Output file for the reconstructed block
        #[arg(short, long)]
        output: String,

        /// Sequences to discard, emulating loss
        #[arg(long, value_delimiter = ',')]
        drop: Vec<u8>,

        #[command(flatten)]
        tolerance: ToleranceArgs,
    },

    /// Run a sender and a receiver against each other with random loss
    Simulate {
        /// Input file holding the block; the counting block when omitted
        #[arg(short, long)]
        input: Option<String>,

        /// Probability that a frame is lost over the air
        #[arg(long, default_value = "0.0")]
        loss: f64,

        /// Seed for the loss pattern
        #[arg(long, default_value = "0")]
        seed: u64,

        /// Sequences the receiver discards on arrival
        #[arg(long, value_delimiter = ',')]
        drop: Vec<u8>,

        #[command(flatten)]
        tolerance: ToleranceArgs,

        /// Poll budget for the session
        #[arg(long, default_value = "10000")]
        max_polls: usize,

        /// Output JSON file for the report
        #[arg(long)]
        report: Option<String>,

        /// Wait for a line starting with `1` on stdin before starting
        #[arg(long)]
        wait_for_start: bool,
    },
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    // Setup logging
    let filter = if cli.verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::new("info")
    };

    tracing_subscriber::registry()
        .with(fmt::layer())
        .with(filter)
        .init();

    let config = cli.config.as_deref();

    // Execute command
    match cli.command {
        Commands::Encode {
            input,
            output,
            show_matrix,
        } => commands::encode::execute(&input, &output, config, &cli.coding, show_matrix),

        Commands::Decode {
            input,
            output,
            drop,
            tolerance,
        } => commands::decode::execute(&input, &output, config, &cli.coding, &drop, &tolerance),

        Commands::Simulate {
            input,
            loss,
            seed,
            drop,
            tolerance,
            max_polls,
            report,
            wait_for_start,
        } => {
            if wait_for_start {
                commands::simulate::wait_for_start(io::stdin().lock())?;
            }
            let options = SimulateOptions {
                loss,
                seed,
                drop,
                tolerance,
                max_polls,
                report,
            };
            let outcome =
                commands::simulate::execute(input.as_deref(), config, &cli.coding, &options)?;
            if !outcome.is_success() {
                bail!("Receiver did not rebuild the block");
            }
            Ok(())
        }
    }
}
