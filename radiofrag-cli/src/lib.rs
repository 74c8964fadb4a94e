//! Library entry for radiofrag-cli used by integration tests and embedding.

use radiofrag_core::link::LinkConfig;

pub mod commands;

// Re-export commands for convenience
pub use commands::*;

/// Coding overrides shared by every command
///
/// Flags win over the JSON configuration, which wins over the built-in
/// defaults.
#[derive(Clone, Copy, Debug, Default, clap::Args)]
pub struct CodingArgs {
    /// Number of source fragments
    #[arg(long)]
    pub source_count: Option<usize>,

    /// Payload bytes per fragment
    #[arg(long)]
    pub fragment_size: Option<usize>,

    /// Number of redundant fragments
    #[arg(long)]
    pub redundant_count: Option<usize>,

    /// Radio frame size in bytes
    #[arg(long)]
    pub frame_size: Option<usize>,
}

impl CodingArgs {
    /// Apply the overrides to `config`
    pub fn apply(&self, config: &mut LinkConfig) {
        if let Some(n) = self.source_count {
            config.params.source_count = n;
        }
        if let Some(size) = self.fragment_size {
            config.params.fragment_size = size;
        }
        if let Some(r) = self.redundant_count {
            config.params.redundant_count = r;
        }
        if let Some(frame_size) = self.frame_size {
            config.frame_size = frame_size;
        }
    }
}

/// When a receiver gives up on a block
#[derive(Clone, Copy, Debug, Default, clap::Args)]
pub struct ToleranceArgs {
    /// Received fragments allowed before giving up; without it or
    /// --expected-loss the receiver never gives up
    #[arg(long)]
    pub tolerance: Option<usize>,

    /// Size the tolerance for this loss rate like the bench firmware
    /// (0.3 when given without a value); --tolerance wins
    #[arg(long, num_args = 0..=1, default_missing_value = "0.3")]
    pub expected_loss: Option<f32>,
}

impl ToleranceArgs {
    /// Apply the tolerance to `config`
    pub fn apply(&self, config: &mut LinkConfig) {
        if let Some(tolerance) = self.tolerance {
            config.tolerance = Some(tolerance);
        } else if let Some(loss) = self.expected_loss {
            config.expect_loss(loss);
        }
    }
}
