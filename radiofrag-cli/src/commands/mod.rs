//! Command implementations and the helpers they share

use crate::CodingArgs;
use anyhow::{bail, Context, Result};
use radiofrag_core::fec::CodingMatrix;
use radiofrag_core::link::{LinkConfig, Role};
use radiofrag_core::types::CodingParams;
use std::fs;
use std::io::{self, Read};
use tracing::info;

pub mod decode;
pub mod encode;
pub mod simulate;

/// Build the link configuration for `role` from an optional JSON file and
/// the command-line overrides
pub fn load_config(path: Option<&str>, role: Role, coding: &CodingArgs) -> Result<LinkConfig> {
    let mut config = match path {
        Some(path) => {
            let content = fs::read_to_string(path)
                .with_context(|| format!("Failed to read config file: {}", path))?;
            serde_json::from_str::<LinkConfig>(&content)
                .with_context(|| format!("Failed to parse config file: {}", path))?
        }
        None => LinkConfig::default(),
    };

    config.role = role;
    coding.apply(&mut config);
    config
        .validate()
        .with_context(|| "Invalid link configuration")?;

    info!(
        "Coding {} source + {} redundant fragments of {} bytes in {} byte frames",
        config.params.source_count,
        config.params.redundant_count,
        config.params.fragment_size,
        config.frame_size
    );

    Ok(config)
}

/// Read a file, or stdin when `path` is `-`
pub fn read_input(path: &str) -> Result<Vec<u8>> {
    if path == "-" {
        let mut buf = Vec::new();
        io::stdin().read_to_end(&mut buf)?;
        Ok(buf)
    } else {
        fs::read(path).with_context(|| format!("Failed to read input file: {}", path))
    }
}

/// Zero-pad `data` to the block length of `params`
pub fn fit_block(mut data: Vec<u8>, params: &CodingParams) -> Result<Vec<u8>> {
    let block_len = params.block_len();
    if data.len() > block_len {
        bail!(
            "Input is {} bytes but {} fragments of {} bytes hold only {}",
            data.len(),
            params.source_count,
            params.fragment_size,
            block_len
        );
    }
    data.resize(block_len, 0);
    Ok(data)
}

/// The block the firmware bench setup sends: byte `i` holds `i mod 256`
pub fn counting_block(params: &CodingParams) -> Vec<u8> {
    (0..params.block_len()).map(|i| i as u8).collect()
}

/// CRC32C of `bytes`, as printed in summaries and reports
pub fn digest(bytes: &[u8]) -> u32 {
    crc32c::crc32c(bytes)
}

/// Hex dump with `width` bytes per line
pub fn hex_lines(bytes: &[u8], width: usize) -> Vec<String> {
    bytes.chunks(width.max(1)).map(hex::encode).collect()
}

/// Sources that no redundant row combines; their loss is never repairable
pub fn unprotected_sources(matrix: &CodingMatrix) -> Vec<usize> {
    (0..matrix.cols()).filter(|col| !matrix.covers(*col)).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fit_block_pads() {
        let params = CodingParams::new(2, 4, 1);
        assert_eq!(fit_block(vec![1, 2, 3], &params).unwrap(), vec![1, 2, 3, 0, 0, 0, 0, 0]);
        assert!(fit_block(vec![0; 9], &params).is_err());
    }

    #[test]
    fn test_hex_lines() {
        assert_eq!(hex_lines(&[0, 1, 0xff, 0x10, 2], 2), vec!["0001", "ff10", "02"]);
    }

    #[test]
    fn test_unprotected_sources() {
        assert!(unprotected_sources(&CodingMatrix::generate(5, 10)).is_empty());

        let sparse = CodingMatrix::from_bytes(2, 4, &[1, 0, 1, 0, 0, 0, 1, 0]).unwrap();
        assert_eq!(unprotected_sources(&sparse), vec![1, 3]);
    }

    #[test]
    fn test_overrides_beat_defaults() {
        let coding = CodingArgs {
            source_count: Some(4),
            fragment_size: Some(8),
            ..CodingArgs::default()
        };
        let config = load_config(None, Role::Receiver, &coding).unwrap();
        assert_eq!(config.role, Role::Receiver);
        assert_eq!(config.params, CodingParams::new(4, 8, 5));
        assert_eq!(config.frame_size, 32);
    }

    #[test]
    fn test_oversized_fragment_rejected() {
        let coding = CodingArgs {
            fragment_size: Some(40),
            ..CodingArgs::default()
        };
        assert!(load_config(None, Role::Sender, &coding).is_err());
    }
}
