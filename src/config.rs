//! Configuration for mountstream
//!
//! Streaming thresholds are tunable rather than hardcoded: they can be set
//! programmatically or loaded from a TOML file by the embedding application.
//! Defaults are built-in code constants; a missing file section falls back
//! to them.

use crate::error::{Error, Result};
use serde::Deserialize;
use std::path::Path;

/// Top-level configuration
#[derive(Debug, Clone, Deserialize, Default)]
pub struct Config {
    /// Streaming bridge thresholds
    #[serde(default)]
    pub stream: StreamTuning,
}

impl Config {
    /// Load configuration from a TOML file
    pub fn load(path: &Path) -> Result<Config> {
        let text = std::fs::read_to_string(path)
            .map_err(|e| Error::Config(format!("cannot read {}: {}", path.display(), e)))?;
        toml::from_str(&text)
            .map_err(|e| Error::Config(format!("cannot parse {}: {}", path.display(), e)))
    }
}

/// Streaming bridge thresholds
///
/// All three values are bytes. The high-water mark bounds memory held ahead
/// of the consumer; the minimum-read threshold controls how early a blocked
/// read is satisfied; the maximum read size caps a single returned buffer.
#[derive(Debug, Clone, Deserialize)]
pub struct StreamTuning {
    /// Preread high-water mark: suspend the transfer once more than this
    /// many unconsumed bytes are buffered
    #[serde(default = "default_preread_high_water")]
    pub preread_high_water: usize,

    /// Minimum number of buffered bytes before a blocked read is satisfied
    #[serde(default = "default_min_read")]
    pub min_read: usize,

    /// Maximum number of bytes returned by a single read
    #[serde(default = "default_max_read")]
    pub max_read: usize,
}

fn default_preread_high_water() -> usize {
    1024 * 1024 // 1 MiB
}

fn default_min_read() -> usize {
    512
}

fn default_max_read() -> usize {
    16 * 1024
}

impl Default for StreamTuning {
    fn default() -> Self {
        Self {
            preread_high_water: default_preread_high_water(),
            min_read: default_min_read(),
            max_read: default_max_read(),
        }
    }
}
