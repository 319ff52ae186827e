//! Configuration for checkpoint production.

use std::path::Path;

use otter_flight_chunk::{ChunkOptions, IntEncoding};
use serde::{Deserialize, Serialize};

use crate::error::FlightResult;

/// Flight recorder checkpoint configuration.
///
/// Loadable from JSON (`{"compressedIntegers": false, "leakProfiler": true}`);
/// missing fields take their defaults.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct FlightConfig {
    /// Write integers as compressed varints.
    /// Default: true
    pub compressed_integers: bool,

    /// Produce a second checkpoint with the leak-profiler subset.
    /// Default: false
    pub leak_profiler: bool,

    /// Initial capacity of checkpoint buffers in bytes.
    /// Default: 64 KiB
    pub checkpoint_capacity: usize,
}

impl Default for FlightConfig {
    fn default() -> Self {
        Self {
            compressed_integers: true,
            leak_profiler: false,
            checkpoint_capacity: 64 * 1024,
        }
    }
}

impl FlightConfig {
    /// Create a new config with defaults.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create config writing fixed-width big-endian integers.
    ///
    /// Larger output, but readable with a hex dump.
    pub fn uncompressed() -> Self {
        Self {
            compressed_integers: false,
            ..Default::default()
        }
    }

    /// Create config with leak-profiler output enabled.
    pub fn with_leak_profiler() -> Self {
        Self {
            leak_profiler: true,
            ..Default::default()
        }
    }

    /// Enable or disable compressed integers.
    pub fn compressed_integers(mut self, enabled: bool) -> Self {
        self.compressed_integers = enabled;
        self
    }

    /// Enable or disable leak-profiler output.
    pub fn leak_profiler(mut self, enabled: bool) -> Self {
        self.leak_profiler = enabled;
        self
    }

    /// Set the initial checkpoint buffer capacity.
    pub fn checkpoint_capacity(mut self, bytes: usize) -> Self {
        self.checkpoint_capacity = bytes;
        self
    }

    /// Integer encoding of chunks and checkpoints.
    pub fn encoding(&self) -> IntEncoding {
        IntEncoding::from_compressed(self.compressed_integers)
    }

    /// Options for opening chunks.
    pub fn chunk_options(&self) -> ChunkOptions {
        ChunkOptions {
            compressed_integers: self.compressed_integers,
        }
    }

    /// Parse configuration from a JSON string.
    pub fn from_json(json: &str) -> FlightResult<Self> {
        Ok(serde_json::from_str(json)?)
    }

    /// Load configuration from a JSON file.
    pub fn from_file(path: impl AsRef<Path>) -> FlightResult<Self> {
        let text = std::fs::read_to_string(path.as_ref())?;
        Self::from_json(&text)
    }
}
