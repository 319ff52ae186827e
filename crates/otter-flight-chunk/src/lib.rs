//! # Otter Flight Chunk
//!
//! Binary sink for the Otter flight recorder.
//!
//! ## Layout
//!
//! - **Header**: fixed 68-byte big-endian header, rewritten in place on flush
//! - **Events**: size-prefixed records appended after the header
//! - **Checkpoints**: events carrying typed constant blocks (`type id, count, records`)
//! - **Integers**: fixed-width big-endian, or compressed varints when the
//!   header advertises the capability

#![warn(clippy::all)]
#![warn(missing_docs)]
#![deny(unsafe_code)]

pub mod checkpoint;
pub mod chunk;
pub mod encoding;
pub mod error;
pub mod header;
pub mod reader;

pub use checkpoint::{CheckpointFlags, CheckpointWriter, TypeBlock};
pub use chunk::{ChunkOptions, ChunkWriter, TICKS_PER_SECOND, ticks};
pub use encoding::{IntEncoding, StringEncoding};
pub use error::{ChunkError, Result};
pub use header::ChunkHeader;
pub use reader::RecordReader;

/// Event type id of the metadata event
pub const EVENT_METADATA: u64 = 0;

/// Event type id of checkpoint events
pub const EVENT_CHECKPOINT: u64 = 1;

/// Constant type ids used in checkpoint type blocks
pub mod types {
    /// Class records
    pub const TYPE_CLASS: u64 = 20;
    /// Class loader records
    pub const TYPE_CLASSLOADER: u64 = 21;
    /// Method records
    pub const TYPE_METHOD: u64 = 22;
    /// Symbol records
    pub const TYPE_SYMBOL: u64 = 23;
    /// Package records
    pub const TYPE_PACKAGE: u64 = 24;
    /// Module records
    pub const TYPE_MODULE: u64 = 25;
    /// First id available to registered constant serializers
    pub const FIRST_USER_TYPE: u64 = 100;
}
