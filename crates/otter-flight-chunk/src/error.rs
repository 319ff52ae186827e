//! Chunk and checkpoint errors

use thiserror::Error;

/// Errors that can occur while writing or decoding chunk data
#[derive(Debug, Error)]
pub enum ChunkError {
    /// Invalid magic bytes in chunk header
    #[error("Invalid magic bytes")]
    InvalidMagic,

    /// Unsupported chunk format version
    #[error("Unsupported version: {0}.{1}")]
    UnsupportedVersion(u16, u16),

    /// Unexpected end of data
    #[error("Unexpected end of data at offset {0}")]
    UnexpectedEnd(usize),

    /// Checkpoint was encoded differently from the chunk it is written into
    #[error("Integer encoding mismatch: chunk uses {chunk:?}, checkpoint uses {checkpoint:?}")]
    EncodingMismatch {
        /// Encoding declared by the chunk header
        chunk: crate::IntEncoding,
        /// Encoding used by the checkpoint payload
        checkpoint: crate::IntEncoding,
    },

    /// Unknown string encoding tag
    #[error("Invalid string encoding tag: {0}")]
    InvalidStringEncoding(u8),

    /// String payload is not valid UTF-8
    #[error("Invalid UTF-8 in string payload")]
    InvalidUtf8,

    /// Framed event does not fit its size slot
    #[error("Event of {size} bytes exceeds the {max} byte limit")]
    EventTooLarge {
        /// Framed event size
        size: usize,
        /// Largest size the chunk encoding can record
        max: u32,
    },

    /// IO error on the underlying chunk file
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type for chunk operations
pub type Result<T> = std::result::Result<T, ChunkError>;
