//! Fixed-offset chunk header
//!
//! Layout (68 bytes, big-endian):
//!
//! | offset | field                         | width |
//! |--------|-------------------------------|-------|
//! | 0      | magic `FLR\0`                 | 4     |
//! | 4      | version major, minor          | 2 + 2 |
//! | 8      | chunk size                    | 8     |
//! | 16     | last checkpoint offset        | 8     |
//! | 24     | metadata offset               | 8     |
//! | 32     | start time (ns since epoch)   | 8     |
//! | 40     | duration (ns)                 | 8     |
//! | 48     | start ticks                   | 8     |
//! | 56     | tick frequency                | 8     |
//! | 64     | generation                    | 1     |
//! | 65     | pad                           | 1     |
//! | 66     | capability flags              | 2     |

use crate::encoding::IntEncoding;
use crate::error::{ChunkError, Result};

/// Magic bytes at the start of every chunk
pub const CHUNK_MAGIC: [u8; 4] = *b"FLR\0";
/// Major format version
pub const VERSION_MAJOR: u16 = 2;
/// Minor format version
pub const VERSION_MINOR: u16 = 1;
/// Header size in bytes
pub const HEADER_SIZE: usize = 68;

/// Offset of the chunk size field, the first field rewritten on flush
pub const SIZE_OFFSET: u64 = 8;
/// Offset of the generation byte
pub const GENERATION_OFFSET: u64 = 64;

/// Generation byte while a header update is in flight
pub const GUARD: u8 = 0xff;
/// Generation byte of a finalized chunk
pub const COMPLETE: u8 = 0;

/// Capability flag: integers in events are compressed
pub const FLAG_COMPRESSED_INTS: u16 = 1;

/// Decoded or in-memory header state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChunkHeader {
    /// Total bytes written, header included
    pub size: u64,
    /// Offset of the most recent checkpoint event (0 if none)
    pub last_checkpoint: u64,
    /// Offset of the metadata event (0 if none)
    pub metadata: u64,
    /// Wall-clock start in nanoseconds since the Unix epoch
    pub start_nanos: u64,
    /// Nanoseconds covered by the chunk so far
    pub duration_nanos: u64,
    /// Tick counter at chunk start
    pub start_ticks: u64,
    /// Ticks per second
    pub frequency: u64,
    /// Generation byte ([`GUARD`] while updating, [`COMPLETE`] once finalized)
    pub generation: u8,
    /// Capability flags
    pub flags: u16,
}

impl ChunkHeader {
    /// Integer encoding advertised by the capability flags
    pub fn encoding(&self) -> IntEncoding {
        IntEncoding::from_compressed(self.flags & FLAG_COMPRESSED_INTS != 0)
    }

    /// A lingering guard byte means an in-place update never completed
    pub fn is_torn(&self) -> bool {
        self.generation == GUARD
    }

    /// Check whether the chunk was closed cleanly
    pub fn is_finalized(&self) -> bool {
        self.generation == COMPLETE
    }

    /// Encode to the exact on-disk representation
    pub fn encode(&self) -> [u8; HEADER_SIZE] {
        let mut out = [0u8; HEADER_SIZE];
        out[0..4].copy_from_slice(&CHUNK_MAGIC);
        out[4..6].copy_from_slice(&VERSION_MAJOR.to_be_bytes());
        out[6..8].copy_from_slice(&VERSION_MINOR.to_be_bytes());
        out[8..64].copy_from_slice(&self.encode_fields());
        out[64] = self.generation;
        out[65] = 0;
        out[66..68].copy_from_slice(&self.flags.to_be_bytes());
        out
    }

    /// Encode the mutable fields between [`SIZE_OFFSET`] and [`GENERATION_OFFSET`]
    pub fn encode_fields(&self) -> [u8; 56] {
        let mut out = [0u8; 56];
        let fields = [
            self.size,
            self.last_checkpoint,
            self.metadata,
            self.start_nanos,
            self.duration_nanos,
            self.start_ticks,
            self.frequency,
        ];
        for (i, value) in fields.iter().enumerate() {
            out[i * 8..i * 8 + 8].copy_from_slice(&value.to_be_bytes());
        }
        out
    }

    /// Decode and validate a header
    pub fn decode(bytes: &[u8]) -> Result<Self> {
        if bytes.len() < HEADER_SIZE {
            return Err(ChunkError::UnexpectedEnd(bytes.len()));
        }
        if bytes[0..4] != CHUNK_MAGIC {
            return Err(ChunkError::InvalidMagic);
        }

        let major = u16::from_be_bytes([bytes[4], bytes[5]]);
        let minor = u16::from_be_bytes([bytes[6], bytes[7]]);
        if major != VERSION_MAJOR {
            return Err(ChunkError::UnsupportedVersion(major, minor));
        }

        let field = |index: usize| {
            let at = 8 + index * 8;
            let mut raw = [0u8; 8];
            raw.copy_from_slice(&bytes[at..at + 8]);
            u64::from_be_bytes(raw)
        };

        Ok(Self {
            size: field(0),
            last_checkpoint: field(1),
            metadata: field(2),
            start_nanos: field(3),
            duration_nanos: field(4),
            start_ticks: field(5),
            frequency: field(6),
            generation: bytes[64],
            flags: u16::from_be_bytes([bytes[66], bytes[67]]),
        })
    }
}
