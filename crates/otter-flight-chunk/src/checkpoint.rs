//! Checkpoint payload writer
//!
//! A checkpoint payload is a sequence of type blocks:
//!
//! ```text
//! type id | record count | record*
//! ```
//!
//! The count is not known until a traversal finishes, so [`CheckpointWriter::begin_type`]
//! reserves a fixed-size slot and [`CheckpointWriter::end_type`] patches it. A block
//! that ends with zero records is rewound so empty categories never reach the chunk.

use crate::encoding::{IntEncoding, StringEncoding, padded_varint, put_varint};

/// Kind bits carried by a checkpoint event
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct CheckpointFlags(u8);

impl CheckpointFlags {
    /// Ordinary rotation or class-unload checkpoint
    pub const GENERIC: Self = Self(0);
    /// Written at a flushpoint
    pub const FLUSH: Self = Self(1);
    /// Constant types that never change during a recording
    pub const STATICS: Self = Self(2);

    /// Raw flag byte
    #[inline]
    pub fn bits(self) -> u8 {
        self.0
    }

    /// Rebuild flags from a raw byte
    #[inline]
    pub fn from_bits(bits: u8) -> Self {
        Self(bits)
    }

    /// Check whether all bits of `other` are set
    #[inline]
    pub fn contains(self, other: Self) -> bool {
        self.0 & other.0 == other.0
    }
}

/// Handle for an open type block
#[derive(Debug)]
#[must_use = "a type block must be closed with end_type"]
pub struct TypeBlock {
    type_id: u64,
    start: usize,
    count_offset: usize,
}

impl TypeBlock {
    /// Type id written at the start of the block
    pub fn type_id(&self) -> u64 {
        self.type_id
    }
}

/// Growable buffer for one checkpoint payload
#[derive(Debug, Clone)]
pub struct CheckpointWriter {
    buf: Vec<u8>,
    encoding: IntEncoding,
    type_count: u32,
}

impl CheckpointWriter {
    /// Create an empty writer
    pub fn new(encoding: IntEncoding) -> Self {
        Self::with_capacity(encoding, 0)
    }

    /// Create an empty writer with pre-allocated capacity
    pub fn with_capacity(encoding: IntEncoding, capacity: usize) -> Self {
        Self {
            buf: Vec::with_capacity(capacity),
            encoding,
            type_count: 0,
        }
    }

    /// Integer encoding of this payload
    #[inline]
    pub fn encoding(&self) -> IntEncoding {
        self.encoding
    }

    /// Number of non-empty type blocks written
    #[inline]
    pub fn type_count(&self) -> u32 {
        self.type_count
    }

    /// Current payload length in bytes
    #[inline]
    pub fn len(&self) -> usize {
        self.buf.len()
    }

    /// Check if nothing has been written
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.buf.is_empty()
    }

    /// Payload bytes
    #[inline]
    pub fn as_bytes(&self) -> &[u8] {
        &self.buf
    }

    /// Consume the writer, returning the payload
    pub fn into_bytes(self) -> Vec<u8> {
        self.buf
    }

    /// Drop all written data
    pub fn clear(&mut self) {
        self.buf.clear();
        self.type_count = 0;
    }

    /// Write a single byte
    #[inline]
    pub fn write_u8(&mut self, value: u8) {
        self.buf.push(value);
    }

    /// Write a boolean as one byte
    #[inline]
    pub fn write_bool(&mut self, value: bool) {
        self.buf.push(value as u8);
    }

    /// Write a 16-bit integer
    pub fn write_u16(&mut self, value: u16) {
        match self.encoding {
            IntEncoding::BigEndian => self.buf.extend_from_slice(&value.to_be_bytes()),
            IntEncoding::Compressed => put_varint(&mut self.buf, value as u64),
        }
    }

    /// Write a 32-bit integer
    pub fn write_u32(&mut self, value: u32) {
        match self.encoding {
            IntEncoding::BigEndian => self.buf.extend_from_slice(&value.to_be_bytes()),
            IntEncoding::Compressed => put_varint(&mut self.buf, value as u64),
        }
    }

    /// Write a 64-bit integer
    pub fn write_u64(&mut self, value: u64) {
        match self.encoding {
            IntEncoding::BigEndian => self.buf.extend_from_slice(&value.to_be_bytes()),
            IntEncoding::Compressed => put_varint(&mut self.buf, value),
        }
    }

    /// Write a signed 64-bit integer (two's complement, no zig-zag)
    #[inline]
    pub fn write_i64(&mut self, value: i64) {
        self.write_u64(value as u64);
    }

    /// Write an optional string as length-prefixed UTF-8
    pub fn write_utf8(&mut self, value: Option<&str>) {
        match value {
            None => self.write_u8(StringEncoding::Null as u8),
            Some("") => self.write_u8(StringEncoding::Empty as u8),
            Some(s) => {
                self.write_u8(StringEncoding::Utf8 as u8);
                self.write_u32(s.len() as u32);
                self.buf.extend_from_slice(s.as_bytes());
            }
        }
    }

    /// Write raw single-byte characters, length-prefixed
    pub fn write_latin1(&mut self, bytes: &[u8]) {
        if bytes.is_empty() {
            self.write_u8(StringEncoding::Empty as u8);
            return;
        }
        self.write_u8(StringEncoding::Latin1 as u8);
        self.write_u32(bytes.len() as u32);
        self.buf.extend_from_slice(bytes);
    }

    /// Append already-encoded bytes
    #[inline]
    pub fn write_raw(&mut self, bytes: &[u8]) {
        self.buf.extend_from_slice(bytes);
    }

    /// Reserve a 4-byte slot for a 32-bit value, returning its offset
    pub fn reserve_u32(&mut self) -> usize {
        let offset = self.buf.len();
        match self.encoding {
            IntEncoding::BigEndian => self.buf.extend_from_slice(&[0; 4]),
            IntEncoding::Compressed => self.buf.extend_from_slice(&padded_varint(0)),
        }
        offset
    }

    /// Overwrite a slot previously returned by [`Self::reserve_u32`]
    pub fn patch_u32(&mut self, offset: usize, value: u32) {
        let bytes = match self.encoding {
            IntEncoding::BigEndian => value.to_be_bytes(),
            IntEncoding::Compressed => padded_varint(value),
        };
        self.buf[offset..offset + 4].copy_from_slice(&bytes);
    }

    /// Open a type block
    pub fn begin_type(&mut self, type_id: u64) -> TypeBlock {
        let start = self.buf.len();
        self.write_u64(type_id);
        let count_offset = self.reserve_u32();
        TypeBlock {
            type_id,
            start,
            count_offset,
        }
    }

    /// Close a type block with the number of records written into it
    ///
    /// A block with no records is removed entirely.
    pub fn end_type(&mut self, block: TypeBlock, count: u32) {
        if count == 0 {
            self.buf.truncate(block.start);
            return;
        }
        self.patch_u32(block.count_offset, count);
        self.type_count += 1;
    }

    /// Append a complete type block whose records were encoded elsewhere
    pub fn append_type(&mut self, type_id: u64, count: u32, records: &[u8]) {
        if count == 0 {
            return;
        }
        let block = self.begin_type(type_id);
        self.write_raw(records);
        self.end_type(block, count);
    }
}
