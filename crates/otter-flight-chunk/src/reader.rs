//! Decoder for checkpoint payloads and event bodies

use crate::encoding::{IntEncoding, StringEncoding};
use crate::error::{ChunkError, Result};

/// Cursor over encoded record data
#[derive(Debug, Clone)]
pub struct RecordReader<'a> {
    bytes: &'a [u8],
    pos: usize,
    encoding: IntEncoding,
}

impl<'a> RecordReader<'a> {
    /// Create a reader positioned at the start of `bytes`
    pub fn new(bytes: &'a [u8], encoding: IntEncoding) -> Self {
        Self {
            bytes,
            pos: 0,
            encoding,
        }
    }

    /// Current offset
    #[inline]
    pub fn position(&self) -> usize {
        self.pos
    }

    /// Bytes left to read
    #[inline]
    pub fn remaining(&self) -> usize {
        self.bytes.len() - self.pos
    }

    /// Check if all bytes were consumed
    #[inline]
    pub fn is_at_end(&self) -> bool {
        self.pos >= self.bytes.len()
    }

    fn take(&mut self, n: usize) -> Result<&'a [u8]> {
        if self.remaining() < n {
            return Err(ChunkError::UnexpectedEnd(self.pos));
        }
        let slice = &self.bytes[self.pos..self.pos + n];
        self.pos += n;
        Ok(slice)
    }

    fn take_array<const N: usize>(&mut self) -> Result<[u8; N]> {
        let mut out = [0u8; N];
        out.copy_from_slice(self.take(N)?);
        Ok(out)
    }

    fn read_varint(&mut self) -> Result<u64> {
        let mut result = 0u64;
        for i in 0..8 {
            let byte = self.read_u8()?;
            result |= ((byte & 0x7f) as u64) << (7 * i);
            if byte & 0x80 == 0 {
                return Ok(result);
            }
        }
        let last = self.read_u8()?;
        Ok(result | ((last as u64) << 56))
    }

    /// Read a single byte
    pub fn read_u8(&mut self) -> Result<u8> {
        Ok(self.take(1)?[0])
    }

    /// Read a boolean byte
    pub fn read_bool(&mut self) -> Result<bool> {
        Ok(self.read_u8()? != 0)
    }

    /// Read a 16-bit integer
    pub fn read_u16(&mut self) -> Result<u16> {
        match self.encoding {
            IntEncoding::BigEndian => Ok(u16::from_be_bytes(self.take_array()?)),
            IntEncoding::Compressed => Ok(self.read_varint()? as u16),
        }
    }

    /// Read a 32-bit integer
    pub fn read_u32(&mut self) -> Result<u32> {
        match self.encoding {
            IntEncoding::BigEndian => Ok(u32::from_be_bytes(self.take_array()?)),
            IntEncoding::Compressed => Ok(self.read_varint()? as u32),
        }
    }

    /// Read a 64-bit integer
    pub fn read_u64(&mut self) -> Result<u64> {
        match self.encoding {
            IntEncoding::BigEndian => Ok(u64::from_be_bytes(self.take_array()?)),
            IntEncoding::Compressed => self.read_varint(),
        }
    }

    /// Read a signed 64-bit integer
    pub fn read_i64(&mut self) -> Result<i64> {
        Ok(self.read_u64()? as i64)
    }

    /// Read an encoded string; `None` for the null encoding
    pub fn read_string(&mut self) -> Result<Option<String>> {
        let at = self.pos;
        let tag = self.read_u8()?;
        match StringEncoding::from_tag(tag) {
            Some(StringEncoding::Null) => Ok(None),
            Some(StringEncoding::Empty) => Ok(Some(String::new())),
            Some(StringEncoding::Utf8) => {
                let len = self.read_u32()? as usize;
                let bytes = self.take(len)?;
                std::str::from_utf8(bytes)
                    .map(|s| Some(s.to_owned()))
                    .map_err(|_| ChunkError::InvalidUtf8)
            }
            Some(StringEncoding::Latin1) => {
                let len = self.read_u32()? as usize;
                let bytes = self.take(len)?;
                Ok(Some(bytes.iter().map(|&b| b as char).collect()))
            }
            None => {
                tracing::debug!(target: "otter::flight", offset = at, tag, "unknown string tag");
                Err(ChunkError::InvalidStringEncoding(tag))
            }
        }
    }

    /// Read a type block header, returning `(type id, record count)`
    pub fn read_type_header(&mut self) -> Result<(u64, u32)> {
        let type_id = self.read_u64()?;
        let count = self.read_u32()?;
        Ok((type_id, count))
    }
}
