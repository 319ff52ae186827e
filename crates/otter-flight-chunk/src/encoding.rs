//! Integer and string encodings shared by writers and readers

/// How multi-byte integers are laid out in event payloads
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum IntEncoding {
    /// Fixed-width big-endian
    #[default]
    BigEndian,
    /// LEB128-style varints, low group first; the ninth byte carries 8 bits
    Compressed,
}

impl IntEncoding {
    /// Encoding matching a "compressed integers" capability flag
    pub fn from_compressed(compressed: bool) -> Self {
        if compressed {
            Self::Compressed
        } else {
            Self::BigEndian
        }
    }

    /// Check if this is the compressed encoding
    #[inline]
    pub fn is_compressed(self) -> bool {
        matches!(self, Self::Compressed)
    }

    /// Largest value a reserved 4-byte slot can hold
    pub fn slot_max(self) -> u32 {
        match self {
            Self::BigEndian => u32::MAX,
            Self::Compressed => PADDED_U32_MAX,
        }
    }
}

/// Leading tag byte of an encoded string
#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StringEncoding {
    /// Absent string
    Null = 0,
    /// Zero-length string
    Empty = 1,
    /// Length-prefixed UTF-8
    Utf8 = 3,
    /// Length-prefixed raw single-byte characters
    Latin1 = 5,
}

impl StringEncoding {
    /// Decode a tag byte
    pub fn from_tag(tag: u8) -> Option<Self> {
        match tag {
            0 => Some(Self::Null),
            1 => Some(Self::Empty),
            3 => Some(Self::Utf8),
            5 => Some(Self::Latin1),
            _ => None,
        }
    }
}

/// Append `value` as a varint
pub(crate) fn put_varint(buf: &mut Vec<u8>, mut value: u64) {
    for _ in 0..8 {
        if value < 0x80 {
            buf.push(value as u8);
            return;
        }
        buf.push((value as u8 & 0x7f) | 0x80);
        value >>= 7;
    }
    buf.push(value as u8);
}

/// Largest value a padded 4-byte varint can carry
pub(crate) const PADDED_U32_MAX: u32 = (1 << 28) - 1;

/// Encode `value` as a varint that always occupies 4 bytes
pub(crate) fn padded_varint(value: u32) -> [u8; 4] {
    debug_assert!(value <= PADDED_U32_MAX, "padded varint overflow: {value}");
    [
        (value as u8 & 0x7f) | 0x80,
        ((value >> 7) as u8 & 0x7f) | 0x80,
        ((value >> 14) as u8 & 0x7f) | 0x80,
        (value >> 21) as u8 & 0x7f,
    ]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_small_varint_is_one_byte() {
        let mut buf = Vec::new();
        put_varint(&mut buf, 0x7f);
        assert_eq!(buf, vec![0x7f]);
    }

    #[test]
    fn test_max_varint_is_nine_bytes() {
        let mut buf = Vec::new();
        put_varint(&mut buf, u64::MAX);
        assert_eq!(buf.len(), 9);
        assert_eq!(buf[8], 0xff);
    }

    #[test]
    fn test_padded_varint_layout() {
        assert_eq!(padded_varint(0), [0x80, 0x80, 0x80, 0x00]);
        assert_eq!(padded_varint(1), [0x81, 0x80, 0x80, 0x00]);
        assert_eq!(padded_varint(128), [0x80, 0x81, 0x80, 0x00]);
    }

    #[test]
    fn test_string_encoding_tags() {
        assert_eq!(StringEncoding::from_tag(3), Some(StringEncoding::Utf8));
        assert_eq!(StringEncoding::from_tag(2), None);
    }
}
