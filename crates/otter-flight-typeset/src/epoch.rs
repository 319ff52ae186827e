//! Trace epochs and per-artifact tag words
//!
//! Every artifact carries a small atomic tag word. Application threads set
//! "used" bits for the *current* epoch while recording events; the checkpoint
//! thread reads and clears bits of the *previous* epoch after a rotation has
//! shifted the epoch. The two epochs alternate between two bit positions, so
//! readers and writers never touch the same bit concurrently.

use std::sync::atomic::{AtomicBool, AtomicU16, Ordering};

/// Tag bit layout
pub mod bits {
    /// Used during epoch 0
    pub const USED_EPOCH_0: u16 = 1 << 0;
    /// Used during epoch 1
    pub const USED_EPOCH_1: u16 = 1 << 1;
    /// A method of this class was used during epoch 0
    pub const METHOD_USED_EPOCH_0: u16 = 1 << 2;
    /// A method of this class was used during epoch 1
    pub const METHOD_USED_EPOCH_1: u16 = 1 << 3;
    /// Referenced by the leak profiler during epoch 0
    pub const LEAKP_EPOCH_0: u16 = 1 << 4;
    /// Referenced by the leak profiler during epoch 1
    pub const LEAKP_EPOCH_1: u16 = 1 << 5;
    /// Already written to the current chunk
    pub const SERIALIZED: u16 = 1 << 6;
}

/// Tag bits belonging to one epoch
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EpochBits {
    /// Artifact was used
    pub used: u16,
    /// Class has used methods
    pub method_used: u16,
    /// Artifact is referenced by the leak profiler
    pub leakp: u16,
}

impl EpochBits {
    /// Bits of epoch 0
    pub const EPOCH_0: Self = Self {
        used: bits::USED_EPOCH_0,
        method_used: bits::METHOD_USED_EPOCH_0,
        leakp: bits::LEAKP_EPOCH_0,
    };

    /// Bits of epoch 1
    pub const EPOCH_1: Self = Self {
        used: bits::USED_EPOCH_1,
        method_used: bits::METHOD_USED_EPOCH_1,
        leakp: bits::LEAKP_EPOCH_1,
    };

    /// All bits of this epoch
    #[inline]
    pub fn all(self) -> u16 {
        self.used | self.method_used | self.leakp
    }
}

/// Atomic tag word embedded in every artifact
#[derive(Debug, Default)]
pub struct TraceTag {
    bits: AtomicU16,
}

impl TraceTag {
    /// Create an untagged word
    pub const fn new() -> Self {
        Self {
            bits: AtomicU16::new(0),
        }
    }

    /// Raw bits
    #[inline]
    pub fn bits(&self) -> u16 {
        self.bits.load(Ordering::Acquire)
    }

    /// Check whether any bit of `mask` is set
    #[inline]
    pub fn is_set(&self, mask: u16) -> bool {
        self.bits() & mask != 0
    }

    /// Set the bits of `mask`
    #[inline]
    pub fn set(&self, mask: u16) {
        self.bits.fetch_or(mask, Ordering::AcqRel);
    }

    /// Clear the bits of `mask`
    #[inline]
    pub fn clear(&self, mask: u16) {
        self.bits.fetch_and(!mask, Ordering::AcqRel);
    }

    /// Check whether the artifact was already written
    #[inline]
    pub fn is_serialized(&self) -> bool {
        self.is_set(bits::SERIALIZED)
    }

    /// Mark the artifact as written
    #[inline]
    pub fn set_serialized(&self) {
        self.set(bits::SERIALIZED);
    }
}

/// Process-wide epoch counter
///
/// `shift` is called by the recorder when it rotates; after the shift, bits
/// recorded before it are the previous epoch's.
#[derive(Debug, Default)]
pub struct TraceEpoch {
    epoch: AtomicBool,
}

impl TraceEpoch {
    /// Start at epoch 0
    pub fn new() -> Self {
        Self::default()
    }

    /// Current epoch as 0 or 1
    #[inline]
    pub fn current(&self) -> u8 {
        self.epoch.load(Ordering::Acquire) as u8
    }

    /// Flip current and previous epochs
    pub fn shift(&self) {
        self.epoch.fetch_xor(true, Ordering::AcqRel);
    }

    /// Bits of the epoch application threads are tagging now
    #[inline]
    pub fn this_epoch(&self) -> EpochBits {
        self.bits_for(true)
    }

    /// Bits of the epoch before the last shift
    #[inline]
    pub fn previous_epoch(&self) -> EpochBits {
        self.bits_for(false)
    }

    /// Bits of the current (`true`) or previous (`false`) epoch
    pub fn bits_for(&self, current: bool) -> EpochBits {
        let epoch_one = self.epoch.load(Ordering::Acquire);
        if epoch_one == current {
            EpochBits::EPOCH_1
        } else {
            EpochBits::EPOCH_0
        }
    }

    /// Tag `tag` as used in the current epoch
    #[inline]
    pub fn mark_used(&self, tag: &TraceTag) {
        tag.set(self.this_epoch().used);
    }

    /// Tag `tag` as referenced by the leak profiler in the current epoch
    #[inline]
    pub fn mark_leakp(&self, tag: &TraceTag) {
        tag.set(self.this_epoch().leakp);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_shift_swaps_epoch_bits() {
        let epoch = TraceEpoch::new();
        assert_eq!(epoch.this_epoch(), EpochBits::EPOCH_0);
        assert_eq!(epoch.previous_epoch(), EpochBits::EPOCH_1);

        epoch.shift();
        assert_eq!(epoch.current(), 1);
        assert_eq!(epoch.this_epoch(), EpochBits::EPOCH_1);
        assert_eq!(epoch.previous_epoch(), EpochBits::EPOCH_0);
    }

    #[test]
    fn test_tag_set_and_clear() {
        let tag = TraceTag::new();
        tag.set(bits::USED_EPOCH_1 | bits::SERIALIZED);
        assert!(tag.is_set(bits::USED_EPOCH_1));
        assert!(tag.is_serialized());

        tag.clear(bits::SERIALIZED);
        assert!(!tag.is_serialized());
        assert_eq!(tag.bits(), bits::USED_EPOCH_1);
    }

    #[test]
    fn test_mark_used_follows_epoch() {
        let epoch = TraceEpoch::new();
        let tag = TraceTag::new();
        epoch.mark_used(&tag);
        epoch.shift();
        assert!(tag.is_set(epoch.previous_epoch().used));
        assert!(!tag.is_set(epoch.this_epoch().used));
    }
}
