//! Inclusion predicates
//!
//! Each predicate captures the checkpoint mode it was built for and answers
//! one question about an artifact without side effects.

use crate::artifact::{Artifact, Klass, Method};
use crate::epoch::{EpochBits, TraceTag};
use crate::symbol_table::SymbolEntry;

/// Should the artifact be written to the main stream?
///
/// Class-unload passes re-emit everything they reach; other passes skip
/// artifacts already written to the chunk.
#[derive(Debug, Clone, Copy)]
pub struct SerializePredicate {
    class_unload: bool,
}

impl SerializePredicate {
    /// Create for the given mode
    pub fn new(class_unload: bool) -> Self {
        Self { class_unload }
    }

    /// Test a tag word
    #[inline]
    pub fn test_tag(&self, tag: &TraceTag) -> bool {
        self.class_unload || !tag.is_serialized()
    }

    /// Test an artifact
    #[inline]
    pub fn test<T: Artifact + ?Sized>(&self, artifact: &T) -> bool {
        self.test_tag(artifact.tag())
    }
}

/// Is the artifact part of the leak-profiler subset?
#[derive(Debug, Clone, Copy)]
pub struct LeakPredicate {
    bits: EpochBits,
}

impl LeakPredicate {
    /// Create for the epoch being written
    pub fn new(bits: EpochBits) -> Self {
        Self { bits }
    }

    /// Leak-profiler bit of the epoch being written
    #[inline]
    pub fn leakp_bit(&self) -> u16 {
        self.bits.leakp
    }

    /// Test an artifact
    #[inline]
    pub fn test<T: Artifact + ?Sized>(&self, artifact: &T) -> bool {
        artifact.tag().is_set(self.bits.leakp)
    }
}

/// Does the class have methods used in the epoch being written?
#[derive(Debug, Clone, Copy)]
pub struct MethodUsedPredicate {
    bits: EpochBits,
}

impl MethodUsedPredicate {
    /// Create for the epoch being written
    pub fn new(bits: EpochBits) -> Self {
        Self { bits }
    }

    /// Test a class
    #[inline]
    pub fn test(&self, klass: &Klass) -> bool {
        klass.tag().is_set(self.bits.method_used)
    }
}

/// Was this method used (or leak-referenced) in the epoch being written?
#[derive(Debug, Clone, Copy)]
pub struct MethodFlagPredicate {
    mask: u16,
}

impl MethodFlagPredicate {
    /// Match methods used in the epoch
    pub fn used(bits: EpochBits) -> Self {
        Self { mask: bits.used }
    }

    /// Match methods referenced by the leak profiler in the epoch
    pub fn leakp(bits: EpochBits) -> Self {
        Self { mask: bits.leakp }
    }

    /// Test a method
    #[inline]
    pub fn test(&self, method: &Method) -> bool {
        method.tag().is_set(self.mask)
    }
}

/// Should a symbol entry be written to the main stream?
#[derive(Debug, Clone, Copy)]
pub struct SymbolPredicate {
    class_unload: bool,
}

impl SymbolPredicate {
    /// Create for the given mode
    pub fn new(class_unload: bool) -> Self {
        Self { class_unload }
    }

    /// Test an entry
    #[inline]
    pub fn test(&self, entry: &SymbolEntry) -> bool {
        self.class_unload || !entry.is_serialized()
    }
}

/// Classes written whether or not they were tagged
///
/// Loader records reference their loader class and every class record
/// ultimately resolves through `java/lang/Object`, so both are always included.
pub fn is_implied(klass: &Klass) -> bool {
    klass.is_class_loader_subclass() || klass.is_java_lang_object()
}
