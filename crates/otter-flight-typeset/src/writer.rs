//! Checkpoint sinks and the artifact-writing stages
//!
//! [`Sinks`] bundles everything a pass writes into: the main checkpoint
//! writer, the optional leak-profiler writer, the symbol table and the
//! per-pass visited set. Each category is written into a type block opened
//! with [`Sinks::begin_type`] and closed with [`Sinks::end_type`]; with a
//! leak-profiler writer attached, a matching block is kept open there too.

use std::sync::Arc;

use otter_flight_chunk::{CheckpointWriter, TypeBlock, types};
use rustc_hash::FxHashSet;

use crate::artifact::{Artifact, ArtifactKind, Klass, Method, TraceId};
use crate::epoch::{EpochBits, bits};
use crate::functor::Stage;
use crate::predicate::{LeakPredicate, SerializePredicate, SymbolPredicate};
use crate::record::{self, Record};
use crate::symbol_table::SymbolTable;

/// Visited set shared by the passes of one checkpoint
pub type VisitedSet = FxHashSet<(ArtifactKind, TraceId)>;

struct OpenBlock {
    block: TypeBlock,
    count: u32,
}

fn close(writer: &mut CheckpointWriter, open: Option<OpenBlock>) -> u32 {
    match open {
        Some(OpenBlock { block, count }) => {
            writer.end_type(block, count);
            count
        }
        None => 0,
    }
}

/// Output context of a serialization pass
pub struct Sinks<'a> {
    writer: &'a mut CheckpointWriter,
    leakp_writer: Option<&'a mut CheckpointWriter>,
    symbols: &'a mut SymbolTable,
    visited: &'a mut VisitedSet,
    block: Option<OpenBlock>,
    leakp_block: Option<OpenBlock>,
    leakp_total: u32,
}

impl<'a> Sinks<'a> {
    /// Create a context over the given writers
    pub fn new(
        writer: &'a mut CheckpointWriter,
        leakp_writer: Option<&'a mut CheckpointWriter>,
        symbols: &'a mut SymbolTable,
        visited: &'a mut VisitedSet,
    ) -> Self {
        Self {
            writer,
            leakp_writer,
            symbols,
            visited,
            block: None,
            leakp_block: None,
            leakp_total: 0,
        }
    }

    /// Check if a leak-profiler writer is attached
    #[inline]
    pub fn has_leakp(&self) -> bool {
        self.leakp_writer.is_some()
    }

    /// Symbol table of the checkpoint
    pub fn symbols(&mut self) -> &mut SymbolTable {
        &mut *self.symbols
    }

    /// Records written to the leak-profiler writer so far
    pub fn leakp_total(&self) -> u32 {
        self.leakp_total
    }

    /// Record a visit; returns false if the artifact was already visited
    pub fn visit(&mut self, kind: ArtifactKind, id: TraceId) -> bool {
        self.visited.insert((kind, id))
    }

    /// Open a type block in every attached writer
    pub fn begin_type(&mut self, type_id: u64) {
        debug_assert!(self.block.is_none(), "type block already open");
        self.block = Some(OpenBlock {
            block: self.writer.begin_type(type_id),
            count: 0,
        });
        if let Some(leakp) = self.leakp_writer.as_deref_mut() {
            self.leakp_block = Some(OpenBlock {
                block: leakp.begin_type(type_id),
                count: 0,
            });
        }
    }

    /// Close the open blocks, returning the main record count
    ///
    /// Blocks that received no records are removed from their writer.
    pub fn end_type(&mut self) -> u32 {
        debug_assert!(self.block.is_some(), "no open type block");
        if let Some(leakp) = self.leakp_writer.as_deref_mut() {
            self.leakp_total += close(leakp, self.leakp_block.take());
        }
        close(self.writer, self.block.take())
    }

    fn bump(open: &mut Option<OpenBlock>) {
        debug_assert!(open.is_some(), "record written outside a type block");
        if let Some(open) = open {
            open.count += 1;
        }
    }

    /// Write a record to the main writer
    pub fn write<R: Record + ?Sized>(&mut self, artifact: &R) {
        artifact.write_record(self.writer, self.symbols, false);
        Self::bump(&mut self.block);
    }

    /// Write a record to the leak-profiler writer, if attached
    pub fn write_leakp<R: Record + ?Sized>(&mut self, artifact: &R) {
        if let Some(leakp) = self.leakp_writer.as_deref_mut() {
            artifact.write_record(leakp, self.symbols, true);
            Self::bump(&mut self.leakp_block);
        }
    }

    /// Write a method record to the main writer
    pub fn write_method(&mut self, klass: &Klass, method: &Method) {
        record::write_method(self.writer, self.symbols, klass, method, false);
        Self::bump(&mut self.block);
    }

    /// Write a method record to the leak-profiler writer, if attached
    pub fn write_method_leakp(&mut self, klass: &Klass, method: &Method) {
        if let Some(leakp) = self.leakp_writer.as_deref_mut() {
            record::write_method(leakp, self.symbols, klass, method, true);
            Self::bump(&mut self.leakp_block);
        }
    }

    /// Write the symbol category
    ///
    /// Entries accepted by `predicate` go to the main writer and are marked
    /// serialized; entries referenced by leak records go to the leak-profiler
    /// writer. Returns the main record count.
    pub fn write_symbols(&mut self, predicate: SymbolPredicate) -> u32 {
        self.begin_type(types::TYPE_SYMBOL);
        let Self {
            writer,
            leakp_writer,
            symbols,
            block,
            leakp_block,
            ..
        } = self;
        symbols.iterate(|entry| {
            if predicate.test(entry) {
                record::write_symbol(writer, entry);
                entry.set_serialized();
                Self::bump(block);
            }
            if entry.is_leakp() {
                if let Some(leakp) = leakp_writer.as_deref_mut() {
                    record::write_symbol(leakp, entry);
                    Self::bump(leakp_block);
                }
                entry.clear_leakp();
            }
            true
        });
        self.end_type()
    }
}

/// Stops artifacts already visited in this checkpoint
#[derive(Debug, Default, Clone, Copy)]
pub struct Unvisited;

impl<A: Artifact> Stage<Arc<A>> for Unvisited {
    #[inline]
    fn apply(&mut self, sinks: &mut Sinks<'_>, artifact: &Arc<A>) -> bool {
        sinks.visit(A::KIND, artifact.trace_id())
    }
}

/// Passes artifacts carrying any bit of `mask`
#[derive(Debug, Clone, Copy)]
pub struct TagFilter {
    mask: u16,
}

impl TagFilter {
    /// Filter on `mask`
    pub fn new(mask: u16) -> Self {
        Self { mask }
    }
}

impl<A: Artifact> Stage<Arc<A>> for TagFilter {
    #[inline]
    fn apply(&mut self, _sinks: &mut Sinks<'_>, artifact: &Arc<A>) -> bool {
        artifact.tag().is_set(self.mask)
    }
}

/// Writes artifacts accepted by a [`SerializePredicate`] to the main writer
#[derive(Debug, Clone, Copy)]
pub struct WriteArtifact {
    predicate: SerializePredicate,
}

impl WriteArtifact {
    /// Create for the given predicate
    pub fn new(predicate: SerializePredicate) -> Self {
        Self { predicate }
    }
}

impl<A: Record> Stage<Arc<A>> for WriteArtifact {
    fn apply(&mut self, sinks: &mut Sinks<'_>, artifact: &Arc<A>) -> bool {
        if self.predicate.test(&**artifact) {
            sinks.write(&**artifact);
            artifact.tag().set_serialized();
        }
        true
    }
}

/// Writes leak-profiler artifacts to the leak writer and tags what they reference
#[derive(Debug, Clone, Copy)]
pub struct LeakWriteArtifact {
    predicate: LeakPredicate,
}

impl LeakWriteArtifact {
    /// Create for the given predicate
    pub fn new(predicate: LeakPredicate) -> Self {
        Self { predicate }
    }
}

impl<A: Record> Stage<Arc<A>> for LeakWriteArtifact {
    fn apply(&mut self, sinks: &mut Sinks<'_>, artifact: &Arc<A>) -> bool {
        if sinks.has_leakp() && self.predicate.test(&**artifact) {
            sinks.write_leakp(&**artifact);
            artifact.propagate_leakp(self.predicate.leakp_bit());
        }
        true
    }
}

/// Keeps every artifact reaching it, in arrival order
pub struct Collect<'c, A> {
    out: &'c mut Vec<Arc<A>>,
}

impl<'c, A> Collect<'c, A> {
    /// Collect into `out`
    pub fn new(out: &'c mut Vec<Arc<A>>) -> Self {
        Self { out }
    }
}

impl<A> Stage<Arc<A>> for Collect<'_, A> {
    fn apply(&mut self, _sinks: &mut Sinks<'_>, artifact: &Arc<A>) -> bool {
        self.out.push(Arc::clone(artifact));
        true
    }
}

/// Clears the written epoch's bits and the serialized bit
#[derive(Debug, Clone, Copy)]
pub struct ClearTags {
    mask: u16,
}

impl ClearTags {
    /// Clear the bits of `epoch` plus the serialized bit
    pub fn new(epoch: EpochBits) -> Self {
        Self {
            mask: epoch.all() | bits::SERIALIZED,
        }
    }

    /// Bits this stage clears
    pub fn mask(&self) -> u16 {
        self.mask
    }
}

impl<A: Artifact> Stage<Arc<A>> for ClearTags {
    #[inline]
    fn apply(&mut self, _sinks: &mut Sinks<'_>, artifact: &Arc<A>) -> bool {
        artifact.tag().clear(self.mask);
        true
    }
}
