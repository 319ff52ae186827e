//! Per-checkpoint working set

use std::sync::Arc;

use crate::artifact::Klass;
use crate::symbol_table::SymbolTable;
use crate::writer::VisitedSet;

/// State carried through the passes of one checkpoint
///
/// The class list and visited set are rebuilt by every checkpoint. The symbol
/// table outlives them: it is only cleared when a rotation ends the chunk.
#[derive(Debug, Default)]
pub struct ArtifactSet {
    pub(crate) klasses: Vec<Arc<Klass>>,
    pub(crate) symbols: SymbolTable,
    pub(crate) visited: VisitedSet,
    pub(crate) total_count: usize,
}

impl ArtifactSet {
    /// Create an empty set
    pub fn new() -> Self {
        Self::default()
    }

    /// Prepare for the checkpoint `checkpoint_id`
    pub fn initialize(&mut self, checkpoint_id: u64, class_unload: bool) {
        self.klasses.clear();
        self.visited.clear();
        self.total_count = 0;
        self.symbols.initialize(checkpoint_id, class_unload);
    }

    /// Classes registered by the class pass, in discovery order
    pub fn klasses(&self) -> &[Arc<Klass>] {
        &self.klasses
    }

    /// Check if the class pass registered nothing
    pub fn has_klass_entries(&self) -> bool {
        !self.klasses.is_empty()
    }

    /// Symbol table of the current chunk
    pub fn symbols(&self) -> &SymbolTable {
        &self.symbols
    }

    /// Records written by the last checkpoint
    pub fn total_count(&self) -> usize {
        self.total_count
    }

    /// Drop chunk-scoped state once the chunk is complete
    pub fn clear_symbols(&mut self) {
        self.symbols.clear();
    }
}
