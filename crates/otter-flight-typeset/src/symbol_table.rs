//! Checkpoint-scoped symbol interning
//!
//! Records reference names through small ids instead of inline strings. An id
//! is `(checkpoint_id << 24) | local_id`. Local ids restart at every
//! checkpoint, so entries kept across flushpoints never push the local part
//! into the checkpoint bits and ids handed out by different checkpoints never
//! collide.
//!
//! Two lists back the table:
//! - runtime [`Symbol`]s, keyed by identity
//! - raw strings built by the writer itself (hidden class names, `bootstrap`),
//!   keyed by contents

use rustc_hash::FxHashMap;

use crate::artifact::Symbol;

/// Composite symbol id; 0 means "no symbol"
pub type SymbolId = u64;

/// Width of the checkpoint-local part of a [`SymbolId`]
pub const LOCAL_ID_BITS: u32 = 24;

/// Combine a checkpoint id and a local id
#[inline]
pub fn composite_id(checkpoint_id: u64, local_id: u32) -> SymbolId {
    assert!(local_id < (1 << LOCAL_ID_BITS), "local symbol id overflow");
    (checkpoint_id << LOCAL_ID_BITS) | local_id as u64
}

/// Which list an entry lives in
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SymbolKind {
    /// Runtime-interned symbol
    Symbol,
    /// Raw string owned by the table
    CString,
}

/// One interned value
#[derive(Debug)]
pub struct SymbolEntry {
    id: SymbolId,
    value: Symbol,
    kind: SymbolKind,
    serialized: bool,
    leakp: bool,
}

impl SymbolEntry {
    /// Composite id
    #[inline]
    pub fn id(&self) -> SymbolId {
        self.id
    }

    /// Interned text
    #[inline]
    pub fn text(&self) -> &str {
        self.value.as_str()
    }

    /// Backing list
    #[inline]
    pub fn kind(&self) -> SymbolKind {
        self.kind
    }

    /// Check if the entry was already written
    #[inline]
    pub fn is_serialized(&self) -> bool {
        self.serialized
    }

    /// Mark the entry as written
    #[inline]
    pub fn set_serialized(&mut self) {
        self.serialized = true;
    }

    /// Check if a leak-profiler record references this entry
    #[inline]
    pub fn is_leakp(&self) -> bool {
        self.leakp
    }

    /// Clear the leak-profiler reference
    #[inline]
    pub fn clear_leakp(&mut self) {
        self.leakp = false;
    }
}

/// Symbol and raw-string interning table
#[derive(Debug)]
pub struct SymbolTable {
    checkpoint_id: u64,
    next_local: u32,
    class_unload: bool,
    symbols: Vec<SymbolEntry>,
    symbol_index: FxHashMap<usize, usize>,
    cstrings: Vec<SymbolEntry>,
    cstring_index: FxHashMap<Box<str>, usize>,
}

impl Default for SymbolTable {
    fn default() -> Self {
        Self::new()
    }
}

impl SymbolTable {
    /// Create an empty table
    pub fn new() -> Self {
        Self {
            checkpoint_id: 0,
            next_local: 1,
            class_unload: false,
            symbols: Vec::new(),
            symbol_index: FxHashMap::default(),
            cstrings: Vec::new(),
            cstring_index: FxHashMap::default(),
        }
    }

    /// Prepare for a checkpoint; existing entries keep their ids
    pub fn initialize(&mut self, checkpoint_id: u64, class_unload: bool) {
        debug_assert!(checkpoint_id > self.checkpoint_id, "checkpoint id went backwards");
        self.checkpoint_id = checkpoint_id;
        self.next_local = 1;
        self.class_unload = class_unload;
    }

    /// Checkpoint id new entries are stamped with
    #[inline]
    pub fn checkpoint_id(&self) -> u64 {
        self.checkpoint_id
    }

    /// Check if the current checkpoint is a class-unload pass
    #[inline]
    pub fn is_class_unload(&self) -> bool {
        self.class_unload
    }

    /// Number of entries across both lists
    #[inline]
    pub fn len(&self) -> usize {
        self.symbols.len() + self.cstrings.len()
    }

    /// Check if the table holds no entries
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn next_id(&mut self) -> SymbolId {
        debug_assert!(self.checkpoint_id != 0, "symbol marked before initialize");
        let id = composite_id(self.checkpoint_id, self.next_local);
        self.next_local += 1;
        id
    }

    /// Intern a runtime symbol, returning its id
    pub fn mark(&mut self, symbol: &Symbol, leakp: bool) -> SymbolId {
        if let Some(&index) = self.symbol_index.get(&symbol.identity()) {
            let entry = &mut self.symbols[index];
            entry.leakp |= leakp;
            return entry.id;
        }

        let id = self.next_id();
        self.symbol_index.insert(symbol.identity(), self.symbols.len());
        self.symbols.push(SymbolEntry {
            id,
            value: symbol.clone(),
            kind: SymbolKind::Symbol,
            serialized: false,
            leakp,
        });
        id
    }

    /// Intern an optional symbol; `None` maps to 0
    pub fn mark_opt(&mut self, symbol: Option<&Symbol>, leakp: bool) -> SymbolId {
        symbol.map_or(0, |s| self.mark(s, leakp))
    }

    /// Intern a raw string by contents, returning its id
    pub fn mark_cstring(&mut self, text: &str, leakp: bool) -> SymbolId {
        if let Some(&index) = self.cstring_index.get(text) {
            let entry = &mut self.cstrings[index];
            entry.leakp |= leakp;
            return entry.id;
        }

        let id = self.next_id();
        self.cstring_index.insert(text.into(), self.cstrings.len());
        self.cstrings.push(SymbolEntry {
            id,
            value: Symbol::new(text),
            kind: SymbolKind::CString,
            serialized: false,
            leakp,
        });
        id
    }

    /// Look up the entry of a runtime symbol
    pub fn map(&self, symbol: &Symbol) -> Option<&SymbolEntry> {
        self.symbol_index
            .get(&symbol.identity())
            .map(|&index| &self.symbols[index])
    }

    /// Look up the entry of a raw string
    pub fn map_cstring(&self, text: &str) -> Option<&SymbolEntry> {
        self.cstring_index
            .get(text)
            .map(|&index| &self.cstrings[index])
    }

    /// Visit symbol entries, then raw-string entries, in insertion order
    ///
    /// Stops early when `f` returns false.
    pub fn iterate(&mut self, mut f: impl FnMut(&mut SymbolEntry) -> bool) {
        for entry in self.symbols.iter_mut().chain(self.cstrings.iter_mut()) {
            if !f(entry) {
                return;
            }
        }
    }

    /// Drop every entry
    pub fn clear(&mut self) {
        self.symbols.clear();
        self.symbol_index.clear();
        self.cstrings.clear();
        self.cstring_index.clear();
        self.next_local = 1;
    }
}
