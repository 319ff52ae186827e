//! Record layouts of the type-set categories
//!
//! | type        | fields                                                       |
//! |-------------|--------------------------------------------------------------|
//! | class       | id, loader id, name, package id, access flags, hidden        |
//! | package     | id, name, module id, exported                                |
//! | module      | id, name, version, location, loader id                       |
//! | classloader | id, loader class id, name                                    |
//! | method      | id, class id, name, signature, access flags, hidden          |
//! | symbol      | id, string                                                   |
//!
//! Names are symbol ids; absent references are written as 0.

use otter_flight_chunk::CheckpointWriter;

use crate::artifact::{Artifact, ClassLoader, Klass, Method, Module, Package, method_id};
use crate::symbol_table::{SymbolEntry, SymbolId, SymbolKind, SymbolTable};

/// Raw-string name of the bootstrap loader
pub const BOOTSTRAP_NAME: &str = "bootstrap";

/// An artifact with a record layout
pub trait Record: Artifact {
    /// Write one record, interning any names it references
    fn write_record(&self, out: &mut CheckpointWriter, symbols: &mut SymbolTable, leakp: bool);

    /// Tag the artifacts this record references with `leakp_bit`
    fn propagate_leakp(&self, _leakp_bit: u16) {}
}

/// Loader id as referenced from other records; anonymous loaders are never written
pub fn loader_id(loader: &ClassLoader) -> u64 {
    if loader.is_anonymous() {
        0
    } else {
        loader.trace_id()
    }
}

fn klass_name(klass: &Klass, symbols: &mut SymbolTable, leakp: bool) -> SymbolId {
    if klass.is_hidden() {
        let name = format!("{}/{}", klass.name(), klass.trace_id());
        symbols.mark_cstring(&name, leakp)
    } else {
        symbols.mark(klass.name(), leakp)
    }
}

impl Record for Klass {
    fn write_record(&self, out: &mut CheckpointWriter, symbols: &mut SymbolTable, leakp: bool) {
        out.write_u64(self.trace_id());
        out.write_u64(loader_id(self.loader()));
        out.write_u64(klass_name(self, symbols, leakp));
        out.write_u64(self.package().map_or(0, |p| p.trace_id()));
        out.write_u16(self.access_flags());
        out.write_bool(self.is_hidden());
    }

    fn propagate_leakp(&self, leakp_bit: u16) {
        if let Some(package) = self.package() {
            package.tag().set(leakp_bit);
        }
        if !self.loader().is_anonymous() {
            self.loader().tag().set(leakp_bit);
        }
    }
}

impl Record for Package {
    fn write_record(&self, out: &mut CheckpointWriter, symbols: &mut SymbolTable, leakp: bool) {
        out.write_u64(self.trace_id());
        out.write_u64(symbols.mark(self.name(), leakp));
        out.write_u64(self.named_module().map_or(0, |m| m.trace_id()));
        out.write_bool(self.is_exported());
    }

    fn propagate_leakp(&self, leakp_bit: u16) {
        if let Some(module) = self.named_module() {
            module.tag().set(leakp_bit);
        }
    }
}

impl Record for Module {
    fn write_record(&self, out: &mut CheckpointWriter, symbols: &mut SymbolTable, leakp: bool) {
        out.write_u64(self.trace_id());
        out.write_u64(symbols.mark_opt(self.name(), leakp));
        out.write_u64(symbols.mark_opt(self.version(), leakp));
        out.write_u64(symbols.mark_opt(self.location(), leakp));
        out.write_u64(loader_id(self.loader()));
    }

    fn propagate_leakp(&self, leakp_bit: u16) {
        if !self.loader().is_anonymous() {
            self.loader().tag().set(leakp_bit);
        }
    }
}

impl Record for ClassLoader {
    fn write_record(&self, out: &mut CheckpointWriter, symbols: &mut SymbolTable, leakp: bool) {
        debug_assert!(!self.is_anonymous(), "anonymous loaders are never written");
        out.write_u64(self.trace_id());
        out.write_u64(self.class().map_or(0, |k| k.trace_id()));
        let name = if self.is_bootstrap() {
            symbols.mark_cstring(BOOTSTRAP_NAME, leakp)
        } else {
            symbols.mark_opt(self.name(), leakp)
        };
        out.write_u64(name);
    }
}

/// Write one method record
pub fn write_method(
    out: &mut CheckpointWriter,
    symbols: &mut SymbolTable,
    klass: &Klass,
    method: &Method,
    leakp: bool,
) {
    out.write_u64(method_id(klass.trace_id(), method.idnum()));
    out.write_u64(klass.trace_id());
    out.write_u64(symbols.mark(method.name(), leakp));
    out.write_u64(symbols.mark(method.signature(), leakp));
    out.write_u16(method.access_flags());
    out.write_bool(method.is_hidden());
}

/// Write one symbol record
///
/// Runtime symbols are written as UTF-8. Raw strings use the single-byte
/// encoding only while every byte is ASCII, since anything wider would not
/// decode back to the same text.
pub fn write_symbol(out: &mut CheckpointWriter, entry: &SymbolEntry) {
    out.write_u64(entry.id());
    let text = entry.text();
    match entry.kind() {
        SymbolKind::CString if text.is_ascii() => out.write_latin1(text.as_bytes()),
        _ => out.write_utf8(Some(text)),
    }
}
