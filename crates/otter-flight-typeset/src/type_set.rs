//! Type-set driver
//!
//! Writes the metadata referenced since the last checkpoint as typed blocks,
//! in a fixed order:
//!
//! 1. classes: tagged in the epoch being written, plus implied classes and
//!    the classes of the loaders they reference
//! 2. packages of the registered classes
//! 3. named modules of those packages
//! 4. class loaders of the registered classes and modules
//! 5. used methods of the registered classes
//! 6. every symbol the previous passes referenced
//!
//! Each later pass only reaches artifacts through earlier ones, so a record
//! never references an id the checkpoint (or an earlier one in the same
//! chunk) does not define. Symbols come last because every other record
//! interns names while being written.

use std::sync::Arc;
use std::time::Instant;

use otter_flight_chunk::{CheckpointWriter, types};

use crate::artifact::{Artifact, ClassLoader, Klass, Module, Package};
use crate::artifact_set::ArtifactSet;
use crate::epoch::{EpochBits, TraceEpoch, bits};
use crate::functor::{Chain, Composite, Filter, Select, Stage, Stub};
use crate::graph::ClassGraph;
use crate::predicate::{
    LeakPredicate, MethodFlagPredicate, MethodUsedPredicate, SerializePredicate,
    SymbolPredicate, is_implied,
};
use crate::record::Record;
use crate::writer::{
    ClearTags, Collect, LeakWriteArtifact, Sinks, TagFilter, Unvisited, WriteArtifact,
};

/// Why a checkpoint is being written
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CheckpointKind {
    /// The chunk is being rotated; the previous epoch is written and cleared
    Rotation,
    /// Mid-chunk flush; the current epoch is written and left tagged
    Flushpoint,
    /// Classes are about to be unloaded; everything reachable is re-emitted
    ClassUnload,
}

impl CheckpointKind {
    /// Check if this pass clears the tags it reads
    #[inline]
    pub fn is_rotation(self) -> bool {
        self == Self::Rotation
    }

    /// Check if this pass writes unloading classes
    #[inline]
    pub fn is_class_unload(self) -> bool {
        self == Self::ClassUnload
    }
}

/// Per-category record counts of one checkpoint
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct PassCounts {
    /// Class records
    pub classes: u32,
    /// Package records
    pub packages: u32,
    /// Module records
    pub modules: u32,
    /// Class loader records
    pub class_loaders: u32,
    /// Method records
    pub methods: u32,
    /// Symbol records
    pub symbols: u32,
}

impl PassCounts {
    /// Sum over all categories
    pub fn total(&self) -> usize {
        [
            self.classes,
            self.packages,
            self.modules,
            self.class_loaders,
            self.methods,
            self.symbols,
        ]
        .iter()
        .map(|&n| n as usize)
        .sum()
    }
}

/// Options shared by the stages of one checkpoint
#[derive(Clone, Copy)]
struct PassContext {
    bits: EpochBits,
    kind: CheckpointKind,
    leakp: bool,
}

impl PassContext {
    fn serialize(&self) -> SerializePredicate {
        SerializePredicate::new(self.kind.is_class_unload())
    }

    fn leak_stage(&self) -> Option<LeakWriteArtifact> {
        self.leakp
            .then(|| LeakWriteArtifact::new(LeakPredicate::new(self.bits)))
    }

    fn clear_stage<'s, A: Record + 's>(&self) -> Box<dyn Stage<Arc<A>> + 's> {
        if self.kind.is_rotation() {
            Box::new(ClearTags::new(self.bits))
        } else {
            Box::new(Stub)
        }
    }

    /// Dedup and write, to the leak stream as well when enabled
    fn write_chain<'s, A: Record + 's>(&self) -> Chain<'s, Arc<A>> {
        Chain::new()
            .then(Unvisited)
            .then(self.leak_stage())
            .then(WriteArtifact::new(self.serialize()))
    }

    /// Write pipeline for a derived category
    fn derived<'s, A: Record + 's>(&self, collected: &'s mut Vec<Arc<A>>) -> Chain<'s, Arc<A>> {
        self.write_chain()
            .then(Collect::new(collected))
            .then_boxed(self.clear_stage())
    }
}

/// Serializer for the class, package, module, class-loader, method and
/// symbol categories
#[derive(Debug)]
pub struct TypeSet {
    epoch: Arc<TraceEpoch>,
    artifacts: ArtifactSet,
    checkpoint_id: u64,
    last_counts: PassCounts,
}

impl TypeSet {
    /// Create a type set reading tags of `epoch`
    pub fn new(epoch: Arc<TraceEpoch>) -> Self {
        Self {
            epoch,
            artifacts: ArtifactSet::new(),
            checkpoint_id: 0,
            last_counts: PassCounts::default(),
        }
    }

    /// Id of the last checkpoint written
    pub fn checkpoint_id(&self) -> u64 {
        self.checkpoint_id
    }

    /// Working set of the last checkpoint
    pub fn artifacts(&self) -> &ArtifactSet {
        &self.artifacts
    }

    /// Per-category counts of the last checkpoint
    pub fn last_counts(&self) -> PassCounts {
        self.last_counts
    }

    /// Write one checkpoint's type set into `writer`
    ///
    /// With `leakp_writer`, the leak-profiler subset is also written there.
    /// Returns the number of records written to `writer`; 0 means no class
    /// was referenced and nothing was written.
    pub fn serialize(
        &mut self,
        graph: &dyn ClassGraph,
        writer: &mut CheckpointWriter,
        leakp_writer: Option<&mut CheckpointWriter>,
        kind: CheckpointKind,
    ) -> usize {
        let start = Instant::now();
        self.checkpoint_id += 1;
        let checkpoint_id = self.checkpoint_id;
        let cx = PassContext {
            bits: self.epoch.bits_for(!kind.is_rotation()),
            kind,
            leakp: leakp_writer.is_some(),
        };
        self.artifacts.initialize(checkpoint_id, kind.is_class_unload());

        let ArtifactSet {
            klasses,
            symbols,
            visited,
            total_count,
        } = &mut self.artifacts;
        let mut sinks = Sinks::new(writer, leakp_writer, symbols, visited);
        let counts = &mut self.last_counts;
        *counts = PassCounts::default();

        // Classes
        counts.classes = write_classes(graph, &mut sinks, klasses, cx);
        if klasses.is_empty() {
            if kind.is_rotation() {
                sinks.symbols().clear();
            }
            tracing::trace!(
                target: "otter::flight",
                checkpoint_id,
                kind = ?kind,
                "no classes referenced, checkpoint skipped"
            );
            return 0;
        }

        // Packages
        let mut packages = Vec::new();
        counts.packages = write_packages(graph, &mut sinks, klasses, &mut packages, cx);

        // Modules
        let mut modules = Vec::new();
        counts.modules = write_modules(graph, &mut sinks, &packages, &mut modules, cx);

        // Class loaders
        counts.class_loaders = write_class_loaders(graph, &mut sinks, klasses, &modules, cx);

        // Methods
        counts.methods = write_methods(&mut sinks, klasses, cx);

        // Symbols
        counts.symbols = sinks.write_symbols(SymbolPredicate::new(kind.is_class_unload()));
        let leakp_records = sinks.leakp_total();

        // Teardown
        if kind.is_rotation() {
            clear_klasses_and_methods(klasses, cx.bits);
            sinks.symbols().clear();
        }

        *total_count = counts.total();
        tracing::debug!(
            target: "otter::flight",
            checkpoint_id,
            kind = ?kind,
            classes = counts.classes,
            packages = counts.packages,
            modules = counts.modules,
            class_loaders = counts.class_loaders,
            methods = counts.methods,
            symbols = counts.symbols,
            leakp_records,
            elapsed_us = start.elapsed().as_micros() as u64,
            "type set serialized"
        );
        *total_count
    }
}

fn write_classes(
    graph: &dyn ClassGraph,
    sinks: &mut Sinks<'_>,
    klasses: &mut Vec<Arc<Klass>>,
    cx: PassContext,
) -> u32 {
    let used = cx.bits.used;
    sinks.begin_type(types::TYPE_CLASS);
    {
        let mut stage = Chain::<Arc<Klass>>::new()
            .then(Filter(move |k: &Arc<Klass>| k.tag().is_set(used) || is_implied(k)))
            .then(cx.write_chain::<Klass>())
            .then(Collect::new(&mut *klasses));
        graph.for_each_class(cx.kind.is_class_unload(), &mut |k| {
            stage.apply(sinks, k);
        });
    }
    write_loader_classes(sinks, klasses, cx);
    sinks.end_type()
}

/// Classes of the non-anonymous loaders the class and module records will
/// reference
fn loader_classes(klass: &Klass) -> Vec<Arc<Klass>> {
    let module = klass.package().and_then(|p| p.named_module());
    [Some(klass.loader()), module.as_ref().map(|m| m.loader())]
        .into_iter()
        .flatten()
        .filter_map(|loader| loader.class().cloned())
        .collect()
}

/// Register loader classes until no new loader is reached
///
/// An unload pass only enumerates unloading classes, while the class of an
/// unloading loader usually belongs to a live parent loader.
fn write_loader_classes(sinks: &mut Sinks<'_>, klasses: &mut Vec<Arc<Klass>>, cx: PassContext) {
    let mut next = 0;
    while next < klasses.len() {
        let pending: Vec<Arc<Klass>> = klasses[next..]
            .iter()
            .flat_map(|k| loader_classes(k))
            .collect();
        next = klasses.len();
        let mut stage = cx.write_chain::<Klass>().then(Collect::new(&mut *klasses));
        for klass in &pending {
            stage.apply(sinks, klass);
        }
    }
}

fn write_packages(
    graph: &dyn ClassGraph,
    sinks: &mut Sinks<'_>,
    klasses: &[Arc<Klass>],
    packages: &mut Vec<Arc<Package>>,
    cx: PassContext,
) -> u32 {
    sinks.begin_type(types::TYPE_PACKAGE);
    let mut write = cx.derived(packages);
    let mut derive = Select::new(|k: &Arc<Klass>| k.package().cloned(), &mut write);
    for klass in klasses {
        derive.apply(sinks, klass);
    }
    if cx.kind.is_rotation() {
        let mut tagged = Composite::new(TagFilter::new(cx.bits.used), &mut write);
        graph.for_each_package(false, &mut |p| {
            tagged.apply(sinks, p);
        });
    }
    sinks.end_type()
}

fn write_modules(
    graph: &dyn ClassGraph,
    sinks: &mut Sinks<'_>,
    packages: &[Arc<Package>],
    modules: &mut Vec<Arc<Module>>,
    cx: PassContext,
) -> u32 {
    sinks.begin_type(types::TYPE_MODULE);
    let mut write = cx.derived(modules);
    let mut derive = Select::new(|p: &Arc<Package>| p.named_module(), &mut write);
    for package in packages {
        derive.apply(sinks, package);
    }
    if cx.kind.is_rotation() {
        let mut tagged = Composite::new(
            TagFilter::new(cx.bits.used),
            Composite::new(Filter(|m: &Arc<Module>| m.is_named()), &mut write),
        );
        graph.for_each_module(false, &mut |m| {
            tagged.apply(sinks, m);
        });
    }
    sinks.end_type()
}

fn named_loader(loader: &Arc<ClassLoader>) -> Option<Arc<ClassLoader>> {
    (!loader.is_anonymous()).then(|| Arc::clone(loader))
}

fn write_class_loaders(
    graph: &dyn ClassGraph,
    sinks: &mut Sinks<'_>,
    klasses: &[Arc<Klass>],
    modules: &[Arc<Module>],
    cx: PassContext,
) -> u32 {
    sinks.begin_type(types::TYPE_CLASSLOADER);
    let mut write = cx.write_chain::<ClassLoader>().then_boxed(cx.clear_stage());

    let mut from_klass = Select::new(|k: &Arc<Klass>| named_loader(k.loader()), &mut write);
    for klass in klasses {
        from_klass.apply(sinks, klass);
    }
    let mut from_module = Select::new(|m: &Arc<Module>| named_loader(m.loader()), &mut write);
    for module in modules {
        from_module.apply(sinks, module);
    }
    if cx.kind.is_rotation() {
        let mut tagged = Composite::new(
            TagFilter::new(cx.bits.used),
            Composite::new(
                Filter(|l: &Arc<ClassLoader>| !l.is_anonymous()),
                &mut write,
            ),
        );
        graph.for_each_class_loader(false, &mut |l| {
            tagged.apply(sinks, l);
        });
    }
    sinks.end_type()
}

fn write_methods(sinks: &mut Sinks<'_>, klasses: &[Arc<Klass>], cx: PassContext) -> u32 {
    let has_used = MethodUsedPredicate::new(cx.bits);
    let used = MethodFlagPredicate::used(cx.bits);
    let leakp = MethodFlagPredicate::leakp(cx.bits);
    let serialize = cx.serialize();

    sinks.begin_type(types::TYPE_METHOD);
    for klass in klasses.iter().filter(|k| has_used.test(k)) {
        for method in klass.methods() {
            if !used.test(method) {
                continue;
            }
            if cx.leakp && leakp.test(method) {
                sinks.write_method_leakp(klass, method);
            }
            if serialize.test_tag(method.tag()) {
                sinks.write_method(klass, method);
                method.tag().set_serialized();
            }
        }
    }
    sinks.end_type()
}

fn clear_klasses_and_methods(klasses: &[Arc<Klass>], bits: EpochBits) {
    let mask = bits.all() | bits::SERIALIZED;
    for klass in klasses {
        klass.tag().clear(mask);
        for method in klass.methods() {
            method.tag().clear(mask);
        }
    }
}
