//! Runtime metadata graph interface
//!
//! The type set never owns runtime metadata; it walks whatever implements
//! [`ClassGraph`]. [`MetadataGraph`] is an in-memory implementation used by
//! embedders without a class registry of their own, and by the tests.

use std::sync::Arc;

use parking_lot::{Mutex, RwLock};
use rustc_hash::FxHashMap;

use crate::artifact::{ClassLoader, Klass, Module, Package, Symbol};

/// Enumeration of live metadata
///
/// With `unloading_only`, only artifacts whose defining loader is being
/// unloaded are visited.
pub trait ClassGraph {
    /// Visit classes
    fn for_each_class(&self, unloading_only: bool, f: &mut dyn FnMut(&Arc<Klass>));

    /// Visit packages
    fn for_each_package(&self, unloading_only: bool, f: &mut dyn FnMut(&Arc<Package>));

    /// Visit modules
    fn for_each_module(&self, unloading_only: bool, f: &mut dyn FnMut(&Arc<Module>));

    /// Visit class loaders
    fn for_each_class_loader(&self, unloading_only: bool, f: &mut dyn FnMut(&Arc<ClassLoader>));
}

/// In-memory metadata graph with a symbol interner
#[derive(Debug, Default)]
pub struct MetadataGraph {
    symbols: Mutex<FxHashMap<Box<str>, Symbol>>,
    classes: RwLock<Vec<Arc<Klass>>>,
    packages: RwLock<Vec<Arc<Package>>>,
    modules: RwLock<Vec<Arc<Module>>>,
    loaders: RwLock<Vec<Arc<ClassLoader>>>,
}

fn visit<T>(
    list: &RwLock<Vec<Arc<T>>>,
    unloading_only: bool,
    is_unloading: impl Fn(&T) -> bool,
    f: &mut dyn FnMut(&Arc<T>),
) {
    // Callbacks may re-enter the graph, so they run on a snapshot.
    let snapshot = list.read().clone();
    for item in &snapshot {
        if unloading_only && !is_unloading(&**item) {
            continue;
        }
        f(item);
    }
}

impl MetadataGraph {
    /// Create an empty graph
    pub fn new() -> Self {
        Self::default()
    }

    /// Intern `text`; equal strings share one [`Symbol`]
    pub fn intern(&self, text: &str) -> Symbol {
        let mut symbols = self.symbols.lock();
        if let Some(symbol) = symbols.get(text) {
            return symbol.clone();
        }
        let symbol = Symbol::new(text);
        symbols.insert(text.into(), symbol.clone());
        symbol
    }

    /// Register a class
    pub fn add_class(&self, klass: Arc<Klass>) -> Arc<Klass> {
        self.classes.write().push(Arc::clone(&klass));
        klass
    }

    /// Register a package
    pub fn add_package(&self, package: Arc<Package>) -> Arc<Package> {
        self.packages.write().push(Arc::clone(&package));
        package
    }

    /// Register a module
    pub fn add_module(&self, module: Arc<Module>) -> Arc<Module> {
        self.modules.write().push(Arc::clone(&module));
        module
    }

    /// Register a class loader
    pub fn add_class_loader(&self, loader: Arc<ClassLoader>) -> Arc<ClassLoader> {
        self.loaders.write().push(Arc::clone(&loader));
        loader
    }

    /// Number of registered classes
    pub fn class_count(&self) -> usize {
        self.classes.read().len()
    }

    /// Drop everything defined by unloading loaders, returning the number of
    /// classes removed
    pub fn purge_unloaded(&self) -> usize {
        let mut classes = self.classes.write();
        let before = classes.len();
        classes.retain(|k| !k.is_unloading());
        let removed = before - classes.len();

        self.packages.write().retain(|p| !p.loader().is_unloading());
        self.modules.write().retain(|m| !m.loader().is_unloading());
        self.loaders.write().retain(|l| !l.is_unloading());

        if removed > 0 {
            tracing::debug!(target: "otter::flight", removed, "purged unloaded classes");
        }
        removed
    }
}

impl ClassGraph for MetadataGraph {
    fn for_each_class(&self, unloading_only: bool, f: &mut dyn FnMut(&Arc<Klass>)) {
        visit(&self.classes, unloading_only, Klass::is_unloading, f);
    }

    fn for_each_package(&self, unloading_only: bool, f: &mut dyn FnMut(&Arc<Package>)) {
        visit(&self.packages, unloading_only, |p| p.loader().is_unloading(), f);
    }

    fn for_each_module(&self, unloading_only: bool, f: &mut dyn FnMut(&Arc<Module>)) {
        visit(&self.modules, unloading_only, |m| m.loader().is_unloading(), f);
    }

    fn for_each_class_loader(&self, unloading_only: bool, f: &mut dyn FnMut(&Arc<ClassLoader>)) {
        visit(&self.loaders, unloading_only, ClassLoader::is_unloading, f);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::artifact::Artifact;

    #[test]
    fn test_intern_shares_storage() {
        let graph = MetadataGraph::new();
        let a = graph.intern("java/lang");
        let b = graph.intern("java/lang");
        assert!(a.same(&b));
        assert!(!a.same(&graph.intern("java/util")));
    }

    #[test]
    fn test_unloading_filter_and_purge() {
        let graph = MetadataGraph::new();
        let boot = graph.add_class_loader(ClassLoader::bootstrap(1));
        let loader_class = graph.add_class(
            Klass::builder(10, graph.intern("app/Loader"), boot.clone())
                .class_loader_subclass(true)
                .build(),
        );
        let app = graph.add_class_loader(ClassLoader::new(2, None, loader_class));
        graph.add_class(Klass::builder(11, graph.intern("app/Main"), app.clone()).build());

        app.set_unloading();

        let mut unloading = Vec::new();
        graph.for_each_class(true, &mut |k| unloading.push(k.trace_id()));
        assert_eq!(unloading, vec![11]);

        let mut all = 0;
        graph.for_each_class(false, &mut |_| all += 1);
        assert_eq!(all, 2);

        assert_eq!(graph.purge_unloaded(), 1);
        assert_eq!(graph.class_count(), 1);
        let mut loaders = 0;
        graph.for_each_class_loader(false, &mut |_| loaders += 1);
        assert_eq!(loaders, 1);
    }
}
