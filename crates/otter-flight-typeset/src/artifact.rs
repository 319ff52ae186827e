//! Runtime metadata artifacts
//!
//! These types describe the runtime entities a checkpoint can reference.
//! They are owned by the runtime's metadata graph; the type set only reads
//! them and mutates their embedded [`TraceTag`] words.

use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use otter_flight_chunk::types;

use crate::epoch::{TraceEpoch, TraceTag};

/// Globally stable artifact identifier, assigned by the runtime
pub type TraceId = u64;

/// Interned runtime symbol
///
/// Symbols handed out by the same interner share storage, and the symbol
/// table keys them by identity rather than contents.
#[derive(Clone)]
pub struct Symbol(Arc<str>);

impl Symbol {
    /// Create a symbol with its own storage
    pub fn new(text: &str) -> Self {
        Self(Arc::from(text))
    }

    /// Symbol text
    #[inline]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Address of the shared storage
    #[inline]
    pub fn identity(&self) -> usize {
        Arc::as_ptr(&self.0) as *const u8 as usize
    }

    /// Check whether both symbols share storage
    #[inline]
    pub fn same(&self, other: &Symbol) -> bool {
        Arc::ptr_eq(&self.0, &other.0)
    }
}

impl fmt::Debug for Symbol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Symbol({:?})", self.as_str())
    }
}

impl fmt::Display for Symbol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Artifact category
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ArtifactKind {
    /// Class
    Class,
    /// Package
    Package,
    /// Module
    Module,
    /// Class loader
    ClassLoader,
}

impl ArtifactKind {
    /// Checkpoint type id of records of this kind
    pub fn type_id(self) -> u64 {
        match self {
            Self::Class => types::TYPE_CLASS,
            Self::Package => types::TYPE_PACKAGE,
            Self::Module => types::TYPE_MODULE,
            Self::ClassLoader => types::TYPE_CLASSLOADER,
        }
    }
}

/// Common view of taggable artifacts
pub trait Artifact {
    /// Category of this artifact
    const KIND: ArtifactKind;

    /// Stable trace id
    fn trace_id(&self) -> TraceId;

    /// Embedded tag word
    fn tag(&self) -> &TraceTag;
}

/// Class loader flavor
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoaderKind {
    /// Primordial loader with no backing loader object
    Bootstrap,
    /// Ordinary loader backed by an instance of a loader class
    Regular,
    /// Loader of unsafe anonymous classes; never serialized
    Anonymous,
}

/// Class loader artifact
#[derive(Debug)]
pub struct ClassLoader {
    trace_id: TraceId,
    kind: LoaderKind,
    name: Option<Symbol>,
    class: Option<Arc<Klass>>,
    unloading: AtomicBool,
    tag: TraceTag,
}

impl ClassLoader {
    /// The bootstrap loader
    pub fn bootstrap(trace_id: TraceId) -> Arc<Self> {
        Arc::new(Self {
            trace_id,
            kind: LoaderKind::Bootstrap,
            name: None,
            class: None,
            unloading: AtomicBool::new(false),
            tag: TraceTag::new(),
        })
    }

    /// A loader backed by an instance of `class`
    pub fn new(trace_id: TraceId, name: Option<Symbol>, class: Arc<Klass>) -> Arc<Self> {
        Arc::new(Self {
            trace_id,
            kind: LoaderKind::Regular,
            name,
            class: Some(class),
            unloading: AtomicBool::new(false),
            tag: TraceTag::new(),
        })
    }

    /// A loader for unsafe anonymous classes
    pub fn anonymous(trace_id: TraceId) -> Arc<Self> {
        Arc::new(Self {
            trace_id,
            kind: LoaderKind::Anonymous,
            name: None,
            class: None,
            unloading: AtomicBool::new(false),
            tag: TraceTag::new(),
        })
    }

    /// Loader flavor
    pub fn kind(&self) -> LoaderKind {
        self.kind
    }

    /// Check if this is the bootstrap loader
    #[inline]
    pub fn is_bootstrap(&self) -> bool {
        self.kind == LoaderKind::Bootstrap
    }

    /// Check if this loader is the anonymous kind
    #[inline]
    pub fn is_anonymous(&self) -> bool {
        self.kind == LoaderKind::Anonymous
    }

    /// Loader name, if the loader object has one
    pub fn name(&self) -> Option<&Symbol> {
        self.name.as_ref()
    }

    /// Class of the loader object (`None` for bootstrap and anonymous loaders)
    pub fn class(&self) -> Option<&Arc<Klass>> {
        self.class.as_ref()
    }

    /// Check if the loader and everything it defined is being unloaded
    #[inline]
    pub fn is_unloading(&self) -> bool {
        self.unloading.load(Ordering::Acquire)
    }

    /// Mark the loader as unloading
    pub fn set_unloading(&self) {
        self.unloading.store(true, Ordering::Release);
    }
}

impl Artifact for ClassLoader {
    const KIND: ArtifactKind = ArtifactKind::ClassLoader;

    fn trace_id(&self) -> TraceId {
        self.trace_id
    }

    fn tag(&self) -> &TraceTag {
        &self.tag
    }
}

/// Module artifact; a module without a name is the unnamed module
#[derive(Debug)]
pub struct Module {
    trace_id: TraceId,
    name: Option<Symbol>,
    version: Option<Symbol>,
    location: Option<Symbol>,
    loader: Arc<ClassLoader>,
    tag: TraceTag,
}

impl Module {
    /// A named module
    pub fn named(
        trace_id: TraceId,
        name: Symbol,
        version: Option<Symbol>,
        location: Option<Symbol>,
        loader: Arc<ClassLoader>,
    ) -> Arc<Self> {
        Arc::new(Self {
            trace_id,
            name: Some(name),
            version,
            location,
            loader,
            tag: TraceTag::new(),
        })
    }

    /// The unnamed module of `loader`
    pub fn unnamed(trace_id: TraceId, loader: Arc<ClassLoader>) -> Arc<Self> {
        Arc::new(Self {
            trace_id,
            name: None,
            version: None,
            location: None,
            loader,
            tag: TraceTag::new(),
        })
    }

    /// Check if the module has a name
    #[inline]
    pub fn is_named(&self) -> bool {
        self.name.is_some()
    }

    /// Module name
    pub fn name(&self) -> Option<&Symbol> {
        self.name.as_ref()
    }

    /// Module version
    pub fn version(&self) -> Option<&Symbol> {
        self.version.as_ref()
    }

    /// Module location
    pub fn location(&self) -> Option<&Symbol> {
        self.location.as_ref()
    }

    /// Defining loader
    pub fn loader(&self) -> &Arc<ClassLoader> {
        &self.loader
    }
}

impl Artifact for Module {
    const KIND: ArtifactKind = ArtifactKind::Module;

    fn trace_id(&self) -> TraceId {
        self.trace_id
    }

    fn tag(&self) -> &TraceTag {
        &self.tag
    }
}

/// Package artifact
#[derive(Debug)]
pub struct Package {
    trace_id: TraceId,
    name: Symbol,
    module: Option<Arc<Module>>,
    loader: Arc<ClassLoader>,
    exported: bool,
    tag: TraceTag,
}

impl Package {
    /// Create a package
    pub fn new(
        trace_id: TraceId,
        name: Symbol,
        module: Option<Arc<Module>>,
        loader: Arc<ClassLoader>,
        exported: bool,
    ) -> Arc<Self> {
        Arc::new(Self {
            trace_id,
            name,
            module,
            loader,
            exported,
            tag: TraceTag::new(),
        })
    }

    /// Package name in internal form (`java/lang`)
    pub fn name(&self) -> &Symbol {
        &self.name
    }

    /// Owning module, named or not
    pub fn module(&self) -> Option<&Arc<Module>> {
        self.module.as_ref()
    }

    /// Owning module if it is named
    pub fn named_module(&self) -> Option<Arc<Module>> {
        self.module.as_ref().filter(|m| m.is_named()).cloned()
    }

    /// Defining loader
    pub fn loader(&self) -> &Arc<ClassLoader> {
        &self.loader
    }

    /// Check if the package is exported unqualified
    pub fn is_exported(&self) -> bool {
        self.exported
    }
}

impl Artifact for Package {
    const KIND: ArtifactKind = ArtifactKind::Package;

    fn trace_id(&self) -> TraceId {
        self.trace_id
    }

    fn tag(&self) -> &TraceTag {
        &self.tag
    }
}

/// Method of a class
#[derive(Debug)]
pub struct Method {
    idnum: u16,
    name: Symbol,
    signature: Symbol,
    access_flags: u16,
    hidden: bool,
    tag: TraceTag,
}

impl Method {
    /// Create a method with its original id number within the class
    pub fn new(idnum: u16, name: Symbol, signature: Symbol, access_flags: u16) -> Self {
        Self {
            idnum,
            name,
            signature,
            access_flags,
            hidden: false,
            tag: TraceTag::new(),
        }
    }

    /// Mark the method as hidden from stack traces
    pub fn hidden(mut self, hidden: bool) -> Self {
        self.hidden = hidden;
        self
    }

    /// Original id number within the holder
    pub fn idnum(&self) -> u16 {
        self.idnum
    }

    /// Method name
    pub fn name(&self) -> &Symbol {
        &self.name
    }

    /// Method descriptor
    pub fn signature(&self) -> &Symbol {
        &self.signature
    }

    /// Access flags
    pub fn access_flags(&self) -> u16 {
        self.access_flags
    }

    /// Check if the method is hidden
    pub fn is_hidden(&self) -> bool {
        self.hidden
    }

    /// Embedded tag word
    pub fn tag(&self) -> &TraceTag {
        &self.tag
    }
}

/// Trace id of a method: holder id in the upper bits, id number in the low 16
#[inline]
pub fn method_id(klass_id: TraceId, idnum: u16) -> u64 {
    (klass_id << 16) | idnum as u64
}

/// Class artifact
#[derive(Debug)]
pub struct Klass {
    trace_id: TraceId,
    name: Symbol,
    loader: Arc<ClassLoader>,
    package: Option<Arc<Package>>,
    access_flags: u16,
    hidden: bool,
    class_loader_subclass: bool,
    methods: Vec<Method>,
    tag: TraceTag,
}

impl Klass {
    /// Start building a class
    pub fn builder(trace_id: TraceId, name: Symbol, loader: Arc<ClassLoader>) -> KlassBuilder {
        KlassBuilder::new(trace_id, name, loader)
    }

    /// Class name in internal form (`java/lang/Object`)
    pub fn name(&self) -> &Symbol {
        &self.name
    }

    /// Defining loader
    pub fn loader(&self) -> &Arc<ClassLoader> {
        &self.loader
    }

    /// Owning package (`None` for primitives and arrays of primitives)
    pub fn package(&self) -> Option<&Arc<Package>> {
        self.package.as_ref()
    }

    /// Access flags
    pub fn access_flags(&self) -> u16 {
        self.access_flags
    }

    /// Check if the class is hidden
    pub fn is_hidden(&self) -> bool {
        self.hidden
    }

    /// Check if the class extends the class-loader base class
    pub fn is_class_loader_subclass(&self) -> bool {
        self.class_loader_subclass
    }

    /// Check if this is `java/lang/Object` defined by the bootstrap loader
    pub fn is_java_lang_object(&self) -> bool {
        self.loader.is_bootstrap() && self.name.as_str() == "java/lang/Object"
    }

    /// Check if the defining loader is unloading
    pub fn is_unloading(&self) -> bool {
        self.loader.is_unloading()
    }

    /// Method table
    pub fn methods(&self) -> &[Method] {
        &self.methods
    }

    /// Find a method by id number
    pub fn method(&self, idnum: u16) -> Option<&Method> {
        self.methods.iter().find(|m| m.idnum == idnum)
    }

    /// Record use of a method in the current epoch
    ///
    /// Tags the method, and the class as both used and having used methods.
    pub fn mark_method_used(&self, epoch: &TraceEpoch, idnum: u16) -> bool {
        let Some(method) = self.method(idnum) else {
            return false;
        };
        let bits = epoch.this_epoch();
        method.tag.set(bits.used);
        self.tag.set(bits.used | bits.method_used);
        true
    }

    /// Record a leak-profiler reference to a method in the current epoch
    pub fn mark_method_leakp(&self, epoch: &TraceEpoch, idnum: u16) -> bool {
        let Some(method) = self.method(idnum) else {
            return false;
        };
        let bits = epoch.this_epoch();
        method.tag.set(bits.used | bits.leakp);
        self.tag.set(bits.used | bits.method_used | bits.leakp);
        true
    }
}

impl Artifact for Klass {
    const KIND: ArtifactKind = ArtifactKind::Class;

    fn trace_id(&self) -> TraceId {
        self.trace_id
    }

    fn tag(&self) -> &TraceTag {
        &self.tag
    }
}

/// Builder for [`Klass`]
#[derive(Debug)]
pub struct KlassBuilder {
    trace_id: TraceId,
    name: Symbol,
    loader: Arc<ClassLoader>,
    package: Option<Arc<Package>>,
    access_flags: u16,
    hidden: bool,
    class_loader_subclass: bool,
    methods: Vec<Method>,
}

impl KlassBuilder {
    /// Create a new class builder
    pub fn new(trace_id: TraceId, name: Symbol, loader: Arc<ClassLoader>) -> Self {
        Self {
            trace_id,
            name,
            loader,
            package: None,
            access_flags: 0,
            hidden: false,
            class_loader_subclass: false,
            methods: Vec::new(),
        }
    }

    /// Set owning package
    pub fn package(mut self, package: Arc<Package>) -> Self {
        self.package = Some(package);
        self
    }

    /// Set access flags
    pub fn access_flags(mut self, flags: u16) -> Self {
        self.access_flags = flags;
        self
    }

    /// Mark as a hidden class
    pub fn hidden(mut self, hidden: bool) -> Self {
        self.hidden = hidden;
        self
    }

    /// Mark as a subclass of the class-loader base class
    pub fn class_loader_subclass(mut self, value: bool) -> Self {
        self.class_loader_subclass = value;
        self
    }

    /// Add a method
    pub fn method(mut self, method: Method) -> Self {
        self.methods.push(method);
        self
    }

    /// Build the class
    pub fn build(self) -> Arc<Klass> {
        Arc::new(Klass {
            trace_id: self.trace_id,
            name: self.name,
            loader: self.loader,
            package: self.package,
            access_flags: self.access_flags,
            hidden: self.hidden,
            class_loader_subclass: self.class_loader_subclass,
            methods: self.methods,
            tag: TraceTag::new(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_symbol_identity() {
        let a = Symbol::new("java/lang");
        let b = a.clone();
        let c = Symbol::new("java/lang");
        assert!(a.same(&b));
        assert!(!a.same(&c));
        assert_eq!(a.as_str(), c.as_str());
    }

    #[test]
    fn test_object_detection_requires_bootstrap() {
        let boot = ClassLoader::bootstrap(1);
        let object = Klass::builder(10, Symbol::new("java/lang/Object"), boot.clone()).build();
        assert!(object.is_java_lang_object());

        let loader_class = Klass::builder(11, Symbol::new("app/Loader"), boot).build();
        let app = ClassLoader::new(2, None, loader_class);
        let fake = Klass::builder(12, Symbol::new("java/lang/Object"), app).build();
        assert!(!fake.is_java_lang_object());
    }

    #[test]
    fn test_mark_method_used_tags_holder() {
        let epoch = TraceEpoch::new();
        let boot = ClassLoader::bootstrap(1);
        let klass = Klass::builder(10, Symbol::new("A"), boot)
            .method(Method::new(3, Symbol::new("run"), Symbol::new("()V"), 0x0001))
            .build();

        assert!(klass.mark_method_used(&epoch, 3));
        assert!(!klass.mark_method_used(&epoch, 4));

        let bits = epoch.this_epoch();
        assert!(klass.tag().is_set(bits.method_used));
        assert!(klass.tag().is_set(bits.used));
        assert!(klass.method(3).unwrap().tag().is_set(bits.used));
    }

    #[test]
    fn test_method_id_layout() {
        assert_eq!(method_id(0x2a, 7), (0x2a << 16) | 7);
    }
}
