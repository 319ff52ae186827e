//! Type-set serialization tests
//!
//! Each test builds a small metadata graph, tags artifacts the way recording
//! threads would, writes a checkpoint and decodes it back.

use std::collections::HashSet;
use std::sync::Arc;

use otter_flight_chunk::{CheckpointWriter, IntEncoding, RecordReader, types};
use otter_flight_typeset::{
    Artifact, CheckpointKind, ClassGraph, ClassLoader, Klass, MetadataGraph, Method, Module,
    Package, TraceEpoch, TraceTag, TypeSet, method_id,
};

// ============================================================================
// Fixtures
// ============================================================================

struct World {
    epoch: Arc<TraceEpoch>,
    graph: MetadataGraph,
    boot: Arc<ClassLoader>,
}

impl World {
    fn new() -> Self {
        let graph = MetadataGraph::new();
        let boot = graph.add_class_loader(ClassLoader::bootstrap(1));
        Self {
            epoch: Arc::new(TraceEpoch::new()),
            graph,
            boot,
        }
    }

    fn type_set(&self) -> TypeSet {
        TypeSet::new(Arc::clone(&self.epoch))
    }

    fn package(&self, id: u64, name: &str) -> Arc<Package> {
        self.graph.add_package(Package::new(
            id,
            self.graph.intern(name),
            None,
            self.boot.clone(),
            true,
        ))
    }

    fn class(&self, id: u64, name: &str, package: &Arc<Package>) -> Arc<Klass> {
        self.graph.add_class(
            Klass::builder(id, self.graph.intern(name), package.loader().clone())
                .package(package.clone())
                .build(),
        )
    }

    fn tag(&self, artifact: &dyn TagTarget) {
        self.epoch.mark_used(artifact.trace_tag());
    }

    fn rotate(&self, type_set: &mut TypeSet, writer: &mut CheckpointWriter) -> usize {
        self.epoch.shift();
        type_set.serialize(&self.graph, writer, None, CheckpointKind::Rotation)
    }

    fn flush(&self, type_set: &mut TypeSet, writer: &mut CheckpointWriter) -> usize {
        type_set.serialize(&self.graph, writer, None, CheckpointKind::Flushpoint)
    }
}

trait TagTarget {
    fn trace_tag(&self) -> &TraceTag;
}

impl<A: Artifact> TagTarget for Arc<A> {
    fn trace_tag(&self) -> &TraceTag {
        self.tag()
    }
}

fn writer(encoding: IntEncoding) -> CheckpointWriter {
    CheckpointWriter::new(encoding)
}

// ============================================================================
// Decoding
// ============================================================================

#[derive(Debug, Default)]
struct Decoded {
    /// (id, loader, name, package, hidden)
    classes: Vec<(u64, u64, u64, u64, bool)>,
    /// (id, name, module)
    packages: Vec<(u64, u64, u64)>,
    /// (id, name, version, location, loader)
    modules: Vec<(u64, u64, u64, u64, u64)>,
    /// (id, class, name)
    loaders: Vec<(u64, u64, u64)>,
    /// (id, class, name, signature, hidden)
    methods: Vec<(u64, u64, u64, u64, bool)>,
    symbols: Vec<(u64, String)>,
}

impl Decoded {
    fn symbol(&self, id: u64) -> &str {
        self.symbols
            .iter()
            .find(|(sid, _)| *sid == id)
            .map(|(_, text)| text.as_str())
            .unwrap_or_else(|| panic!("symbol {id:#x} not defined"))
    }

    fn symbol_texts(&self) -> Vec<&str> {
        let mut texts: Vec<&str> = self.symbols.iter().map(|(_, t)| t.as_str()).collect();
        texts.sort_unstable();
        texts
    }

    fn class_ids(&self) -> Vec<u64> {
        self.classes.iter().map(|c| c.0).collect()
    }

    fn total(&self) -> usize {
        self.classes.len()
            + self.packages.len()
            + self.modules.len()
            + self.loaders.len()
            + self.methods.len()
            + self.symbols.len()
    }
}

fn decode(writer: &CheckpointWriter) -> Decoded {
    let mut r = RecordReader::new(writer.as_bytes(), writer.encoding());
    let mut out = Decoded::default();
    let mut seen_types = Vec::new();
    while !r.is_at_end() {
        let (type_id, count) = r.read_type_header().unwrap();
        assert!(count > 0, "empty type block for {type_id}");
        seen_types.push(type_id);
        for _ in 0..count {
            match type_id {
                types::TYPE_CLASS => {
                    let id = r.read_u64().unwrap();
                    let loader = r.read_u64().unwrap();
                    let name = r.read_u64().unwrap();
                    let package = r.read_u64().unwrap();
                    let _access = r.read_u16().unwrap();
                    let hidden = r.read_bool().unwrap();
                    out.classes.push((id, loader, name, package, hidden));
                }
                types::TYPE_PACKAGE => {
                    let id = r.read_u64().unwrap();
                    let name = r.read_u64().unwrap();
                    let module = r.read_u64().unwrap();
                    let _exported = r.read_bool().unwrap();
                    out.packages.push((id, name, module));
                }
                types::TYPE_MODULE => {
                    let id = r.read_u64().unwrap();
                    let name = r.read_u64().unwrap();
                    let version = r.read_u64().unwrap();
                    let location = r.read_u64().unwrap();
                    let loader = r.read_u64().unwrap();
                    out.modules.push((id, name, version, location, loader));
                }
                types::TYPE_CLASSLOADER => {
                    let id = r.read_u64().unwrap();
                    let class = r.read_u64().unwrap();
                    let name = r.read_u64().unwrap();
                    out.loaders.push((id, class, name));
                }
                types::TYPE_METHOD => {
                    let id = r.read_u64().unwrap();
                    let class = r.read_u64().unwrap();
                    let name = r.read_u64().unwrap();
                    let signature = r.read_u64().unwrap();
                    let _access = r.read_u16().unwrap();
                    let hidden = r.read_bool().unwrap();
                    out.methods.push((id, class, name, signature, hidden));
                }
                types::TYPE_SYMBOL => {
                    let id = r.read_u64().unwrap();
                    let text = r.read_string().unwrap().unwrap();
                    out.symbols.push((id, text));
                }
                other => panic!("unexpected type id {other}"),
            }
        }
    }

    // Write order is a hard invariant
    let order = [
        types::TYPE_CLASS,
        types::TYPE_PACKAGE,
        types::TYPE_MODULE,
        types::TYPE_CLASSLOADER,
        types::TYPE_METHOD,
        types::TYPE_SYMBOL,
    ];
    let ranks: Vec<usize> = seen_types
        .iter()
        .map(|t| order.iter().position(|o| o == t).unwrap())
        .collect();
    assert!(ranks.windows(2).all(|w| w[0] < w[1]), "blocks out of order: {seen_types:?}");
    assert_eq!(seen_types.len() as u32, writer.type_count());
    out
}

// ============================================================================
// Scenarios
// ============================================================================

#[test]
fn test_two_classes_in_one_bootstrap_package() {
    for encoding in [IntEncoding::BigEndian, IntEncoding::Compressed] {
        let world = World::new();
        let p1 = world.package(100, "p1");
        let a = world.class(10, "A", &p1);
        let b = world.class(11, "B", &p1);
        world.tag(&a);
        world.tag(&b);

        let mut type_set = world.type_set();
        let mut out = writer(encoding);
        let written = world.rotate(&mut type_set, &mut out);
        let decoded = decode(&out);

        assert_eq!(written, decoded.total());
        assert_eq!(decoded.class_ids(), vec![10, 11]);
        assert_eq!(decoded.packages.len(), 1);
        assert_eq!(decoded.modules.len(), 0);
        assert_eq!(decoded.loaders.len(), 1);
        assert_eq!(decoded.symbol_texts(), vec!["A", "B", "bootstrap", "p1"]);

        let (id, loader, name, package, hidden) = decoded.classes[0];
        assert_eq!((id, loader, package, hidden), (10, 1, 100, false));
        assert_eq!(decoded.symbol(name), "A");

        let (package_id, package_name, module) = decoded.packages[0];
        assert_eq!((package_id, module), (100, 0));
        assert_eq!(decoded.symbol(package_name), "p1");

        let (loader_id, loader_class, loader_name) = decoded.loaders[0];
        assert_eq!((loader_id, loader_class), (1, 0));
        assert_eq!(decoded.symbol(loader_name), "bootstrap");
    }
}

#[test]
fn test_flushpoint_keeps_tags() {
    let world = World::new();
    let p1 = world.package(100, "p1");
    let a = world.class(10, "A", &p1);
    world.tag(&a);

    let mut type_set = world.type_set();
    let mut out = writer(IntEncoding::BigEndian);
    assert!(world.flush(&mut type_set, &mut out) > 0);
    assert_eq!(decode(&out).class_ids(), vec![10]);

    assert!(a.tag().is_set(world.epoch.this_epoch().used));
    assert!(a.tag().is_serialized());
    assert!(!type_set.artifacts().symbols().is_empty());
}

#[test]
fn test_at_most_once_within_a_chunk() {
    let world = World::new();
    let p1 = world.package(100, "p1");
    let a = world.class(10, "A", &p1);
    world.tag(&a);
    let mut type_set = world.type_set();

    let mut first = writer(IntEncoding::BigEndian);
    assert_eq!(world.flush(&mut type_set, &mut first), 6);

    let mut second = writer(IntEncoding::BigEndian);
    assert_eq!(world.flush(&mut type_set, &mut second), 0);
    assert!(second.is_empty());

    let c = world.class(12, "C", &p1);
    world.tag(&c);
    let mut third = writer(IntEncoding::BigEndian);
    assert_eq!(world.flush(&mut type_set, &mut third), 2);
    let decoded = decode(&third);
    assert_eq!(decoded.class_ids(), vec![12]);
    assert_eq!(decoded.symbol_texts(), vec!["C"]);
    assert!(decoded.packages.is_empty());

    // Everything is already in the chunk, so rotation adds nothing but clears
    let mut rotation = writer(IntEncoding::BigEndian);
    assert_eq!(world.rotate(&mut type_set, &mut rotation), 0);
    assert!(rotation.is_empty());
    assert_eq!(a.tag().bits(), 0);
    assert_eq!(p1.tag().bits(), 0);
    assert_eq!(world.boot.tag().bits(), 0);
    assert!(type_set.artifacts().symbols().is_empty());

    // The next chunk starts from scratch
    world.tag(&a);
    let mut next = writer(IntEncoding::BigEndian);
    assert_eq!(world.rotate(&mut type_set, &mut next), 6);
}

#[test]
fn test_nothing_tagged_skips_every_pass() {
    let world = World::new();
    let p1 = world.package(100, "p1");
    world.class(10, "A", &p1);
    world.tag(&p1);
    world.tag(&world.boot);

    let mut type_set = world.type_set();
    let mut out = writer(IntEncoding::BigEndian);
    assert_eq!(world.rotate(&mut type_set, &mut out), 0);
    assert!(out.is_empty());
    assert!(!type_set.artifacts().has_klass_entries());
    assert!(!p1.tag().is_serialized());
}

/// Graph that tags an artifact in the current epoch while the checkpoint
/// thread is enumerating, as a recording thread could
struct RacingGraph<'g> {
    inner: &'g MetadataGraph,
    epoch: Arc<TraceEpoch>,
    late: Arc<Klass>,
}

impl ClassGraph for RacingGraph<'_> {
    fn for_each_class(&self, unloading_only: bool, f: &mut dyn FnMut(&Arc<Klass>)) {
        self.epoch.mark_used(self.late.tag());
        self.inner.for_each_class(unloading_only, f);
    }

    fn for_each_package(&self, unloading_only: bool, f: &mut dyn FnMut(&Arc<Package>)) {
        self.inner.for_each_package(unloading_only, f);
    }

    fn for_each_module(&self, unloading_only: bool, f: &mut dyn FnMut(&Arc<Module>)) {
        self.inner.for_each_module(unloading_only, f);
    }

    fn for_each_class_loader(&self, unloading_only: bool, f: &mut dyn FnMut(&Arc<ClassLoader>)) {
        self.inner.for_each_class_loader(unloading_only, f);
    }
}

#[test]
fn test_rotation_reads_only_previous_epoch() {
    let world = World::new();
    let p1 = world.package(100, "p1");
    let a = world.class(10, "A", &p1);
    let late = world.class(11, "Late", &p1);
    world.tag(&a);

    world.epoch.shift();
    // Used again after the shift; must survive the rotation teardown
    world.tag(&a);

    let racing = RacingGraph {
        inner: &world.graph,
        epoch: Arc::clone(&world.epoch),
        late: Arc::clone(&late),
    };
    let mut type_set = world.type_set();
    let mut out = writer(IntEncoding::BigEndian);
    type_set.serialize(&racing, &mut out, None, CheckpointKind::Rotation);

    assert_eq!(decode(&out).class_ids(), vec![10]);
    let current = world.epoch.this_epoch().used;
    let previous = world.epoch.previous_epoch().used;
    assert!(late.tag().is_set(current));
    assert!(a.tag().is_set(current));
    assert!(!a.tag().is_set(previous));
    assert!(!a.tag().is_serialized());
}

#[test]
fn test_every_referenced_id_is_defined() {
    let world = World::new();
    let graph = &world.graph;
    let boot = world.boot.clone();

    let java_base = graph.add_module(Module::named(
        60,
        graph.intern("java.base"),
        Some(graph.intern("21")),
        Some(graph.intern("jrt:/java.base")),
        boot.clone(),
    ));
    let boot_unnamed = graph.add_module(Module::unnamed(62, boot.clone()));
    let java_lang = graph.add_package(Package::new(
        50,
        graph.intern("java/lang"),
        Some(java_base),
        boot.clone(),
        true,
    ));
    let loader_pkg = graph.add_package(Package::new(
        52,
        graph.intern("app/loader"),
        Some(boot_unnamed),
        boot.clone(),
        false,
    ));
    graph.add_class(
        Klass::builder(2, graph.intern("java/lang/Object"), boot.clone())
            .package(java_lang)
            .build(),
    );
    let loader_class = graph.add_class(
        Klass::builder(3, graph.intern("app/loader/AppLoader"), boot.clone())
            .package(loader_pkg)
            .class_loader_subclass(true)
            .build(),
    );
    let app = graph.add_class_loader(ClassLoader::new(4, Some(graph.intern("app")), loader_class));
    let app_module = graph.add_module(Module::named(
        61,
        graph.intern("app.main"),
        Some(graph.intern("1.0")),
        None,
        app.clone(),
    ));
    let app_pkg = graph.add_package(Package::new(
        53,
        graph.intern("app"),
        Some(app_module),
        app.clone(),
        true,
    ));
    let main = graph.add_class(
        Klass::builder(5, graph.intern("app/Main"), app)
            .package(app_pkg)
            .build(),
    );
    world.tag(&main);

    let mut type_set = world.type_set();
    let mut out = writer(IntEncoding::Compressed);
    world.rotate(&mut type_set, &mut out);
    let d = decode(&out);

    let classes: HashSet<u64> = d.classes.iter().map(|c| c.0).collect();
    let packages: HashSet<u64> = d.packages.iter().map(|p| p.0).collect();
    let modules: HashSet<u64> = d.modules.iter().map(|m| m.0).collect();
    let loaders: HashSet<u64> = d.loaders.iter().map(|l| l.0).collect();
    let symbols: HashSet<u64> = d.symbols.iter().map(|s| s.0).collect();
    let defined = |set: &HashSet<u64>, id: u64| id == 0 || set.contains(&id);

    assert_eq!(classes, HashSet::from([2, 3, 5]));
    assert_eq!(packages, HashSet::from([50, 52, 53]));
    assert_eq!(modules, HashSet::from([60, 61]));
    assert_eq!(loaders, HashSet::from([1, 4]));

    for &(_, loader, name, package, _) in &d.classes {
        assert!(defined(&loaders, loader));
        assert!(defined(&packages, package));
        assert!(symbols.contains(&name));
    }
    for &(_, name, module) in &d.packages {
        assert!(defined(&modules, module));
        assert!(symbols.contains(&name));
    }
    for &(_, name, version, location, loader) in &d.modules {
        assert!(symbols.contains(&name));
        assert!(defined(&symbols, version));
        assert!(defined(&symbols, location));
        assert!(loaders.contains(&loader));
    }
    for &(_, class, name) in &d.loaders {
        assert!(defined(&classes, class));
        assert!(symbols.contains(&name));
    }
}

#[test]
fn test_symbol_ids_carry_checkpoint_id() {
    let world = World::new();
    let p1 = world.package(100, "p1");
    let a = world.class(10, "A", &p1);
    world.tag(&a);
    let mut type_set = world.type_set();

    let mut first = writer(IntEncoding::BigEndian);
    world.flush(&mut type_set, &mut first);
    let first = decode(&first);
    assert!(first.symbols.iter().all(|(id, _)| id >> 24 == 1));

    let c = world.class(12, "C", &p1);
    world.tag(&c);
    let mut second = writer(IntEncoding::BigEndian);
    world.flush(&mut type_set, &mut second);
    let second = decode(&second);
    assert_eq!(second.symbols, vec![((2 << 24) | 1, "C".to_owned())]);

    let mut rotation = writer(IntEncoding::BigEndian);
    world.rotate(&mut type_set, &mut rotation);

    world.tag(&a);
    let mut next = writer(IntEncoding::BigEndian);
    world.rotate(&mut type_set, &mut next);
    let next = decode(&next);
    assert_eq!(type_set.checkpoint_id(), 4);

    let mut all_ids: Vec<u64> = first
        .symbols
        .iter()
        .chain(&second.symbols)
        .chain(&next.symbols)
        .map(|(id, _)| *id)
        .collect();
    let count = all_ids.len();
    all_ids.sort_unstable();
    all_ids.dedup();
    assert_eq!(all_ids.len(), count);
    assert!(next.symbols.iter().any(|(id, _)| *id == (4 << 24) | 1));
}

#[test]
fn test_leak_profiler_subset() {
    let world = World::new();
    let p1 = world.package(100, "p1");
    let a = world.class(10, "A", &p1);
    let b = world.class(11, "B", &p1);
    world.tag(&a);
    world.tag(&b);
    world.epoch.mark_leakp(a.tag());

    let mut type_set = world.type_set();
    let mut out = writer(IntEncoding::BigEndian);
    let mut leak = writer(IntEncoding::BigEndian);
    world.epoch.shift();
    type_set.serialize(&world.graph, &mut out, Some(&mut leak), CheckpointKind::Rotation);

    let main = decode(&out);
    let leak = decode(&leak);
    assert_eq!(main.class_ids(), vec![10, 11]);
    assert_eq!(leak.class_ids(), vec![10]);
    assert_eq!(leak.packages.len(), 1);
    assert_eq!(leak.loaders.len(), 1);
    assert_eq!(leak.symbol_texts(), vec!["A", "bootstrap", "p1"]);

    // Same symbol table, same ids
    assert_eq!(leak.classes[0].2, main.classes[0].2);

    // Rotation teardown clears the propagated leak bits too
    assert_eq!(p1.tag().bits(), 0);
    assert_eq!(world.boot.tag().bits(), 0);
}

#[test]
fn test_used_methods_written_once() {
    let world = World::new();
    let p1 = world.package(100, "p1");
    let names = |s: &str| world.graph.intern(s);
    let klass = world.graph.add_class(
        Klass::builder(10, names("A"), world.boot.clone())
            .package(p1.clone())
            .method(Method::new(1, names("run"), names("()V"), 0x0001))
            .method(Method::new(2, names("idle"), names("()V"), 0x0001))
            .method(Method::new(3, names("lambda$0"), names("()V"), 0x1002).hidden(true))
            .build(),
    );
    assert!(klass.mark_method_used(&world.epoch, 1));
    assert!(klass.mark_method_used(&world.epoch, 3));

    let mut type_set = world.type_set();
    let mut out = writer(IntEncoding::Compressed);
    world.flush(&mut type_set, &mut out);
    let d = decode(&out);

    assert_eq!(d.class_ids(), vec![10]);
    let ids: Vec<u64> = d.methods.iter().map(|m| m.0).collect();
    assert_eq!(ids, vec![method_id(10, 1), method_id(10, 3)]);
    assert!(d.methods.iter().all(|m| m.1 == 10));
    assert!(!d.methods[0].4);
    assert!(d.methods[1].4);
    assert_eq!(d.symbol(d.methods[0].2), "run");
    assert_eq!(d.symbol(d.methods[0].3), "()V");
    assert_eq!(d.symbols.iter().filter(|(_, t)| t == "()V").count(), 1);
    assert!(!d.symbol_texts().contains(&"idle"));

    let mut again = writer(IntEncoding::Compressed);
    assert_eq!(world.flush(&mut type_set, &mut again), 0);
}

#[test]
fn test_hidden_class_named_by_trace_id() {
    let world = World::new();
    let p1 = world.package(100, "p1");
    let lambda = world.graph.add_class(
        Klass::builder(42, world.graph.intern("Lambda"), world.boot.clone())
            .package(p1)
            .hidden(true)
            .build(),
    );
    world.tag(&lambda);

    let mut type_set = world.type_set();
    let mut out = writer(IntEncoding::BigEndian);
    world.flush(&mut type_set, &mut out);
    let d = decode(&out);

    let (_, _, name, _, hidden) = d.classes[0];
    assert!(hidden);
    assert_eq!(d.symbol(name), "Lambda/42");
    assert!(!d.symbol_texts().contains(&"Lambda"));
}

#[test]
fn test_hidden_class_name_keeps_non_ascii_text() {
    for encoding in [IntEncoding::BigEndian, IntEncoding::Compressed] {
        let world = World::new();
        let p1 = world.package(100, "p1");
        let lambda = world.graph.add_class(
            Klass::builder(42, world.graph.intern("Café"), world.boot.clone())
                .package(p1)
                .hidden(true)
                .build(),
        );
        world.tag(&lambda);

        let mut type_set = world.type_set();
        let mut out = writer(encoding);
        world.flush(&mut type_set, &mut out);
        let d = decode(&out);
        assert_eq!(d.symbol(d.classes[0].2), "Café/42");
        assert_eq!(d.symbol(d.loaders[0].2), "bootstrap");
    }
}

#[test]
fn test_leak_profiler_method_subset() {
    let world = World::new();
    let p1 = world.package(100, "p1");
    let names = |s: &str| world.graph.intern(s);
    let klass = world.graph.add_class(
        Klass::builder(10, names("A"), world.boot.clone())
            .package(p1.clone())
            .method(Method::new(1, names("run"), names("()V"), 0x0001))
            .method(Method::new(2, names("retain"), names("(J)V"), 0x0001))
            .build(),
    );
    assert!(klass.mark_method_used(&world.epoch, 1));
    assert!(klass.mark_method_leakp(&world.epoch, 2));

    let mut type_set = world.type_set();
    let mut out = writer(IntEncoding::Compressed);
    let mut leak = writer(IntEncoding::Compressed);
    world.epoch.shift();
    type_set.serialize(&world.graph, &mut out, Some(&mut leak), CheckpointKind::Rotation);

    let main = decode(&out);
    let leak = decode(&leak);
    let main_ids: Vec<u64> = main.methods.iter().map(|m| m.0).collect();
    assert_eq!(main_ids, vec![method_id(10, 1), method_id(10, 2)]);

    assert_eq!(leak.methods.len(), 1);
    let (id, class, name, signature, hidden) = leak.methods[0];
    assert_eq!((id, class, hidden), (method_id(10, 2), 10, false));
    assert_eq!(leak.symbol(name), "retain");
    assert_eq!(leak.symbol(signature), "(J)V");
    assert_eq!(leak.class_ids(), vec![10]);
    assert_eq!(leak.symbol_texts(), vec!["(J)V", "A", "bootstrap", "p1", "retain"]);

    // Leak records share ids with the main stream
    let main_retain = main.methods.iter().find(|m| m.0 == id).unwrap();
    assert_eq!((main_retain.2, main_retain.3), (name, signature));
    assert!(klass.methods().iter().all(|m| m.tag().bits() == 0));
}

#[test]
fn test_anonymous_loader_is_never_written() {
    let world = World::new();
    let graph = &world.graph;
    let anon = graph.add_class_loader(ClassLoader::anonymous(7));
    let pkg = graph.add_package(Package::new(102, graph.intern("anon"), None, anon.clone(), true));
    let klass = graph.add_class(
        Klass::builder(20, graph.intern("Anon"), anon.clone())
            .package(pkg.clone())
            .build(),
    );
    world.tag(&klass);
    world.epoch.mark_leakp(klass.tag());

    let mut type_set = world.type_set();
    let mut out = writer(IntEncoding::BigEndian);
    let mut leak = writer(IntEncoding::BigEndian);
    world.epoch.shift();
    type_set.serialize(&world.graph, &mut out, Some(&mut leak), CheckpointKind::Rotation);

    for d in [decode(&out), decode(&leak)] {
        assert_eq!(d.classes.len(), 1);
        let (id, loader, name, package, _) = d.classes[0];
        assert_eq!((id, loader, package), (20, 0, 102));
        assert_eq!(d.symbol(name), "Anon");
        assert!(d.loaders.is_empty());
        assert!(d.modules.is_empty());
        assert_eq!(d.symbol_texts(), vec!["Anon", "anon"]);
    }
    // Leak propagation stops at the anonymous loader
    assert_eq!(anon.tag().bits(), 0);
}

#[test]
fn test_class_unload_rewrites_unloading_classes() {
    let world = World::new();
    let graph = &world.graph;
    let p1 = world.package(100, "p1");
    let loader_class = graph.add_class(
        Klass::builder(3, graph.intern("p1/AppLoader"), world.boot.clone())
            .package(p1.clone())
            .class_loader_subclass(true)
            .build(),
    );
    let app = graph.add_class_loader(ClassLoader::new(4, Some(graph.intern("app")), loader_class));
    let m_pkg = graph.add_package(Package::new(101, graph.intern("m"), None, app.clone(), true));
    let m = world.class(5, "m/Main", &m_pkg);
    world.tag(&m);

    let mut type_set = world.type_set();
    let mut first = writer(IntEncoding::BigEndian);
    world.flush(&mut type_set, &mut first);
    assert_eq!(decode(&first).class_ids(), vec![3, 5]);

    app.set_unloading();
    let mut unload = writer(IntEncoding::BigEndian);
    type_set.serialize(&world.graph, &mut unload, None, CheckpointKind::ClassUnload);
    let d = decode(&unload);

    // The loader class lives in the live bootstrap loader but is re-emitted
    assert_eq!(d.class_ids(), vec![5, 3]);
    assert_eq!(d.packages.iter().map(|p| p.0).collect::<Vec<_>>(), vec![101, 100]);
    assert_eq!(d.loaders.iter().map(|l| l.0).collect::<Vec<_>>(), vec![4, 1]);
    assert!(d.symbol_texts().contains(&"m/Main"));
    assert!(m.tag().is_set(world.epoch.this_epoch().used));
}

#[test]
fn test_class_unload_after_rotation_defines_loader_class() {
    let world = World::new();
    let graph = &world.graph;
    let p1 = world.package(100, "p1");
    let loader_class = graph.add_class(
        Klass::builder(3, graph.intern("p1/AppLoader"), world.boot.clone())
            .package(p1.clone())
            .class_loader_subclass(true)
            .build(),
    );
    let app = graph.add_class_loader(ClassLoader::new(4, Some(graph.intern("app")), loader_class));
    let m_pkg = graph.add_package(Package::new(101, graph.intern("m"), None, app.clone(), true));
    let m = world.class(5, "m/Main", &m_pkg);
    world.tag(&m);

    let mut type_set = world.type_set();
    let mut previous_chunk = writer(IntEncoding::Compressed);
    world.rotate(&mut type_set, &mut previous_chunk);
    assert_eq!(decode(&previous_chunk).class_ids(), vec![3, 5]);

    // New chunk: only the unload pass defines anything in it
    world.tag(&m);
    app.set_unloading();
    let mut unload = writer(IntEncoding::Compressed);
    type_set.serialize(&world.graph, &mut unload, None, CheckpointKind::ClassUnload);
    let d = decode(&unload);

    let classes: HashSet<u64> = d.classes.iter().map(|c| c.0).collect();
    let loaders: HashSet<u64> = d.loaders.iter().map(|l| l.0).collect();
    assert_eq!(classes, HashSet::from([3, 5]));
    assert_eq!(loaders, HashSet::from([1, 4]));
    for &(id, class, _) in &d.loaders {
        assert!(class == 0 || classes.contains(&class), "loader {id} references class {class}");
    }
    for &(_, loader, name, _, _) in &d.classes {
        assert!(loaders.contains(&loader));
        assert!(d.symbols.iter().any(|(sid, _)| *sid == name));
    }
    assert!(d.symbol_texts().contains(&"app"));
}
