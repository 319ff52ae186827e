//! Checkpoint manager tests
//!
//! These drive the manager against real chunk files.

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use otter_flight_chunk::header::HEADER_SIZE;
use otter_flight_chunk::{
    CheckpointFlags, CheckpointWriter, ChunkHeader, EVENT_CHECKPOINT, IntEncoding, RecordReader,
    types,
};
use otter_flight_typeset::{
    Artifact, CheckpointManager, ClassLoader, FlightConfig, FlightError, Klass, MetadataGraph,
    Package,
};

fn populate(graph: &MetadataGraph) -> Arc<Klass> {
    let boot = graph.add_class_loader(ClassLoader::bootstrap(1));
    let p1 = graph.add_package(Package::new(100, graph.intern("p1"), None, boot.clone(), true));
    graph.add_class(
        Klass::builder(10, graph.intern("A"), boot)
            .package(p1)
            .build(),
    )
}

/// Event header fields up to the type count: (size, type, flags, type count)
fn read_event(bytes: &[u8], offset: u64, encoding: IntEncoding) -> (u64, u64, u8, u32) {
    let mut reader = RecordReader::new(&bytes[offset as usize..], encoding);
    let size = reader.read_u32().unwrap() as u64;
    let event_type = reader.read_u64().unwrap();
    let _start_ticks = reader.read_u64().unwrap();
    let _duration = reader.read_u64().unwrap();
    let _delta = reader.read_i64().unwrap();
    let flags = reader.read_u8().unwrap();
    let type_count = reader.read_u32().unwrap();
    (size, event_type, flags, type_count)
}

#[test]
fn test_rotate_writes_previous_epoch_into_chunk() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("rotate.chunk");
    let manager = CheckpointManager::new(FlightConfig::default());
    let graph = MetadataGraph::new();
    let a = populate(&graph);

    let mut chunk = manager.create_chunk(&path).unwrap();
    manager.epoch().mark_used(a.tag());

    let outcome = manager.rotate(&graph, &mut chunk).unwrap();
    assert_eq!(outcome.checkpoint_id, 1);
    assert_eq!(outcome.records, 6);
    assert!(outcome.leak_checkpoint.is_none());
    let offset = outcome.offset.unwrap();
    assert_eq!(offset, HEADER_SIZE as u64);
    assert_eq!(manager.epoch().current(), 1);
    assert_eq!(a.tag().bits(), 0);

    let header = chunk.close().unwrap().unwrap();
    assert_eq!(header.last_checkpoint, offset);

    let bytes = std::fs::read(&path).unwrap();
    assert_eq!(ChunkHeader::decode(&bytes).unwrap().last_checkpoint, offset);
    let (size, event_type, flags, type_count) =
        read_event(&bytes, offset, IntEncoding::Compressed);
    assert_eq!(offset + size, bytes.len() as u64);
    assert_eq!(event_type, EVENT_CHECKPOINT);
    assert_eq!(flags, CheckpointFlags::GENERIC.bits());
    // classes, packages, class loaders, symbols
    assert_eq!(type_count, 4);
}

#[test]
fn test_flush_writes_flush_checkpoint_and_header() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("flush.chunk");
    let manager = CheckpointManager::new(FlightConfig::uncompressed());
    let graph = MetadataGraph::new();
    let a = populate(&graph);

    let mut chunk = manager.create_chunk(&path).unwrap();
    manager.epoch().mark_used(a.tag());
    let outcome = manager.flush(&graph, &mut chunk).unwrap();
    let offset = outcome.offset.unwrap();

    // Flush rewrote the header in place
    let bytes = std::fs::read(&path).unwrap();
    let header = ChunkHeader::decode(&bytes).unwrap();
    assert_eq!(header.size, bytes.len() as u64);
    assert_eq!(header.last_checkpoint, offset);
    let (_, _, flags, _) = read_event(&bytes, offset, IntEncoding::BigEndian);
    assert_eq!(flags, CheckpointFlags::FLUSH.bits());

    // Tags survive a flush, and nothing new means no event
    assert!(a.tag().is_set(manager.epoch().this_epoch().used));
    let again = manager.flush(&graph, &mut chunk).unwrap();
    assert_eq!(again.records, 0);
    assert!(again.offset.is_none());
    assert_eq!(manager.checkpoint_id(), 2);
}

#[test]
fn test_static_types_open_every_chunk() {
    let dir = tempfile::tempdir().unwrap();
    let manager = CheckpointManager::new(FlightConfig::default());
    let calls = Arc::new(AtomicUsize::new(0));
    let counter = Arc::clone(&calls);
    manager
        .register_serializer(
            types::FIRST_USER_TYPE,
            true,
            Box::new(move |writer: &mut CheckpointWriter| {
                counter.fetch_add(1, Ordering::SeqCst);
                for (id, name) in [(0u64, "NEW"), (1, "RUNNABLE")] {
                    writer.write_u64(id);
                    writer.write_utf8(Some(name));
                }
                2u32
            }),
        )
        .unwrap();

    for name in ["one.chunk", "two.chunk"] {
        let path = dir.path().join(name);
        let chunk = manager.create_chunk(&path).unwrap();
        assert_eq!(chunk.header().last_checkpoint, HEADER_SIZE as u64);
        chunk.close().unwrap();

        let bytes = std::fs::read(&path).unwrap();
        let (_, event_type, flags, type_count) =
            read_event(&bytes, HEADER_SIZE as u64, IntEncoding::Compressed);
        assert_eq!(event_type, EVENT_CHECKPOINT);
        assert_eq!(flags, CheckpointFlags::STATICS.bits());
        assert_eq!(type_count, 1);
    }

    // Cached after the first chunk
    assert_eq!(calls.load(Ordering::SeqCst), 1);
}

#[test]
fn test_duplicate_serializer_rejected() {
    let manager = CheckpointManager::new(FlightConfig::default());
    let register = |id| {
        manager.register_serializer(id, false, Box::new(|_: &mut CheckpointWriter| 0u32))
    };

    assert!(register(types::FIRST_USER_TYPE).is_ok());
    assert!(matches!(
        register(types::FIRST_USER_TYPE),
        Err(FlightError::DuplicateSerializer(id)) if id == types::FIRST_USER_TYPE
    ));
    assert!(matches!(
        register(types::TYPE_CLASS),
        Err(FlightError::ReservedType(_))
    ));
}

#[test]
fn test_leak_profiler_checkpoint() {
    let dir = tempfile::tempdir().unwrap();
    let manager = CheckpointManager::new(FlightConfig::with_leak_profiler());
    let graph = MetadataGraph::new();
    let a = populate(&graph);
    let mut chunk = manager.create_chunk(dir.path().join("leak.chunk")).unwrap();

    manager.epoch().mark_used(a.tag());
    manager.epoch().mark_leakp(a.tag());
    let outcome = manager.rotate(&graph, &mut chunk).unwrap();

    let leak = outcome.leak_checkpoint.unwrap();
    assert_eq!(leak.encoding(), IntEncoding::Compressed);
    let mut reader = RecordReader::new(leak.as_bytes(), leak.encoding());
    assert_eq!(reader.read_type_header().unwrap(), (types::TYPE_CLASS, 1));
    assert_eq!(reader.read_u64().unwrap(), 10);
}

#[test]
fn test_write_unloading_only_sees_unloading_classes() {
    let dir = tempfile::tempdir().unwrap();
    let manager = CheckpointManager::new(FlightConfig::default());
    let graph = MetadataGraph::new();
    let a = populate(&graph);
    let mut chunk = manager.create_chunk(dir.path().join("unload.chunk")).unwrap();
    manager.epoch().mark_used(a.tag());

    // Bootstrap classes never unload
    let outcome = manager.write_unloading(&graph, &mut chunk).unwrap();
    assert_eq!(outcome.records, 0);
    assert!(outcome.offset.is_none());
}

#[test]
fn test_config_from_file() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("flight.json");
    std::fs::write(&path, r#"{"compressedIntegers": false, "checkpointCapacity": 512}"#).unwrap();

    let config = FlightConfig::from_file(&path).unwrap();
    assert_eq!(config.encoding(), IntEncoding::BigEndian);
    assert_eq!(config.checkpoint_capacity, 512);
    assert!(!config.leak_profiler);

    assert!(matches!(
        FlightConfig::from_file(dir.path().join("missing.json")),
        Err(FlightError::Io(_))
    ));
}
