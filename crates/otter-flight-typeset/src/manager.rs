//! Checkpoint manager
//!
//! Owns the process-wide trace epoch, the type set and the serializer
//! registry, and turns recorder events (rotation, flush, class unload) into
//! checkpoint events in a chunk. All type-set work is serialized behind one
//! lock; application threads only touch the epoch and artifact tag words.

use std::path::Path;
use std::sync::Arc;

use otter_flight_chunk::{CheckpointFlags, CheckpointWriter, ChunkWriter};
use parking_lot::Mutex;

use crate::config::FlightConfig;
use crate::epoch::TraceEpoch;
use crate::error::FlightResult;
use crate::graph::ClassGraph;
use crate::serializer::{SerializerRegistry, TypeSerializer};
use crate::type_set::{CheckpointKind, TypeSet};

/// Result of writing one type-set checkpoint
#[derive(Debug)]
pub struct CheckpointOutcome {
    /// Id of the checkpoint; symbol ids it defines carry it in their upper bits
    pub checkpoint_id: u64,
    /// Records written to the chunk
    pub records: usize,
    /// Offset of the checkpoint event, if one was written
    pub offset: Option<u64>,
    /// Leak-profiler subset, when enabled and non-empty
    pub leak_checkpoint: Option<CheckpointWriter>,
}

/// Process-wide checkpoint producer
#[derive(Debug)]
pub struct CheckpointManager {
    config: FlightConfig,
    epoch: Arc<TraceEpoch>,
    type_set: Mutex<TypeSet>,
    serializers: SerializerRegistry,
}

impl CheckpointManager {
    /// Create a manager with a fresh epoch
    pub fn new(config: FlightConfig) -> Self {
        let epoch = Arc::new(TraceEpoch::new());
        Self {
            config,
            type_set: Mutex::new(TypeSet::new(Arc::clone(&epoch))),
            epoch,
            serializers: SerializerRegistry::new(),
        }
    }

    /// Active configuration
    pub fn config(&self) -> &FlightConfig {
        &self.config
    }

    /// Epoch application threads tag artifacts with
    pub fn epoch(&self) -> &Arc<TraceEpoch> {
        &self.epoch
    }

    /// Id of the last type-set checkpoint
    pub fn checkpoint_id(&self) -> u64 {
        self.type_set.lock().checkpoint_id()
    }

    /// Register a constant serializer; see [`SerializerRegistry::register`]
    pub fn register_serializer(
        &self,
        type_id: u64,
        permit_cache: bool,
        serializer: Box<dyn TypeSerializer>,
    ) -> FlightResult<()> {
        self.serializers.register(type_id, permit_cache, serializer)
    }

    /// Open a chunk at `path` and write the static constant types into it
    pub fn create_chunk(&self, path: impl AsRef<Path>) -> FlightResult<ChunkWriter> {
        let mut chunk = ChunkWriter::create(path, self.config.chunk_options())?;
        self.write_static_types(&mut chunk)?;
        Ok(chunk)
    }

    /// Write registered constant types as a statics checkpoint
    pub fn write_static_types(&self, chunk: &mut ChunkWriter) -> FlightResult<Option<u64>> {
        let mut writer = CheckpointWriter::new(chunk.encoding());
        if self.serializers.write_types(&mut writer) == 0 {
            return Ok(None);
        }
        Ok(chunk.write_checkpoint(&writer, CheckpointFlags::STATICS)?)
    }

    /// Shift the epoch and write everything tagged before the shift
    ///
    /// `chunk` is the chunk being completed; the caller closes it afterwards.
    pub fn rotate(
        &self,
        graph: &dyn ClassGraph,
        chunk: &mut ChunkWriter,
    ) -> FlightResult<CheckpointOutcome> {
        let outcome = self.write_type_set(
            graph,
            chunk,
            CheckpointKind::Rotation,
            CheckpointFlags::GENERIC,
        )?;
        tracing::info!(
            target: "otter::flight",
            checkpoint_id = outcome.checkpoint_id,
            records = outcome.records,
            epoch = self.epoch.current(),
            "chunk rotated"
        );
        Ok(outcome)
    }

    /// Write what was tagged in the current epoch and flush the chunk
    pub fn flush(
        &self,
        graph: &dyn ClassGraph,
        chunk: &mut ChunkWriter,
    ) -> FlightResult<CheckpointOutcome> {
        let outcome = self.write_type_set(
            graph,
            chunk,
            CheckpointKind::Flushpoint,
            CheckpointFlags::FLUSH,
        )?;
        chunk.flush()?;
        Ok(outcome)
    }

    /// Write tagged classes of unloading loaders before they disappear
    pub fn write_unloading(
        &self,
        graph: &dyn ClassGraph,
        chunk: &mut ChunkWriter,
    ) -> FlightResult<CheckpointOutcome> {
        self.write_type_set(
            graph,
            chunk,
            CheckpointKind::ClassUnload,
            CheckpointFlags::GENERIC,
        )
    }

    fn write_type_set(
        &self,
        graph: &dyn ClassGraph,
        chunk: &mut ChunkWriter,
        kind: CheckpointKind,
        flags: CheckpointFlags,
    ) -> FlightResult<CheckpointOutcome> {
        let encoding = chunk.encoding();
        let mut writer = CheckpointWriter::with_capacity(encoding, self.config.checkpoint_capacity);
        let mut leakp = self
            .config
            .leak_profiler
            .then(|| CheckpointWriter::new(encoding));

        let (checkpoint_id, records) = {
            let mut type_set = self.type_set.lock();
            if kind.is_rotation() {
                self.epoch.shift();
            }
            let records = type_set.serialize(graph, &mut writer, leakp.as_mut(), kind);
            (type_set.checkpoint_id(), records)
        };

        let offset = if writer.is_empty() {
            None
        } else {
            chunk.write_checkpoint(&writer, flags)?
        };
        Ok(CheckpointOutcome {
            checkpoint_id,
            records,
            offset,
            leak_checkpoint: leakp.filter(|w| !w.is_empty()),
        })
    }
}
