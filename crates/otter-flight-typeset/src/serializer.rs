//! User-registered constant serializers
//!
//! Constant pools outside the type set (thread states, GC causes, ...) are
//! written by serializers registered once per type id and emitted together
//! as a statics checkpoint at the start of every chunk.

use otter_flight_chunk::{CheckpointWriter, IntEncoding, types};
use parking_lot::Mutex;

use crate::error::{FlightError, FlightResult};

/// Writer of one constant type
pub trait TypeSerializer: Send {
    /// Write the records of this type, returning how many were written
    fn serialize(&mut self, writer: &mut CheckpointWriter) -> u32;
}

impl<F> TypeSerializer for F
where
    F: FnMut(&mut CheckpointWriter) -> u32 + Send,
{
    fn serialize(&mut self, writer: &mut CheckpointWriter) -> u32 {
        self(writer)
    }
}

struct CachedPayload {
    encoding: IntEncoding,
    count: u32,
    bytes: Vec<u8>,
}

struct Registration {
    type_id: u64,
    permit_cache: bool,
    serializer: Box<dyn TypeSerializer>,
    cache: Option<CachedPayload>,
}

impl Registration {
    fn write(&mut self, writer: &mut CheckpointWriter) -> bool {
        if let Some(cached) = &self.cache
            && cached.encoding == writer.encoding()
        {
            writer.append_type(self.type_id, cached.count, &cached.bytes);
            return cached.count > 0;
        }

        let mut records = CheckpointWriter::new(writer.encoding());
        let count = self.serializer.serialize(&mut records);
        writer.append_type(self.type_id, count, records.as_bytes());
        if self.permit_cache {
            self.cache = Some(CachedPayload {
                encoding: writer.encoding(),
                count,
                bytes: records.into_bytes(),
            });
        }
        count > 0
    }
}

/// Registry of constant serializers keyed by type id
#[derive(Default)]
pub struct SerializerRegistry {
    entries: Mutex<Vec<Registration>>,
}

impl std::fmt::Debug for SerializerRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let ids: Vec<u64> = self.entries.lock().iter().map(|e| e.type_id).collect();
        f.debug_struct("SerializerRegistry")
            .field("type_ids", &ids)
            .finish()
    }
}

impl SerializerRegistry {
    /// Create an empty registry
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `serializer` for `type_id`
    ///
    /// With `permit_cache`, the first payload is reused for later chunks of
    /// the same encoding. Ids of the type-set categories and ids already
    /// registered are rejected, and the serializer is dropped.
    pub fn register(
        &self,
        type_id: u64,
        permit_cache: bool,
        serializer: Box<dyn TypeSerializer>,
    ) -> FlightResult<()> {
        if (types::TYPE_CLASS..=types::TYPE_MODULE).contains(&type_id) {
            return Err(FlightError::ReservedType(type_id));
        }
        let mut entries = self.entries.lock();
        if entries.iter().any(|e| e.type_id == type_id) {
            return Err(FlightError::DuplicateSerializer(type_id));
        }
        entries.push(Registration {
            type_id,
            permit_cache,
            serializer,
            cache: None,
        });
        tracing::debug!(target: "otter::flight", type_id, permit_cache, "serializer registered");
        Ok(())
    }

    /// Check if a serializer is registered for `type_id`
    pub fn contains(&self, type_id: u64) -> bool {
        self.entries.lock().iter().any(|e| e.type_id == type_id)
    }

    /// Number of registered serializers
    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    /// Check if nothing is registered
    pub fn is_empty(&self) -> bool {
        self.entries.lock().is_empty()
    }

    /// Write every registered type in registration order
    ///
    /// Returns the number of non-empty type blocks written.
    pub fn write_types(&self, writer: &mut CheckpointWriter) -> u32 {
        let mut written = 0;
        for entry in self.entries.lock().iter_mut() {
            if entry.write(writer) {
                written += 1;
            }
        }
        written
    }

    /// Drop cached payloads
    pub fn invalidate_cache(&self) {
        for entry in self.entries.lock().iter_mut() {
            entry.cache = None;
        }
    }
}
