//! # Otter Flight Type Set
//!
//! Checkpoint serialization of runtime metadata for the Otter flight recorder.
//!
//! ## Design
//!
//! - **Epochs**: application threads tag artifacts in the current epoch;
//!   rotations write and clear the previous one
//! - **Closure**: classes are discovered from tags, everything else is
//!   reached from them, so every referenced id is defined
//! - **Dedup**: a serialized bit per artifact keeps records unique within a
//!   chunk; a visited set keeps them unique within a checkpoint
//! - **Symbols**: names are interned while records are written and emitted last
//! - **Stages**: each category is written by a short pipeline of [`functor::Stage`]s

#![warn(clippy::all)]
#![warn(missing_docs)]
#![deny(unsafe_code)]

pub mod artifact;
pub mod artifact_set;
pub mod config;
pub mod epoch;
pub mod error;
pub mod functor;
pub mod graph;
pub mod manager;
pub mod predicate;
pub mod record;
pub mod serializer;
pub mod symbol_table;
pub mod type_set;
pub mod writer;

pub use artifact::{
    Artifact, ArtifactKind, ClassLoader, Klass, KlassBuilder, LoaderKind, Method, Module,
    Package, Symbol, TraceId, method_id,
};
pub use artifact_set::ArtifactSet;
pub use config::FlightConfig;
pub use epoch::{EpochBits, TraceEpoch, TraceTag};
pub use error::{FlightError, FlightResult};
pub use graph::{ClassGraph, MetadataGraph};
pub use manager::{CheckpointManager, CheckpointOutcome};
pub use serializer::{SerializerRegistry, TypeSerializer};
pub use symbol_table::{SymbolEntry, SymbolId, SymbolKind, SymbolTable};
pub use type_set::{CheckpointKind, PassCounts, TypeSet};

pub use otter_flight_chunk as chunk;
