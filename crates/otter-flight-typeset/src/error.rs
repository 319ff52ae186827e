//! Error types for otter-flight-typeset

use thiserror::Error;

pub use otter_flight_chunk::ChunkError;

/// Errors that can occur while producing checkpoints
#[derive(Error, Debug)]
pub enum FlightError {
    /// Chunk sink error
    #[error(transparent)]
    Chunk(#[from] ChunkError),

    /// A serializer is already registered for this type id
    #[error("Serializer already registered for type {0}")]
    DuplicateSerializer(u64),

    /// Type id collides with a built-in type-set category
    #[error("Type id {0} is reserved for type-set records")]
    ReservedType(u64),

    /// Configuration could not be parsed
    #[error("Invalid configuration: {0}")]
    Config(#[from] serde_json::Error),

    /// Configuration file could not be read
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type alias for type-set operations
pub type FlightResult<T> = Result<T, FlightError>;
