//! Error types for Strata.

use thiserror::Error;

use crate::coords::ChunkCoord;

/// World and chunk errors.
#[derive(Debug, Error)]
pub enum WorldError {
    /// Chunk not found in persistent storage
    #[error("chunk not found at {0}")]
    ChunkNotFound(ChunkCoord),

    /// Chunk load failed
    #[error("failed to load chunk {coord}: {message}")]
    LoadFailed {
        /// Coordinate of the chunk
        coord: ChunkCoord,
        /// Failure description
        message: String,
    },

    /// Chunk store failed
    #[error("failed to store chunk {coord}: {message}")]
    StoreFailed {
        /// Coordinate of the chunk
        coord: ChunkCoord,
        /// Failure description
        message: String,
    },

    /// Invalid or corrupt chunk data
    #[error("invalid chunk data: {0}")]
    InvalidData(String),

    /// IO errors
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}
