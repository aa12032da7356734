//! # Strata World
//!
//! Chunk streaming core: moves a 3-D voxel world between persistent
//! storage, a world generator, and the live simulation in fixed-size
//! cubic chunks, while keeping at most a bounded pool of chunk objects
//! resident.
//!
//! ## Architecture
//!
//! - [`chunk::Chunk`] owns a flat block array and its derived set of
//!   visible boundary faces with ambient-occlusion corner masks.
//! - [`pool::ChunkPool`] preallocates every chunk instance; steady-state
//!   operation never heap-allocates chunks.
//! - [`archive::ChunkArchive`] and [`archive::WorldSource`] are the
//!   external collaborators for persistence and generation, invoked only
//!   from the worker thread.
//! - [`pipeline::RequestPipeline`] is a pair of bounded queues plus the
//!   worker; chunk ownership moves with each queued operation and a full
//!   queue is the backpressure signal.
//! - [`manager::ChunkManager`] owns the cache and the need-counter table
//!   on the main thread, decides store-vs-discard on eviction by
//!   comparing revisions, and advances the queues once per tick.
//! - [`streaming::ChunkStreamer`] drives the manager's reference counts
//!   from a moving center position.
//!
//! ## Concurrency
//!
//! Two threads of control: the main/tick thread owns all cache state and
//! the pool; the worker owns the archive and world source and executes
//! one operation at a time. Nothing is shared by reference across the
//! boundary.

#![warn(missing_docs)]
#![warn(clippy::all)]
#![deny(clippy::unwrap_used)]

pub mod archive;
pub mod chunk;
pub mod manager;
pub mod pipeline;
pub mod pool;
pub mod streaming;

/// Prelude for convenient imports
pub mod prelude {
    pub use crate::archive::*;
    pub use crate::chunk::*;
    pub use crate::manager::*;
    pub use crate::pipeline::*;
    pub use crate::pool::*;
    pub use crate::streaming::*;
}

pub use prelude::*;
