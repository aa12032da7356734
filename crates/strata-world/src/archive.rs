//! Archive and world-source contracts.
//!
//! The archive is the persistent chunk store and the world source supplies
//! chunks the archive has no record of. Both are invoked only from the
//! pipeline's worker thread and may block. Payload formats are the
//! implementor's business; the contracts operate in place on pooled chunks
//! so steady-state operation allocates nothing.

use std::sync::Arc;

use ahash::AHashMap;
use parking_lot::{Mutex, MutexGuard};

use strata_common::{BlockCoord, ChunkCoord, WorldError};

use crate::chunk::{BlockId, Chunk, AIR, CHUNK_VOLUME, CHUNK_WIDTH};

/// Persistent chunk storage.
pub trait ChunkArchive: Send {
    /// Fills `chunk` from storage, keyed by its coordinate, and marks it
    /// initialized. Returns `Ok(false)` when no record exists; corrupt
    /// records should be reported as an error and are treated as absent.
    fn load_into(&mut self, chunk: &mut Chunk) -> Result<bool, WorldError>;

    /// Persists the chunk's block data, keyed by its coordinate.
    fn store(&mut self, chunk: &Chunk) -> Result<(), WorldError>;
}

/// Chunk generator consulted when the archive has no record.
pub trait WorldSource: Send {
    /// Fills `chunk` for its coordinate and marks it initialized.
    ///
    /// Must be deterministic for a given coordinate and seed.
    fn generate_into(&mut self, chunk: &mut Chunk);
}

/// Shared state behind a [`MemoryArchive`] handle.
#[derive(Default)]
struct MemoryArchiveState {
    entries: AHashMap<ChunkCoord, Box<[BlockId]>>,
    loads: u64,
    stores: u64,
}

/// In-memory archive keeping block snapshots per coordinate.
///
/// Clones share the same storage, so a handle kept outside the pipeline
/// can observe what the worker persisted.
#[derive(Clone, Default)]
pub struct MemoryArchive {
    state: Arc<Mutex<MemoryArchiveState>>,
}

impl MemoryArchive {
    /// Creates an empty in-memory archive.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns whether a record exists for the coordinate.
    #[must_use]
    pub fn contains(&self, coord: ChunkCoord) -> bool {
        self.state.lock().entries.contains_key(&coord)
    }

    /// Returns the stored block snapshot for a coordinate, if any.
    #[must_use]
    pub fn snapshot(&self, coord: ChunkCoord) -> Option<Box<[BlockId]>> {
        self.state.lock().entries.get(&coord).cloned()
    }

    /// Seeds a record directly, bypassing the pipeline.
    ///
    /// # Panics
    /// Panics if `blocks` is not exactly [`CHUNK_VOLUME`] entries.
    pub fn insert(&self, coord: ChunkCoord, blocks: &[BlockId]) {
        assert_eq!(blocks.len(), CHUNK_VOLUME, "block data must fill a chunk");
        self.state.lock().entries.insert(coord, blocks.into());
    }

    /// Number of load probes served (hits and misses).
    #[must_use]
    pub fn load_count(&self) -> u64 {
        self.state.lock().loads
    }

    /// Number of store operations performed.
    #[must_use]
    pub fn store_count(&self) -> u64 {
        self.state.lock().stores
    }

    /// Stalls all archive operations until the returned guard is dropped.
    ///
    /// Lets tests hold the worker mid-operation to exercise queue
    /// backpressure.
    #[must_use]
    pub fn pause(&self) -> ArchivePause<'_> {
        ArchivePause(self.state.lock())
    }
}

/// Guard returned by [`MemoryArchive::pause`]; archive operations block
/// while it is held.
pub struct ArchivePause<'a>(#[allow(dead_code)] MutexGuard<'a, MemoryArchiveState>);

impl ChunkArchive for MemoryArchive {
    fn load_into(&mut self, chunk: &mut Chunk) -> Result<bool, WorldError> {
        let mut state = self.state.lock();
        state.loads += 1;
        match state.entries.get(&chunk.coord()) {
            Some(blocks) => {
                chunk.init_blocks(blocks);
                Ok(true)
            }
            None => Ok(false),
        }
    }

    fn store(&mut self, chunk: &Chunk) -> Result<(), WorldError> {
        let mut state = self.state.lock();
        state.stores += 1;
        state.entries.insert(chunk.coord(), chunk.blocks().into());
        Ok(())
    }
}

/// The block type produced by [`FlatWorldSource`] below ground level.
pub const STONE: BlockId = 1;

/// World source producing a flat world: solid below a ground plane,
/// air above.
#[derive(Debug, Clone, Copy)]
pub struct FlatWorldSource {
    /// World-space z of the first air layer.
    ground_height: i64,
}

impl FlatWorldSource {
    /// Creates a flat world source with the given ground height.
    #[must_use]
    pub const fn new(ground_height: i64) -> Self {
        Self { ground_height }
    }
}

impl WorldSource for FlatWorldSource {
    fn generate_into(&mut self, chunk: &mut Chunk) {
        let origin: BlockCoord = chunk.coord().to_block_coord(CHUNK_WIDTH);
        let width = CHUNK_WIDTH as usize;
        let mut index = 0;
        for z in 0..width {
            let world_z = origin.z + z as i64;
            let ty = if world_z < self.ground_height { STONE } else { AIR };
            for _ in 0..width * width {
                chunk.init_block(index, ty);
                index += 1;
            }
        }
        chunk.mark_initialized();
    }
}

#[cfg(test)]
mod tests {
    use strata_common::LocalCoord;

    use super::*;

    #[test]
    fn test_memory_archive_round_trip() {
        let archive = MemoryArchive::new();
        let mut worker_side = archive.clone();

        let mut chunk = Chunk::new();
        chunk.set_coord(ChunkCoord::new(1, 2, 3));
        chunk.init_blocks(&[7; CHUNK_VOLUME]);
        worker_side.store(&chunk).expect("store");

        let mut loaded = Chunk::new();
        loaded.set_coord(ChunkCoord::new(1, 2, 3));
        assert!(worker_side.load_into(&mut loaded).expect("load"));
        assert!(loaded.is_initialized());
        assert_eq!(loaded.blocks(), chunk.blocks());

        assert!(archive.contains(ChunkCoord::new(1, 2, 3)));
        assert_eq!(archive.store_count(), 1);
        assert_eq!(archive.load_count(), 1);
    }

    #[test]
    fn test_memory_archive_miss() {
        let mut archive = MemoryArchive::new();
        let mut chunk = Chunk::new();
        chunk.set_coord(ChunkCoord::new(9, 9, 9));
        assert!(!archive.load_into(&mut chunk).expect("load"));
        assert!(!chunk.is_initialized());
    }

    #[test]
    fn test_flat_world_source() {
        let mut source = FlatWorldSource::new(8);

        // Chunk at z=0 spans world z 0..32; layers below 8 are stone.
        let mut chunk = Chunk::new();
        source.generate_into(&mut chunk);
        assert!(chunk.is_initialized());
        assert_eq!(chunk.get_block(LocalCoord::new(0, 0, 7)), STONE);
        assert_eq!(chunk.get_block(LocalCoord::new(0, 0, 8)), AIR);

        // Chunk at z=-1 is entirely below ground.
        let mut below = Chunk::new();
        below.set_coord(ChunkCoord::new(0, 0, -1));
        source.generate_into(&mut below);
        assert!(below.blocks().iter().all(|&b| b == STONE));

        // Determinism for a given coordinate.
        let mut again = Chunk::new();
        source.generate_into(&mut again);
        assert_eq!(again.blocks(), chunk.blocks());
    }
}
