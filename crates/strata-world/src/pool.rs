//! Fixed-capacity chunk pool.
//!
//! All chunk instances are preallocated here; the cache and the archive
//! pipeline move them around by value and hand them back through
//! [`ChunkPool::release`]. An empty pool is a backpressure signal for the
//! manager, not an error.

use tracing::info;

use crate::chunk::Chunk;

/// Default number of preallocated chunks.
pub const DEFAULT_POOL_CAPACITY: usize = 1024;

/// Fixed-capacity collection of reusable chunk instances.
pub struct ChunkPool {
    /// Free chunks ready to be handed out.
    free: Vec<Chunk>,
    /// Total number of chunks this pool was created with.
    capacity: usize,
}

impl ChunkPool {
    /// Creates a pool with `capacity` preallocated chunks.
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        info!("Preallocating chunk pool with capacity {}", capacity);
        Self {
            free: (0..capacity).map(|_| Chunk::new()).collect(),
            capacity,
        }
    }

    /// Removes and returns a free chunk, or `None` when the pool is
    /// exhausted.
    pub fn acquire(&mut self) -> Option<Chunk> {
        self.free.pop()
    }

    /// Resets a chunk and returns it to the free set.
    ///
    /// # Panics
    /// Panics if more chunks are released than the pool ever handed out.
    pub fn release(&mut self, mut chunk: Chunk) {
        assert!(
            self.free.len() < self.capacity,
            "released more chunks than the pool owns"
        );
        chunk.reset();
        self.free.push(chunk);
    }

    /// Returns the configured capacity.
    #[must_use]
    pub const fn capacity(&self) -> usize {
        self.capacity
    }

    /// Returns the number of free chunks.
    #[must_use]
    pub fn available(&self) -> usize {
        self.free.len()
    }

    /// Returns the number of chunks currently handed out.
    #[must_use]
    pub fn outstanding(&self) -> usize {
        self.capacity - self.free.len()
    }

    /// Returns whether the pool has no free chunks.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.free.is_empty()
    }
}

impl std::fmt::Debug for ChunkPool {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ChunkPool")
            .field("capacity", &self.capacity)
            .field("available", &self.free.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use strata_common::{ChunkCoord, LocalCoord};

    use super::*;

    #[test]
    fn test_pool_hands_out_capacity_chunks() {
        let mut pool = ChunkPool::new(3);
        assert_eq!(pool.capacity(), 3);
        assert_eq!(pool.available(), 3);

        let a = pool.acquire().expect("chunk");
        let b = pool.acquire().expect("chunk");
        let c = pool.acquire().expect("chunk");
        assert!(pool.is_empty());
        assert_eq!(pool.outstanding(), 3);
        assert!(pool.acquire().is_none());

        pool.release(a);
        pool.release(b);
        pool.release(c);
        assert_eq!(pool.available(), 3);
    }

    #[test]
    fn test_release_resets_chunk() {
        let mut pool = ChunkPool::new(1);
        let mut chunk = pool.acquire().expect("chunk");
        chunk.set_coord(ChunkCoord::new(7, 8, 9));
        chunk.set_block(LocalCoord::new(0, 0, 0), 5);
        chunk.mark_initialized();
        pool.release(chunk);

        let chunk = pool.acquire().expect("chunk");
        assert_eq!(chunk.coord(), ChunkCoord::ORIGIN);
        assert_eq!(chunk.revision(), 0);
        assert!(!chunk.is_initialized());
    }

    #[test]
    #[should_panic(expected = "released more chunks than the pool owns")]
    fn test_over_release_panics() {
        let mut pool = ChunkPool::new(1);
        pool.release(Chunk::new());
    }
}
