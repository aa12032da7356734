//! Chunk cache and lifecycle management.
//!
//! The manager owns the chunk cache, the need-counter table, and the pool,
//! all touched only from the main thread; archive I/O and generation run on
//! the pipeline's worker. A coordinate is resident exactly while at least
//! one consumer holds a reference to it; when the last reference is
//! released the chunk is persisted if its revision changed since load and
//! recycled otherwise.

use std::collections::VecDeque;

use ahash::AHashMap;
use tracing::{debug, info, warn};

use strata_common::{ChunkCoord, LocalCoord};

use crate::archive::{ChunkArchive, WorldSource};
use crate::chunk::{BlockId, Chunk};
use crate::pipeline::{ArchiveRequest, ArchiveResult, LoadOrigin, RequestPipeline, QUEUE_CAPACITY};
use crate::pool::ChunkPool;

/// Orchestrates chunk loading, reference counting, eviction, and
/// persistence across the archive worker.
pub struct ChunkManager {
    /// Resident chunks; membership is the single source of truth for
    /// "chunk resident".
    cache: AHashMap<ChunkCoord, Chunk>,
    /// Outstanding reference counts per coordinate.
    need_counter: AHashMap<ChunkCoord, u32>,
    /// Revision at load time, recorded only for chunks that came from
    /// the archive. Absence means the chunk was generated and must be
    /// persisted on eviction.
    old_revisions: AHashMap<ChunkCoord, u32>,
    /// Coordinates waiting for a pool chunk and queue capacity.
    requested: VecDeque<ChunkCoord>,
    /// Evicted chunks waiting for queue capacity to be stored.
    pre_store: VecDeque<Chunk>,
    /// Preallocated chunk instances.
    pool: ChunkPool,
    /// Queues plus worker performing archive I/O and generation.
    pipeline: RequestPipeline,
    /// Chunks served from the archive this session.
    session_loads: u64,
    /// Chunks generated on archive miss this session.
    session_gens: u64,
    /// Chunks persisted this session.
    session_stores: u64,
}

impl ChunkManager {
    /// Creates a manager with a preallocated pool and spawns the archive
    /// worker.
    #[must_use]
    pub fn new(
        pool_capacity: usize,
        archive: impl ChunkArchive + 'static,
        source: impl WorldSource + 'static,
    ) -> Self {
        info!(
            "Creating chunk manager with pool capacity {}, queue capacity {}",
            pool_capacity, QUEUE_CAPACITY
        );
        Self {
            cache: AHashMap::new(),
            need_counter: AHashMap::new(),
            old_revisions: AHashMap::new(),
            requested: VecDeque::new(),
            pre_store: VecDeque::new(),
            pool: ChunkPool::new(pool_capacity),
            pipeline: RequestPipeline::spawn(Box::new(archive), Box::new(source), QUEUE_CAPACITY),
            session_loads: 0,
            session_gens: 0,
            session_stores: 0,
        }
    }

    /// Registers interest in a coordinate.
    ///
    /// The first request queues a load; further requests only increment
    /// the reference count and never issue new I/O.
    pub fn request_chunk(&mut self, coord: ChunkCoord) {
        match self.need_counter.entry(coord) {
            std::collections::hash_map::Entry::Occupied(mut entry) => {
                *entry.get_mut() += 1;
            }
            std::collections::hash_map::Entry::Vacant(entry) => {
                entry.insert(1);
                self.requested.push_back(coord);
            }
        }
    }

    /// Releases one reference to a coordinate.
    ///
    /// When the count reaches zero the chunk is evicted: persisted if its
    /// revision changed since load (or it was generated), recycled
    /// directly otherwise.
    ///
    /// # Panics
    /// Panics if the coordinate has no outstanding reference; that is a
    /// reference-counting bug in the caller.
    pub fn release_chunk(&mut self, coord: ChunkCoord) {
        let count = self
            .need_counter
            .get_mut(&coord)
            .unwrap_or_else(|| panic!("release_chunk: no outstanding request for {coord}"));
        *count -= 1;
        if *count > 0 {
            return;
        }
        self.need_counter.remove(&coord);

        let Some(chunk) = self.cache.remove(&coord) else {
            // Not resident yet; an in-flight or queued load will be
            // recycled when its result arrives.
            return;
        };
        let old_revision = self.old_revisions.remove(&coord);
        if old_revision == Some(chunk.revision()) {
            debug!("Evicting unmodified chunk {}", coord);
            self.pool.release(chunk);
        } else {
            debug!("Evicting modified chunk {} for store", coord);
            self.pre_store.push_back(chunk);
        }
    }

    /// Returns the resident chunk for a coordinate.
    ///
    /// Only valid while the caller holds a reference to the coordinate.
    #[must_use]
    pub fn get_chunk(&self, coord: ChunkCoord) -> Option<&Chunk> {
        self.cache.get(&coord)
    }

    /// Returns the resident chunk mutably, for face patching and
    /// changed-flag polling.
    pub fn get_chunk_mut(&mut self, coord: ChunkCoord) -> Option<&mut Chunk> {
        self.cache.get_mut(&coord)
    }

    /// Applies a block mutation guarded by an expected revision.
    ///
    /// The mutation is dropped with a warning when the chunk is not
    /// resident or its revision no longer matches, which indicates a
    /// stale edit racing an eviction or reload. Returns whether the
    /// mutation was applied.
    pub fn place_block(
        &mut self,
        coord: ChunkCoord,
        local: LocalCoord,
        ty: BlockId,
        expected_revision: u32,
    ) -> bool {
        match self.cache.get_mut(&coord) {
            Some(chunk) if chunk.revision() == expected_revision => {
                chunk.set_block(local, ty);
                true
            }
            Some(chunk) => {
                warn!(
                    "couldn't apply block patch to {}: revision {} != expected {}",
                    coord,
                    chunk.revision(),
                    expected_revision
                );
                false
            }
            None => {
                debug!("couldn't apply block patch to {}: not resident", coord);
                false
            }
        }
    }

    /// Advances the pipeline: issues queued requests while capacity
    /// allows and applies completed results to the cache.
    ///
    /// Must be called once per simulation step from the main thread.
    pub fn tick(&mut self) {
        // Hand queued load requests to the worker while the pool and the
        // request queue have capacity.
        while let Some(&coord) = self.requested.front() {
            let Some(mut chunk) = self.pool.acquire() else {
                break;
            };
            chunk.set_coord(coord);
            match self.pipeline.try_submit(ArchiveRequest::Load(chunk)) {
                Ok(()) => {
                    self.requested.pop_front();
                }
                Err(ArchiveRequest::Load(chunk) | ArchiveRequest::Store(chunk)) => {
                    self.pool.release(chunk);
                    break;
                }
            }
        }

        // Forward deferred stores.
        while let Some(chunk) = self.pre_store.pop_front() {
            if let Err(ArchiveRequest::Load(chunk) | ArchiveRequest::Store(chunk)) =
                self.pipeline.try_submit(ArchiveRequest::Store(chunk))
            {
                self.pre_store.push_front(chunk);
                break;
            }
        }

        // Apply completed operations.
        while let Some(result) = self.pipeline.try_collect() {
            match result {
                ArchiveResult::Loaded { chunk, origin } => {
                    match origin {
                        LoadOrigin::Archive => self.session_loads += 1,
                        LoadOrigin::Generated => self.session_gens += 1,
                    }
                    self.apply_loaded(chunk, origin);
                }
                ArchiveResult::Stored(chunk) => {
                    self.session_stores += 1;
                    self.pool.release(chunk);
                }
            }
        }
    }

    /// Inserts a completed load into the cache if the coordinate is still
    /// needed, recycling it otherwise.
    fn apply_loaded(&mut self, chunk: Chunk, origin: LoadOrigin) {
        let coord = chunk.coord();
        if !self.need_counter.contains_key(&coord) {
            debug!("Discarding load of {}: no longer needed", coord);
            self.pool.release(chunk);
            return;
        }
        if self.cache.contains_key(&coord) {
            // A duplicate load can arrive when a coordinate was released
            // and re-requested while the first load was in flight; the
            // resident chunk wins.
            debug!("Discarding duplicate load of {}", coord);
            self.pool.release(chunk);
            return;
        }
        if origin == LoadOrigin::Archive {
            self.old_revisions.insert(coord, chunk.revision());
        }
        self.cache.insert(coord, chunk);
    }

    /// Flushes all unsaved chunks and stops the worker.
    ///
    /// Still-pending and still-resident modified chunks are persisted
    /// before this returns; pending loads are abandoned.
    pub fn shutdown(mut self) {
        info!(
            "Shutting down chunk manager: {} resident, {} pending stores",
            self.cache.len(),
            self.pre_store.len()
        );
        // Drain mode: the worker persists stores without delivering
        // results, so blocking sends below cannot deadlock.
        self.pipeline.begin_shutdown();

        for chunk in self.pre_store.drain(..) {
            if self.pipeline.submit(ArchiveRequest::Store(chunk)).is_err() {
                warn!("archive worker unavailable; dropping pending store");
            }
        }
        for (coord, chunk) in self.cache.drain() {
            let old_revision = self.old_revisions.remove(&coord);
            if old_revision == Some(chunk.revision()) {
                continue;
            }
            if self.pipeline.submit(ArchiveRequest::Store(chunk)).is_err() {
                warn!("archive worker unavailable; dropping store of {}", coord);
            }
        }
        self.pipeline.shutdown();
    }

    /// Number of coordinates with outstanding references.
    #[must_use]
    pub fn needed_count(&self) -> usize {
        self.need_counter.len()
    }

    /// Number of chunks resident in the cache.
    #[must_use]
    pub fn resident_count(&self) -> usize {
        self.cache.len()
    }

    /// Number of chunks currently outside the pool (resident, queued, or
    /// in flight).
    #[must_use]
    pub fn allocated_count(&self) -> usize {
        self.pool.outstanding()
    }

    /// Number of requests waiting for pool or queue capacity.
    #[must_use]
    pub fn requested_len(&self) -> usize {
        self.requested.len()
    }

    /// Number of evicted chunks waiting for queue capacity to be stored.
    #[must_use]
    pub fn pending_store_len(&self) -> usize {
        self.pre_store.len()
    }

    /// Chunks served from the archive this session.
    #[must_use]
    pub const fn session_loads(&self) -> u64 {
        self.session_loads
    }

    /// Chunks generated on archive miss this session.
    #[must_use]
    pub const fn session_gens(&self) -> u64 {
        self.session_gens
    }

    /// Chunks persisted this session.
    #[must_use]
    pub const fn session_stores(&self) -> u64 {
        self.session_stores
    }
}

impl std::fmt::Debug for ChunkManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ChunkManager")
            .field("resident", &self.cache.len())
            .field("needed", &self.need_counter.len())
            .field("requested", &self.requested.len())
            .field("pending_stores", &self.pre_store.len())
            .field("pool_available", &self.pool.available())
            .finish_non_exhaustive()
    }
}
