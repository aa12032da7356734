//! Consumer-side chunk streaming.
//!
//! Drives the manager's reference counts from a moving center position:
//! after each center change exactly the coordinates within the load
//! radius hold one streamer-owned reference, requested nearest-first.
//! Residency and eviction stay entirely with the manager; the streamer is
//! pure need-counter arithmetic.

use std::sync::OnceLock;

use ahash::AHashSet;
use glam::IVec3;
use tracing::debug;

use strata_common::ChunkCoord;

use crate::manager::ChunkManager;

/// Default load radius in chunks.
pub const DEFAULT_LOAD_RADIUS: u32 = 3;

/// Largest supported load radius; the loading order is precomputed out
/// to this distance.
pub const MAX_LOAD_RADIUS: u32 = 8;

/// Chunk-space offsets within [`MAX_LOAD_RADIUS`], sorted by distance
/// from the origin.
///
/// Built once on first use; the table is immutable afterwards.
pub fn loading_order() -> &'static [IVec3] {
    static LOADING_ORDER: OnceLock<Vec<IVec3>> = OnceLock::new();
    LOADING_ORDER.get_or_init(|| {
        let radius = MAX_LOAD_RADIUS as i32;
        let mut order = Vec::new();
        for z in -radius..=radius {
            for y in -radius..=radius {
                for x in -radius..=radius {
                    let offset = IVec3::new(x, y, z);
                    if offset.length_squared() <= radius * radius {
                        order.push(offset);
                    }
                }
            }
        }
        order.sort_by_key(|offset| offset.length_squared());
        order
    })
}

/// Keeps the chunks around a center position referenced in the manager.
pub struct ChunkStreamer {
    /// Radius of chunks to keep referenced, in chunk units.
    load_radius: u32,
    /// Center of the last update, if any.
    last_center: Option<ChunkCoord>,
    /// Coordinates this streamer currently holds a reference to.
    referenced: AHashSet<ChunkCoord>,
}

impl ChunkStreamer {
    /// Creates a streamer with the given load radius.
    ///
    /// # Panics
    /// Panics if the radius exceeds [`MAX_LOAD_RADIUS`].
    #[must_use]
    pub fn new(load_radius: u32) -> Self {
        assert!(
            load_radius <= MAX_LOAD_RADIUS,
            "load radius exceeds precomputed loading order"
        );
        Self {
            load_radius,
            last_center: None,
            referenced: AHashSet::new(),
        }
    }

    /// Creates a streamer with the default radius.
    #[must_use]
    pub fn with_defaults() -> Self {
        Self::new(DEFAULT_LOAD_RADIUS)
    }

    /// Returns the load radius.
    #[must_use]
    pub const fn load_radius(&self) -> u32 {
        self.load_radius
    }

    /// Returns the number of coordinates currently referenced.
    #[must_use]
    pub fn referenced_count(&self) -> usize {
        self.referenced.len()
    }

    /// Re-targets the streamer to a new center chunk.
    ///
    /// Requests coordinates that came into radius, nearest first, and
    /// releases those that left it. Updating with an unchanged center is
    /// a no-op.
    pub fn update(&mut self, center: ChunkCoord, manager: &mut ChunkManager) {
        if self.last_center == Some(center) {
            return;
        }
        debug!("Streaming center moved to {}", center);
        self.last_center = Some(center);

        let radius_sq = i64::from(self.load_radius) * i64::from(self.load_radius);
        let mut wanted = AHashSet::with_capacity(self.referenced.len());
        for &offset in loading_order() {
            if i64::from(offset.length_squared()) > radius_sq {
                continue;
            }
            let coord = center.offset(offset);
            wanted.insert(coord);
            if !self.referenced.contains(&coord) {
                manager.request_chunk(coord);
            }
        }

        for &coord in &self.referenced {
            if !wanted.contains(&coord) {
                manager.release_chunk(coord);
            }
        }
        self.referenced = wanted;
    }

    /// Releases every reference this streamer holds.
    pub fn clear(&mut self, manager: &mut ChunkManager) {
        for coord in self.referenced.drain() {
            manager.release_chunk(coord);
        }
        self.last_center = None;
    }
}

impl std::fmt::Debug for ChunkStreamer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ChunkStreamer")
            .field("load_radius", &self.load_radius)
            .field("last_center", &self.last_center)
            .field("referenced", &self.referenced.len())
            .finish()
    }
}
