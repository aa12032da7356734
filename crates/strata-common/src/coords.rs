//! Coordinate types for block, chunk, and intra-chunk positions.

use bytemuck::{Pod, Zeroable};
use glam::{I64Vec3, IVec3};
use serde::{Deserialize, Serialize};

/// Block coordinate in world space (global position).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Pod, Zeroable)]
#[repr(C)]
pub struct BlockCoord {
    /// X coordinate in world block space
    pub x: i64,
    /// Y coordinate in world block space
    pub y: i64,
    /// Z coordinate in world block space
    pub z: i64,
}

impl BlockCoord {
    /// Creates a new block coordinate.
    #[must_use]
    pub const fn new(x: i64, y: i64, z: i64) -> Self {
        Self { x, y, z }
    }

    /// Converts to the chunk coordinate containing this block.
    #[must_use]
    pub const fn to_chunk_coord(self, chunk_width: u32) -> ChunkCoord {
        let width = chunk_width as i64;
        ChunkCoord {
            x: self.x.div_euclid(width) as i32,
            y: self.y.div_euclid(width) as i32,
            z: self.z.div_euclid(width) as i32,
        }
    }

    /// Converts to the local coordinate within its chunk.
    #[must_use]
    pub const fn to_local_coord(self, chunk_width: u32) -> LocalCoord {
        let width = chunk_width as i64;
        LocalCoord {
            x: self.x.rem_euclid(width) as u8,
            y: self.y.rem_euclid(width) as u8,
            z: self.z.rem_euclid(width) as u8,
        }
    }
}

impl From<BlockCoord> for I64Vec3 {
    fn from(coord: BlockCoord) -> Self {
        I64Vec3::new(coord.x, coord.y, coord.z)
    }
}

impl From<I64Vec3> for BlockCoord {
    fn from(v: I64Vec3) -> Self {
        Self::new(v.x, v.y, v.z)
    }
}

/// Chunk coordinate (identifies a chunk in the world grid).
///
/// One unit corresponds to one chunk width in block space.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Pod, Zeroable)]
#[repr(C)]
pub struct ChunkCoord {
    /// X coordinate in chunk space
    pub x: i32,
    /// Y coordinate in chunk space
    pub y: i32,
    /// Z coordinate in chunk space
    pub z: i32,
}

impl ChunkCoord {
    /// Creates a new chunk coordinate.
    #[must_use]
    pub const fn new(x: i32, y: i32, z: i32) -> Self {
        Self { x, y, z }
    }

    /// The origin chunk.
    pub const ORIGIN: Self = Self::new(0, 0, 0);

    /// Returns the block coordinate of this chunk's origin corner.
    #[must_use]
    pub const fn to_block_coord(self, chunk_width: u32) -> BlockCoord {
        let width = chunk_width as i64;
        BlockCoord {
            x: self.x as i64 * width,
            y: self.y as i64 * width,
            z: self.z as i64 * width,
        }
    }

    /// Returns this coordinate displaced by the given chunk-space offset.
    #[must_use]
    pub const fn offset(self, delta: IVec3) -> Self {
        Self {
            x: self.x + delta.x,
            y: self.y + delta.y,
            z: self.z + delta.z,
        }
    }

    /// Squared Euclidean distance to another chunk coordinate, in chunks.
    #[must_use]
    pub const fn distance_squared(self, other: Self) -> i64 {
        let dx = (self.x - other.x) as i64;
        let dy = (self.y - other.y) as i64;
        let dz = (self.z - other.z) as i64;
        dx * dx + dy * dy + dz * dz
    }
}

impl From<ChunkCoord> for IVec3 {
    fn from(coord: ChunkCoord) -> Self {
        IVec3::new(coord.x, coord.y, coord.z)
    }
}

impl From<IVec3> for ChunkCoord {
    fn from(v: IVec3) -> Self {
        Self::new(v.x, v.y, v.z)
    }
}

impl std::fmt::Display for ChunkCoord {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "({}, {}, {})", self.x, self.y, self.z)
    }
}

/// Local coordinate within a chunk (0 to chunk_width-1 on each axis).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Pod, Zeroable)]
#[repr(C)]
pub struct LocalCoord {
    /// X coordinate within chunk
    pub x: u8,
    /// Y coordinate within chunk
    pub y: u8,
    /// Z coordinate within chunk
    pub z: u8,
}

impl LocalCoord {
    /// Creates a new local coordinate.
    #[must_use]
    pub const fn new(x: u8, y: u8, z: u8) -> Self {
        Self { x, y, z }
    }

    /// Converts to a linear index for flat block-array access.
    ///
    /// Index layout is x-major within y within z, matching the block
    /// array scan order.
    #[must_use]
    pub const fn to_index(self, chunk_width: u32) -> usize {
        let width = chunk_width as usize;
        (self.z as usize * width + self.y as usize) * width + self.x as usize
    }

    /// Creates from a linear index.
    #[must_use]
    pub const fn from_index(index: usize, chunk_width: u32) -> Self {
        let width = chunk_width as usize;
        Self {
            x: (index % width) as u8,
            y: (index / width % width) as u8,
            z: (index / (width * width)) as u8,
        }
    }
}

impl From<LocalCoord> for IVec3 {
    fn from(coord: LocalCoord) -> Self {
        IVec3::new(
            i32::from(coord.x),
            i32::from(coord.y),
            i32::from(coord.z),
        )
    }
}

impl std::fmt::Display for LocalCoord {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "[{}, {}, {}]", self.x, self.y, self.z)
    }
}
