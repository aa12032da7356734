//! Chunk entity and boundary-face derivation.
//!
//! A chunk is a fixed-size cubic container of block types. From its block
//! data it derives a set of visible boundary faces, each annotated with an
//! 8-bit ambient-occlusion corner mask. Face derivation is local to the
//! chunk: occlusion bits for neighbors outside the chunk are left unset and
//! corrected later by border patching through [`Chunk::insert_face`] and
//! [`Chunk::erase_face`].

use ahash::AHashMap;
use glam::IVec3;
use serde::{Deserialize, Serialize};

use strata_common::{ChunkCoord, LocalCoord};

/// Chunk edge length in blocks.
pub const CHUNK_WIDTH: u32 = 32;

/// Number of blocks in a chunk.
pub const CHUNK_VOLUME: usize =
    (CHUNK_WIDTH as usize) * (CHUNK_WIDTH as usize) * (CHUNK_WIDTH as usize);

/// Block type identifier. `0` is empty (air).
pub type BlockId = u8;

/// The empty block type.
pub const AIR: BlockId = 0;

/// One of the six axis-aligned face directions.
///
/// Ordered positive axes first, so `direction as usize + 3` is the
/// opposite of a positive direction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[repr(u8)]
pub enum Direction {
    /// Positive X
    East = 0,
    /// Positive Y
    North = 1,
    /// Positive Z
    Up = 2,
    /// Negative X
    West = 3,
    /// Negative Y
    South = 4,
    /// Negative Z
    Down = 5,
}

impl Direction {
    /// All six directions, positive axes first.
    pub const ALL: [Direction; 6] = [
        Direction::East,
        Direction::North,
        Direction::Up,
        Direction::West,
        Direction::South,
        Direction::Down,
    ];

    /// The three positive-axis directions scanned by face derivation.
    pub const POSITIVE: [Direction; 3] = [Direction::East, Direction::North, Direction::Up];

    /// Returns the direction's index (0..6).
    #[must_use]
    pub const fn index(self) -> usize {
        self as usize
    }

    /// Returns the direction for the given index.
    ///
    /// # Panics
    /// Panics if `index >= 6`.
    #[must_use]
    pub const fn from_index(index: usize) -> Self {
        Self::ALL[index]
    }

    /// Returns the opposite direction.
    #[must_use]
    pub const fn opposite(self) -> Self {
        Self::ALL[(self.index() + 3) % 6]
    }

    /// Returns the unit offset of this direction in block space.
    #[must_use]
    pub const fn offset(self) -> IVec3 {
        DIR_OFFSETS[self.index()]
    }
}

/// Unit offsets for each direction, indexed by [`Direction::index`].
const DIR_OFFSETS: [IVec3; 6] = [
    IVec3::new(1, 0, 0),
    IVec3::new(0, 1, 0),
    IVec3::new(0, 0, 1),
    IVec3::new(-1, 0, 0),
    IVec3::new(0, -1, 0),
    IVec3::new(0, 0, -1),
];

/// The eight blocks diagonally adjacent to a face plane, per direction.
///
/// Offsets are relative to the face's block; bit `j` of the corner mask
/// corresponds to entry `j` of the cycle for that direction.
const EIGHT_CYCLES: [[IVec3; 8]; 6] = [
    // East (+x)
    [
        IVec3::new(1, -1, -1),
        IVec3::new(1, 0, -1),
        IVec3::new(1, 1, -1),
        IVec3::new(1, 1, 0),
        IVec3::new(1, 1, 1),
        IVec3::new(1, 0, 1),
        IVec3::new(1, -1, 1),
        IVec3::new(1, -1, 0),
    ],
    // North (+y)
    [
        IVec3::new(1, 1, -1),
        IVec3::new(0, 1, -1),
        IVec3::new(-1, 1, -1),
        IVec3::new(-1, 1, 0),
        IVec3::new(-1, 1, 1),
        IVec3::new(0, 1, 1),
        IVec3::new(1, 1, 1),
        IVec3::new(1, 1, 0),
    ],
    // Up (+z)
    [
        IVec3::new(-1, -1, 1),
        IVec3::new(0, -1, 1),
        IVec3::new(1, -1, 1),
        IVec3::new(1, 0, 1),
        IVec3::new(1, 1, 1),
        IVec3::new(0, 1, 1),
        IVec3::new(-1, 1, 1),
        IVec3::new(-1, 0, 1),
    ],
    // West (-x)
    [
        IVec3::new(-1, 1, -1),
        IVec3::new(-1, 0, -1),
        IVec3::new(-1, -1, -1),
        IVec3::new(-1, -1, 0),
        IVec3::new(-1, -1, 1),
        IVec3::new(-1, 0, 1),
        IVec3::new(-1, 1, 1),
        IVec3::new(-1, 1, 0),
    ],
    // South (-y)
    [
        IVec3::new(-1, -1, -1),
        IVec3::new(0, -1, -1),
        IVec3::new(1, -1, -1),
        IVec3::new(1, -1, 0),
        IVec3::new(1, -1, 1),
        IVec3::new(0, -1, 1),
        IVec3::new(-1, -1, 1),
        IVec3::new(-1, -1, 0),
    ],
    // Down (-z)
    [
        IVec3::new(1, -1, -1),
        IVec3::new(0, -1, -1),
        IVec3::new(-1, -1, -1),
        IVec3::new(-1, 0, -1),
        IVec3::new(-1, 1, -1),
        IVec3::new(0, 1, -1),
        IVec3::new(1, 1, -1),
        IVec3::new(1, 0, -1),
    ],
];

/// A visible boundary face between a solid and an empty block.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Face {
    /// Block the face belongs to, in chunk-local coordinates.
    pub block: LocalCoord,
    /// Outward direction of the face.
    pub direction: Direction,
    /// Ambient-occlusion corner mask; bit `j` is set when the `j`-th
    /// diagonal neighbor of the face plane is solid.
    pub corners: u8,
}

/// Fixed-size cubic voxel container with a derived renderable face set.
pub struct Chunk {
    /// Position of this chunk in chunk space.
    coord: ChunkCoord,
    /// Flat block array, x-major within y within z.
    blocks: Vec<BlockId>,
    /// Visible faces keyed by `(block, direction)`; the value is the
    /// corner mask. Inserting an existing key replaces the mask.
    faces: AHashMap<(LocalCoord, Direction), u8>,
    /// Bumped on every block mutation through [`Chunk::set_block`].
    revision: u32,
    /// Whether block data has been populated by a load or generation.
    initialized: bool,
    /// Sticky flag set on face-set mutation, cleared by `poll_changed`.
    changed: bool,
}

impl Chunk {
    /// Creates a chunk in its pool-default state.
    #[must_use]
    pub fn new() -> Self {
        Self {
            coord: ChunkCoord::ORIGIN,
            blocks: vec![AIR; CHUNK_VOLUME],
            faces: AHashMap::new(),
            revision: 0,
            initialized: false,
            changed: false,
        }
    }

    /// Assigns the chunk to a coordinate before loading or generation.
    pub fn set_coord(&mut self, coord: ChunkCoord) {
        self.coord = coord;
    }

    /// Returns the chunk's coordinate.
    #[must_use]
    pub const fn coord(&self) -> ChunkCoord {
        self.coord
    }

    /// Returns the current revision counter.
    #[must_use]
    pub const fn revision(&self) -> u32 {
        self.revision
    }

    /// Returns whether block data has been populated.
    #[must_use]
    pub const fn is_initialized(&self) -> bool {
        self.initialized
    }

    /// Marks the chunk's block data as populated.
    ///
    /// Called by archive and world-source implementations once every
    /// block has been written through [`Chunk::init_block`].
    pub fn mark_initialized(&mut self) {
        self.initialized = true;
    }

    /// Returns the flat block array.
    #[must_use]
    pub fn blocks(&self) -> &[BlockId] {
        &self.blocks
    }

    /// Populates a single block without touching the revision counter.
    ///
    /// Used while filling a chunk from the archive or the world source;
    /// gameplay mutations go through [`Chunk::set_block`].
    pub fn init_block(&mut self, index: usize, ty: BlockId) {
        self.blocks[index] = ty;
    }

    /// Populates the whole block array and marks the chunk initialized.
    ///
    /// # Panics
    /// Panics if `data` is not exactly [`CHUNK_VOLUME`] blocks.
    pub fn init_blocks(&mut self, data: &[BlockId]) {
        assert_eq!(data.len(), CHUNK_VOLUME, "block data must fill the chunk");
        self.blocks.copy_from_slice(data);
        self.initialized = true;
    }

    /// Returns the block type at a local coordinate.
    #[must_use]
    pub fn get_block(&self, local: LocalCoord) -> BlockId {
        self.blocks[local.to_index(CHUNK_WIDTH)]
    }

    /// Sets a block, bumping the revision counter.
    ///
    /// Setting a block to its current type is a no-op and does not bump
    /// the revision. Returns whether the block changed. Face-set
    /// maintenance is the caller's responsibility.
    pub fn set_block(&mut self, local: LocalCoord, ty: BlockId) -> bool {
        let index = local.to_index(CHUNK_WIDTH);
        if self.blocks[index] == ty {
            return false;
        }
        self.blocks[index] = ty;
        self.revision += 1;
        true
    }

    /// Derives the face set from the current block data.
    ///
    /// Scans every adjacent block pair along the three positive axes; a
    /// face exists exactly where one side is air and the other is not,
    /// attributed to the solid side with its direction pointing into the
    /// air. Occlusion corners are sampled within chunk bounds only.
    pub fn init_faces(&mut self) {
        self.faces.clear();
        let width = CHUNK_WIDTH as usize;
        // Linear index strides along +x, +y, +z.
        let strides = [1, width, width * width];

        let mut i = 0;
        for z in 0..width {
            for y in 0..width {
                for x in 0..width {
                    for dir in Direction::POSITIVE {
                        let d = dir.index();
                        let on_far_edge = (d == 0 && x == width - 1)
                            || (d == 1 && y == width - 1)
                            || (d == 2 && z == width - 1);
                        if on_far_edge {
                            continue;
                        }

                        let this_ty = self.blocks[i];
                        let that_ty = self.blocks[i + strides[d]];
                        if this_ty == that_ty {
                            continue;
                        }

                        let here = IVec3::new(x as i32, y as i32, z as i32);
                        let (face_block, face_dir) = if this_ty == AIR {
                            (here + dir.offset(), dir.opposite())
                        } else if that_ty == AIR {
                            (here, dir)
                        } else {
                            continue;
                        };

                        let corners = self.corner_mask(face_block, face_dir);
                        let block = LocalCoord::new(
                            face_block.x as u8,
                            face_block.y as u8,
                            face_block.z as u8,
                        );
                        self.faces.insert((block, face_dir), corners);
                    }
                    i += 1;
                }
            }
        }
    }

    /// Samples the eight-cycle around a face and returns the corner mask.
    ///
    /// Neighbors outside chunk bounds leave their bit unset.
    fn corner_mask(&self, block: IVec3, direction: Direction) -> u8 {
        let width = CHUNK_WIDTH as i32;
        let mut corners = 0u8;
        for (j, offset) in EIGHT_CYCLES[direction.index()].iter().enumerate() {
            let p = block + *offset;
            if p.x < 0 || p.x >= width || p.y < 0 || p.y >= width || p.z < 0 || p.z >= width {
                continue;
            }
            let index = LocalCoord::new(p.x as u8, p.y as u8, p.z as u8).to_index(CHUNK_WIDTH);
            if self.blocks[index] != AIR {
                corners |= 1 << j;
            }
        }
        corners
    }

    /// Inserts a face, replacing the corner mask of an existing one with
    /// the same block and direction. Sets the changed flag.
    pub fn insert_face(&mut self, face: Face) {
        self.faces.insert((face.block, face.direction), face.corners);
        self.changed = true;
    }

    /// Erases a face by its key. Returns whether a face was removed; the
    /// changed flag is set only on removal.
    pub fn erase_face(&mut self, block: LocalCoord, direction: Direction) -> bool {
        if self.faces.remove(&(block, direction)).is_none() {
            return false;
        }
        self.changed = true;
        true
    }

    /// Looks up a face by block and direction.
    #[must_use]
    pub fn face(&self, block: LocalCoord, direction: Direction) -> Option<Face> {
        self.faces
            .get(&(block, direction))
            .map(|&corners| Face {
                block,
                direction,
                corners,
            })
    }

    /// Iterates over all faces.
    pub fn faces(&self) -> impl Iterator<Item = Face> + '_ {
        self.faces
            .iter()
            .map(|(&(block, direction), &corners)| Face {
                block,
                direction,
                corners,
            })
    }

    /// Returns the number of faces.
    #[must_use]
    pub fn face_count(&self) -> usize {
        self.faces.len()
    }

    /// Returns and clears the changed flag.
    ///
    /// Destructive read; exactly one consumer should use this to decide
    /// whether the mesh needs rebuilding.
    pub fn poll_changed(&mut self) -> bool {
        std::mem::take(&mut self.changed)
    }

    /// Resets the chunk to its pool-default state for reuse.
    pub fn reset(&mut self) {
        self.coord = ChunkCoord::ORIGIN;
        self.blocks.fill(AIR);
        self.faces.clear();
        self.revision = 0;
        self.initialized = false;
        self.changed = false;
    }
}

impl Default for Chunk {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for Chunk {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Chunk")
            .field("coord", &self.coord)
            .field("revision", &self.revision)
            .field("initialized", &self.initialized)
            .field("changed", &self.changed)
            .field("faces", &self.faces.len())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use proptest::prelude::*;

    use super::*;

    fn local(x: u8, y: u8, z: u8) -> LocalCoord {
        LocalCoord::new(x, y, z)
    }

    #[test]
    fn test_direction_opposites() {
        assert_eq!(Direction::East.opposite(), Direction::West);
        assert_eq!(Direction::North.opposite(), Direction::South);
        assert_eq!(Direction::Up.opposite(), Direction::Down);
        assert_eq!(Direction::Down.opposite(), Direction::Up);
        for dir in Direction::ALL {
            assert_eq!(dir.opposite().opposite(), dir);
            assert_eq!(dir.offset() + dir.opposite().offset(), IVec3::ZERO);
        }
    }

    #[test]
    fn test_single_block_yields_three_faces() {
        let mut chunk = Chunk::new();
        chunk.init_block(local(0, 0, 0).to_index(CHUNK_WIDTH), 1);
        chunk.mark_initialized();
        chunk.init_faces();

        assert_eq!(chunk.face_count(), 3);
        for dir in [Direction::East, Direction::North, Direction::Up] {
            let face = chunk.face(local(0, 0, 0), dir).expect("face missing");
            assert_eq!(face.corners, 0, "no diagonal neighbors in empty chunk");
        }
        assert!(chunk.face(local(0, 0, 0), Direction::West).is_none());
    }

    #[test]
    fn test_no_face_between_solid_blocks() {
        let mut chunk = Chunk::new();
        chunk.init_block(local(5, 5, 5).to_index(CHUNK_WIDTH), 1);
        chunk.init_block(local(6, 5, 5).to_index(CHUNK_WIDTH), 2);
        chunk.init_faces();

        // The shared boundary produces no face; each block exposes its
        // five other sides.
        assert_eq!(chunk.face_count(), 10);
        assert!(chunk.face(local(5, 5, 5), Direction::East).is_none());
        assert!(chunk.face(local(6, 5, 5), Direction::West).is_none());
    }

    #[test]
    fn test_face_attributed_to_solid_side() {
        let mut chunk = Chunk::new();
        // Air at (4,5,5), solid at (5,5,5): the scan sees air first along
        // +x and must attribute the face to the solid side pointing west.
        chunk.init_block(local(5, 5, 5).to_index(CHUNK_WIDTH), 1);
        chunk.init_faces();

        let face = chunk.face(local(5, 5, 5), Direction::West).expect("west face");
        assert_eq!(face.direction, Direction::West);
        assert_eq!(chunk.face_count(), 6);
    }

    #[test]
    fn test_corner_mask_samples_diagonal_neighbor() {
        let mut chunk = Chunk::new();
        chunk.init_block(local(0, 0, 0).to_index(CHUNK_WIDTH), 1);
        chunk.init_block(local(1, 1, 0).to_index(CHUNK_WIDTH), 1);
        chunk.init_faces();

        // (1,1,0) is entry 3 of the east eight-cycle around (0,0,0).
        let face = chunk.face(local(0, 0, 0), Direction::East).expect("east face");
        assert_eq!(face.corners, 1 << 3);
    }

    #[test]
    fn test_insert_face_replaces_corner_mask() {
        let mut chunk = Chunk::new();
        chunk.insert_face(Face {
            block: local(1, 2, 3),
            direction: Direction::Up,
            corners: 0b0000_0001,
        });
        chunk.insert_face(Face {
            block: local(1, 2, 3),
            direction: Direction::Up,
            corners: 0b1000_0000,
        });

        assert_eq!(chunk.face_count(), 1);
        let face = chunk.face(local(1, 2, 3), Direction::Up).expect("face");
        assert_eq!(face.corners, 0b1000_0000);
    }

    #[test]
    fn test_erase_face() {
        let mut chunk = Chunk::new();
        chunk.insert_face(Face {
            block: local(0, 0, 0),
            direction: Direction::Down,
            corners: 0,
        });
        assert!(chunk.poll_changed());

        assert!(chunk.erase_face(local(0, 0, 0), Direction::Down));
        assert!(chunk.poll_changed());

        // Erasing an absent face reports failure and leaves the flag clear.
        assert!(!chunk.erase_face(local(0, 0, 0), Direction::Down));
        assert!(!chunk.poll_changed());
    }

    #[test]
    fn test_poll_changed_is_one_shot() {
        let mut chunk = Chunk::new();
        assert!(!chunk.poll_changed());

        chunk.insert_face(Face {
            block: local(0, 0, 0),
            direction: Direction::East,
            corners: 0,
        });
        assert!(chunk.poll_changed());
        assert!(!chunk.poll_changed());
    }

    #[test]
    fn test_set_block_same_type_is_noop() {
        let mut chunk = Chunk::new();
        assert!(chunk.set_block(local(1, 1, 1), 7));
        assert_eq!(chunk.revision(), 1);

        assert!(!chunk.set_block(local(1, 1, 1), 7));
        assert_eq!(chunk.revision(), 1);

        assert!(chunk.set_block(local(1, 1, 1), AIR));
        assert_eq!(chunk.revision(), 2);
    }

    #[test]
    fn test_init_block_does_not_bump_revision() {
        let mut chunk = Chunk::new();
        chunk.init_block(0, 3);
        chunk.init_block(1, 4);
        assert_eq!(chunk.revision(), 0);
    }

    #[test]
    fn test_reset_restores_pool_default() {
        let mut chunk = Chunk::new();
        chunk.set_coord(ChunkCoord::new(1, -2, 3));
        chunk.init_blocks(&[1; CHUNK_VOLUME]);
        chunk.set_block(local(0, 0, 0), 2);
        chunk.init_faces();

        chunk.reset();
        assert_eq!(chunk.coord(), ChunkCoord::ORIGIN);
        assert_eq!(chunk.revision(), 0);
        assert!(!chunk.is_initialized());
        assert!(!chunk.poll_changed());
        assert_eq!(chunk.face_count(), 0);
        assert!(chunk.blocks().iter().all(|&b| b == AIR));
    }

    proptest! {
        #[test]
        fn prop_revision_strictly_increases_on_change(
            ops in prop::collection::vec((0usize..CHUNK_VOLUME, 0u8..4), 1..200)
        ) {
            let mut chunk = Chunk::new();
            for (index, ty) in ops {
                let before = chunk.revision();
                let local = LocalCoord::from_index(index, CHUNK_WIDTH);
                let was = chunk.get_block(local);
                let changed = chunk.set_block(local, ty);
                prop_assert_eq!(changed, was != ty);
                if changed {
                    prop_assert_eq!(chunk.revision(), before + 1);
                } else {
                    prop_assert_eq!(chunk.revision(), before);
                }
            }
        }
    }
}
