//! Chunk coordinates, chunk geometry, and the per-chunk container.

use serde::{Deserialize, Serialize};

use crate::storage::{Voxel, VoxelStorage};

/// Identifies a chunk's position on the chunk grid.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ChunkCoord {
    /// Chunk-grid X coordinate.
    pub x: i32,
    /// Chunk-grid Y coordinate.
    pub y: i32,
    /// Chunk-grid Z coordinate.
    pub z: i32,
}

impl ChunkCoord {
    /// Creates a new chunk coordinate.
    pub const fn new(x: i32, y: i32, z: i32) -> Self {
        Self { x, y, z }
    }

    /// Returns the coordinate offset by `(dx, dy, dz)` chunks.
    pub fn offset(self, dx: i32, dy: i32, dz: i32) -> Self {
        Self {
            x: self.x + dx,
            y: self.y + dy,
            z: self.z + dz,
        }
    }

    /// The six face-adjacent coordinates, ordered `+X, -X, +Y, -Y, +Z, -Z`.
    pub fn face_neighbors(self) -> [ChunkCoord; 6] {
        [
            self.offset(1, 0, 0),
            self.offset(-1, 0, 0),
            self.offset(0, 1, 0),
            self.offset(0, -1, 0),
            self.offset(0, 0, 1),
            self.offset(0, 0, -1),
        ]
    }
}

/// Side length and indexing scheme shared by every chunk of a world.
///
/// Cells are laid out with x varying fastest: `x + y * side + z * side²`.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ChunkShape {
    side: usize,
}

impl ChunkShape {
    /// Creates a shape with the given side length.
    pub const fn new(side: usize) -> Self {
        Self { side }
    }

    /// Side length in voxels.
    pub fn side(self) -> usize {
        self.side
    }

    /// Number of cells in a chunk.
    pub fn volume(self) -> usize {
        self.side * self.side * self.side
    }

    /// Linear index of a local coordinate, or `None` if out of bounds.
    pub fn index(self, x: usize, y: usize, z: usize) -> Option<usize> {
        (x < self.side && y < self.side && z < self.side)
            .then(|| x + y * self.side + z * self.side * self.side)
    }

    /// Local coordinate of a linear index, or `None` if out of bounds.
    pub fn coords(self, index: usize) -> Option<[usize; 3]> {
        (index < self.volume()).then(|| {
            [
                index % self.side,
                (index / self.side) % self.side,
                index / (self.side * self.side),
            ]
        })
    }

    /// Returns `true` if the local coordinate sits on the outermost layer of
    /// any axis.
    pub fn is_boundary(self, local: [usize; 3]) -> bool {
        let last = self.side.saturating_sub(1);
        local.iter().any(|&c| c == 0 || c == last)
    }
}

/// A loaded chunk: its coordinate, voxel storage, and a mutation counter.
#[derive(Clone, Debug)]
pub struct Chunk {
    coord: ChunkCoord,
    storage: VoxelStorage,
    version: u64,
}

impl Chunk {
    /// Creates an empty chunk.
    pub fn new(coord: ChunkCoord, shape: ChunkShape) -> Self {
        Self::from_storage(coord, VoxelStorage::new(shape.volume()))
    }

    /// Wraps existing storage.
    pub fn from_storage(coord: ChunkCoord, storage: VoxelStorage) -> Self {
        Self {
            coord,
            storage,
            version: 0,
        }
    }

    /// Chunk-grid coordinate.
    pub fn coord(&self) -> ChunkCoord {
        self.coord
    }

    /// Voxel storage.
    pub fn storage(&self) -> &VoxelStorage {
        &self.storage
    }

    /// Writes a voxel by linear index. Returns the previous voxel.
    pub fn set(&mut self, index: usize, voxel: Voxel) -> Voxel {
        let old = self.storage.get(index);
        if old != voxel && index < self.storage.len() {
            self.storage.set(index, voxel);
            self.version += 1;
        }
        old
    }

    /// Resets every cell to `voxel`.
    pub fn fill(&mut self, voxel: Voxel) {
        self.storage.fill(voxel);
        self.version += 1;
    }

    /// Mutation counter, bumped on every effective change.
    pub fn version(&self) -> u64 {
        self.version
    }
}
