//! Owned point-in-time copy of a chunk and its six face neighbors.
//!
//! A [`ChunkSnapshot`] is taken on the main thread when a mesh job is queued
//! and then moved to a worker, so meshing never reads live world data. A
//! neighbor that is not loaded is captured as empty uniform storage, which
//! costs no allocation.

use lattice_voxel::{ChunkCoord, ChunkShape, ChunkSource, Voxel, VoxelStorage};

use crate::face::FaceDirection;

/// Self-contained voxel data for one meshing job.
#[derive(Clone, Debug)]
pub struct ChunkSnapshot {
    coord: ChunkCoord,
    shape: ChunkShape,
    center: Option<VoxelStorage>,
    /// Indexed by [`FaceDirection::index`].
    neighbors: [VoxelStorage; 6],
}

impl ChunkSnapshot {
    /// Clones chunk `coord` and its face neighbors out of `source`.
    ///
    /// The centre is `None` if the chunk itself is not loaded.
    pub fn capture<S: ChunkSource + ?Sized>(source: &S, coord: ChunkCoord) -> Self {
        let shape = source.chunk_shape();
        let neighbors = FaceDirection::ALL.map(|dir| {
            source
                .find_chunk(dir.neighbor(coord))
                .filter(|storage| storage.len() == shape.volume())
                .cloned()
                .unwrap_or_else(|| VoxelStorage::new(shape.volume()))
        });
        Self {
            coord,
            shape,
            center: source.find_chunk(coord).cloned(),
            neighbors,
        }
    }

    /// Builds a snapshot from explicit storages. Absent neighbors are empty.
    pub fn from_parts(
        coord: ChunkCoord,
        shape: ChunkShape,
        center: Option<VoxelStorage>,
        neighbors: [Option<VoxelStorage>; 6],
    ) -> Self {
        Self {
            coord,
            shape,
            center,
            neighbors: neighbors.map(|n| n.unwrap_or_else(|| VoxelStorage::new(shape.volume()))),
        }
    }

    /// Chunk this snapshot was taken for.
    pub fn coord(&self) -> ChunkCoord {
        self.coord
    }

    /// Shape of every captured chunk.
    pub fn shape(&self) -> ChunkShape {
        self.shape
    }

    /// The centre chunk's storage, or `None` if it was not loaded.
    pub fn center(&self) -> Option<&VoxelStorage> {
        self.center.as_ref()
    }

    /// Storage captured for the neighbor across `dir`.
    pub fn neighbor(&self, dir: FaceDirection) -> &VoxelStorage {
        &self.neighbors[dir.index()]
    }

    /// Reads a voxel at centre-local coordinates, which may step one layer
    /// outside the chunk along a single axis into a face neighbor.
    ///
    /// Anything further away reads as empty.
    pub fn voxel(&self, x: i32, y: i32, z: i32) -> Voxel {
        let side = self.shape.side() as i32;
        let p = [x, y, z];
        let mut outside = None;
        for axis in 0..3 {
            if (0..side).contains(&p[axis]) {
                continue;
            }
            if outside.is_some() {
                return Voxel::EMPTY;
            }
            outside = Some(axis);
        }

        let Some(axis) = outside else {
            return self
                .center
                .as_ref()
                .map_or(Voxel::EMPTY, |c| c.get(self.local_index(p)));
        };
        let positive = p[axis] >= side;
        let dir = FaceDirection::ALL[axis * 2 + usize::from(!positive)];
        let mut wrapped = p;
        wrapped[axis] = if positive { p[axis] - side } else { p[axis] + side };
        if !(0..side).contains(&wrapped[axis]) {
            return Voxel::EMPTY;
        }
        self.neighbors[dir.index()].get(self.local_index(wrapped))
    }

    fn local_index(&self, p: [i32; 3]) -> usize {
        let side = self.shape.side();
        p[0] as usize + p[1] as usize * side + p[2] as usize * side * side
    }
}
