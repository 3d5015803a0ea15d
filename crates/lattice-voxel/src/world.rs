//! The set of loaded chunks and the mutation events they raise.
//!
//! [`World`] is the single authority for which chunks exist. Every effective
//! mutation pushes a [`WorldEvent`] that downstream systems (meshing,
//! persistence, networking) drain once per frame.

use std::collections::hash_map::Entry;

use rustc_hash::FxHashMap;

use crate::chunk::{Chunk, ChunkCoord, ChunkShape};
use crate::storage::{Voxel, VoxelStorage};

/// A change to the loaded world.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum WorldEvent {
    /// A chunk was inserted (or replaced).
    ChunkCreated(ChunkCoord),
    /// A chunk was unloaded.
    ChunkRemoved(ChunkCoord),
    /// A single voxel changed value.
    VoxelChanged {
        /// Owning chunk.
        coord: ChunkCoord,
        /// Linear index of the changed cell.
        index: usize,
    },
    /// Every cell of a chunk was reset to one value.
    ChunkFilled(ChunkCoord),
}

/// Read access to chunk voxel data, keyed by coordinate.
///
/// Meshing only needs this view; anything that can hand out storage by
/// coordinate can feed the scheduler.
pub trait ChunkSource {
    /// Shape shared by every chunk.
    fn chunk_shape(&self) -> ChunkShape;

    /// Storage of the chunk at `coord`, or `None` if it is not loaded.
    fn find_chunk(&self, coord: ChunkCoord) -> Option<&VoxelStorage>;
}

/// Owns every loaded chunk.
pub struct World {
    shape: ChunkShape,
    chunks: FxHashMap<ChunkCoord, Chunk>,
    events: Vec<WorldEvent>,
}

impl World {
    /// Creates an empty world whose chunks have side length `chunk_size`.
    pub fn new(chunk_size: usize) -> Self {
        Self {
            shape: ChunkShape::new(chunk_size),
            chunks: FxHashMap::default(),
            events: Vec::new(),
        }
    }

    /// Inserts an empty chunk at `coord`, replacing any existing one.
    pub fn create_chunk(&mut self, coord: ChunkCoord) -> &mut Chunk {
        self.insert_chunk(Chunk::new(coord, self.shape))
    }

    /// Inserts `chunk`, replacing any chunk already at its coordinate.
    ///
    /// Storage whose length does not match the world's chunk volume is
    /// replaced with empty storage.
    pub fn insert_chunk(&mut self, chunk: Chunk) -> &mut Chunk {
        let coord = chunk.coord();
        let chunk = if chunk.storage().len() == self.shape.volume() {
            chunk
        } else {
            tracing::warn!(
                "Chunk {coord:?} has {} cells, expected {}; inserting empty",
                chunk.storage().len(),
                self.shape.volume()
            );
            Chunk::new(coord, self.shape)
        };
        self.events.push(WorldEvent::ChunkCreated(coord));
        match self.chunks.entry(coord) {
            Entry::Occupied(mut slot) => {
                slot.insert(chunk);
                slot.into_mut()
            }
            Entry::Vacant(slot) => slot.insert(chunk),
        }
    }

    /// Unloads the chunk at `coord`, returning it if it was loaded.
    pub fn remove_chunk(&mut self, coord: ChunkCoord) -> Option<Chunk> {
        let removed = self.chunks.remove(&coord);
        if removed.is_some() {
            self.events.push(WorldEvent::ChunkRemoved(coord));
        }
        removed
    }

    /// Writes one voxel at local coordinates inside chunk `coord`.
    ///
    /// Returns `false` if the chunk is not loaded or `local` is out of
    /// bounds. An event is raised only when the value actually changes.
    pub fn set_voxel(&mut self, coord: ChunkCoord, local: [usize; 3], voxel: Voxel) -> bool {
        let Some(index) = self.shape.index(local[0], local[1], local[2]) else {
            tracing::debug!("set_voxel: local {local:?} outside chunk side {}", self.shape.side());
            return false;
        };
        let Some(chunk) = self.chunks.get_mut(&coord) else {
            return false;
        };
        if chunk.set(index, voxel) != voxel {
            self.events.push(WorldEvent::VoxelChanged { coord, index });
        }
        true
    }

    /// Resets every cell of chunk `coord` to `voxel`.
    pub fn fill_chunk(&mut self, coord: ChunkCoord, voxel: Voxel) -> bool {
        match self.chunks.get_mut(&coord) {
            Some(chunk) => {
                chunk.fill(voxel);
                self.events.push(WorldEvent::ChunkFilled(coord));
                true
            }
            None => false,
        }
    }

    /// Returns the chunk at `coord`.
    pub fn chunk(&self, coord: ChunkCoord) -> Option<&Chunk> {
        self.chunks.get(&coord)
    }

    /// Reads one voxel. Unloaded chunks and out-of-range cells read as empty.
    pub fn voxel(&self, coord: ChunkCoord, local: [usize; 3]) -> Voxel {
        self.shape
            .index(local[0], local[1], local[2])
            .and_then(|i| self.chunks.get(&coord).map(|c| c.storage().get(i)))
            .unwrap_or(Voxel::EMPTY)
    }

    /// Returns `true` if a chunk is loaded at `coord`.
    pub fn contains(&self, coord: ChunkCoord) -> bool {
        self.chunks.contains_key(&coord)
    }

    /// Number of loaded chunks.
    pub fn chunk_count(&self) -> usize {
        self.chunks.len()
    }

    /// Iterates over the coordinates of every loaded chunk.
    pub fn coords(&self) -> impl Iterator<Item = ChunkCoord> + '_ {
        self.chunks.keys().copied()
    }

    /// Takes every pending event, oldest first.
    pub fn drain_events(&mut self) -> Vec<WorldEvent> {
        std::mem::take(&mut self.events)
    }

    /// Number of events waiting to be drained.
    pub fn pending_events(&self) -> usize {
        self.events.len()
    }
}

impl ChunkSource for World {
    fn chunk_shape(&self) -> ChunkShape {
        self.shape
    }

    fn find_chunk(&self, coord: ChunkCoord) -> Option<&VoxelStorage> {
        self.chunks.get(&coord).map(Chunk::storage)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::StorageKind;

    const ORIGIN: ChunkCoord = ChunkCoord::new(0, 0, 0);

    #[test]
    fn test_create_and_remove_raise_events() {
        let mut world = World::new(8);
        world.create_chunk(ORIGIN);
        assert!(world.contains(ORIGIN));
        assert!(world.remove_chunk(ORIGIN).is_some());
        assert!(world.remove_chunk(ORIGIN).is_none());

        let events = world.drain_events();
        assert_eq!(
            events,
            vec![WorldEvent::ChunkCreated(ORIGIN), WorldEvent::ChunkRemoved(ORIGIN)]
        );
        assert_eq!(world.pending_events(), 0);
    }

    #[test]
    fn test_set_voxel_only_reports_changes() {
        let mut world = World::new(8);
        world.create_chunk(ORIGIN);
        world.drain_events();

        assert!(world.set_voxel(ORIGIN, [1, 2, 3], Voxel(5)));
        assert!(world.set_voxel(ORIGIN, [1, 2, 3], Voxel(5)));
        let events = world.drain_events();
        assert_eq!(events.len(), 1, "repeated write must not raise a second event");
        assert_eq!(
            events[0],
            WorldEvent::VoxelChanged {
                coord: ORIGIN,
                index: 1 + 2 * 8 + 3 * 64
            }
        );
        assert_eq!(world.voxel(ORIGIN, [1, 2, 3]), Voxel(5));
    }

    #[test]
    fn test_set_voxel_rejects_missing_chunk_and_bad_local() {
        let mut world = World::new(8);
        assert!(!world.set_voxel(ORIGIN, [0, 0, 0], Voxel(1)));
        world.create_chunk(ORIGIN);
        assert!(!world.set_voxel(ORIGIN, [8, 0, 0], Voxel(1)));
        assert_eq!(world.voxel(ORIGIN, [8, 0, 0]), Voxel::EMPTY);
    }

    #[test]
    fn test_fill_chunk_resets_to_uniform() {
        let mut world = World::new(4);
        world.create_chunk(ORIGIN);
        world.set_voxel(ORIGIN, [0, 0, 0], Voxel(2));
        assert!(world.fill_chunk(ORIGIN, Voxel(3)));
        let storage = world.find_chunk(ORIGIN).unwrap();
        assert_eq!(storage.kind(), StorageKind::Uniform);
        assert_eq!(storage.get(0), Voxel(3));
        assert!(!world.fill_chunk(ChunkCoord::new(9, 9, 9), Voxel(3)));
    }

    #[test]
    fn test_insert_mismatched_storage_is_replaced() {
        let mut world = World::new(4);
        let chunk = Chunk::from_storage(ORIGIN, VoxelStorage::filled(8, Voxel(1)));
        world.insert_chunk(chunk);
        assert_eq!(world.find_chunk(ORIGIN).unwrap().len(), 64);
        assert_eq!(world.voxel(ORIGIN, [0, 0, 0]), Voxel::EMPTY);
    }

    #[test]
    fn test_chunk_source_shape() {
        let world = World::new(16);
        assert_eq!(world.chunk_shape().volume(), 4096);
        assert!(world.find_chunk(ORIGIN).is_none());
    }
}
