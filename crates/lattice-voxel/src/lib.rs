//! Adaptive voxel storage, voxel type registry, chunks, and the loaded-world collaborator.

pub mod chunk;
pub mod registry;
pub mod storage;
pub mod world;

pub use chunk::{Chunk, ChunkCoord, ChunkShape};
pub use registry::{
    FACE_COUNT, RegistryError, RenderClass, TextureRef, VoxelTypeInfo, VoxelTypeRegistry,
};
pub use storage::{PALETTE_CAPACITY, PaletteEntry, StorageKind, Voxel, VoxelStorage};
pub use world::{ChunkSource, World, WorldEvent};
