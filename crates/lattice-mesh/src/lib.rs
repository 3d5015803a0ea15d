//! Greedy chunk meshing and the asynchronous re-meshing scheduler.
//!
//! Chunks are snapshotted on the main thread, meshed into packed quads on a
//! worker pool, and handed back to a [`QuadBufferSink`] bucketed by atlas
//! plane. [`MeshingSubsystem`] wires the atlas, voxel registry, and
//! [`MeshScheduler`] together.

pub mod buffers;
pub mod error;
pub mod face;
pub mod greedy;
pub mod quad;
pub mod scheduler;
pub mod snapshot;
pub mod subsystem;

pub use buffers::{
    BufferHandle, ChunkMeshRecord, CpuQuadBuffers, PlaneBuffer, QuadBufferSink, WgpuQuadBuffers,
};
pub use error::SubsystemError;
pub use face::FaceDirection;
pub use greedy::{ChunkQuads, greedy_mesh, greedy_mesh_cancellable, pick_variant};
pub use lattice_atlas::MAX_ATLAS_PLANES;
pub use quad::{
    MAX_QUAD_EXTENT, PackedQuad, QUAD_INSTANCE_ATTRIBUTES, QUAD_INSTANCE_LAYOUT, VERTICES_PER_QUAD,
};
pub use scheduler::{MeshScheduler, MeshState, TickStats};
pub use snapshot::ChunkSnapshot;
pub use subsystem::MeshingSubsystem;
