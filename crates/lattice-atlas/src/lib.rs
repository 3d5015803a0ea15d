//! Voxel texture atlas: deduplicated image strips packed into fixed-capacity array-texture planes.

pub mod atlas;
pub mod backend;
pub mod gpu;

pub use atlas::{
    AtlasError, AtlasStrip, MAX_ATLAS_PLANES, MAX_LAYERS_PER_PLANE, MAX_STRIP_FRAMES,
    MIN_LAYERS_PER_PLANE, TextureAtlas, strip_hash,
};
pub use backend::{CpuPlane, CpuPlanes, PlaneBackend};
pub use gpu::{ATLAS_FORMAT, GpuPlane, WgpuPlanes};
