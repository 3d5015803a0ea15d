//! Storage backends for atlas planes.
//!
//! The atlas decides *where* a layer goes; a [`PlaneBackend`] owns the actual
//! texel storage. [`CpuPlanes`] keeps layers in memory and is what headless
//! runs and tests use; [`WgpuPlanes`](crate::WgpuPlanes) uploads into GPU
//! array textures.

/// Texel storage for a set of fixed-size array planes.
///
/// Every method is called from the thread that owns the atlas.
pub trait PlaneBackend {
    /// Handle the renderer binds when drawing a plane.
    type Texture;

    /// Largest array-layer count the backend supports for one plane.
    fn max_array_layers(&self) -> u32;

    /// Creates plane `plane` with `layers` layers of `width x height` RGBA8
    /// texels, all transparent black.
    fn allocate_plane(&mut self, plane: u16, width: u32, height: u32, layers: u32);

    /// Overwrites one layer with tightly packed RGBA8 texels.
    fn write_layer(&mut self, plane: u16, layer: u32, rgba: &[u8]);

    /// Texture handle of a plane, or `None` if it was never allocated.
    fn plane_texture(&self, plane: u16) -> Option<&Self::Texture>;
}

/// One in-memory plane: a stack of equally sized RGBA8 images.
#[derive(Clone, Debug)]
pub struct CpuPlane {
    layers: Vec<image::RgbaImage>,
}

impl CpuPlane {
    /// Returns a layer image.
    pub fn layer(&self, index: u32) -> Option<&image::RgbaImage> {
        self.layers.get(index as usize)
    }

    /// Number of layers.
    pub fn layer_count(&self) -> u32 {
        self.layers.len() as u32
    }
}

/// In-memory backend.
#[derive(Clone, Debug)]
pub struct CpuPlanes {
    max_layers: u32,
    planes: Vec<CpuPlane>,
    layer_writes: usize,
}

impl CpuPlanes {
    /// Creates a backend that reports `max_layers` as its array-layer limit.
    pub fn new(max_layers: u32) -> Self {
        Self {
            max_layers,
            planes: Vec::new(),
            layer_writes: 0,
        }
    }

    /// Total number of layers written since creation.
    pub fn layer_writes(&self) -> usize {
        self.layer_writes
    }
}

impl Default for CpuPlanes {
    fn default() -> Self {
        Self::new(256)
    }
}

impl PlaneBackend for CpuPlanes {
    type Texture = CpuPlane;

    fn max_array_layers(&self) -> u32 {
        self.max_layers
    }

    fn allocate_plane(&mut self, plane: u16, width: u32, height: u32, layers: u32) {
        let index = plane as usize;
        if self.planes.len() <= index {
            self.planes.resize_with(index + 1, || CpuPlane { layers: Vec::new() });
        }
        self.planes[index] = CpuPlane {
            layers: (0..layers)
                .map(|_| image::RgbaImage::new(width, height))
                .collect(),
        };
    }

    fn write_layer(&mut self, plane: u16, layer: u32, rgba: &[u8]) {
        let Some(target) = self
            .planes
            .get_mut(plane as usize)
            .and_then(|p| p.layers.get_mut(layer as usize))
        else {
            tracing::warn!("write to unallocated atlas layer {plane}:{layer}");
            return;
        };
        let dst: &mut [u8] = target;
        if dst.len() != rgba.len() {
            tracing::warn!(
                "atlas layer {plane}:{layer} expects {} bytes, got {}",
                dst.len(),
                rgba.len()
            );
            return;
        }
        dst.copy_from_slice(rgba);
        self.layer_writes += 1;
    }

    fn plane_texture(&self, plane: u16) -> Option<&CpuPlane> {
        self.planes.get(plane as usize)
    }
}
