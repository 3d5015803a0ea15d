//! wgpu array-texture backend for atlas planes.

use crate::backend::PlaneBackend;

/// Format every atlas plane uses.
pub const ATLAS_FORMAT: wgpu::TextureFormat = wgpu::TextureFormat::Rgba8UnormSrgb;

/// One GPU plane: the array texture and a `D2Array` view over it.
pub struct GpuPlane {
    /// The array texture.
    pub texture: wgpu::Texture,
    /// View covering every layer, ready for binding.
    pub view: wgpu::TextureView,
    width: u32,
    height: u32,
}

/// Atlas planes stored as wgpu 2D array textures.
pub struct WgpuPlanes {
    device: wgpu::Device,
    queue: wgpu::Queue,
    planes: Vec<Option<GpuPlane>>,
}

impl WgpuPlanes {
    /// Creates a backend on `device`. Uploads go through `queue`.
    pub fn new(device: wgpu::Device, queue: wgpu::Queue) -> Self {
        Self {
            device,
            queue,
            planes: Vec::new(),
        }
    }
}

impl PlaneBackend for WgpuPlanes {
    type Texture = GpuPlane;

    fn max_array_layers(&self) -> u32 {
        self.device.limits().max_texture_array_layers
    }

    fn allocate_plane(&mut self, plane: u16, width: u32, height: u32, layers: u32) {
        let label = format!("atlas-plane-{plane}");
        // wgpu zero-initializes new textures, which gives the blank layers.
        let texture = self.device.create_texture(&wgpu::TextureDescriptor {
            label: Some(&label),
            size: wgpu::Extent3d {
                width,
                height,
                depth_or_array_layers: layers,
            },
            mip_level_count: 1,
            sample_count: 1,
            dimension: wgpu::TextureDimension::D2,
            format: ATLAS_FORMAT,
            usage: wgpu::TextureUsages::TEXTURE_BINDING | wgpu::TextureUsages::COPY_DST,
            view_formats: &[],
        });
        let view = texture.create_view(&wgpu::TextureViewDescriptor {
            label: Some(&label),
            dimension: Some(wgpu::TextureViewDimension::D2Array),
            ..Default::default()
        });

        let index = plane as usize;
        if self.planes.len() <= index {
            self.planes.resize_with(index + 1, || None);
        }
        self.planes[index] = Some(GpuPlane {
            texture,
            view,
            width,
            height,
        });
    }

    fn write_layer(&mut self, plane: u16, layer: u32, rgba: &[u8]) {
        let Some(target) = self.planes.get(plane as usize).and_then(Option::as_ref) else {
            tracing::warn!("write to unallocated atlas plane {plane}");
            return;
        };
        let expected = (target.width * target.height * 4) as usize;
        if rgba.len() != expected || layer >= target.texture.depth_or_array_layers() {
            tracing::warn!(
                "rejected atlas write {plane}:{layer} ({} bytes, expected {expected})",
                rgba.len()
            );
            return;
        }
        self.queue.write_texture(
            wgpu::TexelCopyTextureInfo {
                texture: &target.texture,
                mip_level: 0,
                origin: wgpu::Origin3d {
                    x: 0,
                    y: 0,
                    z: layer,
                },
                aspect: wgpu::TextureAspect::All,
            },
            rgba,
            wgpu::TexelCopyBufferLayout {
                offset: 0,
                bytes_per_row: Some(target.width * 4),
                rows_per_image: Some(target.height),
            },
            wgpu::Extent3d {
                width: target.width,
                height: target.height,
                depth_or_array_layers: 1,
            },
        );
    }

    fn plane_texture(&self, plane: u16) -> Option<&GpuPlane> {
        self.planes.get(plane as usize).and_then(Option::as_ref)
    }
}
