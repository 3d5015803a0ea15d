//! Renderer seam: per-chunk, per-plane quad buffers.
//!
//! The scheduler hands finished quad lists to a [`QuadBufferSink`] on the main
//! thread and keeps the returned handles in a [`ChunkMeshRecord`]. Nothing in
//! here is touched by meshing workers.

use lattice_voxel::ChunkCoord;
use rustc_hash::FxHashMap;
use wgpu::util::DeviceExt;

use crate::quad::{PackedQuad, VERTICES_PER_QUAD};

/// Opaque identifier of an uploaded buffer.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct BufferHandle(pub u64);

/// A plane's geometry for one chunk.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct PlaneBuffer {
    /// Buffer holding the packed quads.
    pub handle: BufferHandle,
    /// Vertices to draw: quad count times [`VERTICES_PER_QUAD`].
    pub vertex_count: u32,
}

impl PlaneBuffer {
    /// Quads held by the buffer.
    pub fn quad_count(&self) -> u32 {
        self.vertex_count / VERTICES_PER_QUAD
    }
}

/// Everything the renderer needs to draw one chunk.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ChunkMeshRecord {
    planes: Vec<Option<PlaneBuffer>>,
}

impl ChunkMeshRecord {
    /// Buffer for `plane`, if that plane has geometry.
    pub fn plane(&self, plane: u16) -> Option<&PlaneBuffer> {
        self.planes.get(plane as usize).and_then(Option::as_ref)
    }

    /// Replaces the buffer for `plane`, returning the previous one.
    pub fn replace(&mut self, plane: u16, buffer: Option<PlaneBuffer>) -> Option<PlaneBuffer> {
        let index = plane as usize;
        if self.planes.len() <= index {
            if buffer.is_none() {
                return None;
            }
            self.planes.resize(index + 1, None);
        }
        std::mem::replace(&mut self.planes[index], buffer)
    }

    /// One past the highest plane slot ever used.
    pub fn plane_slots(&self) -> usize {
        self.planes.len()
    }

    /// Iterates over planes with geometry.
    pub fn iter(&self) -> impl Iterator<Item = (u16, &PlaneBuffer)> {
        self.planes
            .iter()
            .enumerate()
            .filter_map(|(p, b)| b.as_ref().map(|b| (p as u16, b)))
    }

    /// Removes and returns every buffer.
    pub fn take_all(&mut self) -> Vec<PlaneBuffer> {
        self.planes.drain(..).flatten().collect()
    }

    /// Total quads across all planes.
    pub fn quad_count(&self) -> u32 {
        self.iter().map(|(_, b)| b.quad_count()).sum()
    }

    /// Returns `true` if no plane has geometry.
    pub fn is_empty(&self) -> bool {
        self.planes.iter().all(Option::is_none)
    }
}

/// Receives finished geometry. Implemented by the renderer.
pub trait QuadBufferSink {
    /// Stores `bytes` (packed quads) for one plane of chunk `coord`.
    ///
    /// `previous` is the handle currently attached to that plane, which the
    /// sink may overwrite in place. The returned handle replaces it.
    fn upload(
        &mut self,
        coord: ChunkCoord,
        plane: u16,
        bytes: &[u8],
        previous: Option<BufferHandle>,
    ) -> BufferHandle;

    /// Frees a buffer that is no longer attached to any chunk.
    fn release(&mut self, handle: BufferHandle);
}

// ---------------------------------------------------------------------------
// CpuQuadBuffers
// ---------------------------------------------------------------------------

/// In-memory sink for headless runs and tests.
#[derive(Debug, Default)]
pub struct CpuQuadBuffers {
    buffers: FxHashMap<BufferHandle, (ChunkCoord, u16, Vec<u8>)>,
    next_id: u64,
    uploads: usize,
    releases: usize,
}

impl CpuQuadBuffers {
    /// Creates an empty sink.
    pub fn new() -> Self {
        Self::default()
    }

    /// Quads stored under `handle`.
    pub fn quads(&self, handle: BufferHandle) -> Option<Vec<PackedQuad>> {
        self.buffers
            .get(&handle)
            .map(|(_, _, bytes)| bytemuck::pod_collect_to_vec(bytes))
    }

    /// Number of live buffers.
    pub fn live_buffers(&self) -> usize {
        self.buffers.len()
    }

    /// Returns `true` if any live buffer belongs to chunk `coord`.
    pub fn has_buffers_for(&self, coord: ChunkCoord) -> bool {
        self.buffers.values().any(|(c, _, _)| *c == coord)
    }

    /// Total `upload` calls.
    pub fn upload_count(&self) -> usize {
        self.uploads
    }

    /// Total `release` calls.
    pub fn release_count(&self) -> usize {
        self.releases
    }
}

impl QuadBufferSink for CpuQuadBuffers {
    fn upload(
        &mut self,
        coord: ChunkCoord,
        plane: u16,
        bytes: &[u8],
        previous: Option<BufferHandle>,
    ) -> BufferHandle {
        self.uploads += 1;
        if let Some(handle) = previous
            && let Some(slot) = self.buffers.get_mut(&handle)
        {
            *slot = (coord, plane, bytes.to_vec());
            return handle;
        }
        let handle = BufferHandle(self.next_id);
        self.next_id += 1;
        self.buffers.insert(handle, (coord, plane, bytes.to_vec()));
        handle
    }

    fn release(&mut self, handle: BufferHandle) {
        self.releases += 1;
        self.buffers.remove(&handle);
    }
}

// ---------------------------------------------------------------------------
// WgpuQuadBuffers
// ---------------------------------------------------------------------------

/// Sink that stores quads in wgpu vertex buffers bound with
/// [`QUAD_INSTANCE_LAYOUT`](crate::QUAD_INSTANCE_LAYOUT).
///
/// A re-upload that fits in the previous buffer is written in place via
/// `queue.write_buffer`; otherwise the buffer is recreated.
pub struct WgpuQuadBuffers {
    device: wgpu::Device,
    queue: wgpu::Queue,
    buffers: FxHashMap<BufferHandle, wgpu::Buffer>,
    next_id: u64,
}

impl WgpuQuadBuffers {
    /// Creates a sink on `device`.
    pub fn new(device: wgpu::Device, queue: wgpu::Queue) -> Self {
        Self {
            device,
            queue,
            buffers: FxHashMap::default(),
            next_id: 0,
        }
    }

    /// The buffer behind `handle`, for binding during draw.
    pub fn buffer(&self, handle: BufferHandle) -> Option<&wgpu::Buffer> {
        self.buffers.get(&handle)
    }

    /// Number of live buffers.
    pub fn live_buffers(&self) -> usize {
        self.buffers.len()
    }
}

impl QuadBufferSink for WgpuQuadBuffers {
    fn upload(
        &mut self,
        coord: ChunkCoord,
        plane: u16,
        bytes: &[u8],
        previous: Option<BufferHandle>,
    ) -> BufferHandle {
        if let Some(handle) = previous {
            if let Some(buffer) = self.buffers.get(&handle)
                && bytes.len() as u64 <= buffer.size()
            {
                self.queue.write_buffer(buffer, 0, bytes);
                return handle;
            }
            self.release(handle);
        }

        let label = format!("quads {},{},{} plane {plane}", coord.x, coord.y, coord.z);
        let buffer = self
            .device
            .create_buffer_init(&wgpu::util::BufferInitDescriptor {
                label: Some(&label),
                contents: bytes,
                usage: wgpu::BufferUsages::VERTEX | wgpu::BufferUsages::COPY_DST,
            });
        let handle = BufferHandle(self.next_id);
        self.next_id += 1;
        self.buffers.insert(handle, buffer);
        handle
    }

    fn release(&mut self, handle: BufferHandle) {
        if let Some(buffer) = self.buffers.remove(&handle) {
            buffer.destroy();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::face::FaceDirection;

    fn quad_bytes(count: usize) -> Vec<u8> {
        let quads: Vec<PackedQuad> = (0..count)
            .map(|i| PackedQuad::new([i as u8, 0, 0], FaceDirection::PosY, 1, 1, 0, 1))
            .collect();
        bytemuck::cast_slice(&quads).to_vec()
    }

    fn test_device() -> Option<(wgpu::Device, wgpu::Queue)> {
        pollster::block_on(async {
            let instance = wgpu::Instance::new(&wgpu::InstanceDescriptor {
                backends: wgpu::Backends::all(),
                ..Default::default()
            });
            let adapter = instance
                .request_adapter(&wgpu::RequestAdapterOptions {
                    power_preference: wgpu::PowerPreference::default(),
                    compatible_surface: None,
                    force_fallback_adapter: false,
                })
                .await
                .ok()?;
            adapter
                .request_device(&wgpu::DeviceDescriptor::default())
                .await
                .ok()
        })
    }

    #[test]
    fn test_record_replace_and_take() {
        let mut record = ChunkMeshRecord::default();
        assert!(record.replace(3, None).is_none());
        assert_eq!(record.plane_slots(), 0);

        let buf = PlaneBuffer {
            handle: BufferHandle(9),
            vertex_count: 12,
        };
        assert!(record.replace(2, Some(buf)).is_none());
        assert_eq!(record.plane(2), Some(&buf));
        assert_eq!(record.quad_count(), 2);
        assert!(!record.is_empty());

        assert_eq!(record.take_all(), vec![buf]);
        assert!(record.is_empty());
    }

    #[test]
    fn test_cpu_sink_reuses_previous_handle() {
        let mut sink = CpuQuadBuffers::new();
        let coord = ChunkCoord::new(0, 0, 0);
        let h1 = sink.upload(coord, 0, &quad_bytes(2), None);
        let h2 = sink.upload(coord, 0, &quad_bytes(5), Some(h1));
        assert_eq!(h1, h2);
        assert_eq!(sink.quads(h1).unwrap().len(), 5);
        assert_eq!(sink.live_buffers(), 1);

        // A stale previous handle gets a fresh buffer.
        sink.release(h1);
        let h3 = sink.upload(coord, 0, &quad_bytes(1), Some(h1));
        assert_ne!(h3, h1);
        assert!(sink.has_buffers_for(coord));
        assert_eq!(sink.upload_count(), 3);
        assert_eq!(sink.release_count(), 1);
    }

    #[test]
    fn test_gpu_sink_writes_in_place_when_it_fits() {
        let Some((device, queue)) = test_device() else {
            return;
        };
        let mut sink = WgpuQuadBuffers::new(device, queue);
        let coord = ChunkCoord::new(1, 2, 3);

        let h1 = sink.upload(coord, 0, &quad_bytes(10), None);
        let h2 = sink.upload(coord, 0, &quad_bytes(4), Some(h1));
        assert_eq!(h1, h2, "smaller data reuses the buffer");

        let h3 = sink.upload(coord, 0, &quad_bytes(64), Some(h2));
        assert_ne!(h2, h3, "larger data recreates the buffer");
        assert!(sink.buffer(h2).is_none());
        assert_eq!(sink.buffer(h3).unwrap().size(), 64 * 8);
        assert_eq!(sink.live_buffers(), 1);
    }
}
