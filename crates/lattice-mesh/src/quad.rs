//! Packed per-quad instance format and its canonical `wgpu` buffer layout.
//!
//! Each greedy rectangle becomes one 8-byte [`PackedQuad`] instance; the
//! vertex shader expands it into two triangles ([`VERTICES_PER_QUAD`]
//! vertices). The atlas plane is not encoded: quads are bucketed per plane,
//! one buffer each.
//!
//! ## Bit Layout
//!
//! | Word | Bits   | Field                               |
//! |------|--------|-------------------------------------|
//! | 0    | 0..6   | x (chunk-local cell, 0..=63)        |
//! | 0    | 6..12  | y                                   |
//! | 0    | 12..18 | z                                   |
//! | 0    | 18..21 | face direction (0..=5)              |
//! | 0    | 21..26 | width - 1 along the face's u axis   |
//! | 0    | 26..31 | height - 1 along the face's v axis  |
//! | 1    | 0..11  | atlas layer offset (0..2048)        |
//! | 1    | 11..19 | frame count (1..=255)               |

use std::mem;

use wgpu::{VertexAttribute, VertexBufferLayout, VertexFormat, VertexStepMode};

use crate::face::FaceDirection;

/// Vertices the shader emits per quad instance.
pub const VERTICES_PER_QUAD: u32 = 6;

/// Largest width or height a single quad can span.
pub const MAX_QUAD_EXTENT: u32 = 32;

const COORD_MASK: u32 = 0x3F;
const FACE_MASK: u32 = 0x7;
const EXTENT_MASK: u32 = 0x1F;
const OFFSET_MASK: u32 = 0x7FF;
const FRAMES_MASK: u32 = 0xFF;

/// One greedy-merged face rectangle, packed for GPU upload.
#[repr(C)]
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, bytemuck::Pod, bytemuck::Zeroable)]
pub struct PackedQuad {
    /// Origin cell, face, and extents.
    pub geometry: u32,
    /// Atlas layer offset and frame count.
    pub texture: u32,
}

static_assertions::assert_eq_size!(PackedQuad, [u8; 8]);

impl PackedQuad {
    /// Packs a quad. `origin` is the chunk-local cell at the rectangle's
    /// lowest `(u, v)` corner; `width`/`height` are at least 1.
    pub fn new(
        origin: [u8; 3],
        face: FaceDirection,
        width: u32,
        height: u32,
        layer_offset: u32,
        frame_count: u32,
    ) -> Self {
        debug_assert!(origin.iter().all(|&c| u32::from(c) <= COORD_MASK));
        debug_assert!((1..=MAX_QUAD_EXTENT).contains(&width));
        debug_assert!((1..=MAX_QUAD_EXTENT).contains(&height));
        debug_assert!(layer_offset <= OFFSET_MASK);
        debug_assert!((1..=FRAMES_MASK).contains(&frame_count));

        let geometry = (u32::from(origin[0]) & COORD_MASK)
            | (u32::from(origin[1]) & COORD_MASK) << 6
            | (u32::from(origin[2]) & COORD_MASK) << 12
            | (face as u32 & FACE_MASK) << 18
            | (width.saturating_sub(1) & EXTENT_MASK) << 21
            | (height.saturating_sub(1) & EXTENT_MASK) << 26;
        let texture = (layer_offset & OFFSET_MASK) | (frame_count & FRAMES_MASK) << 11;
        Self { geometry, texture }
    }

    /// Origin cell in chunk-local coordinates.
    pub fn origin(&self) -> [u8; 3] {
        [
            (self.geometry & COORD_MASK) as u8,
            (self.geometry >> 6 & COORD_MASK) as u8,
            (self.geometry >> 12 & COORD_MASK) as u8,
        ]
    }

    /// Face direction, or `None` if the stored value is out of range.
    pub fn face(&self) -> Option<FaceDirection> {
        FaceDirection::from_u8((self.geometry >> 18 & FACE_MASK) as u8)
    }

    /// Extent along the face's u axis.
    pub fn width(&self) -> u32 {
        (self.geometry >> 21 & EXTENT_MASK) + 1
    }

    /// Extent along the face's v axis.
    pub fn height(&self) -> u32 {
        (self.geometry >> 26 & EXTENT_MASK) + 1
    }

    /// First atlas layer of the texture strip.
    pub fn layer_offset(&self) -> u32 {
        self.texture & OFFSET_MASK
    }

    /// Number of animation frames in the strip.
    pub fn frame_count(&self) -> u32 {
        self.texture >> 11 & FRAMES_MASK
    }

    /// Voxel faces covered by this quad.
    pub fn area(&self) -> u32 {
        self.width() * self.height()
    }
}

/// Instance attributes: both words as one `Uint32x2`.
pub const QUAD_INSTANCE_ATTRIBUTES: [VertexAttribute; 1] = [VertexAttribute {
    format: VertexFormat::Uint32x2,
    offset: 0,
    shader_location: 0,
}];

/// The instance buffer layout every chunk pipeline binds.
pub const QUAD_INSTANCE_LAYOUT: VertexBufferLayout<'static> = VertexBufferLayout {
    array_stride: mem::size_of::<PackedQuad>() as u64,
    step_mode: VertexStepMode::Instance,
    attributes: &QUAD_INSTANCE_ATTRIBUTES,
};

const _: () = assert!(
    mem::size_of::<PackedQuad>() == 8,
    "PackedQuad size changed, update QUAD_INSTANCE_LAYOUT"
);
const _: () = assert!(
    QUAD_INSTANCE_ATTRIBUTES[0].offset + 8 <= mem::size_of::<PackedQuad>() as u64,
    "attribute exceeds instance stride"
);
const _: () = assert!(MAX_QUAD_EXTENT - 1 <= EXTENT_MASK);

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fields_survive_packing_at_limits() {
        let q = PackedQuad::new([31, 0, 17], FaceDirection::NegZ, 32, 1, 2047, 255);
        assert_eq!(q.origin(), [31, 0, 17]);
        assert_eq!(q.face(), Some(FaceDirection::NegZ));
        assert_eq!(q.width(), 32);
        assert_eq!(q.height(), 1);
        assert_eq!(q.layer_offset(), 2047);
        assert_eq!(q.frame_count(), 255);
        assert_eq!(q.area(), 32);
    }

    #[test]
    fn test_fields_do_not_bleed_into_each_other() {
        let q = PackedQuad::new([0, 0, 0], FaceDirection::PosX, 1, 32, 0, 1);
        assert_eq!(q.origin(), [0, 0, 0]);
        assert_eq!(q.width(), 1);
        assert_eq!(q.height(), 32);
        assert_eq!(q.layer_offset(), 0);
    }

    #[test]
    fn test_bytes_cast() {
        let quads = [
            PackedQuad::new([1, 2, 3], FaceDirection::PosY, 4, 5, 6, 1),
            PackedQuad::new([4, 5, 6], FaceDirection::NegY, 1, 1, 7, 2),
        ];
        let bytes: &[u8] = bytemuck::cast_slice(&quads);
        assert_eq!(bytes.len(), 16);
        let back: Vec<PackedQuad> = bytemuck::pod_collect_to_vec(bytes);
        assert_eq!(back, quads);
    }

    #[test]
    fn test_layout_matches_struct() {
        assert_eq!(QUAD_INSTANCE_LAYOUT.array_stride, 8);
        assert_eq!(QUAD_INSTANCE_LAYOUT.step_mode, VertexStepMode::Instance);
        assert_eq!(QUAD_INSTANCE_ATTRIBUTES[0].format.size(), 8);
    }
}
