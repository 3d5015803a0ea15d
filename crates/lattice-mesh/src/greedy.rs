//! Greedy meshing: merges coplanar, same-type visible faces into the fewest
//! axis-aligned rectangles and buckets them by atlas plane.

use std::hash::BuildHasher;

use lattice_voxel::{TextureRef, Voxel, VoxelStorage, VoxelTypeInfo, VoxelTypeRegistry};
use rustc_hash::FxBuildHasher;

use crate::face::FaceDirection;
use crate::quad::{MAX_QUAD_EXTENT, PackedQuad};
use crate::snapshot::ChunkSnapshot;

/// Texture used for faces of a type whose textures were never resolved.
const UNTEXTURED: TextureRef = TextureRef {
    plane: 0,
    offset: 0,
    frame_count: 1,
};

/// Meshing output: one quad list per atlas plane.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ChunkQuads {
    planes: Vec<Vec<PackedQuad>>,
}

impl ChunkQuads {
    /// Appends a quad to the list of `plane`.
    pub fn push(&mut self, plane: u16, quad: PackedQuad) {
        let index = plane as usize;
        if self.planes.len() <= index {
            self.planes.resize_with(index + 1, Vec::new);
        }
        self.planes[index].push(quad);
    }

    /// Quads destined for `plane`. Empty for planes nothing landed on.
    pub fn plane(&self, plane: u16) -> &[PackedQuad] {
        self.planes.get(plane as usize).map_or(&[], Vec::as_slice)
    }

    /// One past the highest plane that received a quad.
    pub fn plane_slots(&self) -> usize {
        self.planes.len()
    }

    /// Total quads across all planes.
    pub fn quad_count(&self) -> usize {
        self.planes.iter().map(Vec::len).sum()
    }

    /// Returns `true` if no quad was emitted.
    pub fn is_empty(&self) -> bool {
        self.planes.iter().all(Vec::is_empty)
    }

    /// Iterates over every quad with its plane.
    pub fn iter(&self) -> impl Iterator<Item = (u16, &PackedQuad)> {
        self.planes
            .iter()
            .enumerate()
            .flat_map(|(p, quads)| quads.iter().map(move |q| (p as u16, q)))
    }
}

/// Chooses one of `count` interchangeable texture variants for a world cell.
///
/// Hashes the wrapping product `x * y * z`, so the same cell always gets the
/// same variant.
pub fn pick_variant(x: i32, y: i32, z: i32, count: usize) -> usize {
    if count <= 1 {
        return 0;
    }
    let product = x.wrapping_mul(y).wrapping_mul(z);
    (FxBuildHasher.hash_one(product) % count as u64) as usize
}

/// Converts abstract axis coordinates back to concrete `[x, y, z]`.
///
/// `layer_axis`, `u_axis`, `v_axis` are 0=X, 1=Y, 2=Z.
fn axes_to_xyz(axes: (usize, usize, usize), layer: usize, u: usize, v: usize) -> [usize; 3] {
    let mut coords = [0usize; 3];
    coords[axes.0] = layer;
    coords[axes.1] = u;
    coords[axes.2] = v;
    coords
}

/// Meshes a snapshot. A snapshot without a centre chunk yields no quads.
pub fn greedy_mesh(snapshot: &ChunkSnapshot, registry: &VoxelTypeRegistry) -> ChunkQuads {
    greedy_mesh_cancellable(snapshot, registry, || false).unwrap_or_default()
}

/// Meshes a snapshot, polling `is_cancelled` before each voxel-type pass.
///
/// Returns `None` as soon as cancellation is observed. Chunks whose side
/// does not fit the packed quad extent produce no quads.
pub fn greedy_mesh_cancellable(
    snapshot: &ChunkSnapshot,
    registry: &VoxelTypeRegistry,
    is_cancelled: impl Fn() -> bool,
) -> Option<ChunkQuads> {
    let mut quads = ChunkQuads::default();
    let Some(center) = snapshot.center() else {
        return Some(quads);
    };
    let side = snapshot.shape().side();
    if side == 0 || side > MAX_QUAD_EXTENT as usize {
        return Some(quads);
    }
    let mut mask: Vec<Option<TextureRef>> = vec![None; side * side];

    for voxel in center.distinct_voxels() {
        if is_cancelled() {
            return None;
        }
        let Some(info) = registry.get(voxel) else {
            continue;
        };
        if voxel.is_empty() || info.is_invisible() {
            continue;
        }
        for dir in FaceDirection::ALL {
            mesh_face(
                snapshot, center, registry, voxel, info, dir, &mut mask, &mut quads,
            );
        }
    }

    Some(quads)
}

/// Sweeps every layer perpendicular to `dir` for one voxel type.
///
/// Each visible mask cell holds the texture picked for that cell, and
/// rectangles only grow across cells with the same texture, so variant
/// types keep their per-voxel variety.
#[allow(clippy::too_many_arguments)]
fn mesh_face(
    snapshot: &ChunkSnapshot,
    center: &VoxelStorage,
    registry: &VoxelTypeRegistry,
    voxel: Voxel,
    info: &VoxelTypeInfo,
    dir: FaceDirection,
    mask: &mut [Option<TextureRef>],
    out: &mut ChunkQuads,
) {
    let shape = snapshot.shape();
    let side = shape.side();
    let axes = dir.sweep_axes();
    let class = info.render_class;
    let textures = info.textures(dir.index());
    let base = {
        let c = snapshot.coord();
        let s = side as i32;
        [c.x * s, c.y * s, c.z * s]
    };

    for layer in 0..side {
        // Visibility mask for this layer.
        let mut any = false;
        for v in 0..side {
            for u in 0..side {
                let p = axes_to_xyz(axes, layer, u, v);
                let visible = shape
                    .index(p[0], p[1], p[2])
                    .is_some_and(|i| center.get(i) == voxel)
                    && {
                        let (nx, ny, nz) = dir.offset(p[0] as i32, p[1] as i32, p[2] as i32);
                        let neighbor = snapshot.voxel(nx, ny, nz);
                        neighbor.is_empty() || registry.render_class(neighbor) != class
                    };
                mask[v * side + u] = visible.then(|| {
                    select_texture(
                        textures,
                        info.animated,
                        [
                            base[0].wrapping_add(p[0] as i32),
                            base[1].wrapping_add(p[1] as i32),
                            base[2].wrapping_add(p[2] as i32),
                        ],
                    )
                });
                any |= visible;
            }
        }
        if !any {
            continue;
        }

        for v in 0..side {
            for u in 0..side {
                let Some(texture) = mask[v * side + u] else {
                    continue;
                };

                // Extend width along u-axis.
                let mut w = 1;
                while u + w < side && mask[v * side + u + w] == Some(texture) {
                    w += 1;
                }

                // Extend height along v-axis.
                let mut h = 1;
                'outer: while v + h < side {
                    for du in 0..w {
                        if mask[(v + h) * side + u + du] != Some(texture) {
                            break 'outer;
                        }
                    }
                    h += 1;
                }

                for dv in 0..h {
                    mask[(v + dv) * side + u..(v + dv) * side + u + w].fill(None);
                }

                let origin = axes_to_xyz(axes, layer, u, v);
                out.push(
                    texture.plane,
                    PackedQuad::new(
                        [origin[0] as u8, origin[1] as u8, origin[2] as u8],
                        dir,
                        w as u32,
                        h as u32,
                        u32::from(texture.offset),
                        u32::from(texture.frame_count.max(1)),
                    ),
                );
            }
        }
    }
}

fn select_texture(textures: &[TextureRef], animated: bool, world: [i32; 3]) -> TextureRef {
    match textures {
        [] => UNTEXTURED,
        [only] => *only,
        _ if animated => textures[0],
        _ => textures[pick_variant(world[0], world[1], world[2], textures.len())],
    }
}
