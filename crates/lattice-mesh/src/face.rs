//! The six cube face directions and the axis bookkeeping greedy meshing needs.

use lattice_voxel::ChunkCoord;

/// One of the six cardinal directions a voxel face can point.
///
/// The discriminant is the face slot used by [`lattice_voxel::VoxelTypeInfo`]
/// and the 3-bit face field of [`crate::PackedQuad`].
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum FaceDirection {
    /// +X direction.
    PosX = 0,
    /// −X direction.
    NegX = 1,
    /// +Y direction.
    PosY = 2,
    /// −Y direction.
    NegY = 3,
    /// +Z direction.
    PosZ = 4,
    /// −Z direction.
    NegZ = 5,
}

impl FaceDirection {
    /// All six directions in order.
    pub const ALL: [FaceDirection; 6] = [
        Self::PosX,
        Self::NegX,
        Self::PosY,
        Self::NegY,
        Self::PosZ,
        Self::NegZ,
    ];

    /// Decodes a direction index. Returns `None` above 5.
    pub fn from_u8(value: u8) -> Option<Self> {
        Self::ALL.get(value as usize).copied()
    }

    /// Returns the sweep axes for greedy meshing: `(layer_axis, u_axis, v_axis)`.
    ///
    /// `layer_axis` is the axis perpendicular to the face (the normal direction).
    /// `u_axis` and `v_axis` span the face plane. Each value is 0=X, 1=Y, 2=Z.
    pub fn sweep_axes(self) -> (usize, usize, usize) {
        match self {
            Self::PosX | Self::NegX => (0, 2, 1), // layer=X, u=Z, v=Y
            Self::PosY | Self::NegY => (1, 0, 2), // layer=Y, u=X, v=Z
            Self::PosZ | Self::NegZ => (2, 0, 1), // layer=Z, u=X, v=Y
        }
    }

    /// Unit step along the normal: `+1` for positive faces, `-1` otherwise.
    pub fn sign(self) -> i32 {
        match self {
            Self::PosX | Self::PosY | Self::PosZ => 1,
            Self::NegX | Self::NegY | Self::NegZ => -1,
        }
    }

    /// Returns the neighbor coordinate offset for this direction.
    pub fn offset(self, x: i32, y: i32, z: i32) -> (i32, i32, i32) {
        match self {
            Self::PosX => (x + 1, y, z),
            Self::NegX => (x - 1, y, z),
            Self::PosY => (x, y + 1, z),
            Self::NegY => (x, y - 1, z),
            Self::PosZ => (x, y, z + 1),
            Self::NegZ => (x, y, z - 1),
        }
    }

    /// The chunk sharing this face of `coord`.
    pub fn neighbor(self, coord: ChunkCoord) -> ChunkCoord {
        let (x, y, z) = self.offset(coord.x, coord.y, coord.z);
        ChunkCoord::new(x, y, z)
    }

    /// Returns the opposite face direction.
    pub fn opposite(self) -> Self {
        match self {
            Self::PosX => Self::NegX,
            Self::NegX => Self::PosX,
            Self::PosY => Self::NegY,
            Self::NegY => Self::PosY,
            Self::PosZ => Self::NegZ,
            Self::NegZ => Self::PosZ,
        }
    }

    /// Returns the direction index (0–5).
    pub fn index(self) -> usize {
        self as usize
    }
}
