//! Voxel type registry: maps compact [`Voxel`] ids to [`VoxelTypeInfo`] descriptors.
//!
//! Air is always id 0 so that freshly created storage represents empty space.
//! Texture paths are resolved into atlas coordinates by the owner of the GPU
//! context; meshing workers only ever read the resolved [`TextureRef`]s.

use rustc_hash::FxHashMap;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::storage::Voxel;

// ---------------------------------------------------------------------------
// Types
// ---------------------------------------------------------------------------

/// Number of cube faces. Face slots follow `+X, -X, +Y, -Y, +Z, -Z`.
pub const FACE_COUNT: usize = 6;

/// How a voxel type is drawn, and which neighbors hide its faces.
///
/// Two adjacent voxels hide their shared face only when both belong to the
/// same class.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum RenderClass {
    /// Fully opaque geometry.
    Opaque,
    /// Alpha-tested cut-out geometry (leaves, grates).
    Threshold,
    /// Alpha-blended geometry (water, stained glass).
    Blend,
    /// Never drawn (air, invisible barriers).
    NoDraw,
}

/// Atlas location of one texture strip.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct TextureRef {
    /// Atlas plane holding the strip.
    pub plane: u16,
    /// First layer of the strip within the plane.
    pub offset: u16,
    /// Consecutive layers (animation frames) in the strip.
    pub frame_count: u16,
}

/// Static descriptor for a voxel type.
///
/// `faces[f]` lists image paths for face `f`. For animated types the list is
/// the frame sequence of a single strip; otherwise each path is an
/// interchangeable variant.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct VoxelTypeInfo {
    /// Human-readable name (e.g. "stone", "grass", "water").
    pub name: String,
    /// Render/blend class.
    pub render_class: RenderClass,
    /// Whether face textures are animation strips.
    pub animated: bool,
    /// Per-face texture path lists.
    pub faces: [Vec<String>; FACE_COUNT],
    /// Resolved atlas locations, filled in by [`VoxelTypeRegistry::set_resolved`].
    #[serde(skip)]
    resolved: [Vec<TextureRef>; FACE_COUNT],
}

impl VoxelTypeInfo {
    /// Creates a descriptor with no textures.
    pub fn new(name: impl Into<String>, render_class: RenderClass) -> Self {
        Self {
            name: name.into(),
            render_class,
            animated: false,
            faces: Default::default(),
            resolved: Default::default(),
        }
    }

    /// Uses the same path list on every face.
    pub fn with_all_faces<S: AsRef<str>>(mut self, paths: &[S]) -> Self {
        let list: Vec<String> = paths.iter().map(|p| p.as_ref().to_string()).collect();
        self.faces = std::array::from_fn(|_| list.clone());
        self
    }

    /// Sets the path list of a single face.
    pub fn with_face<S: AsRef<str>>(mut self, face: usize, paths: &[S]) -> Self {
        if let Some(slot) = self.faces.get_mut(face) {
            *slot = paths.iter().map(|p| p.as_ref().to_string()).collect();
        }
        self
    }

    /// Marks face path lists as animation frames.
    pub fn animated(mut self, animated: bool) -> Self {
        self.animated = animated;
        self
    }

    /// Resolved strips for a face: one entry for animated types, one per
    /// variant otherwise. Empty until resolved.
    pub fn textures(&self, face: usize) -> &[TextureRef] {
        self.resolved.get(face).map(Vec::as_slice).unwrap_or(&[])
    }

    /// Returns `true` if the type is never meshed.
    pub fn is_invisible(&self) -> bool {
        self.render_class == RenderClass::NoDraw
    }
}

/// Errors that can occur during voxel type registration.
#[derive(Debug, Error)]
pub enum RegistryError {
    /// A type with the same name has already been registered.
    #[error("duplicate voxel type name: {0}")]
    DuplicateName(String),
    /// Every id slot has been consumed.
    #[error("voxel type registry is full (max {max} types)")]
    RegistryFull {
        /// Maximum number of types, including air.
        max: usize,
    },
    /// No type is registered under this id.
    #[error("unknown voxel type id {0}")]
    UnknownType(u16),
}

// ---------------------------------------------------------------------------
// Registry
// ---------------------------------------------------------------------------

/// Maps [`Voxel`] → [`VoxelTypeInfo`] with O(1) lookup by id and by name.
///
/// Cloning is cheap enough to support copy-on-write sharing with workers.
#[derive(Clone, Debug)]
pub struct VoxelTypeRegistry {
    /// Dense array where `index == Voxel.0`.
    types: Vec<VoxelTypeInfo>,
    /// Reverse lookup: name → id.
    name_to_id: FxHashMap<String, Voxel>,
}

impl VoxelTypeRegistry {
    /// Maximum number of types, including air.
    pub const MAX_TYPES: usize = u16::MAX as usize + 1;

    /// Creates a new registry with air pre-registered as id 0.
    pub fn new() -> Self {
        let mut name_to_id = FxHashMap::default();
        name_to_id.insert("air".to_string(), Voxel::EMPTY);
        Self {
            types: vec![VoxelTypeInfo::new("air", RenderClass::NoDraw)],
            name_to_id,
        }
    }

    /// Registers a new voxel type and returns its id.
    ///
    /// Ids are assigned sequentially starting from 1.
    pub fn register(&mut self, info: VoxelTypeInfo) -> Result<Voxel, RegistryError> {
        if self.name_to_id.contains_key(&info.name) {
            return Err(RegistryError::DuplicateName(info.name));
        }
        if self.types.len() >= Self::MAX_TYPES {
            return Err(RegistryError::RegistryFull {
                max: Self::MAX_TYPES,
            });
        }

        let id = Voxel(self.types.len() as u16);
        self.name_to_id.insert(info.name.clone(), id);
        self.types.push(info);
        Ok(id)
    }

    /// Stores the resolved atlas strips for one face of a type.
    pub fn set_resolved(
        &mut self,
        id: Voxel,
        face: usize,
        textures: Vec<TextureRef>,
    ) -> Result<(), RegistryError> {
        let info = self
            .types
            .get_mut(id.0 as usize)
            .ok_or(RegistryError::UnknownType(id.0))?;
        if let Some(slot) = info.resolved.get_mut(face) {
            *slot = textures;
        }
        Ok(())
    }

    /// Returns the descriptor for an id, or `None` if unregistered.
    pub fn get(&self, id: Voxel) -> Option<&VoxelTypeInfo> {
        self.types.get(id.0 as usize)
    }

    /// Render class of an id. Unknown ids behave like air.
    pub fn render_class(&self, id: Voxel) -> RenderClass {
        self.get(id).map_or(RenderClass::NoDraw, |info| info.render_class)
    }

    /// Returns the id for a named voxel type, or `None` if not found.
    pub fn lookup_by_name(&self, name: &str) -> Option<Voxel> {
        self.name_to_id.get(name).copied()
    }

    /// Iterates over `(id, descriptor)` pairs, air included.
    pub fn iter(&self) -> impl Iterator<Item = (Voxel, &VoxelTypeInfo)> {
        self.types
            .iter()
            .enumerate()
            .map(|(i, info)| (Voxel(i as u16), info))
    }

    /// Returns the total number of registered types (including air).
    pub fn len(&self) -> usize {
        self.types.len()
    }

    /// Returns `true` if only air is registered.
    pub fn is_empty(&self) -> bool {
        self.types.len() <= 1
    }
}

impl Default for VoxelTypeRegistry {
    fn default() -> Self {
        Self::new()
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
