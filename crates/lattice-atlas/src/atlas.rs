//! Array-texture atlas that hands out deduplicated strips of layers.
//!
//! A strip is the run of consecutive layers holding one ordered list of
//! images (a single texture, or the frames of an animation). Strips are keyed
//! by an order-sensitive hash of their path list, so asking for the same list
//! twice yields the same strip, while a permutation of it does not.
//!
//! Plane count and layers per plane are fixed when the atlas is created.
//! Quad encoding reserves a fixed number of bits for the layer offset and
//! buckets geometry by plane, so running out of room is reported as
//! [`AtlasError::Exhausted`] rather than silently growing.

use std::hash::BuildHasher;
use std::path::{Path, PathBuf};

use lattice_config::AtlasConfig;
use rustc_hash::{FxBuildHasher, FxHashMap};
use thiserror::Error;

use crate::backend::PlaneBackend;

/// Lower bound on layers per plane.
pub const MIN_LAYERS_PER_PLANE: u32 = 256;

/// Upper bound on layers per plane; layer offsets are packed into 11 bits.
pub const MAX_LAYERS_PER_PLANE: u32 = 2048;

/// Most planes an atlas may own; geometry is bucketed per plane.
pub const MAX_ATLAS_PLANES: usize = 16;

/// Most frames one strip may hold; frame counts are packed into 8 bits.
pub const MAX_STRIP_FRAMES: usize = 255;

// ---------------------------------------------------------------------------
// AtlasError
// ---------------------------------------------------------------------------

/// Errors returned by the texture atlas.
#[derive(Debug, Error)]
pub enum AtlasError {
    /// Configuration validation error.
    #[error("invalid atlas config: {0}")]
    InvalidConfig(String),

    /// No plane has room for the requested strip.
    #[error(
        "texture atlas exhausted: no plane has {requested} free layers \
         ({planes} planes x {layers_per_plane} layers)"
    )]
    Exhausted {
        /// Layers the strip needed.
        requested: usize,
        /// Capacity of each plane.
        layers_per_plane: u32,
        /// Number of planes.
        planes: usize,
    },

    /// A strip was requested for an empty path list.
    #[error("cannot create a texture strip from an empty path list")]
    EmptyPathList,

    /// A strip would have more frames than the quad encoding can address.
    #[error("strip has {count} frames, at most {max} are supported")]
    TooManyFrames {
        /// Frames requested.
        count: usize,
        /// Frame limit.
        max: usize,
    },
}

// ---------------------------------------------------------------------------
// Strips and planes
// ---------------------------------------------------------------------------

/// Location of a run of consecutive layers within one plane.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct AtlasStrip {
    /// Owning plane.
    pub plane: u16,
    /// First layer of the strip.
    pub offset: u32,
    /// Number of layers (frames).
    pub frame_count: u32,
}

struct StripEntry {
    strip: AtlasStrip,
    paths: Vec<String>,
}

#[derive(Default)]
struct AtlasPlane {
    strips: Vec<StripEntry>,
    /// Content hash to indices into `strips`. Collisions share a bucket.
    lookup: FxHashMap<u64, Vec<usize>>,
    used_layers: u32,
}

impl AtlasPlane {
    fn find(&self, hash: u64, paths: &[&str]) -> Option<AtlasStrip> {
        self.lookup
            .get(&hash)?
            .iter()
            .map(|&i| &self.strips[i])
            .find(|entry| entry.paths.iter().map(String::as_str).eq(paths.iter().copied()))
            .map(|entry| entry.strip)
    }
}

/// Order-sensitive content hash of a path list.
///
/// Each path is hashed, the hashes are folded into a running sum that is
/// weighted by position, and the sum itself is hashed.
pub fn strip_hash<S: AsRef<str>>(paths: &[S]) -> u64 {
    let hasher = FxBuildHasher;
    let sum = paths.iter().fold(0u64, |acc, path| {
        acc.wrapping_mul(0x100_0000_01b3)
            .wrapping_add(hasher.hash_one(path.as_ref()))
    });
    hasher.hash_one(sum)
}

// ---------------------------------------------------------------------------
// TextureAtlas
// ---------------------------------------------------------------------------

/// Fixed-capacity atlas of array-texture planes.
///
/// Owned by the thread that owns the GPU context. Meshing workers never touch
/// it; they read the resolved strip locations stored on the voxel registry.
pub struct TextureAtlas<B: PlaneBackend> {
    backend: B,
    planes: Vec<AtlasPlane>,
    tile_width: u32,
    tile_height: u32,
    layers_per_plane: u32,
    texture_root: PathBuf,
}

impl<B: PlaneBackend> TextureAtlas<B> {
    /// Creates an atlas, rounding tile dimensions up to powers of two and
    /// allocating enough planes to hold `config.total_layer_hint` layers.
    pub fn new(config: &AtlasConfig, mut backend: B) -> Result<Self, AtlasError> {
        if config.tile_width == 0 || config.tile_height == 0 {
            return Err(AtlasError::InvalidConfig(format!(
                "tile dimensions must be non-zero, got {}x{}",
                config.tile_width, config.tile_height
            )));
        }
        let tile_width = config.tile_width.next_power_of_two();
        let tile_height = config.tile_height.next_power_of_two();
        let layers_per_plane = backend
            .max_array_layers()
            .clamp(MIN_LAYERS_PER_PLANE, MAX_LAYERS_PER_PLANE);

        let plane_count = config.total_layer_hint.div_ceil(layers_per_plane).max(1) as usize;
        if plane_count > MAX_ATLAS_PLANES {
            return Err(AtlasError::InvalidConfig(format!(
                "{} layers need {plane_count} planes of {layers_per_plane}, at most {MAX_ATLAS_PLANES} are addressable",
                config.total_layer_hint
            )));
        }

        for plane in 0..plane_count {
            backend.allocate_plane(plane as u16, tile_width, tile_height, layers_per_plane);
        }
        tracing::info!(
            "Texture atlas: {plane_count} plane(s) x {layers_per_plane} layers of {tile_width}x{tile_height}"
        );

        Ok(Self {
            backend,
            planes: (0..plane_count).map(|_| AtlasPlane::default()).collect(),
            tile_width,
            tile_height,
            layers_per_plane,
            texture_root: config.texture_root.clone(),
        })
    }

    /// Returns the strip already holding `paths`, in this exact order.
    pub fn find<S: AsRef<str>>(&self, paths: &[S]) -> Option<AtlasStrip> {
        let hash = strip_hash(paths);
        let paths: Vec<&str> = paths.iter().map(AsRef::as_ref).collect();
        self.planes.iter().find_map(|plane| plane.find(hash, &paths))
    }

    /// Returns the strip holding `paths`, loading the images on a miss.
    ///
    /// Images that fail to decode or have the wrong dimensions leave their
    /// layer blank. Running out of layers in every plane is an error.
    pub fn find_or_load<S: AsRef<str>>(&mut self, paths: &[S]) -> Result<AtlasStrip, AtlasError> {
        if paths.is_empty() {
            return Err(AtlasError::EmptyPathList);
        }
        if paths.len() > MAX_STRIP_FRAMES {
            return Err(AtlasError::TooManyFrames {
                count: paths.len(),
                max: MAX_STRIP_FRAMES,
            });
        }
        if let Some(strip) = self.find(paths) {
            return Ok(strip);
        }

        let needed = paths.len() as u32;
        let Some(plane_id) = self
            .planes
            .iter()
            .position(|p| self.layers_per_plane - p.used_layers >= needed)
        else {
            tracing::error!(
                "Texture atlas exhausted while loading {:?}",
                paths.first().map(AsRef::as_ref)
            );
            return Err(AtlasError::Exhausted {
                requested: paths.len(),
                layers_per_plane: self.layers_per_plane,
                planes: self.planes.len(),
            });
        };

        let offset = self.planes[plane_id].used_layers;
        for (i, path) in paths.iter().enumerate() {
            let layer = offset + i as u32;
            if let Some(rgba) = self.decode(path.as_ref()) {
                self.backend.write_layer(plane_id as u16, layer, &rgba);
            }
        }

        let strip = AtlasStrip {
            plane: plane_id as u16,
            offset,
            frame_count: needed,
        };
        let plane = &mut self.planes[plane_id];
        plane.used_layers += needed;
        plane
            .lookup
            .entry(strip_hash(paths))
            .or_default()
            .push(plane.strips.len());
        plane.strips.push(StripEntry {
            strip,
            paths: paths.iter().map(|p| p.as_ref().to_string()).collect(),
        });
        tracing::debug!("Atlas strip {strip:?} for {} image(s)", paths.len());
        Ok(strip)
    }

    fn decode(&self, path: &str) -> Option<Vec<u8>> {
        let full = self.resolve_path(path);
        let image = match image::open(&full) {
            Ok(image) => image.to_rgba8(),
            Err(e) => {
                tracing::warn!("Failed to load texture {}: {e}", full.display());
                return None;
            }
        };
        if image.dimensions() != (self.tile_width, self.tile_height) {
            tracing::warn!(
                "Texture {} is {}x{}, expected {}x{}; leaving layer blank",
                full.display(),
                image.width(),
                image.height(),
                self.tile_width,
                self.tile_height
            );
            return None;
        }
        Some(image.into_raw())
    }

    /// Resolves a texture path against the configured texture root.
    pub fn resolve_path(&self, path: &str) -> PathBuf {
        let path = Path::new(path);
        if path.is_absolute() {
            path.to_path_buf()
        } else {
            self.texture_root.join(path)
        }
    }

    /// Number of planes.
    pub fn plane_count(&self) -> usize {
        self.planes.len()
    }

    /// Texture handle for plane `id`, for binding during draw.
    pub fn plane_texture(&self, id: u16) -> Option<&B::Texture> {
        if (id as usize) < self.planes.len() {
            self.backend.plane_texture(id)
        } else {
            None
        }
    }

    /// Layers each plane holds.
    pub fn layers_per_plane(&self) -> u32 {
        self.layers_per_plane
    }

    /// Layers in use on plane `id`.
    pub fn used_layers(&self, id: u16) -> u32 {
        self.planes.get(id as usize).map_or(0, |p| p.used_layers)
    }

    /// Total number of strips across all planes.
    pub fn strip_count(&self) -> usize {
        self.planes.iter().map(|p| p.strips.len()).sum()
    }

    /// Tile dimensions after power-of-two rounding.
    pub fn tile_size(&self) -> (u32, u32) {
        (self.tile_width, self.tile_height)
    }

    /// The plane storage backend.
    pub fn backend(&self) -> &B {
        &self.backend
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
