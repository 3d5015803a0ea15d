//! The meshing subsystem: atlas, voxel registry, and scheduler behind one handle.

use std::sync::Arc;

use lattice_atlas::{AtlasStrip, PlaneBackend, TextureAtlas};
use lattice_config::Config;
use lattice_voxel::{
    ChunkCoord, ChunkSource, FACE_COUNT, RegistryError, TextureRef, Voxel, VoxelTypeInfo,
    VoxelTypeRegistry, World,
};

use crate::buffers::QuadBufferSink;
use crate::error::SubsystemError;
use crate::scheduler::{MeshScheduler, TickStats};

/// Owns everything the main thread needs to turn world edits into geometry.
///
/// Voxel types must be registered before chunks using them are meshed.
/// The registry is shared with in-flight jobs copy-on-write, so registering a
/// type never disturbs a job that is already running.
pub struct MeshingSubsystem<B: PlaneBackend> {
    config: Config,
    atlas: TextureAtlas<B>,
    registry: Arc<VoxelTypeRegistry>,
    scheduler: MeshScheduler,
}

impl<B: PlaneBackend> MeshingSubsystem<B> {
    /// Validates `config`, allocates the atlas, and spawns the worker pool.
    pub fn init(config: &Config, backend: B) -> Result<Self, SubsystemError> {
        config.validate()?;
        let atlas = TextureAtlas::new(&config.atlas, backend)?;
        let scheduler = MeshScheduler::new(&config.meshing)?;
        tracing::info!(
            "Meshing subsystem ready: chunk size {}, {} worker(s), {} atlas plane(s)",
            config.meshing.chunk_size,
            scheduler.worker_count(),
            atlas.plane_count()
        );
        Ok(Self {
            config: config.clone(),
            atlas,
            registry: Arc::new(VoxelTypeRegistry::new()),
            scheduler,
        })
    }

    /// An empty world sized to the configured chunk side.
    pub fn create_world(&self) -> World {
        World::new(self.config.meshing.chunk_size as usize)
    }

    /// Registers a voxel type and loads its face textures into the atlas.
    ///
    /// Animated types get one strip per face holding every frame; other types
    /// get one single-layer strip per variant path. Identical path lists
    /// share a strip.
    pub fn register_voxel_type(&mut self, info: VoxelTypeInfo) -> Result<Voxel, SubsystemError> {
        // Reject before any atlas layers are spent.
        if self.registry.lookup_by_name(&info.name).is_some() {
            return Err(RegistryError::DuplicateName(info.name).into());
        }

        let mut resolved: [Vec<TextureRef>; FACE_COUNT] = Default::default();
        for (face, paths) in info.faces.iter().enumerate() {
            if paths.is_empty() {
                continue;
            }
            resolved[face] = if info.animated {
                vec![texture_ref(self.atlas.find_or_load(paths)?)]
            } else {
                paths
                    .iter()
                    .map(|path| {
                        self.atlas
                            .find_or_load(std::slice::from_ref(path))
                            .map(texture_ref)
                    })
                    .collect::<Result<_, _>>()?
            };
        }

        let name = info.name.clone();
        let registry = Arc::make_mut(&mut self.registry);
        let id = registry.register(info)?;
        for (face, textures) in resolved.into_iter().enumerate() {
            registry.set_resolved(id, face, textures)?;
        }
        tracing::debug!("Registered voxel type '{name}' as {}", id.0);
        Ok(id)
    }

    /// Feeds pending world events to the scheduler.
    pub fn handle_events<S: QuadBufferSink + ?Sized>(&mut self, world: &mut World, sink: &mut S) {
        let shape = world.chunk_shape();
        for event in world.drain_events() {
            self.scheduler.handle_event(event, shape, sink);
        }
    }

    /// Requests a re-mesh of `coord`.
    pub fn mark_dirty(&mut self, coord: ChunkCoord) {
        self.scheduler.mark_dirty(coord);
    }

    /// Runs one scheduler tick against `source`.
    pub fn tick<C, S>(&mut self, source: &C, sink: &mut S) -> TickStats
    where
        C: ChunkSource + ?Sized,
        S: QuadBufferSink + ?Sized,
    {
        self.scheduler.tick(source, &self.registry, sink)
    }

    /// The texture atlas.
    pub fn atlas(&self) -> &TextureAtlas<B> {
        &self.atlas
    }

    /// The voxel type registry.
    pub fn registry(&self) -> &VoxelTypeRegistry {
        &self.registry
    }

    /// The scheduler, for queries.
    pub fn scheduler(&self) -> &MeshScheduler {
        &self.scheduler
    }

    /// The configuration the subsystem was built with.
    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Stops the worker pool. Further ticks only drain finished results.
    pub fn shutdown(&mut self) {
        self.scheduler.shutdown();
    }
}

fn texture_ref(strip: AtlasStrip) -> TextureRef {
    TextureRef {
        plane: strip.plane,
        offset: strip.offset as u16,
        frame_count: strip.frame_count as u16,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use lattice_atlas::{AtlasError, CpuPlanes};
    use lattice_config::ConfigError;
    use lattice_voxel::RenderClass;

    fn test_config() -> Config {
        let mut config = Config::default();
        config.meshing.chunk_size = 4;
        config.meshing.worker_count = 1;
        config.atlas.texture_root = std::env::temp_dir().join("lattice-missing-textures");
        config
    }

    #[test]
    fn test_init_rejects_invalid_config() {
        let mut config = test_config();
        config.meshing.chunk_size = 0;
        let result = MeshingSubsystem::init(&config, CpuPlanes::default());
        assert!(matches!(
            result,
            Err(SubsystemError::Config(ConfigError::Invalid { .. }))
        ));
    }

    #[test]
    fn test_variants_get_one_strip_each() {
        let mut subsystem = MeshingSubsystem::init(&test_config(), CpuPlanes::default()).unwrap();
        let id = subsystem
            .register_voxel_type(
                VoxelTypeInfo::new("stone", RenderClass::Opaque)
                    .with_all_faces(&["stone_a.png", "stone_b.png"]),
            )
            .unwrap();

        let info = subsystem.registry().get(id).unwrap();
        for face in 0..FACE_COUNT {
            let textures = info.textures(face);
            assert_eq!(textures.len(), 2);
            assert!(textures.iter().all(|t| t.frame_count == 1));
            assert_ne!(textures[0].offset, textures[1].offset);
        }
        // Faces share deduplicated strips.
        assert_eq!(subsystem.atlas().strip_count(), 2);
    }

    #[test]
    fn test_animated_type_gets_one_strip_per_face() {
        let mut subsystem = MeshingSubsystem::init(&test_config(), CpuPlanes::default()).unwrap();
        let id = subsystem
            .register_voxel_type(
                VoxelTypeInfo::new("water", RenderClass::Blend)
                    .with_all_faces(&["w0.png", "w1.png", "w2.png", "w3.png"])
                    .animated(true),
            )
            .unwrap();

        let textures = subsystem.registry().get(id).unwrap().textures(2);
        assert_eq!(textures.len(), 1);
        assert_eq!(textures[0].frame_count, 4);
        assert_eq!(subsystem.atlas().used_layers(0), 4);
    }

    #[test]
    fn test_faces_without_paths_stay_unresolved() {
        let mut subsystem = MeshingSubsystem::init(&test_config(), CpuPlanes::default()).unwrap();
        let id = subsystem
            .register_voxel_type(
                VoxelTypeInfo::new("log", RenderClass::Opaque).with_face(2, &["log_top.png"]),
            )
            .unwrap();
        let info = subsystem.registry().get(id).unwrap();
        assert_eq!(info.textures(2).len(), 1);
        assert!(info.textures(0).is_empty());
    }

    #[test]
    fn test_duplicate_name_is_rejected() {
        let mut subsystem = MeshingSubsystem::init(&test_config(), CpuPlanes::default()).unwrap();
        subsystem
            .register_voxel_type(VoxelTypeInfo::new("dirt", RenderClass::Opaque))
            .unwrap();
        let err = subsystem
            .register_voxel_type(VoxelTypeInfo::new("dirt", RenderClass::Opaque))
            .unwrap_err();
        assert!(matches!(err, SubsystemError::Registry(_)));
    }

    #[test]
    fn test_duplicate_name_spends_no_atlas_layers() {
        let mut subsystem = MeshingSubsystem::init(&test_config(), CpuPlanes::default()).unwrap();
        subsystem
            .register_voxel_type(
                VoxelTypeInfo::new("sand", RenderClass::Opaque).with_all_faces(&["sand.png"]),
            )
            .unwrap();
        let used = subsystem.atlas().used_layers(0);
        let strips = subsystem.atlas().strip_count();

        let err = subsystem
            .register_voxel_type(
                VoxelTypeInfo::new("sand", RenderClass::Opaque)
                    .with_all_faces(&["sand_a.png", "sand_b.png"]),
            )
            .unwrap_err();
        assert!(matches!(
            err,
            SubsystemError::Registry(RegistryError::DuplicateName(_))
        ));
        assert_eq!(subsystem.atlas().used_layers(0), used);
        assert_eq!(subsystem.atlas().strip_count(), strips);
    }

    #[test]
    fn test_atlas_exhaustion_surfaces_as_error() {
        let mut config = test_config();
        config.atlas.total_layer_hint = 1;
        let mut subsystem = MeshingSubsystem::init(&config, CpuPlanes::default()).unwrap();
        let frames: Vec<String> = (0..200).map(|i| format!("f{i}.png")).collect();
        subsystem
            .register_voxel_type(
                VoxelTypeInfo::new("a", RenderClass::Opaque)
                    .with_face(0, &frames)
                    .animated(true),
            )
            .unwrap();
        let more: Vec<String> = (0..100).map(|i| format!("g{i}.png")).collect();
        let err = subsystem
            .register_voxel_type(
                VoxelTypeInfo::new("b", RenderClass::Opaque)
                    .with_face(0, &more)
                    .animated(true),
            )
            .unwrap_err();
        assert!(matches!(
            err,
            SubsystemError::Atlas(AtlasError::Exhausted { .. })
        ));
        assert!(subsystem.registry().lookup_by_name("b").is_none());
    }

    #[test]
    fn test_create_world_uses_configured_size() {
        let subsystem = MeshingSubsystem::init(&test_config(), CpuPlanes::default()).unwrap();
        assert_eq!(subsystem.create_world().chunk_shape().side(), 4);
    }
}
