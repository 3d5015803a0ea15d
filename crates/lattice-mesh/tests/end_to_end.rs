//! World edits through the public API to uploaded geometry.

use std::time::{Duration, Instant};

use lattice_atlas::CpuPlanes;
use lattice_config::Config;
use lattice_mesh::{CpuQuadBuffers, FaceDirection, MeshState, MeshingSubsystem, TickStats};
use lattice_voxel::{ChunkCoord, RenderClass, Voxel, VoxelTypeInfo, World};

const CENTER: ChunkCoord = ChunkCoord::new(0, 0, 0);

struct Harness {
    subsystem: MeshingSubsystem<CpuPlanes>,
    world: World,
    sink: CpuQuadBuffers,
    grass: Voxel,
}

impl Harness {
    fn new(chunk_size: u32) -> Self {
        let mut config = Config::default();
        config.meshing.chunk_size = chunk_size;
        config.meshing.worker_count = 2;
        config.atlas.texture_root = std::env::temp_dir().join("lattice-e2e-textures");

        let mut subsystem = MeshingSubsystem::init(&config, CpuPlanes::default()).unwrap();
        let grass = subsystem
            .register_voxel_type(
                VoxelTypeInfo::new("grass", RenderClass::Opaque).with_all_faces(&["grass.png"]),
            )
            .unwrap();
        let world = subsystem.create_world();
        Self {
            subsystem,
            world,
            sink: CpuQuadBuffers::new(),
            grass,
        }
    }

    fn fill(&mut self, coord: ChunkCoord, voxel: Voxel) {
        if !self.world.contains(coord) {
            self.world.create_chunk(coord);
        }
        self.world.fill_chunk(coord, voxel);
    }

    /// Delivers pending events, then ticks until every job has finished.
    fn settle(&mut self) -> TickStats {
        self.subsystem.handle_events(&mut self.world, &mut self.sink);
        let mut total = TickStats::default();
        let start = Instant::now();
        loop {
            let stats = self.subsystem.tick(&self.world, &mut self.sink);
            total.submitted += stats.submitted;
            total.applied += stats.applied;
            total.discarded_stale += stats.discarded_stale;
            total.discarded_cancelled += stats.discarded_cancelled;

            let scheduler = self.subsystem.scheduler();
            if scheduler.is_idle() && scheduler.worker_backlog() == 0 {
                let stats = self.subsystem.tick(&self.world, &mut self.sink);
                total.discarded_cancelled += stats.discarded_cancelled;
                return total;
            }
            assert!(
                start.elapsed() < Duration::from_secs(10),
                "Timed out waiting for meshing to settle"
            );
            std::thread::sleep(Duration::from_millis(1));
        }
    }

    fn quad_count(&self, coord: ChunkCoord) -> u32 {
        self.subsystem
            .scheduler()
            .mesh_record(coord)
            .map_or(0, |record| record.quad_count())
    }

    fn faces(&self, coord: ChunkCoord) -> Vec<FaceDirection> {
        let Some(record) = self.subsystem.scheduler().mesh_record(coord) else {
            return Vec::new();
        };
        let mut faces: Vec<FaceDirection> = record
            .iter()
            .flat_map(|(_, buffer)| self.sink.quads(buffer.handle).unwrap_or_default())
            .filter_map(|quad| quad.face())
            .collect();
        faces.sort_by_key(|f| f.index());
        faces
    }
}

#[test]
fn test_isolated_grass_chunk_then_buried() {
    let mut h = Harness::new(8);
    let grass_plane = h.subsystem.registry().get(h.grass).unwrap().textures(0)[0].plane;

    h.fill(CENTER, h.grass);
    let stats = h.settle();
    assert_eq!(stats.applied, 1, "only the centre chunk exists");

    let record = h.subsystem.scheduler().mesh_record(CENTER).unwrap();
    let plane = record.plane(grass_plane).expect("geometry on grass's plane");
    assert_eq!(plane.quad_count(), 6);
    assert_eq!(plane.vertex_count, 36);
    let quads = h.sink.quads(plane.handle).unwrap();
    assert!(quads.iter().all(|q| q.area() == 64), "each quad covers a full face");

    for coord in CENTER.face_neighbors() {
        h.fill(coord, h.grass);
    }
    h.settle();
    assert_eq!(h.quad_count(CENTER), 0, "buried chunk has no visible faces");
    assert!(!h.sink.has_buffers_for(CENTER));
    assert_eq!(h.subsystem.scheduler().state(CENTER), MeshState::Idle);
}

#[test]
fn test_adjacent_chunks_hide_shared_boundary() {
    let mut h = Harness::new(8);
    let east = ChunkCoord::new(1, 0, 0);
    h.fill(CENTER, h.grass);
    h.fill(east, h.grass);
    h.settle();

    assert_eq!(h.quad_count(CENTER), 5);
    assert_eq!(h.quad_count(east), 5);
    assert!(!h.faces(CENTER).contains(&FaceDirection::PosX));
    assert!(!h.faces(east).contains(&FaceDirection::NegX));
}

#[test]
fn test_neighbor_load_after_mesh_removes_boundary_face() {
    let mut h = Harness::new(4);
    h.fill(CENTER, h.grass);
    h.settle();
    assert_eq!(h.quad_count(CENTER), 6);

    let above = ChunkCoord::new(0, 1, 0);
    h.fill(above, h.grass);
    h.settle();
    assert_eq!(h.quad_count(CENTER), 5);
    assert!(!h.faces(CENTER).contains(&FaceDirection::PosY));
}

#[test]
fn test_neighbor_unload_and_reload() {
    let mut h = Harness::new(4);
    let west = ChunkCoord::new(-1, 0, 0);
    h.fill(CENTER, h.grass);
    h.fill(west, h.grass);
    h.settle();
    assert_eq!(h.quad_count(CENTER), 5);

    h.world.remove_chunk(west);
    h.settle();
    assert_eq!(h.quad_count(CENTER), 6, "exposed face reappears");
    assert!(!h.sink.has_buffers_for(west));

    h.fill(west, h.grass);
    h.settle();
    assert_eq!(h.quad_count(CENTER), 5);
    assert_eq!(h.quad_count(west), 5);
}

#[test]
fn test_removal_while_in_flight_creates_no_buffers() {
    let mut h = Harness::new(8);
    h.fill(CENTER, h.grass);
    h.subsystem.handle_events(&mut h.world, &mut h.sink);
    let stats = h.subsystem.tick(&h.world, &mut h.sink);
    assert_eq!(stats.submitted, 1);

    h.world.remove_chunk(CENTER);
    h.settle();

    assert!(h.subsystem.scheduler().mesh_record(CENTER).is_none());
    assert!(!h.sink.has_buffers_for(CENTER));
    assert_eq!(h.sink.upload_count(), 0);
    assert_eq!(h.sink.live_buffers(), 0);
}

#[test]
fn test_voxel_edit_remeshes_chunk() {
    let mut h = Harness::new(4);
    h.fill(CENTER, h.grass);
    h.settle();
    assert_eq!(h.quad_count(CENTER), 6);

    // Carving a corner notch breaks three faces.
    assert!(h.world.set_voxel(CENTER, [3, 3, 3], Voxel::EMPTY));
    h.settle();
    assert!(h.quad_count(CENTER) > 6);
    assert_eq!(h.sink.live_buffers(), 1);
}
