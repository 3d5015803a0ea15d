//! Headless demo that meshes a small voxel scene end to end.
//!
//! Configuration is loaded from `config.ron` and can be overridden via CLI flags.
//! Run with `cargo run -p lattice-demo -- --chunk-size 8 --log-level debug`.
//! Exits non-zero if the meshing core reports an error or the scene does not
//! produce the expected geometry.

use std::process::ExitCode;
use std::time::{Duration, Instant};

use clap::Parser;
use lattice_atlas::CpuPlanes;
use lattice_config::{CliArgs, Config};
use lattice_mesh::{CpuQuadBuffers, MeshingSubsystem, SubsystemError, TickStats};
use lattice_voxel::{ChunkCoord, RenderClass, Voxel, VoxelTypeInfo, World};
use tracing::{error, info, warn};

const SETTLE_TIMEOUT: Duration = Duration::from_secs(10);

struct Scene {
    subsystem: MeshingSubsystem<CpuPlanes>,
    world: World,
    sink: CpuQuadBuffers,
}

impl Scene {
    /// Delivers world events and ticks until no work remains.
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
                return total;
            }
            if start.elapsed() > SETTLE_TIMEOUT {
                warn!(
                    "Meshing did not settle within {SETTLE_TIMEOUT:?} ({} in flight)",
                    scheduler.in_flight_count()
                );
                return total;
            }
            std::thread::sleep(Duration::from_millis(1));
        }
    }

    fn quad_count(&self, coord: ChunkCoord) -> u32 {
        self.subsystem
            .scheduler()
            .mesh_record(coord)
            .map_or(0, |record| record.quad_count())
    }

    fn fill(&mut self, coord: ChunkCoord, voxel: Voxel) {
        if !self.world.contains(coord) {
            self.world.create_chunk(coord);
        }
        self.world.fill_chunk(coord, voxel);
    }
}

/// Runs the scene and returns whether every check passed.
fn run_scene(config: &Config) -> Result<bool, SubsystemError> {
    let mut subsystem = MeshingSubsystem::init(config, CpuPlanes::default())?;
    let grass = subsystem.register_voxel_type(
        VoxelTypeInfo::new("grass", RenderClass::Opaque)
            .with_all_faces(&["grass_side.png"])
            .with_face(2, &["grass_top.png"])
            .with_face(3, &["dirt.png"]),
    )?;
    subsystem.register_voxel_type(
        VoxelTypeInfo::new("water", RenderClass::Blend)
            .with_all_faces(&["water_0.png", "water_1.png", "water_2.png", "water_3.png"])
            .animated(true),
    )?;
    info!(
        "Registered {} voxel types using {} atlas strip(s)",
        subsystem.registry().len(),
        subsystem.atlas().strip_count()
    );

    let world = subsystem.create_world();
    let mut scene = Scene {
        subsystem,
        world,
        sink: CpuQuadBuffers::new(),
    };
    let center = ChunkCoord::new(0, 0, 0);
    let mut ok = true;

    scene.fill(center, grass);
    let stats = scene.settle();
    let isolated = scene.quad_count(center);
    info!("Isolated chunk: {isolated} quads ({stats:?})");
    if isolated != 6 {
        error!("Expected 6 quads for an isolated filled chunk, got {isolated}");
        ok = false;
    }

    for neighbor in center.face_neighbors() {
        scene.fill(neighbor, grass);
    }
    let stats = scene.settle();
    let buried = scene.quad_count(center);
    info!("Buried chunk: {buried} quads ({stats:?})");
    if buried != 0 {
        error!("Expected no quads for a buried chunk, got {buried}");
        ok = false;
    }

    scene.world.remove_chunk(ChunkCoord::new(0, 1, 0));
    let stats = scene.settle();
    let exposed = scene.quad_count(center);
    info!("After unloading the chunk above: {exposed} quads ({stats:?})");
    if exposed != 1 {
        error!("Expected the top face to reappear as 1 quad, got {exposed}");
        ok = false;
    }

    info!(
        "{} live buffer(s), {} upload(s), {} release(s)",
        scene.sink.live_buffers(),
        scene.sink.upload_count(),
        scene.sink.release_count()
    );
    scene.subsystem.shutdown();
    Ok(ok)
}

fn main() -> ExitCode {
    let args = CliArgs::parse();

    // Resolve config directory
    let config_dir = args.config.clone().unwrap_or_else(|| {
        dirs::config_dir()
            .unwrap_or_else(std::env::temp_dir)
            .join("lattice")
    });

    // Load or create config, then apply CLI overrides
    let mut config = Config::load_or_create(&config_dir).unwrap_or_else(|e| {
        eprintln!("Failed to load config: {e}, using defaults");
        Config::default()
    });
    config.apply_cli_overrides(&args);

    let log_dir = config_dir.join("logs");
    lattice_log::init_logging(Some(&log_dir), cfg!(debug_assertions), Some(&config));

    if let Err(e) = config.validate() {
        error!("{e}");
        return ExitCode::FAILURE;
    }

    match run_scene(&config) {
        Ok(true) => {
            info!("Scene meshed as expected");
            ExitCode::SUCCESS
        }
        Ok(false) => ExitCode::FAILURE,
        Err(e) => {
            error!("Meshing core failed: {e}");
            ExitCode::FAILURE
        }
    }
}
