//! Command-line argument parsing.

use std::path::PathBuf;

use clap::Parser;

use crate::Config;

/// Lattice command-line arguments.
///
/// CLI values override settings loaded from `config.ron`.
#[derive(Parser, Debug)]
#[command(name = "lattice", about = "Lattice voxel meshing core")]
pub struct CliArgs {
    /// Chunk side length in voxels.
    #[arg(long)]
    pub chunk_size: Option<u32>,

    /// Number of meshing worker threads (0 = auto).
    #[arg(long)]
    pub workers: Option<usize>,

    /// Maximum mesh jobs submitted per tick.
    #[arg(long)]
    pub jobs_per_tick: Option<usize>,

    /// Log level (error, warn, info, debug, trace).
    #[arg(long)]
    pub log_level: Option<String>,

    /// Path to config directory (overrides default location).
    #[arg(long)]
    pub config: Option<PathBuf>,
}

impl Config {
    /// Apply CLI overrides to a loaded config.
    pub fn apply_cli_overrides(&mut self, args: &CliArgs) {
        if let Some(size) = args.chunk_size {
            self.meshing.chunk_size = size;
        }
        if let Some(workers) = args.workers {
            self.meshing.worker_count = workers;
        }
        if let Some(jobs) = args.jobs_per_tick {
            self.meshing.max_jobs_per_tick = jobs;
        }
        if let Some(ref level) = args.log_level {
            self.debug.log_level = level.clone();
        }
    }
}
