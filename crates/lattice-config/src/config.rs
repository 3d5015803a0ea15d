//! Configuration structs with sensible defaults and RON persistence.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;

/// Largest chunk side the packed quad format can address.
pub const MAX_CHUNK_SIZE: u32 = 32;

/// Top-level configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct Config {
    /// Meshing scheduler settings.
    pub meshing: MeshingConfig,
    /// Texture atlas settings.
    pub atlas: AtlasConfig,
    /// Debug/development settings.
    pub debug: DebugConfig,
}

/// Meshing scheduler configuration.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct MeshingConfig {
    /// Chunk side length in voxels (1..=32).
    pub chunk_size: u32,
    /// Worker thread count. `0` picks `num_cpus - 1` (at least one).
    pub worker_count: usize,
    /// Maximum jobs submitted to the worker pool per tick.
    pub max_jobs_per_tick: usize,
    /// Maximum completed jobs finalized per tick.
    pub max_results_per_tick: usize,
    /// Capacity of the bounded task queue feeding the workers.
    pub queue_capacity: usize,
}

/// Texture atlas configuration.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct AtlasConfig {
    /// Layer width in texels. Rounded up to a power of two.
    pub tile_width: u32,
    /// Layer height in texels. Rounded up to a power of two.
    pub tile_height: u32,
    /// Expected total layer count, used to pre-size the plane list.
    pub total_layer_hint: u32,
    /// Directory that relative texture paths are resolved against.
    pub texture_root: PathBuf,
}

/// Debug/development configuration.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct DebugConfig {
    /// Log level override (e.g., "debug", "info", "warn").
    pub log_level: String,
}

// --- Default implementations ---

impl Default for MeshingConfig {
    fn default() -> Self {
        Self {
            chunk_size: 16,
            worker_count: 0,
            max_jobs_per_tick: 8,
            max_results_per_tick: 8,
            queue_capacity: 64,
        }
    }
}

impl Default for AtlasConfig {
    fn default() -> Self {
        Self {
            tile_width: 16,
            tile_height: 16,
            total_layer_hint: 256,
            texture_root: PathBuf::from("textures"),
        }
    }
}

impl Default for DebugConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
        }
    }
}

impl MeshingConfig {
    /// Resolves `worker_count`, replacing `0` with a count derived from the
    /// number of available cores.
    pub fn effective_workers(&self, available_cores: usize) -> usize {
        if self.worker_count > 0 {
            self.worker_count
        } else {
            available_cores.saturating_sub(1).max(1)
        }
    }
}

// --- Load / Save / Reload / Validate ---

impl Config {
    /// Load config from the given directory, or create a default config file.
    pub fn load_or_create(config_dir: &Path) -> Result<Self, ConfigError> {
        let config_path = config_dir.join("config.ron");

        if config_path.exists() {
            let contents = std::fs::read_to_string(&config_path).map_err(ConfigError::ReadError)?;
            let config: Config = ron::from_str(&contents).map_err(ConfigError::ParseError)?;
            log::info!("Loaded config from {}", config_path.display());
            Ok(config)
        } else {
            let config = Config::default();
            config.save(config_dir)?;
            log::info!("Created default config at {}", config_path.display());
            Ok(config)
        }
    }

    /// Save config to the given directory as `config.ron`.
    pub fn save(&self, config_dir: &Path) -> Result<(), ConfigError> {
        std::fs::create_dir_all(config_dir).map_err(ConfigError::WriteError)?;

        let config_path = config_dir.join("config.ron");
        let pretty = ron::ser::PrettyConfig::new()
            .depth_limit(3)
            .separate_tuple_members(true)
            .enumerate_arrays(false);

        let serialized =
            ron::ser::to_string_pretty(self, pretty).map_err(ConfigError::SerializeError)?;

        std::fs::write(&config_path, serialized).map_err(ConfigError::WriteError)?;
        Ok(())
    }

    /// Hot-reload: returns `Some(new_config)` if the file changed, `None` otherwise.
    pub fn reload(&self, config_dir: &Path) -> Result<Option<Self>, ConfigError> {
        let config_path = config_dir.join("config.ron");
        let contents = std::fs::read_to_string(&config_path).map_err(ConfigError::ReadError)?;
        let new_config: Config = ron::from_str(&contents).map_err(ConfigError::ParseError)?;

        if &new_config != self {
            log::info!("Config reloaded with changes");
            Ok(Some(new_config))
        } else {
            Ok(None)
        }
    }

    /// Checks every range constraint the meshing core relies on.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let m = &self.meshing;
        if m.chunk_size == 0 || m.chunk_size > MAX_CHUNK_SIZE {
            return Err(ConfigError::Invalid {
                field: "meshing.chunk_size",
                reason: format!("{} is outside 1..={MAX_CHUNK_SIZE}", m.chunk_size),
            });
        }
        if m.max_jobs_per_tick == 0 {
            return Err(ConfigError::Invalid {
                field: "meshing.max_jobs_per_tick",
                reason: "must be at least 1".to_string(),
            });
        }
        if m.max_results_per_tick == 0 {
            return Err(ConfigError::Invalid {
                field: "meshing.max_results_per_tick",
                reason: "must be at least 1".to_string(),
            });
        }
        if m.queue_capacity == 0 {
            return Err(ConfigError::Invalid {
                field: "meshing.queue_capacity",
                reason: "must be at least 1".to_string(),
            });
        }
        if self.atlas.tile_width == 0 || self.atlas.tile_height == 0 {
            return Err(ConfigError::Invalid {
                field: "atlas.tile_width",
                reason: format!(
                    "tile dimensions must be non-zero, got {}x{}",
                    self.atlas.tile_width, self.atlas.tile_height
                ),
            });
        }
        Ok(())
    }
}
