use lattice_atlas::AtlasError;
use lattice_config::ConfigError;
use lattice_voxel::RegistryError;
use thiserror::Error;

/// Errors raised while setting up or feeding the meshing subsystem.
#[derive(Debug, Error)]
pub enum SubsystemError {
    /// The configuration failed validation.
    #[error("invalid meshing config: {0}")]
    Config(#[from] ConfigError),

    /// The texture atlas rejected a request. Exhaustion is unrecoverable.
    #[error(transparent)]
    Atlas(#[from] AtlasError),

    /// The voxel type registry rejected a registration.
    #[error(transparent)]
    Registry(#[from] RegistryError),

    /// A worker thread could not be started.
    #[error("failed to spawn mesh worker: {0}")]
    WorkerSpawn(#[from] std::io::Error),
}
