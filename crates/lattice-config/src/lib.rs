//! Configuration system for the Lattice meshing core.
//!
//! Settings persist to disk as RON, tolerate missing or unknown fields, and
//! can be overridden from the command line via clap.

mod cli;
mod config;
mod error;

pub use cli::CliArgs;
pub use config::{AtlasConfig, Config, DebugConfig, MAX_CHUNK_SIZE, MeshingConfig};
pub use error::ConfigError;
