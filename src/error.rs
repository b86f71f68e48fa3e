//! Error types for configuration and matrix resolution.
//!
//! Per-toolchain step failures are not errors: they are recorded in the
//! toolchain's log and reported through its result event. Only conditions
//! that prevent a project's matrix from being spawned end up here.

use std::path::PathBuf;
use thiserror::Error;

/// Result type for library operations.
pub type Result<T> = std::result::Result<T, MatrixError>;

#[derive(Debug, Error)]
pub enum MatrixError {
    /// A configuration file could not be read.
    #[error("failed to read {}: {source}", path.display())]
    ReadConfig {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// A configuration file is not valid JSON or does not match the schema.
    #[error("invalid config file {}: {source}", path.display())]
    ParseConfig {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    /// A `path` entry in the compilers config is not an existing directory.
    #[error("directory {} not found", .0.display())]
    MissingDirectory(PathBuf),

    #[error("project '{project}' uses unknown build system '{name}'")]
    UnknownBuildSystem { project: String, name: String },

    #[error("compiler '{compiler}' has no settings for build system '{build_system}'")]
    MissingBuildArgs {
        compiler: String,
        build_system: String,
    },

    #[error("invalid build system settings for compiler '{compiler}': {source}")]
    InvalidBuildArgs {
        compiler: String,
        #[source]
        source: serde_json::Error,
    },

    #[error("project '{project}' has an empty test_command")]
    EmptyTestCommand { project: String },

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}
