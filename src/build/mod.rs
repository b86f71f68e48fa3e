//! Build-system specific pipelines.
//!
//! Every supported build system is a [`BuildSystemKind`] variant with its own
//! [`PipelineBuilder`]. Adding one means adding a variant and a builder.

mod cmake;

pub use cmake::{CMakeArgs, CMakeBuilder};

use crate::error::{MatrixError, Result};
use crate::orchestrator::Pipeline;
use std::fs;
use std::io;
use std::path::PathBuf;
use std::time::Duration;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BuildSystemKind {
    CMake,
}

impl BuildSystemKind {
    /// Maps a build system name from the config. `None` for unknown names.
    pub fn from_name(name: &str) -> Option<Self> {
        match name.to_lowercase().as_str() {
            "cmake" => Some(BuildSystemKind::CMake),
            _ => None,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            BuildSystemKind::CMake => "cmake",
        }
    }

    fn builder(&self) -> &'static dyn PipelineBuilder {
        match self {
            BuildSystemKind::CMake => &CMakeBuilder,
        }
    }
}

impl PipelineBuilder for BuildSystemKind {
    fn plan(&self, ctx: &BuildContext) -> Result<PipelinePlan> {
        self.builder().plan(ctx)
    }
}

/// Inputs for building one toolchain's pipeline for one project.
#[derive(Debug, Clone)]
pub struct BuildContext {
    /// Project source root; build output lands underneath.
    pub root: PathBuf,
    pub build_directory: String,
    pub compiler: String,
    /// Build system executable (e.g. `cmake`).
    pub executable: String,
    pub clean: bool,
    pub test_command: Vec<String>,
    pub test_timeout: Option<Duration>,
    /// The compiler's settings for this build system, as found in the config.
    pub args: serde_json::Value,
}

#[derive(Debug, Clone)]
pub struct PipelinePlan {
    pub pipeline: Pipeline,
    pub working_dir: PathBuf,
    pub log_path: PathBuf,
}

impl PipelinePlan {
    /// Creates the working directory and the log directory.
    pub fn prepare(&self) -> io::Result<()> {
        fs::create_dir_all(&self.working_dir)?;
        if let Some(logs) = self.log_path.parent() {
            fs::create_dir_all(logs)?;
        }
        Ok(())
    }
}

pub trait PipelineBuilder {
    /// Returns the steps and paths of the pipeline. Touches nothing on disk;
    /// see [`PipelinePlan::prepare`].
    fn plan(&self, ctx: &BuildContext) -> Result<PipelinePlan>;
}

/// Decodes the compiler's build-system settings into `T`.
pub(crate) fn decode_args<T: serde::de::DeserializeOwned>(ctx: &BuildContext) -> Result<T> {
    serde_json::from_value(ctx.args.clone()).map_err(|source| MatrixError::InvalidBuildArgs {
        compiler: ctx.compiler.clone(),
        source,
    })
}
