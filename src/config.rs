//! Configuration files.
//!
//! Two JSON documents drive a run:
//!
//! - the compilers config (`config.json`), listing build systems and the
//!   toolchains to test, bundled into the binary as a default;
//! - the project config, listing the projects to build and how to test them.

use crate::error::{MatrixError, Result};
use serde::Deserialize;
use std::collections::BTreeMap;
use std::fs;
use std::path::Path;

/// Deadline applied to the test step when the project does not set one.
pub const DEFAULT_TEST_TIMEOUT_SECS: i64 = 3;

const BUNDLED_CONFIG: &str = include_str!("../config.json");

#[derive(Deserialize, Debug, Clone)]
pub struct CompilersConfig {
    pub build_systems: BTreeMap<String, BuildSystemConfig>,
    pub compilers: BTreeMap<String, CompilerConfig>,
}

#[derive(Deserialize, Debug, Clone)]
pub struct BuildSystemConfig {
    #[serde(default)]
    pub path: Vec<String>,
    pub executable: String,
}

#[derive(Deserialize, Debug, Clone)]
pub struct CompilerConfig {
    #[serde(default)]
    pub path: Vec<String>,
    #[serde(default)]
    pub environ: BTreeMap<String, String>,
    /// Scripts sourced before every step, for toolchains whose environment
    /// can only be set up by an external script (e.g. `vcvarsall.bat`).
    #[serde(default)]
    pub setenv: Option<Vec<String>>,
    /// Build-system specific settings, keyed by build system name. Their shape
    /// depends on the build system and is checked by its pipeline builder.
    #[serde(default)]
    pub build_systems: BTreeMap<String, serde_json::Value>,
}

#[derive(Deserialize, Debug, Clone)]
pub struct ProjectConfig {
    pub build_system: String,
    pub build_directory: String,
    pub test_command: Vec<String>,
    /// Seconds before the test step is killed. Negative disables the deadline.
    #[serde(default = "default_test_timeout")]
    pub test_timeout: i64,
}

pub type ProjectsConfig = BTreeMap<String, ProjectConfig>;

fn default_test_timeout() -> i64 {
    DEFAULT_TEST_TIMEOUT_SECS
}

impl CompilersConfig {
    pub fn load(path: &Path) -> Result<Self> {
        parse_file(path)
    }

    /// The compilers config shipped with the binary.
    pub fn bundled() -> Result<Self> {
        serde_json::from_str(BUNDLED_CONFIG).map_err(|source| MatrixError::ParseConfig {
            path: "<bundled config.json>".into(),
            source,
        })
    }
}

pub fn load_projects(path: &Path) -> Result<ProjectsConfig> {
    parse_file(path)
}

fn parse_file<T: serde::de::DeserializeOwned>(path: &Path) -> Result<T> {
    let content = fs::read_to_string(path).map_err(|source| MatrixError::ReadConfig {
        path: path.to_path_buf(),
        source,
    })?;
    serde_json::from_str(&content).map_err(|source| MatrixError::ParseConfig {
        path: path.to_path_buf(),
        source,
    })
}
