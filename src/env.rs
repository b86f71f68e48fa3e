//! Per-toolchain process environment.
//!
//! Each worker gets its own snapshot built once at spawn time. Snapshots are
//! never mutated afterwards, so sibling toolchains cannot leak `PATH` entries
//! or variables into each other.

use crate::error::{MatrixError, Result};
use std::collections::BTreeMap;
use std::ffi::{OsStr, OsString};
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// Checks that every entry is an existing directory and normalizes it.
pub fn normalize_paths(paths: &[String]) -> Result<Vec<PathBuf>> {
    paths
        .iter()
        .map(|p| {
            let path = Path::new(p);
            if !path.is_dir() {
                return Err(MatrixError::MissingDirectory(path.to_path_buf()));
            }
            Ok(path.components().collect::<PathBuf>())
        })
        .collect()
}

#[derive(Debug, Clone, Default)]
pub struct EnvSnapshot {
    vars: Arc<BTreeMap<OsString, OsString>>,
}

impl EnvSnapshot {
    /// Snapshot of the current process environment with `path_prefix`
    /// prepended to `PATH` and `overrides` applied on top.
    ///
    /// Inherited variables are kept as raw OS strings, so values that are
    /// not valid UTF-8 pass through to the child processes untouched.
    pub fn capture(path_prefix: &[PathBuf], overrides: &BTreeMap<String, String>) -> Result<Self> {
        Self::from_base(std::env::vars_os(), path_prefix, overrides)
    }

    pub fn from_base<K, V>(
        base: impl IntoIterator<Item = (K, V)>,
        path_prefix: &[PathBuf],
        overrides: &BTreeMap<String, String>,
    ) -> Result<Self>
    where
        K: Into<OsString>,
        V: Into<OsString>,
    {
        let mut vars: BTreeMap<OsString, OsString> = base
            .into_iter()
            .map(|(name, value)| (name.into(), value.into()))
            .collect();

        if !path_prefix.is_empty() {
            // An empty PATH would otherwise add a trailing empty entry,
            // which puts the working directory on the search path.
            let existing = vars.get(OsStr::new("PATH")).filter(|p| !p.is_empty()).cloned();
            let entries = path_prefix
                .iter()
                .cloned()
                .chain(existing.iter().flat_map(|p| std::env::split_paths(p)));
            let joined = std::env::join_paths(entries)
                .map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidInput, e))?;
            vars.insert(OsString::from("PATH"), joined);
        }

        for (name, value) in overrides {
            vars.insert(name.into(), value.into());
        }

        Ok(Self {
            vars: Arc::new(vars),
        })
    }

    /// Value of `name`, if it is set and valid UTF-8.
    pub fn get(&self, name: &str) -> Option<&str> {
        self.vars.get(OsStr::new(name)).and_then(|v| v.to_str())
    }

    pub fn get_os(&self, name: &str) -> Option<&OsStr> {
        self.vars.get(OsStr::new(name)).map(OsString::as_os_str)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&OsString, &OsString)> {
        self.vars.iter()
    }
}
