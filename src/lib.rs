//! # cxmatrix - Toolchain Matrix Runner
//!
//! cxmatrix builds and tests the same C/C++ project with several toolchains
//! at once. Each toolchain runs a fixed pipeline (clean, configure, build,
//! test) in parallel with the others; the test step has a hard deadline so a
//! hung binary cannot stall the run.
//!
//! ## Quick Start
//!
//! ```bash
//! # Build and test every project in project.json with every bundled compiler
//! cxm project.json
//!
//! # Custom compilers, clean build, stop at the first failure
//! cxm project.json --config compilers.json --clean --fail-fast
//! ```
//!
//! ## Module Organization
//!
//! - [`orchestrator`] - Workers, watchdog and the supervising event loop
//! - [`build`] - Build-system specific pipelines
//! - [`matrix`] - Resolution of projects x toolchains
//! - [`config`] - Configuration parsing (`config.json`, project files)

/// Build-system pipeline builders (CMake).
pub mod build;

/// Configuration file parsing.
pub mod config;

/// Per-toolchain environment snapshots.
pub mod env;

/// Error types.
pub mod error;

/// Interrupt handling and cancellation tokens.
pub mod interrupt;

/// Project x toolchain resolution and the top-level run loop.
pub mod matrix;

/// Parallel step execution, deadlines and event supervision.
pub mod orchestrator;

/// Tracing subscriber setup.
pub mod telemetry;

/// Terminal output (colors, log classification, tables).
pub mod ui;

pub use error::{MatrixError, Result};
